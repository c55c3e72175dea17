//! Source checkout: ref classification and credential handling.

use crate::channel::quote;
use crate::error::EngineError;
use crate::model::GitAuth;

/// What a requested ref names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitRef {
    Tag(String),
    Commit(String),
    Branch(String),
}

impl GitRef {
    pub fn parse(reference: &str) -> Self {
        let reference = reference.trim();
        if is_semver_tag(reference) {
            GitRef::Tag(reference.to_string())
        } else if is_commit(reference) {
            GitRef::Commit(reference.to_lowercase())
        } else {
            GitRef::Branch(reference.to_string())
        }
    }
}

/// `v1.2.3`, `1.2.3`, `v1.2.3-rc.1`, `1.2.3+build`.
fn is_semver_tag(s: &str) -> bool {
    let core = s.strip_prefix('v').unwrap_or(s);
    let core = core.split(['-', '+']).next().unwrap_or("");
    let parts: Vec<&str> = core.split('.').collect();
    parts.len() == 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

fn is_commit(s: &str) -> bool {
    (7..=40).contains(&s.len()) && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Answers git's credential queries from the environment, so the token is
/// never written into the remote URL or `.git/config`.
const CREDENTIAL_HELPER: &str = "!f() { if [ \"$1\" = get ]; then echo \"username=$DECKHAND_GIT_USER\"; echo \"password=$DECKHAND_GIT_TOKEN\"; fi; }; f";

/// `git` invocation carrying the configured credentials.
pub fn git_command(auth: &GitAuth) -> String {
    match auth {
        GitAuth::Token { username, token } => format!(
            "DECKHAND_GIT_USER={} DECKHAND_GIT_TOKEN={} git -c credential.helper= -c credential.helper={}",
            quote(username.as_deref().unwrap_or("x-access-token")),
            quote(token),
            quote(CREDENTIAL_HELPER)
        ),
        GitAuth::SshKey { path } => format!(
            "GIT_SSH_COMMAND={} git",
            quote(&format!(
                "ssh -i {} -o IdentitiesOnly=yes -o StrictHostKeyChecking=accept-new",
                path.display()
            ))
        ),
        _ => "git".to_string(),
    }
}

/// The value that must never reach logs or error output.
pub fn secret(auth: &GitAuth) -> Option<&str> {
    match auth {
        GitAuth::Token { token, .. } if !token.is_empty() => Some(token),
        _ => None,
    }
}

/// Hide credentials before text reaches logs.
pub fn redact(auth: &GitAuth, text: &str) -> String {
    match secret(auth) {
        Some(token) => text.replace(token, "***"),
        None => text.to_string(),
    }
}

pub fn redact_error(auth: &GitAuth, err: EngineError) -> EngineError {
    match secret(auth) {
        Some(token) => err.redact(token),
        None => err,
    }
}

/// Parse `git ls-remote --symref origin HEAD` output for the default branch.
pub fn parse_default_branch(ls_remote: &str) -> Option<String> {
    ls_remote.lines().find_map(|line| {
        let rest = line.strip_prefix("ref: refs/heads/")?;
        let (branch, head) = rest.split_once('\t')?;
        (head.trim() == "HEAD").then(|| branch.to_string())
    })
}
