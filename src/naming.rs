//! Names derived from a project: DNS labels, hostnames, images, containers.

/// Lowercase DNS label: `[a-z0-9-]`, no leading/trailing dash, at most 63 chars.
pub fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() {
            out.push(c);
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }

    let trimmed: String = out.trim_matches('-').chars().take(63).collect();
    let trimmed = trimmed.trim_end_matches('-').to_string();
    if trimmed.is_empty() {
        "app".to_string()
    } else {
        trimmed
    }
}

/// `<sanitized-name>.<ip-with-dots>.<suffix>`, resolvable through wildcard DNS.
pub fn public_hostname(project: &str, address: &str, dns_suffix: &str) -> String {
    format!(
        "{}.{}.{}",
        sanitize(project),
        address.trim(),
        dns_suffix.trim_matches('.')
    )
}

pub fn image_ref(service_id: &str, short_commit: &str) -> String {
    format!("deckhand/{}:{}", service_id, short_commit)
}

pub fn image_repository(service_id: &str) -> String {
    format!("deckhand/{}", service_id)
}

pub fn container_name(service_id: &str, short_commit: &str, stamp: &str) -> String {
    format!("{}-{}-{}", service_id, short_commit, stamp)
}

pub fn short_commit(commit: &str) -> &str {
    &commit[..7.min(commit.len())]
}
