use crate::channel::Shell;
use crate::error::{EngineError, EngineResult};
use crate::model::{OsFamily, OsInfo};

const DEBIAN_IDS: &[&str] = &["debian", "ubuntu", "raspbian", "linuxmint", "pop"];
const RHEL_IDS: &[&str] = &["rhel", "centos", "rocky", "almalinux", "fedora", "ol", "amzn"];

/// Read /etc/os-release on the target and classify it.
pub async fn detect(shell: &Shell<'_>) -> EngineResult<OsInfo> {
    let output = shell.exec("cat /etc/os-release").await?;
    parse_os_release(&output)
}

pub fn parse_os_release(content: &str) -> EngineResult<OsInfo> {
    let field = |key: &str| {
        content.lines().find_map(|line| {
            line.strip_prefix(key)
                .and_then(|rest| rest.strip_prefix('='))
                .map(|v| v.trim().trim_matches('"').trim_matches('\'').to_string())
        })
    };

    let id = field("ID").unwrap_or_default().to_lowercase();
    let like = field("ID_LIKE").unwrap_or_default().to_lowercase();
    let version = field("VERSION_ID").unwrap_or_default();

    let matches = |ids: &[&str]| {
        ids.contains(&id.as_str()) || like.split_whitespace().any(|l| ids.contains(&l))
    };

    let family = if matches(DEBIAN_IDS) {
        OsFamily::Debian
    } else if matches(RHEL_IDS) {
        OsFamily::Rhel
    } else {
        let name = if id.is_empty() { "unknown".to_string() } else { id };
        return Err(EngineError::UnsupportedOs(name));
    };

    Ok(OsInfo {
        family,
        id,
        version,
    })
}

impl OsFamily {
    pub fn install_packages(&self, packages: &[&str]) -> String {
        let packages = packages.join(" ");
        match self {
            OsFamily::Debian => format!(
                "apt-get update -qq && DEBIAN_FRONTEND=noninteractive apt-get install -y -qq {}",
                packages
            ),
            OsFamily::Rhel => format!(
                "if command -v dnf >/dev/null 2>&1; then dnf install -y -q {p}; else yum install -y -q {p}; fi",
                p = packages
            ),
        }
    }

    /// Install `packages` unless `binary` is already on the PATH.
    pub fn install(&self, binary: &str, packages: &[&str]) -> String {
        format!(
            "if ! command -v {} >/dev/null 2>&1; then {}; fi",
            binary,
            self.install_packages(packages)
        )
    }

    pub fn install_runtime(&self) -> String {
        match self {
            OsFamily::Debian => format!(
                "{} && if ! command -v docker >/dev/null 2>&1; then curl -fsSL https://get.docker.com | sh; fi",
                self.install("curl", &["curl", "ca-certificates"])
            ),
            OsFamily::Rhel => concat!(
                "if ! command -v docker >/dev/null 2>&1; then ",
                "(dnf install -y -q dnf-plugins-core || yum install -y -q yum-utils) && ",
                "(dnf config-manager --add-repo https://download.docker.com/linux/centos/docker-ce.repo ",
                "|| yum-config-manager --add-repo https://download.docker.com/linux/centos/docker-ce.repo) && ",
                "(dnf install -y -q docker-ce docker-ce-cli containerd.io docker-compose-plugin ",
                "|| yum install -y -q docker-ce docker-ce-cli containerd.io docker-compose-plugin); fi"
            )
            .to_string(),
        }
    }

    pub fn compose_package(&self) -> &'static str {
        "docker-compose-plugin"
    }

    pub fn install_node(&self) -> String {
        let setup = match self {
            OsFamily::Debian => "curl -fsSL https://deb.nodesource.com/setup_20.x | bash -",
            OsFamily::Rhel => "curl -fsSL https://rpm.nodesource.com/setup_20.x | bash -",
        };
        format!(
            "if ! command -v node >/dev/null 2>&1; then {} && {}; fi",
            setup,
            self.install("node", &["nodejs"])
        )
    }

    /// Allow SSH, HTTP and HTTPS and enable the host firewall.
    pub fn configure_firewall(&self, ssh_port: u16) -> String {
        match self {
            OsFamily::Debian => format!(
                "{} && ufw allow {}/tcp && ufw allow 80/tcp && ufw allow 443/tcp && ufw --force enable",
                self.install("ufw", &["ufw"]),
                ssh_port
            ),
            OsFamily::Rhel => format!(
                "{} && systemctl enable --now firewalld && firewall-cmd --permanent --add-port={}/tcp \
                 && firewall-cmd --permanent --add-service=http && firewall-cmd --permanent --add-service=https \
                 && firewall-cmd --reload",
                self.install("firewall-cmd", &["firewalld"]),
                ssh_port
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ubuntu_is_debian_family() {
        let os = parse_os_release(
            "NAME=\"Ubuntu\"\nVERSION_ID=\"22.04\"\nID=ubuntu\nID_LIKE=debian\n",
        )
        .unwrap();
        assert_eq!(os.family, OsFamily::Debian);
        assert_eq!(os.id, "ubuntu");
        assert_eq!(os.version, "22.04");
    }

    #[test]
    fn rocky_is_rhel_family_through_id_like() {
        let os = parse_os_release("ID=\"rocky\"\nID_LIKE=\"rhel centos fedora\"\nVERSION_ID=\"9.3\"\n")
            .unwrap();
        assert_eq!(os.family, OsFamily::Rhel);
    }

    #[test]
    fn derivative_detected_by_id_like_only() {
        let os = parse_os_release("ID=zorin\nID_LIKE=\"ubuntu debian\"\nVERSION_ID=17\n").unwrap();
        assert_eq!(os.family, OsFamily::Debian);
        assert_eq!(os.id, "zorin");
    }

    #[test]
    fn unknown_distribution_is_unsupported() {
        let err = parse_os_release("ID=alpine\nVERSION_ID=3.19.0\n").unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedOs(ref id) if id == "alpine"));
        assert_eq!(err.code(), "UnsupportedOS");
    }

    #[test]
    fn version_id_is_not_mistaken_for_id() {
        let os = parse_os_release("VERSION_ID=12\nID=debian\n").unwrap();
        assert_eq!(os.id, "debian");
    }

    #[test]
    fn install_checks_before_installing() {
        let cmd = OsFamily::Debian.install("git", &["git"]);
        assert!(cmd.starts_with("if ! command -v git"));
        assert!(cmd.contains("apt-get install -y -qq git"));
        assert!(OsFamily::Rhel.install("git", &["git"]).contains("dnf install -y -q git"));
    }
}
