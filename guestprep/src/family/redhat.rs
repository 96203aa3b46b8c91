//! Red Hat guests (yum repo files, SysV startup links, kickstart).

use super::{
    FamilyKind, GuestFamily, ServiceEnablement, ServicePaths, ShippedRepository, shell_quote,
};
use crate::request::Repository;
use crate::vmm::DiskBus;

const SSHD_CONFIG: &str = "SyslogFacility AUTHPRIV
PasswordAuthentication yes
ChallengeResponseAuthentication no
X11Forwarding yes
Subsystem\tsftp\t/usr/libexec/openssh/sftp-server
";

const REPO_DIR: &str = "/etc/yum.repos.d";

#[derive(Debug, Clone, Copy, Default)]
pub struct RedHat;

impl GuestFamily for RedHat {
    fn kind(&self) -> FamilyKind {
        FamilyKind::RedHat
    }

    fn nic_model(&self) -> &'static str {
        "rtl8139"
    }

    fn disk_bus(&self) -> DiskBus {
        DiskBus::Ide
    }

    fn sshd_enablement(&self) -> ServiceEnablement {
        ServiceEnablement::StartupLink { name: "S55sshd" }
    }

    fn sshd_config(&self) -> &'static str {
        SSHD_CONFIG
    }

    fn cron(&self) -> ServicePaths {
        ServicePaths {
            init_script: "/etc/init.d/crond",
            daemon: "/usr/sbin/crond",
        }
    }

    fn cron_link_name(&self) -> &'static str {
        "S90crond"
    }

    fn answer_file_name(&self) -> &'static str {
        "ks.cfg"
    }

    fn isolinux_config(&self, _arch: &str) -> String {
        "isolinux/isolinux.cfg".to_string()
    }

    fn boot_stanza(&self, install_url: Option<&str>) -> Vec<String> {
        let method = install_url.unwrap_or("cdrom:/dev/cdrom");
        vec![
            "label customiso".to_string(),
            "  kernel vmlinuz".to_string(),
            format!("  append initrd=initrd.img ks=cdrom:/ks.cfg method={}", method),
        ]
    }

    fn list_repositories_command(&self) -> &'static str {
        "cat /etc/yum.repos.d/*.repo 2>/dev/null || true"
    }

    /// Parses concatenated `.repo` files: `[id]` sections with a
    /// `baseurl=` key. Sections without a `baseurl` are skipped.
    ///
    /// The section id is the alias: it is what yum keys repositories on
    /// and what [`add_repository_command`](Self::add_repository_command)
    /// writes.
    fn parse_repositories(&self, output: &str) -> Vec<ShippedRepository> {
        let mut repos = Vec::new();
        let mut current: Option<ShippedRepository> = None;

        for line in output.lines().map(str::trim) {
            if let Some(id) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                if let Some(repo) = current.take()
                    && !repo.url.is_empty()
                {
                    repos.push(repo);
                }
                current = Some(ShippedRepository {
                    id: id.to_string(),
                    alias: id.to_string(),
                    url: String::new(),
                });
                continue;
            }

            let Some(repo) = current.as_mut() else {
                continue;
            };
            if let Some((key, value)) = line.split_once('=')
                && key.trim() == "baseurl"
                && repo.url.is_empty()
            {
                repo.url = value.trim().to_string();
            }
        }

        if let Some(repo) = current
            && !repo.url.is_empty()
        {
            repos.push(repo);
        }
        repos
    }

    fn add_repository_command(&self, repo: &Repository) -> String {
        let body = format!(
            "[{name}]\nname={name}\nbaseurl={url}\nenabled=1\ngpgcheck=0\n",
            name = repo.name,
            url = repo.url
        );
        format!(
            "printf '%s' {} > {}/{}",
            shell_quote(&body),
            REPO_DIR,
            shell_quote(&format!("{}.repo", repo.name))
        )
    }

    /// Disables the section in place with sed; yum-utils is not on
    /// minimal guests.
    fn remove_repository_command(&self, repo: &ShippedRepository) -> String {
        disable_section_command(&repo.id, &format!("{}/*.repo", REPO_DIR))
    }

    fn install_command(&self, packages: &[String]) -> String {
        let packages: Vec<String> = packages.iter().map(|p| shell_quote(p)).collect();
        format!("yum -y install {}", packages.join(" "))
    }

    fn media_schemes(&self) -> &'static [&'static str] {
        &["cd", "dvd", "cdrom", "file", "media"]
    }
}

/// `sed` rewriting section `[id]` in `files` to `enabled=0`: existing
/// `enabled` keys of the section are dropped and one is added under the
/// header.
fn disable_section_command(id: &str, files: &str) -> String {
    let header = format!(r"^\[{}\]$", sed_escape(id));
    let drop_enabled = format!(r"/{}/,/^\[/{{/^enabled *=/d;}}", header);
    let add_disabled = format!(r"s/{}/&\nenabled=0/", header);
    format!(
        "sed -i -e {} -e {} {}",
        shell_quote(&drop_enabled),
        shell_quote(&add_disabled),
        files
    )
}

fn sed_escape(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if r"\/.*[]^$".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repo_files() {
        let output = "\
[base]
name=CentOS-3 - Base
baseurl=http://mirror.centos.org/centos/3/os/i386/
gpgcheck=1

[c3-media]
name=CentOS-3 - Media
baseurl=file:///media/cdrom/

[disabled-mirrorlist]
mirrorlist=http://mirrorlist.centos.org/
";
        let repos = RedHat.parse_repositories(output);
        assert_eq!(repos.len(), 2);
        assert_eq!(repos[0].id, "base");
        assert_eq!(repos[0].alias, "base");
        assert_eq!(repos[1].url, "file:///media/cdrom/");
    }

    #[test]
    fn test_boot_stanza_method() {
        let url = RedHat.boot_stanza(Some("http://mirror/rhel3"));
        assert_eq!(
            url[2],
            "  append initrd=initrd.img ks=cdrom:/ks.cfg method=http://mirror/rhel3"
        );
        let cd = RedHat.boot_stanza(None);
        assert!(cd[2].ends_with("method=cdrom:/dev/cdrom"));
    }

    #[test]
    fn test_add_repository_writes_repo_file() {
        let repo = Repository {
            name: "extras".into(),
            url: "http://mirror/extras".into(),
        };
        let cmd = RedHat.add_repository_command(&repo);
        assert!(cmd.starts_with("printf '%s' '[extras]\nname=extras\nbaseurl=http://mirror/extras"));
        assert!(cmd.ends_with("> /etc/yum.repos.d/extras.repo"));
    }

    const SHIPPED: &str = "\
[base]
name=CentOS-3 - Base
baseurl=http://mirror.centos.org/centos/3/os/i386/
enabled = 1

[extras]
name=CentOS-3 - Extras
baseurl=http://mirror.centos.org/centos/3/extras/i386/
enabled=1
gpgcheck=1

[c3-media]
baseurl=file:///media/cdrom/
";

    #[test]
    fn test_requested_name_conflicts_with_section_id() {
        let repos = RedHat.parse_repositories(SHIPPED);
        let requested = vec![Repository {
            name: "extras".into(),
            url: "http://mirror.local/extras".into(),
        }];

        let conflicting: Vec<&str> = repos
            .iter()
            .filter(|r| r.conflicts_with(&requested, RedHat.media_schemes()))
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(conflicting, vec!["extras", "c3-media"]);
    }

    #[test]
    fn test_remove_repository_disables_section_with_sed() {
        let repo = &RedHat.parse_repositories(SHIPPED)[1];
        let cmd = RedHat.remove_repository_command(repo);
        assert!(cmd.starts_with("sed -i "));
        assert!(cmd.ends_with(" /etc/yum.repos.d/*.repo"));
        assert!(!cmd.contains("yum-config-manager"));
    }

    #[test]
    fn test_disable_section_rewrites_only_that_section() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("CentOS-Base.repo");
        std::fs::write(&file, SHIPPED).unwrap();

        let cmd = disable_section_command("extras", &file.display().to_string());
        let status = std::process::Command::new("sh")
            .arg("-c")
            .arg(&cmd)
            .status()
            .unwrap();
        assert!(status.success());

        let rewritten = std::fs::read_to_string(&file).unwrap();
        assert!(rewritten.contains("[extras]\nenabled=0\nname=CentOS-3 - Extras\n"));
        assert!(!rewritten.contains("enabled=1"));
        assert!(rewritten.contains("[base]\nname=CentOS-3 - Base\n"));
        assert!(rewritten.contains("enabled = 1\n"));
    }

    #[test]
    fn test_sed_escape() {
        assert_eq!(sed_escape("c3.media"), r"c3\.media");
        assert_eq!(sed_escape("a/b[1]"), r"a\/b\[1\]");
    }
}
