//! openSUSE guests (zypper, after.local, autoyast).

use super::{
    FamilyKind, GuestFamily, ServiceEnablement, ServicePaths, ShippedRepository, shell_quote,
};
use crate::request::Repository;
use crate::vmm::DiskBus;

const SSHD_CONFIG: &str = "PasswordAuthentication no
UsePAM yes

X11Forwarding yes

Subsystem\tsftp\t/usr/lib64/ssh/sftp-server

AcceptEnv LANG LC_CTYPE LC_NUMERIC LC_TIME LC_COLLATE LC_MONETARY LC_MESSAGES
AcceptEnv LC_PAPER LC_NAME LC_ADDRESS LC_TELEPHONE LC_MEASUREMENT
AcceptEnv LC_IDENTIFICATION LC_ALL
";

/// Column `zypper repos -d` prints URIs in when no header is found.
const DEFAULT_URI_COLUMN: usize = 7;
const DEFAULT_ALIAS_COLUMN: usize = 1;

#[derive(Debug, Clone, Copy, Default)]
pub struct Suse;

impl GuestFamily for Suse {
    fn kind(&self) -> FamilyKind {
        FamilyKind::Suse
    }

    fn nic_model(&self) -> &'static str {
        "virtio-net-pci"
    }

    fn disk_bus(&self) -> DiskBus {
        DiskBus::Virtio
    }

    fn sshd_enablement(&self) -> ServiceEnablement {
        ServiceEnablement::HookScript {
            path: "/etc/init.d/after.local",
            contents: "/sbin/service sshd start\n",
        }
    }

    fn sshd_config(&self) -> &'static str {
        SSHD_CONFIG
    }

    fn cron(&self) -> ServicePaths {
        ServicePaths {
            init_script: "/etc/init.d/cron",
            daemon: "/usr/sbin/cron",
        }
    }

    fn cron_link_name(&self) -> &'static str {
        "S06cron"
    }

    fn answer_file_name(&self) -> &'static str {
        "autoinst.xml"
    }

    fn isolinux_config(&self, arch: &str) -> String {
        format!("boot/{}/loader/isolinux.cfg", arch)
    }

    fn boot_stanza(&self, _install_url: Option<&str>) -> Vec<String> {
        vec![
            "label customiso".to_string(),
            "  kernel linux".to_string(),
            "  append initrd=initrd splash=silent instmode=cd autoyast=default".to_string(),
        ]
    }

    fn list_repositories_command(&self) -> &'static str {
        "zypper repos -d"
    }

    /// Parses the `zypper repos -d` table.
    ///
    /// ```text
    /// # | Alias | Name | Enabled | Refresh | Priority | Type | URI | Service
    /// --+-------+------+---------+---------+----------+------+-----+--------
    /// 1 | repo-oss | ... | Yes | No | 99 | yast2 | cd:///?devices=/dev/sr0 |
    /// ```
    fn parse_repositories(&self, output: &str) -> Vec<ShippedRepository> {
        let mut alias_col = DEFAULT_ALIAS_COLUMN;
        let mut uri_col = DEFAULT_URI_COLUMN;

        let mut repos = Vec::new();
        for line in output.lines() {
            let fields: Vec<&str> = line.split('|').map(str::trim).collect();
            if fields.first() == Some(&"#") {
                for (i, field) in fields.iter().enumerate() {
                    match *field {
                        "Alias" => alias_col = i,
                        "URI" => uri_col = i,
                        _ => {}
                    }
                }
                continue;
            }

            if !line.starts_with(|c: char| c.is_ascii_digit()) {
                continue;
            }
            let Some(url) = fields.get(uri_col) else {
                continue;
            };
            // zypper renumbers after every removal; the alias is stable.
            let alias = fields.get(alias_col).copied().unwrap_or_default();
            let id = if alias.is_empty() { fields[0] } else { alias };
            repos.push(ShippedRepository {
                id: id.to_string(),
                alias: alias.to_string(),
                url: url.to_string(),
            });
        }
        repos
    }

    fn add_repository_command(&self, repo: &Repository) -> String {
        format!(
            "zypper addrepo {} {}",
            shell_quote(&repo.url),
            shell_quote(&repo.name)
        )
    }

    fn remove_repository_command(&self, repo: &ShippedRepository) -> String {
        format!("zypper removerepo {}", shell_quote(&repo.id))
    }

    fn install_command(&self, packages: &[String]) -> String {
        let packages: Vec<String> = packages.iter().map(|p| shell_quote(p)).collect();
        format!("zypper -n install {}", packages.join(" "))
    }
}
