//! Unattended-install boot media.
//!
//! Works on an extracted installation ISO: drops the answer file at the
//! media root and rewrites the boot-loader config so the install starts
//! on its own.

use crate::family::GuestFamily;
use guestprep_shared::errors::{GuestprepError, GuestprepResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Label of the boot entry added to the boot menu.
const BOOT_LABEL: &str = "customiso";

#[derive(Debug, Clone)]
pub struct MediaOptions {
    /// Architecture directory name on the media (`i386`, `x86_64`).
    pub arch: String,
    /// Network install source. `None` installs from the media itself.
    pub install_url: Option<String>,
}

pub struct MediaCustomizer {
    family: Arc<dyn GuestFamily>,
}

impl MediaCustomizer {
    pub fn new(family: Arc<dyn GuestFamily>) -> Self {
        Self { family }
    }

    /// Install `answer_file` into `iso_dir` and make the media boot into
    /// the unattended install.
    pub fn customize(
        &self,
        iso_dir: &Path,
        answer_file: &Path,
        options: &MediaOptions,
    ) -> GuestprepResult<()> {
        if !answer_file.is_file() {
            return Err(GuestprepError::Media(format!(
                "answer file not found: {}",
                answer_file.display()
            )));
        }
        let config_path = iso_dir.join(self.family.isolinux_config(&options.arch));
        if !config_path.is_file() {
            return Err(GuestprepError::Media(format!(
                "boot loader config not found: {}",
                config_path.display()
            )));
        }

        let answer_target = iso_dir.join(self.family.answer_file_name());
        std::fs::copy(answer_file, &answer_target)
            .map_err(|e| media_err("copy answer file to", &answer_target, e))?;
        debug!(path = %answer_target.display(), "Answer file installed");

        let original = std::fs::read_to_string(&config_path)
            .map_err(|e| media_err("read", &config_path, e))?;
        let stanza = self.family.boot_stanza(options.install_url.as_deref());
        std::fs::write(&config_path, rewrite_isolinux(&original, &stanza))
            .map_err(|e| media_err("write", &config_path, e))?;

        info!(
            family = self.family.name(),
            config = %config_path.display(),
            "Boot media customized"
        );
        Ok(())
    }

    pub fn answer_file_path(&self, iso_dir: &Path) -> PathBuf {
        iso_dir.join(self.family.answer_file_name())
    }
}

fn media_err(op: &str, path: &Path, e: std::io::Error) -> GuestprepError {
    GuestprepError::Media(format!("Failed to {} {}: {}", op, path.display(), e))
}

/// Point `timeout` and `default` at the unattended entry and append it.
pub fn rewrite_isolinux(config: &str, stanza: &[String]) -> String {
    let mut out = String::with_capacity(config.len() + 128);
    for line in config.lines() {
        if line.starts_with("timeout") {
            out.push_str("timeout 1");
        } else if line.starts_with("default") {
            out.push_str("default ");
            out.push_str(BOOT_LABEL);
        } else {
            out.push_str(line);
        }
        out.push('\n');
    }
    for line in stanza {
        out.push_str(line);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::family::{RedHat, Suse};
    use tempfile::TempDir;

    const ISOLINUX: &str = "\
default harddisk
timeout 200
label harddisk
  kernel linux
  append splash=silent
";

    #[test]
    fn test_rewrite_isolinux() {
        let stanza = Suse.boot_stanza(None);
        let rewritten = rewrite_isolinux(ISOLINUX, &stanza);
        assert_eq!(
            rewritten,
            "\
default customiso
timeout 1
label harddisk
  kernel linux
  append splash=silent
label customiso
  kernel linux
  append initrd=initrd splash=silent instmode=cd autoyast=default
"
        );
    }

    fn media_tree(config_rel: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("iso").join(config_rel);
        std::fs::create_dir_all(config.parent().unwrap()).unwrap();
        std::fs::write(&config, ISOLINUX).unwrap();
        let answer = dir.path().join("answers");
        std::fs::write(&answer, "install\n").unwrap();
        (dir, answer)
    }

    #[test]
    fn test_suse_media() {
        let (dir, answer) = media_tree("boot/x86_64/loader/isolinux.cfg");
        let iso = dir.path().join("iso");
        let options = MediaOptions {
            arch: "x86_64".into(),
            install_url: None,
        };

        MediaCustomizer::new(Arc::new(Suse))
            .customize(&iso, &answer, &options)
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(iso.join("autoinst.xml")).unwrap(),
            "install\n"
        );
        let config =
            std::fs::read_to_string(iso.join("boot/x86_64/loader/isolinux.cfg")).unwrap();
        assert!(config.contains("autoyast=default"));
    }

    #[test]
    fn test_redhat_url_install() {
        let (dir, answer) = media_tree("isolinux/isolinux.cfg");
        let iso = dir.path().join("iso");
        let options = MediaOptions {
            arch: "i386".into(),
            install_url: Some("http://mirror/centos/3/os/i386".into()),
        };

        let customizer = MediaCustomizer::new(Arc::new(RedHat));
        customizer.customize(&iso, &answer, &options).unwrap();

        assert!(customizer.answer_file_path(&iso).ends_with("ks.cfg"));
        let config = std::fs::read_to_string(iso.join("isolinux/isolinux.cfg")).unwrap();
        assert!(config.ends_with(
            "  append initrd=initrd.img ks=cdrom:/ks.cfg method=http://mirror/centos/3/os/i386\n"
        ));
    }

    #[test]
    fn test_missing_config_is_media_error() {
        let (dir, answer) = media_tree("isolinux/isolinux.cfg");
        let options = MediaOptions {
            arch: "x86_64".into(),
            install_url: None,
        };
        let err = MediaCustomizer::new(Arc::new(Suse))
            .customize(&dir.path().join("iso"), &answer, &options)
            .unwrap_err();
        assert!(matches!(err, GuestprepError::Media(_)));
    }
}
