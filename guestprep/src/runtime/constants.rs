//! Fixed values used when instrumenting guests.

/// Suffix appended to a guest file that instrumentation moves aside.
pub const BACKUP_SUFFIX: &str = ".guestprep";

/// Name of the in-guest announce helper binary.
pub const ANNOUNCE_HELPER: &str = "guestprep-announce";

/// Guest filesystem paths common to every family.
pub mod guest_paths {
    pub const ROOT_SSH_DIR: &str = "/root/.ssh";
    pub const AUTHORIZED_KEYS: &str = "/root/.ssh/authorized_keys";
    pub const SSHD_CONFIG: &str = "/etc/ssh/sshd_config";
    pub const INITTAB: &str = "/etc/inittab";
    pub const ANNOUNCE_HELPER: &str = "/root/guestprep-announce";
    pub const CRON_DIR: &str = "/etc/cron.d";
    pub const ANNOUNCE_CRON_JOB: &str = "/etc/cron.d/guestprep-announce";
}

/// Run level used when `/etc/inittab` does not name one.
pub const DEFAULT_RUNLEVEL: &str = "3";

/// Mode applied to the uploaded announce helper.
pub const HELPER_MODE: u32 = 0o755;

/// Keep-alive interval for the remote channel, in seconds.
pub const SSH_SERVER_ALIVE_INTERVAL: u32 = 30;

/// Prefix for hypervisor instance names.
pub const INSTANCE_PREFIX: &str = "guestprep";
