//! Default run level discovery from `/etc/inittab`.

use crate::fs::GuestFs;
use crate::runtime::constants::{DEFAULT_RUNLEVEL, guest_paths};
use guestprep_shared::errors::GuestprepResult;

/// Second field of the first `id:` line, e.g. `id:5:initdefault:` → `5`.
pub fn parse_default_runlevel(inittab: &str) -> String {
    inittab
        .lines()
        .find(|line| line.starts_with("id:"))
        .and_then(|line| line.split(':').nth(1))
        .map(str::trim)
        .filter(|level| !level.is_empty())
        .unwrap_or(DEFAULT_RUNLEVEL)
        .to_string()
}

pub fn default_runlevel(fs: &dyn GuestFs) -> GuestprepResult<String> {
    if !fs.exists(guest_paths::INITTAB)? {
        return Ok(DEFAULT_RUNLEVEL.to_string());
    }
    let inittab = String::from_utf8_lossy(&fs.read(guest_paths::INITTAB)?).into_owned();
    Ok(parse_default_runlevel(&inittab))
}
