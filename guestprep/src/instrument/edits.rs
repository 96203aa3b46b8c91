//! Ordered, reversible edits made to an offline guest filesystem.
//!
//! Every edit is recorded *before* the mutation is attempted, so an edit
//! that failed halfway is still reversed. Reversal is existence-guarded:
//! undoing an edit that never happened is a no-op.

use crate::fs::GuestFs;
use crate::runtime::constants::BACKUP_SUFFIX;
use guestprep_shared::errors::{GuestprepError, GuestprepResult};
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReversibleEdit {
    /// A directory created because it was absent.
    CreatedDir { path: String },
    /// A pre-existing file renamed out of the way.
    MovedAside { original: String, backup: String },
    /// A file or link written where nothing (or a moved-aside file) was.
    Installed { path: String },
}

impl ReversibleEdit {
    pub fn reverse(&self, fs: &dyn GuestFs) -> GuestprepResult<()> {
        match self {
            ReversibleEdit::Installed { path } => {
                if fs.exists(path)? {
                    fs.remove(path)?;
                }
            }
            ReversibleEdit::MovedAside { original, backup } => {
                if fs.exists(backup)? {
                    if fs.exists(original)? {
                        fs.remove(original)?;
                    }
                    fs.rename(backup, original)?;
                }
            }
            ReversibleEdit::CreatedDir { path } => {
                if fs.exists(path)? && fs.list(path)?.is_empty() {
                    fs.remove_dir(path)?;
                }
            }
        }
        Ok(())
    }
}

/// The three instrumentation steps, in application order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentationStep {
    /// Root's authorized keys.
    Access,
    /// Remote command service startup and configuration.
    ServiceEnablement,
    /// Periodic announcement of the guest to the host.
    Announcement,
}

impl InstrumentationStep {
    pub const ALL: [InstrumentationStep; 3] = [
        InstrumentationStep::Access,
        InstrumentationStep::ServiceEnablement,
        InstrumentationStep::Announcement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentationStep::Access => "access",
            InstrumentationStep::ServiceEnablement => "service_enablement",
            InstrumentationStep::Announcement => "announcement",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedStep {
    pub step: InstrumentationStep,
    pub edits: Vec<ReversibleEdit>,
}

impl AppliedStep {
    /// Reverse the edits last-to-first. Failures are logged and skipped.
    ///
    /// Returns the number of edits that could not be reversed.
    pub fn reverse(&self, fs: &dyn GuestFs) -> usize {
        let mut failures = 0;
        for edit in self.edits.iter().rev() {
            if let Err(e) = edit.reverse(fs) {
                failures += 1;
                warn!(
                    step = self.step.as_str(),
                    edit = ?edit,
                    error = %e,
                    "Failed to reverse instrumentation edit"
                );
            }
        }
        debug!(
            step = self.step.as_str(),
            edits = self.edits.len(),
            failures,
            "Instrumentation step reversed"
        );
        failures
    }
}

/// Steps applied to one image, in application order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstrumentationState {
    steps: Vec<AppliedStep>,
}

impl InstrumentationState {
    pub fn steps(&self) -> &[AppliedStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub(crate) fn push(&mut self, step: AppliedStep) {
        self.steps.push(step);
    }

    /// Reverse every step last-to-first. Never fails.
    pub fn reverse(&self, fs: &dyn GuestFs) -> usize {
        self.steps.iter().rev().map(|step| step.reverse(fs)).sum()
    }
}

/// Applies edits for one step, recording each before it happens.
pub(crate) struct EditRecorder<'a> {
    fs: &'a dyn GuestFs,
    edits: Vec<ReversibleEdit>,
}

impl<'a> EditRecorder<'a> {
    pub fn new(fs: &'a dyn GuestFs) -> Self {
        Self {
            fs,
            edits: Vec::new(),
        }
    }

    pub fn fs(&self) -> &'a dyn GuestFs {
        self.fs
    }

    pub fn into_edits(self) -> Vec<ReversibleEdit> {
        self.edits
    }

    pub fn ensure_dir(&mut self, path: &str) -> GuestprepResult<()> {
        if self.fs.exists(path)? {
            return Ok(());
        }
        self.edits.push(ReversibleEdit::CreatedDir {
            path: path.to_string(),
        });
        self.fs.mkdir(path)
    }

    /// Rename an existing file at `path` to `<path>.guestprep`.
    ///
    /// A leftover backup means an earlier run was never restored; the
    /// backup may hold the only copy of the original, so it is never
    /// overwritten.
    pub fn move_aside(&mut self, path: &str) -> GuestprepResult<()> {
        if !self.fs.exists(path)? {
            return Ok(());
        }
        let backup = format!("{}{}", path, BACKUP_SUFFIX);
        if self.fs.exists(&backup)? {
            return Err(GuestprepError::Instrumentation(format!(
                "stale backup {} exists; restore it before instrumenting again",
                backup
            )));
        }
        self.edits.push(ReversibleEdit::MovedAside {
            original: path.to_string(),
            backup: backup.clone(),
        });
        self.fs.rename(path, &backup)
    }

    /// Move aside whatever is at `path`, then write `contents` there.
    pub fn install(&mut self, path: &str, contents: &[u8]) -> GuestprepResult<()> {
        self.move_aside(path)?;
        self.record_installed(path);
        self.fs.write(path, contents)
    }

    pub fn install_from_host(&mut self, host_path: &Path, path: &str) -> GuestprepResult<()> {
        self.move_aside(path)?;
        self.record_installed(path);
        self.fs.upload(host_path, path)
    }

    pub fn install_link(&mut self, target: &str, link: &str) -> GuestprepResult<()> {
        self.move_aside(link)?;
        self.record_installed(link);
        self.fs.symlink(target, link)
    }

    fn record_installed(&mut self, path: &str) {
        self.edits.push(ReversibleEdit::Installed {
            path: path.to_string(),
        });
    }
}
