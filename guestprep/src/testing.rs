//! Fakes and fixtures shared by unit tests.

use crate::disk::{DiskFormat, DiskImage};
use crate::exec::{RemoteCommandResult, RemoteExecutor};
use crate::family::{GuestFamily, RedHat, Suse};
use crate::fs::{DirectoryGuestFs, DirectoryProvider, GuestFsHandle, GuestFsProvider, Unmount};
use crate::lifecycle::Orchestrator;
use crate::net::NetworkPresence;
use crate::runtime::PrepContext;
use crate::runtime::options::PrepOptions;
use crate::vmm::InstanceSpec;
use crate::vmm::controller::{VmmController, VmmHandler};
use async_trait::async_trait;
use guestprep_shared::errors::{GuestprepError, GuestprepResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

// ============================================================================
// Guest trees
// ============================================================================

/// Unpacked guest root in a temp directory.
pub(crate) struct GuestTree {
    dir: TempDir,
}

impl GuestTree {
    /// SUSE-like root, default run level 5.
    pub fn suse() -> Self {
        let tree = Self::empty();
        tree.dirs(&[
            "root",
            "etc/ssh",
            "etc/init.d",
            "usr/sbin",
            "etc/rc.d/rc5.d",
        ]);
        tree.files(&[
            ("etc/init.d/sshd", "#!/bin/sh\n"),
            ("usr/sbin/sshd", "ELF"),
            ("etc/init.d/cron", "#!/bin/sh\n"),
            ("usr/sbin/cron", "ELF"),
            ("etc/inittab", "id:5:initdefault:\n"),
            ("etc/ssh/sshd_config", "Port 22\n"),
        ]);
        tree
    }

    /// Red Hat-like root without an inittab, so run level 3.
    pub fn redhat() -> Self {
        let tree = Self::empty();
        tree.dirs(&[
            "root",
            "etc/ssh",
            "etc/init.d",
            "usr/sbin",
            "etc/rc.d/rc3.d",
        ]);
        tree.files(&[
            ("etc/init.d/sshd", "#!/bin/sh\n"),
            ("usr/sbin/sshd", "ELF"),
            ("etc/init.d/crond", "#!/bin/sh\n"),
            ("usr/sbin/crond", "ELF"),
        ]);
        tree
    }

    fn empty() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn dirs(&self, dirs: &[&str]) {
        for dir in dirs {
            std::fs::create_dir_all(self.root().join(dir)).unwrap();
        }
    }

    fn files(&self, files: &[(&str, &str)]) {
        for (path, contents) in files {
            std::fs::write(self.root().join(path), contents).unwrap();
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn fs(&self) -> DirectoryGuestFs {
        DirectoryGuestFs::new(self.root().to_path_buf())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Entry {
    Dir,
    File { contents: Vec<u8>, mode: u32 },
    Symlink(PathBuf),
}

/// Everything under `root`, keyed by relative path. Links are not followed.
pub(crate) fn snapshot(root: &Path) -> BTreeMap<PathBuf, Entry> {
    walkdir::WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .map(|entry| {
            let entry = entry.unwrap();
            let rel = entry.path().strip_prefix(root).unwrap().to_path_buf();
            let file_type = entry.file_type();
            let value = if file_type.is_symlink() {
                Entry::Symlink(std::fs::read_link(entry.path()).unwrap())
            } else if file_type.is_dir() {
                Entry::Dir
            } else {
                Entry::File {
                    contents: std::fs::read(entry.path()).unwrap(),
                    mode: entry.metadata().unwrap().permissions().mode() & 0o7777,
                }
            };
            (rel, value)
        })
        .collect()
}

/// Directory provider that counts opens, with fault injection.
#[derive(Clone, Default)]
pub(crate) struct CountingProvider {
    opens: Arc<AtomicUsize>,
    /// Opens beyond this many fail.
    open_limit: Option<usize>,
    stuck_mount: bool,
}

impl CountingProvider {
    pub fn failing_after(opens: usize) -> Self {
        Self {
            open_limit: Some(opens),
            ..Default::default()
        }
    }

    /// Every handle's unmount fails.
    pub fn stuck_mount() -> Self {
        Self {
            stuck_mount: true,
            ..Default::default()
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl GuestFsProvider for CountingProvider {
    fn open(&self, image: &DiskImage, op_id: &str) -> GuestprepResult<GuestFsHandle> {
        let opened = self.opens.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(limit) = self.open_limit
            && opened > limit
        {
            return Err(GuestprepError::Instrumentation(format!(
                "{} is locked",
                image.path.display()
            )));
        }
        if self.stuck_mount {
            return Ok(GuestFsHandle::mounted(
                Box::new(DirectoryGuestFs::new(image.path.clone())),
                Box::new(StuckMount {
                    target: image.path.clone(),
                }),
            ));
        }
        DirectoryProvider.open(image, op_id)
    }
}

struct StuckMount {
    target: PathBuf,
}

impl Unmount for StuckMount {
    fn target(&self) -> &Path {
        &self.target
    }

    fn unmount(&mut self) -> GuestprepResult<()> {
        Err(GuestprepError::Instrumentation(format!(
            "{} is busy",
            self.target.display()
        )))
    }
}

// ============================================================================
// Hypervisor
// ============================================================================

#[derive(Default)]
struct ControllerState {
    reject: bool,
    started: AtomicUsize,
    destroyed: AtomicUsize,
    killed: AtomicUsize,
    running: Mutex<Vec<Arc<AtomicBool>>>,
}

#[derive(Clone, Default)]
pub(crate) struct FakeController {
    state: Arc<ControllerState>,
}

impl FakeController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting() -> Self {
        Self {
            state: Arc::new(ControllerState {
                reject: true,
                ..Default::default()
            }),
        }
    }

    pub fn started(&self) -> usize {
        self.state.started.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.state.destroyed.load(Ordering::SeqCst)
    }

    /// Destroys of instances that were still running.
    pub fn killed(&self) -> usize {
        self.state.killed.load(Ordering::SeqCst)
    }

    /// Every instance stops on its own.
    pub fn crash_all(&self) {
        self.stop_all();
    }

    pub fn stop_all(&self) {
        for running in self.state.running.lock().iter() {
            running.store(false, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl VmmController for FakeController {
    async fn start(&self, spec: &InstanceSpec) -> GuestprepResult<Box<dyn VmmHandler>> {
        if self.state.reject {
            return Err(GuestprepError::Hypervisor("start rejected".into()));
        }
        self.state.started.fetch_add(1, Ordering::SeqCst);
        let running = Arc::new(AtomicBool::new(true));
        self.state.running.lock().push(Arc::clone(&running));
        Ok(Box::new(FakeHandler {
            id: spec.name.clone(),
            running,
            state: Arc::clone(&self.state),
        }))
    }
}

struct FakeHandler {
    id: String,
    running: Arc<AtomicBool>,
    state: Arc<ControllerState>,
}

impl VmmHandler for FakeHandler {
    fn destroy(&mut self) -> GuestprepResult<()> {
        if self.running.swap(false, Ordering::SeqCst) {
            self.state.killed.fetch_add(1, Ordering::SeqCst);
        }
        self.state.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn id(&self) -> &str {
        &self.id
    }
}

// ============================================================================
// Presence
// ============================================================================

#[derive(Clone)]
pub(crate) struct FakePresence {
    addr: Option<IpAddr>,
    /// Polls answered with `None` before the address appears.
    misses: usize,
    fail: bool,
    polls: Arc<AtomicUsize>,
    forgets: Arc<AtomicUsize>,
}

impl FakePresence {
    fn build(addr: Option<IpAddr>, misses: usize, fail: bool) -> Self {
        Self {
            addr,
            misses,
            fail,
            polls: Arc::new(AtomicUsize::new(0)),
            forgets: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn never() -> Self {
        Self::build(None, 0, false)
    }

    pub fn immediately(addr: IpAddr) -> Self {
        Self::build(Some(addr), 0, false)
    }

    /// Answers on poll `n`.
    pub fn after(n: usize, addr: IpAddr) -> Self {
        Self::build(Some(addr), n.saturating_sub(1), false)
    }

    pub fn failing() -> Self {
        Self::build(None, 0, true)
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn forgets(&self) -> usize {
        self.forgets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NetworkPresence for FakePresence {
    async fn resolve(&self, _spec: &InstanceSpec) -> GuestprepResult<Option<IpAddr>> {
        let seen = self.polls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(GuestprepError::Internal("presence backend down".into()));
        }
        if seen < self.misses {
            return Ok(None);
        }
        Ok(self.addr)
    }

    fn forget(&self, _spec: &InstanceSpec) {
        self.forgets.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Remote execution
// ============================================================================

type CommandHandler = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Records commands and answers them from a script.
///
/// Unscripted commands succeed with empty output.
#[derive(Clone, Default)]
pub(crate) struct ScriptedExecutor {
    handler: Option<CommandHandler>,
    responses: Vec<(String, String)>,
    failing: Vec<String>,
    stops: Option<FakeController>,
    commands: Arc<Mutex<Vec<String>>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands starting with `prefix` with `stdout`.
    pub fn respond(mut self, prefix: &str, stdout: &str) -> Self {
        self.responses.push((prefix.to_string(), stdout.to_string()));
        self
    }

    /// Answer with `handler` first; `None` falls through to the script.
    pub fn handling(
        mut self,
        handler: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Channel failure for commands containing `needle`.
    pub fn failing_on(mut self, needle: &str) -> Self {
        self.failing.push(needle.to_string());
        self
    }

    /// Shutdown commands stop every instance of `controller`.
    pub fn stopping(mut self, controller: FakeController) -> Self {
        self.stops = Some(controller);
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }
}

#[async_trait]
impl RemoteExecutor for ScriptedExecutor {
    async fn run(
        &self,
        addr: IpAddr,
        command: &str,
        _timeout: Duration,
    ) -> GuestprepResult<RemoteCommandResult> {
        self.commands.lock().push(command.to_string());

        if self.failing.iter().any(|needle| command.contains(needle.as_str())) {
            return Err(GuestprepError::RemoteExecution(format!(
                "connection to {} closed",
                addr
            )));
        }
        if command.starts_with("shutdown")
            && let Some(controller) = &self.stops
        {
            controller.stop_all();
        }

        let stdout = self
            .handler
            .as_ref()
            .and_then(|handler| handler(command))
            .or_else(|| {
                self.responses
                    .iter()
                    .find(|(prefix, _)| command.starts_with(prefix.as_str()))
                    .map(|(_, stdout)| stdout.clone())
            })
            .unwrap_or_default();
        Ok(RemoteCommandResult {
            stdout,
            stderr: String::new(),
            exit_status: 0,
        })
    }
}

// ============================================================================
// Contexts
// ============================================================================

pub(crate) fn test_options() -> PrepOptions {
    PrepOptions {
        home_dir: std::env::temp_dir().join("guestprep-test"),
        ..Default::default()
    }
}

pub(crate) fn test_context(
    controller: FakeController,
    presence: FakePresence,
    executor: ScriptedExecutor,
) -> PrepContext {
    PrepContext::with_collaborators(
        test_options(),
        Arc::new(controller),
        Arc::new(DirectoryProvider),
        Arc::new(presence),
        Arc::new(executor),
    )
}

pub(crate) const RPM_LISTING: &str = "aaa_base-11.1-10.1\nbash-3.2-147.3\nzypper-1.0.1-1.1\n\n";

/// A guest tree wired to fakes, ready for an [`Orchestrator`].
pub(crate) struct Harness {
    _host: TempDir,
    pub tree: GuestTree,
    pub image: DiskImage,
    pub controller: FakeController,
    pub provider: CountingProvider,
    pub executor: ScriptedExecutor,
    presence: FakePresence,
    options: PrepOptions,
    family: Arc<dyn GuestFamily>,
}

impl Harness {
    /// SUSE guest that answers at once and obeys shutdown.
    pub fn new() -> Self {
        Self::with_executor(|e| e)
    }

    /// Red Hat guest, otherwise like [`with_executor`](Self::with_executor).
    pub fn redhat(script: impl FnOnce(ScriptedExecutor) -> ScriptedExecutor) -> Self {
        let mut harness = Self::with_executor(script);
        harness.tree = GuestTree::redhat();
        harness.image = DiskImage::new(harness.tree.root(), DiskFormat::Raw);
        harness.family = Arc::new(RedHat);
        harness
    }

    /// Like [`new`](Self::new) with extra executor scripting.
    pub fn with_executor(script: impl FnOnce(ScriptedExecutor) -> ScriptedExecutor) -> Self {
        let controller = FakeController::new();
        let executor = script(
            ScriptedExecutor::new()
                .respond("rpm -qa", RPM_LISTING)
                .stopping(controller.clone()),
        );
        Self::build(
            controller,
            FakePresence::immediately("192.168.122.45".parse().unwrap()),
            executor,
        )
    }

    /// Guest never reports an address; boot gives up after one poll.
    pub fn unreachable() -> Self {
        let controller = FakeController::new();
        let mut harness = Self::build(controller, FakePresence::never(), ScriptedExecutor::new());
        harness.options.timeouts.boot_secs = 0;
        harness
    }

    fn build(
        controller: FakeController,
        presence: FakePresence,
        executor: ScriptedExecutor,
    ) -> Self {
        let host = TempDir::new().unwrap();
        let keys = host.path().join("keys");
        std::fs::create_dir_all(&keys).unwrap();
        std::fs::write(keys.join("id_rsa"), "PRIVATE\n").unwrap();
        std::fs::write(keys.join("id_rsa.pub"), "ssh-rsa AAAA guestprep\n").unwrap();
        let helper = host.path().join("guestprep-announce");
        std::fs::write(&helper, "#!/bin/sh\n").unwrap();

        let mut options = test_options();
        options.access.private_key = Some(keys.join("id_rsa"));
        options.announce.helper_binary = Some(helper);

        let tree = GuestTree::suse();
        let image = DiskImage::new(tree.root(), DiskFormat::Raw);
        Self {
            _host: host,
            tree,
            image,
            controller,
            provider: CountingProvider::default(),
            executor,
            presence,
            options,
            family: Arc::new(Suse),
        }
    }

    pub fn orchestrator(&self) -> Orchestrator {
        let ctx = PrepContext::with_collaborators(
            self.options.clone(),
            Arc::new(self.controller.clone()),
            Arc::new(self.provider.clone()),
            Arc::new(self.presence.clone()),
            Arc::new(self.executor.clone()),
        );
        Orchestrator::new(ctx, Arc::clone(&self.family))
    }
}
