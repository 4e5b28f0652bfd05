//! Per-thread scratch directories for elastix runs.
//!
//! Each (process, thread) pair gets one directory under
//! `<temp>/elastix-rs/`, named `pid<PID>_t<SLOT>`. It is created on first
//! use, reused by later calls on the same thread, and removed when the
//! thread exits or [`Workspace::teardown`] is called. Directories left
//! behind by dead processes are pruned the first time a process creates
//! its own.

use std::cell::OnceCell;
use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Once;

use tracing::{debug, info, warn};

use crate::consts::{WORKSPACE_DIR_NAME, WORKSPACE_PID_PREFIX};
use crate::error::Result;

static NEXT_THREAD_SLOT: AtomicU64 = AtomicU64::new(0);
static PRUNE_ONCE: Once = Once::new();

/// Owns the thread's directory and removes it when the thread exits.
struct ThreadDir {
    path: PathBuf,
}

impl Drop for ThreadDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

thread_local! {
    static THREAD_SLOT: u64 = NEXT_THREAD_SLOT.fetch_add(1, Ordering::Relaxed);
    static TEMPDIR: OnceCell<ThreadDir> = const { OnceCell::new() };
}

fn thread_dir_name() -> String {
    let slot = THREAD_SLOT.with(|s| *s);
    format!("{}{}_t{}", WORKSPACE_PID_PREFIX, process::id(), slot)
}

/// Root directory holding every process's workspaces.
pub fn workspace_root() -> PathBuf {
    env::temp_dir().join(WORKSPACE_DIR_NAME)
}

/// Scratch directory of the calling thread, created on the first call.
///
/// Repeated calls from one thread return the same path; different threads
/// and processes get different paths.
pub fn get_tempdir() -> Result<PathBuf> {
    TEMPDIR.with(|cell| {
        if let Some(dir) = cell.get() {
            return Ok(dir.path.clone());
        }

        let root = workspace_root();
        fs::create_dir_all(&root)?;
        PRUNE_ONCE.call_once(|| match prune_stale(&root) {
            Ok(0) => {}
            Ok(n) => debug!(removed = n, "Pruned stale workspaces"),
            Err(e) => warn!("Could not prune stale workspaces: {}", e),
        });

        let path = root.join(thread_dir_name());
        fs::create_dir_all(&path)?;
        debug!(path = %path.display(), "Created workspace");
        let _ = cell.set(ThreadDir { path: path.clone() });
        Ok(path)
    })
}

/// Remove `pid*` directories under `root` whose process has exited.
///
/// Returns the number of directories removed. Liveness is only checkable on
/// Linux; elsewhere nothing is removed.
pub fn prune_stale(root: &Path) -> Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(pid) = name.to_str().and_then(owner_pid) else {
            continue;
        };
        if pid == process::id() || process_alive(pid) {
            continue;
        }
        match fs::remove_dir_all(entry.path()) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(removed)
}

/// Parse the owning pid out of a `pid<PID>_t<SLOT>` (or `pid<PID>`) name.
fn owner_pid(name: &str) -> Option<u32> {
    let rest = name.strip_prefix(WORKSPACE_PID_PREFIX)?;
    let digits = rest.split('_').next()?;
    digits.parse().ok()
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    true
}

/// Handle on the scratch area, passed explicitly to the orchestrator.
///
/// The handle names a root, not a directory: every method works on the
/// calling thread's `pid<PID>_t<SLOT>` directory under that root, so one
/// handle shared between threads still gives each thread its own files.
#[derive(Clone, Debug)]
pub struct Workspace {
    root: Option<PathBuf>,
}

impl Workspace {
    /// Directories under [`workspace_root`], as returned by [`get_tempdir`].
    /// They are removed when their thread exits.
    pub fn for_current_thread() -> Self {
        Self { root: None }
    }

    /// Per-process, per-thread directories under a caller-chosen root.
    pub fn in_root(root: &Path) -> Self {
        Self {
            root: Some(root.to_path_buf()),
        }
    }

    /// The calling thread's directory. It may not exist yet.
    pub fn path(&self) -> PathBuf {
        match self.root {
            Some(ref root) => root.join(thread_dir_name()),
            None => workspace_root().join(thread_dir_name()),
        }
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.path().join(name)
    }

    /// Create the calling thread's directory if needed and return it.
    pub fn create(&self) -> Result<PathBuf> {
        match self.root {
            Some(_) => {
                let dir = self.path();
                fs::create_dir_all(&dir)?;
                Ok(dir)
            }
            None => {
                // Also re-creates the directory if something removed it.
                let dir = get_tempdir()?;
                fs::create_dir_all(&dir)?;
                Ok(dir)
            }
        }
    }

    /// True when the directory is missing or has no entries.
    pub fn is_empty(&self) -> bool {
        fs::read_dir(self.path())
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(true)
    }

    /// Delete everything inside the directory, keeping the directory itself.
    pub fn clear(&self) -> Result<()> {
        clear_dir(&self.path())
    }

    /// Start a run on the calling thread: the directory is emptied now and
    /// again when the returned guard drops, unless
    /// [`WorkspaceSession::keep`] is called.
    pub fn session(&self) -> Result<WorkspaceSession> {
        let dir = self.create()?;
        clear_dir(&dir)?;
        Ok(WorkspaceSession { dir, keep: false })
    }

    /// Remove the calling thread's directory and everything in it.
    pub fn teardown(self) -> Result<()> {
        match fs::remove_dir_all(self.path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn clear_dir(dir: &Path) -> Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let result = if entry.file_type()?.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match result {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Scope of a single run inside the calling thread's directory.
#[derive(Debug)]
pub struct WorkspaceSession {
    dir: PathBuf,
    keep: bool,
}

impl WorkspaceSession {
    /// Leave the run's files in place (e.g. to inspect elastix's log).
    pub fn keep(&mut self) {
        self.keep = true;
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }
}

impl Drop for WorkspaceSession {
    fn drop(&mut self) {
        if self.keep {
            info!(path = %self.dir.display(), "Keeping workspace files");
            return;
        }
        if let Err(e) = clear_dir(&self.dir) {
            warn!(path = %self.dir.display(), "Could not clear workspace: {}", e);
        }
    }
}
