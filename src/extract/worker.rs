//! The producer/consumer pipeline for regular-file bodies (spec 4.6
//! Concurrency model). The tar reader (producer) runs on the calling
//! thread; a fixed-size pool of workers each own a private map of
//! target path -> open file handle, so no path is ever touched by two
//! workers at once.

use std::collections::HashMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fxhash::FxHashMap;

use crate::error::UpdaterError;
use crate::fs::FileSystem;

/// One chunk of a regular file's body, handed from producer to worker.
pub struct WorkItem {
    pub target: PathBuf,
    pub bytes: Vec<u8>,
    pub mode: u32,
    pub eof: bool,
}

/// Shared cancellation token: workers poll it on every dequeue and
/// before every syscall (spec 9, Cooperative cancellation).
#[derive(Clone)]
pub struct CancelToken(std::sync::Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken(std::sync::Arc::new(AtomicBool::new(false)))
    }
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

pub struct WorkerPool {
    sender: SyncSender<WorkItem>,
    cancel: CancelToken,
}

impl WorkerPool {
    /// Spawns `workers` threads pulling from a channel of capacity
    /// `2 * workers`, scoped to `scope` so they can run for the
    /// duration of one `Extract` call and then be joined before it
    /// returns. `chmod_timeout_hard_fail` controls whether a chmod
    /// deadline breach aborts the pipeline or is merely logged.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn<'scope, 'env>(
        scope: &'scope std::thread::Scope<'scope, 'env>,
        fs: &'env dyn FileSystem,
        workers: usize,
        chmod_timeout_hard_fail: bool,
        errors: &'env Mutex<Vec<UpdaterError>>,
    ) -> (Self, Receiver<()>)
    where
        'env: 'scope,
    {
        let workers = workers.max(1);
        let (tx, rx) = mpsc::sync_channel::<WorkItem>(2 * workers);
        let rx = Arc::new(Mutex::new(rx));
        let cancel = CancelToken::new();
        let (done_tx, done_rx) = mpsc::sync_channel::<()>(workers);

        for _ in 0..workers {
            let rx = rx.clone();
            let cancel = cancel.clone();
            let done_tx = done_tx.clone();
            scope.spawn(move || {
                run_worker(scope, fs, rx, cancel, chmod_timeout_hard_fail, errors);
                let _ = done_tx.send(());
            });
        }

        (WorkerPool { sender: tx, cancel }, done_rx)
    }

    pub fn send(&self, item: WorkItem) -> Result<(), UpdaterError> {
        self.sender
            .send(item)
            .map_err(|_| UpdaterError::InternalInvariant("extractor worker pool closed early".into()))
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Drops the sender so workers observe channel closure and exit
    /// once their queues drain.
    pub fn finish(self) {
        drop(self.sender);
    }
}

fn run_worker<'scope, 'env>(
    scope: &'scope std::thread::Scope<'scope, 'env>,
    fs: &'env dyn FileSystem,
    rx: Arc<Mutex<Receiver<WorkItem>>>,
    cancel: CancelToken,
    chmod_timeout_hard_fail: bool,
    errors: &'env Mutex<Vec<UpdaterError>>,
) where
    'env: 'scope,
{
    let mut open_files: FxHashMap<PathBuf, Box<dyn std::io::Write + Send>> = HashMap::default();

    loop {
        if cancel.is_cancelled() {
            break;
        }
        let item = {
            let guard = rx.lock().unwrap();
            guard.recv()
        };
        let Ok(item) = item else { break };
        if cancel.is_cancelled() {
            break;
        }

        if let Err(e) = handle_item(scope, fs, &mut open_files, item, chmod_timeout_hard_fail) {
            errors.lock().unwrap().push(e);
            cancel.cancel();
            break;
        }
    }

    // Cancellation teardown: close any handle still open without
    // applying chmod (spec 4.6 Cancellation semantics).
    drop(open_files);
}

#[allow(clippy::too_many_arguments)]
fn handle_item<'scope, 'env>(
    scope: &'scope std::thread::Scope<'scope, 'env>,
    fs: &'env dyn FileSystem,
    open_files: &mut FxHashMap<PathBuf, Box<dyn std::io::Write + Send>>,
    item: WorkItem,
    chmod_timeout_hard_fail: bool,
) -> Result<(), UpdaterError>
where
    'env: 'scope,
{
    let WorkItem { target, bytes, mode, eof } = item;

    if !open_files.contains_key(&target) {
        if let Some(parent) = target.parent() {
            fs.create_dir_all(parent)?;
        }
        let file = fs.create_file(&target)?;
        open_files.insert(target.clone(), file);
    }

    if !bytes.is_empty() {
        let file = open_files.get_mut(&target).expect("just inserted above");
        file.write_all(&bytes).map_err(|e| UpdaterError::FilesystemFailure {
            op: "write",
            path: target.clone(),
            source: e,
        })?;
    }

    if eof {
        if let Some(mut file) = open_files.remove(&target) {
            let _ = file.flush();
            drop(file);
        }
        apply_chmod_with_deadline(scope, fs, &target, mode, chmod_timeout_hard_fail)?;
    }

    Ok(())
}

/// Applies a chmod with a 5s deadline (spec 4.6). The OS call itself is
/// not interruptible, so the deadline is observed by racing it against a
/// scoped watchdog thread; on timeout this either hard-fails or logs and
/// continues, per `chmod_timeout_hard_fail`. Goes through `fs` rather
/// than a raw `std::fs` call, the same as every other write in the
/// extractor, so the watchdog path is exercisable against an in-memory
/// filesystem.
pub(super) fn apply_chmod_with_deadline<'scope, 'env>(
    scope: &'scope std::thread::Scope<'scope, 'env>,
    fs: &'env dyn FileSystem,
    path: &Path,
    mode: u32,
    hard_fail: bool,
) -> Result<(), UpdaterError>
where
    'env: 'scope,
{
    let (tx, rx) = mpsc::channel();
    let path_owned = path.to_path_buf();
    scope.spawn(move || {
        let result = fs.set_permissions(&path_owned, mode);
        let _ = tx.send(result);
    });

    match rx.recv_timeout(Duration::from_secs(5)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e),
        Err(_timeout) => {
            if hard_fail {
                Err(UpdaterError::FilesystemFailure {
                    op: "chmod",
                    path: path.to_path_buf(),
                    source: std::io::Error::new(std::io::ErrorKind::TimedOut, "chmod timed out after 5s"),
                })
            } else {
                log::warn!(
                    "chmod on {} timed out after 5s; leaving write-creation mode in place",
                    path.display()
                );
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_reports_its_own_state() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_token_clones_share_state() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
