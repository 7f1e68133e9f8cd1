//! Lock-resilient file opening.
//!
//! [`FileArbiter`] opens a file and keeps retrying while another process holds an
//! incompatible lock on it. Contention is recognised from:
//! - the Windows sharing/lock violation codes (32 and 33) reported by the open itself
//! - `WouldBlock` from the advisory lock taken right after opening
//!   (shared for readers, exclusive for writers)
//!
//! Every other failure propagates immediately. Cancellation is checked before each
//! attempt and makes the call return `Ok(None)`; an attempt already in progress is
//! never interrupted.

use camino::{Utf8Path, Utf8PathBuf};
use fs4::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[cfg(windows)]
const SHARING_VIOLATION: i32 = 32;
#[cfg(windows)]
const LOCK_VIOLATION: i32 = 33;

/// How the file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// The file must already exist.
    Open,
    /// Create the file, truncating any existing content once the lock is held.
    Create,
    /// Open the file, creating it empty if missing.
    OpenOrCreate,
}

/// What the caller intends to do with the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Access {
    pub fn reads(self) -> bool {
        matches!(self, Access::Read | Access::ReadWrite)
    }

    pub fn writes(self) -> bool {
        matches!(self, Access::Write | Access::ReadWrite)
    }
}

/// Retry schedule used while a file is contended.
///
/// The delay starts at `initial_delay` and grows by `backoff_factor` after every
/// contended attempt, capped at `max_delay`. With `timeout: None` the arbiter waits
/// for as long as the file stays locked.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    pub timeout: Option<Duration>,
}

impl RetryPolicy {
    /// Retry forever at a fixed ~60 Hz cadence.
    pub fn indefinite() -> Self {
        Self {
            initial_delay: Duration::from_millis(16),
            max_delay: Duration::from_millis(16),
            backoff_factor: 1.0,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn next_delay(&self, current: Duration) -> Duration {
        current.mul_f64(self.backoff_factor.max(1.0)).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(16),
            max_delay: Duration::from_millis(250),
            backoff_factor: 1.5,
            timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// Errors surfaced by [`FileArbiter`]. Contention itself never is, unless it
/// outlasts the policy's timeout.
#[derive(Error, Debug)]
pub enum ArbiterError {
    #[error("Timed out after {waited:?} waiting for access to {path}")]
    TimedOut { path: Utf8PathBuf, waited: Duration },

    #[error("Failed to access {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Blocking file task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// True when the error means another process currently holds an incompatible lock.
pub fn is_contention(error: &io::Error) -> bool {
    #[cfg(windows)]
    {
        if matches!(error.raw_os_error(), Some(SHARING_VIOLATION | LOCK_VIOLATION)) {
            return true;
        }
    }

    error.kind() == ErrorKind::WouldBlock
}

enum Attempt {
    Opened(File),
    Contended,
}

fn try_open(path: &Utf8Path, mode: OpenMode, access: Access) -> io::Result<Attempt> {
    if mode != OpenMode::Open && !access.writes() {
        return Err(io::Error::new(
            ErrorKind::InvalidInput,
            "creating a file requires write access",
        ));
    }

    let mut options = OpenOptions::new();
    options.read(access.reads()).write(access.writes());
    if mode != OpenMode::Open {
        options.create(true);
    }

    let file = match options.open(path) {
        Ok(file) => file,
        Err(e) if is_contention(&e) => return Ok(Attempt::Contended),
        Err(e) => return Err(e),
    };

    let locked = if access.writes() {
        FileExt::try_lock_exclusive(&file)
    } else {
        FileExt::try_lock_shared(&file)
    };
    match locked {
        Ok(()) => {}
        Err(e) if is_contention(&e) => return Ok(Attempt::Contended),
        Err(e) => return Err(e),
    }

    // Truncate only once we own the lock so a contended writer never clobbers the file.
    if mode == OpenMode::Create {
        file.set_len(0)?;
    }

    Ok(Attempt::Opened(file))
}

/// The handle must actually support what was asked for: readers need a regular
/// file (a directory opens fine for reading on Unix), writers a non read-only one.
fn supports_access(file: &File, access: Access) -> io::Result<bool> {
    let metadata = file.metadata()?;
    if !metadata.is_file() {
        return Ok(false);
    }
    if access.writes() && metadata.permissions().readonly() {
        return Ok(false);
    }
    Ok(true)
}

/// Tracks elapsed time and the current delay across contended attempts.
struct RetryState<'a> {
    policy: &'a RetryPolicy,
    started: Instant,
    delay: Duration,
    attempts: u32,
}

impl<'a> RetryState<'a> {
    fn new(policy: &'a RetryPolicy) -> Self {
        Self {
            policy,
            started: Instant::now(),
            delay: policy.initial_delay,
            attempts: 0,
        }
    }

    /// Delay to wait before the next attempt, or `TimedOut` once the budget is spent.
    fn on_contended(&mut self, path: &Utf8Path) -> Result<Duration, ArbiterError> {
        self.attempts += 1;
        let waited = self.started.elapsed();

        if let Some(timeout) = self.policy.timeout {
            if waited >= timeout {
                tracing::warn!(
                    "Gave up on {} after {} contended attempts ({:?})",
                    path,
                    self.attempts,
                    waited
                );
                return Err(ArbiterError::TimedOut {
                    path: path.to_path_buf(),
                    waited,
                });
            }
        }

        tracing::debug!(
            "{} is locked by another process (attempt {}), retrying in {:?}",
            path,
            self.attempts,
            self.delay
        );

        let delay = self.delay;
        self.delay = self.policy.next_delay(self.delay);
        Ok(delay)
    }
}

/// Opens files once they are not locked by anyone else.
#[derive(Debug, Clone, Default)]
pub struct FileArbiter {
    policy: RetryPolicy,
}

impl FileArbiter {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Open `path`, retrying while it is contended.
    ///
    /// # Returns
    /// - `Ok(Some(file))` once opened, locked and verified for `access`
    /// - `Ok(None)` if cancelled or the handle does not support `access`
    /// - `Err(_)` for any non-contention failure or an exhausted timeout
    pub fn open_when_accessible(
        &self,
        path: &Utf8Path,
        mode: OpenMode,
        access: Access,
        cancel: &CancellationToken,
    ) -> Result<Option<File>, ArbiterError> {
        let mut retry = RetryState::new(&self.policy);

        loop {
            if cancel.is_cancelled() {
                tracing::debug!("Open of {} cancelled", path);
                return Ok(None);
            }

            let attempt = try_open(path, mode, access).map_err(|source| ArbiterError::Io {
                path: path.to_path_buf(),
                source,
            })?;

            match attempt {
                Attempt::Opened(file) => return verify(file, path, access),
                Attempt::Contended => {
                    let delay = retry.on_contended(path)?;
                    std::thread::sleep(delay);
                }
            }
        }
    }

    /// Async twin of [`open_when_accessible`](Self::open_when_accessible).
    ///
    /// Attempts run on the blocking pool; the wait between attempts also wakes up
    /// early on cancellation.
    pub async fn open_when_accessible_async(
        &self,
        path: &Utf8Path,
        mode: OpenMode,
        access: Access,
        cancel: &CancellationToken,
    ) -> Result<Option<tokio::fs::File>, ArbiterError> {
        let mut retry = RetryState::new(&self.policy);

        loop {
            if cancel.is_cancelled() {
                tracing::debug!("Open of {} cancelled", path);
                return Ok(None);
            }

            let owned_path = path.to_path_buf();
            let attempt = tokio::task::spawn_blocking(move || {
                let attempt = try_open(&owned_path, mode, access)?;
                match attempt {
                    Attempt::Opened(file) => {
                        let supported = supports_access(&file, access)?;
                        Ok((Attempt::Opened(file), supported))
                    }
                    Attempt::Contended => Ok((Attempt::Contended, false)),
                }
            })
            .await?
            .map_err(|source| ArbiterError::Io {
                path: path.to_path_buf(),
                source,
            })?;

            match attempt {
                (Attempt::Opened(file), true) => return Ok(Some(tokio::fs::File::from_std(file))),
                (Attempt::Opened(_), false) => {
                    tracing::warn!("{} does not support {:?} access", path, access);
                    return Ok(None);
                }
                (Attempt::Contended, _) => {
                    let delay = retry.on_contended(path)?;
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            tracing::debug!("Open of {} cancelled while waiting", path);
                            return Ok(None);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}

fn verify(file: File, path: &Utf8Path, access: Access) -> Result<Option<File>, ArbiterError> {
    let supported = supports_access(&file, access).map_err(|source| ArbiterError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    if supported {
        Ok(Some(file))
    } else {
        tracing::warn!("{} does not support {:?} access", path, access);
        Ok(None)
    }
}
