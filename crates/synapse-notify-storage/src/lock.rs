//! Advisory file locks serializing read-modify-write cycles.
//!
//! One lock file sits next to each file it protects (`<file>.lock`). The
//! lock is an OS advisory lock held on an open handle, so it disappears
//! with the holder: a crashed process can never leave a stale lock behind,
//! and the lock file itself is never deleted.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use fs2::FileExt;
use synapse_notify_core::{Error, Result};

/// Lock file protecting `target`.
#[must_use]
pub fn lock_path_for(target: &Path) -> PathBuf {
    let name = target.file_name().unwrap_or_default().to_string_lossy();
    target.with_file_name(format!("{name}.lock"))
}

/// Exclusive advisory lock with bounded, jittered retry.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    timeout: Duration,
    held: Option<File>,
}

impl FileLock {
    /// Create an unacquired lock on `path` with a 5s timeout.
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self {
            path,
            timeout: Duration::from_secs(5),
            held: None,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn is_held(&self) -> bool {
        self.held.is_some()
    }

    /// Acquire the lock, retrying with exponential backoff until `timeout`.
    ///
    /// Always makes at least one attempt, so a zero timeout means "try once".
    pub fn acquire(&mut self) -> Result<()> {
        if self.held.is_some() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let start = Instant::now();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.path)?;

        let mut attempt: u32 = 0;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    if attempt > 0 {
                        tracing::debug!(
                            lock = %self.path.display(),
                            attempts = attempt + 1,
                            waited_ms = start.elapsed().as_millis(),
                            "acquired contended lock"
                        );
                    }
                    self.held = Some(file);
                    return Ok(());
                }
                Err(err) if err.raw_os_error() != fs2::lock_contended_error().raw_os_error() => {
                    return Err(err.into());
                }
                Err(_) => {}
            }

            let elapsed = start.elapsed();
            if elapsed >= self.timeout {
                return Err(Error::LockTimeout {
                    path: self.path.clone(),
                    waited_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                });
            }

            // 10, 20, 40, 80, 160, 160... ms, plus up to 50% jitter so
            // competing writers don't retry in lockstep.
            let base_ms = 10u64 << attempt.min(4);
            let sleep = Duration::from_millis(base_ms + thread_jitter_ms(base_ms / 2 + 1))
                .min(self.timeout.saturating_sub(elapsed))
                .max(Duration::from_millis(1));
            std::thread::sleep(sleep);
            attempt = attempt.saturating_add(1);
        }
    }

    /// Release the lock. Idempotent.
    pub fn release(&mut self) -> Result<()> {
        if let Some(file) = self.held.take() {
            FileExt::unlock(&file)?;
        }
        Ok(())
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

/// Run `f` while holding the advisory lock for `target`.
pub fn with_file_lock<F, T>(target: &Path, timeout: Duration, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    let mut lock = FileLock::new(lock_path_for(target)).with_timeout(timeout);
    lock.acquire()?;
    let result = f();
    lock.release()?;
    result
}

/// Per-thread xorshift jitter in `[0, range)` milliseconds.
fn thread_jitter_ms(range: u64) -> u64 {
    use std::cell::Cell;

    thread_local! {
        static STATE: Cell<u64> = Cell::new({
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .subsec_nanos();
            let tid = format!("{:?}", std::thread::current().id());
            let seed = u64::from(now) ^ (tid.len() as u64).wrapping_mul(0x517c_c1b7_2722_0a95)
                ^ u64::from(std::process::id()).rotate_left(32);
            if seed == 0 { 1 } else { seed }
        });
    }

    if range == 0 {
        return 0;
    }

    STATE.with(|cell| {
        let mut s = cell.get();
        s ^= s << 13;
        s ^= s >> 7;
        s ^= s << 17;
        cell.set(s);
        s % range
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use tempfile::TempDir;

    #[test]
    fn lock_path_appends_suffix() {
        let p = lock_path_for(Path::new("/a/ATLAS_alerts.json"));
        assert_eq!(p, PathBuf::from("/a/ATLAS_alerts.json.lock"));
    }

    #[test]
    fn acquire_and_release() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("x.lock");
        let mut lock = FileLock::new(path.clone());
        lock.acquire().unwrap();
        assert!(lock.is_held());
        assert!(path.exists());
        lock.release().unwrap();
        assert!(!lock.is_held());
        // Lock file is kept for the next holder.
        assert!(path.exists());
    }

    #[test]
    fn second_holder_times_out() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("busy.lock");
        let mut first = FileLock::new(path.clone());
        first.acquire().unwrap();

        let mut second = FileLock::new(path).with_timeout(Duration::from_millis(60));
        let err = second.acquire().unwrap_err();
        assert!(matches!(err, Error::LockTimeout { .. }), "got {err:?}");
        assert!(err.is_retryable());
    }

    #[test]
    fn drop_releases_for_waiter() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("handoff.lock");
        let mut first = FileLock::new(path.clone());
        first.acquire().unwrap();

        let (tx, rx) = mpsc::channel();
        let waiter_path = path.clone();
        let waiter = std::thread::spawn(move || {
            let mut lock = FileLock::new(waiter_path).with_timeout(Duration::from_secs(5));
            tx.send(()).unwrap();
            lock.acquire().map(|()| lock.is_held())
        });

        rx.recv().unwrap();
        std::thread::sleep(Duration::from_millis(30));
        drop(first);
        assert!(waiter.join().unwrap().unwrap());
    }

    #[test]
    fn with_file_lock_returns_closure_result() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("data.json");
        let value = with_file_lock(&target, Duration::from_secs(1), || Ok(7)).unwrap();
        assert_eq!(value, 7);
        assert!(lock_path_for(&target).exists());
    }

    #[test]
    fn jitter_stays_in_range() {
        for _ in 0..100 {
            assert!(thread_jitter_ms(5) < 5);
        }
        assert_eq!(thread_jitter_ms(0), 0);
    }
}
