// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-address job queue serializing all operations touching the same session record.
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

static GLOBAL_LOCK: LazyLock<SessionLock> = LazyLock::new(SessionLock::new);

/// Keyed lock running jobs with the same key one after another, in the order they were
/// submitted. Jobs with different keys run independently.
///
/// Every session operation loads the record from the store, modifies it and writes it back. Two
/// interleaving operations on the same record would lose each others writes, this lock rules that
/// out as long as all session builders and ciphers touching a store share it.
///
/// Entries of keys without pending jobs are removed, the lock does not grow with the number of
/// addresses seen over its lifetime.
#[derive(Clone, Debug, Default)]
pub struct SessionLock {
    inner: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl SessionLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide lock, used by session builders and ciphers unless configured otherwise.
    pub fn global() -> Self {
        GLOBAL_LOCK.clone()
    }

    /// Waits until all previously submitted jobs for this key are done.
    ///
    /// The key stays locked until the returned guard is dropped. Waiting jobs are woken up in
    /// FIFO order.
    pub async fn acquire(&self, key: &str) -> SessionLockGuard {
        let mutex = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner
                .entry(key.to_owned())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        // Exists while waiting as well, dropping this future cleans up the entry.
        let mut guard = SessionLockGuard {
            key: key.to_owned(),
            guard: None,
            inner: self.inner.clone(),
        };
        let lock = mutex.lock_owned();
        guard.guard = Some(lock.await);
        guard
    }

    /// Runs the job once all previously submitted jobs for this key are done.
    ///
    /// A failing job does not affect jobs queued after it.
    pub async fn run_exclusive<F, T>(&self, key: &str, job: F) -> T
    where
        F: Future<Output = T>,
    {
        let _guard = self.acquire(key).await;
        job.await
    }

    /// Number of keys with running or waiting jobs.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Holds the lock for one key, releases it on drop.
///
/// The entry of the key is removed once no other guard holds or waits for it.
#[derive(Debug)]
pub struct SessionLockGuard {
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
    inner: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl Drop for SessionLockGuard {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        // Release the lock while holding the map, nobody can clone the entry in between. Without
        // guard the acquiring future was dropped while waiting.
        self.guard.take();

        let unused = inner
            .get(&self.key)
            .is_some_and(|mutex| Arc::strong_count(mutex) == 1);
        if unused {
            inner.remove(&self.key);
        }
    }
}
