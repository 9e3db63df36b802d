//! Per-username mutual exclusion.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Serialises create/delete/download for the same username.
///
/// Entries are held weakly and pruned once nobody holds or waits on them.
#[derive(Debug, Default)]
pub struct UserLocks {
    locks: Mutex<HashMap<String, Weak<Mutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `username`.
    pub async fn lock(&self, username: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|_, weak| weak.strong_count() > 0);
            match locks.get(username).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(Mutex::new(()));
                    locks.insert(username.to_string(), Arc::downgrade(&lock));
                    lock
                }
            }
        };
        lock.lock_owned().await
    }

    /// Usernames currently locked or awaited.
    pub async fn held(&self) -> usize {
        let locks = self.locks.lock().await;
        locks.values().filter(|w| w.strong_count() > 0).count()
    }
}
