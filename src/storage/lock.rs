//! Per-key write serialization
//!
//! Each storage key gets its own async mutex, so read-modify-write cycles on
//! one key run one at a time in call order while different keys proceed
//! independently. A store-wide write guard excludes every key writer for
//! operations that touch all keys at once.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// Held while writing one key
#[derive(Debug)]
pub struct KeyGuard {
    _key: OwnedMutexGuard<()>,
    _store: OwnedRwLockReadGuard<()>,
}

/// Held while writing every key
#[derive(Debug)]
pub struct StoreGuard {
    _store: OwnedRwLockWriteGuard<()>,
}

#[derive(Debug, Default)]
pub struct KeyLocks {
    keys: DashMap<String, Arc<Mutex<()>>>,
    store: Arc<RwLock<()>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive write access to `key`
    pub async fn lock(&self, key: &str) -> KeyGuard {
        let store = self.store.clone().read_owned().await;
        let mutex = self
            .keys
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        KeyGuard {
            _key: mutex.lock_owned().await,
            _store: store,
        }
    }

    /// Wait until no key writer is active and block new ones
    pub async fn lock_all(&self) -> StoreGuard {
        StoreGuard {
            _store: self.store.clone().write_owned().await,
        }
    }

    /// Number of keys that have ever been locked
    pub fn tracked_keys(&self) -> usize {
        self.keys.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_writers_run_in_call_order() {
        let locks = Arc::new(KeyLocks::new());
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));

        let first = locks.lock("a").await;
        let mut tasks = Vec::new();
        for i in 0..5 {
            let locks = locks.clone();
            let log = log.clone();
            tasks.push(tokio::spawn(async move {
                let _g = locks.lock("a").await;
                log.lock().unwrap().push(i);
            }));
            // let each task reach the queue before the next one
            tokio::task::yield_now().await;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        drop(first);
        for t in tasks {
            t.await.unwrap();
        }
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = KeyLocks::new();
        let _a = locks.lock("a").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock("b")).await;
        assert!(b.is_ok());
        assert_eq!(locks.tracked_keys(), 2);
    }

    #[tokio::test]
    async fn lock_all_waits_for_key_writers() {
        let locks = Arc::new(KeyLocks::new());
        let held = locks.lock("a").await;
        let blocked = tokio::time::timeout(Duration::from_millis(50), locks.lock_all()).await;
        assert!(blocked.is_err());
        drop(held);
        let all = tokio::time::timeout(Duration::from_millis(100), locks.lock_all()).await;
        assert!(all.is_ok());
    }
}
