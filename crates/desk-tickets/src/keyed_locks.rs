//! Lazily created per-key async mutexes.

use std::{
    collections::HashMap,
    hash::Hash,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockTable<K> = Arc<Mutex<HashMap<K, Arc<AsyncMutex<()>>>>>;

/// One async mutex per key. Entries are created on first use and removed when
/// the last holder or waiter lets go, so the table only holds contended keys.
#[derive(Debug)]
pub struct KeyedLocks<K> {
    table: LockTable<K>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            table: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Copy + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `key`. Released when the guard drops.
    pub async fn acquire(&self, key: K) -> KeyedLockGuard<K> {
        let lock = Arc::clone(lock_table(&self.table).entry(key).or_default());
        let guard = lock.lock_owned().await;
        KeyedLockGuard {
            key,
            table: Arc::clone(&self.table),
            guard: Some(guard),
        }
    }

    pub fn active_keys(&self) -> usize {
        lock_table(&self.table).len()
    }
}

fn lock_table<K>(table: &LockTable<K>) -> MutexGuard<'_, HashMap<K, Arc<AsyncMutex<()>>>> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
pub struct KeyedLockGuard<K: Eq + Hash> {
    key: K,
    table: LockTable<K>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash> Drop for KeyedLockGuard<K> {
    fn drop(&mut self) {
        let mut table = lock_table(&self.table);
        self.guard.take();
        // Only the table's own handle left: nobody holds or waits on this key.
        if table
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            table.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::atomic::AtomicUsize, sync::atomic::Ordering, time::Duration};

    use super::*;

    #[tokio::test]
    async fn releases_table_entry_after_last_holder() {
        let locks = KeyedLocks::<u64>::new();
        {
            let _guard = locks.acquire(1).await;
            assert_eq!(locks.active_keys(), 1);
        }
        assert_eq!(locks.active_keys(), 0);
    }

    #[tokio::test]
    async fn same_key_is_mutually_exclusive() {
        let locks = Arc::new(KeyedLocks::<u64>::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let tasks = (0..4)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let peak = Arc::clone(&peak);
                tokio::spawn(async move {
                    let _guard = locks.acquire(7).await;
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect::<Vec<_>>();
        for task in tasks {
            task.await.expect("join");
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(locks.active_keys(), 0);
    }

    #[tokio::test]
    async fn different_keys_do_not_contend() {
        let locks = KeyedLocks::<u64>::new();
        let _first = locks.acquire(1).await;
        let second = tokio::time::timeout(Duration::from_millis(50), locks.acquire(2)).await;
        assert!(second.is_ok());
    }
}
