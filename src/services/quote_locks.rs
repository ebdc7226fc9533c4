use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Per-quote async locks. Quotes are independent aggregates, so there is no
/// cross-quote locking; entries are dropped once no task holds or awaits them.
#[derive(Debug, Clone, Default)]
pub struct QuoteLocks {
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl QuoteLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, quote_id: Uuid) -> QuoteLockGuard {
        let mutex = self.locks.entry(quote_id).or_default().clone();
        let guard = mutex.lock_owned().await;
        QuoteLockGuard {
            locks: Arc::clone(&self.locks),
            quote_id,
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.len()
    }
}

pub struct QuoteLockGuard {
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
    quote_id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for QuoteLockGuard {
    fn drop(&mut self) {
        // The owned guard keeps its own Arc; release it before checking for waiters.
        self.guard.take();
        self.locks
            .remove_if(&self.quote_id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_quote_is_serialized() {
        let locks = QuoteLocks::new();
        let quote_id = Uuid::new_v4();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let inside = inside.clone();
                let max_inside = max_inside.clone();
                tokio::spawn(async move {
                    let _guard = locks.acquire(quote_id).await;
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn different_quotes_do_not_block_each_other() {
        let locks = QuoteLocks::new();
        let _first = locks.acquire(Uuid::new_v4()).await;
        let second = tokio::time::timeout(
            Duration::from_millis(100),
            locks.acquire(Uuid::new_v4()),
        )
        .await;
        assert!(second.is_ok());
    }
}
