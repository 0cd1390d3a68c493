use common::{Error, Result};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Admission limit for sessions against the table store.
///
/// Callers beyond `size` wait in FIFO order; nobody is turned away.
#[derive(Clone)]
pub struct ConnectionPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl ConnectionPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// The session lasts as long as the returned permit.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit> {
        if self.permits.available_permits() == 0 {
            debug!(pool_size = self.size, "Connection pool exhausted, queueing");
        }
        Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| Error::Other("connection pool closed".to_string()))
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[tokio::test]
    async fn test_waiters_are_admitted_in_arrival_order() {
        let pool = ConnectionPool::new(1);
        let log = Arc::new(Mutex::new(Vec::new()));
        let held = pool.acquire().await.unwrap();

        let mut handles = Vec::new();
        for name in ["first", "second", "third"] {
            let pool = pool.clone();
            let log = Arc::clone(&log);
            handles.push(tokio::spawn(async move {
                let _session = pool.acquire().await.unwrap();
                log.lock().unwrap().push(name);
            }));
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(log.lock().unwrap().is_empty());
        drop(held);
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_pool_never_exceeds_size() {
        let pool = ConnectionPool::new(2);
        let a = pool.acquire().await.unwrap();
        let _b = pool.acquire().await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(20), pool.acquire()).await;
        assert!(blocked.is_err());

        drop(a);
        let admitted = tokio::time::timeout(Duration::from_millis(20), pool.acquire()).await;
        assert!(admitted.is_ok());
    }

    #[test]
    fn test_zero_size_is_clamped() {
        assert_eq!(ConnectionPool::new(0).size(), 1);
    }
}
