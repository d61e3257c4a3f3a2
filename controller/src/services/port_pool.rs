//! The port pool (component C): free TCP ports in `[start, end)`, checked
//! out with a bind-probe so two concurrent uploads can't claim the same one.

use std::collections::BTreeSet;
use tokio::{net::TcpListener, sync::Mutex};
use tracing::warn;

pub struct PortPool {
    start: u16,
    end: u16,
    free: Mutex<BTreeSet<u16>>,
}

#[derive(Debug, thiserror::Error)]
#[error("no free ports available")]
pub struct NoCapacity;

impl PortPool {
    pub fn new(start: u16, end: u16) -> Self {
        Self { start, end, free: Mutex::new((start..end).collect()) }
    }

    /// Removes `owned` ports from the pool at startup, for apps the metadata
    /// store still lists as `running` (§4.C).
    pub async fn exclude(&self, owned: impl IntoIterator<Item = u16>) {
        let mut free = self.free.lock().await;
        for port in owned {
            free.remove(&port);
        }
    }

    /// Pops a free port and bind-probes it; on failure the port is dropped
    /// (never re-added — it's owned by some other process) and the next one
    /// is tried. An empty pool is `NoCapacity`.
    pub async fn checkout(&self) -> Result<u16, NoCapacity> {
        let mut free = self.free.lock().await;
        loop {
            let Some(&port) = free.iter().next() else {
                return Err(NoCapacity);
            };
            free.remove(&port);

            match TcpListener::bind(("0.0.0.0", port)).await {
                Ok(_) => return Ok(port),
                Err(e) => {
                    warn!(port, "bind-probe failed, discarding port: {e}");
                }
            }
        }
    }

    /// Re-adds `port` to the pool if it's within range. Out-of-range ports
    /// are silently ignored so callers can unconditionally release.
    pub async fn release(&self, port: u16) {
        if port >= self.start && port < self.end {
            self.free.lock().await.insert(port);
        }
    }

    #[cfg(test)]
    pub async fn remaining(&self) -> usize {
        self.free.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn checkout_and_release_roundtrip() {
        let pool = PortPool::new(20000, 20010);
        let port = pool.checkout().await.unwrap();
        assert!((20000..20010).contains(&port));
        pool.release(port).await;
        assert!(pool.free.lock().await.contains(&port));
    }

    #[tokio::test]
    async fn release_out_of_range_is_ignored() {
        let pool = PortPool::new(20000, 20010);
        let before = pool.remaining().await;
        pool.release(1).await;
        pool.release(99999).await;
        assert_eq!(pool.remaining().await, before);
    }

    #[tokio::test]
    async fn concurrent_checkouts_yield_distinct_ports() {
        // Spec §8 scenario 1: five concurrent callers, pool of ten, all binds succeed.
        let pool = PortPool::new(10000, 10010);
        let mut handles = Vec::new();
        for _ in 0..5 {
            handles.push(pool.checkout().await.unwrap());
        }
        let mut unique: Vec<u16> = handles.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 5);
        assert_eq!(pool.remaining().await, 5);
    }

    #[tokio::test]
    async fn exhausted_pool_fails() {
        let pool = PortPool::new(30000, 30001);
        pool.checkout().await.unwrap();
        assert!(pool.checkout().await.is_err());
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn a_port_already_bound_elsewhere_is_logged_and_discarded() {
        let held = TcpListener::bind(("0.0.0.0", 0)).await.unwrap();
        let port = held.local_addr().unwrap().port();

        let pool = PortPool::new(port, port + 1);
        assert!(pool.checkout().await.is_err());
        assert!(logs_contain("bind-probe failed, discarding port"));
    }
}
