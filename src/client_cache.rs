//! Per-host transport client cache.
//!
//! Each destination host gets exactly one client for the life of the cache.
//! The first caller for a host builds it; concurrent callers for the same
//! host wait on the same `OnceCell` instead of building their own. A failed
//! build drops the host's entry unless another caller is waiting on it, so
//! unreachable hosts do not accumulate and a later call can try again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;

use crate::error::Result;
use crate::transport::{ClientConfig, Transport, TransportClient};

type Slot = Arc<OnceCell<Arc<dyn TransportClient>>>;

/// Host -> client map, safe to share across tasks.
pub struct ClientCache {
    transport: Arc<dyn Transport>,
    clients: Mutex<HashMap<String, Slot>>,
}

impl ClientCache {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Client for `host`, building it from `config` on first use.
    ///
    /// On a hit `config` is ignored: the client keeps the configuration it
    /// was built with.
    pub async fn get_or_create(
        &self,
        host: &str,
        config: &ClientConfig,
    ) -> Result<Arc<dyn TransportClient>> {
        let slot = self.slot(host);
        if let Some(client) = slot.get() {
            tracing::debug!(host = %host, "Client cache hit");
            return Ok(Arc::clone(client));
        }

        let client = slot
            .get_or_try_init(|| async {
                tracing::debug!(host = %host, "Client cache miss, building client");
                self.transport.build_client(config)
            })
            .await;
        match client {
            Ok(client) => Ok(Arc::clone(client)),
            Err(e) => {
                tracing::debug!(host = %host, error = %e, "Client construction failed");
                self.evict_empty(host, &slot);
                Err(e)
            }
        }
    }

    /// Number of hosts with a built client.
    pub fn len(&self) -> usize {
        self.lock().values().filter(|slot| slot.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `host` has a built client.
    pub fn contains(&self, host: &str) -> bool {
        self.lock()
            .get(host)
            .is_some_and(|slot| slot.initialized())
    }

    fn slot(&self, host: &str) -> Slot {
        Arc::clone(self.lock().entry(host.to_string()).or_default())
    }

    /// Remove `host` if it still maps to `slot`, the cell is empty and no
    /// other caller holds it. Clones are only made under the lock, so the
    /// count cannot grow while it is checked.
    fn evict_empty(&self, host: &str, slot: &Slot) {
        let mut clients = self.lock();
        let idle = clients.get(host).is_some_and(|current| {
            Arc::ptr_eq(current, slot) && !slot.initialized() && Arc::strong_count(slot) == 2
        });
        if idle {
            clients.remove(host);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot>> {
        // Every mutation is a single insert or remove; a poisoned lock still holds a valid map.
        self.clients.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::transport::{BoxFuture, RawResponse, TransportProfile, WireRequest};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct StubClient;

    impl TransportClient for StubClient {
        fn send(&self, _request: WireRequest) -> BoxFuture<'_, Result<RawResponse>> {
            Box::pin(async { Err(Error::http_protocol("stub")) })
        }
    }

    /// Fails the first `failures` builds, then succeeds.
    struct FlakyTransport {
        builds: AtomicUsize,
        failures: usize,
    }

    impl Transport for FlakyTransport {
        fn build_client(&self, _config: &ClientConfig) -> Result<Arc<dyn TransportClient>> {
            let n = self.builds.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(Error::client_construction("flaky"));
            }
            Ok(Arc::new(StubClient))
        }
    }

    fn config() -> ClientConfig {
        ClientConfig {
            profile: TransportProfile::default(),
            timeout: Duration::from_secs(1),
            follow_redirects: true,
            proxy: None,
        }
    }

    #[tokio::test]
    async fn test_same_host_reuses_client() {
        let transport = Arc::new(FlakyTransport {
            builds: AtomicUsize::new(0),
            failures: 0,
        });
        let cache = ClientCache::new(transport.clone());

        let a = cache.get_or_create("example.com", &config()).await.unwrap();
        let b = cache.get_or_create("example.com", &config()).await.unwrap();
        let c = cache.get_or_create("example.org", &config()).await.unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(transport.builds.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_build_can_be_retried() {
        let cache = ClientCache::new(Arc::new(FlakyTransport {
            builds: AtomicUsize::new(0),
            failures: 1,
        }));

        let err = cache.get_or_create("example.com", &config()).await;
        assert!(matches!(err, Err(Error::ClientConstruction(_))));
        assert!(!cache.contains("example.com"));
        assert!(cache.is_empty());

        assert!(cache.get_or_create("example.com", &config()).await.is_ok());
        assert!(cache.contains("example.com"));
    }

    #[tokio::test]
    async fn test_failed_hosts_leave_no_entries() {
        let cache = ClientCache::new(Arc::new(FlakyTransport {
            builds: AtomicUsize::new(0),
            failures: usize::MAX,
        }));

        for i in 0..50 {
            let host = format!("down-{}.example", i);
            assert!(cache.get_or_create(&host, &config()).await.is_err());
        }
        assert!(cache.lock().is_empty());
    }
}
