//! Client-to-backend affinity for the sticky router
//!
//! Each client IP is pinned to one backend on first contact, chosen round-robin
//! over the configured list. Entries never expire by time; they are removed
//! only when the pinned backend refuses a connection, so the next connection
//! from that client lands on the next backend in the cycle.

use log::info;
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// A worker process the router forwards to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Backend {
    pub host: String,
    pub port: u16,
}

impl Backend {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("expected host:port, got '{}'", s))?;
        if host.is_empty() {
            return Err(format!("missing host in '{}'", s));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| format!("bad port in '{}': {}", s, e))?;
        Ok(Backend::new(host, port))
    }
}

/// Sticky mapping from client address to backend
pub struct AffinityTable {
    entries: HashMap<IpAddr, Backend>,
    backends: Vec<Backend>,
    next: usize,
}

impl AffinityTable {
    /// Returns `None` when there is nothing to route to.
    pub fn new(backends: Vec<Backend>) -> Option<Self> {
        if backends.is_empty() {
            return None;
        }
        Some(Self {
            entries: HashMap::new(),
            backends,
            next: 0,
        })
    }

    /// Returns the pinned backend, pinning the next one in the cycle if needed.
    pub fn select_backend(&mut self, client: IpAddr) -> Backend {
        if let Some(backend) = self.entries.get(&client) {
            return backend.clone();
        }

        let backend = self.backends[self.next].clone();
        self.next = (self.next + 1) % self.backends.len();
        info!("New client {}, routed to backend {}", client, backend);
        self.entries.insert(client, backend.clone());
        backend
    }

    /// Drops the pin if it still points at `backend`.
    pub fn evict(&mut self, client: IpAddr, backend: &Backend) -> bool {
        if self.entries.get(&client) == Some(backend) {
            self.entries.remove(&client);
            info!("Evicted {} from backend {}", client, backend);
            true
        } else {
            false
        }
    }

    pub fn get(&self, client: IpAddr) -> Option<&Backend> {
        self.entries.get(&client)
    }

    pub fn backends(&self) -> &[Backend] {
        &self.backends
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_backends() -> Vec<Backend> {
        vec![Backend::new("127.0.0.1", 8001), Backend::new("127.0.0.1", 8002)]
    }

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([10, 0, 0, last])
    }

    #[test]
    fn test_backend_parse() {
        let backend: Backend = "127.0.0.1:8001".parse().unwrap();
        assert_eq!(backend, Backend::new("127.0.0.1", 8001));
        assert_eq!(backend.to_string(), "127.0.0.1:8001");

        assert!("127.0.0.1".parse::<Backend>().is_err());
        assert!(":8001".parse::<Backend>().is_err());
        assert!("localhost:99999".parse::<Backend>().is_err());
    }

    #[test]
    fn test_empty_backend_list_rejected() {
        assert!(AffinityTable::new(vec![]).is_none());
    }

    #[test]
    fn test_same_client_sticks() {
        let mut table = AffinityTable::new(two_backends()).unwrap();

        let first = table.select_backend(ip(1));
        for _ in 0..5 {
            assert_eq!(table.select_backend(ip(1)), first);
        }
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_new_clients_round_robin() {
        let mut table = AffinityTable::new(two_backends()).unwrap();

        assert_eq!(table.select_backend(ip(1)).port, 8001);
        assert_eq!(table.select_backend(ip(2)).port, 8002);
        assert_eq!(table.select_backend(ip(3)).port, 8001);
        assert_eq!(table.select_backend(ip(1)).port, 8001);
    }

    #[test]
    fn test_evict_reassigns_on_next_contact() {
        let mut table = AffinityTable::new(two_backends()).unwrap();
        let dead = table.select_backend(ip(1));

        assert!(table.evict(ip(1), &dead));
        assert!(table.get(ip(1)).is_none());

        let fresh = table.select_backend(ip(1));
        assert_ne!(fresh, dead);
        assert_eq!(table.get(ip(1)), Some(&fresh));
    }

    #[test]
    fn test_evict_ignores_stale_backend() {
        let mut table = AffinityTable::new(two_backends()).unwrap();
        let pinned = table.select_backend(ip(1));
        let other = Backend::new("127.0.0.1", 9999);

        assert!(!table.evict(ip(1), &other));
        assert_eq!(table.get(ip(1)), Some(&pinned));
        assert!(!table.evict(ip(2), &pinned));
    }
}
