//! Dependency bindings the health probes talk to
//!
//! Each binding is an async trait so the aggregator can run against a real
//! dependency, an in-memory stand-in, or a mock in tests.

use crate::error::ProbeError;
use async_trait::async_trait;
use log::debug;
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio::net::TcpStream;

/// URL schemes accepted by `SqlDataStore`
pub const SQL_URL_SCHEMES: [&str; 3] = ["postgres://", "postgresql://", "sqlite:"];

/// A primary data store that can answer a trivial read-only query
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Run the cheapest possible read against the store
    async fn probe_query(&self) -> Result<(), ProbeError>;
}

/// A key/value object store supporting the write-read-delete round trip
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, content: &[u8]) -> Result<(), ProbeError>;

    /// Fetch an object, `Ok(None)` when the key does not exist
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ProbeError>;

    async fn delete(&self, key: &str) -> Result<(), ProbeError>;
}

/// Relational data store probed with `SELECT 1` over an `sqlx` pool
///
/// The URL scheme picks the driver. The pool connects lazily, so building
/// the binding never touches the network; connection failures surface on
/// the first probe.
#[derive(Debug, Clone)]
pub struct SqlDataStore {
    pool: AnyPool,
}

impl SqlDataStore {
    /// Create a lazily connecting pool for `url`
    ///
    /// # Arguments
    ///
    /// * `url` - Database URL, e.g. `postgres://user@host/db` or `sqlite::memory:`
    /// * `acquire_timeout` - Upper bound on waiting for a pooled connection
    ///
    /// # Returns
    ///
    /// The binding, or `ProbeError::Connection` when the URL cannot be parsed
    pub fn connect_lazy(url: &str, acquire_timeout: Duration) -> Result<Self, ProbeError> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(Some(Duration::from_secs(600)))
            .connect_lazy(url)
            .map_err(|e| ProbeError::Connection(e.to_string()))?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl DataStore for SqlDataStore {
    async fn probe_query(&self) -> Result<(), ProbeError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        debug!("Data store answered SELECT 1");
        Ok(())
    }
}

/// Data-store binding that only checks TCP reachability of `host:port`
///
/// Used when no database URL is configured. A server that accepts
/// connections but cannot answer queries still passes this check.
#[derive(Debug, Clone)]
pub struct TcpDataStore {
    addr: String,
}

impl TcpDataStore {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl DataStore for TcpDataStore {
    async fn probe_query(&self) -> Result<(), ProbeError> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| ProbeError::Connection(format!("{}: {}", self.addr, e)))?;
        debug!("Data store reachable at {:?}", stream.peer_addr().ok());
        Ok(())
    }
}

/// Object store kept entirely in memory
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, content: &[u8]) -> Result<(), ProbeError> {
        self.objects
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key.to_string(), content.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ProbeError> {
        Ok(self
            .objects
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), ProbeError> {
        self.objects
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// Object store backed by one file per key in a directory
#[derive(Debug, Clone)]
pub struct DirObjectStore {
    root: PathBuf,
}

impl DirObjectStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, ProbeError> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(ProbeError::Storage(format!("invalid object key: {:?}", key)));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ObjectStore for DirObjectStore {
    async fn put(&self, key: &str, content: &[u8]) -> Result<(), ProbeError> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ProbeError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), ProbeError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryObjectStore::new();
        store.put("probe", b"hello").await.unwrap();
        assert_eq!(store.get("probe").await.unwrap(), Some(b"hello".to_vec()));

        store.delete("probe").await.unwrap();
        assert_eq!(store.get("probe").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_dir_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = DirObjectStore::new(dir.path().join("objects"));

        store.put("health-check", b"payload").await.unwrap();
        assert_eq!(
            store.get("health-check").await.unwrap(),
            Some(b"payload".to_vec())
        );

        store.delete("health-check").await.unwrap();
        assert_eq!(store.get("health-check").await.unwrap(), None);
        // deleting twice is not an error
        store.delete("health-check").await.unwrap();
    }

    #[tokio::test]
    async fn test_dir_store_rejects_path_keys() {
        let dir = TempDir::new().unwrap();
        let store = DirObjectStore::new(dir.path());

        let result = store.put("../escape", b"x").await;
        assert!(matches!(result, Err(ProbeError::Storage(_))));
    }

    #[tokio::test]
    async fn test_sql_store_answers_select() {
        let store = SqlDataStore::connect_lazy("sqlite::memory:", Duration::from_secs(2)).unwrap();
        assert!(store.probe_query().await.is_ok());
    }

    #[tokio::test]
    async fn test_sql_store_fails_when_server_speaks_no_protocol() {
        // Accepts the connection and hangs up without a handshake
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                drop(stream);
            }
        });

        let url = format!("postgres://labwatch@{}/labwatch", addr);
        let store = SqlDataStore::connect_lazy(&url, Duration::from_secs(2)).unwrap();
        assert!(store.probe_query().await.is_err());

        // The same address looks healthy to a plain reachability check
        assert!(TcpDataStore::new(addr.to_string()).probe_query().await.is_ok());
    }

    #[test]
    fn test_sql_store_rejects_malformed_url() {
        let result = SqlDataStore::connect_lazy("not a url", Duration::from_secs(1));
        assert!(matches!(result, Err(ProbeError::Connection(_))));
    }

    #[tokio::test]
    async fn test_tcp_store_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let store = TcpDataStore::new(addr.to_string());
        assert!(store.probe_query().await.is_ok());
    }

    #[tokio::test]
    async fn test_tcp_store_unreachable() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let store = TcpDataStore::new(addr.to_string());
        assert!(matches!(
            store.probe_query().await,
            Err(ProbeError::Connection(_))
        ));
    }
}
