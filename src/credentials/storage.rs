//! Credential store interface and its SQLite implementation.

use super::CredentialRecord;
use crate::error::BrokerError;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Durable storage for encrypted refresh tokens.
///
/// Implementations must make `upsert_credential` atomic on
/// (`owner_user_id`, `provider`): two concurrent upserts for the same key leave
/// exactly one row holding one of the two values.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Returns the record for (user, provider), if any.
    async fn get_credential(
        &self,
        owner_user_id: &str,
        provider: &str,
    ) -> Result<Option<CredentialRecord>, BrokerError>;

    /// Inserts the record or replaces the one sharing its (user, provider) key.
    async fn upsert_credential(&self, record: &CredentialRecord) -> Result<(), BrokerError>;
}

/// Credential storage backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE secure_credentials (
///     id INTEGER PRIMARY KEY,
///     owner_user_id TEXT NOT NULL,
///     provider TEXT NOT NULL,
///     refresh_token_cipher TEXT NOT NULL,  -- base64(nonce || ciphertext)
///     created_at TEXT NOT NULL,            -- ISO 8601 timestamp
///     updated_at TEXT NOT NULL,            -- ISO 8601 timestamp
///     UNIQUE(owner_user_id, provider)
/// );
/// ```
///
/// # Thread Safety
/// - Connection is wrapped in Mutex; each upsert is a single statement
/// - Clones share the connection
/// - The async trait methods run queries on tokio's blocking pool
#[derive(Clone)]
pub struct SqliteCredentialStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCredentialStore {
    /// Creates or opens a credential store.
    ///
    /// # Arguments
    /// * `db_path` - Path to SQLite database file (`:memory:` for tests)
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path).context("Failed to open database")?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS secure_credentials (
                id INTEGER PRIMARY KEY,
                owner_user_id TEXT NOT NULL,
                provider TEXT NOT NULL,
                refresh_token_cipher TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(owner_user_id, provider)
            )
            "#,
            [],
        )
        .context("Failed to create secure_credentials table")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Credential store lock poisoned"))
    }

    /// Stores the record, replacing any existing row for (user, provider).
    pub fn store(&self, record: &CredentialRecord) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        self.conn()?
            .execute(
                r#"
                INSERT INTO secure_credentials (
                    owner_user_id, provider, refresh_token_cipher, created_at, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(owner_user_id, provider) DO UPDATE SET
                    refresh_token_cipher = excluded.refresh_token_cipher,
                    updated_at = excluded.updated_at
                "#,
                params![
                    record.owner_user_id,
                    record.provider,
                    record.refresh_token_cipher,
                    now,
                    now,
                ],
            )
            .context("Failed to store credentials")?;

        Ok(())
    }

    /// Retrieves the record for (user, provider).
    pub fn get(&self, owner_user_id: &str, provider: &str) -> Result<Option<CredentialRecord>> {
        let conn = self.conn()?;
        let cipher: Option<String> = conn
            .query_row(
                r#"
                SELECT refresh_token_cipher
                FROM secure_credentials
                WHERE owner_user_id = ?1 AND provider = ?2
                "#,
                params![owner_user_id, provider],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to read credentials")?;

        Ok(cipher.map(|c| CredentialRecord::new(owner_user_id, provider, c)))
    }

    /// Number of rows for (user, provider). Always 0 or 1.
    pub fn count(&self, owner_user_id: &str, provider: &str) -> Result<usize> {
        let count: i64 = self
            .conn()?
            .query_row(
                "SELECT COUNT(*) FROM secure_credentials WHERE owner_user_id = ?1 AND provider = ?2",
                params![owner_user_id, provider],
                |row| row.get(0),
            )
            .context("Failed to count credentials")?;

        Ok(count as usize)
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn get_credential(
        &self,
        owner_user_id: &str,
        provider: &str,
    ) -> Result<Option<CredentialRecord>, BrokerError> {
        let store = self.clone();
        let owner_user_id = owner_user_id.to_string();
        let provider = provider.to_string();

        run_blocking(move || store.get(&owner_user_id, &provider)).await
    }

    async fn upsert_credential(&self, record: &CredentialRecord) -> Result<(), BrokerError> {
        let store = self.clone();
        let record = record.clone();

        run_blocking(move || store.store(&record)).await
    }
}

/// Runs a synchronous SQLite operation off the async worker threads.
async fn run_blocking<T, F>(op: F) -> Result<T, BrokerError>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| BrokerError::Storage(format!("Credential store task failed: {}", e)))?
        .map_err(|e| BrokerError::Storage(format!("{:#}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_store() -> SqliteCredentialStore {
        SqliteCredentialStore::new(":memory:").expect("Failed to create test store")
    }

    fn record(user: &str, cipher: &str) -> CredentialRecord {
        CredentialRecord::new(user, "google", cipher.to_string())
    }

    #[test]
    fn test_store_and_get() {
        let store = create_test_store();

        store.store(&record("user1", "cipher-1")).expect("Failed to store");

        let retrieved = store
            .get("user1", "google")
            .expect("Failed to get")
            .expect("Credentials not found");
        assert_eq!(retrieved, record("user1", "cipher-1"));
    }

    #[test]
    fn test_get_nonexistent() {
        let store = create_test_store();

        let result = store.get("user1", "google").expect("Failed to get");
        assert!(result.is_none());
    }

    #[test]
    fn test_upsert_keeps_single_row() {
        let store = create_test_store();

        store.store(&record("user1", "cipher-1")).unwrap();
        store.store(&record("user1", "cipher-2")).unwrap();

        assert_eq!(store.count("user1", "google").unwrap(), 1);
        let retrieved = store.get("user1", "google").unwrap().unwrap();
        assert_eq!(retrieved.refresh_token_cipher, "cipher-2");
    }

    #[test]
    fn test_records_are_keyed_by_user_and_provider() {
        let store = create_test_store();

        store.store(&record("user1", "u1-google")).unwrap();
        store.store(&record("user2", "u2-google")).unwrap();
        store
            .store(&CredentialRecord::new("user1", "github", "u1-github".to_string()))
            .unwrap();

        assert_eq!(
            store.get("user1", "google").unwrap().unwrap().refresh_token_cipher,
            "u1-google"
        );
        assert_eq!(
            store.get("user2", "google").unwrap().unwrap().refresh_token_cipher,
            "u2-google"
        );
        assert_eq!(
            store.get("user1", "github").unwrap().unwrap().refresh_token_cipher,
            "u1-github"
        );
        assert!(store.get("user2", "github").unwrap().is_none());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.db");

        {
            let store = SqliteCredentialStore::new(&path).unwrap();
            store.store(&record("user1", "cipher-1")).unwrap();
        }

        let reopened = SqliteCredentialStore::new(&path).unwrap();
        let retrieved = reopened.get("user1", "google").unwrap().unwrap();
        assert_eq!(retrieved.refresh_token_cipher, "cipher-1");
    }

    #[tokio::test]
    async fn test_trait_roundtrip() {
        let store = create_test_store();
        let store: &dyn CredentialStore = &store;

        assert_eq!(store.get_credential("user1", "google").await, Ok(None));

        store.upsert_credential(&record("user1", "cipher-1")).await.unwrap();
        store.upsert_credential(&record("user1", "cipher-2")).await.unwrap();

        let retrieved = store.get_credential("user1", "google").await.unwrap();
        assert_eq!(retrieved, Some(record("user1", "cipher-2")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_upserts_leave_one_row() {
        let store = create_test_store();

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .upsert_credential(&record("user1", &format!("cipher-{}", i)))
                        .await
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.count("user1", "google").unwrap(), 1);
        let stored = store.get_credential("user1", "google").await.unwrap().unwrap();
        assert!(stored.refresh_token_cipher.starts_with("cipher-"));
    }
}
