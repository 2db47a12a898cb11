//! On-disk token cache.
//!
//! Tokens are stored per lookup key (profile name or OAuth-argument key) in
//! a small SQLite table, serialized as JSON. Use `":memory:"` for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{Context, Result};
use rusqlite::Connection;

use super::Token;

/// Raw keyed token storage. [`super::PersistentAuth`] layers refresh and
/// dual-key lookup on top.
pub trait TokenCache: Send + Sync {
    fn lookup(&self, key: &str) -> Result<Option<Token>>;
    fn store(&self, key: &str, token: &Token) -> Result<()>;
}

/// SQLite-backed token cache.
pub struct SqliteTokenCache {
    conn: Mutex<Connection>,
}

impl SqliteTokenCache {
    /// Open or create the token table in the given database path.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).context("failed to open token cache")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tokens (
                key  TEXT PRIMARY KEY,
                data TEXT NOT NULL
            )",
        )
        .context("failed to create token table")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl TokenCache for SqliteTokenCache {
    fn lookup(&self, key: &str) -> Result<Option<Token>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT data FROM tokens WHERE key = ?1")?;
        let mut rows = stmt.query([key])?;
        match rows.next()? {
            Some(row) => {
                let json: String = row.get(0)?;
                let token: Token = serde_json::from_str(&json)?;
                Ok(Some(token))
            }
            None => Ok(None),
        }
    }

    fn store(&self, key: &str, token: &Token) -> Result<()> {
        let json = serde_json::to_string(token)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO tokens (key, data) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET data = excluded.data",
            [key, &json],
        )?;
        Ok(())
    }
}

/// Map-backed token cache, for tests.
#[derive(Default)]
pub struct InMemoryTokenCache {
    tokens: Mutex<HashMap<String, Token>>,
}

impl InMemoryTokenCache {
    pub fn new<I, K>(tokens: I) -> Self
    where
        I: IntoIterator<Item = (K, Token)>,
        K: Into<String>,
    {
        InMemoryTokenCache {
            tokens: Mutex::new(tokens.into_iter().map(|(k, t)| (k.into(), t)).collect()),
        }
    }
}

impl TokenCache for InMemoryTokenCache {
    fn lookup(&self, key: &str) -> Result<Option<Token>> {
        Ok(self.tokens.lock().unwrap().get(key).cloned())
    }

    fn store(&self, key: &str, token: &Token) -> Result<()> {
        self.tokens
            .lock()
            .unwrap()
            .insert(key.to_string(), token.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::now_ms;

    fn token(access: &str) -> Token {
        Token {
            access: access.to_string(),
            refresh: "r".to_string(),
            token_type: "Bearer".to_string(),
            expires: now_ms() + 3_600_000,
        }
    }

    #[test]
    fn lookup_returns_none_for_missing_key() {
        let cache = SqliteTokenCache::open(":memory:").unwrap();
        assert!(cache.lookup("nope").unwrap().is_none());
    }

    #[test]
    fn store_and_lookup_roundtrip() {
        let cache = SqliteTokenCache::open(":memory:").unwrap();
        cache.store("dev", &token("abc")).unwrap();
        assert_eq!(cache.lookup("dev").unwrap().unwrap().access, "abc");
    }

    #[test]
    fn store_overwrites_existing() {
        let cache = SqliteTokenCache::open(":memory:").unwrap();
        cache.store("dev", &token("old")).unwrap();
        cache.store("dev", &token("new")).unwrap();
        assert_eq!(cache.lookup("dev").unwrap().unwrap().access, "new");
    }

    #[test]
    fn persists_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token-cache.db");
        let path_str = path.to_str().unwrap();

        {
            let cache = SqliteTokenCache::open(path_str).unwrap();
            cache.store("dev", &token("persisted")).unwrap();
        }

        {
            let cache = SqliteTokenCache::open(path_str).unwrap();
            assert_eq!(cache.lookup("dev").unwrap().unwrap().access, "persisted");
        }
    }
}
