mod clock;
mod error;
mod range;

pub use clock::Clock;
pub use error::{Result, StoreError};

use std::path::Path;
use std::time::Duration;
use tokio_rusqlite::Connection;
use tokio_rusqlite::rusqlite::{self, OptionalExtension, params};
use tracing::{debug, info};

/// Default upper bound for a single store operation.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_millis(500);

/// Shared state store with Redis-like values, hashes, sorted sets and lists.
///
/// Every method is one atomic step against the database. Keys with a TTL are
/// expired lazily: they read as absent once past their deadline and are
/// physically removed on the next touch or by [`Store::purge_expired`].
#[derive(Clone)]
pub struct Store {
  conn: Connection,
  clock: Clock,
  op_timeout: Duration,
}

impl Store {
  /// Open or create a store at the given path.
  pub async fn open(path: impl AsRef<Path>, op_timeout: Duration) -> Result<Self> {
    let conn = Connection::open(path).await.map_err(StoreError::Sqlite)?;
    let store = Self {
      conn,
      clock: Clock::System,
      op_timeout,
    };
    store.initialize().await?;
    Ok(store)
  }

  /// Create an in-memory store (useful for testing).
  pub async fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .await
      .map_err(StoreError::Sqlite)?;
    let store = Self {
      conn,
      clock: Clock::System,
      op_timeout: DEFAULT_OP_TIMEOUT,
    };
    store.initialize().await?;
    Ok(store)
  }

  /// Replace the time source used for expiry.
  pub fn with_clock(mut self, clock: Clock) -> Self {
    self.clock = clock;
    self
  }

  /// Replace the upper bound applied to each operation.
  pub fn with_op_timeout(mut self, op_timeout: Duration) -> Self {
    self.op_timeout = op_timeout;
    self
  }

  pub fn clock(&self) -> &Clock {
    &self.clock
  }

  /// Initialize the store schema.
  async fn initialize(&self) -> Result<()> {
    self
      .call(|conn| {
        conn.pragma_update(None, "journal_mode", "WAL")?;

        // Needed for hash field cascades (must be set per-connection)
        conn.pragma_update(None, "foreign_keys", "ON")?;

        conn.execute_batch(
          r#"
          -- Plain values, optionally expiring
          CREATE TABLE IF NOT EXISTS kv (
              key TEXT PRIMARY KEY,
              value TEXT NOT NULL,
              expires_at INTEGER
          );

          -- Hashes: one row per key carrying the expiry, fields hang off it
          CREATE TABLE IF NOT EXISTS hash_keys (
              key TEXT PRIMARY KEY,
              expires_at INTEGER
          );
          CREATE TABLE IF NOT EXISTS hash_fields (
              key TEXT NOT NULL REFERENCES hash_keys(key) ON DELETE CASCADE,
              field TEXT NOT NULL,
              value TEXT NOT NULL,
              PRIMARY KEY (key, field)
          );

          -- Sorted sets, ties ordered by member
          CREATE TABLE IF NOT EXISTS zsets (
              collection TEXT NOT NULL,
              member TEXT NOT NULL,
              score INTEGER NOT NULL,
              PRIMARY KEY (collection, member)
          );
          CREATE INDEX IF NOT EXISTS idx_zsets_order ON zsets(collection, score, member);

          -- Lists, highest seq is the front
          CREATE TABLE IF NOT EXISTS lists (
              list TEXT NOT NULL,
              seq INTEGER NOT NULL,
              value TEXT NOT NULL,
              PRIMARY KEY (list, seq)
          );

          CREATE INDEX IF NOT EXISTS idx_kv_expiry ON kv(expires_at);
          CREATE INDEX IF NOT EXISTS idx_hash_keys_expiry ON hash_keys(expires_at);
          "#,
        )?;
        Ok(())
      })
      .await?;

    info!("store initialized");
    Ok(())
  }

  /// Run `function` on the connection thread, bounded by the operation timeout.
  ///
  /// On timeout the closure may still complete in the background; callers
  /// must treat the step as possibly applied.
  async fn call<F, R>(&self, function: F) -> Result<R>
  where
    F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<R> + Send + 'static,
    R: Send + 'static,
  {
    match tokio::time::timeout(self.op_timeout, self.conn.call(function)).await {
      Ok(result) => Ok(result?),
      Err(_) => Err(StoreError::Timeout(self.op_timeout)),
    }
  }

  fn deadline(&self, ttl: Duration) -> i64 {
    self.clock.now_ms() + ttl.as_millis() as i64
  }

  /// Round-trip check used by health probes.
  pub async fn ping(&self) -> Result<()> {
    self
      .call(|conn| {
        conn
          .prepare_cached("SELECT 1")?
          .query_row([], |row| row.get::<_, i64>(0))?;
        Ok(())
      })
      .await
  }

  // ========================================================================
  // Keys
  // ========================================================================

  /// Get a value. Returns None if absent or expired.
  pub async fn get(&self, key: &str) -> Result<Option<String>> {
    let key = key.to_string();
    let now = self.clock.now_ms();

    self
      .call(move |conn| {
        drop_expired_value(conn, &key, now)?;
        conn
          .prepare_cached("SELECT value FROM kv WHERE key = ?1")?
          .query_row(params![&key], |row| row.get(0))
          .optional()
      })
      .await
  }

  /// Set a value, replacing any previous value and expiry.
  pub async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
    let key = key.to_string();
    let value = value.to_string();
    let expires_at = ttl.map(|ttl| self.deadline(ttl));

    self
      .call(move |conn| {
        conn
          .prepare_cached(
            "INSERT INTO kv (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
          )?
          .execute(params![&key, &value, expires_at])?;
        Ok(())
      })
      .await
  }

  /// Whether a live key of any kind exists.
  pub async fn exists(&self, key: &str) -> Result<bool> {
    let key = key.to_string();
    let now = self.clock.now_ms();

    self
      .call(move |conn| {
        drop_expired_value(conn, &key, now)?;
        drop_expired_hash(conn, &key, now)?;
        conn
          .prepare_cached(
            r#"
            SELECT EXISTS(SELECT 1 FROM kv WHERE key = ?1)
                OR EXISTS(SELECT 1 FROM hash_keys WHERE key = ?1)
                OR EXISTS(SELECT 1 FROM zsets WHERE collection = ?1)
                OR EXISTS(SELECT 1 FROM lists WHERE list = ?1)
            "#,
          )?
          .query_row(params![&key], |row| row.get(0))
      })
      .await
  }

  /// Set the TTL of a value or hash. Returns false if the key does not exist.
  pub async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
    let key = key.to_string();
    let now = self.clock.now_ms();
    let expires_at = self.deadline(ttl);

    self
      .call(move |conn| {
        let tx = conn.transaction()?;
        drop_expired_value(&tx, &key, now)?;
        drop_expired_hash(&tx, &key, now)?;

        let mut updated = tx
          .prepare_cached("UPDATE kv SET expires_at = ?2 WHERE key = ?1")?
          .execute(params![&key, expires_at])?;
        updated += tx
          .prepare_cached("UPDATE hash_keys SET expires_at = ?2 WHERE key = ?1")?
          .execute(params![&key, expires_at])?;

        tx.commit()?;
        Ok(updated > 0)
      })
      .await
  }

  /// Delete a key whatever its type. Returns true if anything was removed.
  pub async fn delete(&self, key: &str) -> Result<bool> {
    let key = key.to_string();

    let deleted = self
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut deleted = tx
          .prepare_cached("DELETE FROM kv WHERE key = ?1")?
          .execute(params![&key])?;
        deleted += tx
          .prepare_cached("DELETE FROM hash_keys WHERE key = ?1")?
          .execute(params![&key])?;
        deleted += tx
          .prepare_cached("DELETE FROM zsets WHERE collection = ?1")?
          .execute(params![&key])?;
        deleted += tx
          .prepare_cached("DELETE FROM lists WHERE list = ?1")?
          .execute(params![&key])?;
        tx.commit()?;
        Ok(deleted > 0)
      })
      .await?;

    Ok(deleted)
  }

  /// Remove every expired value and hash.
  pub async fn purge_expired(&self) -> Result<u64> {
    let now = self.clock.now_ms();

    let purged = self
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut purged = tx
          .prepare_cached("DELETE FROM kv WHERE expires_at IS NOT NULL AND expires_at <= ?1")?
          .execute(params![now])?;
        purged += tx
          .prepare_cached("DELETE FROM hash_keys WHERE expires_at IS NOT NULL AND expires_at <= ?1")?
          .execute(params![now])?;
        tx.commit()?;
        Ok(purged as u64)
      })
      .await?;

    if purged > 0 {
      debug!(purged, "purged expired keys");
    }

    Ok(purged)
  }

  // ========================================================================
  // Hashes
  // ========================================================================

  /// Set a hash field only if it is not already present.
  pub async fn hset_nx(&self, key: &str, field: &str, value: &str) -> Result<bool> {
    let key = key.to_string();
    let field = field.to_string();
    let value = value.to_string();
    let now = self.clock.now_ms();

    self
      .call(move |conn| {
        let tx = conn.transaction()?;
        drop_expired_hash(&tx, &key, now)?;
        ensure_hash(&tx, &key)?;
        let inserted = tx
          .prepare_cached(
            "INSERT INTO hash_fields (key, field, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(key, field) DO NOTHING",
          )?
          .execute(params![&key, &field, &value])?;
        tx.commit()?;
        Ok(inserted == 1)
      })
      .await
  }

  /// Add `delta` to an integer hash field (missing fields count as 0) and
  /// return the new value.
  pub async fn hincr_by(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
    let key = key.to_string();
    let field = field.to_string();
    let now = self.clock.now_ms();

    self
      .call(move |conn| {
        let tx = conn.transaction()?;
        drop_expired_hash(&tx, &key, now)?;
        ensure_hash(&tx, &key)?;

        let current: Option<String> = tx
          .prepare_cached("SELECT value FROM hash_fields WHERE key = ?1 AND field = ?2")?
          .query_row(params![&key, &field], |row| row.get(0))
          .optional()?;

        let current = match current.as_deref().map(str::parse::<i64>) {
          None => 0,
          Some(Ok(n)) => n,
          Some(Err(_)) => return Ok(Err(StoreError::NotAnInteger { key })),
        };
        let next = current + delta;

        tx.prepare_cached(
          "INSERT INTO hash_fields (key, field, value) VALUES (?1, ?2, ?3)
           ON CONFLICT(key, field) DO UPDATE SET value = excluded.value",
        )?
        .execute(params![&key, &field, next.to_string()])?;

        tx.commit()?;
        Ok(Ok(next))
      })
      .await?
  }

  /// All fields of a hash, ordered by field name. Empty if absent or expired.
  pub async fn hget_all(&self, key: &str) -> Result<Vec<(String, String)>> {
    let key = key.to_string();
    let now = self.clock.now_ms();

    self
      .call(move |conn| {
        drop_expired_hash(conn, &key, now)?;
        let mut stmt = conn
          .prepare_cached("SELECT field, value FROM hash_fields WHERE key = ?1 ORDER BY field")?;
        let fields = stmt
          .query_map(params![&key], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(fields)
      })
      .await
  }

  // ========================================================================
  // Sorted sets
  // ========================================================================

  /// Insert or re-score a member. Returns true if the member was new.
  pub async fn zadd(&self, collection: &str, member: &str, score: i64) -> Result<bool> {
    let collection = collection.to_string();
    let member = member.to_string();

    self
      .call(move |conn| {
        let tx = conn.transaction()?;
        let existed: bool = tx
          .prepare_cached(
            "SELECT EXISTS(SELECT 1 FROM zsets WHERE collection = ?1 AND member = ?2)",
          )?
          .query_row(params![&collection, &member], |row| row.get(0))?;
        tx.prepare_cached(
          "INSERT INTO zsets (collection, member, score) VALUES (?1, ?2, ?3)
           ON CONFLICT(collection, member) DO UPDATE SET score = excluded.score",
        )?
        .execute(params![&collection, &member, score])?;
        tx.commit()?;
        Ok(!existed)
      })
      .await
  }

  /// Add a member only if absent. Returns true if it was added.
  pub async fn zadd_nx(&self, collection: &str, member: &str, score: i64) -> Result<bool> {
    let collection = collection.to_string();
    let member = member.to_string();

    self
      .call(move |conn| {
        let added = conn
          .prepare_cached(
            "INSERT INTO zsets (collection, member, score) VALUES (?1, ?2, ?3)
             ON CONFLICT(collection, member) DO NOTHING",
          )?
          .execute(params![&collection, &member, score])?;
        Ok(added == 1)
      })
      .await
  }

  /// Re-score a member only if present. Returns true if it was updated.
  pub async fn zadd_xx(&self, collection: &str, member: &str, score: i64) -> Result<bool> {
    let collection = collection.to_string();
    let member = member.to_string();

    self
      .call(move |conn| {
        let updated = conn
          .prepare_cached("UPDATE zsets SET score = ?3 WHERE collection = ?1 AND member = ?2")?
          .execute(params![&collection, &member, score])?;
        Ok(updated == 1)
      })
      .await
  }

  pub async fn zscore(&self, collection: &str, member: &str) -> Result<Option<i64>> {
    let collection = collection.to_string();
    let member = member.to_string();

    self
      .call(move |conn| {
        conn
          .prepare_cached("SELECT score FROM zsets WHERE collection = ?1 AND member = ?2")?
          .query_row(params![&collection, &member], |row| row.get(0))
          .optional()
      })
      .await
  }

  pub async fn zcard(&self, collection: &str) -> Result<u64> {
    let collection = collection.to_string();

    let len: i64 = self
      .call(move |conn| {
        conn
          .prepare_cached("SELECT COUNT(*) FROM zsets WHERE collection = ?1")?
          .query_row(params![&collection], |row| row.get(0))
      })
      .await?;

    Ok(len as u64)
  }

  /// Remove a member. Returns true if it was present.
  pub async fn zrem(&self, collection: &str, member: &str) -> Result<bool> {
    let collection = collection.to_string();
    let member = member.to_string();

    self
      .call(move |conn| {
        let removed = conn
          .prepare_cached("DELETE FROM zsets WHERE collection = ?1 AND member = ?2")?
          .execute(params![&collection, &member])?;
        Ok(removed == 1)
      })
      .await
  }

  /// Members ranked `start..=stop`, ascending by score.
  pub async fn zrange(&self, collection: &str, start: i64, stop: i64) -> Result<Vec<String>> {
    self.zrange_ordered(collection, start, stop, false).await
  }

  /// Members ranked `start..=stop`, descending by score.
  pub async fn zrevrange(&self, collection: &str, start: i64, stop: i64) -> Result<Vec<String>> {
    self.zrange_ordered(collection, start, stop, true).await
  }

  async fn zrange_ordered(
    &self,
    collection: &str,
    start: i64,
    stop: i64,
    reverse: bool,
  ) -> Result<Vec<String>> {
    let collection = collection.to_string();
    let sql = if reverse {
      "SELECT member FROM zsets WHERE collection = ?1 ORDER BY score DESC, member DESC LIMIT ?2 OFFSET ?3"
    } else {
      "SELECT member FROM zsets WHERE collection = ?1 ORDER BY score, member LIMIT ?2 OFFSET ?3"
    };

    self
      .call(move |conn| {
        let len: i64 = conn
          .prepare_cached("SELECT COUNT(*) FROM zsets WHERE collection = ?1")?
          .query_row(params![&collection], |row| row.get(0))?;
        let Some((offset, count)) = range::resolve(len, start, stop) else {
          return Ok(Vec::new());
        };

        let mut stmt = conn.prepare_cached(sql)?;
        let members = stmt
          .query_map(params![&collection, count, offset], |row| row.get(0))?
          .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(members)
      })
      .await
  }

  /// Members with `min <= score <= max`, highest score first, paginated.
  pub async fn zrevrange_by_score(
    &self,
    collection: &str,
    max: i64,
    min: i64,
    offset: i64,
    limit: i64,
  ) -> Result<Vec<String>> {
    let collection = collection.to_string();

    self
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(
          r#"
          SELECT member FROM zsets
          WHERE collection = ?1 AND score <= ?2 AND score >= ?3
          ORDER BY score DESC, member DESC
          LIMIT ?4 OFFSET ?5
          "#,
        )?;
        let members = stmt
          .query_map(params![&collection, max, min, limit, offset], |row| {
            row.get(0)
          })?
          .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(members)
      })
      .await
  }

  /// Remove members ranked `start..=stop` (ascending). Returns how many went.
  pub async fn zremrange_by_rank(&self, collection: &str, start: i64, stop: i64) -> Result<u64> {
    let collection = collection.to_string();

    let removed = self
      .call(move |conn| {
        let tx = conn.transaction()?;
        let len: i64 = tx
          .prepare_cached("SELECT COUNT(*) FROM zsets WHERE collection = ?1")?
          .query_row(params![&collection], |row| row.get(0))?;
        let Some((offset, count)) = range::resolve(len, start, stop) else {
          return Ok(0);
        };

        let removed = tx
          .prepare_cached(
            r#"
            DELETE FROM zsets WHERE collection = ?1 AND member IN (
                SELECT member FROM zsets WHERE collection = ?1
                ORDER BY score, member LIMIT ?2 OFFSET ?3
            )
            "#,
          )?
          .execute(params![&collection, count, offset])?;
        tx.commit()?;
        Ok(removed as u64)
      })
      .await?;

    Ok(removed)
  }

  /// Remove members with `min <= score <= max`. Returns how many went.
  pub async fn zremrange_by_score(&self, collection: &str, min: i64, max: i64) -> Result<u64> {
    let collection = collection.to_string();

    self
      .call(move |conn| {
        let removed = conn
          .prepare_cached(
            "DELETE FROM zsets WHERE collection = ?1 AND score >= ?2 AND score <= ?3",
          )?
          .execute(params![&collection, min, max])?;
        Ok(removed as u64)
      })
      .await
  }

  // ========================================================================
  // Lists
  // ========================================================================

  /// Push to the front of a list. Returns the new length.
  pub async fn lpush(&self, list: &str, value: &str) -> Result<u64> {
    let list = list.to_string();
    let value = value.to_string();

    self
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.prepare_cached(
          r#"
          INSERT INTO lists (list, seq, value)
          VALUES (?1, (SELECT COALESCE(MAX(seq), 0) + 1 FROM lists WHERE list = ?1), ?2)
          "#,
        )?
        .execute(params![&list, &value])?;
        let len: i64 = tx
          .prepare_cached("SELECT COUNT(*) FROM lists WHERE list = ?1")?
          .query_row(params![&list], |row| row.get(0))?;
        tx.commit()?;
        Ok(len as u64)
      })
      .await
  }

  /// Keep only the items at positions `start..=stop` from the front.
  pub async fn ltrim(&self, list: &str, start: i64, stop: i64) -> Result<u64> {
    let list = list.to_string();

    self
      .call(move |conn| {
        let tx = conn.transaction()?;
        let len: i64 = tx
          .prepare_cached("SELECT COUNT(*) FROM lists WHERE list = ?1")?
          .query_row(params![&list], |row| row.get(0))?;

        let removed = match range::resolve(len, start, stop) {
          None => tx
            .prepare_cached("DELETE FROM lists WHERE list = ?1")?
            .execute(params![&list])?,
          Some((offset, count)) => tx
            .prepare_cached(
              r#"
              DELETE FROM lists WHERE list = ?1 AND seq NOT IN (
                  SELECT seq FROM lists WHERE list = ?1
                  ORDER BY seq DESC LIMIT ?2 OFFSET ?3
              )
              "#,
            )?
            .execute(params![&list, count, offset])?,
        };

        tx.commit()?;
        Ok(removed as u64)
      })
      .await
  }

  /// Items at positions `start..=stop` from the front.
  pub async fn lrange(&self, list: &str, start: i64, stop: i64) -> Result<Vec<String>> {
    let list = list.to_string();

    self
      .call(move |conn| {
        let len: i64 = conn
          .prepare_cached("SELECT COUNT(*) FROM lists WHERE list = ?1")?
          .query_row(params![&list], |row| row.get(0))?;
        let Some((offset, count)) = range::resolve(len, start, stop) else {
          return Ok(Vec::new());
        };

        let mut stmt = conn.prepare_cached(
          "SELECT value FROM lists WHERE list = ?1 ORDER BY seq DESC LIMIT ?2 OFFSET ?3",
        )?;
        let items = stmt
          .query_map(params![&list, count, offset], |row| row.get(0))?
          .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(items)
      })
      .await
  }

  pub async fn llen(&self, list: &str) -> Result<u64> {
    let list = list.to_string();

    let len: i64 = self
      .call(move |conn| {
        conn
          .prepare_cached("SELECT COUNT(*) FROM lists WHERE list = ?1")?
          .query_row(params![&list], |row| row.get(0))
      })
      .await?;

    Ok(len as u64)
  }
}

fn drop_expired_value(conn: &rusqlite::Connection, key: &str, now: i64) -> rusqlite::Result<()> {
  conn
    .prepare_cached("DELETE FROM kv WHERE key = ?1 AND expires_at IS NOT NULL AND expires_at <= ?2")?
    .execute(params![key, now])?;
  Ok(())
}

fn drop_expired_hash(conn: &rusqlite::Connection, key: &str, now: i64) -> rusqlite::Result<()> {
  conn
    .prepare_cached(
      "DELETE FROM hash_keys WHERE key = ?1 AND expires_at IS NOT NULL AND expires_at <= ?2",
    )?
    .execute(params![key, now])?;
  Ok(())
}

fn ensure_hash(conn: &rusqlite::Connection, key: &str) -> rusqlite::Result<()> {
  conn
    .prepare_cached("INSERT INTO hash_keys (key, expires_at) VALUES (?1, NULL) ON CONFLICT(key) DO NOTHING")?
    .execute(params![key])?;
  Ok(())
}
