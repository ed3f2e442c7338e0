//! SQLite-based mailbox and cursor storage

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use rusqlite_migration::{M, Migrations};

use super::{ChangeSet, CursorStore, MailboxStore};
use crate::models::{AccountId, CachedEntity, Cursor, EntityKey, EntityKind, Payload, Tombstone};

/// zstd level for entity payloads (good balance of speed vs compression)
const PAYLOAD_COMPRESSION_LEVEL: i32 = 3;

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            -- Last fully applied event cursor per account
            CREATE TABLE sync_cursors (
                account_id TEXT PRIMARY KEY,
                cursor TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Cached messages, conversations and labels (zstd-compressed JSON)
            CREATE TABLE entities (
                account_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                id TEXT NOT NULL,
                last_seq INTEGER NOT NULL,
                expires_at INTEGER,
                payload BLOB NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (account_id, kind, id)
            );

            CREATE INDEX idx_entities_expires_at
                ON entities(expires_at) WHERE expires_at IS NOT NULL;

            -- Deletions remembered to reject stale replays
            CREATE TABLE tombstones (
                account_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                deleted_at INTEGER NOT NULL,
                PRIMARY KEY (account_id, kind, id)
            );

            CREATE INDEX idx_tombstones_deleted_at ON tombstones(deleted_at);
            "#,
        ),
    ])
}

/// SQLite-based implementation of [`MailboxStore`] and [`CursorStore`]
///
/// A single connection behind a mutex serializes all writes, which covers
/// the single-writer-per-account requirement.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `db_path` and run migrations
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;

        // WAL lets the UI read while a sync writes; NORMAL sync is safe with WAL.
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
            "#,
        )?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("SQLite connection mutex poisoned"))
    }

    fn write_entity(tx: &Transaction<'_>, entity: &CachedEntity) -> Result<()> {
        let json = serde_json::to_vec(&entity.fields).context("Failed to serialize payload")?;
        let payload = zstd::encode_all(json.as_slice(), PAYLOAD_COMPRESSION_LEVEL)
            .context("Failed to compress payload")?;

        tx.execute(
            "INSERT INTO entities
             (account_id, kind, id, last_seq, expires_at, payload, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(account_id, kind, id) DO UPDATE SET
                last_seq = excluded.last_seq,
                expires_at = excluded.expires_at,
                payload = excluded.payload,
                updated_at = excluded.updated_at",
            params![
                entity.key.account_id.as_str(),
                entity.key.kind.as_str(),
                entity.key.id,
                entity.last_seq as i64,
                entity.expires_at,
                payload,
                entity.updated_at.to_rfc3339(),
            ],
        )?;
        tx.execute(
            "DELETE FROM tombstones WHERE account_id = ? AND kind = ? AND id = ?",
            params![
                entity.key.account_id.as_str(),
                entity.key.kind.as_str(),
                entity.key.id
            ],
        )?;
        Ok(())
    }

    fn write_tombstone(tx: &Transaction<'_>, tombstone: &Tombstone) -> Result<()> {
        let key = &tombstone.key;
        tx.execute(
            "DELETE FROM entities WHERE account_id = ? AND kind = ? AND id = ?",
            params![key.account_id.as_str(), key.kind.as_str(), key.id],
        )?;
        tx.execute(
            "INSERT INTO tombstones (account_id, kind, id, seq, deleted_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(account_id, kind, id) DO UPDATE SET
                seq = excluded.seq,
                deleted_at = excluded.deleted_at",
            params![
                key.account_id.as_str(),
                key.kind.as_str(),
                key.id,
                tombstone.seq as i64,
                tombstone.deleted_at.timestamp(),
            ],
        )?;
        Ok(())
    }
}

/// Raw entity columns, decoded outside the rusqlite row closure
struct EntityRow {
    account_id: String,
    kind: String,
    id: String,
    last_seq: i64,
    expires_at: Option<i64>,
    payload: Vec<u8>,
    updated_at: String,
}

const ENTITY_COLUMNS: &str =
    "account_id, kind, id, last_seq, expires_at, payload, updated_at";

impl EntityRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            account_id: row.get(0)?,
            kind: row.get(1)?,
            id: row.get(2)?,
            last_seq: row.get(3)?,
            expires_at: row.get(4)?,
            payload: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn decode(self) -> Result<CachedEntity> {
        let json = zstd::decode_all(self.payload.as_slice())
            .with_context(|| format!("Failed to decompress payload for {}", self.id))?;
        let fields: Payload = serde_json::from_slice(&json)
            .with_context(|| format!("Failed to parse payload for {}", self.id))?;
        let updated_at = DateTime::parse_from_rfc3339(&self.updated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(CachedEntity {
            key: EntityKey::new(AccountId::new(self.account_id), self.kind.parse()?, self.id),
            fields,
            last_seq: self.last_seq as u64,
            expires_at: self.expires_at,
            updated_at,
        })
    }
}

impl CursorStore for SqliteStore {
    fn get_cursor(&self, account_id: &AccountId) -> Result<Cursor> {
        let conn = self.conn()?;
        let cursor: Option<String> = conn
            .query_row(
                "SELECT cursor FROM sync_cursors WHERE account_id = ?",
                [account_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(cursor.map(Cursor::new).unwrap_or_else(Cursor::start))
    }

    fn advance_cursor(&self, account_id: &AccountId, cursor: &Cursor) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sync_cursors (account_id, cursor, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(account_id) DO UPDATE SET
                cursor = excluded.cursor,
                updated_at = excluded.updated_at",
            params![account_id.as_str(), cursor.as_str(), Utc::now().to_rfc3339()],
        )
        .with_context(|| format!("Failed to advance cursor for {}", account_id))?;
        Ok(())
    }

    fn reset_cursor(&self, account_id: &AccountId) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM sync_cursors WHERE account_id = ?",
            [account_id.as_str()],
        )?;
        Ok(())
    }
}

impl MailboxStore for SqliteStore {
    fn get_entity(&self, key: &EntityKey) -> Result<Option<CachedEntity>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM entities WHERE account_id = ? AND kind = ? AND id = ?",
                    ENTITY_COLUMNS
                ),
                params![key.account_id.as_str(), key.kind.as_str(), key.id],
                EntityRow::from_row,
            )
            .optional()?;
        row.map(EntityRow::decode).transpose()
    }

    fn get_tombstone(&self, key: &EntityKey) -> Result<Option<Tombstone>> {
        let conn = self.conn()?;
        let row: Option<(i64, i64)> = conn
            .query_row(
                "SELECT seq, deleted_at FROM tombstones
                 WHERE account_id = ? AND kind = ? AND id = ?",
                params![key.account_id.as_str(), key.kind.as_str(), key.id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        Ok(row.map(|(seq, deleted_at)| Tombstone {
            key: key.clone(),
            seq: seq as u64,
            deleted_at: DateTime::from_timestamp(deleted_at, 0).unwrap_or_else(Utc::now),
        }))
    }

    fn list_entities(
        &self,
        account_id: &AccountId,
        kind: EntityKind,
    ) -> Result<Vec<CachedEntity>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM entities WHERE account_id = ? AND kind = ? ORDER BY id ASC",
            ENTITY_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![account_id.as_str(), kind.as_str()], EntityRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);
        drop(conn);

        rows.into_iter().map(EntityRow::decode).collect()
    }

    fn count_entities(&self, account_id: &AccountId) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM entities WHERE account_id = ?",
            [account_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn upsert(&self, entity: CachedEntity) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        Self::write_entity(&tx, &entity)?;
        tx.commit()?;
        Ok(())
    }

    fn tombstone(&self, key: &EntityKey, seq: u64) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        Self::write_tombstone(&tx, &Tombstone::new(key.clone(), seq))?;
        tx.commit()?;
        Ok(())
    }

    fn apply_changes(&self, changes: &ChangeSet) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        for tombstone in &changes.tombstones {
            Self::write_tombstone(&tx, tombstone)?;
        }
        for entity in &changes.upserts {
            Self::write_entity(&tx, entity)?;
        }

        // Dropping the transaction without commit rolls everything back
        tx.commit().context("Failed to commit change set")?;
        Ok(())
    }

    fn delete_expired(&self, now_secs: i64) -> Result<usize> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM entities WHERE expires_at IS NOT NULL AND expires_at <= ?",
            [now_secs],
        )?;
        Ok(deleted)
    }

    fn purge_tombstones(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn()?;
        let purged = conn.execute(
            "DELETE FROM tombstones WHERE deleted_at < ?",
            [older_than.timestamp()],
        )?;
        Ok(purged)
    }

    fn clear_account(&self, account_id: &AccountId) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM entities WHERE account_id = ?",
            [account_id.as_str()],
        )?;
        tx.execute(
            "DELETE FROM tombstones WHERE account_id = ?",
            [account_id.as_str()],
        )?;
        tx.commit()?;
        Ok(())
    }
}
