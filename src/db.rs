use crate::error::{LedgerError, LedgerResult};
use crate::models::{format_timestamp, parse_timestamp, Contribution, GiftItem, Rsvp};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Shared handle to the SQLite database
///
/// Opened once at startup and passed to the ledger and RSVP book. Cloning
/// shares the same connection.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    /// Open (or create) the database file and ensure the schema exists
    pub fn open(path: &Path) -> LedgerResult<Self> {
        let conn = Connection::open(path)?;
        setup_database(&conn)?;
        tracing::info!(path = %path.display(), "store opened");
        Ok(Self::from_connection(conn))
    }

    /// Private in-memory database (tests, dry runs)
    pub fn open_in_memory() -> LedgerResult<Self> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Exclusive access to the connection for the duration of one operation
    pub(crate) fn lock(&self) -> LedgerResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| LedgerError::Internal("store lock poisoned".to_string()))
    }

    /// Close the connection, flushing the WAL
    ///
    /// If other clones of the handle are still alive the connection is left
    /// to close when the last one drops.
    pub fn close(self) -> LedgerResult<()> {
        match Arc::try_unwrap(self.conn) {
            Ok(mutex) => {
                let conn = mutex
                    .into_inner()
                    .map_err(|_| LedgerError::Internal("store lock poisoned".to_string()))?;
                conn.close().map_err(|(_, e)| LedgerError::Store(e))?;
                tracing::info!("store closed");
                Ok(())
            }
            Err(_) => {
                tracing::warn!("store handle still shared at close; deferring to drop");
                Ok(())
            }
        }
    }
}

pub fn setup_database(conn: &Connection) -> LedgerResult<()> {
    // WAL for crash recovery; in-memory databases silently keep "memory"
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Registry items: rowid keeps insertion order
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS registry_items (
            id TEXT PRIMARY KEY NOT NULL,
            name TEXT NOT NULL,
            link TEXT NOT NULL,
            total REAL NOT NULL,
            contributed REAL NOT NULL DEFAULT 0
        )",
        [],
    )?;

    // ==========================================================================
    // Contributions: seq keeps per-item append order
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS contributions (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            item_id TEXT NOT NULL,
            contributor_name TEXT NOT NULL,
            amount REAL NOT NULL,
            timestamp TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS rsvps (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT UNIQUE NOT NULL,
            name TEXT NOT NULL,
            pax INTEGER NOT NULL,
            wishes TEXT NOT NULL,
            timestamp TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_contributions_item ON contributions(item_id, seq)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// Row helpers (callers hold the lock / transaction)
// ============================================================================

fn timestamp_column(raw: String, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    parse_timestamp(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            rusqlite::types::Type::Text,
            format!("invalid timestamp: {raw}").into(),
        )
    })
}

pub(crate) fn item_exists(conn: &Connection, item_id: &str) -> LedgerResult<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM registry_items WHERE id = ?1", [item_id], |row| row.get(0))
        .optional()?;
    Ok(found.is_some())
}

pub(crate) fn get_contributed(conn: &Connection, item_id: &str) -> LedgerResult<Option<f64>> {
    let contributed = conn
        .query_row(
            "SELECT contributed FROM registry_items WHERE id = ?1",
            [item_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(contributed)
}

pub(crate) fn insert_item(conn: &Connection, item: &GiftItem) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO registry_items (id, name, link, total, contributed)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![item.id, item.name, item.link, item.total, item.contributed],
    )?;

    for contribution in &item.contributions {
        append_contribution(conn, &item.id, contribution)?;
    }

    Ok(())
}

/// Insert, or overwrite an existing item with the same id in place
///
/// The item keeps its original position; its old contributions are dropped.
pub(crate) fn replace_item(conn: &Connection, item: &GiftItem) -> LedgerResult<()> {
    conn.execute("DELETE FROM contributions WHERE item_id = ?1", [&item.id])?;
    conn.execute(
        "INSERT INTO registry_items (id, name, link, total, contributed)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
             name = excluded.name,
             link = excluded.link,
             total = excluded.total,
             contributed = excluded.contributed",
        params![item.id, item.name, item.link, item.total, item.contributed],
    )?;

    for contribution in &item.contributions {
        append_contribution(conn, &item.id, contribution)?;
    }

    Ok(())
}

pub(crate) fn append_contribution(
    conn: &Connection,
    item_id: &str,
    contribution: &Contribution,
) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO contributions (item_id, contributor_name, amount, timestamp)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            item_id,
            contribution.contributor_name,
            contribution.amount,
            format_timestamp(&contribution.timestamp),
        ],
    )?;
    Ok(())
}

/// The contribution at a zero-based position in an item's sequence, with its row key
pub(crate) fn contribution_at(
    conn: &Connection,
    item_id: &str,
    offset: i64,
) -> LedgerResult<Option<(i64, Contribution)>> {
    let found = conn
        .query_row(
            "SELECT seq, contributor_name, amount, timestamp
             FROM contributions
             WHERE item_id = ?1
             ORDER BY seq
             LIMIT 1 OFFSET ?2",
            params![item_id, offset],
            |row| {
                Ok((
                    row.get(0)?,
                    Contribution {
                        contributor_name: row.get(1)?,
                        amount: row.get(2)?,
                        timestamp: timestamp_column(row.get(3)?, 3)?,
                    },
                ))
            },
        )
        .optional()?;
    Ok(found)
}

pub(crate) fn delete_contribution_row(conn: &Connection, seq: i64) -> LedgerResult<()> {
    conn.execute("DELETE FROM contributions WHERE seq = ?1", [seq])?;
    Ok(())
}

/// Delete every registry item and contribution
pub(crate) fn clear_registry(conn: &Connection) -> LedgerResult<usize> {
    conn.execute("DELETE FROM contributions", [])?;
    let removed = conn.execute("DELETE FROM registry_items", [])?;
    Ok(removed)
}

fn load_contributions(conn: &Connection, item_id: &str) -> LedgerResult<Vec<Contribution>> {
    let mut stmt = conn.prepare(
        "SELECT contributor_name, amount, timestamp
         FROM contributions
         WHERE item_id = ?1
         ORDER BY seq",
    )?;

    let contributions = stmt
        .query_map([item_id], |row| {
            Ok(Contribution {
                contributor_name: row.get(0)?,
                amount: row.get(1)?,
                timestamp: timestamp_column(row.get(2)?, 2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(contributions)
}

pub(crate) fn get_item(conn: &Connection, item_id: &str) -> LedgerResult<Option<GiftItem>> {
    let item = conn
        .query_row(
            "SELECT id, name, link, total, contributed FROM registry_items WHERE id = ?1",
            [item_id],
            |row| {
                Ok(GiftItem {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    link: row.get(2)?,
                    total: row.get(3)?,
                    contributed: row.get(4)?,
                    contributions: Vec::new(),
                })
            },
        )
        .optional()?;

    match item {
        Some(mut item) => {
            item.contributions = load_contributions(conn, &item.id)?;
            Ok(Some(item))
        }
        None => Ok(None),
    }
}

pub(crate) fn get_all_items(conn: &Connection) -> LedgerResult<Vec<GiftItem>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, link, total, contributed
         FROM registry_items
         ORDER BY rowid",
    )?;

    let mut items = stmt
        .query_map([], |row| {
            Ok(GiftItem {
                id: row.get(0)?,
                name: row.get(1)?,
                link: row.get(2)?,
                total: row.get(3)?,
                contributed: row.get(4)?,
                contributions: Vec::new(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    for item in &mut items {
        item.contributions = load_contributions(conn, &item.id)?;
    }

    Ok(items)
}

pub(crate) fn insert_rsvp(conn: &Connection, rsvp: &Rsvp) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO rsvps (id, name, pax, wishes, timestamp) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            rsvp.id,
            rsvp.name,
            rsvp.pax,
            rsvp.wishes,
            format_timestamp(&rsvp.timestamp),
        ],
    )?;
    Ok(())
}

pub(crate) fn get_all_rsvps(conn: &Connection) -> LedgerResult<Vec<Rsvp>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, pax, wishes, timestamp FROM rsvps ORDER BY seq",
    )?;

    let rsvps = stmt
        .query_map([], |row| {
            Ok(Rsvp {
                id: row.get(0)?,
                name: row.get(1)?,
                pax: row.get(2)?,
                wishes: row.get(3)?,
                timestamp: timestamp_column(row.get(4)?, 4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rsvps)
}
