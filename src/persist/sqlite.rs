//! SQLite change journal.
//!
//! Each accepted write is one `changes` row keyed by sequence and indexed by
//! `(collection, doc_id)`. A checkpoint materializes the whole server state
//! into `checkpoint_docs`; replay starts there and applies the rows after
//! `checkpoint.last_seq`. The layout version lives in `PRAGMA user_version`.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, Row, params, types::Type};
use tracing::debug;

use crate::{
    clock::now_ms,
    document::Fields,
    remote::memory::{CollectionDump, DumpedDocument, ServerState, StateSnapshotV1},
    types::DocId,
};

use super::{Change, ChangeSeq, ChangeSink, PersistError, PersistResult, StoredChange};

/// Journal layout understood by this build.
pub const JOURNAL_VERSION: i64 = 1;

const CHANGE_COLUMNS: &str = "seq, ts_ms, collection, doc_id, fields";

/// Journal backed by one SQLite database.
pub struct SqliteChangeSink {
    conn: Connection,
}

impl SqliteChangeSink {
    /// Opens or creates a journal at `path` in WAL mode.
    ///
    /// Fails on a database written with a different layout version.
    pub fn open(path: impl AsRef<Path>) -> PersistResult<Self> {
        Self::prepare(Connection::open(path)?)
    }

    pub fn open_in_memory() -> PersistResult<Self> {
        Self::prepare(Connection::open_in_memory()?)
    }

    fn prepare(conn: Connection) -> PersistResult<Self> {
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        match version {
            0 => {
                conn.execute_batch(include_str!("schema.sql"))?;
                conn.pragma_update(None, "user_version", JOURNAL_VERSION)?;
            }
            JOURNAL_VERSION => {}
            other => {
                return Err(PersistError::Message(format!(
                    "journal layout {other} is not supported (expected {JOURNAL_VERSION})"
                )));
            }
        }
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self { conn })
    }

    /// Rebuilds the server state: checkpoint first, then the journal tail.
    pub fn load_state(&self) -> PersistResult<ServerState> {
        let (mut state, replay_from) = match self.load_checkpoint()? {
            Some((snapshot, last_seq)) => (ServerState::from_snapshot(snapshot), last_seq),
            None => (ServerState::new(), 0),
        };
        let tail = self.load_changes_after(replay_from)?;
        debug!(from = replay_from, tail = tail.len(), "replaying journal");
        for stored in tail {
            state.apply_replayed(stored);
        }
        Ok(state)
    }

    /// Journal rows strictly after `seq`, oldest first.
    pub fn load_changes_after(&self, seq: ChangeSeq) -> PersistResult<Vec<StoredChange>> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("SELECT {CHANGE_COLUMNS} FROM changes WHERE seq > ?1 ORDER BY seq"))?;
        let rows = stmt.query_map(params![seq as i64], stored_change)?;
        let changes = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(changes)
    }

    /// Every journaled write to one document, oldest first.
    ///
    /// Rows folded into a compacted checkpoint are no longer listed.
    pub fn load_document_history(&self, collection: &str, id: &DocId) -> PersistResult<Vec<StoredChange>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {CHANGE_COLUMNS} FROM changes WHERE collection = ?1 AND doc_id = ?2 ORDER BY seq"
        ))?;
        let rows = stmt.query_map(params![collection, id.as_str()], stored_change)?;
        let changes = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(changes)
    }

    /// Replaces the checkpoint with `snapshot`, which covers writes through `last_seq`.
    pub fn write_checkpoint(&mut self, snapshot: &StateSnapshotV1, last_seq: ChangeSeq) -> PersistResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM checkpoint_docs", [])?;
        let mut written = 0usize;
        {
            let mut insert =
                tx.prepare("INSERT INTO checkpoint_docs(collection, doc_id, fields) VALUES (?1, ?2, ?3)")?;
            for dump in &snapshot.collections {
                for doc in &dump.documents {
                    insert.execute(params![dump.name, doc.id.as_str(), serde_json::to_string(&doc.fields)?])?;
                    written += 1;
                }
            }
        }
        tx.execute(
            "INSERT OR REPLACE INTO checkpoint(id, next_seq, last_seq, ts_ms) VALUES (1, ?1, ?2, ?3)",
            params![snapshot.next_seq as i64, last_seq as i64, now_ms() as i64],
        )?;
        tx.commit()?;
        debug!(last_seq, documents = written, "journal checkpoint written");
        Ok(())
    }

    /// Highest sequence the journal knows about, checkpointed or not.
    pub fn latest_seq(&self) -> PersistResult<ChangeSeq> {
        let seq: i64 = self.conn.query_row(
            "SELECT MAX(
                 COALESCE((SELECT MAX(seq) FROM changes), 0),
                 COALESCE((SELECT last_seq FROM checkpoint WHERE id = 1), 0)
             )",
            [],
            |row| row.get(0),
        )?;
        Ok(seq as ChangeSeq)
    }

    fn load_checkpoint(&self) -> PersistResult<Option<(StateSnapshotV1, ChangeSeq)>> {
        let marker: Option<(i64, i64)> = self
            .conn
            .query_row("SELECT next_seq, last_seq FROM checkpoint WHERE id = 1", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .optional()?;
        let Some((next_seq, last_seq)) = marker else {
            return Ok(None);
        };

        let mut stmt = self
            .conn
            .prepare("SELECT collection, doc_id, fields FROM checkpoint_docs ORDER BY collection, doc_id")?;
        let mut rows = stmt.query([])?;
        let mut collections: Vec<CollectionDump> = Vec::new();
        while let Some(row) = rows.next()? {
            let name: String = row.get(0)?;
            let doc = DumpedDocument {
                id: DocId::new(row.get::<_, String>(1)?),
                fields: parse_fields(2, &row.get::<_, String>(2)?)?,
            };
            match collections.last_mut() {
                Some(dump) if dump.name == name => dump.documents.push(doc),
                _ => collections.push(CollectionDump {
                    name,
                    documents: vec![doc],
                }),
            }
        }

        let snapshot = StateSnapshotV1 {
            next_seq: next_seq as ChangeSeq,
            collections,
        };
        Ok(Some((snapshot, last_seq as ChangeSeq)))
    }
}

impl ChangeSink for SqliteChangeSink {
    fn append_changes(&mut self, changes: &[StoredChange]) -> PersistResult<ChangeSeq> {
        let Some(last) = changes.last() else {
            return self.latest_seq();
        };
        let tx = self.conn.transaction()?;
        {
            let mut insert = tx.prepare_cached(
                "INSERT INTO changes(seq, ts_ms, collection, doc_id, fields) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for stored in changes {
                let fields = match &stored.change {
                    Change::Upsert { fields, .. } => Some(serde_json::to_string(fields)?),
                    Change::Remove { .. } => None,
                };
                insert.execute(params![
                    stored.seq as i64,
                    stored.ts_ms as i64,
                    stored.change.collection(),
                    stored.change.doc_id().as_str(),
                    fields,
                ])?;
            }
        }
        tx.commit()?;
        Ok(last.seq)
    }

    fn flush(&mut self) -> PersistResult<()> {
        self.conn.cache_flush()?;
        Ok(())
    }

    fn write_snapshot(&mut self, snapshot: &StateSnapshotV1, last_seq: ChangeSeq) -> PersistResult<()> {
        self.write_checkpoint(snapshot, last_seq)
    }

    fn compact_through(&mut self, seq: ChangeSeq) -> PersistResult<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM changes WHERE seq <= ?1", params![seq as i64])?;
        Ok(removed)
    }
}

fn stored_change(row: &Row<'_>) -> rusqlite::Result<StoredChange> {
    let seq: i64 = row.get(0)?;
    let ts_ms: i64 = row.get(1)?;
    let collection: String = row.get(2)?;
    let id = DocId::new(row.get::<_, String>(3)?);
    let change = match row.get::<_, Option<String>>(4)? {
        Some(text) => Change::Upsert {
            collection,
            id,
            fields: parse_fields(4, &text)?,
        },
        None => Change::Remove { collection, id },
    };
    Ok(StoredChange {
        seq: seq as ChangeSeq,
        ts_ms: ts_ms as u64,
        change,
    })
}

fn parse_fields(column: usize, text: &str) -> rusqlite::Result<Fields> {
    serde_json::from_str(text)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err)))
}
