use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use bincode::{
    config::standard,
    error::{DecodeError, EncodeError},
};
use parity_db::{BTreeIterator, ColId, Db, Options};
use std::{
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};
use thiserror::Error;
use uuid::Uuid;

use crate::trade::TransactionRecord;

const RECORDS: ColId = 0;

//Cursor (opaque to clients)
#[derive(serde::Serialize, serde::Deserialize)]
struct Cursor {
    ts_nanos: u128,
    id: Uuid,
}

/// Errors from the transaction journal
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("ParityDB error: {0}")]
    Parity(#[from] parity_db::Error),
    #[error("Serialization/Deserialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Bincode encode error: {0}")]
    BincodeEncode(#[from] EncodeError),

    #[error("Bincode decode error: {0}")]
    BincodeDecode(#[from] DecodeError),

    #[error("Invalid cursor")]
    BadCursor,
}

pub type JournalResult<T> = Result<T, JournalError>;

/// A ParityDB-backed journal of committed transaction records, keyed by
/// "pair:timestamp:record id".
pub struct TransactionJournal {
    db: Db,
}

impl TransactionJournal {
    /// Open (or create) a ParityDB at `path`, with a single column and B-tree index.
    pub fn open(path: impl AsRef<Path>) -> JournalResult<Self> {
        let mut opts = Options::with_columns(path.as_ref(), 1);
        // enable B-tree index on column 0 for prefix scans
        opts.columns[RECORDS as usize].btree_index = true;
        let db = Db::open_or_create(&opts)?;
        Ok(TransactionJournal { db })
    }

    #[inline]
    fn to_nanos(ts: SystemTime) -> u128 {
        ts.duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default()
    }

    #[inline]
    fn prefix(pair: &str) -> Vec<u8> {
        let mut k = Vec::with_capacity(pair.len() + 1);
        k.extend_from_slice(pair.as_bytes());
        k.push(b':');
        k
    }

    #[inline]
    fn key(pair: &str, c: &Cursor) -> Vec<u8> {
        let mut k = Self::prefix(pair);
        k.extend_from_slice(&c.ts_nanos.to_be_bytes());
        k.extend_from_slice(c.id.as_bytes());
        k
    }

    #[inline]
    fn cursor_for(r: &TransactionRecord) -> Cursor {
        Cursor {
            ts_nanos: Self::to_nanos(r.timestamp),
            id: r.id,
        }
    }

    #[inline]
    fn encode_cursor(c: &Cursor) -> JournalResult<String> {
        Ok(B64.encode(serde_json::to_vec(c)?))
    }

    #[inline]
    fn decode_cursor(s: &str) -> JournalResult<Cursor> {
        let bytes = B64.decode(s).map_err(|_| JournalError::BadCursor)?;
        serde_json::from_slice(&bytes).map_err(|_| JournalError::BadCursor)
    }

    /// Writes every record in a single ParityDB commit, so a batch is either
    /// fully visible or not at all.
    pub fn append_batch(&self, records: &[TransactionRecord]) -> JournalResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut batch = Vec::with_capacity(records.len());
        for record in records {
            let key = Self::key(&record.pair.code(), &Self::cursor_for(record));
            let value = bincode::serde::encode_to_vec(record, standard())?;
            batch.push((RECORDS, key, Some(value)));
        }
        self.db.commit(batch)?;
        Ok(())
    }

    /// Returns up to `limit` records of `pair` in ascending time order,
    /// starting strictly after `after`, plus the cursor of the last one.
    pub fn page_asc(
        &self,
        pair: &str,
        after: Option<&str>,
        limit: usize,
    ) -> JournalResult<(Vec<TransactionRecord>, Option<String>)> {
        let mut it: BTreeIterator<'_> = self.db.iter(RECORDS)?;
        let prefix = Self::prefix(pair);

        if let Some(s) = after {
            let full = Self::key(pair, &Self::decode_cursor(s)?);
            let mut check = self.db.iter(RECORDS)?;
            check.seek(&full)?;
            match check.next()? {
                Some((k, _)) if k == full => {}
                _ => return Err(JournalError::BadCursor),
            }
            // Start strictly after that exact key
            it.seek(&full)?;
            let _ = it.next()?; //consume the equal key
        } else {
            it.seek(&prefix)?;
        }
        let mut items = Vec::with_capacity(limit.min(256));
        let mut last_cursor: Option<String> = None;

        while items.len() < limit {
            match it.next()? {
                Some((k, v)) if k.starts_with(&prefix) => {
                    let (record, _): (TransactionRecord, usize) =
                        bincode::serde::decode_from_slice(&v, standard())?;
                    last_cursor = Some(Self::encode_cursor(&Self::cursor_for(&record))?);
                    items.push(record);
                }
                _ => break,
            }
        }

        Ok((items, last_cursor))
    }
}
