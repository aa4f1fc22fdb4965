//! Background streaming of directory listings.
//!
//! A producer thread runs the listing query and hands each decoded row over
//! a channel; the consumer pulls entries one at a time. The stream is lazy,
//! forward-only and non-restartable.

use std::fmt;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, channel};
use std::thread;

use tracing::trace;

use crate::error::{FsResult, StoreError};
use crate::store::{SqlValue, Store};

/// A single directory listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

impl fmt::Display for DirEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dir {
            write!(f, "dir({})", self.name)
        } else {
            write!(f, "file({})", self.name)
        }
    }
}

fn decode_entry(row: &[SqlValue]) -> Result<DirEntry, StoreError> {
    match row {
        [name, is_dir] => Ok(DirEntry {
            name: name.as_str()?.to_string(),
            is_dir: is_dir.as_bool()?,
        }),
        _ => Err(StoreError::Decode(format!(
            "listing row: expected 2 columns, got {}",
            row.len()
        ))),
    }
}

/// Lazy stream of [`DirEntry`] values backed by a live listing query.
///
/// Dropping the stream disconnects the channel; the producer notices on its
/// next send, stops scanning, and the row cursor is closed when the query
/// call returns. An abandoned stream never leaves the producer running.
pub struct DirStream {
    rx: Receiver<FsResult<DirEntry>>,
}

impl DirStream {
    /// Start the producer thread for `sql` with `params`. The statement
    /// must select `(name, is_dir)` rows.
    pub(crate) fn spawn(store: Arc<dyn Store>, sql: String, params: Vec<SqlValue>) -> Self {
        let (tx, rx) = channel();
        thread::spawn(move || {
            let result = store.query(&sql, &params, &mut |row| {
                let entry = decode_entry(row)?;
                // A failed send means the consumer dropped the stream:
                // stop scanning so the cursor is released.
                Ok(tx.send(Ok(entry)).is_ok())
            });
            if let Err(err) = result {
                trace!(error = %err, "listing producer stopped on error");
                let _ = tx.send(Err(err.into()));
            }
        });
        Self { rx }
    }

    /// Drain the stream to completion.
    pub fn collect_all(&mut self) -> FsResult<Vec<DirEntry>> {
        let mut entries = Vec::new();
        while let Some(result) = self.next() {
            entries.push(result?);
        }
        Ok(entries)
    }

    /// Pull up to `n` entries. Returns `Ok(None)` when the very first pull
    /// of the page hits the end of the stream.
    pub fn next_chunk(&mut self, n: usize) -> FsResult<Option<Vec<DirEntry>>> {
        let mut entries = Vec::new();
        for i in 0..n {
            match self.next() {
                Some(Ok(entry)) => entries.push(entry),
                Some(Err(err)) => return Err(err),
                None => {
                    if i == 0 {
                        return Ok(None);
                    }
                    break;
                }
            }
        }
        Ok(Some(entries))
    }
}

impl Iterator for DirStream {
    type Item = FsResult<DirEntry>;

    /// `None` once the producer has finished and the channel drained.
    fn next(&mut self) -> Option<Self::Item> {
        self.rx.recv().ok()
    }
}
