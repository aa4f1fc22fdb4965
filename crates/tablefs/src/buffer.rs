//! Write buffering and log compaction for pending file mutations.
//!
//! `create`/`append` calls enqueue mutations here instead of touching the
//! store. On flush the queue is compacted (`merge`) and executed as three
//! batched statements: deletes, then directory marker rows, then file rows.
//! Phase order matters: a delete queued before a later overwrite must not
//! remove the overwrite's row, and a reader that sees a file row must also
//! see its ancestor directory rows.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use strum::Display;
use tracing::{debug, trace};

use crate::error::{FsError, FsResult, StoreError};
use crate::path::{ancestor_dirs, split_path};
use crate::store::{SqlValue, Store};

/// What a buffered mutation does when flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub(crate) enum MutationKind {
    DeleteFile,
    InsertFile,
    InsertDir,
}

/// One pending mutation against a single path. Payload is only carried by
/// insert-file mutations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Mutation {
    pub name: String,
    pub kind: MutationKind,
    pub payload: Vec<u8>,
}

impl Mutation {
    fn new(name: &str, kind: MutationKind) -> Self {
        Self { name: name.to_string(), kind, payload: Vec::new() }
    }

    fn insert_file(name: &str, payload: Vec<u8>) -> Self {
        Self { name: name.to_string(), kind: MutationKind::InsertFile, payload }
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.payload.is_empty() {
            write!(f, "{{ name: '{}', kind: '{}' }}", self.name, self.kind)
        } else {
            write!(
                f,
                "{{ name: '{}', kind: '{}', {} bytes }}",
                self.name,
                self.kind,
                self.payload.len()
            )
        }
    }
}

/// Compact a mutation sequence to its minimal equivalent effect.
///
/// Rules, applied in order:
/// 1. Only the first insert-dir per path survives (the marker row is an
///    idempotent upsert, later duplicates are redundant).
/// 2. Only the last delete per path survives.
/// 3. A delete invalidates every insert-file on its path that precedes it.
/// 4. Surviving insert-files on one path collapse into the earliest one,
///    payloads concatenated in original order.
///
/// Relative order of survivors is preserved, and the whole thing is
/// idempotent: `merge(merge(x)) == merge(x)`.
fn merge(mut items: Vec<Mutation>) -> Vec<Mutation> {
    let n = items.len();
    let mut skip = vec![false; n];

    // Rule 1: first insert-dir per path wins.
    {
        let mut seen: HashSet<&str> = HashSet::new();
        for (i, item) in items.iter().enumerate() {
            if item.kind == MutationKind::InsertDir && !seen.insert(&item.name) {
                skip[i] = true;
            }
        }
    }

    // Rule 2: last delete per path wins.
    {
        let mut seen: HashSet<&str> = HashSet::new();
        for i in (0..n).rev() {
            if items[i].kind == MutationKind::DeleteFile && !seen.insert(&items[i].name) {
                skip[i] = true;
            }
        }
    }

    // Rule 3: a delete invalidates every earlier insert on its path.
    for i in (0..n).rev() {
        if items[i].kind != MutationKind::DeleteFile {
            continue;
        }
        for j in 0..i {
            if items[j].kind == MutationKind::InsertFile && items[j].name == items[i].name {
                skip[j] = true;
            }
        }
    }

    // Rule 4: concatenate surviving inserts into the earliest one. After
    // rule 3 no surviving delete sits between inserts on the same path.
    for i in 0..n {
        if skip[i] || items[i].kind != MutationKind::InsertFile {
            continue;
        }
        let mut payload = std::mem::take(&mut items[i].payload);
        for j in i + 1..n {
            if !skip[j]
                && items[j].kind == MutationKind::InsertFile
                && items[j].name == items[i].name
            {
                payload.extend_from_slice(&items[j].payload);
                skip[j] = true;
            }
        }
        items[i].payload = payload;
    }

    items
        .into_iter()
        .zip(skip)
        .filter(|(_, skipped)| !skipped)
        .map(|(item, _)| item)
        .collect()
}

/// In-memory queue of pending mutations for one container.
///
/// Not safe for concurrent mutation: all mutating calls take `&mut self`
/// and there is no internal locking. Serialize at a higher layer if
/// concurrent writers are needed.
pub(crate) struct WriteBuffer {
    store: Arc<dyn Store>,
    table: String,
    container: String,
    items: Vec<Mutation>,
    capacity: usize,
    next_part: i64,
}

impl WriteBuffer {
    /// `capacity` of zero disables buffering: every non-forced flush runs.
    pub fn new(
        store: Arc<dyn Store>,
        table: impl Into<String>,
        container: impl Into<String>,
        capacity: usize,
    ) -> Self {
        Self {
            store,
            table: table.into(),
            container: container.into(),
            items: Vec::new(),
            capacity,
            next_part: 0,
        }
    }

    /// Seed the chunk counter past any part already stored for this
    /// container, so chunk order survives process restarts instead of
    /// leaning on a store-assigned default.
    pub fn seed_next_part(&mut self) -> Result<(), StoreError> {
        let sql = format!(
            "SELECT COALESCE(MAX(part), -1) FROM {} WHERE container = ?1 AND is_dir = 0",
            self.table
        );
        let mut max_part = -1i64;
        self.store
            .query(&sql, &[SqlValue::text(&self.container)], &mut |row| {
                max_part = row[0].as_i64()?;
                Ok(false)
            })?;
        self.next_part = max_part + 1;
        Ok(())
    }

    /// Queue a full overwrite of `name`: delete, insert-file, insert-dir.
    pub fn record_create(&mut self, name: &str, payload: Vec<u8>) {
        self.items.push(Mutation::new(name, MutationKind::DeleteFile));
        self.items.push(Mutation::insert_file(name, payload));
        self.items.push(Mutation::new(name, MutationKind::InsertDir));
    }

    /// Queue an append to `name`: insert-file, insert-dir.
    pub fn record_append(&mut self, name: &str, payload: Vec<u8>) {
        self.items.push(Mutation::insert_file(name, payload));
        self.items.push(Mutation::new(name, MutationKind::InsertDir));
    }

    /// Flush trigger: total queued bytes across names and payloads.
    pub fn pending_size(&self) -> usize {
        self.items.iter().map(|m| m.name.len() + m.payload.len()).sum()
    }

    /// Drop every pending mutation without executing it.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    fn over_capacity(&self, force: bool) -> bool {
        force || self.capacity == 0 || self.pending_size() > self.capacity
    }

    /// Compact the queue and, if forced or over capacity, execute it as
    /// batched statements: deletes, directory rows, file rows.
    ///
    /// A merge can shrink the queue back under the threshold, in which case
    /// the compacted queue stays pending. On failure the compacted queue is
    /// kept for retry; re-merging it later is a no-op.
    pub fn flush(&mut self, force: bool) -> FsResult<()> {
        if !self.over_capacity(force) {
            return Ok(());
        }

        let before = self.items.len();
        self.items = merge(std::mem::take(&mut self.items));
        trace!(before, after = self.items.len(), "compacted mutation queue");

        if !self.over_capacity(force) {
            return Ok(());
        }

        debug!(
            container = %self.container,
            mutations = self.items.len(),
            bytes = self.pending_size(),
            "flushing write buffer"
        );

        self.flush_deletes().map_err(FsError::DeleteFailed)?;
        self.flush_dirs().map_err(FsError::DirInsertFailed)?;
        self.flush_files().map_err(FsError::FileInsertFailed)?;

        self.items.clear();
        Ok(())
    }

    /// Phase 1: one multi-value delete covering every deleted path.
    fn flush_deletes(&self) -> Result<(), StoreError> {
        let deletes: Vec<&Mutation> = self
            .items
            .iter()
            .filter(|m| m.kind == MutationKind::DeleteFile)
            .collect();
        if deletes.is_empty() {
            return Ok(());
        }

        let mut params = Vec::with_capacity(1 + deletes.len());
        params.push(SqlValue::text(&self.container));
        let placeholders: Vec<String> = deletes
            .iter()
            .enumerate()
            .map(|(i, m)| {
                params.push(SqlValue::text(&m.name));
                format!("?{}", i + 2)
            })
            .collect();

        let sql = format!(
            "DELETE FROM {} WHERE container = ?1 AND path IN ({})",
            self.table,
            placeholders.join(", ")
        );
        self.store.exec(&sql, &params)?;
        Ok(())
    }

    /// Phase 2: one multi-row conflict-ignoring insert of every ancestor
    /// directory level of every inserted path.
    fn flush_dirs(&self) -> Result<(), StoreError> {
        let mut params = vec![SqlValue::text(&self.container)];
        let mut rows = Vec::new();
        for item in self.items.iter().filter(|m| m.kind == MutationKind::InsertDir) {
            for level in ancestor_dirs(&item.name) {
                let p = params.len();
                rows.push(format!("(?1, ?{}, ?{}, ?{}, ?{}, 1)", p + 1, p + 2, p + 3, p + 4));
                params.push(SqlValue::text(level.path));
                params.push(SqlValue::int(level.depth));
                params.push(SqlValue::text(level.parent));
                params.push(SqlValue::text(level.leaf));
            }
        }
        if rows.is_empty() {
            return Ok(());
        }

        let sql = format!(
            "INSERT INTO {} (container, path, part, dir, name, is_dir)
             VALUES {}
             ON CONFLICT (container, path, part) DO NOTHING",
            self.table,
            rows.join(", ")
        );
        self.store.exec(&sql, &params)?;
        Ok(())
    }

    /// Phase 3: one multi-row insert of every file chunk, with `part`
    /// assigned from the in-process counter.
    fn flush_files(&mut self) -> Result<(), StoreError> {
        let mut params = vec![SqlValue::text(&self.container)];
        let mut rows = Vec::new();
        for item in &self.items {
            if item.kind != MutationKind::InsertFile {
                continue;
            }
            let (dir, leaf) = split_path(&item.name);
            let p = params.len();
            rows.push(format!(
                "(?1, ?{}, ?{}, ?{}, ?{}, 0, ?{})",
                p + 1,
                p + 2,
                p + 3,
                p + 4,
                p + 5
            ));
            params.push(SqlValue::text(&item.name));
            params.push(SqlValue::int(self.next_part));
            params.push(SqlValue::text(dir));
            params.push(SqlValue::text(leaf));
            params.push(SqlValue::blob(item.payload.clone()));
            self.next_part += 1;
        }
        if rows.is_empty() {
            return Ok(());
        }

        let sql = format!(
            "INSERT INTO {} (container, path, part, dir, name, is_dir, contents)
             VALUES {}",
            self.table,
            rows.join(", ")
        );
        self.store.exec(&sql, &params)?;
        Ok(())
    }
}
