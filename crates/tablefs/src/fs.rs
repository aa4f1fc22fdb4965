//! Path-addressed filesystem facade over the flat table.
//!
//! Reads (`open`, `read_dir`) force a buffer flush first and then query the
//! store directly; writes (`create`, `append`) go through the write buffer.
//! One instance is a single logical owner: mutating calls take `&mut self`.

use std::fmt;
use std::io::{self, Cursor, Read, Write};
use std::sync::Arc;

use tracing::debug;

use crate::buffer::WriteBuffer;
use crate::error::{FsError, FsResult};
use crate::store::{SqlValue, Store};
use crate::stream::{DirEntry, DirStream};

/// Handle contract satisfied by everything [`TableFs::open`] returns.
///
/// Byte reads on a directory handle and listings on a file handle fail with
/// a descriptive type error, never with NotFound.
pub trait Node: Read + Send + fmt::Debug {
    /// The path this handle was opened with.
    fn name(&self) -> &str;

    /// Drain all remaining directory entries.
    fn read_dir_all(&mut self) -> FsResult<Vec<DirEntry>>;

    /// Pull up to `n` entries; `Ok(None)` once the listing is exhausted.
    fn read_dir_chunk(&mut self, n: usize) -> FsResult<Option<Vec<DirEntry>>>;
}

/// Virtual filesystem over rows keyed by `(container, path)`.
pub struct TableFs {
    store: Arc<dyn Store>,
    table: String,
    container: String,
    buffer: WriteBuffer,
}

impl TableFs {
    /// Build a filesystem over `table`, scoped to `container`.
    ///
    /// `capacity` gates the write buffer: non-forced flushes are no-ops
    /// until the pending mutations exceed it. Zero disables buffering.
    /// Construction seeds the chunk counter from the store so appends in a
    /// new process keep ascending `part` order.
    pub fn new(
        store: Arc<dyn Store>,
        table: impl Into<String>,
        container: impl Into<String>,
        capacity: usize,
    ) -> FsResult<Self> {
        let table = table.into();
        let container = container.into();
        let mut buffer =
            WriteBuffer::new(Arc::clone(&store), table.clone(), container.clone(), capacity);
        buffer.seed_next_part()?;
        Ok(Self { store, table, container, buffer })
    }

    /// Open a file or directory handle for `name`.
    ///
    /// File content is reassembled by concatenating chunk rows in ascending
    /// `part` order.
    pub fn open(&mut self, name: &str) -> FsResult<Box<dyn Node>> {
        self.flush()?;

        let sql = format!(
            "SELECT is_dir, contents FROM {} WHERE container = ?1 AND path = ?2 ORDER BY part",
            self.table
        );
        let mut found = false;
        let mut is_dir = false;
        let mut contents = Vec::new();
        self.store.query(
            &sql,
            &[SqlValue::text(&self.container), SqlValue::text(name)],
            &mut |row| {
                found = true;
                // All rows for one path share the same is_dir by construction.
                is_dir = row[0].as_bool()?;
                contents.extend_from_slice(row[1].as_blob()?);
                Ok(true)
            },
        )?;

        if !found {
            return Err(FsError::not_found(name));
        }
        if is_dir {
            Ok(Box::new(DirHandle {
                store: Arc::clone(&self.store),
                table: self.table.clone(),
                container: self.container.clone(),
                name: name.to_string(),
                stream: None,
            }))
        } else {
            Ok(Box::new(FileHandle {
                name: name.to_string(),
                reader: Cursor::new(contents),
            }))
        }
    }

    /// List the entries of directory `name`, ordered by name.
    ///
    /// An existing directory with no children yields an empty vec; a path
    /// with no rows at all fails with NotFound.
    pub fn read_dir(&mut self, name: &str) -> FsResult<Vec<DirEntry>> {
        self.flush()?;
        let entries = self.dir_stream(name).collect_all()?;
        if entries.is_empty() && !self.exists(name)? {
            return Err(FsError::not_found(name));
        }
        Ok(entries)
    }

    /// Stream the entries of directory `name` without collecting them.
    ///
    /// Unlike [`read_dir`](Self::read_dir) this does not probe for the
    /// directory's existence: a missing path is indistinguishable from an
    /// empty one. Dropping the stream mid-listing terminates its producer.
    pub fn read_dir_stream(&mut self, name: &str) -> FsResult<DirStream> {
        self.flush()?;
        Ok(self.dir_stream(name))
    }

    /// Start an in-memory write sink that overwrites `name` on finish.
    pub fn create(&mut self, name: &str) -> FileWriter<'_> {
        FileWriter::new(self, name, WriteMode::Create)
    }

    /// Start an in-memory write sink that appends to `name` on finish.
    pub fn append(&mut self, name: &str) -> FileWriter<'_> {
        FileWriter::new(self, name, WriteMode::Append)
    }

    /// Force the write buffer to flush unconditionally.
    pub fn flush(&mut self) -> FsResult<()> {
        self.buffer.flush(true)
    }

    /// Delete every row for this container.
    ///
    /// Pending buffered mutations are discarded first so a later flush
    /// cannot resurrect writes from before the wipe. Other containers in
    /// the same table are untouched.
    pub fn remove_all_files(&mut self) -> FsResult<()> {
        self.buffer.clear();
        let sql = format!("DELETE FROM {} WHERE container = ?1", self.table);
        let removed = self.store.exec(&sql, &[SqlValue::text(&self.container)])?;
        debug!(container = %self.container, removed, "removed all files");
        Ok(())
    }

    fn dir_stream(&self, name: &str) -> DirStream {
        let sql = format!(
            "SELECT DISTINCT name, is_dir FROM {} WHERE container = ?1 AND dir = ?2 ORDER BY name",
            self.table
        );
        DirStream::spawn(
            Arc::clone(&self.store),
            sql,
            vec![SqlValue::text(&self.container), SqlValue::text(name)],
        )
    }

    /// Cheap probe distinguishing "no children" from "no such path".
    fn exists(&self, name: &str) -> FsResult<bool> {
        let sql = format!(
            "SELECT 1 FROM {} WHERE container = ?1 AND path = ?2 LIMIT 1",
            self.table
        );
        let mut found = false;
        self.store.query(
            &sql,
            &[SqlValue::text(&self.container), SqlValue::text(name)],
            &mut |_row| {
                found = true;
                Ok(false)
            },
        )?;
        Ok(found)
    }
}

/// Readable handle over a file's reassembled bytes.
pub struct FileHandle {
    name: String,
    reader: Cursor<Vec<u8>>,
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Read for FileHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Node for FileHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_dir_all(&mut self) -> FsResult<Vec<DirEntry>> {
        Err(FsError::NotADirectory(self.name.clone()))
    }

    fn read_dir_chunk(&mut self, _n: usize) -> FsResult<Option<Vec<DirEntry>>> {
        Err(FsError::NotADirectory(self.name.clone()))
    }
}

/// Handle over a directory; its listing stream starts on the first pull.
///
/// Dropping the handle mid-listing terminates the producer and releases
/// its cursor.
pub struct DirHandle {
    store: Arc<dyn Store>,
    table: String,
    container: String,
    name: String,
    stream: Option<DirStream>,
}

impl DirHandle {
    fn stream(&mut self) -> &mut DirStream {
        let (store, table, container, name) =
            (&self.store, &self.table, &self.container, &self.name);
        self.stream.get_or_insert_with(|| {
            let sql = format!(
                "SELECT DISTINCT name, is_dir FROM {table} \
                 WHERE container = ?1 AND dir = ?2 ORDER BY name"
            );
            DirStream::spawn(
                Arc::clone(store),
                sql,
                vec![SqlValue::text(container), SqlValue::text(name)],
            )
        })
    }
}

impl fmt::Debug for DirHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirHandle")
            .field("name", &self.name)
            .field("streaming", &self.stream.is_some())
            .finish_non_exhaustive()
    }
}

impl Read for DirHandle {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(FsError::IsADirectory(self.name.clone()).into())
    }
}

impl Node for DirHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_dir_all(&mut self) -> FsResult<Vec<DirEntry>> {
        self.stream().collect_all()
    }

    fn read_dir_chunk(&mut self, n: usize) -> FsResult<Option<Vec<DirEntry>>> {
        self.stream().next_chunk(n)
    }
}

enum WriteMode {
    Create,
    Append,
}

/// In-memory write sink returned by [`TableFs::create`] and
/// [`TableFs::append`].
///
/// Bytes accumulate in memory and reach the write buffer on [`finish`],
/// which also attempts a capacity-gated flush. Dropping an unfinished
/// writer still enqueues the bytes (enqueueing cannot fail) but skips the
/// flush attempt, since `Drop` cannot report errors.
///
/// [`finish`]: FileWriter::finish
pub struct FileWriter<'fs> {
    fs: &'fs mut TableFs,
    name: String,
    buf: Vec<u8>,
    mode: WriteMode,
    committed: bool,
}

impl<'fs> FileWriter<'fs> {
    fn new(fs: &'fs mut TableFs, name: &str, mode: WriteMode) -> Self {
        Self { fs, name: name.to_string(), buf: Vec::new(), mode, committed: false }
    }

    fn enqueue(&mut self) {
        let bytes = std::mem::take(&mut self.buf);
        match self.mode {
            WriteMode::Create => self.fs.buffer.record_create(&self.name, bytes),
            WriteMode::Append => self.fs.buffer.record_append(&self.name, bytes),
        }
        self.committed = true;
    }

    /// Hand the accumulated bytes to the write buffer and attempt a
    /// non-forced flush.
    pub fn finish(mut self) -> FsResult<()> {
        self.enqueue();
        self.fs.buffer.flush(false)
    }
}

impl Write for FileWriter<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for FileWriter<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.enqueue();
        }
    }
}
