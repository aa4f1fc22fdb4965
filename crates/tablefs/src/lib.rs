//! Hierarchical file/directory namespace emulated on top of a flat SQL table.
//!
//! Every file and directory is stored as rows keyed by `(container, path)`;
//! directories are not a real tree but marker rows reconstructed from the
//! ancestor prefixes of each file path. Key components:
//!
//! - [`TableFs`] - Path-based facade: `open`, `read_dir`, `create`, `append`
//! - [`Store`] - Minimal query/execute capability over the backing table
//! - [`SqliteStore`] - SQLite implementation of [`Store`]
//! - [`DirStream`] - Background-producer stream of directory entries
//!
//! ## Design Decisions
//!
//! - **Write buffering**: `create`/`append` land in an in-memory mutation
//!   queue that is compacted (duplicate deletes dropped, sequential writes
//!   to one path concatenated) before being flushed as batched statements.
//! - **Read-your-writes**: every read entry point forces a buffer flush
//!   before querying.
//! - **Single writer**: mutating calls take `&mut self`; the buffer does no
//!   internal locking. The only internal concurrency is the listing
//!   producer thread, which owns its row cursor exclusively.

mod buffer;
mod error;
mod fs;
mod path;
mod store;
mod stream;

pub use error::{FsError, FsResult, StoreError};
pub use fs::{DirHandle, FileHandle, FileWriter, Node, TableFs};
pub use path::split_path;
pub use store::{RowVisitor, SqlValue, SqliteStore, Store};
pub use stream::{DirEntry, DirStream};
