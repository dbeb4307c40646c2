//! Path-addressed storage core.
//!
//! Named roots are mounted into one context-path namespace (`/root/rpath`).
//! Deletes on history-capable roots go to a per-root trash, bulk
//! copy/move/delete run as classify-then-execute passes, and file content
//! is served through HTTP range and chunked readers.

pub mod bulk;
pub mod command;
pub mod config;
pub mod errors;
pub mod file_info;
pub mod fs;
pub mod helpers;
pub mod models;
pub mod path;
pub mod range;
pub mod root;
pub mod storage;
pub mod trash;
pub mod walk;

pub use bulk::{
    DeleteReport, EntryMapping, ExecuteResult, MessageProvider, RejectReason, TransferMode,
    TransferReport,
};
pub use command::{guarded, CommandResponse};
pub use config::{RootConfig, StorageConfig};
pub use errors::{CoreError, ErrorKind, Result};
pub use file_info::{Content, FileInfo};
pub use fs::{FileSystem, ReadAt, RealFileSystem};
pub use helpers::{
    parse_trash_datetime, print_size, serialize_trash_datetime, TRASHINFO_EXTENSION,
    TRASHINFO_TIME_FORMAT,
};
pub use models::{
    DeletedFileStat, ExitStatusLike, ListEntry, OperationKind, RecoverCounts, Stat, TrashSummary,
    Visit,
};
pub use range::{parse_range, RangeResponse, RangeWindow};
pub use root::Root;
pub use storage::{Resolved, Storage};
pub use trash::purge;

/// Re-export a small stable API surface for front ends.
pub mod prelude {
    pub use crate::{
        bulk::{EntryMapping, ExecuteResult, TransferMode},
        command::{guarded, CommandResponse},
        config::StorageConfig,
        errors::{CoreError, Result},
        fs::{FileSystem, RealFileSystem},
        helpers::*,
        models::*,
        range::{RangeResponse, RangeWindow},
        storage::Storage,
        trash::purge,
    };
}
