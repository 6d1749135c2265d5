//! Object-graph persistence for the engine runtime.
//!
//! Two pieces cooperate here: [`ClassRegistry`] tracks every persistable
//! class and every live instance of it under stable integer ids, and
//! [`PersistStream`] is the binary cursor each object walks its own fields
//! through, with one field-transfer body shared by the save and load
//! directions.
//!
//! Links between objects never serialize as addresses. A reference is an
//! [`ObjRef`] — a `(class, instance)` id pair — resolved through the
//! registry's tables, which is what lets arbitrary graphs, cycles included,
//! survive a round trip.

pub mod registry;
pub mod stream;

pub use registry::{BuildFn, ClassRegistry, ObjRef, Persistable, SharedObject};
pub use stream::{peek_summary, PersistStream, SaveSummary, FORMAT_MAJOR, FORMAT_MINOR, SAVE_MAGIC};

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Error conditions surfaced by the persistence layer.
///
/// Corrupt or hostile save images must degrade to one of these, never to a
/// panic or an out-of-bounds read.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("save image ends early while reading {what} at offset {offset}")]
    Truncated { what: &'static str, offset: usize },

    #[error("save image does not start with the expected magic bytes")]
    BadMagic,

    #[error("save format {found_major}.{found_minor} is incompatible with this build ({expected_major}.x)")]
    Incompatible {
        found_major: u16,
        found_minor: u16,
        expected_major: u16,
    },

    #[error("{what} holds invalid utf-8")]
    InvalidString { what: &'static str },

    #[error("class {0} is already registered")]
    DuplicateClass(String),

    #[error("class {0} is not registered")]
    UnknownClass(String),

    #[error("class {0} has no builder and cannot be rebuilt from a save")]
    MissingBuilder(String),

    #[error("saved instance {instance} of class {class} resolves to no live object")]
    DanglingInstance { class: u32, instance: u32 },

    #[error(
        "instance body for saved instance {instance} of class {class} declared {declared} bytes but consumed {read}"
    )]
    BodyMismatch {
        class: u32,
        instance: u32,
        declared: u32,
        read: u32,
    },

    #[error("writing save file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
