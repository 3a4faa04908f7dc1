//! A local, multi-account password store.
//!
//! Per-user credential records live in a SQLite database with their
//! password values encrypted at rest; accounts register and log in with a
//! hashed password, the logged-in user persists across restarts through a
//! small preference file, and records move between stores as JSON export
//! documents.
//!
//! [`PassKeep::open`] owns the whole lifecycle; record operations live on
//! the [`PassKeepAuthed`] handle that `register`/`login`/`resume` return.

pub mod backend;
pub mod crypto;
pub mod error;
pub mod export;
pub mod record;
pub mod session;
pub mod time;
pub mod user;

mod passkeep;

pub use error::{Error, Result};
pub use export::{is_valid_export, ExportDocument, ExportItem, EXPORT_VERSION};
pub use passkeep::{PassKeep, PassKeepAuthed};
pub use record::{NewRecord, Record, RecordDraft, SearchField};
pub use time::Timestamp;
pub use user::User;
