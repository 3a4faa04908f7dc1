use thiserror::Error;

/// Failures surfaced by the store.
///
/// Records that are simply absent are `None`s, not errors.
#[derive(Debug, Error)]
pub enum Error {
    #[error("wrong username or password")]
    BadCredentials,

    #[error("username already taken: {0}")]
    UsernameTaken(String),

    #[error("couldn't read the system clock")]
    Clock,

    #[error("key file is malformed: {0}")]
    KeyFile(String),

    #[error("encryption failed")]
    Encrypt,

    #[error("decryption failed - wrong key or corrupted value")]
    Decrypt,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed export file: {0}")]
    ExportFormat(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
