use crate::time::Timestamp;

/// A stored credential row. `password` holds cipher text at rest; the
/// service layer decrypts before handing records out.
#[derive(Debug, Clone, PartialEq)]
#[derive(sqlx::FromRow)]
pub struct Record {
    pub id: i64,
    pub username: String,
    pub password: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub platform: String,
    pub note: Option<String>,
    pub created: Timestamp,
    pub updated: Timestamp,
    pub user_id: i64,
}

/// The mutable field set submitted when adding or editing a record.
#[derive(Debug, Clone, Default)]
pub struct RecordDraft {
    pub username: String,
    pub password: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub platform: String,
    pub note: Option<String>,
}

/// A record ready for insertion with caller-supplied timestamps - import
/// keeps the times carried by the export file.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub draft: RecordDraft,
    pub created: Timestamp,
    pub updated: Timestamp,
}

/// Which field a search runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchField {
    Platform,
    Username,
    Password,
    Phone,
    Email,
    Note,
    Any,
}

impl SearchField {
    /// Column name for fields stored as plain text. `Password` and `Any`
    /// have none: the password column holds cipher text, so those matches
    /// run over decrypted records instead of in SQL.
    pub(crate) fn column(self) -> Option<&'static str> {
        match self {
            Self::Platform => Some("platform"),
            Self::Username => Some("username"),
            Self::Phone => Some("phone"),
            Self::Email => Some("email"),
            Self::Note => Some("note"),
            Self::Password | Self::Any => None,
        }
    }
}
