use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::record::{NewRecord, Record, RecordDraft};
use crate::time::Timestamp;

/// Version tag written into every export document.
pub const EXPORT_VERSION: u32 = 1;

/// One denormalized credential in an export file. Carries no record id
/// and no owner; import re-attaches the importing user.
#[derive(Debug, Clone, PartialEq)]
#[serde_with::skip_serializing_none]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportItem {
    pub username: String,
    pub password: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub platform: String,
    pub note: Option<String>,
    pub create_time: i64,
    pub update_time: i64,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub passwords: Vec<ExportItem>,
    pub export_time: i64,
    pub version: u32,
}

// expects a record whose password has already been decrypted
impl From<&Record> for ExportItem {
    fn from(record: &Record) -> Self {
        Self {
            username: record.username.clone(),
            password: record.password.clone(),
            phone: record.phone.clone(),
            email: record.email.clone(),
            platform: record.platform.clone(),
            note: record.note.clone(),
            create_time: record.created.as_millis(),
            update_time: record.updated.as_millis(),
        }
    }
}

impl ExportItem {
    /// Re-attachable row: the plain-text password still needs sealing and
    /// the row an owner before it can be inserted.
    pub fn into_new_record(self) -> NewRecord {
        NewRecord {
            draft: RecordDraft {
                username: self.username,
                password: self.password,
                phone: self.phone,
                email: self.email,
                platform: self.platform,
                note: self.note,
            },
            created: Timestamp::from_millis(self.create_time),
            updated: Timestamp::from_millis(self.update_time),
        }
    }
}

impl ExportDocument {
    pub fn new(passwords: Vec<ExportItem>, export_time: Timestamp) -> Self {
        Self {
            passwords,
            export_time: export_time.as_millis(),
            version: EXPORT_VERSION,
        }
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Whole-file read and parse: any I/O or JSON failure aborts the
    /// import before a single row is touched.
    pub fn read_from(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Pre-flight check for a caller-chosen file: does it parse as an export
/// document and hold at least one item?
pub fn is_valid_export(path: &Path) -> bool {
    match ExportDocument::read_from(path) {
        Ok(doc) => !doc.passwords.is_empty(),
        Err(_) => false,
    }
}
