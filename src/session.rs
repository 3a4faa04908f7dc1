use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::error;

use crate::error::Result;

const USER_ID_KEY: &str = "user_id";

type KeyValues = HashMap<String, String>;

/// Preference file holding the logged-in user id, one `key: value` pair
/// per line. An absent file or absent key means logged out.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("prefs.txt"),
        }
    }

    pub fn user_id(&self) -> Option<i64> {
        let kv = match self.read() {
            Ok(kv) => kv,
            Err(e) => {
                error!("couldn't read preferences: {e}");
                return None;
            }
        };

        kv.get(USER_ID_KEY)?.parse().ok()
    }

    pub fn save(&self, user_id: i64) -> Result<()> {
        let mut kv = self.read()?;
        kv.insert(USER_ID_KEY.into(), user_id.to_string());
        self.write(&kv)
    }

    pub fn clear(&self) -> Result<()> {
        let mut kv = self.read()?;
        kv.remove(USER_ID_KEY);
        self.write(&kv)
    }

    fn read(&self) -> Result<KeyValues> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(KeyValues::new()),
            Err(e) => return Err(e.into()),
        };

        let mut kv = KeyValues::new();

        for line in BufReader::new(file).lines() {
            let line = line?;

            let Some((k, v)) = line.split_once(": ") else {
                error!("invalid preference line, skipping");
                continue;
            };

            kv.insert(k.into(), v.into());
        }

        Ok(kv)
    }

    fn write(&self, keyvalues: &KeyValues) -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)?;

        for (k, v) in keyvalues {
            writeln!(file, "{}: {}", k, v)?;
        }

        Ok(())
    }
}
