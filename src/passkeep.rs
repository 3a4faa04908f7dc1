use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, trace};
use tokio::sync::watch;

use crate::backend::Backend;
use crate::crypto::FieldCipher;
use crate::error::{Error, Result};
use crate::export::{ExportDocument, ExportItem};
use crate::record::{Record, RecordDraft, SearchField};
use crate::session::SessionStore;
use crate::time::Timestamp;
use crate::user::calc_pwhash;

fn into_key(path: &Path) -> PathBuf {
    path.join("field.key")
}

/// The store itself: owns the database handle, the field cipher and the
/// session preference file. Register/login/resume hand out the
/// authenticated handle everything else lives on.
pub struct PassKeep {
    backend: Backend,
    cipher: FieldCipher,
    session: SessionStore,
    changes: watch::Sender<u64>,
}

/// Handle scoped to a proven user. Every record operation goes through
/// here, so each query and mutation carries the owner's id.
pub struct PassKeepAuthed {
    store: Arc<PassKeep>,
    user_id: i64,
    username: String,
}

impl PassKeep {
    /// Open (or create) the store inside `data_dir`: database file, field
    /// key and preference file all live there.
    pub async fn open(data_dir: &Path) -> Result<Arc<Self>> {
        let backend = Backend::new(data_dir).await?;
        let cipher = FieldCipher::load_or_generate(&into_key(data_dir))?;
        let session = SessionStore::new(data_dir);
        let (changes, _) = watch::channel(0);

        Ok(Arc::new(Self {
            backend,
            cipher,
            session,
            changes,
        }))
    }

    pub async fn close(&self) {
        self.backend.close().await;
    }

    pub async fn register(
        self: &Arc<Self>,
        username: &str,
        password: &str,
    ) -> Result<PassKeepAuthed> {
        if self.backend.find_user(username).await?.is_some() {
            info!("registration rejected, {username} already taken");
            return Err(Error::UsernameTaken(username.into()));
        }

        let now = Timestamp::now()?;
        let user_id = self
            .backend
            .insert_user(username, &calc_pwhash(password), now)
            .await?;

        info!("{username} registered");
        self.enter(user_id, username.into())
    }

    pub async fn login(
        self: &Arc<Self>,
        username: &str,
        password: &str,
    ) -> Result<PassKeepAuthed> {
        let user = self.backend.find_user(username).await?.ok_or_else(|| {
            info!("rejecting non-existent user {username}");
            Error::BadCredentials
        })?;

        if calc_pwhash(password) != user.pwhash {
            info!("wrong password for {username}");
            return Err(Error::BadCredentials);
        }

        info!("{username} logged in");
        self.enter(user.id, user.username)
    }

    /// Re-enter a session persisted by an earlier login, if any. A stale
    /// session pointing at a user that no longer exists is cleared.
    pub async fn resume(self: &Arc<Self>) -> Result<Option<PassKeepAuthed>> {
        let Some(user_id) = self.session.user_id() else {
            return Ok(None);
        };

        match self.backend.find_user_by_id(user_id).await? {
            Some(user) => {
                debug!("resumed session for {}", user.username);
                self.enter(user.id, user.username).map(Some)
            }
            None => {
                debug!("clearing stale session for unknown user id {user_id}");
                self.session.clear()?;
                Ok(None)
            }
        }
    }

    fn enter(self: &Arc<Self>, user_id: i64, username: String) -> Result<PassKeepAuthed> {
        self.session.save(user_id)?;

        Ok(PassKeepAuthed {
            store: Arc::clone(self),
            user_id,
            username,
        })
    }
}

impl PassKeepAuthed {
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn logout(&self) -> Result<()> {
        info!("{} logout", self.username);
        self.store.session.clear()
    }

    /// Ticks after every mutation to this store; callers watching a list
    /// re-run their query when it does.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.store.changes.subscribe()
    }

    /// All of this user's records, most recently updated first.
    pub async fn records(&self) -> Result<Vec<Record>> {
        trace!("{} listing records", self.username);

        let records = self.store.backend.records_for_user(self.user_id).await?;
        self.open_all(records)
    }

    /// Substring search against one field, or all of them.
    pub async fn search(&self, field: SearchField, query: &str) -> Result<Vec<Record>> {
        trace!("{} searching {field:?}", self.username);

        if let Some(column) = field.column() {
            let records = self
                .store
                .backend
                .search_column(self.user_id, column, query)
                .await?;
            return self.open_all(records);
        }

        // the password takes part in the match, so it has to happen on
        // decrypted records; approximate LIKE's case folding
        let needle = query.to_lowercase();
        let matched = self
            .records()
            .await?
            .into_iter()
            .filter(|record| {
                let contains = |s: &str| s.to_lowercase().contains(&needle);
                let contains_opt =
                    |s: &Option<String>| s.as_deref().map_or(false, contains);

                let password = contains(&record.password);
                match field {
                    SearchField::Password => password,
                    _ => {
                        password
                            || contains(&record.platform)
                            || contains(&record.username)
                            || contains_opt(&record.phone)
                            || contains_opt(&record.email)
                            || contains_opt(&record.note)
                    }
                }
            })
            .collect();

        Ok(matched)
    }

    pub async fn record(&self, id: i64) -> Result<Option<Record>> {
        let record = self.store.backend.record_by_id(self.user_id, id).await?;
        record.map(|r| self.open(r)).transpose()
    }

    pub async fn add(&self, draft: RecordDraft) -> Result<i64> {
        info!("{} adding a record for {}", self.username, draft.platform);

        let now = Timestamp::now()?;
        let sealed = self.seal(draft)?;
        let id = self
            .store
            .backend
            .insert_record(self.user_id, &sealed, now)
            .await?;

        self.bump();
        Ok(id)
    }

    /// Full replace of the mutable fields; `updated` is refreshed,
    /// `created` kept. Updating an id this user doesn't own is a no-op.
    pub async fn update(&self, id: i64, draft: RecordDraft) -> Result<()> {
        info!("{} updating record {id}", self.username);

        let now = Timestamp::now()?;
        let sealed = self.seal(draft)?;
        let updated = self
            .store
            .backend
            .update_record(self.user_id, id, &sealed, now)
            .await?;

        if updated {
            self.bump();
        } else {
            debug!("{} has no record {id}, nothing updated", self.username);
        }

        Ok(())
    }

    /// Deleting an id this user doesn't own (or that is gone) is a no-op.
    pub async fn delete(&self, id: i64) -> Result<()> {
        info!("{} deleting record {id}", self.username);

        let deleted = self.store.backend.delete_record(self.user_id, id).await?;

        if deleted {
            self.bump();
        } else {
            debug!("{} has no record {id}, nothing deleted", self.username);
        }

        Ok(())
    }

    /// Snapshot every record into a JSON document at `path`. Returns the
    /// number of records written.
    pub async fn export_to(&self, path: &Path) -> Result<usize> {
        let records = self.records().await?;
        let count = records.len();

        let items = records.iter().map(ExportItem::from).collect();
        ExportDocument::new(items, Timestamp::now()?).write_to(path)?;

        info!("{} exported {count} records to {}", self.username, path.display());
        Ok(count)
    }

    /// Read an export file and bulk-insert its items for this user,
    /// keeping the items' own timestamps. A parse or I/O failure aborts
    /// before anything is written; there is no partial commit.
    pub async fn import_from(&self, path: &Path) -> Result<usize> {
        let doc = ExportDocument::read_from(path)?;
        debug!(
            "import document of {}, version {}",
            Timestamp::from_millis(doc.export_time),
            doc.version,
        );

        let mut rows = Vec::with_capacity(doc.passwords.len());
        for item in doc.passwords {
            let mut row = item.into_new_record();
            row.draft.password = self.store.cipher.encrypt(&row.draft.password)?;
            rows.push(row);
        }

        let ids = self.store.backend.insert_records(self.user_id, rows).await?;

        if !ids.is_empty() {
            self.bump();
        }

        info!("{} imported {} records", self.username, ids.len());
        Ok(ids.len())
    }

    fn bump(&self) {
        self.store.changes.send_modify(|generation| *generation += 1);
    }

    fn seal(&self, mut draft: RecordDraft) -> Result<RecordDraft> {
        draft.password = self.store.cipher.encrypt(&draft.password)?;
        Ok(draft)
    }

    fn open(&self, mut record: Record) -> Result<Record> {
        record.password = self.store.cipher.decrypt(&record.password)?;
        Ok(record)
    }

    fn open_all(&self, records: Vec<Record>) -> Result<Vec<Record>> {
        records.into_iter().map(|r| self.open(r)).collect()
    }
}

#[cfg(test)]
mod test {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use super::*;

    fn temp_data_dir(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();

        let dir = std::env::temp_dir().join(format!(
            "passkeep-store-{tag}-{}-{nanos}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    async fn open_store(tag: &str) -> Arc<PassKeep> {
        let _ = pretty_env_logger::try_init();
        PassKeep::open(&temp_data_dir(tag)).await.unwrap()
    }

    fn draft(platform: &str, password: &str) -> RecordDraft {
        RecordDraft {
            username: "rob".into(),
            password: password.into(),
            phone: Some("0123456".into()),
            email: Some("rob@example.com".into()),
            platform: platform.into(),
            note: None,
        }
    }

    #[tokio::test]
    async fn register_then_login_returns_same_user() {
        let store = open_store("register-login").await;

        let registered = store.register("rob", "hunter2").await.unwrap();
        let logged_in = store.login("rob", "hunter2").await.unwrap();

        assert_eq!(registered.user_id(), logged_in.user_id());
        assert_eq!(logged_in.username(), "rob");
    }

    #[tokio::test]
    async fn bad_credentials_all_look_alike() {
        let store = open_store("bad-credentials").await;
        store.register("rob", "hunter2").await.unwrap();

        // wrong password and unknown user surface the same error
        assert!(matches!(
            store.login("rob", "wrong").await,
            Err(Error::BadCredentials)
        ));
        assert!(matches!(
            store.login("nobody", "hunter2").await,
            Err(Error::BadCredentials)
        ));
    }

    #[tokio::test]
    async fn duplicate_registration_rejected_without_mutation() {
        let store = open_store("duplicate-registration").await;

        let rob = store.register("rob", "hunter2").await.unwrap();
        rob.add(draft("github", "secret")).await.unwrap();

        assert!(matches!(
            store.register("rob", "other").await,
            Err(Error::UsernameTaken(_))
        ));

        // the existing account and its data are untouched
        let rob = store.login("rob", "hunter2").await.unwrap();
        assert_eq!(rob.records().await.unwrap().len(), 1);
        assert!(matches!(
            store.login("rob", "other").await,
            Err(Error::BadCredentials)
        ));
    }

    #[tokio::test]
    async fn created_record_round_trips() {
        let store = open_store("create-get").await;
        let rob = store.register("rob", "hunter2").await.unwrap();

        let submitted = draft("github", "secret");
        let id = rob.add(submitted.clone()).await.unwrap();

        let record = rob.record(id).await.unwrap().unwrap();
        assert_eq!(record.username, submitted.username);
        assert_eq!(record.password, submitted.password);
        assert_eq!(record.phone, submitted.phone);
        assert_eq!(record.email, submitted.email);
        assert_eq!(record.platform, submitted.platform);
        assert_eq!(record.note, submitted.note);
        assert_eq!(record.created, record.updated);
        assert_eq!(record.user_id, rob.user_id());

        let listed = rob.records().await.unwrap();
        assert_eq!(listed, vec![record]);
    }

    #[tokio::test]
    async fn missing_record_is_none() {
        let store = open_store("missing-record").await;
        let rob = store.register("rob", "hunter2").await.unwrap();

        assert!(rob.record(999).await.unwrap().is_none());
        rob.delete(999).await.unwrap();
        rob.update(999, draft("github", "secret")).await.unwrap();
        assert!(rob.records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_refreshes_updated_and_keeps_created() {
        let store = open_store("update").await;
        let rob = store.register("rob", "hunter2").await.unwrap();

        let id = rob.add(draft("github", "secret")).await.unwrap();
        let before = rob.record(id).await.unwrap().unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;

        let mut edited = draft("github", "rotated");
        edited.note = Some("rotated after the breach".into());
        rob.update(id, edited.clone()).await.unwrap();

        let after = rob.record(id).await.unwrap().unwrap();
        assert_eq!(after.password, "rotated");
        assert_eq!(after.note, edited.note);
        assert_eq!(after.created, before.created);
        assert!(after.updated > before.updated);
    }

    #[tokio::test]
    async fn deleted_record_disappears() {
        let store = open_store("delete").await;
        let rob = store.register("rob", "hunter2").await.unwrap();

        let id = rob.add(draft("github", "secret")).await.unwrap();
        let kept = rob.add(draft("mastodon", "other")).await.unwrap();

        rob.delete(id).await.unwrap();

        assert!(rob.record(id).await.unwrap().is_none());
        let ids: Vec<_> = rob.records().await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![kept]);
        assert!(rob
            .search(SearchField::Platform, "github")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn search_per_field_and_any() {
        let store = open_store("search").await;
        let rob = store.register("rob", "hunter2").await.unwrap();

        let mut github = draft("github", "secret");
        github.note = Some("work account".into());
        rob.add(github).await.unwrap();

        let mut bank = draft("bank", "hunter-reuse");
        bank.email = Some("accounts@bank.example".into());
        rob.add(bank).await.unwrap();

        let by_platform = rob.search(SearchField::Platform, "hub").await.unwrap();
        assert_eq!(by_platform.len(), 1);
        assert_eq!(by_platform[0].platform, "github");

        let by_note = rob.search(SearchField::Note, "work").await.unwrap();
        assert_eq!(by_note.len(), 1);

        let by_email = rob.search(SearchField::Email, "bank.example").await.unwrap();
        assert_eq!(by_email.len(), 1);
        assert_eq!(by_email[0].platform, "bank");

        // password search runs over decrypted values
        let by_password = rob.search(SearchField::Password, "reuse").await.unwrap();
        assert_eq!(by_password.len(), 1);
        assert_eq!(by_password[0].platform, "bank");

        // "any" unions every field, password included
        let any: Vec<_> = rob
            .search(SearchField::Any, "hunter")
            .await
            .unwrap()
            .iter()
            .map(|r| r.platform.clone())
            .collect();
        assert_eq!(any, vec!["bank"]);

        assert!(rob
            .search(SearchField::Username, "nobody")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn records_are_cipher_text_at_rest() {
        let store = open_store("at-rest").await;
        let rob = store.register("rob", "hunter2").await.unwrap();

        let id = rob.add(draft("github", "secret")).await.unwrap();

        // straight off the table, bypassing the service layer
        let raw = store
            .backend
            .record_by_id(rob.user_id(), id)
            .await
            .unwrap()
            .unwrap();

        assert_ne!(raw.password, "secret");
        assert_eq!(store.cipher.decrypt(&raw.password).unwrap(), "secret");
    }

    #[tokio::test]
    async fn no_cross_user_visibility() {
        let store = open_store("cross-user").await;
        let alice = store.register("alice", "apple").await.unwrap();
        let bob = store.register("bob", "banana").await.unwrap();

        let id = alice.add(draft("github", "secret")).await.unwrap();

        assert!(bob.records().await.unwrap().is_empty());
        assert!(bob.record(id).await.unwrap().is_none());
        assert!(bob
            .search(SearchField::Any, "github")
            .await
            .unwrap()
            .is_empty());

        // mutations by id don't cross the user boundary either
        bob.update(id, draft("stolen", "mine-now")).await.unwrap();
        bob.delete(id).await.unwrap();

        let kept = alice.record(id).await.unwrap().unwrap();
        assert_eq!(kept.platform, "github");
        assert_eq!(kept.password, "secret");
    }

    #[tokio::test]
    async fn export_import_reproduces_records() {
        let from = open_store("export-from").await;
        let rob = from.register("rob", "hunter2").await.unwrap();

        let mut with_note = draft("github", "secret");
        with_note.note = Some("work account".into());
        rob.add(with_note).await.unwrap();

        // keep the two update times distinct so both stores list in the
        // same order
        tokio::time::sleep(Duration::from_millis(5)).await;

        let bare = RecordDraft {
            username: "rob".into(),
            password: "other".into(),
            platform: "mastodon".into(),
            ..Default::default()
        };
        rob.add(bare).await.unwrap();

        let path = temp_data_dir("export-file").join("passwords.json");
        assert_eq!(rob.export_to(&path).await.unwrap(), 2);
        assert!(crate::export::is_valid_export(&path));

        // a different store, a different field key, an empty account
        let into = open_store("import-into").await;
        let fresh = into.register("rob-on-a-new-phone", "hunter2").await.unwrap();
        assert_eq!(fresh.import_from(&path).await.unwrap(), 2);

        let exported = rob.records().await.unwrap();
        let imported = fresh.records().await.unwrap();
        assert_eq!(imported.len(), exported.len());

        for (theirs, ours) in imported.iter().zip(&exported) {
            assert_eq!(theirs.username, ours.username);
            assert_eq!(theirs.password, ours.password);
            assert_eq!(theirs.phone, ours.phone);
            assert_eq!(theirs.email, ours.email);
            assert_eq!(theirs.platform, ours.platform);
            assert_eq!(theirs.note, ours.note);
            assert_eq!(theirs.created, ours.created);
            assert_eq!(theirs.updated, ours.updated);
            assert_eq!(theirs.user_id, fresh.user_id());
        }
    }

    #[tokio::test]
    async fn malformed_import_aborts_whole_file() {
        let store = open_store("malformed-import").await;
        let rob = store.register("rob", "hunter2").await.unwrap();

        let path = temp_data_dir("malformed-file").join("broken.json");
        std::fs::write(&path, "{\"passwords\": [{\"username\": 3").unwrap();

        assert!(matches!(
            rob.import_from(&path).await,
            Err(Error::ExportFormat(_))
        ));
        assert!(rob.records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn session_resume_and_logout() {
        let store = open_store("session").await;

        assert!(store.resume().await.unwrap().is_none());

        let rob = store.register("rob", "hunter2").await.unwrap();
        drop(rob);

        let resumed = store.resume().await.unwrap().unwrap();
        assert_eq!(resumed.username(), "rob");

        resumed.logout().unwrap();
        assert!(store.resume().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_watchers_notified_on_mutation() {
        let store = open_store("watch").await;
        let rob = store.register("rob", "hunter2").await.unwrap();

        let mut changes = rob.changes();
        assert!(!changes.has_changed().unwrap());

        let id = rob.add(draft("github", "secret")).await.unwrap();
        assert!(changes.has_changed().unwrap());
        let _ = changes.borrow_and_update();

        rob.delete(id).await.unwrap();
        assert!(changes.has_changed().unwrap());

        // a no-op mutation doesn't wake the list
        let _ = changes.borrow_and_update();
        rob.delete(id).await.unwrap();
        assert!(!changes.has_changed().unwrap());
    }
}
