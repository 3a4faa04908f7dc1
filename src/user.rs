use crate::time::Timestamp;

#[derive(Debug)]
#[derive(sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub pwhash: String,
    pub created: Timestamp,
}

/// Digest stored in (and compared against) `User::pwhash`. Account
/// passwords are never persisted in the clear.
pub fn calc_pwhash(password: &str) -> String {
    sha256::digest(password)
}
