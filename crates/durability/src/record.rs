//! Log record format
//!
//! The log is UTF-8 text with one JSON object per line:
//!
//! ```text
//! {"id":"<short id>","url":"<full url>","user":"<decimal user>","deleted":false}
//! ```
//!
//! `user` is written as a string. The reader also accepts a bare JSON
//! integer there. Tombstones carry `"deleted":true` and an empty `url`.

use serde::{Deserialize, Serialize};

use shortstore_core::{FullUrl, ShortId, User};

use crate::error::LogError;

/// One durability record: a live mapping or a tombstone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Short id the record is about
    pub id: ShortId,
    /// Target URL, empty for tombstones
    #[serde(default)]
    pub url: FullUrl,
    /// Owning user
    #[serde(with = "user_as_string")]
    pub user: User,
    /// Whether this record tombstones `id`
    #[serde(default)]
    pub deleted: bool,
}

impl LogRecord {
    /// Record for a newly stored mapping
    pub fn live(id: ShortId, url: FullUrl, user: User) -> Self {
        Self {
            id,
            url,
            user,
            deleted: false,
        }
    }

    /// Record tombstoning `id` on behalf of its owner
    pub fn tombstone(id: ShortId, user: User) -> Self {
        Self {
            id,
            url: FullUrl::empty(),
            user,
            deleted: true,
        }
    }

    /// Decode one line (without or with its trailing newline)
    pub fn decode(line: &[u8], offset: u64) -> Result<Self, LogError> {
        serde_json::from_slice(line).map_err(|source| LogError::Malformed { offset, source })
    }

    /// Append this record and a newline to `buf`
    pub fn encode_into(&self, buf: &mut Vec<u8>) -> Result<(), LogError> {
        serde_json::to_writer(&mut *buf, self).map_err(LogError::Encode)?;
        buf.push(b'\n');
        Ok(())
    }
}

/// Encode records as consecutive lines
pub fn encode_lines(records: &[LogRecord]) -> Result<Vec<u8>, LogError> {
    let mut buf = Vec::with_capacity(records.len() * 96);
    for record in records {
        record.encode_into(&mut buf)?;
    }
    Ok(buf)
}

mod user_as_string {
    use serde::de::{self, Deserializer};
    use serde::{Deserialize, Serializer};

    use shortstore_core::User;

    pub fn serialize<S: Serializer>(user: &User, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(user)
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<User, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(User::new(n)),
            Raw::Text(s) => s
                .parse::<User>()
                .map_err(|e| de::Error::custom(format!("invalid user {:?}: {}", s, e))),
        }
    }
}
