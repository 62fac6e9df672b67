//! Core types for the shortstore
//!
//! This module defines the foundational types:
//! - ShortId: opaque short key identifying a stored URL
//! - FullUrl: the original long-form URL
//! - User: integer identity scoping a per-user view
//! - SavedUrls, BatchRequest, BatchResponse: collection aliases used by the
//!   storage contract

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// Short opaque key identifying a stored URL
///
/// ShortIds are assumed collision-free; the content-derived
/// [`ShortId::derive`] function produces them for [`crate::Storage::put`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShortId(String);

impl ShortId {
    /// Wrap an existing identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the inner string
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ShortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ShortId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ShortId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for ShortId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// The original long-form URL text
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FullUrl(String);

impl FullUrl {
    /// Wrap a URL string
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// The empty URL, carried by tombstone records
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// Borrow the URL text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check whether the URL text is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume into the inner string
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for FullUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FullUrl {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for FullUrl {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Integer identity scoping a view of stored URLs
///
/// `User::DEFAULT` (0) is the reserved anonymous/global namespace. It is
/// used both for anonymous lookup and as the uniqueness domain for all ids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct User(i64);

impl User {
    /// The reserved DefaultUser identity
    pub const DEFAULT: User = User(0);

    /// Create a user from its raw integer identity
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Raw integer identity
    pub const fn as_i64(&self) -> i64 {
        self.0
    }

    /// Check whether this is the reserved DefaultUser
    pub const fn is_default(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for User {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(User)
    }
}

impl From<i64> for User {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<User> for i64 {
    fn from(user: User) -> Self {
        user.0
    }
}

/// Caller-chosen key correlating a batch entry with its assigned ShortId
pub type CorrelationId = String;

/// Mapping ShortId → FullUrl, one per user plus the global view
pub type SavedUrls = HashMap<ShortId, FullUrl>;

/// Batch of URLs to shorten, keyed by correlation id
pub type BatchRequest = HashMap<CorrelationId, FullUrl>;

/// Assigned ShortIds for the batch entries that were stored
pub type BatchResponse = HashMap<CorrelationId, ShortId>;
