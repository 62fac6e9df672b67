//! Content-derived short id generation
//!
//! The same URL always yields the same id, so shortening a URL twice
//! reports a conflict carrying the id that already exists.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use xxhash_rust::xxh3::xxh3_64;

use crate::types::{FullUrl, ShortId};

/// Length of a derived id: 8 hash bytes in unpadded base64
pub const DERIVED_ID_LEN: usize = 11;

impl ShortId {
    /// Derive the short id for a URL
    ///
    /// xxh3-64 over the URL bytes, big-endian, URL-safe base64 without
    /// padding.
    pub fn derive(url: &FullUrl) -> ShortId {
        let digest = xxh3_64(url.as_str().as_bytes());
        ShortId::new(URL_SAFE_NO_PAD.encode(digest.to_be_bytes()))
    }
}
