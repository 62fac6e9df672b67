//! Lock-free user identity counter
//!
//! Identities are handed out by atomic increment and reconciled with
//! identities observed elsewhere (other processes, replayed log records) by a
//! compare-and-swap loop. The counter never takes the store's table lock.
//!
//! # Sequence order
//!
//! Increments wrap, so the counter walks `1, 2, … i64::MAX, i64::MIN, … -1, 0`.
//! A negative value has wrapped past every positive one and is "later" than
//! it; `0` is the last value of the sequence. `observe(n)` moves the counter
//! from `o` to `n` exactly when `n > o`, or when `n < o` and `n < 0`.

use std::sync::atomic::{AtomicI64, Ordering};

use shortstore_core::User;

/// Process-wide user identity generator
#[derive(Debug, Default)]
pub struct UserCounter {
    value: AtomicI64,
}

impl UserCounter {
    /// Create a counter starting at 0 (no identity issued yet)
    pub fn new() -> Self {
        Self {
            value: AtomicI64::new(0),
        }
    }

    /// Create a counter starting at a given value
    pub fn starting_at(value: i64) -> Self {
        Self {
            value: AtomicI64::new(value),
        }
    }

    /// Allocate the next identity
    ///
    /// Wraps on overflow, following the sequence order above.
    pub fn next(&self) -> User {
        User::new(self.value.fetch_add(1, Ordering::SeqCst).wrapping_add(1))
    }

    /// Current value
    pub fn current(&self) -> User {
        User::new(self.value.load(Ordering::SeqCst))
    }

    /// Advance the counter to `user` if it comes later in sequence order
    ///
    /// Returns true if the counter moved.
    pub fn observe(&self, user: User) -> bool {
        let n = user.as_i64();
        let mut o = self.value.load(Ordering::SeqCst);
        while is_later(n, o) {
            match self
                .value
                .compare_exchange(o, n, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return true,
                Err(actual) => o = actual,
            }
        }
        false
    }
}

/// Whether `n` follows `o` in the wrapping sequence order
fn is_later(n: i64, o: i64) -> bool {
    n > o || (n < o && n < 0)
}
