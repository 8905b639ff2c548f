//! Newsletter subscribers.
//!
//! Subscribers are owned by the surrounding application; the engine reads
//! them for campaign sends and flips `unsubscribed` on global unsubscribe.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::SubscriberId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: SubscriberId,
    pub email: String,
    /// Opaque token embedded in unsubscribe links
    pub unsubscribe_token: String,
    pub unsubscribed: bool,
    pub subscribed_at: DateTime<Utc>,
}

impl Subscriber {
    #[must_use]
    pub fn new(email: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: SubscriberId::generate(),
            email: email.into(),
            unsubscribe_token: new_token(),
            unsubscribed: false,
            subscribed_at: now,
        }
    }
}

/// A fresh unsubscribe token.
///
/// ULIDs carry 80 random bits, enough that tokens cannot be guessed from
/// one another.
#[must_use]
pub fn new_token() -> String {
    ulid::Ulid::new().to_string().to_ascii_lowercase()
}
