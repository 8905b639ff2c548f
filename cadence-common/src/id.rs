//! Typed identifiers.
//!
//! Every persisted entity is keyed by a ULID wrapped in its own newtype so a
//! campaign id can never be handed to a sequence lookup. ULIDs sort by
//! creation time, which the stores rely on for stable listing order.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(ulid::Ulid);

        impl $name {
            /// Generate a new unique identifier
            #[must_use]
            pub fn generate() -> Self {
                Self(ulid::Ulid::new())
            }

            #[must_use]
            pub const fn ulid(&self) -> ulid::Ulid {
                self.0
            }
        }

        impl From<ulid::Ulid> for $name {
            fn from(id: ulid::Ulid) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ulid::DecodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                ulid::Ulid::from_string(s).map(Self)
            }
        }
    };
}

define_id!(
    /// Identifier of a drip sequence
    SequenceId
);
define_id!(
    /// Identifier of a single recipient's enrollment in a sequence
    EnrollmentId
);
define_id!(
    /// Identifier of a one-shot campaign
    CampaignId
);
define_id!(
    /// Identifier of a per-recipient campaign send record
    SendRecordId
);
define_id!(SubscriberId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_parse_display() {
        let id = CampaignId::generate();
        let parsed: CampaignId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_id_rejects_garbage() {
        assert!("not-a-ulid".parse::<SequenceId>().is_err());
    }

    #[test]
    fn test_id_serializes_as_string() {
        let id = SequenceId::generate();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }
}
