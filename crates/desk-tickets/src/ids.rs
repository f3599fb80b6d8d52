//! Platform identities used by ticket records and the platform collaborator.
//!
//! Every identity is a 64-bit snowflake. Each kind gets its own newtype so a
//! channel id can never be passed where a category id is expected; all of them
//! serialize as plain JSON numbers.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

snowflake_id!(
    /// Text channel hosting a ticket; primary key of a ticket record.
    ChannelId
);
snowflake_id!(
    /// Platform user.
    UserId
);
snowflake_id!(
    /// Grouping container a ticket channel lives under.
    CategoryId
);
snowflake_id!(
    /// Role claim (staff, unlimited tickets).
    RoleId
);
snowflake_id!(MessageId);
