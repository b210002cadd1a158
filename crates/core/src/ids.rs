//! Integer identifiers for persisted records.
//!
//! Each record kind gets its own newtype so an order id can never be passed where a
//! sample id is expected.

use serde::{Deserialize, Serialize};

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
            utoipa::ToSchema,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

record_id!(
    /// Identifier of an authenticated user.
    UserId
);
record_id!(PatientId);
record_id!(OrderId);
record_id!(OrderItemId);
record_id!(SampleId);
record_id!(ResultId);
record_id!(ReportId);
record_id!(
    /// Identifier of a catalog test definition.
    TestId
);
