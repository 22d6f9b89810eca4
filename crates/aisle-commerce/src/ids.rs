//! Newtype ids.
//!
//! Every id is an opaque string. Ids compare lexicographically, and routing,
//! pricing and substitution all lean on that order to break ties the same
//! way on every run.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Fresh time-ordered id.
            pub fn generate() -> Self {
                Self(uuid::Uuid::now_v7().simple().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(
    /// Catalog product, e.g. `milk-1l`.
    ProductId
);
define_id!(
    /// One physical store; every stock row is keyed by it.
    StoreId
);
define_id!(
    /// Node of the store graph: an aisle, the entrance or the tills.
    AisleId
);
define_id!(DealId);
define_id!(
    /// Idempotency key of a checkout.
    OrderId
);
define_id!(UserId);
define_id!(
    /// Soft hold on stock.
    ReservationId
);
