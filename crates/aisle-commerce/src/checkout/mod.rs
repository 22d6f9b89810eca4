//! Checkout session, order persistence and the commit saga.

mod coordinator;
mod order;
mod orders;
mod session;
#[cfg(feature = "storage")]
mod sqlite;

pub use coordinator::{CheckoutCoordinator, CheckoutSettings, StoreContext};
pub use order::{CommitReceipt, FailureReason, LineFailure, Order, OrderLine, OrderStatus};
pub use orders::{BeginOutcome, InMemoryOrderStore, OrderStore};
pub use session::{CheckoutSession, CheckoutState, SubstitutionProposal};
#[cfg(feature = "storage")]
pub use sqlite::SqliteOrderStore;
