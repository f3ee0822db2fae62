//! Business logic services.
//!
//! Services borrow the store (and, for profiles, object storage) for the
//! duration of a request and hold no state of their own.

pub mod orders;
pub mod profile;
pub mod reconcile;

pub use orders::{Completion, OrderDetail, OrderError, OrderService};
pub use profile::{ProfileError, ProfileInput, ProfileService};
pub use reconcile::{IdentityReconciler, ReconcileError, ReconcileOutcome, SyncKind};
