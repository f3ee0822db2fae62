//! Domain models for the courier portal.
//!
//! These are validated domain objects, separate from the database row types
//! in [`crate::db::postgres`].

pub mod agent;
pub mod identity;
pub mod order;
pub mod session;
pub mod user;

pub use agent::{Agent, AgentStats, NewAgent, ProfileUpdate};
pub use identity::Identity;
pub use order::{
    AssignedOrder, Assignment, IgnoredOrder, NewOrder, NewOrderItem, Order, OrderItem,
};
pub use session::keys as session_keys;
pub use user::{NewUser, User};
