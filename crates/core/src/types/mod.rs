//! Core types for the courier portal.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod address;
pub mod email;
pub mod id;
pub mod status;

pub use address::{NO_ADDRESS, format_delivery_address};
pub use email::{Email, EmailError};
pub use id::*;
pub use status::*;
