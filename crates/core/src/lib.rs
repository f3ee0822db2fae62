//! Courier Portal Core - Shared types library.
//!
//! This crate provides common types used across all courier portal components:
//! - `portal` - Delivery-agent web portal (HTTP API + store)
//! - `cli` - Command-line tools for migrations and agent management
//!
//! # Architecture
//!
//! The core crate contains only types and pure helpers - no I/O, no database
//! access, no HTTP clients. This keeps it lightweight and allows it to be used
//! anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, emails, statuses, and addresses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
