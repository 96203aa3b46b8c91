//! Shared types for guestprep and its in-guest helper.

pub mod errors;

pub use errors::{GuestprepError, GuestprepResult};
