//! Core types shared by every apigee module.
//!
//! At the moment this is the error taxonomy; see [`error`].

pub mod error;

pub use error::{ApigeeError, ErrorContext, user_friendly_error};
