//! Integration test suite for the Apigee client
//!
//! End-to-end pulls against an in-memory management API, plus the `apigee`
//! binary driven through `assert_cmd`. No test talks to a real Apigee
//! organization.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **pull**: complete pulls, overwrite protection, prefixing and base-path rewrites
//! - **cli**: argument handling, error output and exit codes of the binary

mod cli;
mod pull;
