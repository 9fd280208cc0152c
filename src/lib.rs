//! Apigee Edge management client
//!
//! Pulls an API proxy revision out of an Apigee Edge organization, together
//! with the environment-scoped resources it references, into a local work tree
//! that can be edited, diffed and committed.
//!
//! # Architecture Overview
//!
//! A pull runs in fixed stages:
//! 1. export the proxy bundle (a zip) through the management API
//! 2. unpack it under `<work_tree>/<api>/`
//! 3. scan the unpacked XML for key-value map and target server references
//! 4. fetch each referenced resource into `keyvaluemaps/<env>/` and `targetservers/<env>/`
//! 5. optionally prefix every reference, and rewrite the proxy's base path
//!
//! # Core Modules
//!
//! - [`client`] - management API calls ([`client::ResourceClient`], [`client::ManagementClient`])
//! - [`pull`] - the pull workflow, dependency scanning, export and rewriting
//! - [`config`] - `~/.apigee/config.toml` and `APIGEE_*` environment overrides
//! - [`core`] - error types and user-facing error contexts
//! - [`utils`] - file system helpers
//! - [`cli`] - the `apigee` command line
//!
//! # Configuration
//!
//! ```toml
//! # ~/.apigee/config.toml
//! base_url = "https://api.enterprise.apigee.com"
//! org = "acme"
//! username = "ops@example.com"
//! password = "..."
//! ```
//!
//! # Example
//!
//! ```bash
//! apigee pull --name orders --environment test --revision 3 --prefix test-
//! ```

pub mod cli;
pub mod client;
pub mod config;
pub mod constants;
pub mod core;
pub mod pull;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
