//! Global constants used throughout the apigee codebase.
//!
//! Endpoint defaults, on-disk layout names and environment variable names live
//! here so the work-tree contract is spelled out in one place.

/// Management API used when neither the config file nor `APIGEE_BASE_URL` names one.
pub const DEFAULT_BASE_URL: &str = "https://api.enterprise.apigee.com";

/// Directory (under the home directory) that holds `config.toml`.
pub const CONFIG_DIR_NAME: &str = ".apigee";

/// File name of the user configuration.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Work-tree directory holding exported key-value maps, one subdirectory per environment.
pub const KEYVALUEMAPS_DIR: &str = "keyvaluemaps";

/// Work-tree directory holding exported target servers, one subdirectory per environment.
pub const TARGETSERVERS_DIR: &str = "targetservers";

/// Root folder inside every proxy bundle.
pub const APIPROXY_DIR: &str = "apiproxy";

/// Proxy endpoint file carrying the `BasePath`, relative to the unpacked proxy directory.
pub const DEFAULT_PROXY_ENDPOINT: &str = "apiproxy/proxies/default.xml";

/// Extension of the transient bundle archive written next to the proxy directory.
pub const BUNDLE_EXTENSION: &str = "zip";

/// Path components never touched by the prefixing pass.
pub const VCS_METADATA_NAMES: &[&str] = &[".git"];

/// Environment variable overriding the management API base URL.
pub const ENV_BASE_URL: &str = "APIGEE_BASE_URL";

/// Environment variable overriding the organization.
pub const ENV_ORG: &str = "APIGEE_ORG";

/// Environment variable overriding the basic-auth username.
pub const ENV_USERNAME: &str = "APIGEE_USERNAME";

/// Environment variable overriding the basic-auth password.
pub const ENV_PASSWORD: &str = "APIGEE_PASSWORD";

/// Environment variable supplying a bearer token (takes precedence over basic auth).
pub const ENV_TOKEN: &str = "APIGEE_TOKEN";
