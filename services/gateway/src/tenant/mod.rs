//! Host to tenant resolution.
//!
//! A request host is reduced to a subdomain by a [`SubdomainStrategy`], then
//! looked up through the [`TenantResolver`], which keeps directory answers in a
//! [`TtlCache`](crate::cache::TtlCache) so repeat requests for the same school
//! never reach the [`TenantDirectory`].

mod directory;
mod error;
mod host;
mod resolver;

pub use directory::{HttpTenantDirectory, TenantDirectory};
pub use error::{DirectoryError, ResolveError};
pub use host::{is_valid_subdomain, LabelSubdomainStrategy, SubdomainStrategy};
pub use resolver::{TenantCache, TenantResolver};

/// Directory lookup path, relative to the configured base URL.
pub const RESOLVE_PATH: &str = "/resolve";
