//! School Gate: a multi-tenant access gateway for school web applications.
//!
//! Every request is resolved to a school by its subdomain, the signed-in user
//! is looked up within that school, and the request path is checked against
//! the school's modules, subscription tier and the user's role. Allowed
//! requests are forwarded upstream with tenant and user context headers;
//! everything else is answered with a redirect.

pub mod cache;
pub mod config;
pub mod decision;
pub mod gate;
pub mod identity;
pub mod path;
pub mod proxy;
pub mod retry;
pub mod routes;
pub mod server;
pub mod signing;
pub mod tenant;
