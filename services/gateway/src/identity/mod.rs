mod context;
mod error;
mod gate;
mod session;

pub use context::{HttpUserContextProvider, UserContextProvider};
pub use error::{SessionError, UserContextError};
pub use gate::{Authentication, IdentityGate};
pub use session::{JwtSessionProvider, Session, SessionProvider};

pub const AUTHORIZATION_HEADER: &str = "authorization";
pub const COOKIE_HEADER: &str = "cookie";
pub const TENANT_ID_HEADER: &str = "x-tenant-id";
pub const USER_ID_HEADER: &str = "x-user-id";

/// User context lookup path, relative to the configured base URL.
pub const CONTEXT_PATH: &str = "/context";
