//! Path classes that short-circuit the access checks.

/// Pages the gateway redirects to. Always reachable, even without a usable
/// tenant, so a redirect can never loop.
pub const SYSTEM_PAGES: &[&str] = &[
    "/tenant-not-found",
    "/tenant-suspended",
    "/user-not-found",
    "/unauthorized",
    "/upgrade",
];

pub const STATIC_PREFIXES: &[&str] = &["/_next", "/static", "/favicon.ico"];

/// Reachable without a session once the tenant is known to be active.
pub const PUBLIC_PREFIXES: &[&str] = &[
    "/login",
    "/register",
    "/forgot-password",
    "/reset-password",
    "/invite",
    "/accept-invitation",
    "/api/health",
    "/health",
    "/api/auth",
    "/auth/callback",
];

/// A redirect target or a static asset.
pub fn is_system_path(path: &str) -> bool {
    is_system_page(path) || is_static_asset(path)
}

pub fn is_system_page(path: &str) -> bool {
    SYSTEM_PAGES.iter().any(|page| has_segment_prefix(path, page))
}

pub fn is_static_asset(path: &str) -> bool {
    STATIC_PREFIXES
        .iter()
        .any(|prefix| has_segment_prefix(path, prefix))
}

pub fn is_public_path(path: &str) -> bool {
    PUBLIC_PREFIXES
        .iter()
        .any(|prefix| has_segment_prefix(path, prefix))
}

/// `/login` covers `/login` and `/login/sso`, not `/login-as`. A path with a
/// `.` or `..` segment never matches.
fn has_segment_prefix(path: &str, prefix: &str) -> bool {
    if path.split('/').any(|segment| segment == "." || segment == "..") {
        return false;
    }

    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
