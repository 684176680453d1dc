//! Canonical request targets.
//!
//! The upstream client parses the forwarded URL with the `url` crate, which
//! resolves dot segments (including `%2e` spellings) and treats `\` as `/`.
//! Access is decided on the path that parser produces, so the gateway and the
//! school application always see the same path.

use thiserror::Error;
use url::Url;

const PARSE_BASE: &str = "http://gate.invalid";
const PARSE_HOST: &str = "gate.invalid";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("request target is not an absolute path: {0}")]
    NotAbsolute(String),

    #[error("request target cannot be parsed: {0}")]
    Unparseable(String),

    /// `%2F`, `%5C` or a percent-encoded unreserved character. The application
    /// may decode these into a path the gateway never evaluated.
    #[error("request path has an ambiguous percent-encoding: {0}")]
    AmbiguousEncoding(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalTarget {
    pub path: String,
    pub query: Option<String>,
}

impl CanonicalTarget {
    pub fn path_and_query(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }
}

/// Resolves dot segments, collapses empty segments and rejects ambiguous
/// percent-encodings in an origin-form request target.
pub fn canonicalize(path_and_query: &str) -> Result<CanonicalTarget, PathError> {
    if !path_and_query.starts_with('/') {
        return Err(PathError::NotAbsolute(path_and_query.to_string()));
    }

    let url = Url::parse(&format!("{}{}", PARSE_BASE, path_and_query))
        .map_err(|e| PathError::Unparseable(format!("{}: {}", path_and_query, e)))?;
    if url.host_str() != Some(PARSE_HOST) {
        return Err(PathError::Unparseable(path_and_query.to_string()));
    }

    let resolved = url.path();
    let segments: Vec<&str> = resolved.split('/').filter(|s| !s.is_empty()).collect();

    let mut path = format!("/{}", segments.join("/"));
    if resolved.ends_with('/') && !segments.is_empty() {
        path.push('/');
    }

    if has_ambiguous_escape(&path) {
        return Err(PathError::AmbiguousEncoding(path));
    }

    Ok(CanonicalTarget {
        path,
        query: url.query().map(str::to_string),
    })
}

fn has_ambiguous_escape(path: &str) -> bool {
    path.as_bytes().windows(3).any(|window| {
        if window[0] != b'%' {
            return false;
        }
        match (hex_value(window[1]), hex_value(window[2])) {
            (Some(high), Some(low)) => {
                let byte = high << 4 | low;
                byte.is_ascii_alphanumeric() || b"-._~/\\".contains(&byte)
            }
            _ => false,
        }
    })
}

fn hex_value(byte: u8) -> Option<u8> {
    (byte as char).to_digit(16).map(|digit| digit as u8)
}
