use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

const SESSION_ID_PREFIX: &str = "mcp";

/// Opaque session key. Minted ids are `mcp_<uuid v7>`; client-supplied ids
/// are kept verbatim.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(format!("{SESSION_ID_PREFIX}_{}", Uuid::now_v7()))
    }

    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Use a client-supplied token verbatim when it is present and non-empty,
    /// otherwise mint a fresh id. Tokens are trusted as-is.
    pub fn supplied_or_new(supplied: Option<&str>) -> Self {
        match supplied {
            Some(raw) if !raw.is_empty() => Self::from_raw(raw),
            _ => Self::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
