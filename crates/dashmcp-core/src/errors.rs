use crate::ids::SessionId;

/// Failures of the session multiplexing core.
///
/// Creation and dispatch failures surface to the client as an internal-error
/// envelope. `NotFound` is only produced by explicit session deletion.
/// `Close` is logged by whoever tears a session down and never propagated.
#[derive(Clone, Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session creation failed: {0}")]
    Creation(String),
    #[error("dispatch failed: {0}")]
    Dispatch(String),
    #[error("session {0} not found")]
    NotFound(SessionId),
    #[error("close failed: {0}")]
    Close(String),
}

impl SessionError {
    /// Short classification string for log fields.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Creation(_) => "session_creation",
            Self::Dispatch(_) => "dispatch",
            Self::NotFound(_) => "session_not_found",
            Self::Close(_) => "close",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_detail() {
        let err = SessionError::Creation("transport already bound".into());
        assert_eq!(err.to_string(), "session creation failed: transport already bound");

        let err = SessionError::NotFound(SessionId::from_raw("abc"));
        assert_eq!(err.to_string(), "session abc not found");
    }

    #[test]
    fn error_kind_strings() {
        assert_eq!(SessionError::Close("x".into()).error_kind(), "close");
        assert_eq!(
            SessionError::NotFound(SessionId::new()).error_kind(),
            "session_not_found"
        );
    }
}
