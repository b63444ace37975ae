use thiserror::Error;

/// The four error kinds spec.md §7 names. Every pipeline primitive returns
/// either a success carrying a value, or a failure carrying one of these.
#[derive(Error, Debug)]
pub enum OkapiError {
    /// 4xx-class input/validation failure (bad id, redirect loop,
    /// conflicting auth headers, ...).
    #[error("{0}")]
    User(String),

    /// An id referenced by the caller does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Auth/tenant resolution failure — no tenant could be determined for
    /// the request.
    #[error("{0}")]
    Forbidden(String),

    /// Store/bus/upstream-connection failure.
    #[error("{0}")]
    Internal(String),

    /// Unclassified — wraps an error from a dependency we don't interpret.
    #[error("{0}")]
    Any(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl OkapiError {
    pub fn status_code(&self) -> u16 {
        match self {
            OkapiError::User(_) => 400,
            OkapiError::NotFound(_) => 404,
            OkapiError::Forbidden(_) => 403,
            OkapiError::Internal(_) => 500,
            OkapiError::Any(_) => 500,
            OkapiError::Io(_) => 500,
            OkapiError::Serde(_) => 400,
        }
    }

    pub fn to_json_body(&self) -> Vec<u8> {
        let body = serde_json::json!({
            "error": self.to_string(),
            "status": self.status_code(),
        });
        serde_json::to_vec(&body).unwrap_or_else(|_| b"{\"error\":\"internal\"}".to_vec())
    }

    /// Short plain-text body for the proxy's own client-facing 4xx/5xx
    /// responses (not the admin API's JSON envelope — see spec.md §7).
    pub fn to_plain_body(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(OkapiError::User("bad".into()).status_code(), 400);
        assert_eq!(OkapiError::NotFound("m1".into()).status_code(), 404);
        assert_eq!(OkapiError::Forbidden("no tenant".into()).status_code(), 403);
        assert_eq!(OkapiError::Internal("boom".into()).status_code(), 500);
        assert_eq!(OkapiError::Any("?".into()).status_code(), 500);
    }

    #[test]
    fn test_json_body_is_valid_json() {
        let err = OkapiError::NotFound("m-ghost".into());
        let parsed: serde_json::Value = serde_json::from_slice(&err.to_json_body()).unwrap();
        assert_eq!(parsed["status"], 404);
        assert!(parsed["error"].as_str().unwrap().contains("m-ghost"));
    }

    #[test]
    fn test_plain_body_is_just_the_message() {
        let err = OkapiError::User("Redirect loop: /x -> /y -> /x".into());
        assert_eq!(
            String::from_utf8(err.to_plain_body()).unwrap(),
            "Redirect loop: /x -> /y -> /x"
        );
    }
}
