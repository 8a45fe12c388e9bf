use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authenticated session state.
///
/// A session is owned by the client's session manager; callers only ever see
/// immutable snapshots of it (via `get_session`). Cookie and CSRF material is
/// kept private to the crate, but the snapshot serializes in full so it can be
/// persisted and restored without logging in again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastFmEditSession {
    username: String,
    base_url: String,
    cookies: Vec<String>,
    csrf_token: Option<String>,
    established_at: DateTime<Utc>,
    #[serde(default)]
    last_validated_at: Option<DateTime<Utc>>,
}

impl LastFmEditSession {
    pub(crate) fn new(
        username: String,
        cookies: Vec<String>,
        csrf_token: Option<String>,
        base_url: String,
    ) -> Self {
        Self {
            username,
            base_url,
            cookies,
            csrf_token,
            established_at: Utc::now(),
            last_validated_at: None,
        }
    }

    /// The authenticated username
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Base URL of the service this session belongs to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// When the credential exchange that produced this session completed
    pub fn established_at(&self) -> DateTime<Utc> {
        self.established_at
    }

    /// When the session last passed a liveness check
    pub fn last_validated_at(&self) -> Option<DateTime<Utc>> {
        self.last_validated_at
    }

    /// Whether the snapshot carries a usable session cookie.
    ///
    /// This is a local check only; use `validate_session` to ask the backend.
    pub fn is_valid(&self) -> bool {
        !self.username.is_empty() && crate::headers::session_id(&self.cookies).is_some()
    }

    pub(crate) fn cookies(&self) -> &[String] {
        &self.cookies
    }

    pub(crate) fn cookies_mut(&mut self) -> &mut Vec<String> {
        &mut self.cookies
    }

    pub(crate) fn csrf_token(&self) -> Option<&str> {
        self.csrf_token.as_deref()
    }

    pub(crate) fn mark_validated(&mut self) {
        self.last_validated_at = Some(Utc::now());
    }

    /// Serialize session to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize session from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(cookies: Vec<&str>) -> LastFmEditSession {
        LastFmEditSession::new(
            "testuser".to_string(),
            cookies.into_iter().map(str::to_string).collect(),
            Some("csrf_token_123".to_string()),
            "https://www.last.fm".to_string(),
        )
    }

    #[test]
    fn test_session_validity() {
        assert!(session(vec!["csrftoken=abc", "sessionid=.eJy123"]).is_valid());
        assert!(!session(vec!["csrftoken=abc"]).is_valid());
        assert!(!session(vec!["sessionid="]).is_valid());
    }

    #[test]
    fn test_session_serialization() {
        let mut original = session(vec!["sessionid=.test123", "csrftoken=abc"]);
        original.mark_validated();

        let json = original.to_json().unwrap();
        let restored = LastFmEditSession::from_json(&json).unwrap();

        assert_eq!(restored, original);
        assert_eq!(restored.username(), "testuser");
        assert_eq!(restored.csrf_token(), Some("csrf_token_123"));
        assert!(restored.last_validated_at().is_some());
    }
}
