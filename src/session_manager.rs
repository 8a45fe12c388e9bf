//! Authentication state and authenticated request helpers.
//!
//! One [`SessionManager`] sits behind an `Arc` shared by every clone of a
//! client. The session itself lives in a `std::sync::Mutex` that is only held
//! for copying or merging state, never across an `.await`. Every installed
//! session gets a new generation number; cookies from a response are merged
//! back only if the session that issued the request is still current.

use crate::config::{ClientConfig, RateLimitConfig};
use crate::decoder::{DecodedPage, PageDecoder, PageKind};
use crate::events::{ClientEvent, RateLimitType, RequestInfo, SharedEventBroadcaster};
use crate::headers;
use crate::session::LastFmEditSession;
use crate::{LastFmError, Result};
use http_client::{HttpClient, Request, Response};
use http_types::Url;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Path requested by [`SessionManager::validate_session`]; only reachable when logged in.
const VALIDATION_PATH: &str = "/settings/subscription/automatic-edits/tracks";

/// Username and password kept for silent re-login.
#[derive(Clone)]
pub(crate) struct Credentials {
    pub(crate) username: String,
    pub(crate) password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Default)]
struct SessionState {
    session: Option<LastFmEditSession>,
    generation: u64,
    credentials: Option<Credentials>,
}

pub struct SessionManager {
    http: Arc<dyn HttpClient>,
    decoder: Arc<dyn PageDecoder>,
    base_url: String,
    rate_limit: RateLimitConfig,
    max_redirects: u32,
    broadcaster: Arc<SharedEventBroadcaster>,
    state: Mutex<SessionState>,
    relogin_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock_state();
        f.debug_struct("SessionManager")
            .field("base_url", &self.base_url)
            .field("authenticated", &state.session.is_some())
            .field("generation", &state.generation)
            .finish()
    }
}

impl SessionManager {
    pub fn new(
        http: Arc<dyn HttpClient>,
        decoder: Arc<dyn PageDecoder>,
        base_url: impl Into<String>,
        config: &ClientConfig,
        broadcaster: Arc<SharedEventBroadcaster>,
    ) -> Self {
        Self {
            http,
            decoder,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limit: config.rate_limit.clone(),
            max_redirects: config.max_redirects,
            broadcaster,
            state: Mutex::new(SessionState::default()),
            relogin_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Base URL of the current session, or the configured one when logged out.
    pub fn base_url(&self) -> String {
        self.lock_state()
            .session
            .as_ref()
            .map(|session| session.base_url().to_string())
            .unwrap_or_else(|| self.base_url.clone())
    }

    pub(crate) fn configured_base_url(&self) -> &str {
        &self.base_url
    }

    /// Current session and its generation.
    pub(crate) fn snapshot(&self) -> Result<(LastFmEditSession, u64)> {
        let state = self.lock_state();
        match &state.session {
            Some(session) => Ok((session.clone(), state.generation)),
            None => Err(LastFmError::NotAuthenticated),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock_state().session.is_some()
    }

    pub fn username(&self) -> Result<String> {
        Ok(self.snapshot()?.0.username().to_string())
    }

    pub fn get_session(&self) -> Result<LastFmEditSession> {
        Ok(self.snapshot()?.0)
    }

    fn install(&self, session: LastFmEditSession, credentials: Option<Credentials>) -> u64 {
        let mut state = self.lock_state();
        state.generation += 1;
        state.session = Some(session);
        if credentials.is_some() {
            state.credentials = credentials;
        }
        state.generation
    }

    /// Install a previously persisted session.
    ///
    /// Stored credentials survive only if they belong to the same user.
    pub fn restore_session(&self, session: LastFmEditSession) {
        let mut state = self.lock_state();
        if state
            .credentials
            .as_ref()
            .is_some_and(|c| c.username != session.username())
        {
            state.credentials = None;
        }
        state.generation += 1;
        state.session = Some(session);
    }

    /// Drop the session and any stored credentials.
    pub fn logout(&self) {
        let mut state = self.lock_state();
        state.generation += 1;
        state.session = None;
        state.credentials = None;
        log::debug!("Session cleared");
    }

    /// Log in and make the resulting session current.
    ///
    /// A failed attempt leaves whatever session was installed before untouched.
    pub async fn login(&self, username: &str, password: &str) -> Result<LastFmEditSession> {
        let session = self.exchange_credentials(username, password).await?;
        self.install(
            session.clone(),
            Some(Credentials {
                username: username.to_string(),
                password: password.to_string(),
            }),
        );
        log::info!("Logged in as {username}");
        Ok(session)
    }

    /// Replace an expired session using the stored credentials.
    ///
    /// Serialized under an async lock: when several callers notice the same
    /// expiry, only the first one logs in and the rest see the new generation.
    pub(crate) async fn relogin(&self, stale_generation: u64) -> Result<()> {
        let _guard = self.relogin_lock.lock().await;

        let credentials = {
            let state = self.lock_state();
            if state.generation != stale_generation && state.session.is_some() {
                log::debug!("Session already renewed by another caller");
                return Ok(());
            }
            state.credentials.clone()
        };
        let Some(credentials) = credentials else {
            log::warn!("Session expired and no stored credentials to log in again");
            return Err(LastFmError::SessionExpired);
        };

        log::info!("Session expired, logging in again as {}", credentials.username);
        let session = self
            .exchange_credentials(&credentials.username, &credentials.password)
            .await?;
        self.install(session, None);
        self.broadcaster.broadcast_event(ClientEvent::SessionRenewed {
            username: credentials.username,
        });
        Ok(())
    }

    /// Ask the backend whether the current session is still accepted.
    ///
    /// `false` when the request is redirected to the login page or refused with
    /// 401/403; a transport error (or having no session at all) is an error.
    pub async fn validate_session(&self) -> Result<bool> {
        let (session, generation) = self.snapshot().map_err(|_| {
            LastFmError::Transport("No session to validate".to_string())
        })?;
        let url = format!("{}{VALIDATION_PATH}", session.base_url());

        let request = headers::get_request(&url, session.cookies(), None)?;
        let response = self.send(request, "GET", &url).await?;
        self.merge_cookies(&response, generation);

        let status: u16 = response.status().into();
        let valid = match status {
            300..=399 => !location(&response).is_some_and(|loc| loc.contains("/login")),
            401 | 403 => false,
            500..=599 => return Err(LastFmError::HttpStatus { status, url }),
            _ => (200..300).contains(&status),
        };

        log::debug!("Session validation returned {status}, valid={valid}");
        if valid {
            let mut state = self.lock_state();
            if state.generation == generation {
                if let Some(session) = state.session.as_mut() {
                    session.mark_validated();
                }
            }
        }
        Ok(valid)
    }

    /// Send one request, publishing start/completion events.
    pub(crate) async fn send(&self, request: Request, method: &str, url: &str) -> Result<Response> {
        let request_info = RequestInfo::from_url(method, url);
        let request_start = Instant::now();
        log::debug!("{}", request_info.short_description());

        self.broadcaster.broadcast_event(ClientEvent::RequestStarted {
            request: request_info.clone(),
        });

        let response = self
            .http
            .send(request)
            .await
            .map_err(|e| LastFmError::Transport(e.to_string()))?;

        self.broadcaster.broadcast_event(ClientEvent::RequestCompleted {
            request: request_info,
            status_code: response.status().into(),
            duration_ms: request_start.elapsed().as_millis() as u64,
        });
        Ok(response)
    }

    fn merge_cookies(&self, response: &Response, generation: u64) {
        let mut state = self.lock_state();
        if state.generation != generation {
            log::trace!("Dropping cookies for a replaced session");
            return;
        }
        if let Some(session) = state.session.as_mut() {
            headers::merge_cookies(response, session.cookies_mut());
        }
    }

    /// Authenticated GET returning the decoded page.
    ///
    /// Listing pages are user content (a scrobble can be titled "Slow Down"),
    /// so only the other kinds are checked against the rate limit patterns.
    pub(crate) async fn get_page(&self, url: &str, kind: PageKind) -> Result<DecodedPage> {
        let body = self.get(url).await?;
        if !kind.is_listing() {
            self.check_rate_limit_body(&body, "GET", url)?;
        }
        self.decoder.decode(&body, kind)
    }

    /// Authenticated GET with redirect handling and status-based rate-limit
    /// detection.
    ///
    /// A redirect to the login page means the session is no longer accepted.
    async fn get(&self, url: &str) -> Result<Vec<u8>> {
        let mut current = url.to_string();

        for _ in 0..=self.max_redirects {
            let (session, generation) = self.snapshot()?;
            let referer = current
                .contains("page=")
                .then(|| current.split('?').next().unwrap_or(&current).to_string());

            let request = headers::get_request(&current, session.cookies(), referer.as_deref())?;
            let mut response = self.send(request, "GET", &current).await?;
            self.merge_cookies(&response, generation);

            let status: u16 = response.status().into();
            if (300..400).contains(&status) {
                let target = location(&response).ok_or_else(|| LastFmError::HttpStatus {
                    status,
                    url: current.clone(),
                })?;
                if target.contains("/login") {
                    log::debug!("Redirect from {current} to login page, session expired");
                    return Err(LastFmError::SessionExpired);
                }
                let next = resolve_location(&current, &target)?;
                log::debug!("Following redirect from {current} to {next}");
                current = next;
                continue;
            }

            self.check_rate_limit_status(&response, status, "GET", &current)?;
            if !(200..300).contains(&status) {
                return Err(LastFmError::HttpStatus {
                    status,
                    url: current,
                });
            }

            let body = response
                .body_bytes()
                .await
                .map_err(|e| LastFmError::Transport(e.to_string()))?;
            return Ok(body);
        }

        Err(LastFmError::Transport(format!("Too many redirects for {url}")))
    }

    /// Authenticated URL-encoded POST (AJAX headers) returning status and decoded page.
    ///
    /// Non-2xx responses that aren't transient come back undecoded as an empty
    /// page, leaving the verdict to the caller.
    pub(crate) async fn post_form(
        &self,
        url: &str,
        referer: &str,
        form: &[(&str, String)],
        kind: PageKind,
    ) -> Result<(u16, DecodedPage)> {
        let (session, generation) = self.snapshot()?;
        let request = headers::form_request(url, referer, session.cookies(), form, true)?;
        let mut response = self.send(request, "POST", url).await?;
        self.merge_cookies(&response, generation);

        let status: u16 = response.status().into();
        if (300..400).contains(&status)
            && location(&response).is_some_and(|loc| loc.contains("/login"))
        {
            return Err(LastFmError::SessionExpired);
        }
        self.check_rate_limit_status(&response, status, "POST", url)?;
        if status >= 500 {
            return Err(LastFmError::HttpStatus {
                status,
                url: url.to_string(),
            });
        }

        let body = response
            .body_bytes()
            .await
            .map_err(|e| LastFmError::Transport(e.to_string()))?;
        self.check_rate_limit_body(&body, "POST", url)?;

        if !(200..300).contains(&status) {
            return Ok((status, DecodedPage::new(kind, Vec::new())));
        }
        Ok((status, self.decoder.decode(&body, kind)?))
    }

    pub(crate) fn decoder(&self) -> &dyn PageDecoder {
        self.decoder.as_ref()
    }

    pub(crate) fn rate_limit_config(&self) -> &RateLimitConfig {
        &self.rate_limit
    }

    fn rate_limited(
        &self,
        retry_after: u64,
        rate_limit_type: RateLimitType,
        method: &str,
        url: &str,
    ) -> LastFmError {
        log::debug!("Rate limited ({rate_limit_type:?}) on {method} {url}, retry after {retry_after}s");
        self.broadcaster.broadcast_event(ClientEvent::RateLimited {
            delay_seconds: retry_after,
            request: Some(RequestInfo::from_url(method, url)),
            rate_limit_type,
        });
        LastFmError::RateLimit { retry_after }
    }

    fn check_rate_limit_status(
        &self,
        response: &Response,
        status: u16,
        method: &str,
        url: &str,
    ) -> Result<()> {
        if !self.rate_limit.detect_by_status {
            return Ok(());
        }
        match status {
            429 => {
                let retry_after = response
                    .header("retry-after")
                    .and_then(|h| h.get(0))
                    .and_then(|v| v.as_str().trim().parse::<u64>().ok())
                    .unwrap_or(self.rate_limit.default_retry_after);
                Err(self.rate_limited(retry_after, RateLimitType::Http429, method, url))
            }
            // 403s on authenticated requests are how the backend throttles.
            403 => Err(self.rate_limited(
                self.rate_limit.default_retry_after,
                RateLimitType::Http403,
                method,
                url,
            )),
            _ => Ok(()),
        }
    }

    pub(crate) fn check_rate_limit_body(&self, body: &[u8], method: &str, url: &str) -> Result<()> {
        let text = String::from_utf8_lossy(body);
        match self.rate_limit.matched_pattern(&text) {
            Some(pattern) => {
                log::debug!("Response body matches rate limit pattern '{pattern}'");
                Err(self.rate_limited(
                    self.rate_limit.default_retry_after,
                    RateLimitType::ResponsePattern,
                    method,
                    url,
                ))
            }
            None => Ok(()),
        }
    }
}

fn location(response: &Response) -> Option<String> {
    response
        .header("location")
        .and_then(|values| values.get(0))
        .map(|value| value.as_str().to_string())
}

fn resolve_location(current: &str, target: &str) -> Result<String> {
    let base = current
        .parse::<Url>()
        .map_err(|e| LastFmError::invalid(format!("Invalid URL '{current}': {e}")))?;
    base.join(target)
        .map(|url| url.to_string())
        .map_err(|e| LastFmError::Parse(format!("Invalid redirect '{target}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_debug_hides_password() {
        let credentials = Credentials {
            username: "alice".to_string(),
            password: "hunter2".to_string(),
        };
        let debug = format!("{credentials:?}");
        assert!(debug.contains("alice"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn relative_redirects_resolve_against_current_url() {
        assert_eq!(
            resolve_location("https://www.last.fm/user/u/library?page=2", "/user/u/library?page=3")
                .unwrap(),
            "https://www.last.fm/user/u/library?page=3"
        );
        assert_eq!(
            resolve_location("https://www.last.fm/a/b", "https://other.example/x").unwrap(),
            "https://other.example/x"
        );
    }
}
