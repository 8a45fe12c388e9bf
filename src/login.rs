//! The credential exchange behind [`SessionManager::login`].

use crate::decoder::{fields, PageKind};
use crate::error::AuthErrorKind;
use crate::headers;
use crate::session::LastFmEditSession;
use crate::session_manager::SessionManager;
use crate::{LastFmError, Result};

fn auth_error(kind: AuthErrorKind, message: impl Into<String>) -> LastFmError {
    LastFmError::Auth {
        kind,
        message: message.into(),
    }
}

fn transport_failure(error: LastFmError) -> LastFmError {
    match error {
        LastFmError::Transport(message) => auth_error(AuthErrorKind::TransportFailure, message),
        other => other,
    }
}

impl SessionManager {
    /// Authenticate with username and password without touching the current session.
    ///
    /// 1. Fetch the login page for the CSRF token and initial cookies
    /// 2. Submit the login form with the credentials
    /// 3. Accept a fresh `sessionid` cookie, or a non-login page, as success
    pub(crate) async fn exchange_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<LastFmEditSession> {
        let base_url = self.configured_base_url().to_string();
        let login_url = format!("{base_url}/login");
        let mut cookies = Vec::new();

        let request = headers::get_request(&login_url, &cookies, None)?;
        let mut response = self
            .send(request, "GET", &login_url)
            .await
            .map_err(transport_failure)?;
        headers::merge_cookies(&response, &mut cookies);

        let status: u16 = response.status().into();
        if status == 429 {
            return Err(LastFmError::RateLimit {
                retry_after: self.rate_limit_config().default_retry_after,
            });
        }
        if !(200..300).contains(&status) {
            return Err(auth_error(
                AuthErrorKind::UnexpectedResponseShape,
                format!("Login page returned status {status}"),
            ));
        }

        let body = response
            .body_bytes()
            .await
            .map_err(|e| auth_error(AuthErrorKind::TransportFailure, e.to_string()))?;
        let form = self
            .decoder()
            .decode(&body, PageKind::LoginForm)
            .map_err(|e| auth_error(AuthErrorKind::UnexpectedResponseShape, e.to_string()))?
            .first();
        let csrf_token = form.get_non_empty(fields::CSRF_TOKEN).ok_or_else(|| {
            auth_error(
                AuthErrorKind::UnexpectedResponseShape,
                "CSRF token not found on login page",
            )
        })?;

        let mut form_data = vec![
            ("csrfmiddlewaretoken", csrf_token.clone()),
            ("username_or_email", username.to_string()),
            ("password", password.to_string()),
        ];
        if let Some(next) = form.get(fields::NEXT) {
            form_data.push(("next", next.to_string()));
        }

        let session_before = headers::session_id(&cookies).map(str::to_string);
        let request = headers::form_request(&login_url, &login_url, &cookies, &form_data, false)?;
        let mut response = self
            .send(request, "POST", &login_url)
            .await
            .map_err(transport_failure)?;
        headers::merge_cookies(&response, &mut cookies);

        let status: u16 = response.status().into();
        log::debug!("Login response status: {status}");
        if status == 429 {
            return Err(LastFmError::RateLimit {
                retry_after: self.rate_limit_config().default_retry_after,
            });
        }

        let new_session_cookie = headers::session_id(&cookies)
            .is_some_and(|id| session_before.as_deref() != Some(id));
        if new_session_cookie && (status == 200 || status == 302) {
            log::debug!("Login successful - authenticated session established");
            return Ok(LastFmEditSession::new(
                username.to_string(),
                cookies,
                Some(csrf_token),
                base_url,
            ));
        }

        let body = response
            .body_bytes()
            .await
            .map_err(|e| auth_error(AuthErrorKind::TransportFailure, e.to_string()))?;
        if let Some(pattern) = self
            .rate_limit_config()
            .matched_pattern(&String::from_utf8_lossy(&body))
        {
            log::debug!("Login refused with rate limit pattern '{pattern}'");
            return Err(LastFmError::RateLimit {
                retry_after: self.rate_limit_config().default_retry_after,
            });
        }

        let page = self.decoder().decode(&body, PageKind::LoginForm).ok();
        let result = page.as_ref().map(|page| page.first()).unwrap_or_default();
        let has_login_form = result.get_flag(fields::HAS_LOGIN_FORM);

        if status == 200 && page.is_some() && !has_login_form {
            log::debug!("Login left the login page behind, treating as success");
            return Ok(LastFmEditSession::new(
                username.to_string(),
                cookies,
                Some(csrf_token),
                base_url,
            ));
        }

        let errors: Vec<&str> = result.get_all(fields::ERROR).collect();
        let message = if errors.is_empty() {
            "Login failed - please check your credentials".to_string()
        } else {
            format!("Login failed: {}", errors.join("; "))
        };
        log::debug!("{message}");
        Err(auth_error(AuthErrorKind::InvalidCredentials, message))
    }
}
