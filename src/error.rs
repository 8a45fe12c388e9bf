use thiserror::Error;

/// Why a login attempt was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// The service rejected the username/password pair.
    InvalidCredentials,
    /// The credential exchange could not be completed over the network.
    TransportFailure,
    /// The login pages did not look like what the client expects
    /// (e.g. no CSRF token on the login form).
    UnexpectedResponseShape,
}

/// Why a scrobble edit was given up on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditFailureReason {
    /// Transient failures kept happening until the retry budget ran out.
    ExhaustedRetries,
    /// The backend surfaced a validation error for the submission.
    Rejected(String),
    /// The session expired again after the one silent re-login.
    SessionExpired,
    /// An ambiguous response, and reading the scrobble back did not show the new values.
    Unverified,
    /// No stored scrobble matched the edit's criteria.
    NoMatches,
}

impl std::fmt::Display for EditFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EditFailureReason::ExhaustedRetries => write!(f, "exhausted retries"),
            EditFailureReason::Rejected(reason) => write!(f, "rejected: {reason}"),
            EditFailureReason::SessionExpired => write!(f, "session expired after re-login"),
            EditFailureReason::Unverified => write!(f, "edit not visible after submission"),
            EditFailureReason::NoMatches => write!(f, "no matching scrobbles"),
        }
    }
}

/// Error types for Last.fm operations.
///
/// Every public operation either returns a usable value or fails with one of
/// these variants. The variants carry enough context (page number, credential
/// vs. transport distinction, matched vs. edited counts) for the caller to
/// decide whether retrying at a higher level makes sense.
///
/// # Examples
///
/// ```rust,no_run
/// use scrobble_edit::{LastFmEditClientImpl, LastFmError};
///
/// #[tokio::main]
/// async fn main() {
///     let client = LastFmEditClientImpl::new(Box::new(http_client::native::NativeClient::new()));
///
///     match client.login("username", "password").await {
///         Ok(_) => println!("Login successful"),
///         Err(LastFmError::Auth { message, .. }) => eprintln!("Authentication failed: {message}"),
///         Err(LastFmError::RateLimit { retry_after }) => {
///             eprintln!("Rate limited, retry in {retry_after} seconds");
///         }
///         Err(e) => eprintln!("Other error: {e}"),
///     }
/// }
/// ```
#[derive(Error, Debug)]
pub enum LastFmError {
    /// An operation needed a session and none is established.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Login was rejected or could not be completed.
    #[error("Authentication failed ({kind:?}): {message}")]
    Auth {
        kind: AuthErrorKind,
        message: String,
    },

    /// Malformed caller input, e.g. a no-op edit or a negative limit.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Network or connection failure reported by the transport.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The backend answered with an unexpected HTTP status.
    #[error("HTTP status {status} for {url}")]
    HttpStatus { status: u16, url: String },

    /// A page could not be decoded into records, or a record into an entity.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// CSRF token not found in a form page.
    ///
    /// This typically indicates that the page structure has changed
    /// or that the request was blocked.
    #[error("CSRF token not found")]
    CsrfNotFound,

    /// The backend asked us to slow down.
    ///
    /// `retry_after` is the number of seconds to wait before the next attempt.
    #[error("Rate limited, retry after {retry_after} seconds")]
    RateLimit { retry_after: u64 },

    /// The backend no longer accepts the session (redirect to the login page).
    #[error("Session expired")]
    SessionExpired,

    /// A specific page failed while driving a paginated sequence.
    #[error("Failed to fetch page {page}: {cause}")]
    Fetch {
        page: u32,
        #[source]
        cause: Box<LastFmError>,
    },

    /// A scrobble edit could not be completed.
    #[error("Edit failed ({reason}); {edited} of {matched} matched scrobbles edited")]
    EditFailed {
        reason: EditFailureReason,
        matched: usize,
        edited: usize,
    },

    /// A backoff wait was interrupted through [`CancellationState`](crate::CancellationState).
    #[error("Operation cancelled")]
    Cancelled,
}

impl LastFmError {
    /// Whether the edit engine should retry after this error.
    ///
    /// Transport failures, rate limits, session expiry and server-side (5xx)
    /// statuses are transient; everything else is final.
    pub fn is_transient(&self) -> bool {
        match self {
            LastFmError::Transport(_) | LastFmError::RateLimit { .. } | LastFmError::SessionExpired => {
                true
            }
            LastFmError::HttpStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Page number attached to a [`LastFmError::Fetch`] error.
    pub fn page(&self) -> Option<u32> {
        match self {
            LastFmError::Fetch { page, .. } => Some(*page),
            _ => None,
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        LastFmError::InvalidArgument(message.into())
    }
}
