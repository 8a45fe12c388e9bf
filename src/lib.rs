//! # scrobble-edit
//!
//! A session-aware client for browsing a Last.fm library and editing
//! scrobbles through the web interface.
//!
//! ```rust,no_run
//! use scrobble_edit::{LastFmEditClientImpl, Result, ScrobbleEdit};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let http_client = http_client::native::NativeClient::new();
//!     let client = LastFmEditClientImpl::new(Box::new(http_client));
//!     client.login("username", "password").await?;
//!
//!     let edit = ScrobbleEdit::for_artist("Radiohed", "Radiohead")?;
//!     let response = client.edit_scrobble(&edit).await?;
//!     println!("{}", response.message());
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod client;
pub mod config;
pub mod decoder;
pub mod edit;
pub mod edit_analysis;
mod edit_engine;
pub mod error;
pub mod events;
pub mod headers;
pub mod iterator;
mod login;
pub mod matcher;
pub mod parsing;
pub mod retry;
pub mod session;
pub mod session_manager;
mod r#trait;
pub mod types;

pub use cancel::CancellationState;
pub use client::LastFmEditClientImpl;
pub use config::{ClientConfig, RateLimitConfig, DEFAULT_BASE_URL};
pub use decoder::{fields, DecodedPage, PageDecoder, PageKind, RawRecord};
pub use edit::{
    EditResponse, EditScope, ExactScrobbleEdit, FieldChanges, MatchOutcome, OutcomeKind,
    ScrobbleEdit,
};
pub use edit_analysis::{classify_edit_response, EditVerdict};
pub use error::{AuthErrorKind, EditFailureReason, LastFmError};
pub use events::{
    ClientEvent, ClientEventReceiver, ClientEventWatcher, RateLimitType, RequestInfo,
    SharedEventBroadcaster,
};
pub use iterator::{AsyncPaginatedIterator, LibraryEndpoint, PageFetcher, PaginatedSequence};
pub use matcher::{normalize, ScrobblePages};
pub use parsing::HtmlPageDecoder;
pub use r#trait::LastFmEditClient;
pub use retry::RetryConfig;
pub use session::LastFmEditSession;
pub use types::{Album, Artist, LibraryKey, Track};

#[cfg(feature = "mock")]
pub use decoder::MockPageDecoder;
#[cfg(feature = "mock")]
pub use iterator::MockPageFetcher;
#[cfg(feature = "mock")]
pub use r#trait::MockLastFmEditClient;

pub type Result<T> = std::result::Result<T, LastFmError>;
