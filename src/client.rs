use crate::cancel::CancellationState;
use crate::config::{ClientConfig, DEFAULT_BASE_URL};
use crate::decoder::PageDecoder;
use crate::events::{ClientEvent, ClientEventReceiver, ClientEventWatcher, SharedEventBroadcaster};
use crate::iterator::{EndpointFetcher, LibraryEndpoint, PageFetcher, PaginatedSequence, RecordMapper};
use crate::matcher::{self, ScrobblePages};
use crate::parsing::HtmlPageDecoder;
use crate::session::LastFmEditSession;
use crate::session_manager::SessionManager;
use crate::{Album, Artist, LastFmError, Result, Track};
use async_trait::async_trait;
use http_client::HttpClient;
use std::sync::Arc;

/// Main client for browsing a Last.fm library and editing scrobbles through
/// the web interface.
///
/// Clones are cheap and share one session, one event broadcaster and one
/// cancellation flag.
///
/// # Examples
///
/// ```rust,no_run
/// use scrobble_edit::{LastFmEditClientImpl, Result};
///
/// #[tokio::main]
/// async fn main() -> Result<()> {
///     let http_client = http_client::native::NativeClient::new();
///     let client = LastFmEditClientImpl::new(Box::new(http_client));
///
///     client.login("username", "password").await?;
///     assert!(client.is_logged_in());
///
///     let mut artists = client.get_artists(20)?;
///     while let Some(artist) = artists.next().await? {
///         println!("{artist}");
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone, Debug)]
pub struct LastFmEditClientImpl {
    session: Arc<SessionManager>,
    config: ClientConfig,
    broadcaster: Arc<SharedEventBroadcaster>,
    cancellation: CancellationState,
}

impl LastFmEditClientImpl {
    /// Create a client for `https://www.last.fm` with the HTML decoder and
    /// default configuration.
    pub fn new(client: Box<dyn HttpClient>) -> Self {
        Self::with_config(
            Arc::from(client),
            Arc::new(HtmlPageDecoder::default()),
            DEFAULT_BASE_URL,
            ClientConfig::default(),
        )
    }

    /// Create a client with an explicit transport, decoder, base URL and configuration.
    pub fn with_config(
        client: Arc<dyn HttpClient>,
        decoder: Arc<dyn PageDecoder>,
        base_url: impl Into<String>,
        config: ClientConfig,
    ) -> Self {
        let broadcaster = Arc::new(SharedEventBroadcaster::new());
        let session = SessionManager::new(client, decoder, base_url, &config, broadcaster.clone());
        Self {
            session: Arc::new(session),
            config,
            broadcaster,
            cancellation: CancellationState::new(),
        }
    }

    /// Create a client from a previously persisted session.
    ///
    /// The client has no stored credentials, so an expired session cannot be
    /// renewed silently.
    pub fn from_session(client: Box<dyn HttpClient>, session: LastFmEditSession) -> Self {
        let base_url = session.base_url().to_string();
        let client = Self::with_config(
            Arc::from(client),
            Arc::new(HtmlPageDecoder::default()),
            base_url,
            ClientConfig::default(),
        );
        client.restore_session(session);
        client
    }

    /// Create a client and log in with it.
    pub async fn login_with_credentials(
        client: Box<dyn HttpClient>,
        username: &str,
        password: &str,
    ) -> Result<Self> {
        let client = Self::new(client);
        client.login(username, password).await?;
        Ok(client)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub(crate) fn session_manager(&self) -> &SessionManager {
        &self.session
    }

    /// Log in and store the credentials for silent re-login.
    ///
    /// A failed login leaves the previous session (if any) in place.
    pub async fn login(&self, username: &str, password: &str) -> Result<LastFmEditSession> {
        self.session.login(username, password).await
    }

    pub fn username(&self) -> Result<String> {
        self.session.username()
    }

    pub fn is_logged_in(&self) -> bool {
        self.session.is_authenticated()
    }

    /// Snapshot of the current session, e.g. for persisting with
    /// [`LastFmEditSession::to_json`].
    pub fn get_session(&self) -> Result<LastFmEditSession> {
        self.session.get_session()
    }

    pub fn restore_session(&self, session: LastFmEditSession) {
        self.session.restore_session(session);
    }

    pub fn logout(&self) {
        self.session.logout();
    }

    /// Ask the backend whether the current session is still accepted.
    pub async fn validate_session(&self) -> Result<bool> {
        self.session.validate_session().await
    }

    /// Fetch one page of the scrobble log, newest first.
    pub async fn get_recent_scrobbles(&self, page: u32) -> Result<Vec<Track>> {
        if page == 0 {
            return Err(LastFmError::invalid("Pages are numbered from 1"));
        }
        let fetcher = EndpointFetcher::new(
            self.session.clone(),
            LibraryEndpoint::RecentScrobbles,
            self.config.page_size,
        );
        let decoded = fetcher.fetch_page(page).await?;

        let mut tracks = Vec::with_capacity(decoded.records.len());
        for record in &decoded.records {
            match Track::from_record(record) {
                Ok(track) => tracks.push(track),
                Err(e) => log::warn!("Skipping unreadable scrobble on page {page}: {e}"),
            }
        }
        log::debug!("Parsed {} scrobbles from page {page}", tracks.len());
        Ok(tracks)
    }

    /// The scrobble log as a sequence. `limit == 0` reads until the log runs out.
    pub fn get_recent_tracks(&self, limit: i64) -> Result<PaginatedSequence<Track>> {
        self.sequence(LibraryEndpoint::RecentScrobbles, Track::from_record, limit)
    }

    /// The scrobble log from `page` onwards.
    pub fn get_recent_tracks_from_page(
        &self,
        page: u32,
        limit: i64,
    ) -> Result<PaginatedSequence<Track>> {
        if page == 0 {
            return Err(LastFmError::invalid("Pages are numbered from 1"));
        }
        Ok(self.get_recent_tracks(limit)?.from_page(page))
    }

    /// Tracks in the library for `artist`.
    pub fn get_artist_tracks(&self, artist: &str, limit: i64) -> Result<PaginatedSequence<Track>> {
        let endpoint = LibraryEndpoint::ArtistTracks {
            artist: require_artist(artist)?,
        };
        self.sequence(endpoint, Track::from_record, limit)
    }

    pub fn get_artists(&self, limit: i64) -> Result<PaginatedSequence<Artist>> {
        self.sequence(LibraryEndpoint::Artists, Artist::from_record, limit)
    }

    pub fn get_albums(&self, limit: i64) -> Result<PaginatedSequence<Album>> {
        self.sequence(LibraryEndpoint::Albums, Album::from_record, limit)
    }

    /// Albums in the library for `artist`.
    pub fn get_artist_albums(&self, artist: &str, limit: i64) -> Result<PaginatedSequence<Album>> {
        let endpoint = LibraryEndpoint::ArtistAlbums {
            artist: require_artist(artist)?,
        };
        self.sequence(endpoint, Album::from_record, limit)
    }

    /// Tracks of one album in the library, in album order.
    pub fn get_album_tracks(
        &self,
        album: &str,
        artist: &str,
        limit: i64,
    ) -> Result<PaginatedSequence<Track>> {
        if album.trim().is_empty() {
            return Err(LastFmError::invalid("Album name must not be empty"));
        }
        let endpoint = LibraryEndpoint::AlbumTracks {
            artist: require_artist(artist)?,
            album: album.to_string(),
        };
        self.sequence(endpoint, Track::from_record, limit)
    }

    /// Every stored scrobble of one track, newest first.
    pub fn get_track_scrobbles(
        &self,
        track: &str,
        artist: &str,
        limit: i64,
    ) -> Result<PaginatedSequence<Track>> {
        if track.trim().is_empty() {
            return Err(LastFmError::invalid("Track name must not be empty"));
        }
        let endpoint = LibraryEndpoint::TrackScrobbles {
            artist: require_artist(artist)?,
            track: track.to_string(),
        };
        self.sequence(endpoint, Track::from_record, limit)
    }

    /// Tracks in the library matching `query`.
    pub fn search_tracks(&self, query: &str, limit: i64) -> Result<PaginatedSequence<Track>> {
        let endpoint = LibraryEndpoint::SearchTracks {
            query: require_query(query)?,
        };
        self.sequence(endpoint, Track::from_record, limit)
    }

    /// Albums in the library matching `query`.
    pub fn search_albums(&self, query: &str, limit: i64) -> Result<PaginatedSequence<Album>> {
        let endpoint = LibraryEndpoint::SearchAlbums {
            query: require_query(query)?,
        };
        self.sequence(endpoint, Album::from_record, limit)
    }

    fn sequence<T>(
        &self,
        endpoint: LibraryEndpoint,
        mapper: RecordMapper<T>,
        limit: i64,
    ) -> Result<PaginatedSequence<T>> {
        let limit = usize::try_from(limit)
            .map_err(|_| LastFmError::invalid(format!("Limit must not be negative, got {limit}")))?;
        // Fail before the first fetch, not on it.
        self.session.snapshot()?;

        let fetcher = EndpointFetcher::new(self.session.clone(), endpoint, self.config.page_size);
        Ok(PaginatedSequence::new(Arc::new(fetcher), mapper, limit))
    }

    /// Most recent scrobble of `track_name` by `artist_name` in the first
    /// `max_pages` pages of the scrobble log.
    pub async fn find_recent_scrobble_for_track(
        &self,
        track_name: &str,
        artist_name: &str,
        max_pages: u32,
    ) -> Result<Option<Track>> {
        matcher::find_recent_scrobble_for_track(self, track_name, artist_name, max_pages).await
    }

    /// The scrobble recorded at exactly `timestamp`, searching `max_pages` pages.
    pub async fn find_scrobble_by_timestamp(
        &self,
        timestamp: u64,
        max_pages: u32,
    ) -> Result<Option<Track>> {
        matcher::find_scrobble_by_timestamp(self, timestamp, max_pages).await
    }

    /// Subscribe to client events.
    pub fn subscribe(&self) -> ClientEventReceiver {
        self.broadcaster.subscribe()
    }

    /// Watch the most recent event.
    pub fn watch_events(&self) -> ClientEventWatcher {
        self.broadcaster.watch()
    }

    pub fn latest_event(&self) -> Option<ClientEvent> {
        self.broadcaster.latest_event()
    }

    pub(crate) fn broadcaster(&self) -> &SharedEventBroadcaster {
        &self.broadcaster
    }

    /// Cancellation flag for backoff waits, shared by all clones.
    pub fn cancellation(&self) -> &CancellationState {
        &self.cancellation
    }
}

fn require_artist(artist: &str) -> Result<String> {
    if artist.trim().is_empty() {
        return Err(LastFmError::invalid("Artist name must not be empty"));
    }
    Ok(artist.to_string())
}

fn require_query(query: &str) -> Result<String> {
    let query = query.trim();
    if query.is_empty() {
        return Err(LastFmError::invalid("Search query must not be empty"));
    }
    Ok(query.to_string())
}

#[async_trait]
impl ScrobblePages for LastFmEditClientImpl {
    async fn scrobble_page(&self, page: u32) -> Result<Vec<Track>> {
        self.get_recent_scrobbles(page).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_client::{Error, Request, Response};

    #[derive(Debug)]
    struct Unreachable;

    #[async_trait]
    impl HttpClient for Unreachable {
        async fn send(&self, _req: Request) -> std::result::Result<Response, Error> {
            panic!("no request expected");
        }
    }

    fn client() -> LastFmEditClientImpl {
        LastFmEditClientImpl::with_config(
            Arc::new(Unreachable),
            Arc::new(HtmlPageDecoder::default()),
            "https://www.last.fm/",
            ClientConfig::default(),
        )
    }

    #[tokio::test]
    async fn browsing_checks_arguments_before_any_request() {
        let client = client();

        assert!(matches!(
            client.get_artists(-1),
            Err(LastFmError::InvalidArgument(_))
        ));
        assert!(matches!(
            client.get_albums(0),
            Err(LastFmError::NotAuthenticated)
        ));
        assert!(matches!(
            client.get_artist_tracks(" ", 5),
            Err(LastFmError::InvalidArgument(_))
        ));
        assert!(matches!(
            client.get_recent_scrobbles(1).await,
            Err(LastFmError::NotAuthenticated)
        ));
        assert!(matches!(
            client.get_recent_scrobbles(0).await,
            Err(LastFmError::InvalidArgument(_))
        ));
        assert!(matches!(
            client.search_tracks("   ", 0),
            Err(LastFmError::InvalidArgument(_))
        ));
        assert!(matches!(
            client.get_album_tracks("", "Radiohead", 0),
            Err(LastFmError::InvalidArgument(_))
        ));
        assert!(matches!(
            client.get_recent_tracks_from_page(0, 10),
            Err(LastFmError::InvalidArgument(_))
        ));
    }

    #[test]
    fn clones_share_session_state() {
        let client = client();
        let clone = client.clone();
        assert!(!clone.is_logged_in());
        assert!(matches!(client.username(), Err(LastFmError::NotAuthenticated)));

        client.cancellation().cancel();
        assert!(clone.cancellation().is_cancelled());
    }
}
