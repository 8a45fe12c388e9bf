use crate::edit::{EditResponse, ExactScrobbleEdit, ScrobbleEdit};
use crate::events::{ClientEvent, ClientEventReceiver};
use crate::iterator::PaginatedSequence;
use crate::session::LastFmEditSession;
use crate::{Album, Artist, LastFmEditClientImpl, Result, Track};
use async_trait::async_trait;

/// Trait for Last.fm client operations that can be mocked for testing.
///
/// [`LastFmEditClientImpl`] is the real implementation. Code that only needs
/// to browse or edit can take `&dyn LastFmEditClient` and be tested without a
/// transport.
///
/// # Mocking Support
///
/// When the `mock` feature is enabled, this crate provides `MockLastFmEditClient`
/// that implements this trait using the `mockall` library.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait LastFmEditClient: Send + Sync {
    /// Authenticate with Last.fm using username and password.
    async fn login(&self, username: &str, password: &str) -> Result<()>;

    /// Get the currently authenticated username.
    fn username(&self) -> Result<String>;

    /// Check if the client is currently authenticated.
    fn is_logged_in(&self) -> bool;

    /// Extract the current session state for persistence.
    fn get_session(&self) -> Result<LastFmEditSession>;

    /// Restore session state from a previously saved session.
    fn restore_session(&self, session: LastFmEditSession);

    fn logout(&self);

    /// Check with the backend whether the session is still accepted.
    async fn validate_session(&self) -> Result<bool>;

    /// Fetch one page of recent scrobbles.
    async fn get_recent_scrobbles(&self, page: u32) -> Result<Vec<Track>>;

    fn get_recent_tracks(&self, limit: i64) -> Result<PaginatedSequence<Track>>;

    /// The scrobble log starting at `page`.
    fn get_recent_tracks_from_page(&self, page: u32, limit: i64)
        -> Result<PaginatedSequence<Track>>;

    fn get_artist_tracks(&self, artist: &str, limit: i64) -> Result<PaginatedSequence<Track>>;

    fn get_artists(&self, limit: i64) -> Result<PaginatedSequence<Artist>>;

    fn get_albums(&self, limit: i64) -> Result<PaginatedSequence<Album>>;

    fn get_artist_albums(&self, artist: &str, limit: i64) -> Result<PaginatedSequence<Album>>;

    fn get_album_tracks(
        &self,
        album: &str,
        artist: &str,
        limit: i64,
    ) -> Result<PaginatedSequence<Track>>;

    /// Every stored scrobble of one track.
    fn get_track_scrobbles(
        &self,
        track: &str,
        artist: &str,
        limit: i64,
    ) -> Result<PaginatedSequence<Track>>;

    /// Search the library's tracks.
    fn search_tracks(&self, query: &str, limit: i64) -> Result<PaginatedSequence<Track>>;

    /// Search the library's albums.
    fn search_albums(&self, query: &str, limit: i64) -> Result<PaginatedSequence<Album>>;

    /// Find the most recent scrobble of a track in the first `max_pages` pages.
    async fn find_recent_scrobble_for_track(
        &self,
        track_name: &str,
        artist_name: &str,
        max_pages: u32,
    ) -> Result<Option<Track>>;

    /// Find a scrobble by its timestamp in the first `max_pages` pages.
    async fn find_scrobble_by_timestamp(&self, timestamp: u64, max_pages: u32)
        -> Result<Option<Track>>;

    /// Edit every scrobble in the edit's scope.
    async fn edit_scrobble(&self, edit: &ScrobbleEdit) -> Result<EditResponse>;

    /// Submit one fully specified edit.
    async fn edit_scrobble_single(&self, exact: &ExactScrobbleEdit) -> Result<EditResponse>;

    /// Delete one scrobble. `Ok(false)` means the backend refused.
    async fn delete_scrobble(
        &self,
        artist_name: &str,
        track_name: &str,
        timestamp: u64,
    ) -> Result<bool>;

    /// Subscribe to client events.
    fn subscribe(&self) -> ClientEventReceiver;

    /// The most recent client event, if any.
    fn latest_event(&self) -> Option<ClientEvent>;
}

#[async_trait]
impl LastFmEditClient for LastFmEditClientImpl {
    async fn login(&self, username: &str, password: &str) -> Result<()> {
        LastFmEditClientImpl::login(self, username, password)
            .await
            .map(|_| ())
    }

    fn username(&self) -> Result<String> {
        LastFmEditClientImpl::username(self)
    }

    fn is_logged_in(&self) -> bool {
        LastFmEditClientImpl::is_logged_in(self)
    }

    fn get_session(&self) -> Result<LastFmEditSession> {
        LastFmEditClientImpl::get_session(self)
    }

    fn restore_session(&self, session: LastFmEditSession) {
        LastFmEditClientImpl::restore_session(self, session)
    }

    fn logout(&self) {
        LastFmEditClientImpl::logout(self)
    }

    async fn validate_session(&self) -> Result<bool> {
        LastFmEditClientImpl::validate_session(self).await
    }

    async fn get_recent_scrobbles(&self, page: u32) -> Result<Vec<Track>> {
        LastFmEditClientImpl::get_recent_scrobbles(self, page).await
    }

    fn get_recent_tracks(&self, limit: i64) -> Result<PaginatedSequence<Track>> {
        LastFmEditClientImpl::get_recent_tracks(self, limit)
    }

    fn get_recent_tracks_from_page(
        &self,
        page: u32,
        limit: i64,
    ) -> Result<PaginatedSequence<Track>> {
        LastFmEditClientImpl::get_recent_tracks_from_page(self, page, limit)
    }

    fn get_artist_tracks(&self, artist: &str, limit: i64) -> Result<PaginatedSequence<Track>> {
        LastFmEditClientImpl::get_artist_tracks(self, artist, limit)
    }

    fn get_artists(&self, limit: i64) -> Result<PaginatedSequence<Artist>> {
        LastFmEditClientImpl::get_artists(self, limit)
    }

    fn get_albums(&self, limit: i64) -> Result<PaginatedSequence<Album>> {
        LastFmEditClientImpl::get_albums(self, limit)
    }

    fn get_artist_albums(&self, artist: &str, limit: i64) -> Result<PaginatedSequence<Album>> {
        LastFmEditClientImpl::get_artist_albums(self, artist, limit)
    }

    fn get_album_tracks(
        &self,
        album: &str,
        artist: &str,
        limit: i64,
    ) -> Result<PaginatedSequence<Track>> {
        LastFmEditClientImpl::get_album_tracks(self, album, artist, limit)
    }

    fn get_track_scrobbles(
        &self,
        track: &str,
        artist: &str,
        limit: i64,
    ) -> Result<PaginatedSequence<Track>> {
        LastFmEditClientImpl::get_track_scrobbles(self, track, artist, limit)
    }

    fn search_tracks(&self, query: &str, limit: i64) -> Result<PaginatedSequence<Track>> {
        LastFmEditClientImpl::search_tracks(self, query, limit)
    }

    fn search_albums(&self, query: &str, limit: i64) -> Result<PaginatedSequence<Album>> {
        LastFmEditClientImpl::search_albums(self, query, limit)
    }

    async fn find_recent_scrobble_for_track(
        &self,
        track_name: &str,
        artist_name: &str,
        max_pages: u32,
    ) -> Result<Option<Track>> {
        LastFmEditClientImpl::find_recent_scrobble_for_track(self, track_name, artist_name, max_pages)
            .await
    }

    async fn find_scrobble_by_timestamp(
        &self,
        timestamp: u64,
        max_pages: u32,
    ) -> Result<Option<Track>> {
        LastFmEditClientImpl::find_scrobble_by_timestamp(self, timestamp, max_pages).await
    }

    async fn edit_scrobble(&self, edit: &ScrobbleEdit) -> Result<EditResponse> {
        LastFmEditClientImpl::edit_scrobble(self, edit).await
    }

    async fn edit_scrobble_single(&self, exact: &ExactScrobbleEdit) -> Result<EditResponse> {
        LastFmEditClientImpl::edit_scrobble_single(self, exact).await
    }

    async fn delete_scrobble(
        &self,
        artist_name: &str,
        track_name: &str,
        timestamp: u64,
    ) -> Result<bool> {
        LastFmEditClientImpl::delete_scrobble(self, artist_name, track_name, timestamp).await
    }

    fn subscribe(&self) -> ClientEventReceiver {
        LastFmEditClientImpl::subscribe(self)
    }

    fn latest_event(&self) -> Option<ClientEvent> {
        LastFmEditClientImpl::latest_event(self)
    }
}
