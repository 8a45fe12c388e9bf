//! The pagination engine.
//!
//! A [`PaginatedSequence`] turns page-by-page fetches into a lazy, finite
//! sequence of entities. It fetches page 1 on first demand and then one page
//! at a time, never buffering more than the current page. It stops at the
//! first of: the caller's limit, an empty page, a short page, or a page that
//! explicitly says there is no next page.

use crate::decoder::{fields, DecodedPage, PageKind, RawRecord};
use crate::session_manager::SessionManager;
use crate::types::LibraryKey;
use crate::{LastFmError, Result};
use async_trait::async_trait;
use futures::Stream;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

/// Async iterator trait for paginated Last.fm data.
#[async_trait]
pub trait AsyncPaginatedIterator<T: Send>: Send {
    /// Fetch the next item, loading the next page when the current one runs out.
    ///
    /// - `Ok(Some(item))` - Next item in the sequence
    /// - `Ok(None)` - No more items available
    /// - `Err(...)` - The page fetch failed; the sequence is now exhausted
    async fn next(&mut self) -> Result<Option<T>>;

    /// Collect all remaining items into a Vec.
    ///
    /// **Warning**: this fetches every remaining page. Prefer a limit or
    /// [`take`](Self::take) for large libraries.
    async fn collect_all(&mut self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await? {
            items.push(item);
        }
        Ok(items)
    }

    /// Take up to n items from the iterator.
    async fn take(&mut self, n: usize) -> Result<Vec<T>> {
        let mut items = Vec::new();
        for _ in 0..n {
            match self.next().await? {
                Some(item) => items.push(item),
                None => break,
            }
        }
        Ok(items)
    }

    /// Number of the most recently fetched page (the page before the starting
    /// page until the first fetch).
    fn current_page(&self) -> u32;

    /// Total number of pages, if a fetched page stated it.
    fn total_pages(&self) -> Option<u32> {
        None
    }
}

/// Position of a sequence in its source. Monotonic, owned by one sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    page_number: u32,
    page_kind: PageKind,
    exhausted: bool,
}

impl PageCursor {
    pub fn new(page_kind: PageKind) -> Self {
        Self {
            page_number: 0,
            page_kind,
            exhausted: false,
        }
    }

    /// Last page fetched, 0 before the first fetch.
    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    pub fn page_kind(&self) -> PageKind {
        self.page_kind
    }

    pub fn next_page(&self) -> u32 {
        self.page_number + 1
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    fn advance(&mut self) {
        self.page_number += 1;
    }

    fn exhaust(&mut self) {
        self.exhausted = true;
    }
}

/// Source of decoded pages for one listing.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Kind of page this fetcher returns.
    fn page_kind(&self) -> PageKind;

    /// Fetch and decode page `page` (1-based).
    async fn fetch_page(&self, page: u32) -> Result<DecodedPage>;

    /// Entities per full page, when the source has a fixed size.
    fn page_size(&self) -> Option<usize> {
        None
    }
}

/// The library listings the browser knows how to page through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibraryEndpoint {
    /// The timestamped scrobble log
    RecentScrobbles,
    Artists,
    Albums,
    ArtistTracks { artist: String },
    ArtistAlbums { artist: String },
    AlbumTracks { artist: String, album: String },
    /// Every stored scrobble of one track, newest first
    TrackScrobbles { artist: String, track: String },
    SearchTracks { query: String },
    SearchAlbums { query: String },
}

impl LibraryEndpoint {
    pub fn page_kind(&self) -> PageKind {
        match self {
            LibraryEndpoint::RecentScrobbles | LibraryEndpoint::TrackScrobbles { .. } => {
                PageKind::Scrobbles
            }
            LibraryEndpoint::Artists => PageKind::Artists,
            LibraryEndpoint::Albums
            | LibraryEndpoint::ArtistAlbums { .. }
            | LibraryEndpoint::SearchAlbums { .. } => PageKind::Albums,
            LibraryEndpoint::ArtistTracks { .. }
            | LibraryEndpoint::AlbumTracks { .. }
            | LibraryEndpoint::SearchTracks { .. } => PageKind::Tracks,
        }
    }

    /// Absolute URL of `page` for `username`.
    pub fn url(&self, base_url: &str, username: &str, page: u32) -> String {
        let library = format!("{base_url}/user/{}/library", urlencoding::encode(username));
        match self {
            LibraryEndpoint::RecentScrobbles => format!("{library}?page={page}"),
            LibraryEndpoint::Artists => format!("{library}/artists?page={page}"),
            LibraryEndpoint::Albums => format!("{library}/albums?page={page}"),
            LibraryEndpoint::ArtistTracks { artist } => format!(
                "{library}/music/{}/+tracks?page={page}&ajax=true",
                encode_path_name(artist)
            ),
            LibraryEndpoint::ArtistAlbums { artist } => format!(
                "{library}/music/{}/+albums?page={page}&ajax=true",
                encode_path_name(artist)
            ),
            LibraryEndpoint::AlbumTracks { artist, album } => format!(
                "{library}/music/{}/{}?page={page}&ajax=true",
                encode_path_name(artist),
                encode_path_name(album)
            ),
            // +noredirect keeps the backend from folding the track into a corrected name.
            LibraryEndpoint::TrackScrobbles { artist, track } => format!(
                "{library}/music/+noredirect/{}/_/{}?page={page}",
                encode_path_name(artist),
                encode_path_name(track)
            ),
            LibraryEndpoint::SearchTracks { query } => format!(
                "{library}/tracks/search?page={page}&query={}&ajax=1",
                urlencoding::encode(query)
            ),
            LibraryEndpoint::SearchAlbums { query } => format!(
                "{library}/albums/search?page={page}&query={}&ajax=1",
                urlencoding::encode(query)
            ),
        }
    }

    /// Fields implied by the endpoint, for listings that don't repeat them per row.
    fn implied_fields(&self) -> Vec<(&'static str, &str)> {
        match self {
            LibraryEndpoint::ArtistTracks { artist } | LibraryEndpoint::ArtistAlbums { artist } => {
                vec![(fields::ARTIST, artist)]
            }
            LibraryEndpoint::AlbumTracks { artist, album } => {
                vec![(fields::ARTIST, artist), (fields::ALBUM, album)]
            }
            LibraryEndpoint::TrackScrobbles { artist, track } => {
                vec![(fields::ARTIST, artist), (fields::NAME, track)]
            }
            _ => Vec::new(),
        }
    }
}

/// Names in library paths use `+` for spaces.
fn encode_path_name(name: &str) -> String {
    urlencoding::encode(name).replace("%20", "+")
}

/// [`PageFetcher`] over a library endpoint of the current session.
#[derive(Debug, Clone)]
pub struct EndpointFetcher {
    session: Arc<SessionManager>,
    endpoint: LibraryEndpoint,
    page_size: Option<usize>,
}

impl EndpointFetcher {
    pub fn new(
        session: Arc<SessionManager>,
        endpoint: LibraryEndpoint,
        page_size: Option<usize>,
    ) -> Self {
        Self {
            session,
            endpoint,
            page_size,
        }
    }
}

#[async_trait]
impl PageFetcher for EndpointFetcher {
    fn page_kind(&self) -> PageKind {
        self.endpoint.page_kind()
    }

    async fn fetch_page(&self, page: u32) -> Result<DecodedPage> {
        let (session, _) = self.session.snapshot()?;
        let url = self.endpoint.url(session.base_url(), session.username(), page);
        log::debug!("Fetching {} page {page}", self.page_kind());

        let mut decoded = self.session.get_page(&url, self.page_kind()).await?;
        for (field, value) in self.endpoint.implied_fields() {
            for record in &mut decoded.records {
                record.set_default(field, value);
            }
        }
        Ok(decoded)
    }

    fn page_size(&self) -> Option<usize> {
        self.page_size
    }
}

/// Maps one decoded record to an entity.
pub type RecordMapper<T> = fn(&RawRecord) -> Result<T>;

/// Lazy, finite, single-pass sequence over a paginated listing.
pub struct PaginatedSequence<T> {
    fetcher: Arc<dyn PageFetcher>,
    mapper: RecordMapper<T>,
    cursor: PageCursor,
    buffer: VecDeque<T>,
    limit: Option<usize>,
    yielded: usize,
    page_size: Option<usize>,
    total_pages: Option<u32>,
    /// Pages this sequence may still fetch
    pages_left: Option<u32>,
    dedup_key: Option<fn(&T) -> String>,
    seen: HashSet<String>,
}

impl<T> std::fmt::Debug for PaginatedSequence<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaginatedSequence")
            .field("cursor", &self.cursor)
            .field("buffered", &self.buffer.len())
            .field("limit", &self.limit)
            .field("yielded", &self.yielded)
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl<T> PaginatedSequence<T> {
    /// A sequence starting at page 1. `limit == 0` means no limit.
    pub fn new(fetcher: Arc<dyn PageFetcher>, mapper: RecordMapper<T>, limit: usize) -> Self {
        let cursor = PageCursor::new(fetcher.page_kind());
        let page_size = fetcher.page_size();
        Self {
            fetcher,
            mapper,
            cursor,
            buffer: VecDeque::new(),
            limit: (limit > 0).then_some(limit),
            yielded: 0,
            page_size,
            total_pages: None,
            pages_left: None,
            dedup_key: None,
            seen: HashSet::new(),
        }
    }

    /// Start at `page` instead of page 1. Pages are numbered from 1.
    pub fn from_page(mut self, page: u32) -> Self {
        self.cursor.page_number = page.saturating_sub(1);
        self
    }

    /// Fetch at most `pages` pages.
    pub fn max_pages(mut self, pages: u32) -> Self {
        self.pages_left = Some(pages);
        if pages == 0 {
            self.cursor.exhaust();
        }
        self
    }

    /// Skip entities whose [`LibraryKey`] was already yielded.
    pub fn deduplicated(mut self) -> Self
    where
        T: LibraryKey,
    {
        self.dedup_key = Some(<T as LibraryKey>::library_key);
        self
    }

    pub fn cursor(&self) -> &PageCursor {
        &self.cursor
    }

    /// Next entity, or `None` once the sequence is done.
    pub async fn next(&mut self) -> Result<Option<T>> {
        loop {
            if self.limit.is_some_and(|limit| self.yielded >= limit) {
                self.cursor.exhaust();
                self.buffer.clear();
                return Ok(None);
            }

            if let Some(item) = self.buffer.pop_front() {
                if let Some(key_fn) = self.dedup_key {
                    if !self.seen.insert(key_fn(&item)) {
                        continue;
                    }
                }
                self.yielded += 1;
                return Ok(Some(item));
            }

            if self.cursor.is_exhausted() {
                return Ok(None);
            }
            self.load_next_page().await?;
        }
    }

    async fn load_next_page(&mut self) -> Result<()> {
        let page = self.cursor.next_page();
        let decoded = match self.fetcher.fetch_page(page).await {
            Ok(decoded) => decoded,
            Err(cause) => {
                self.cursor.exhaust();
                return Err(LastFmError::Fetch {
                    page,
                    cause: Box::new(cause),
                });
            }
        };
        self.cursor.advance();
        if decoded.total_pages.is_some() {
            self.total_pages = decoded.total_pages;
        }

        let raw_count = decoded.records.len();
        if raw_count == 0 {
            log::debug!("Page {page} is empty, sequence done");
            self.cursor.exhaust();
            return Ok(());
        }
        let expected = *self.page_size.get_or_insert(raw_count);

        for record in &decoded.records {
            match (self.mapper)(record) {
                Ok(item) => self.buffer.push_back(item),
                Err(e) => log::warn!("Skipping record on page {page}: {e}"),
            }
        }

        let short_page = raw_count < expected;
        let last_marked = decoded.has_next_page == Some(false);
        let past_total = self.total_pages.is_some_and(|total| page >= total);
        let page_cap = match self.pages_left.as_mut() {
            Some(left) => {
                *left = left.saturating_sub(1);
                *left == 0
            }
            None => false,
        };
        if short_page || last_marked || past_total || page_cap {
            log::debug!(
                "Page {page} is the last ({raw_count} of {expected} records, has_next={:?})",
                decoded.has_next_page
            );
            self.cursor.exhaust();
        }
        Ok(())
    }

    /// Turn the sequence into a `futures::Stream`. The stream ends after the
    /// first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<T>> + Send
    where
        T: Send + 'static,
    {
        futures::stream::unfold(Some(self), |state| async move {
            let mut sequence = state?;
            match sequence.next().await {
                Ok(Some(item)) => Some((Ok(item), Some(sequence))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

#[async_trait]
impl<T: Send> AsyncPaginatedIterator<T> for PaginatedSequence<T> {
    async fn next(&mut self) -> Result<Option<T>> {
        PaginatedSequence::next(self).await
    }

    fn current_page(&self) -> u32 {
        self.cursor.page_number()
    }

    fn total_pages(&self) -> Option<u32> {
        self.total_pages
    }
}
