//! Bounded searches over the recent scrobble log.

use crate::{Result, Track};
use async_trait::async_trait;

/// Fold case and whitespace so that names typed by hand match stored ones.
///
/// Trims, collapses inner runs of whitespace to one space and lowercases.
pub fn normalize(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn names_match(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

/// One page of the recent scrobble log at a time.
#[async_trait]
pub trait ScrobblePages: Send + Sync {
    async fn scrobble_page(&self, page: u32) -> Result<Vec<Track>>;
}

/// Walk pages `1..=max_pages` and return the first scrobble accepted by `matches`.
///
/// An empty page ends the walk early; fetch errors propagate unchanged.
pub async fn scan_recent_scrobbles<S, F>(
    source: &S,
    max_pages: u32,
    mut matches: F,
) -> Result<Option<Track>>
where
    S: ScrobblePages + ?Sized,
    F: FnMut(&Track) -> bool + Send,
{
    for page in 1..=max_pages {
        let scrobbles = source.scrobble_page(page).await?;
        if scrobbles.is_empty() {
            log::debug!("Recent scrobbles ran out at page {page}");
            break;
        }
        if let Some(found) = scrobbles.into_iter().find(|scrobble| matches(scrobble)) {
            log::debug!(
                "Found scrobble '{}' by '{}' at {:?} on page {page}",
                found.name,
                found.artist,
                found.timestamp
            );
            return Ok(Some(found));
        }
    }
    Ok(None)
}

/// Most recent scrobble of `track_name` by `artist_name`.
pub async fn find_recent_scrobble_for_track<S: ScrobblePages + ?Sized>(
    source: &S,
    track_name: &str,
    artist_name: &str,
    max_pages: u32,
) -> Result<Option<Track>> {
    log::debug!("Searching for recent scrobble: '{track_name}' by '{artist_name}'");
    let track_key = normalize(track_name);
    let artist_key = normalize(artist_name);

    let found = scan_recent_scrobbles(source, max_pages, |scrobble| {
        normalize(&scrobble.name) == track_key && normalize(&scrobble.artist) == artist_key
    })
    .await?;

    if found.is_none() {
        log::debug!(
            "No recent scrobble found for '{track_name}' by '{artist_name}' in {max_pages} pages"
        );
    }
    Ok(found)
}

/// The scrobble recorded at exactly `timestamp`.
pub async fn find_scrobble_by_timestamp<S: ScrobblePages + ?Sized>(
    source: &S,
    timestamp: u64,
    max_pages: u32,
) -> Result<Option<Track>> {
    scan_recent_scrobbles(source, max_pages, |scrobble| {
        scrobble.timestamp == Some(timestamp)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LastFmError;
    use std::sync::Mutex;

    struct Pages {
        pages: Vec<Vec<Track>>,
        requested: Mutex<Vec<u32>>,
    }

    #[async_trait]
    impl ScrobblePages for Pages {
        async fn scrobble_page(&self, page: u32) -> Result<Vec<Track>> {
            self.requested.lock().unwrap().push(page);
            Ok(self.pages.get(page as usize - 1).cloned().unwrap_or_default())
        }
    }

    fn scrobble(name: &str, artist: &str, timestamp: u64) -> Track {
        Track {
            name: name.to_string(),
            artist: artist.to_string(),
            playcount: 1,
            timestamp: Some(timestamp),
            album: None,
            album_artist: None,
        }
    }

    fn pages(pages: Vec<Vec<Track>>) -> Pages {
        Pages {
            pages,
            requested: Mutex::new(Vec::new()),
        }
    }

    #[test]
    fn normalize_folds_case_and_whitespace() {
        assert_eq!(normalize("  Paranoid \t Android "), "paranoid android");
        assert!(names_match("The  NATIONAL", "the national"));
        assert!(!names_match("Low", "Lower"));
    }

    #[tokio::test]
    async fn first_match_wins_across_pages() {
        let source = pages(vec![
            vec![scrobble("Creep", "Radiohead", 30)],
            vec![
                scrobble(" paranoid  android", "RADIOHEAD", 20),
                scrobble("Paranoid Android", "Radiohead", 10),
            ],
        ]);

        let found = find_recent_scrobble_for_track(&source, "Paranoid Android", "Radiohead", 5)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.timestamp, Some(20));
        assert_eq!(*source.requested.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn empty_page_ends_search_early() {
        let source = pages(vec![vec![scrobble("Creep", "Radiohead", 30)]]);

        let found = find_recent_scrobble_for_track(&source, "Nude", "Radiohead", 10)
            .await
            .unwrap();
        assert!(found.is_none());
        assert_eq!(*source.requested.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn max_pages_bounds_the_walk() {
        let source = pages(vec![
            vec![scrobble("A", "X", 3)],
            vec![scrobble("B", "X", 2)],
            vec![scrobble("C", "X", 1)],
        ]);

        assert!(find_recent_scrobble_for_track(&source, "C", "X", 2)
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            find_scrobble_by_timestamp(&source, 1, 3).await.unwrap().unwrap().name,
            "C"
        );
    }

    #[tokio::test]
    async fn errors_propagate_unchanged() {
        let source = pages(vec![]);
        assert!(scan_recent_scrobbles(&source, 0, |_| true).await.unwrap().is_none());
        assert!(source.requested.lock().unwrap().is_empty());

        struct Failing;
        #[async_trait]
        impl ScrobblePages for Failing {
            async fn scrobble_page(&self, _page: u32) -> Result<Vec<Track>> {
                Err(LastFmError::SessionExpired)
            }
        }
        assert!(matches!(
            find_scrobble_by_timestamp(&Failing, 1, 3).await,
            Err(LastFmError::SessionExpired)
        ));
    }
}
