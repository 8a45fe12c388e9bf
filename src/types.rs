//! Library entities and their mapping from decoded records.
//!
//! `Track`, `Album` and `Artist` are plain value types. Callers may build them
//! directly (all fields are public) and the pagination engine builds them from
//! [`RawRecord`]s through the `from_record` mappers below.

use crate::decoder::{fields, RawRecord};
use crate::Result;
use chrono::{DateTime, Utc};

// ================================================================================================
// TRACK, ALBUM AND ARTIST METADATA
// ================================================================================================

/// Represents a music track with associated metadata.
///
/// # Examples
///
/// ```rust
/// use scrobble_edit::Track;
///
/// let track = Track {
///     name: "Paranoid Android".to_string(),
///     artist: "Radiohead".to_string(),
///     playcount: 42,
///     timestamp: Some(1640995200),
///     album: Some("OK Computer".to_string()),
///     album_artist: Some("Radiohead".to_string()),
/// };
///
/// assert_eq!(track.to_string(), "Radiohead - Paranoid Android [OK Computer]");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Track {
    /// The track name/title
    pub name: String,
    /// The artist name
    pub artist: String,
    /// Number of times this track has been played/scrobbled
    pub playcount: u32,
    /// Unix timestamp of when this track was scrobbled
    ///
    /// Only present for scrobble-log entries, `None` for aggregate listings.
    pub timestamp: Option<u64>,
    /// The album name (if available)
    pub album: Option<String>,
    /// The album artist name (if available)
    pub album_artist: Option<String>,
}

impl Track {
    /// Map a decoded track or scrobble row.
    ///
    /// `name` and `artist` are required. A missing playcount on a timestamped
    /// row means a single scrobble. Names are kept exactly as stored, since
    /// an edit has to quote them back to the backend verbatim.
    pub fn from_record(record: &RawRecord) -> Result<Self> {
        let timestamp = record.get_u64(fields::TIMESTAMP)?;
        let default_playcount = if timestamp.is_some() { 1 } else { 0 };

        Ok(Self {
            name: record.require(fields::NAME)?.to_string(),
            artist: record.require(fields::ARTIST)?.to_string(),
            playcount: parse_playcount(record).unwrap_or(default_playcount),
            timestamp,
            album: present(record, fields::ALBUM),
            album_artist: present(record, fields::ALBUM_ARTIST),
        })
    }

    /// Convert the Unix timestamp to a datetime.
    #[must_use]
    pub fn scrobbled_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .and_then(|ts| DateTime::from_timestamp(i64::try_from(ts).ok()?, 0))
    }
}

impl std::fmt::Display for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.album {
            Some(album) => write!(f, "{} - {} [{}]", self.artist, self.name, album),
            None => write!(f, "{} - {}", self.artist, self.name),
        }
    }
}

/// Represents a music album with associated metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Album {
    /// The album name/title
    pub name: String,
    /// The artist name
    pub artist: String,
    /// Number of times this album has been played/scrobbled
    pub playcount: u32,
}

impl Album {
    pub fn from_record(record: &RawRecord) -> Result<Self> {
        Ok(Self {
            name: record.require(fields::NAME)?.to_string(),
            artist: record.require(fields::ARTIST)?.to_string(),
            playcount: parse_playcount(record).unwrap_or(0),
        })
    }
}

impl std::fmt::Display for Album {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.artist, self.name)
    }
}

/// Represents an artist with aggregate play count.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Artist {
    /// The artist name
    pub name: String,
    /// Number of times tracks by this artist have been played
    pub playcount: u32,
}

impl Artist {
    pub fn from_record(record: &RawRecord) -> Result<Self> {
        Ok(Self {
            name: record.require(fields::NAME)?.to_string(),
            playcount: parse_playcount(record).unwrap_or(0),
        })
    }
}

impl std::fmt::Display for Artist {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Key used to recognise the same library entity across pages.
///
/// Keys are case-folded so that `"Radiohead"` and `"radiohead"` collapse when
/// a caller opts into deduplication.
pub trait LibraryKey {
    fn library_key(&self) -> String;
}

impl LibraryKey for Artist {
    fn library_key(&self) -> String {
        crate::matcher::normalize(&self.name)
    }
}

impl LibraryKey for Album {
    fn library_key(&self) -> String {
        format!(
            "{}\u{1f}{}",
            crate::matcher::normalize(&self.artist),
            crate::matcher::normalize(&self.name)
        )
    }
}

impl LibraryKey for Track {
    fn library_key(&self) -> String {
        format!(
            "{}\u{1f}{}\u{1f}{}",
            crate::matcher::normalize(&self.artist),
            crate::matcher::normalize(self.album.as_deref().unwrap_or("")),
            crate::matcher::normalize(&self.name)
        )
    }
}

/// A non-blank field, unmodified.
fn present(record: &RawRecord, name: &str) -> Option<String> {
    record
        .get(name)
        .filter(|value| !value.trim().is_empty())
        .map(str::to_string)
}

/// Playcounts come through as display text ("1,234 scrobbles"); keep the digits.
fn parse_playcount(record: &RawRecord) -> Option<u32> {
    let raw = record.get(fields::PLAYCOUNT)?;
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LastFmError;

    #[test]
    fn scrobble_record_maps_to_timestamped_track() {
        let record = RawRecord::new()
            .with(fields::NAME, " Creep ")
            .with(fields::ARTIST, "Radiohead")
            .with(fields::TIMESTAMP, "1640995200")
            .with(fields::ALBUM, "Pablo Honey")
            .with(fields::ALBUM_ARTIST, "");

        let track = Track::from_record(&record).unwrap();
        assert_eq!(track.name, " Creep ");
        assert_eq!(track.playcount, 1);
        assert_eq!(track.timestamp, Some(1640995200));
        assert_eq!(track.album.as_deref(), Some("Pablo Honey"));
        assert_eq!(track.album_artist, None);
        assert_eq!(
            track.scrobbled_at().unwrap().to_rfc3339(),
            "2022-01-01T00:00:00+00:00"
        );
    }

    #[test]
    fn aggregate_record_keeps_formatted_playcount() {
        let record = RawRecord::new()
            .with(fields::NAME, "OK Computer")
            .with(fields::ARTIST, "Radiohead")
            .with(fields::PLAYCOUNT, "1,234 scrobbles");

        let album = Album::from_record(&record).unwrap();
        assert_eq!(album.playcount, 1234);

        let track = Track::from_record(&record).unwrap();
        assert_eq!(track.timestamp, None);
        assert_eq!(track.playcount, 1234);
    }

    #[test]
    fn missing_required_field_is_a_parse_error() {
        let record = RawRecord::new().with(fields::NAME, "Orphan");
        assert!(matches!(
            Track::from_record(&record),
            Err(LastFmError::Parse(msg)) if msg.contains("artist")
        ));
        assert!(Artist::from_record(&record).is_ok());
    }

    #[test]
    fn library_keys_fold_case_and_whitespace() {
        let a = Artist {
            name: "The  National".to_string(),
            playcount: 1,
        };
        let b = Artist {
            name: "the national ".to_string(),
            playcount: 9,
        };
        assert_eq!(a.library_key(), b.library_key());
    }
}
