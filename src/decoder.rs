//! The page decoding seam.
//!
//! The client never looks at HTML itself. Every fetched page is handed to a
//! [`PageDecoder`] together with the [`PageKind`] the client expects, and the
//! decoder returns an ordered list of [`RawRecord`]s plus whatever pagination
//! hints the page carried. [`HtmlPageDecoder`](crate::HtmlPageDecoder) is the
//! default implementation; tests and alternative frontends can inject their own.

use crate::{LastFmError, Result};
use serde::{Deserialize, Serialize};

/// Field names shared between decoders and the record mappers.
pub mod fields {
    pub const NAME: &str = "name";
    pub const ARTIST: &str = "artist";
    pub const ALBUM: &str = "album";
    pub const ALBUM_ARTIST: &str = "album_artist";
    pub const PLAYCOUNT: &str = "playcount";
    pub const TIMESTAMP: &str = "timestamp";

    pub const CSRF_TOKEN: &str = "csrf_token";
    pub const NEXT: &str = "next";
    pub const HAS_LOGIN_FORM: &str = "has_login_form";
    pub const ERROR: &str = "error";

    /// `success` or `error` on an edit result alert record.
    pub const ALERT: &str = "alert";
    pub const MESSAGE: &str = "message";
    /// Track/album names echoed back in an edit result.
    pub const TRACK_NAME: &str = "track_name";
    pub const ALBUM_NAME: &str = "album_name";
}

/// Which entity type a fetched page decodes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    /// Aggregate track listing (library or per-artist).
    Tracks,
    /// Aggregate album listing.
    Albums,
    /// Aggregate artist listing.
    Artists,
    /// Timestamped scrobble rows, from the log or one track's library page.
    Scrobbles,
    /// The page returned after submitting an edit form.
    EditResult,
    /// The login page or a re-rendered login form.
    LoginForm,
    /// The scrobble edit form (source of a fresh CSRF token).
    EditForm,
}

impl PageKind {
    /// Whether pages of this kind list library entities.
    pub fn is_listing(self) -> bool {
        matches!(
            self,
            PageKind::Tracks | PageKind::Albums | PageKind::Artists | PageKind::Scrobbles
        )
    }
}

impl std::fmt::Display for PageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PageKind::Tracks => "tracks",
            PageKind::Albums => "albums",
            PageKind::Artists => "artists",
            PageKind::Scrobbles => "scrobbles",
            PageKind::EditResult => "edit-result",
            PageKind::LoginForm => "login-form",
            PageKind::EditForm => "edit-form",
        };
        f.write_str(name)
    }
}

/// One decoded row: an ordered list of `(field, value)` pairs.
///
/// Field names may repeat (a login page can carry several `error` entries).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord {
    fields: Vec<(String, String)>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field, keeping any earlier value with the same name.
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: &str, value: impl Into<String>) {
        self.fields.push((name.to_string(), value.into()));
    }

    /// Add `name` only when the record doesn't already carry it.
    pub fn set_default(&mut self, name: &str, value: &str) {
        if self.get(name).is_none() {
            self.push(name, value);
        }
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }

    /// Non-empty value for `name`, or a parse error naming the field.
    pub fn require(&self, name: &str) -> Result<&str> {
        match self.get(name) {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(LastFmError::Parse(format!("Missing {name}"))),
        }
    }

    /// Non-empty value for `name`, with absent and blank both mapping to `None`.
    pub fn get_non_empty(&self, name: &str) -> Option<String> {
        self.get(name)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }

    pub fn get_u64(&self, name: &str) -> Result<Option<u64>> {
        match self.get_non_empty(name) {
            None => Ok(None),
            Some(value) => value
                .parse::<u64>()
                .map(Some)
                .map_err(|_| LastFmError::Parse(format!("Invalid {name}: '{value}'"))),
        }
    }

    pub fn get_flag(&self, name: &str) -> bool {
        matches!(self.get(name), Some("true") | Some("1"))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A decoded page: records in page order plus pagination hints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedPage {
    pub kind: PageKind,
    pub records: Vec<RawRecord>,
    /// Explicit "more pages" marker when the page carries one.
    #[serde(default)]
    pub has_next_page: Option<bool>,
    /// Total number of pages, if the page states it.
    #[serde(default)]
    pub total_pages: Option<u32>,
}

impl DecodedPage {
    pub fn new(kind: PageKind, records: Vec<RawRecord>) -> Self {
        Self {
            kind,
            records,
            has_next_page: None,
            total_pages: None,
        }
    }

    pub fn with_has_next_page(mut self, has_next_page: bool) -> Self {
        self.has_next_page = Some(has_next_page);
        self
    }

    /// First record, or an empty one for pages that decode to nothing.
    pub fn first(&self) -> RawRecord {
        self.records.first().cloned().unwrap_or_default()
    }
}

/// Turns one fetched page into raw records.
///
/// Implementations must be pure with respect to the body: the same bytes and
/// kind always decode to the same page.
#[cfg_attr(feature = "mock", mockall::automock)]
pub trait PageDecoder: Send + Sync + std::fmt::Debug {
    fn decode(&self, body: &[u8], kind: PageKind) -> Result<DecodedPage>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_lookup_and_defaults() {
        let mut record = RawRecord::new()
            .with(fields::NAME, "Creep")
            .with(fields::ERROR, "first")
            .with(fields::ERROR, "second")
            .with(fields::ALBUM, "  ");

        record.set_default(fields::ARTIST, "Radiohead");
        record.set_default(fields::NAME, "ignored");

        assert_eq!(record.get(fields::NAME), Some("Creep"));
        assert_eq!(record.get(fields::ARTIST), Some("Radiohead"));
        assert_eq!(
            record.get_all(fields::ERROR).collect::<Vec<_>>(),
            vec!["first", "second"]
        );
        assert_eq!(record.get_non_empty(fields::ALBUM), None);
        assert!(record.require(fields::ALBUM).is_err());
        assert!(record.require(fields::NAME).is_ok());
    }

    #[test]
    fn numeric_fields() {
        let record = RawRecord::new()
            .with(fields::TIMESTAMP, "1640995200")
            .with(fields::PLAYCOUNT, "many");

        assert_eq!(record.get_u64(fields::TIMESTAMP).unwrap(), Some(1640995200));
        assert_eq!(record.get_u64("missing").unwrap(), None);
        assert!(matches!(
            record.get_u64(fields::PLAYCOUNT),
            Err(LastFmError::Parse(_))
        ));
    }

    #[test]
    fn decoded_page_serializes_records_as_pairs() {
        let page = DecodedPage::new(
            PageKind::Artists,
            vec![RawRecord::new().with(fields::NAME, "Wilco")],
        )
        .with_has_next_page(false);

        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["kind"], "artists");
        assert_eq!(json["records"][0][0][0], "name");
        assert_eq!(json["records"][0][0][1], "Wilco");

        let back: DecodedPage = serde_json::from_value(json).unwrap();
        assert_eq!(back, page);
    }
}
