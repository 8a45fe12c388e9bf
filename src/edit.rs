//! The scrobble edit data model.
//!
//! A [`ScrobbleEdit`] says *which* scrobbles to change (an [`EditScope`]),
//! *what* to change ([`FieldChanges`]) and optionally pins a single scrobble
//! by timestamp. Scope resolution turns it into one [`ExactScrobbleEdit`] per
//! distinct stored variation, and every submission is reported back in an
//! [`EditResponse`].

use crate::error::EditFailureReason;
use crate::matcher::names_match;
use crate::{LastFmError, Result, Track};
use serde::{Deserialize, Serialize};

/// Which stored scrobbles an edit applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EditScope {
    /// Every scrobble by `artist`
    Artist { artist: String },
    /// Every scrobble of `album` by `artist`
    Album { album: String, artist: String },
    /// Every scrobble of `track` by `artist`, optionally only on `album`
    Track {
        track: String,
        artist: String,
        album: Option<String>,
    },
}

impl EditScope {
    pub fn artist(&self) -> &str {
        match self {
            EditScope::Artist { artist }
            | EditScope::Album { artist, .. }
            | EditScope::Track { artist, .. } => artist,
        }
    }

    /// Whether `scrobble` falls inside this scope (case and whitespace folded).
    pub fn matches(&self, scrobble: &Track) -> bool {
        if !names_match(&scrobble.artist, self.artist()) {
            return false;
        }
        let scrobble_album = scrobble.album.as_deref().unwrap_or("");
        match self {
            EditScope::Artist { .. } => true,
            EditScope::Album { album, .. } => names_match(scrobble_album, album),
            EditScope::Track { track, album, .. } => {
                names_match(&scrobble.name, track)
                    && album
                        .as_deref()
                        .map_or(true, |album| names_match(scrobble_album, album))
            }
        }
    }

    fn validate(&self) -> Result<()> {
        let required: Vec<(&str, &str)> = match self {
            EditScope::Artist { artist } => vec![("artist", artist)],
            EditScope::Album { album, artist } => vec![("album", album), ("artist", artist)],
            EditScope::Track {
                track,
                artist,
                album,
            } => {
                let mut fields = vec![("track", track.as_str()), ("artist", artist.as_str())];
                if let Some(album) = album {
                    fields.push(("album", album));
                }
                fields
            }
        };
        match required.iter().find(|(_, value)| value.trim().is_empty()) {
            Some((field, _)) => Err(LastFmError::invalid(format!(
                "Edit scope has an empty {field} name"
            ))),
            None => Ok(()),
        }
    }
}

impl std::fmt::Display for EditScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EditScope::Artist { artist } => write!(f, "artist '{artist}'"),
            EditScope::Album { album, artist } => write!(f, "album '{album}' by '{artist}'"),
            EditScope::Track {
                track,
                artist,
                album: Some(album),
            } => write!(f, "track '{track}' by '{artist}' on '{album}'"),
            EditScope::Track { track, artist, .. } => write!(f, "track '{track}' by '{artist}'"),
        }
    }
}

/// New values for an edit. `None` keeps each scrobble's stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldChanges {
    pub track_name: Option<String>,
    pub album_name: Option<String>,
    pub artist_name: Option<String>,
    pub album_artist_name: Option<String>,
}

impl FieldChanges {
    pub fn is_empty(&self) -> bool {
        self.track_name.is_none()
            && self.album_name.is_none()
            && self.artist_name.is_none()
            && self.album_artist_name.is_none()
    }

    fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("track", self.track_name.as_deref()),
            ("album", self.album_name.as_deref()),
            ("artist", self.artist_name.as_deref()),
            ("album artist", self.album_artist_name.as_deref()),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.map(|value| (field, value)))
    }
}

/// Represents a scrobble edit operation.
///
/// # Examples
///
/// ```rust
/// use scrobble_edit::ScrobbleEdit;
///
/// // Rename an artist everywhere
/// let edit = ScrobbleEdit::for_artist("Radiohed", "Radiohead").unwrap();
///
/// // Fix one track's title, keeping everything else
/// let edit = ScrobbleEdit::from_track_and_artist("Paranoid Andriod", "Radiohead")
///     .with_track_name("Paranoid Android");
/// assert!(edit.validate().is_ok());
///
/// // No-op edits are refused up front
/// assert!(ScrobbleEdit::for_artist("Radiohead", "Radiohead").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScrobbleEdit {
    scope: EditScope,
    changes: FieldChanges,
    timestamp: Option<u64>,
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(LastFmError::invalid(format!("{field} must not be empty")));
    }
    Ok(())
}

fn require_different(field: &str, old: &str, new: &str) -> Result<()> {
    if old == new {
        return Err(LastFmError::invalid(format!(
            "{field} '{old}' would be renamed to itself"
        )));
    }
    Ok(())
}

impl ScrobbleEdit {
    /// Edit with an explicit scope and changes.
    pub fn new(scope: EditScope, changes: FieldChanges) -> Self {
        Self {
            scope,
            changes,
            timestamp: None,
        }
    }

    /// Rename an artist across every scrobble.
    ///
    /// Album artists equal to the old artist follow the rename.
    pub fn for_artist(old_artist_name: &str, new_artist_name: &str) -> Result<Self> {
        require_non_empty("Artist name", old_artist_name)?;
        require_non_empty("New artist name", new_artist_name)?;
        require_different("Artist", old_artist_name, new_artist_name)?;
        Ok(Self::new(
            EditScope::Artist {
                artist: old_artist_name.to_string(),
            },
            FieldChanges {
                artist_name: Some(new_artist_name.to_string()),
                ..Default::default()
            },
        ))
    }

    /// Move every scrobble of `album_name` from one artist to another.
    pub fn for_album(
        album_name: &str,
        old_artist_name: &str,
        new_artist_name: &str,
    ) -> Result<Self> {
        require_non_empty("Album name", album_name)?;
        require_non_empty("Artist name", old_artist_name)?;
        require_non_empty("New artist name", new_artist_name)?;
        require_different("Artist", old_artist_name, new_artist_name)?;
        Ok(Self::new(
            EditScope::Album {
                album: album_name.to_string(),
                artist: old_artist_name.to_string(),
            },
            FieldChanges {
                artist_name: Some(new_artist_name.to_string()),
                ..Default::default()
            },
        ))
    }

    /// Rename an album of `artist_name`.
    pub fn rename_album(
        old_album_name: &str,
        new_album_name: &str,
        artist_name: &str,
    ) -> Result<Self> {
        require_non_empty("Album name", old_album_name)?;
        require_non_empty("New album name", new_album_name)?;
        require_non_empty("Artist name", artist_name)?;
        require_different("Album", old_album_name, new_album_name)?;
        Ok(Self::new(
            EditScope::Album {
                album: old_album_name.to_string(),
                artist: artist_name.to_string(),
            },
            FieldChanges {
                album_name: Some(new_album_name.to_string()),
                ..Default::default()
            },
        ))
    }

    /// Scope an edit to one track; add the new values with the `with_*` methods.
    pub fn from_track_and_artist(track_name: &str, artist_name: &str) -> Self {
        Self::new(
            EditScope::Track {
                track: track_name.to_string(),
                artist: artist_name.to_string(),
                album: None,
            },
            FieldChanges::default(),
        )
    }

    /// Scope an edit to exactly one scrobble, identified by all its fields.
    pub fn for_scrobble(scrobble: &Track) -> Self {
        Self {
            scope: EditScope::Track {
                track: scrobble.name.clone(),
                artist: scrobble.artist.clone(),
                album: scrobble.album.clone(),
            },
            changes: FieldChanges::default(),
            timestamp: scrobble.timestamp,
        }
    }

    pub fn with_track_name(mut self, track_name: &str) -> Self {
        self.changes.track_name = Some(track_name.to_string());
        self
    }

    pub fn with_album_name(mut self, album_name: &str) -> Self {
        self.changes.album_name = Some(album_name.to_string());
        self
    }

    pub fn with_artist_name(mut self, artist_name: &str) -> Self {
        self.changes.artist_name = Some(artist_name.to_string());
        self
    }

    pub fn with_album_artist_name(mut self, album_artist_name: &str) -> Self {
        self.changes.album_artist_name = Some(album_artist_name.to_string());
        self
    }

    /// Only edit the scrobble recorded at `timestamp`.
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn scope(&self) -> &EditScope {
        &self.scope
    }

    pub fn changes(&self) -> &FieldChanges {
        &self.changes
    }

    pub fn timestamp(&self) -> Option<u64> {
        self.timestamp
    }

    /// Reject underspecified scopes and edits that change nothing.
    pub fn validate(&self) -> Result<()> {
        self.scope.validate()?;
        if let Some((field, _)) = self.changes.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(LastFmError::invalid(format!("New {field} name must not be empty")));
        }
        if self.changes.is_empty() {
            return Err(LastFmError::invalid(format!(
                "Edit of {} changes nothing",
                self.scope
            )));
        }

        // Fields pinned by the scope can be compared up front; anything else
        // is only known once a scrobble is resolved.
        let pinned_unchanged = |field: &str, new: &str| match (&self.scope, field) {
            (_, "artist") => new == self.scope.artist(),
            (EditScope::Album { album, .. }, "album") => new == album,
            (EditScope::Track { track, .. }, "track") => new == track,
            (EditScope::Track { album: Some(album), .. }, "album") => new == album,
            _ => false,
        };
        if self
            .changes
            .iter()
            .all(|(field, new)| pinned_unchanged(field, new))
        {
            return Err(LastFmError::invalid(format!(
                "Edit of {} sets every field to its current value",
                self.scope
            )));
        }
        Ok(())
    }

    /// The concrete submission for one resolved scrobble.
    ///
    /// `edit_all` asks the backend to apply the change to every stored
    /// scrobble with the same values.
    pub fn apply_to(&self, scrobble: &Track, timestamp: u64, edit_all: bool) -> ExactScrobbleEdit {
        let original = ExactScrobbleEdit::identity(scrobble, timestamp);
        let artist_name = self
            .changes
            .artist_name
            .clone()
            .unwrap_or_else(|| original.artist_name_original.clone());

        let album_artist_name = match &self.changes.album_artist_name {
            Some(explicit) => explicit.clone(),
            None if self.changes.artist_name.is_some()
                && names_match(
                    &original.album_artist_name_original,
                    &original.artist_name_original,
                ) =>
            {
                artist_name.clone()
            }
            None => original.album_artist_name_original.clone(),
        };

        ExactScrobbleEdit {
            track_name: self
                .changes
                .track_name
                .clone()
                .unwrap_or_else(|| original.track_name_original.clone()),
            album_name: self
                .changes
                .album_name
                .clone()
                .unwrap_or_else(|| original.album_name_original.clone()),
            artist_name,
            album_artist_name,
            edit_all,
            ..original
        }
    }
}

/// A fully specified single edit form submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExactScrobbleEdit {
    pub track_name_original: String,
    pub album_name_original: String,
    pub artist_name_original: String,
    pub album_artist_name_original: String,

    pub track_name: String,
    pub album_name: String,
    pub artist_name: String,
    pub album_artist_name: String,

    /// Unix timestamp of the scrobble to edit
    pub timestamp: u64,
    /// Whether the backend should apply the edit to every scrobble with the
    /// same original values, rather than only this one
    pub edit_all: bool,
}

impl ExactScrobbleEdit {
    /// An edit that would leave `scrobble` unchanged. Missing album artists
    /// default to the artist, as the edit form does.
    fn identity(scrobble: &Track, timestamp: u64) -> Self {
        let album = scrobble.album.clone().unwrap_or_default();
        let album_artist = scrobble
            .album_artist
            .clone()
            .unwrap_or_else(|| scrobble.artist.clone());
        Self {
            track_name_original: scrobble.name.clone(),
            album_name_original: album.clone(),
            artist_name_original: scrobble.artist.clone(),
            album_artist_name_original: album_artist.clone(),
            track_name: scrobble.name.clone(),
            album_name: album,
            artist_name: scrobble.artist.clone(),
            album_artist_name: album_artist,
            timestamp,
            edit_all: false,
        }
    }

    /// Whether submitting this would change nothing.
    pub fn is_noop(&self) -> bool {
        self.track_name == self.track_name_original
            && self.album_name == self.album_name_original
            && self.artist_name == self.artist_name_original
            && self.album_artist_name == self.album_artist_name_original
    }

    /// Whether `scrobble`, read back after submitting, carries the new values.
    pub fn applied_to(&self, scrobble: &Track) -> bool {
        let album = scrobble.album.as_deref().unwrap_or("");
        names_match(&scrobble.name, &self.track_name)
            && names_match(&scrobble.artist, &self.artist_name)
            && names_match(album, &self.album_name)
            && scrobble
                .album_artist
                .as_deref()
                .map_or(true, |album_artist| names_match(album_artist, &self.album_artist_name))
    }

    /// The stored values this edit starts from. The backend keys scrobbles
    /// by exact text, so no case folding here.
    pub(crate) fn variation_key(&self) -> [&str; 4] {
        [
            &self.track_name_original,
            &self.album_name_original,
            &self.album_artist_name_original,
            &self.artist_name_original,
        ]
    }

    /// Form fields for the edit POST, in submission order.
    pub fn build_form_data(&self, csrf_token: &str) -> Vec<(&'static str, String)> {
        let mut form_data = vec![
            ("csrfmiddlewaretoken", csrf_token.to_string()),
            ("track_name_original", self.track_name_original.clone()),
            ("track_name", self.track_name.clone()),
            ("artist_name_original", self.artist_name_original.clone()),
            ("artist_name", self.artist_name.clone()),
            ("album_name_original", self.album_name_original.clone()),
            ("album_name", self.album_name.clone()),
            (
                "album_artist_name_original",
                self.album_artist_name_original.clone(),
            ),
            ("album_artist_name", self.album_artist_name.clone()),
            ("timestamp", self.timestamp.to_string()),
        ];
        if self.edit_all {
            form_data.push(("edit_all", "1".to_string()));
        }
        form_data.push(("submit", "edit-scrobble".to_string()));
        form_data.push(("ajax", "1".to_string()));
        form_data
    }
}

impl std::fmt::Display for ExactScrobbleEdit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "'{}' by '{}' [{}] -> '{}' by '{}' [{}] @{}",
            self.track_name_original,
            self.artist_name_original,
            self.album_name_original,
            self.track_name,
            self.artist_name,
            self.album_name,
            self.timestamp
        )
    }
}

/// How one resolved match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeKind {
    Success,
    /// Already carried the new values; nothing was submitted
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOutcome {
    pub scrobble: ExactScrobbleEdit,
    pub outcome: OutcomeKind,
    pub failure_reason: Option<EditFailureReason>,
    /// Retries spent on this match (re-login included)
    pub retries: u32,
}

impl MatchOutcome {
    pub fn success(scrobble: ExactScrobbleEdit, retries: u32) -> Self {
        Self {
            scrobble,
            outcome: OutcomeKind::Success,
            failure_reason: None,
            retries,
        }
    }

    pub fn skipped(scrobble: ExactScrobbleEdit) -> Self {
        Self {
            scrobble,
            outcome: OutcomeKind::Skipped,
            failure_reason: None,
            retries: 0,
        }
    }

    pub fn failed(scrobble: ExactScrobbleEdit, reason: EditFailureReason, retries: u32) -> Self {
        Self {
            scrobble,
            outcome: OutcomeKind::Failed,
            failure_reason: Some(reason),
            retries,
        }
    }
}

/// Result of an edit: one outcome per resolved match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditResponse {
    matched_count: usize,
    edited_count: usize,
    outcomes: Vec<MatchOutcome>,
}

impl EditResponse {
    pub fn from_outcomes(outcomes: Vec<MatchOutcome>) -> Self {
        let edited_count = outcomes
            .iter()
            .filter(|o| o.outcome == OutcomeKind::Success)
            .count();
        Self {
            matched_count: outcomes.len(),
            edited_count,
            outcomes,
        }
    }

    /// True when every intended (non-skipped) match succeeded and there was
    /// at least one.
    pub fn success(&self) -> bool {
        let mut intended = self
            .outcomes
            .iter()
            .filter(|o| o.outcome != OutcomeKind::Skipped)
            .peekable();
        intended.peek().is_some() && intended.all(|o| o.outcome == OutcomeKind::Success)
    }

    pub fn matched_count(&self) -> usize {
        self.matched_count
    }

    pub fn edited_count(&self) -> usize {
        self.edited_count
    }

    pub fn outcomes(&self) -> &[MatchOutcome] {
        &self.outcomes
    }

    /// Total retries across all matches.
    pub fn retries(&self) -> u32 {
        self.outcomes.iter().map(|o| o.retries).sum()
    }

    /// One-line summary, including the first failure reason if any.
    pub fn message(&self) -> String {
        let first_failure = self.outcomes.iter().find_map(|o| o.failure_reason.as_ref());
        match first_failure {
            Some(reason) => format!(
                "Edited {} of {} matched scrobbles; first failure: {reason}",
                self.edited_count, self.matched_count
            ),
            None => format!(
                "Edited {} of {} matched scrobbles",
                self.edited_count, self.matched_count
            ),
        }
    }
}
