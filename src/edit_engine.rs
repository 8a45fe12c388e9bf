//! Scrobble edit execution: scope resolution, submission, verification and retry.

use crate::client::LastFmEditClientImpl;
use crate::decoder::{fields, PageKind};
use crate::edit::{EditResponse, EditScope, ExactScrobbleEdit, MatchOutcome, ScrobbleEdit};
use crate::edit_analysis::{classify_edit_response, echoed_names, EditVerdict};
use crate::error::EditFailureReason;
use crate::events::ClientEvent;
use crate::iterator::{AsyncPaginatedIterator, PaginatedSequence};
use crate::matcher::find_scrobble_by_timestamp;
use crate::retry::{RetryAction, RetryState};
use crate::session::LastFmEditSession;
use crate::{LastFmError, Result, Track};
use std::collections::HashSet;
use std::future::Future;
use std::time::Instant;

fn edit_failed(reason: EditFailureReason, matched: usize, edited: usize) -> LastFmError {
    LastFmError::EditFailed {
        reason,
        matched,
        edited,
    }
}

fn library_url(session: &LastFmEditSession) -> String {
    format!(
        "{}/user/{}/library",
        session.base_url(),
        urlencoding::encode(session.username())
    )
}

/// Read a whole listing. A library page that doesn't exist lists nothing.
async fn collect_listing(mut sequence: PaginatedSequence<Track>) -> Result<Vec<Track>> {
    match sequence.collect_all().await {
        Err(LastFmError::Fetch { page: 1, cause })
            if matches!(*cause, LastFmError::HttpStatus { status: 404, .. }) =>
        {
            Ok(Vec::new())
        }
        listing => listing,
    }
}

/// Distinct track names, in listing order.
fn track_names(tracks: Vec<Track>) -> Vec<String> {
    let mut seen = HashSet::new();
    tracks
        .into_iter()
        .map(|track| track.name)
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

impl LastFmEditClientImpl {
    /// Apply `edit` to every stored scrobble in its scope.
    ///
    /// With a timestamp the edit targets that one scrobble, looked up in the
    /// first `resolve_max_pages` pages of the scrobble log. Otherwise the scope
    /// is resolved from the library: the artist's or album's track listing,
    /// then up to `resolve_max_pages` pages of each track's scrobbles. Every
    /// distinct variation found is submitted with `edit_all`, so the backend
    /// rewrites all stored scrobbles carrying those exact values.
    ///
    /// # Errors
    ///
    /// - [`LastFmError::InvalidArgument`] for no-op or underspecified edits,
    ///   before any request
    /// - [`LastFmError::EditFailed`] with [`EditFailureReason::NoMatches`] when
    ///   nothing in scope was found, or with the give-up reason when a match ran
    ///   out of retries or the session could not be renewed
    pub async fn edit_scrobble(&self, edit: &ScrobbleEdit) -> Result<EditResponse> {
        edit.validate()?;
        self.session_manager().snapshot()?;

        let resolved = self.resolve_scope(edit).await?;
        if resolved.is_empty() {
            log::info!("No scrobbles found for {}", edit.scope());
            return Err(edit_failed(EditFailureReason::NoMatches, 0, 0));
        }

        let matched = resolved.len();
        let mut outcomes = Vec::with_capacity(matched);
        for exact in resolved {
            if exact.is_noop() {
                log::debug!("Skipping {exact}: already carries the new values");
                outcomes.push(MatchOutcome::skipped(exact));
                continue;
            }

            match self.submit_with_retry(&exact).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(LastFmError::EditFailed { reason, .. }) => {
                    let edited = EditResponse::from_outcomes(outcomes).edited_count();
                    return Err(edit_failed(reason, matched, edited));
                }
                Err(e) => return Err(e),
            }
        }

        let response = EditResponse::from_outcomes(outcomes);
        log::info!("{}", response.message());
        Ok(response)
    }

    /// Submit one fully specified edit, with the same retry and verification
    /// as [`edit_scrobble`](Self::edit_scrobble) but no scope resolution.
    pub async fn edit_scrobble_single(&self, exact: &ExactScrobbleEdit) -> Result<EditResponse> {
        if exact.is_noop() {
            return Err(LastFmError::invalid(format!(
                "Edit of scrobble at {} changes nothing",
                exact.timestamp
            )));
        }
        self.session_manager().snapshot()?;

        let outcome = self.submit_with_retry(exact).await?;
        Ok(EditResponse::from_outcomes(vec![outcome]))
    }

    async fn resolve_scope(&self, edit: &ScrobbleEdit) -> Result<Vec<ExactScrobbleEdit>> {
        let max_pages = self.config().resolve_max_pages;

        if let Some(timestamp) = edit.timestamp() {
            return Ok(match find_scrobble_by_timestamp(self, timestamp, max_pages).await? {
                Some(scrobble) if edit.scope().matches(&scrobble) => {
                    vec![edit.apply_to(&scrobble, timestamp, false)]
                }
                Some(scrobble) => {
                    log::warn!(
                        "Scrobble at {timestamp} ('{}' by '{}') is not in {}",
                        scrobble.name,
                        scrobble.artist,
                        edit.scope()
                    );
                    Vec::new()
                }
                None => Vec::new(),
            });
        }

        let scope = edit.scope();
        let tracks = match scope {
            EditScope::Track { track, .. } => vec![track.clone()],
            EditScope::Album { album, artist } => {
                track_names(collect_listing(self.get_album_tracks(album, artist, 0)?).await?)
            }
            EditScope::Artist { artist } => {
                track_names(collect_listing(self.get_artist_tracks(artist, 0)?).await?)
            }
        };
        log::debug!("Reading scrobbles of {} tracks for {scope}", tracks.len());

        let mut seen = HashSet::new();
        let mut resolved = Vec::new();
        for track in &tracks {
            let sequence = self
                .get_track_scrobbles(track, scope.artist(), 0)?
                .max_pages(max_pages);
            for scrobble in collect_listing(sequence).await? {
                if !scope.matches(&scrobble) {
                    continue;
                }
                let Some(timestamp) = scrobble.timestamp else {
                    log::debug!("Ignoring untimestamped scrobble '{}'", scrobble.name);
                    continue;
                };
                let exact = edit.apply_to(&scrobble, timestamp, true);
                let key = exact.variation_key().map(str::to_string);
                if seen.insert(key) {
                    resolved.push(exact);
                }
            }
        }

        log::debug!("Resolved {scope} to {} variations", resolved.len());
        Ok(resolved)
    }

    /// Submit until the backend gives a verdict.
    async fn submit_with_retry(&self, exact: &ExactScrobbleEdit) -> Result<MatchOutcome> {
        let (verdict, retries) = self
            .with_retry("Edit", move || async move {
                let started = Instant::now();
                let result = self.submit_exact(exact).await;
                self.report_attempt(exact, &result, started);
                result
            })
            .await?;

        Ok(match verdict {
            EditVerdict::Success => MatchOutcome::success(exact.clone(), retries),
            EditVerdict::Rejected(reason) => {
                log::info!("Edit {exact} rejected: {reason}");
                MatchOutcome::failed(exact.clone(), EditFailureReason::Rejected(reason), retries)
            }
            EditVerdict::Ambiguous => {
                log::info!("Edit {exact} could not be verified");
                MatchOutcome::failed(exact.clone(), EditFailureReason::Unverified, retries)
            }
        })
    }

    /// Run `attempt` until it succeeds, renewing the session or backing off as
    /// the error calls for. Returns the value and the number of retries.
    ///
    /// Running out of retries, or a session that cannot be renewed, ends in
    /// [`LastFmError::EditFailed`] with one match and nothing edited.
    async fn with_retry<T, F, Fut>(&self, operation: &str, mut attempt: F) -> Result<(T, u32)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retry = RetryState::new(self.config().retry.clone());

        loop {
            let (_, generation) = self.session_manager().snapshot()?;
            let error = match attempt().await {
                Ok(value) => return Ok((value, retry.retries())),
                Err(error) => error,
            };

            match retry.next_action(&error) {
                RetryAction::Relogin => {
                    log::info!("Session expired during {operation}, logging in again");
                    match self.session_manager().relogin(generation).await {
                        Ok(()) => {}
                        Err(LastFmError::SessionExpired) => {
                            return Err(edit_failed(EditFailureReason::SessionExpired, 1, 0));
                        }
                        Err(e) => return Err(e),
                    }
                }
                RetryAction::Backoff(delay) => {
                    log::info!(
                        "{operation} failed with {error}, retry {} of {} in {}s",
                        retry.retries(),
                        self.config().retry.max_retries,
                        delay.as_secs()
                    );
                    self.cancellation().sleep(delay).await?;
                }
                RetryAction::GiveUp(reason) => {
                    return Err(edit_failed(reason, 1, 0));
                }
                RetryAction::Propagate => return Err(error),
            }
        }
    }

    /// Delete the scrobble of `track_name` by `artist_name` recorded at
    /// `timestamp`.
    ///
    /// Uses the same retry and session renewal as edits. Returns `false` when
    /// the backend answers with a non-success status that isn't worth
    /// retrying.
    ///
    /// # Errors
    ///
    /// - [`LastFmError::InvalidArgument`] for blank names, before any request
    /// - [`LastFmError::EditFailed`] when retries ran out or the session could
    ///   not be renewed
    pub async fn delete_scrobble(
        &self,
        artist_name: &str,
        track_name: &str,
        timestamp: u64,
    ) -> Result<bool> {
        if artist_name.trim().is_empty() || track_name.trim().is_empty() {
            return Err(LastFmError::invalid(
                "Deleting a scrobble needs its artist and track names",
            ));
        }
        self.session_manager().snapshot()?;

        let (deleted, retries) = self
            .with_retry("Delete", move || {
                self.submit_delete(artist_name, track_name, timestamp)
            })
            .await?;
        log::info!(
            "Delete of '{track_name}' by '{artist_name}' at {timestamp}: {} after {retries} retries",
            if deleted { "done" } else { "refused" }
        );
        Ok(deleted)
    }

    async fn submit_delete(&self, artist_name: &str, track_name: &str, timestamp: u64) -> Result<bool> {
        let (session, _) = self.session_manager().snapshot()?;
        let library_url = library_url(&session);
        let csrf_token = self.fresh_csrf_token(&session, &library_url).await?;

        let form_data = [
            ("csrfmiddlewaretoken", csrf_token),
            ("artist_name", artist_name.to_string()),
            ("track_name", track_name.to_string()),
            ("timestamp", timestamp.to_string()),
            ("ajax", "1".to_string()),
        ];
        let referer = format!(
            "{}/user/{}",
            session.base_url(),
            urlencoding::encode(session.username())
        );
        let (status, _) = self
            .session_manager()
            .post_form(
                &format!("{library_url}/delete"),
                &referer,
                &form_data,
                PageKind::EditResult,
            )
            .await?;

        if (200..300).contains(&status) {
            Ok(true)
        } else {
            log::warn!("Delete of scrobble at {timestamp} refused with status {status}");
            Ok(false)
        }
    }

    /// CSRF token from the edit form, falling back to the session's token.
    async fn fresh_csrf_token(&self, session: &LastFmEditSession, library_url: &str) -> Result<String> {
        let edit_url = format!("{library_url}/edit?edited-variation=library-track-scrobble");
        log::debug!("Getting fresh CSRF token");
        let form = self
            .session_manager()
            .get_page(&edit_url, PageKind::EditForm)
            .await?;
        form.first()
            .get_non_empty(fields::CSRF_TOKEN)
            .or_else(|| {
                log::debug!("Edit form had no CSRF token, using the session token");
                session.csrf_token().map(str::to_string)
            })
            .ok_or(LastFmError::CsrfNotFound)
    }

    /// One submission: fresh CSRF token, POST, classify, verify if ambiguous.
    async fn submit_exact(&self, exact: &ExactScrobbleEdit) -> Result<EditVerdict> {
        let (session, _) = self.session_manager().snapshot()?;
        let library_url = library_url(&session);
        let edit_url = format!("{library_url}/edit?edited-variation=library-track-scrobble");
        let csrf_token = self.fresh_csrf_token(&session, &library_url).await?;

        log::debug!("Submitting edit {exact}");
        let form_data = exact.build_form_data(&csrf_token);
        let (status, page) = self
            .session_manager()
            .post_form(&edit_url, &library_url, &form_data, PageKind::EditResult)
            .await?;

        match classify_edit_response(status, &page) {
            EditVerdict::Success => {
                let (track, album) = echoed_names(&page);
                log::debug!(
                    "Edit successful - Track: '{}', Album: '{}'",
                    track.as_deref().unwrap_or("unknown"),
                    album.as_deref().unwrap_or("unknown")
                );
                Ok(EditVerdict::Success)
            }
            EditVerdict::Ambiguous => self.verify_edit(exact).await,
            rejected => Ok(rejected),
        }
    }

    /// Read the scrobble back and check it carries the new values.
    async fn verify_edit(&self, exact: &ExactScrobbleEdit) -> Result<EditVerdict> {
        let max_pages = self.config().verify_max_pages;
        log::debug!(
            "Ambiguous edit response, reading back scrobble at {} ({max_pages} pages)",
            exact.timestamp
        );

        let verdict = match find_scrobble_by_timestamp(self, exact.timestamp, max_pages).await? {
            Some(scrobble) if exact.applied_to(&scrobble) => EditVerdict::Success,
            Some(scrobble) => {
                log::debug!("Scrobble at {} still reads as {scrobble}", exact.timestamp);
                EditVerdict::Ambiguous
            }
            None => EditVerdict::Ambiguous,
        };
        Ok(verdict)
    }

    fn report_attempt(&self, exact: &ExactScrobbleEdit, result: &Result<EditVerdict>, started: Instant) {
        let (success, error_message) = match result {
            Ok(EditVerdict::Success) => (true, None),
            Ok(EditVerdict::Rejected(reason)) => (false, Some(reason.clone())),
            Ok(EditVerdict::Ambiguous) => (false, Some(EditFailureReason::Unverified.to_string())),
            Err(e) => (false, Some(e.to_string())),
        };
        self.broadcaster().broadcast_event(ClientEvent::EditAttempted {
            edit: exact.clone(),
            success,
            error_message,
            duration_ms: started.elapsed().as_millis() as u64,
        });
    }
}
