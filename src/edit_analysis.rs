use crate::decoder::{fields, DecodedPage};

/// How the backend answered an edit submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditVerdict {
    /// The response positively confirms the edit.
    Success,
    /// The backend surfaced a validation error; never retried.
    Rejected(String),
    /// Neither confirmation nor error; the edit must be verified by reading back.
    Ambiguous,
}

/// Classify the decoded response to an edit POST.
///
/// Transient statuses (redirect to login, 429, 5xx) are turned into errors
/// before a response gets here, so any remaining non-2xx status is a rejection.
pub fn classify_edit_response(status: u16, page: &DecodedPage) -> EditVerdict {
    if !(200..300).contains(&status) {
        return EditVerdict::Rejected(format!("Edit failed with status: {status}"));
    }

    let record = page.first();
    let verdict = match record.get(fields::ALERT) {
        Some("error") => EditVerdict::Rejected(
            record
                .get_non_empty(fields::MESSAGE)
                .unwrap_or_else(|| "Edit failed with unknown error".to_string()),
        ),
        Some("success") => EditVerdict::Success,
        _ => EditVerdict::Ambiguous,
    };

    log::debug!(
        "Edit response classified as {verdict:?} (track='{}', album='{}')",
        record.get(fields::TRACK_NAME).unwrap_or("not found"),
        record.get(fields::ALBUM_NAME).unwrap_or("not found")
    );
    verdict
}

/// Track and album names echoed back by a confirmed edit, if present.
pub fn echoed_names(page: &DecodedPage) -> (Option<String>, Option<String>) {
    let record = page.first();
    (
        record.get_non_empty(fields::TRACK_NAME),
        record.get_non_empty(fields::ALBUM_NAME),
    )
}
