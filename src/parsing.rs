//! HTML decoding for Last.fm pages.
//!
//! [`HtmlPageDecoder`] turns the web interface's chartlist tables, login form
//! and edit responses into [`RawRecord`]s. It knows nothing about sessions or
//! pagination policy; it only reports what a single page contains.

use crate::decoder::{fields, DecodedPage, PageDecoder, PageKind, RawRecord};
use crate::{LastFmError, Result};
use scraper::{ElementRef, Html, Selector};

/// Default [`PageDecoder`] for the Last.fm web interface.
#[derive(Debug, Clone, Default)]
pub struct HtmlPageDecoder;

impl HtmlPageDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl PageDecoder for HtmlPageDecoder {
    fn decode(&self, body: &[u8], kind: PageKind) -> Result<DecodedPage> {
        let html = String::from_utf8_lossy(body);
        let document = Html::parse_document(&html);

        let page = match kind {
            PageKind::Scrobbles => with_pagination(&document, kind, parse_scrobble_rows(&document)?)?,
            PageKind::Tracks | PageKind::Albums => {
                with_pagination(&document, kind, parse_chartlist_rows(&document, kind)?)?
            }
            PageKind::Artists => with_pagination(&document, kind, parse_artist_rows(&document)?)?,
            PageKind::LoginForm => DecodedPage::new(kind, vec![parse_login_form(&document)?]),
            PageKind::EditForm => DecodedPage::new(kind, vec![parse_edit_form(&document)?]),
            PageKind::EditResult => {
                DecodedPage::new(kind, vec![parse_edit_result(&document, &html)?])
            }
        };

        log::debug!("Decoded {} {} records", page.records.len(), kind);
        Ok(page)
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| LastFmError::Parse(format!("Bad selector '{css}': {e}")))
}

fn text_of(element: ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn first_text(row: &ElementRef, css: &str) -> Result<Option<String>> {
    Ok(row
        .select(&selector(css)?)
        .next()
        .map(text_of)
        .filter(|text| !text.is_empty()))
}

fn first_input_value(scope: &ElementRef, name: &str) -> Result<Option<String>> {
    Ok(scope
        .select(&selector(&format!("input[name='{name}']"))?)
        .next()
        .and_then(|input| input.value().attr("value"))
        .map(str::to_string))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn chartlist_rows(document: &Html) -> Result<Vec<ElementRef<'_>>> {
    let table_selector = selector("table.chartlist")?;
    let row_selector = selector("tbody tr")?;
    Ok(document
        .select(&table_selector)
        .flat_map(|table| table.select(&row_selector).collect::<Vec<_>>())
        .collect())
}

/// Scrobble rows, from the log or from one track's library page. Names come
/// from the row's edit form when it has one, since those are the stored
/// values an edit has to quote; the chartlist columns are the fallback.
/// Aggregate rows (a play count bar instead of a single scrobble) are skipped.
fn parse_scrobble_rows(document: &Html) -> Result<Vec<RawRecord>> {
    let count_bar = selector(".chartlist-count-bar-link")?;
    let mut records = Vec::new();
    for row in chartlist_rows(document)? {
        if row.select(&count_bar).next().is_some() {
            continue;
        }
        let name = match non_blank(first_input_value(&row, "track_name")?) {
            Some(name) => Some(name),
            None => first_text(&row, ".chartlist-name a")?,
        };
        let Some(name) = name else {
            continue;
        };
        let mut record = RawRecord::new().with(fields::NAME, name);
        let artist = match non_blank(first_input_value(&row, "artist_name")?) {
            Some(artist) => Some(artist),
            None => first_text(&row, ".chartlist-artist a")?,
        };
        if let Some(artist) = artist {
            record.push(fields::ARTIST, artist);
        }

        let timestamp = match row.value().attr("data-timestamp") {
            Some(ts) => Some(ts.to_string()),
            None => first_input_value(&row, "timestamp")?,
        };
        if let Some(timestamp) = timestamp {
            record.push(fields::TIMESTAMP, timestamp);
        }
        if let Some(album) = first_input_value(&row, "album_name")? {
            record.push(fields::ALBUM, album);
        }
        if let Some(album_artist) = first_input_value(&row, "album_artist_name")? {
            record.push(fields::ALBUM_ARTIST, album_artist);
        }
        records.push(record);
    }
    Ok(records)
}

/// Aggregate track or album rows, including search results. Artist-scoped
/// listings carry no artist column; the fetcher fills that field in.
fn parse_chartlist_rows(document: &Html, kind: PageKind) -> Result<Vec<RawRecord>> {
    let data_attr = match kind {
        PageKind::Albums => "data-album-name",
        _ => "data-track-name",
    };
    let data_selector = selector(&format!("[{data_attr}]"))?;

    let mut records = Vec::new();
    for row in chartlist_rows(document)? {
        let from_attr = row
            .value()
            .attr(data_attr)
            .or_else(|| {
                row.select(&data_selector)
                    .next()
                    .and_then(|el| el.value().attr(data_attr))
            })
            .map(str::to_string)
            .filter(|name| !name.is_empty());
        let name = match from_attr {
            Some(name) => name,
            None => match first_text(&row, ".chartlist-name a")? {
                Some(name) => name,
                None => continue,
            },
        };

        let mut record = RawRecord::new().with(fields::NAME, name);
        if let Some(artist) = first_text(&row, ".chartlist-artist a")? {
            record.push(fields::ARTIST, artist);
        }
        if let Some(count) = first_text(&row, ".chartlist-count-bar-value")? {
            record.push(fields::PLAYCOUNT, count);
        }
        if kind == PageKind::Tracks {
            if let Some(album) = first_input_value(&row, "album")? {
                record.push(fields::ALBUM, album);
            }
            if let Some(album_artist) = first_input_value(&row, "album_artist")? {
                record.push(fields::ALBUM_ARTIST, album_artist);
            }
        }
        records.push(record);
    }
    Ok(records)
}

fn parse_artist_rows(document: &Html) -> Result<Vec<RawRecord>> {
    let mut records = Vec::new();
    for row in chartlist_rows(document)? {
        let Some(name) = first_text(&row, "td.chartlist-name a")? else {
            continue;
        };
        let mut record = RawRecord::new().with(fields::NAME, name);
        if let Some(count) = first_text(&row, ".chartlist-count-bar")? {
            record.push(fields::PLAYCOUNT, count);
        }
        records.push(record);
    }
    Ok(records)
}

fn with_pagination(document: &Html, kind: PageKind, records: Vec<RawRecord>) -> Result<DecodedPage> {
    let mut page = DecodedPage::new(kind, records);

    // No pagination block: leave the decision to the record count.
    let Some(pagination) = document.select(&selector(".pagination-list")?).next() else {
        return Ok(page);
    };

    let next_selector = selector(".pagination-next a, a[aria-label=\"Next\"]")?;
    page.has_next_page = Some(pagination.select(&next_selector).next().is_some());
    page.total_pages = pagination
        .select(&selector(".pagination-page")?)
        .filter_map(|item| text_of(item).parse::<u32>().ok())
        .max();
    Ok(page)
}

fn parse_login_form(document: &Html) -> Result<RawRecord> {
    let root = document.root_element();
    let mut record = RawRecord::new();

    if let Some(token) = first_input_value(&root, "csrfmiddlewaretoken")? {
        record.push(fields::CSRF_TOKEN, token);
    }
    if let Some(next) = first_input_value(&root, "next")? {
        record.push(fields::NEXT, next);
    }

    let login_form_selector =
        selector("form[action*=\"login\"], input[name=\"username_or_email\"]")?;
    let has_login_form = document.select(&login_form_selector).next().is_some();
    record.push(fields::HAS_LOGIN_FORM, has_login_form.to_string());

    let error_selector = selector(".alert-danger, .form-error, .error-message")?;
    for error in document.select(&error_selector) {
        let text = text_of(error);
        if !text.is_empty() {
            record.push(fields::ERROR, text);
        }
    }
    Ok(record)
}

fn parse_edit_form(document: &Html) -> Result<RawRecord> {
    let mut record = RawRecord::new();
    if let Some(token) = first_input_value(&document.root_element(), "csrfmiddlewaretoken")? {
        record.push(fields::CSRF_TOKEN, token);
    }
    Ok(record)
}

fn parse_edit_result(document: &Html, html: &str) -> Result<RawRecord> {
    let success_selector = selector(".alert-success")?;
    let error_selector = selector(".alert-danger, .alert-error, .error")?;

    let mut record = RawRecord::new();
    if let Some(error) = document.select(&error_selector).next() {
        record.push(fields::ALERT, "error");
        record.push(fields::MESSAGE, text_of(error));
    } else if let Some(success) = document.select(&success_selector).next() {
        record.push(fields::ALERT, "success");
        record.push(fields::MESSAGE, text_of(success));
    }

    let root = document.root_element();
    let track_name = match first_text(&root, "td.chartlist-name a")? {
        Some(name) => Some(name),
        None => link_segment(html, r#"href="/music/[^"]+/_/([^"]+)""#)?,
    };
    let album_name = match first_text(&root, "td.chartlist-album a")? {
        Some(name) => Some(name),
        None => link_segment(html, r#"href="/music/[^"/]+/([^"/_][^"/]*)""#)?,
    };
    if let Some(track_name) = track_name {
        record.push(fields::TRACK_NAME, track_name);
    }
    if let Some(album_name) = album_name {
        record.push(fields::ALBUM_NAME, album_name);
    }
    Ok(record)
}

/// First capture of `pattern` in `html`, decoded from its URL path form.
fn link_segment(html: &str, pattern: &str) -> Result<Option<String>> {
    let regex = regex::Regex::new(pattern)
        .map_err(|e| LastFmError::Parse(format!("Bad pattern '{pattern}': {e}")))?;
    Ok(regex.captures(html).and_then(|captures| {
        let raw = captures.get(1)?.as_str();
        let decoded = urlencoding::decode(raw)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| raw.to_string());
        Some(decoded.replace('+', " "))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(html: &str, kind: PageKind) -> DecodedPage {
        HtmlPageDecoder::new().decode(html.as_bytes(), kind).unwrap()
    }

    #[test]
    fn scrobble_rows_carry_edit_form_fields() {
        let html = r#"
            <table class="chartlist"><tbody>
              <tr class="chartlist-row">
                <td class="chartlist-name"><a href="/music/Radiohead/_/Creep">Creep</a></td>
                <td class="chartlist-artist"><a href="/music/Radiohead">Radiohead</a></td>
                <td><form data-edit-scrobble>
                  <input name="timestamp" value="1640995200">
                  <input name="album_name" value="Pablo Honey">
                  <input name="album_artist_name" value="Radiohead">
                </form></td>
              </tr>
              <tr><td>Now scrobbling nothing</td></tr>
            </tbody></table>
        "#;

        let page = decode(html, PageKind::Scrobbles);
        assert_eq!(page.records.len(), 1);
        let record = &page.records[0];
        assert_eq!(record.get(fields::NAME), Some("Creep"));
        assert_eq!(record.get(fields::ARTIST), Some("Radiohead"));
        assert_eq!(record.get(fields::TIMESTAMP), Some("1640995200"));
        assert_eq!(record.get(fields::ALBUM), Some("Pablo Honey"));
        assert_eq!(page.has_next_page, None);
    }

    #[test]
    fn track_page_rows_quote_stored_names_and_skip_aggregates() {
        let html = r#"
            <table class="chartlist"><tbody>
              <tr class="chartlist-row">
                <td class="chartlist-name"><a href="/music/Radiohead/_/Creep">Creep</a></td>
                <td><a class="chartlist-count-bar-link" href="/user/u/library/music/Radiohead/_/Creep">12 scrobbles</a></td>
              </tr>
              <tr class="chartlist-row">
                <td class="chartlist-name"><a href="/music/Radiohead/_/Creep">Creep</a></td>
                <td class="chartlist-artist"><a href="/music/Radiohead">Radiohead</a></td>
                <td><form data-edit-scrobble>
                  <input name="track_name" value="Creep ">
                  <input name="artist_name" value="Radiohead">
                  <input name="timestamp" value="1640995200">
                  <input name="album_name" value="Pablo Honey">
                </form></td>
              </tr>
            </tbody></table>
        "#;

        let page = decode(html, PageKind::Scrobbles);
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].get(fields::NAME), Some("Creep "));
        assert_eq!(page.records[0].get(fields::TIMESTAMP), Some("1640995200"));
    }

    #[test]
    fn search_rows_carry_album_inputs() {
        let html = r#"
            <table class="chartlist"><tbody>
              <tr class="chartlist-row">
                <td class="chartlist-name"><a href="/music/Radiohead/_/Airbag">Airbag</a></td>
                <td class="chartlist-artist"><a href="/music/Radiohead">Radiohead</a></td>
                <td>
                  <input type="hidden" name="album" value="OK Computer">
                  <input type="hidden" name="album_artist" value="Radiohead">
                </td>
              </tr>
            </tbody></table>
        "#;

        let page = decode(html, PageKind::Tracks);
        let record = &page.records[0];
        assert_eq!(record.get(fields::NAME), Some("Airbag"));
        assert_eq!(record.get(fields::ARTIST), Some("Radiohead"));
        assert_eq!(record.get(fields::ALBUM), Some("OK Computer"));
        assert_eq!(record.get(fields::ALBUM_ARTIST), Some("Radiohead"));
    }

    #[test]
    fn aggregate_rows_and_pagination() {
        let html = r#"
            <table class="chartlist"><tbody>
              <tr data-track-name="Kid A">
                <td class="chartlist-name"><a href="/music/Radiohead/_/Kid+A">Kid A</a></td>
                <td><span class="chartlist-count-bar-value">1,024 scrobbles</span></td>
              </tr>
              <tr>
                <td class="chartlist-name"><a href="/music/Radiohead/_/Idioteque">Idioteque</a></td>
              </tr>
            </tbody></table>
            <ul class="pagination-list">
              <li class="pagination-page">1</li>
              <li class="pagination-page"><a href="?page=7">7</a></li>
              <li class="pagination-next"><a href="?page=2">Next</a></li>
            </ul>
        "#;

        let page = decode(html, PageKind::Tracks);
        let names: Vec<_> = page.records.iter().filter_map(|r| r.get(fields::NAME)).collect();
        assert_eq!(names, vec!["Kid A", "Idioteque"]);
        assert_eq!(page.records[0].get(fields::PLAYCOUNT), Some("1,024 scrobbles"));
        assert_eq!(page.records[1].get(fields::ARTIST), None);
        assert_eq!(page.has_next_page, Some(true));
        assert_eq!(page.total_pages, Some(7));
    }

    #[test]
    fn last_page_has_no_next_link() {
        let html = r#"
            <table class="chartlist"><tbody>
              <tr class="js-link-block">
                <td class="chartlist-name"><a href="/music/Wilco">Wilco</a></td>
                <td><span class="chartlist-count-bar">3,395 scrobbles</span></td>
              </tr>
            </tbody></table>
            <ul class="pagination-list"><li class="pagination-page">3</li></ul>
        "#;

        let page = decode(html, PageKind::Artists);
        assert_eq!(page.records[0].get(fields::NAME), Some("Wilco"));
        assert_eq!(page.records[0].get(fields::PLAYCOUNT), Some("3,395 scrobbles"));
        assert_eq!(page.has_next_page, Some(false));
    }

    #[test]
    fn login_form_fields_and_errors() {
        let html = r#"
            <form action="/login" method="post">
              <input type="hidden" name="csrfmiddlewaretoken" value="tok123">
              <input type="hidden" name="next" value="/user/_">
              <input name="username_or_email">
              <div class="alert-danger">Incorrect username or password.</div>
            </form>
        "#;

        let record = decode(html, PageKind::LoginForm).first();
        assert_eq!(record.get(fields::CSRF_TOKEN), Some("tok123"));
        assert_eq!(record.get(fields::NEXT), Some("/user/_"));
        assert!(record.get_flag(fields::HAS_LOGIN_FORM));
        assert_eq!(
            record.get_all(fields::ERROR).collect::<Vec<_>>(),
            vec!["Incorrect username or password."]
        );

        let home = decode("<html><body>Welcome</body></html>", PageKind::LoginForm).first();
        assert!(!home.get_flag(fields::HAS_LOGIN_FORM));
        assert_eq!(home.get(fields::CSRF_TOKEN), None);
    }

    #[test]
    fn edit_result_alerts_and_echoed_names() {
        let success = r#"
            <div class="alert-success">Scrobble edited</div>
            <table><tr>
              <td class="chartlist-name"><a href="/music/artist/_/track">Test Track</a></td>
              <td class="chartlist-album"><a href="/music/artist/album">Test Album</a></td>
            </tr></table>
        "#;
        let record = decode(success, PageKind::EditResult).first();
        assert_eq!(record.get(fields::ALERT), Some("success"));
        assert_eq!(record.get(fields::TRACK_NAME), Some("Test Track"));
        assert_eq!(record.get(fields::ALBUM_NAME), Some("Test Album"));

        let error = r#"<div class="alert-danger">Invalid data</div>"#;
        let record = decode(error, PageKind::EditResult).first();
        assert_eq!(record.get(fields::ALERT), Some("error"));
        assert_eq!(record.get(fields::MESSAGE), Some("Invalid data"));

        let bare = r#"<a href="/music/Artist/Album+Name">a</a> <a href="/music/Artist/_/Track+Name">t</a>"#;
        let record = decode(bare, PageKind::EditResult).first();
        assert_eq!(record.get(fields::ALERT), None);
        assert_eq!(record.get(fields::TRACK_NAME), Some("Track Name"));
        assert_eq!(record.get(fields::ALBUM_NAME), Some("Album Name"));
    }
}
