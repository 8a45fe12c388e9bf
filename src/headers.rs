//! Request construction and cookie jar helpers shared by every exchange.

use crate::{LastFmError, Result};
use http_client::{Request, Response};
use http_types::{Method, Url};

/// Common Chrome user agent string for all requests
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36";

const SEC_CH_UA: &str =
    "\"Not)A;Brand\";v=\"8\", \"Chromium\";v=\"138\", \"Google Chrome\";v=\"138\"";

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8";

fn parse_url(url: &str) -> Result<Url> {
    url.parse::<Url>()
        .map_err(|e| LastFmError::invalid(format!("Invalid URL '{url}': {e}")))
}

fn add_common_headers(request: &mut Request) {
    let _ = request.insert_header("User-Agent", USER_AGENT);
    let _ = request.insert_header("Accept-Language", "en-US,en;q=0.9");
    let _ = request.insert_header("DNT", "1");
    let _ = request.insert_header("sec-ch-ua", SEC_CH_UA);
    let _ = request.insert_header("sec-ch-ua-mobile", "?0");
    let _ = request.insert_header("sec-ch-ua-platform", "\"Linux\"");
}

fn add_cookies(request: &mut Request, cookies: &[String]) {
    if !cookies.is_empty() {
        let _ = request.insert_header("Cookie", cookies.join("; "));
    }
}

/// GET request for a page or an AJAX fragment.
pub fn get_request(url: &str, cookies: &[String], referer: Option<&str>) -> Result<Request> {
    let mut request = Request::new(Method::Get, parse_url(url)?);
    add_common_headers(&mut request);

    if url.contains("ajax=") {
        let _ = request.insert_header("Accept", "*/*");
        let _ = request.insert_header("X-Requested-With", "XMLHttpRequest");
    } else {
        let _ = request.insert_header("Accept", ACCEPT_HTML);
        let _ = request.insert_header("Upgrade-Insecure-Requests", "1");
    }
    if let Some(referer) = referer {
        let _ = request.insert_header("Referer", referer);
    }
    add_cookies(&mut request, cookies);
    Ok(request)
}

/// URL-encoded form POST. `ajax` selects the XHR header set used by the edit form.
pub fn form_request(
    url: &str,
    referer: &str,
    cookies: &[String],
    form: &[(&str, String)],
    ajax: bool,
) -> Result<Request> {
    let mut request = Request::new(Method::Post, parse_url(url)?);
    add_common_headers(&mut request);

    if ajax {
        let _ = request.insert_header("Accept", "*/*");
        let _ = request.insert_header(
            "Content-Type",
            "application/x-www-form-urlencoded;charset=UTF-8",
        );
        let _ = request.insert_header("X-Requested-With", "XMLHttpRequest");
    } else {
        let _ = request.insert_header("Accept", ACCEPT_HTML);
        let _ = request.insert_header("Content-Type", "application/x-www-form-urlencoded");
        if let Some(origin) = origin_of(url) {
            let _ = request.insert_header("Origin", origin);
        }
    }
    let _ = request.insert_header("Referer", referer);
    add_cookies(&mut request, cookies);

    request.set_body(encode_form(form));
    Ok(request)
}

pub fn encode_form(form: &[(&str, String)]) -> String {
    form.iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn origin_of(url: &str) -> Option<String> {
    let parsed = url.parse::<Url>().ok()?;
    let origin = parsed.origin().ascii_serialization();
    (origin != "null").then_some(origin)
}

/// Merge `Set-Cookie` headers from `response` into `cookies`.
///
/// Only the `name=value` part is kept; a cookie replaces any earlier one with
/// the same name. Returns how many cookies were set.
pub fn merge_cookies(response: &Response, cookies: &mut Vec<String>) -> usize {
    let mut merged = 0;
    if let Some(cookie_headers) = response.header("set-cookie") {
        for cookie_header in cookie_headers {
            if let Some(cookie_value) = cookie_header.as_str().split(';').next() {
                let cookie_value = cookie_value.trim();
                let cookie_name = cookie_value.split('=').next().unwrap_or("");
                if cookie_name.is_empty() {
                    continue;
                }
                let prefix = format!("{cookie_name}=");
                cookies.retain(|existing| !existing.starts_with(&prefix));
                cookies.push(cookie_value.to_string());
                merged += 1;
            }
        }
    }
    if merged > 0 {
        log::trace!("Merged {merged} cookies, jar now holds {}", cookies.len());
    }
    merged
}

/// Value of the `sessionid` cookie, if the jar holds a non-empty one.
pub fn session_id(cookies: &[String]) -> Option<&str> {
    cookies
        .iter()
        .filter_map(|cookie| cookie.strip_prefix("sessionid="))
        .find(|value| !value.is_empty() && *value != "\"\"")
}
