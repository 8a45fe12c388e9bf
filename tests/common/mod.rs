#![allow(dead_code)]
//! A scripted in-memory transport and a JSON fixture decoder.
//!
//! Response bodies are JSON-serialized [`DecodedPage`]s, so tests describe
//! what a page *contains* rather than how it is rendered.

use async_trait::async_trait;
use http_client::{Error, HttpClient, Request, Response};
use scrobble_edit::{
    fields, ClientConfig, DecodedPage, LastFmEditClientImpl, LastFmError, PageDecoder, PageKind,
    RawRecord,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub const BASE_URL: &str = "https://fake.test";
pub const USERNAME: &str = "alice";
pub const PASSWORD: &str = "hunter2";

/// One scripted response.
#[derive(Debug, Clone)]
pub struct Reply {
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
}

impl Reply {
    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn page(page: &DecodedPage) -> Self {
        Self::ok(serde_json::to_string(page).expect("fixture page serializes"))
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Self::status(200)
        }
    }

    pub fn redirect(location: &str) -> Self {
        Self::status(302).with_header("location", location)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_cookie(self, cookie: &str) -> Self {
        self.with_header("set-cookie", cookie)
    }
}

/// A request as the transport saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    /// Path plus query
    pub target: String,
    pub cookie: Option<String>,
    pub body: String,
}

#[derive(Debug)]
struct Route {
    method: String,
    target: String,
    replies: VecDeque<Reply>,
}

/// Answers requests from scripted routes.
///
/// A route matches on method and path-plus-query. Its replies are used in
/// order and the last one repeats. Unmatched requests get a 404.
#[derive(Debug, Default)]
pub struct FakeTransport {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<Recorded>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, method: &str, target: &str, replies: Vec<Reply>) {
        let mut routes = self.routes.lock().unwrap();
        routes.retain(|r| !(r.method == method && r.target == target));
        routes.push(Route {
            method: method.to_string(),
            target: target.to_string(),
            replies: replies.into(),
        });
    }

    pub fn on_get(&self, target: &str, reply: Reply) {
        self.on("GET", target, vec![reply]);
    }

    pub fn on_post(&self, target: &str, reply: Reply) {
        self.on("POST", target, vec![reply]);
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, method: &str, target: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method && r.target == target)
            .count()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }

    fn reply_for(&self, method: &str, target: &str) -> Reply {
        let mut routes = self.routes.lock().unwrap();
        let Some(route) = routes
            .iter_mut()
            .find(|r| r.method == method && r.target == target)
        else {
            return Reply::status(404);
        };
        if route.replies.len() > 1 {
            route.replies.pop_front().unwrap()
        } else {
            route.replies.front().cloned().unwrap_or_else(|| Reply::status(404))
        }
    }
}

#[async_trait]
impl HttpClient for FakeTransport {
    async fn send(&self, mut req: Request) -> Result<Response, Error> {
        let method = req.method().to_string().to_uppercase();
        let target = match req.url().query() {
            Some(query) => format!("{}?{query}", req.url().path()),
            None => req.url().path().to_string(),
        };
        let cookie = req
            .header("cookie")
            .and_then(|values| values.get(0))
            .map(|value| value.as_str().to_string());
        let body = req.body_string().await.unwrap_or_default();

        let reply = self.reply_for(&method, &target);
        self.requests.lock().unwrap().push(Recorded {
            method,
            target,
            cookie,
            body,
        });

        let mut response = Response::new(reply.status);
        for (name, value) in &reply.headers {
            response.append_header(name.as_str(), value.as_str());
        }
        response.set_body(reply.body);
        Ok(response)
    }
}

/// Decodes the JSON bodies produced by [`Reply::page`]. An empty body is an empty page.
#[derive(Debug, Default)]
pub struct FixtureDecoder;

impl PageDecoder for FixtureDecoder {
    fn decode(&self, body: &[u8], kind: PageKind) -> scrobble_edit::Result<DecodedPage> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(DecodedPage::new(kind, Vec::new()));
        }
        let mut page: DecodedPage =
            serde_json::from_slice(body).map_err(|e| LastFmError::Parse(e.to_string()))?;
        page.kind = kind;
        Ok(page)
    }
}

pub fn test_config() -> ClientConfig {
    ClientConfig::new()
        .with_retry_delays(0, 0)
        .with_resolve_max_pages(5)
}

pub fn client_with(transport: &Arc<FakeTransport>, config: ClientConfig) -> LastFmEditClientImpl {
    LastFmEditClientImpl::with_config(
        transport.clone(),
        Arc::new(FixtureDecoder),
        BASE_URL,
        config,
    )
}

pub fn client(transport: &Arc<FakeTransport>) -> LastFmEditClientImpl {
    client_with(transport, test_config())
}

pub fn login_form() -> DecodedPage {
    DecodedPage::new(
        PageKind::LoginForm,
        vec![RawRecord::new()
            .with(fields::CSRF_TOKEN, "login-csrf")
            .with(fields::HAS_LOGIN_FORM, "true")],
    )
}

/// Script a login page that accepts [`USERNAME`]/[`PASSWORD`] with a fresh session cookie.
pub fn script_login(transport: &FakeTransport) {
    transport.on_get(
        "/login",
        Reply::page(&login_form()).with_cookie("csrftoken=abc; Path=/"),
    );
    transport.on_post(
        "/login",
        Reply::redirect("/user/alice")
            .with_cookie("sessionid=.session-1; Path=/; HttpOnly")
            .with_cookie("csrftoken=def; Path=/"),
    );
}

/// Script a login page that re-renders the form with an error.
pub fn script_rejected_login(transport: &FakeTransport) {
    transport.on_get(
        "/login",
        Reply::page(&login_form()).with_cookie("csrftoken=abc; Path=/"),
    );
    let mut rejected = login_form();
    rejected.records[0].push(fields::ERROR, "Incorrect username or password.");
    transport.on_post("/login", Reply::page(&rejected));
}

pub async fn logged_in_client(transport: &Arc<FakeTransport>) -> LastFmEditClientImpl {
    logged_in_client_with(transport, test_config()).await
}

pub async fn logged_in_client_with(
    transport: &Arc<FakeTransport>,
    config: ClientConfig,
) -> LastFmEditClientImpl {
    script_login(transport);
    let client = client_with(transport, config);
    client.login(USERNAME, PASSWORD).await.expect("scripted login succeeds");
    transport.clear_requests();
    client
}

pub fn scrobble(name: &str, artist: &str, album: &str, timestamp: u64) -> RawRecord {
    RawRecord::new()
        .with(fields::NAME, name)
        .with(fields::ARTIST, artist)
        .with(fields::ALBUM, album)
        .with(fields::ALBUM_ARTIST, artist)
        .with(fields::TIMESTAMP, timestamp.to_string())
}

pub fn scrobble_page(records: Vec<RawRecord>) -> DecodedPage {
    DecodedPage::new(PageKind::Scrobbles, records)
}

pub fn library_target(page: u32) -> String {
    format!("/user/{USERNAME}/library?page={page}")
}

/// Serve `pages` as the scrobble log, followed by an empty page.
pub fn script_scrobble_log(transport: &FakeTransport, pages: Vec<Vec<RawRecord>>) {
    let count = pages.len() as u32;
    for (index, records) in pages.into_iter().enumerate() {
        transport.on_get(
            &library_target(index as u32 + 1),
            Reply::page(&scrobble_page(records)),
        );
    }
    transport.on_get(&library_target(count + 1), Reply::page(&scrobble_page(vec![])));
}

pub const EDIT_TARGET: &str = "/user/alice/library/edit?edited-variation=library-track-scrobble";

pub fn edit_form() -> Reply {
    Reply::page(&DecodedPage::new(
        PageKind::EditForm,
        vec![RawRecord::new().with(fields::CSRF_TOKEN, "edit-csrf")],
    ))
}

pub fn edit_success() -> Reply {
    Reply::page(&DecodedPage::new(
        PageKind::EditResult,
        vec![RawRecord::new().with(fields::ALERT, "success")],
    ))
}

pub fn edit_error(message: &str) -> Reply {
    Reply::page(&DecodedPage::new(
        PageKind::EditResult,
        vec![RawRecord::new()
            .with(fields::ALERT, "error")
            .with(fields::MESSAGE, message)],
    ))
}

/// Decode a recorded form body into pairs.
pub fn form_fields(body: &str) -> Vec<(String, String)> {
    body.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            let decode = |s: &str| {
                urlencoding::decode(&s.replace('+', " "))
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| s.to_string())
            };
            (decode(name), decode(value))
        })
        .collect()
}

pub fn form_value(body: &str, name: &str) -> Option<String> {
    form_fields(body)
        .into_iter()
        .find(|(field, _)| field == name)
        .map(|(_, value)| value)
}

/// Names in library paths use `+` for spaces.
pub fn path_name(name: &str) -> String {
    urlencoding::encode(name).replace("%20", "+")
}

pub fn artist_tracks_target(artist: &str, page: u32) -> String {
    format!(
        "/user/{USERNAME}/library/music/{}/+tracks?page={page}&ajax=true",
        path_name(artist)
    )
}

pub fn album_tracks_target(artist: &str, album: &str, page: u32) -> String {
    format!(
        "/user/{USERNAME}/library/music/{}/{}?page={page}&ajax=true",
        path_name(artist),
        path_name(album)
    )
}

pub fn track_scrobbles_target(artist: &str, track: &str, page: u32) -> String {
    format!(
        "/user/{USERNAME}/library/music/+noredirect/{}/_/{}?page={page}",
        path_name(artist),
        path_name(track)
    )
}

/// A track row as listed under an artist or album; the listing implies the artist.
pub fn listed_track(name: &str) -> RawRecord {
    RawRecord::new().with(fields::NAME, name)
}

fn single_page(kind: PageKind, records: Vec<RawRecord>) -> Reply {
    Reply::page(&DecodedPage::new(kind, records).with_has_next_page(false))
}

/// Serve one track's library page of scrobbles.
pub fn script_track_scrobbles(
    transport: &FakeTransport,
    artist: &str,
    track: &str,
    records: Vec<RawRecord>,
) {
    transport.on_get(
        &track_scrobbles_target(artist, track, 1),
        single_page(PageKind::Scrobbles, records),
    );
}

/// Serve an artist's track listing and each listed track's scrobbles.
pub fn script_artist_catalogue(
    transport: &FakeTransport,
    artist: &str,
    tracks: Vec<(&str, Vec<RawRecord>)>,
) {
    let listing = tracks.iter().map(|(name, _)| listed_track(name)).collect();
    transport.on_get(
        &artist_tracks_target(artist, 1),
        single_page(PageKind::Tracks, listing),
    );
    for (track, records) in tracks {
        script_track_scrobbles(transport, artist, track, records);
    }
}

/// Serve an album's track listing and each listed track's scrobbles.
pub fn script_album_catalogue(
    transport: &FakeTransport,
    artist: &str,
    album: &str,
    tracks: Vec<(&str, Vec<RawRecord>)>,
) {
    let listing = tracks.iter().map(|(name, _)| listed_track(name)).collect();
    transport.on_get(
        &album_tracks_target(artist, album, 1),
        single_page(PageKind::Tracks, listing),
    );
    for (track, records) in tracks {
        script_track_scrobbles(transport, artist, track, records);
    }
}
