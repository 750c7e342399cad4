//! In-process stand-in for the parking web application
//!
//! Mirrors the HTML/form contract the harness drives: cookie sessions, one
//! single-use CSRF token per session (re-issued on every form page), flash
//! messages rendered as Bootstrap alerts, and plate/slot uniqueness.

#![allow(dead_code)]

use axum::{
    extract::{Form, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use parking_e2e::HarnessConfig;

#[derive(Debug, Clone)]
pub struct Parking {
    pub id: u64,
    pub plate: String,
    pub slot: String,
    pub vehicle_type: String,
    pub owner: String,
}

struct User {
    username: String,
    password: String,
    admin: bool,
}

#[derive(Default)]
struct WebSession {
    user: Option<String>,
    csrf: Option<String>,
    flashes: Vec<(String, String)>,
}

pub struct AppState {
    users: Vec<User>,
    sessions: HashMap<String, WebSession>,
    active: Vec<Parking>,
    history: Vec<Parking>,
    /// Sessions that only show up on the dashboard after some session ends
    hidden: Vec<Parking>,
    next_sid: u64,
    next_token: u64,
    next_parking: u64,
    rejected_tokens: usize,
    enforce_slot: bool,
    /// Duplicate plates are reported but a second row is created anyway
    leak_duplicate_plates: bool,
    /// Ending a session reports success but leaves the row active
    end_keeps_active: bool,
    /// Ended sessions are written to history
    archive_ended: bool,
    /// Successful logins allowed before every further attempt is rejected
    login_limit: Option<usize>,
    logins: usize,
    break_dashboard_after_history: bool,
    dashboard_broken: bool,
}

impl AppState {
    fn new() -> Self {
        Self {
            users: vec![User {
                username: "admin".to_string(),
                password: "password".to_string(),
                admin: true,
            }],
            sessions: HashMap::new(),
            active: Vec::new(),
            history: Vec::new(),
            hidden: Vec::new(),
            next_sid: 1,
            next_token: 1,
            next_parking: 1,
            rejected_tokens: 0,
            enforce_slot: true,
            leak_duplicate_plates: false,
            end_keeps_active: false,
            archive_ended: true,
            login_limit: None,
            logins: 0,
            break_dashboard_after_history: false,
            dashboard_broken: false,
        }
    }

    /// Session id from the cookie, creating a fresh session when unknown
    fn session(&mut self, headers: &HeaderMap) -> (String, bool) {
        let existing = headers
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|cookies| {
                cookies
                    .split(';')
                    .filter_map(|c| c.trim().strip_prefix("sid="))
                    .next()
                    .map(str::to_string)
            })
            .filter(|sid| self.sessions.contains_key(sid));

        match existing {
            Some(sid) => (sid, false),
            None => {
                let sid = format!("s{}", self.next_sid);
                self.next_sid += 1;
                self.sessions.insert(sid.clone(), WebSession::default());
                (sid, true)
            }
        }
    }

    fn web(&mut self, sid: &str) -> &mut WebSession {
        self.sessions.entry(sid.to_string()).or_default()
    }

    fn issue_token(&mut self, sid: &str) -> String {
        let token = format!("tok-{}-{}", sid, self.next_token);
        self.next_token += 1;
        self.web(sid).csrf = Some(token.clone());
        token
    }

    /// Tokens are single use: any submission consumes the current one
    fn consume_token(&mut self, sid: &str, form: &HashMap<String, String>) -> bool {
        let current = self.web(sid).csrf.take();
        let ok = match (current, form.get("csrf_token")) {
            (Some(expected), Some(given)) => expected == *given,
            _ => false,
        };
        if !ok {
            self.rejected_tokens += 1;
        }
        ok
    }

    fn flash(&mut self, sid: &str, category: &str, message: &str) {
        self.web(sid)
            .flashes
            .push((category.to_string(), message.to_string()));
    }

    fn take_flashes(&mut self, sid: &str) -> Vec<(String, String)> {
        std::mem::take(&mut self.web(sid).flashes)
    }

    fn user(&mut self, sid: &str) -> Option<String> {
        self.web(sid).user.clone()
    }

    fn is_admin(&self, username: &str) -> bool {
        self.users.iter().any(|u| u.username == username && u.admin)
    }

    fn add_parking(&mut self, plate: &str, slot: &str, vehicle_type: &str, owner: &str) -> Parking {
        let parking = Parking {
            id: self.next_parking,
            plate: plate.to_string(),
            slot: slot.to_string(),
            vehicle_type: vehicle_type.to_string(),
            owner: owner.to_string(),
        };
        self.next_parking += 1;
        parking
    }
}

type Shared = Arc<Mutex<AppState>>;

/// Handle to a running fake application
pub struct FakeParkingApp {
    pub base_url: String,
    state: Shared,
}

impl FakeParkingApp {
    pub async fn spawn() -> Self {
        let state: Shared = Arc::new(Mutex::new(AppState::new()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake parking app");
        let addr = listener.local_addr().expect("fake app local addr");

        let app = router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve fake parking app");
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    fn lock(&self) -> MutexGuard<'_, AppState> {
        self.state.lock().expect("fake app state poisoned")
    }

    /// Default harness configuration pointed at this instance
    pub fn config(&self) -> HarnessConfig {
        HarnessConfig {
            base_url: self.base_url.clone(),
            ..HarnessConfig::default()
        }
    }

    pub fn add_user(&self, username: &str, password: &str) {
        self.lock().users.push(User {
            username: username.to_string(),
            password: password.to_string(),
            admin: false,
        });
    }

    /// Park a car directly, bypassing the forms
    pub fn park(&self, plate: &str, slot: &str) -> u64 {
        let mut state = self.lock();
        let parking = state.add_parking(plate, slot, "1", "admin");
        let id = parking.id;
        state.active.push(parking);
        id
    }

    /// A session that appears on the dashboard only once another one ends
    pub fn park_hidden(&self, plate: &str, slot: &str) {
        let mut state = self.lock();
        let parking = state.add_parking(plate, slot, "1", "admin");
        state.hidden.push(parking);
    }

    pub fn set_enforce_slot(&self, enforce: bool) {
        self.lock().enforce_slot = enforce;
    }

    pub fn set_leak_duplicate_plates(&self, leak: bool) {
        self.lock().leak_duplicate_plates = leak;
    }

    pub fn set_end_keeps_active(&self, keep: bool) {
        self.lock().end_keeps_active = keep;
    }

    pub fn set_archive(&self, archive: bool) {
        self.lock().archive_ended = archive;
    }

    /// After `limit` successful logins, reject further logins and fail the dashboard
    pub fn lock_out_after_logins(&self, limit: usize) {
        self.lock().login_limit = Some(limit);
    }

    /// The dashboard answers 500 once the history page has been viewed
    pub fn break_dashboard_after_history(&self) {
        self.lock().break_dashboard_after_history = true;
    }

    pub fn rejected_tokens(&self) -> usize {
        self.lock().rejected_tokens
    }

    pub fn active_plates(&self) -> Vec<String> {
        self.lock().active.iter().map(|p| p.plate.clone()).collect()
    }

    pub fn history_plates(&self) -> Vec<String> {
        self.lock().history.iter().map(|p| p.plate.clone()).collect()
    }

    pub fn usernames(&self) -> Vec<String> {
        self.lock().users.iter().map(|u| u.username.clone()).collect()
    }
}

fn router(state: Shared) -> Router {
    Router::new()
        .route("/", get(dashboard))
        .route("/login", get(login_page).post(login_submit))
        .route("/users", get(users_page))
        .route("/users/add", get(add_user_page).post(add_user_submit))
        .route("/start", post(start_submit))
        .route("/end/:id", post(end_submit))
        .route("/history", get(history_page))
        .with_state(state)
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn layout(title: &str, flashes: &[(String, String)], body: &str) -> String {
    let alerts: String = flashes
        .iter()
        .map(|(category, message)| {
            format!(
                "<div class=\"alert alert-{} alert-dismissible\" role=\"alert\">{}<button type=\"button\" class=\"btn-close\" aria-label=\"Close\"></button></div>\n",
                category,
                escape(message)
            )
        })
        .collect();
    format!(
        "<!doctype html>\n<html><head><title>{}</title></head><body>\n<nav class=\"navbar\"><a href=\"/\">Parking</a></nav>\n<main>\n{}{}\n</main></body></html>",
        title, alerts, body
    )
}

fn csrf_input(token: &str) -> String {
    format!(
        "<input type=\"hidden\" name=\"csrf_token\" value=\"{}\">",
        escape(token)
    )
}

fn page(sid: &str, fresh: bool, status: StatusCode, html: String) -> Response {
    let mut response = (status, Html(html)).into_response();
    if fresh {
        if let Ok(cookie) = HeaderValue::from_str(&format!("sid={}; Path=/; HttpOnly", sid)) {
            response.headers_mut().insert(header::SET_COOKIE, cookie);
        }
    }
    response
}

fn redirect(sid: &str, fresh: bool, to: &str) -> Response {
    let mut response = Redirect::to(to).into_response();
    if fresh {
        if let Ok(cookie) = HeaderValue::from_str(&format!("sid={}; Path=/; HttpOnly", sid)) {
            response.headers_mut().insert(header::SET_COOKIE, cookie);
        }
    }
    response
}

fn csrf_rejected(sid: &str, fresh: bool) -> Response {
    page(
        sid,
        fresh,
        StatusCode::BAD_REQUEST,
        layout(
            "Bad Request",
            &[],
            "<h1>Bad Request</h1><p>The CSRF token is invalid.</p>",
        ),
    )
}

fn render_login(token: &str, flashes: &[(String, String)]) -> String {
    layout(
        "Login",
        flashes,
        &format!(
            "<form method=\"post\" action=\"/login\">{}<input name=\"username\"><input name=\"password\" type=\"password\"><input type=\"submit\" name=\"submit\" value=\"Login\"></form>",
            csrf_input(token)
        ),
    )
}

async fn login_page(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut st = state.lock().expect("state");
    let (sid, fresh) = st.session(&headers);
    let token = st.issue_token(&sid);
    let flashes = st.take_flashes(&sid);
    page(&sid, fresh, StatusCode::OK, render_login(&token, &flashes))
}

async fn login_submit(
    State(state): State<Shared>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let mut st = state.lock().expect("state");
    let (sid, fresh) = st.session(&headers);
    if !st.consume_token(&sid, &form) {
        return csrf_rejected(&sid, fresh);
    }

    let username = form.get("username").cloned().unwrap_or_default();
    let password = form.get("password").cloned().unwrap_or_default();
    let mut valid = st
        .users
        .iter()
        .any(|u| u.username == username && u.password == password);
    if valid && st.login_limit.is_some_and(|limit| st.logins >= limit) {
        st.dashboard_broken = true;
        valid = false;
    }

    if !valid {
        let token = st.issue_token(&sid);
        let flashes = vec![("danger".to_string(), "Invalid username or password.".to_string())];
        return page(&sid, fresh, StatusCode::OK, render_login(&token, &flashes));
    }

    st.logins += 1;
    st.web(&sid).user = Some(username);
    st.flash(&sid, "success", "Logged in successfully.");
    redirect(&sid, fresh, "/")
}

fn session_rows(parkings: &[Parking], token: Option<&str>) -> String {
    parkings
        .iter()
        .map(|p| {
            let action = token
                .map(|t| {
                    format!(
                        "<td><form action=\"/end/{}\" method=\"post\">{}<button type=\"submit\" class=\"btn btn-sm\">End</button></form></td>",
                        p.id,
                        csrf_input(t)
                    )
                })
                .unwrap_or_default();
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td>{}</tr>\n",
                escape(&p.plate),
                escape(&p.slot),
                escape(&p.vehicle_type),
                escape(&p.owner),
                action
            )
        })
        .collect()
}

async fn dashboard(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut st = state.lock().expect("state");
    let (sid, fresh) = st.session(&headers);
    if st.user(&sid).is_none() {
        return redirect(&sid, fresh, "/login");
    }
    if st.dashboard_broken {
        return page(
            &sid,
            fresh,
            StatusCode::INTERNAL_SERVER_ERROR,
            layout("Error", &[], "<h1>Internal Server Error</h1>"),
        );
    }

    let token = st.issue_token(&sid);
    let flashes = st.take_flashes(&sid);
    let body = format!(
        "<form method=\"post\" action=\"/start\">{}<input name=\"car_plate\"><select name=\"vehicle_type_id\"><option value=\"1\">Car</option></select><input name=\"slot\"><input type=\"submit\" name=\"submit\" value=\"Start Parking\"></form>\n<table class=\"table\">\n<tr><th>Plate</th><th>Slot</th><th>Type</th><th>Owner</th><th></th></tr>\n{}</table>",
        csrf_input(&token),
        session_rows(&st.active, Some(&token))
    );
    page(&sid, fresh, StatusCode::OK, layout("Dashboard", &flashes, &body))
}

async fn start_submit(
    State(state): State<Shared>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let mut st = state.lock().expect("state");
    let (sid, fresh) = st.session(&headers);
    let Some(owner) = st.user(&sid) else {
        return redirect(&sid, fresh, "/login");
    };
    if !st.consume_token(&sid, &form) {
        return csrf_rejected(&sid, fresh);
    }

    let plate = form.get("car_plate").cloned().unwrap_or_default();
    let slot = form.get("slot").cloned().unwrap_or_default();
    let vehicle_type = form.get("vehicle_type_id").cloned().unwrap_or_default();

    if st.active.iter().any(|p| p.plate == plate) {
        st.flash(&sid, "danger", "This car is already parked.");
        if st.leak_duplicate_plates {
            let parking = st.add_parking(&plate, &slot, &vehicle_type, &owner);
            st.active.push(parking);
        }
    } else if st.enforce_slot && st.active.iter().any(|p| p.slot == slot) {
        st.flash(&sid, "danger", "Slot is already occupied.");
    } else {
        let parking = st.add_parking(&plate, &slot, &vehicle_type, &owner);
        st.active.push(parking);
        st.flash(&sid, "success", "Parking started.");
    }
    redirect(&sid, fresh, "/")
}

async fn end_submit(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let mut st = state.lock().expect("state");
    let (sid, fresh) = st.session(&headers);
    if st.user(&sid).is_none() {
        return redirect(&sid, fresh, "/login");
    }
    if !st.consume_token(&sid, &form) {
        return csrf_rejected(&sid, fresh);
    }

    let position = id
        .parse::<u64>()
        .ok()
        .and_then(|id| st.active.iter().position(|p| p.id == id));

    match position {
        Some(index) => {
            let ended = if st.end_keeps_active {
                st.active[index].clone()
            } else {
                st.active.remove(index)
            };
            if st.archive_ended {
                st.history.push(ended);
            }
            let revealed = std::mem::take(&mut st.hidden);
            st.active.extend(revealed);
            st.flash(&sid, "success", "Parking ended.");
        }
        None => st.flash(&sid, "danger", "Parking session not found."),
    }
    redirect(&sid, fresh, "/")
}

async fn history_page(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut st = state.lock().expect("state");
    let (sid, fresh) = st.session(&headers);
    if st.user(&sid).is_none() {
        return redirect(&sid, fresh, "/login");
    }

    if st.break_dashboard_after_history {
        st.dashboard_broken = true;
    }

    let flashes = st.take_flashes(&sid);
    let body = format!(
        "<h1>History</h1><table class=\"table\">\n<tr><th>Plate</th><th>Slot</th><th>Type</th><th>Owner</th></tr>\n{}</table>",
        session_rows(&st.history, None)
    );
    page(&sid, fresh, StatusCode::OK, layout("History", &flashes, &body))
}

/// Admin-only pages answer 403 to drivers
fn require_admin(st: &mut AppState, sid: &str, fresh: bool) -> Result<(), Response> {
    match st.user(sid) {
        None => Err(redirect(sid, fresh, "/login")),
        Some(user) if !st.is_admin(&user) => Err(page(
            sid,
            fresh,
            StatusCode::FORBIDDEN,
            layout("Forbidden", &[], "<h1>Forbidden</h1>"),
        )),
        Some(_) => Ok(()),
    }
}

async fn users_page(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut st = state.lock().expect("state");
    let (sid, fresh) = st.session(&headers);
    if let Err(response) = require_admin(&mut st, &sid, fresh) {
        return response;
    }

    let flashes = st.take_flashes(&sid);
    let rows: String = st
        .users
        .iter()
        .map(|u| {
            format!(
                "<tr><td>{}</td><td>{}</td></tr>\n",
                escape(&u.username),
                if u.admin { "Administrator" } else { "Driver" }
            )
        })
        .collect();
    let body = format!(
        "<h1>Users</h1><a href=\"/users/add\">Add</a><table class=\"table\">\n<tr><th>Username</th><th>Role</th></tr>\n{}</table>",
        rows
    );
    page(&sid, fresh, StatusCode::OK, layout("Users", &flashes, &body))
}

async fn add_user_page(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut st = state.lock().expect("state");
    let (sid, fresh) = st.session(&headers);
    if let Err(response) = require_admin(&mut st, &sid, fresh) {
        return response;
    }

    let token = st.issue_token(&sid);
    let flashes = st.take_flashes(&sid);
    let body = format!(
        "<form method=\"post\" action=\"/users/add\">{}<input name=\"username\"><input name=\"password\" type=\"password\"><input type=\"submit\" name=\"submit\" value=\"Create\"></form>",
        csrf_input(&token)
    );
    page(&sid, fresh, StatusCode::OK, layout("Add user", &flashes, &body))
}

async fn add_user_submit(
    State(state): State<Shared>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let mut st = state.lock().expect("state");
    let (sid, fresh) = st.session(&headers);
    if let Err(response) = require_admin(&mut st, &sid, fresh) {
        return response;
    }
    if !st.consume_token(&sid, &form) {
        return csrf_rejected(&sid, fresh);
    }

    let username = form.get("username").cloned().unwrap_or_default();
    let password = form.get("password").cloned().unwrap_or_default();

    if st.users.iter().any(|u| u.username == username) {
        st.flash(&sid, "danger", "Username already exists.");
    } else {
        st.users.push(User {
            username,
            password,
            admin: false,
        });
        st.flash(&sid, "success", "User created.");
    }
    redirect(&sid, fresh, "/users")
}
