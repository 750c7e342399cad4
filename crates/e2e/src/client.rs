//! Page-object client for the parking application
//!
//! Each named operation maps onto the form the application renders for it.
//! State-changing operations always scrape a fresh CSRF token from the page
//! they target immediately before submitting; no API here accepts a token
//! from the caller, so a stale token can only come from the server side.

use tracing::{debug, info, warn};

use crate::config::Credentials;
use crate::error::{E2eError, E2eResult};
use crate::html;
use crate::notification::{AlertClassExtractor, NotificationExtractor};

/// Name of the hidden anti-forgery input on every form
pub const CSRF_FIELD: &str = "csrf_token";

/// Markers the login page shows when credentials are rejected (lowercase)
const INVALID_LOGIN_MARKERS: &[&str] = &["invalid username or password", "invalid credentials"];

/// An HTTP session for one actor, holding its own cookie jar
#[derive(Debug)]
pub struct Session {
    label: String,
    http: reqwest::Client,
}

impl Session {
    pub fn new(label: impl Into<String>) -> E2eResult<Self> {
        let http = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(Self {
            label: label.into(),
            http,
        })
    }

    /// Actor name used in logs
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// A fetched page: final URL after redirects, status, and body
#[derive(Debug, Clone)]
pub struct Page {
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl Page {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.body.contains(needle)
    }

    /// Non-overlapping occurrences of `needle` in the body
    pub fn count(&self, needle: &str) -> usize {
        self.body.matches(needle).count()
    }
}

/// A dashboard row that offers an "end" form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSession {
    /// Identifier embedded in the form action as `/end/<id>`
    pub id: String,
    /// Visible text of the whole row
    pub text: String,
}

impl ActiveSession {
    pub fn mentions(&self, needle: &str) -> bool {
        self.text.contains(needle)
    }
}

/// Session identifier from an end-form action such as `/end/42`
pub fn session_id_from_action(action: &str) -> Option<String> {
    let (_, rest) = action.split_once("/end/")?;
    let id = rest.split(['/', '?', '#']).next().unwrap_or_default();
    (!id.is_empty()).then(|| id.to_string())
}

/// Rows of a dashboard page whose first form targets an end endpoint
pub fn parse_active_sessions(body: &str) -> Vec<ActiveSession> {
    html::find_all(body, "tr")
        .into_iter()
        .filter_map(|row| {
            let form = row.find_first(|tag| tag.name == "form" && tag.attr("action").is_some())?;
            let id = session_id_from_action(&form.attr("action")?)?;
            Some(ActiveSession {
                id,
                text: row.text(),
            })
        })
        .collect()
}

/// Whether two URLs point at the same path, ignoring query and fragment
fn same_path(requested: &str, landed: &str) -> bool {
    match (reqwest::Url::parse(requested), reqwest::Url::parse(landed)) {
        (Ok(a), Ok(b)) => a.path().trim_end_matches('/') == b.path().trim_end_matches('/'),
        _ => requested == landed,
    }
}

/// Page object wrapping the application's documented operations
pub struct ParkingApp {
    base_url: String,
    extractor: Box<dyn NotificationExtractor>,
}

impl ParkingApp {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            extractor: Box::new(AlertClassExtractor::default()),
        }
    }

    /// Swap the notification scraping strategy
    pub fn with_extractor(mut self, extractor: impl NotificationExtractor + 'static) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an application path such as `/users`
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// User-visible outcome message of a page
    pub fn notification(&self, page: &Page) -> String {
        self.extractor.extract(&page.body)
    }

    async fn read_page(response: reqwest::Response) -> E2eResult<Page> {
        let status = response.status().as_u16();
        let url = response.url().to_string();
        let body = response.text().await?;
        Ok(Page { url, status, body })
    }

    /// GET a page, treating any non-success status as an infrastructure failure
    async fn get(&self, session: &Session, url: &str) -> E2eResult<Page> {
        debug!("[{}] GET {}", session.label(), url);
        let response = session.http.get(url).send().await?;
        let page = Self::read_page(response).await?;

        if !page.is_success() {
            return Err(E2eError::UnexpectedStatus {
                method: "GET".to_string(),
                url: url.to_string(),
                status: page.status,
            });
        }
        Ok(page)
    }

    /// POST a form and return whatever the application rendered
    async fn post_form(&self, session: &Session, url: &str, form: &[(&str, &str)]) -> E2eResult<Page> {
        debug!("[{}] POST {}", session.label(), url);
        let response = session.http.post(url).form(form).send().await?;
        let page = Self::read_page(response).await?;
        debug!("[{}] POST {} -> {}", session.label(), url, page.status);
        Ok(page)
    }

    /// GET `url` and return the value of its CSRF input
    ///
    /// The page must be the one requested: a logged-out session that is sent
    /// to `/login` would otherwise hand back the login form's token.
    pub async fn fetch_token(&self, session: &Session, url: &str) -> E2eResult<String> {
        let page = self.get(session, url).await?;
        if !same_path(url, &page.url) {
            warn!("[{}] GET {} landed on {}", session.label(), url, page.url);
            return Err(E2eError::Redirected {
                from: url.to_string(),
                to: page.url,
            });
        }
        let token = html::input_value(&page.body, CSRF_FIELD).ok_or_else(|| {
            E2eError::MissingToken {
                url: url.to_string(),
            }
        })?;
        debug!("[{}] fetched CSRF token from {}", session.label(), url);
        Ok(token)
    }

    /// Log in and return the landing page
    pub async fn login(&self, session: &Session, credentials: &Credentials) -> E2eResult<Page> {
        let url = self.url("/login");
        let token = self.fetch_token(session, &url).await?;

        info!("[{}] logging in as {}", session.label(), credentials.username);
        let page = self
            .post_form(
                session,
                &url,
                &[
                    (CSRF_FIELD, token.as_str()),
                    ("username", credentials.username.as_str()),
                    ("password", credentials.password.as_str()),
                    ("submit", "Login"),
                ],
            )
            .await?;

        if !page.is_success() {
            return Err(E2eError::UnexpectedStatus {
                method: "POST".to_string(),
                url,
                status: page.status,
            });
        }

        let lowered = page.body.to_lowercase();
        if let Some(marker) = INVALID_LOGIN_MARKERS.iter().find(|m| lowered.contains(*m)) {
            return Err(E2eError::LoginFailed {
                username: credentials.username.clone(),
                reason: format!("login page reported '{}'", marker),
            });
        }

        Ok(page)
    }

    /// Submit the add-user form. The response is returned as-is; duplicate
    /// usernames are for the caller to detect.
    pub async fn add_user(&self, admin: &Session, username: &str, password: &str) -> E2eResult<Page> {
        let url = self.url("/users/add");
        let token = self.fetch_token(admin, &url).await?;

        info!("[{}] adding user {}", admin.label(), username);
        self.post_form(
            admin,
            &url,
            &[
                (CSRF_FIELD, token.as_str()),
                ("username", username),
                ("password", password),
                ("submit", "Create"),
            ],
        )
        .await
    }

    /// Create the user unless the listing already shows it.
    ///
    /// Returns `true` when a user was created. Unlike [`ParkingApp::add_user`]
    /// this verifies the outcome: a user still missing from the listing after
    /// creation is an error.
    pub async fn ensure_user(&self, admin: &Session, credentials: &Credentials) -> E2eResult<bool> {
        if self.user_exists(admin, &credentials.username).await? {
            debug!("[{}] user {} already present", admin.label(), credentials.username);
            return Ok(false);
        }

        let page = self
            .add_user(admin, &credentials.username, &credentials.password)
            .await?;

        if !self.user_exists(admin, &credentials.username).await? {
            return Err(E2eError::AssertionFailed(format!(
                "user '{}' missing from listing after creation (status {}, message '{}')",
                credentials.username,
                page.status,
                self.notification(&page)
            )));
        }
        Ok(true)
    }

    /// Submit the start-parking form from the dashboard
    pub async fn start_parking(
        &self,
        session: &Session,
        plate: &str,
        slot: &str,
        vehicle_type_id: &str,
    ) -> E2eResult<Page> {
        let token = self.fetch_token(session, &self.url("/")).await?;

        info!("[{}] starting parking for {} in slot {}", session.label(), plate, slot);
        self.post_form(
            session,
            &self.url("/start"),
            &[
                (CSRF_FIELD, token.as_str()),
                ("car_plate", plate),
                ("vehicle_type_id", vehicle_type_id),
                ("slot", slot),
                ("submit", "Start Parking"),
            ],
        )
        .await
    }

    /// Submit the end form for one parking session
    pub async fn end_parking(&self, session: &Session, session_id: &str) -> E2eResult<Page> {
        let token = self.fetch_token(session, &self.url("/")).await?;

        info!("[{}] ending parking session {}", session.label(), session_id);
        self.post_form(
            session,
            &self.url(&format!("/end/{}", session_id)),
            &[(CSRF_FIELD, token.as_str())],
        )
        .await
    }

    /// The dashboard listing active sessions
    pub async fn fetch_active_sessions(&self, session: &Session) -> E2eResult<Page> {
        self.get(session, &self.url("/")).await
    }

    /// Active sessions currently offering an end form on the dashboard
    pub async fn active_sessions(&self, session: &Session) -> E2eResult<Vec<ActiveSession>> {
        let page = self.fetch_active_sessions(session).await?;
        Ok(parse_active_sessions(&page.body))
    }

    pub async fn fetch_history(&self, session: &Session) -> E2eResult<Page> {
        self.get(session, &self.url("/history")).await
    }

    pub async fn fetch_users(&self, session: &Session) -> E2eResult<Page> {
        self.get(session, &self.url("/users")).await
    }

    /// Substring check against the users listing.
    ///
    /// A username that is a substring of another listed name also matches.
    pub async fn user_exists(&self, admin: &Session, username: &str) -> E2eResult<bool> {
        let page = self.fetch_users(admin).await?;
        Ok(page.contains(username))
    }
}
