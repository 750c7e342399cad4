//! Parking E2E Test Framework
//!
//! This crate drives the parking management web application over HTTP the
//! way a browser would:
//! - Logs actors in with their own cookie-holding sessions
//! - Scrapes a fresh CSRF token before every form submission
//! - Reads outcome messages from the rendered alert boxes
//! - Runs functional scenarios and ends leftover parking sessions around them
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Suite Runner (Rust)                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  SuiteRunner                                                │
//! │    ├── close_all_sessions()      (before and after)         │
//! │    ├── SuiteContext::setup()     admin, driver1, driver2    │
//! │    └── Scenario::run()           in Scenario::ALL order     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ParkingApp (page object)                                   │
//! │    ├── fetch_token(session, url)                            │
//! │    ├── login / add_user / ensure_user / user_exists         │
//! │    ├── start_parking / end_parking                          │
//! │    └── fetch_active_sessions / fetch_history / fetch_users  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  NotificationExtractor        html scraping helpers         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod cleanup;
pub mod client;
pub mod config;
pub mod error;
pub mod html;
pub mod notification;
pub mod runner;
pub mod scenario;

pub use client::{ActiveSession, Page, ParkingApp, Session};
pub use config::{CleanupPolicy, Credentials, HarnessConfig, ParkingFixtures};
pub use error::{E2eError, E2eResult};
pub use notification::{extract_notification, AlertClassExtractor, NotificationExtractor};
pub use runner::{SuiteResult, SuiteRunner};
pub use scenario::{Scenario, SuiteContext};
