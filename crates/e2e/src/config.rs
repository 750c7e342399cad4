//! Harness configuration
//!
//! Everything the scenarios need to know about the target application lives
//! here: where it is, who to log in as, and which plates and slots to use.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{E2eError, E2eResult};

pub const ENV_BASE_URL: &str = "PARKING_E2E_BASE_URL";
pub const ENV_ADMIN_USER: &str = "PARKING_E2E_ADMIN_USER";
pub const ENV_ADMIN_PASSWORD: &str = "PARKING_E2E_ADMIN_PASSWORD";

/// Top-level harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Base URL of the application under test
    pub base_url: String,

    /// Administrator account, used for user management and cleanup
    pub admin: Credentials,

    /// First driver account
    pub driver1: Credentials,

    /// Second driver account
    pub driver2: Credentials,

    /// Plate and slot literals used by the scenarios
    pub fixtures: ParkingFixtures,

    /// Cleanup behavior around the suite
    pub cleanup: CleanupPolicy,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            admin: Credentials::new("admin", "password"),
            driver1: Credentials::new("DRIVER1", "password"),
            driver2: Credentials::new("DRIVER2", "password"),
            fixtures: ParkingFixtures::default(),
            cleanup: CleanupPolicy::default(),
        }
    }
}

/// Username/password pair for one actor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParkingFixtures {
    /// Plate parked by the first driver and then reused as a duplicate
    pub primary_plate: String,

    /// Plate used to probe the occupied slot
    pub secondary_plate: String,

    pub slot: String,

    pub vehicle_type_id: String,
}

impl Default for ParkingFixtures {
    fn default() -> Self {
        Self {
            primary_plate: "22224444".to_string(),
            secondary_plate: "99998888".to_string(),
            slot: "22".to_string(),
            vehicle_type_id: "1".to_string(),
        }
    }
}

/// How hard the cleanup helper tries to empty the dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupPolicy {
    /// Maximum number of dashboard scans; 1 means a single best-effort pass
    pub max_passes: u32,
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self { max_passes: 3 }
    }
}

impl HarnessConfig {
    /// Load configuration from a YAML file, falling back to defaults when absent
    pub fn load(path: &Path) -> E2eResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_yaml(&content)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        serde_yaml::from_str(yaml).map_err(E2eError::from)
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_BASE_URL) {
            self.base_url = url;
        }
        if let Some(user) = lookup(ENV_ADMIN_USER) {
            self.admin.username = user;
        }
        if let Some(password) = lookup(ENV_ADMIN_PASSWORD) {
            self.admin.password = password;
        }
    }

    pub fn validate(&self) -> E2eResult<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(E2eError::InvalidConfig(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }

        let fixtures = &self.fixtures;
        for (field, value) in [
            ("fixtures.primary_plate", &fixtures.primary_plate),
            ("fixtures.secondary_plate", &fixtures.secondary_plate),
            ("fixtures.slot", &fixtures.slot),
        ] {
            if value.trim().is_empty() {
                return Err(E2eError::InvalidConfig(format!("{} must not be empty", field)));
            }
        }

        if fixtures.primary_plate == fixtures.secondary_plate {
            return Err(E2eError::InvalidConfig(
                "primary_plate and secondary_plate must differ".to_string(),
            ));
        }

        if self.cleanup.max_passes == 0 {
            return Err(E2eError::InvalidConfig(
                "cleanup.max_passes must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
