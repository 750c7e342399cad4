//! Functional scenarios against the parking application
//!
//! Scenarios share one [`SuiteContext`] and run in the order of
//! [`Scenario::ALL`]. Later scenarios depend on state left by earlier ones:
//! the duplicate checks rely on the car parked by `duplicate_car_parking`,
//! and `close_and_verify_parking` ends that same session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::client::{ParkingApp, Session};
use crate::config::{Credentials, HarnessConfig};
use crate::error::{E2eError, E2eResult};

/// Sessions and configuration shared by every scenario in a run
pub struct SuiteContext {
    pub config: HarnessConfig,
    pub app: ParkingApp,
    pub admin: Session,
    driver1: Option<Session>,
    driver2: Option<Session>,
}

impl SuiteContext {
    /// Log the administrator in. Driver sessions are created on first use.
    pub async fn setup(config: HarnessConfig) -> E2eResult<Self> {
        let app = ParkingApp::new(config.base_url.clone());
        let admin = Session::new("admin")?;
        app.login(&admin, &config.admin).await?;

        Ok(Self {
            config,
            app,
            admin,
            driver1: None,
            driver2: None,
        })
    }

    /// Make sure both driver accounts exist and are logged in
    pub async fn ensure_drivers(&mut self) -> E2eResult<()> {
        if self.driver1.is_none() {
            self.driver1 = Some(self.driver_session("driver1", &self.config.driver1).await?);
        }
        if self.driver2.is_none() {
            self.driver2 = Some(self.driver_session("driver2", &self.config.driver2).await?);
        }
        Ok(())
    }

    async fn driver_session(&self, label: &str, credentials: &Credentials) -> E2eResult<Session> {
        self.app.ensure_user(&self.admin, credentials).await?;
        let session = Session::new(label)?;
        self.app.login(&session, credentials).await?;
        Ok(session)
    }

    /// Both driver sessions; call [`SuiteContext::ensure_drivers`] first
    pub fn drivers(&self) -> E2eResult<(&Session, &Session)> {
        match (&self.driver1, &self.driver2) {
            (Some(d1), Some(d2)) => Ok((d1, d2)),
            _ => Err(E2eError::FixtureNotReady(
                "driver sessions requested before ensure_drivers".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Step,
    Check,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub kind: EntryKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Ordered record of what a scenario did and what it verified
#[derive(Debug, Default)]
pub struct ScenarioLog {
    entries: Vec<LogEntry>,
}

impl ScenarioLog {
    pub fn step(&mut self, message: impl Into<String>) {
        self.push(EntryKind::Step, message.into());
    }

    pub fn check(&mut self, message: impl Into<String>) {
        self.push(EntryKind::Check, message.into());
    }

    fn push(&mut self, kind: EntryKind, message: String) {
        match kind {
            EntryKind::Step => info!("  step: {}", message),
            EntryKind::Check => info!("  check: {}", message),
        }
        self.entries.push(LogEntry {
            kind,
            message,
            at: Utc::now(),
        });
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<LogEntry> {
        self.entries
    }
}

fn ensure(condition: bool, message: impl FnOnce() -> String) -> E2eResult<()> {
    if condition {
        Ok(())
    } else {
        Err(E2eError::AssertionFailed(message()))
    }
}

/// Case-insensitive check for any of `needles` in `haystack`
pub fn contains_any_ignore_case(haystack: &str, needles: &[&str]) -> bool {
    let haystack = haystack.to_lowercase();
    needles
        .iter()
        .any(|needle| haystack.contains(&needle.to_lowercase()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    CreateDrivers,
    DuplicateCarParking,
    DuplicateSlotParking,
    CloseAndVerifyParking,
}

impl Scenario {
    /// Every scenario in execution order
    pub const ALL: [Scenario; 4] = [
        Scenario::CreateDrivers,
        Scenario::DuplicateCarParking,
        Scenario::DuplicateSlotParking,
        Scenario::CloseAndVerifyParking,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::CreateDrivers => "create_drivers",
            Scenario::DuplicateCarParking => "duplicate_car_parking",
            Scenario::DuplicateSlotParking => "duplicate_slot_parking",
            Scenario::CloseAndVerifyParking => "close_and_verify_parking",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    pub async fn run(self, ctx: &mut SuiteContext, log: &mut ScenarioLog) -> E2eResult<()> {
        match self {
            Scenario::CreateDrivers => create_drivers(ctx, log).await,
            Scenario::DuplicateCarParking => duplicate_car_parking(ctx, log).await,
            Scenario::DuplicateSlotParking => duplicate_slot_parking(ctx, log).await,
            Scenario::CloseAndVerifyParking => close_and_verify_parking(ctx, log).await,
        }
    }
}

/// Admin creates both drivers; each must then appear exactly once in the listing
async fn create_drivers(ctx: &SuiteContext, log: &mut ScenarioLog) -> E2eResult<()> {
    let d1 = &ctx.config.driver1;
    let d2 = &ctx.config.driver2;
    log.step(format!(
        "Creating {} and {} and verifying uniqueness",
        d1.username, d2.username
    ));

    ctx.app.add_user(&ctx.admin, &d1.username, &d1.password).await?;
    ctx.app.add_user(&ctx.admin, &d2.username, &d2.password).await?;
    let users = ctx.app.fetch_users(&ctx.admin).await?;

    let d1_count = users.count(&d1.username);
    let d2_count = users.count(&d2.username);
    log.check(format!(
        "Expected each driver once. Actual: {}={}, {}={}",
        d1.username, d1_count, d2.username, d2_count
    ));

    ensure(d1_count == 1, || {
        format!("Expected {} count: 1, but got {}", d1.username, d1_count)
    })?;
    ensure(d2_count == 1, || {
        format!("Expected {} count: 1, but got {}", d2.username, d2_count)
    })
}

/// Driver 1 parks a car; driver 2 parking the same plate must be refused
async fn duplicate_car_parking(ctx: &mut SuiteContext, log: &mut ScenarioLog) -> E2eResult<()> {
    ctx.ensure_drivers().await?;
    let ctx = &*ctx;
    let (driver1, driver2) = ctx.drivers()?;
    let fixtures = &ctx.config.fixtures;
    let plate = fixtures.primary_plate.as_str();
    let slot = fixtures.slot.as_str();

    let d1_name = &ctx.config.driver1.username;
    let d2_name = &ctx.config.driver2.username;

    log.step(format!("{} parks car {} in slot {}", d1_name, plate, slot));
    let page = ctx
        .app
        .start_parking(driver1, plate, slot, &fixtures.vehicle_type_id)
        .await?;
    let success = ctx.app.notification(&page);
    log.check(format!(
        "Expected success message for {}. Got: '{}'",
        d1_name, success
    ));
    ensure(contains_any_ignore_case(&success, &["parking started"]), || {
        format!("Expected success message, got: '{}'", success)
    })?;

    log.step(format!(
        "{} tries to park same car {} again in slot {}",
        d2_name,
        plate,
        slot
    ));
    let page = ctx
        .app
        .start_parking(driver2, plate, slot, &fixtures.vehicle_type_id)
        .await?;
    let error = ctx.app.notification(&page);
    log.check(format!("Expected duplicate error. Got: '{}'", error));
    ensure(
        contains_any_ignore_case(&error, &["already parked", "duplicate"]),
        || format!("Expected duplicate parking error, but got: '{}'", error),
    )?;

    let active = ctx.app.active_sessions(&ctx.admin).await?;
    let open_for_plate = active.iter().filter(|s| s.mentions(plate)).count();
    log.check(format!(
        "Expected one active session for {}. Actual: {}",
        plate, open_for_plate
    ));
    ensure(open_for_plate == 1, || {
        format!(
            "Expected exactly 1 active session for {}, but found {}",
            plate, open_for_plate
        )
    })
}

/// Driver 2 parking a different car in the occupied slot must be refused
async fn duplicate_slot_parking(ctx: &mut SuiteContext, log: &mut ScenarioLog) -> E2eResult<()> {
    ctx.ensure_drivers().await?;
    let ctx = &*ctx;
    let (_, driver2) = ctx.drivers()?;
    let fixtures = &ctx.config.fixtures;

    log.step(format!(
        "{} tries to park car {} in already occupied slot {}",
        ctx.config.driver2.username,
        fixtures.secondary_plate,
        fixtures.slot
    ));
    let page = ctx
        .app
        .start_parking(
            driver2,
            &fixtures.secondary_plate,
            &fixtures.slot,
            &fixtures.vehicle_type_id,
        )
        .await?;
    let error = ctx.app.notification(&page);
    log.check(format!("Expected slot occupied error. Got: '{}'", error));
    ensure(
        contains_any_ignore_case(&error, &["slot is already occupied"]),
        || format!("Expected slot occupied error, but got: '{}'", error),
    )
}

/// Admin ends the parked car's session; it must move from the dashboard to history
async fn close_and_verify_parking(ctx: &SuiteContext, log: &mut ScenarioLog) -> E2eResult<()> {
    let fixtures = &ctx.config.fixtures;
    let plate = fixtures.primary_plate.as_str();
    let slot = fixtures.slot.as_str();

    log.step(format!("Closing session for car {} in slot {}", plate, slot));
    let active = ctx.app.active_sessions(&ctx.admin).await?;
    let target = active
        .iter()
        .find(|s| s.mentions(plate) && s.mentions(slot))
        .ok_or_else(|| E2eError::SessionNotFound {
            plate: plate.to_string(),
            slot: slot.to_string(),
        })?;
    log.check(format!("Found session_id={}", target.id));

    let page = ctx.app.end_parking(&ctx.admin, &target.id).await?;
    let message = ctx.app.notification(&page);
    log.check(format!("Expected session close success. Got: '{}'", message));
    ensure(contains_any_ignore_case(&message, &["parking ended"]), || {
        format!("Expected parking ended message, but got '{}'", message)
    })?;

    let dashboard = ctx.app.fetch_active_sessions(&ctx.admin).await?;
    ensure(!dashboard.contains(plate), || {
        format!("Car {} still shown in open sessions after closing", plate)
    })?;
    log.check(format!("Verified car {} not in open sessions", plate));

    let history = ctx.app.fetch_history(&ctx.admin).await?;
    ensure(history.contains(plate), || {
        format!("Car {} not found in history after closing", plate)
    })?;
    log.check(format!("Verified car {} found in parking history", plate));

    Ok(())
}
