//! Ending leftover parking sessions around a suite run

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{info, warn};

use crate::client::{ParkingApp, Session};
use crate::config::CleanupPolicy;
use crate::error::E2eResult;

/// What a cleanup run did
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Dashboard scans performed
    pub passes: u32,
    /// Session ids an end request was sent for, in order
    pub ended: Vec<String>,
    /// Session ids still offering an end form when cleanup gave up
    pub remaining: Vec<String>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.remaining.is_empty()
    }
}

/// End every session the dashboard offers an end form for.
///
/// Each pass scans the dashboard once and ends every listed session with a
/// freshly fetched token. Passes repeat while rows remain, up to
/// `policy.max_passes`, and stop early when a pass sees exactly the same ids
/// as the one before it. Leftovers are reported, not treated as errors.
pub async fn close_all_sessions(
    app: &ParkingApp,
    session: &Session,
    policy: &CleanupPolicy,
) -> E2eResult<CleanupReport> {
    let mut report = CleanupReport::default();
    let mut previous: Option<BTreeSet<String>> = None;

    loop {
        let active = app.active_sessions(session).await?;
        let ids: BTreeSet<String> = active.iter().map(|s| s.id.clone()).collect();

        if ids.is_empty() {
            break;
        }

        if report.passes >= policy.max_passes || previous.as_ref() == Some(&ids) {
            report.remaining = active.into_iter().map(|s| s.id).collect();
            warn!(
                "Cleanup left {} active session(s) after {} pass(es): {:?}",
                report.remaining.len(),
                report.passes,
                report.remaining
            );
            break;
        }

        report.passes += 1;
        for entry in &active {
            let page = app.end_parking(session, &entry.id).await?;
            if !page.is_success() {
                warn!("Ending session {} returned status {}", entry.id, page.status);
            }
            report.ended.push(entry.id.clone());
        }
        previous = Some(ids);
    }

    info!(
        "Cleanup ended {} session(s) in {} pass(es)",
        report.ended.len(),
        report.passes
    );
    Ok(report)
}
