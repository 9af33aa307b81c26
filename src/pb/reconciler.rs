//! Personal-best reconciliation.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::store::{LapStore, PbCandidate, PbTransaction, SessionId};
use crate::{LapTime, Result};

/// Result of reconciling one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PbOutcome {
    pub is_new_pb: bool,
    /// The record that was beaten; `None` for a first personal best.
    pub previous_time: Option<LapTime>,
    /// `previous_time - new time`.
    pub improvement: Option<LapTime>,
    /// Lap that now holds the personal best, when it changed.
    pub lap_number: Option<u32>,
}

impl PbOutcome {
    pub fn unchanged() -> Self {
        Self::default()
    }
}

/// Compare a session's best lap with every other session for the same
/// driver, track and car, and move the personal-best flag if it was beaten.
///
/// Sessions without a track or car are skipped. Running this again for the
/// same session without new competing laps changes nothing and reports no
/// new personal best.
pub fn reconcile<S: LapStore + ?Sized>(store: &S, session: SessionId) -> Result<PbOutcome> {
    let record = store.session(session)?;
    let Some(key) = record.pb_key() else {
        debug!(session, "Session missing track or car information, skipping PB check");
        return Ok(PbOutcome::unchanged());
    };

    let mut outcome = PbOutcome::unchanged();
    store.transact_personal_best(&key, &mut |tx| {
        outcome = decide(tx, session);
        Ok(())
    })?;

    if outcome.is_new_pb {
        match (outcome.previous_time, outcome.improvement) {
            (Some(previous), Some(improvement)) => info!(
                session,
                key = %key,
                %previous,
                %improvement,
                "New personal best"
            ),
            _ => info!(session, key = %key, "First personal best"),
        }
    }
    Ok(outcome)
}

fn fastest(laps: impl Iterator<Item = PbCandidate>) -> Option<PbCandidate> {
    laps.filter(PbCandidate::is_eligible).min_by_key(|l| (l.lap_time, l.session, l.lap_number))
}

fn decide(tx: &mut PbTransaction, session: SessionId) -> PbOutcome {
    let Some(best) = fastest(tx.laps().filter(|l| l.session == session)) else {
        debug!(session, "No valid laps found in session");
        restore_holder(tx);
        return PbOutcome::unchanged();
    };
    let prior = fastest(tx.laps().filter(|l| l.session != session));

    let previous_time = match prior {
        None => None,
        Some(prior) if best.lap_time < prior.lap_time => Some(prior.lap_time),
        Some(prior) => {
            debug!(
                session,
                best = %best.lap_time,
                record = %prior.lap_time,
                "Session best is not faster than the record"
            );
            restore_holder(tx);
            return PbOutcome::unchanged();
        }
    };

    // One flag per key: clear every other holder, including stale ones.
    let holders: Vec<PbCandidate> = tx.laps().filter(|l| l.is_personal_best).collect();
    for lap in holders {
        if (lap.session, lap.lap_number) != (best.session, best.lap_number) {
            tx.set_personal_best(lap.session, lap.lap_number, false);
        }
    }
    tx.set_personal_best(best.session, best.lap_number, true);

    if !tx.has_changes() {
        return PbOutcome::unchanged();
    }
    PbOutcome {
        is_new_pb: true,
        previous_time,
        improvement: previous_time.map(|previous| previous - best.lap_time),
        lap_number: Some(best.lap_number),
    }
}

/// Re-processing the holder's session clears its flag. Hand it to the
/// fastest remaining lap so the key keeps exactly one holder.
fn restore_holder(tx: &mut PbTransaction) {
    if tx.laps().any(|l| l.is_personal_best) {
        return;
    }
    if let Some(lap) = fastest(tx.laps()) {
        debug!(session = lap.session, lap = lap.lap_number, time = %lap.lap_time, "Restoring personal best");
        tx.set_personal_best(lap.session, lap.lap_number, true);
    }
}
