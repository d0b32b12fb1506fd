//! # Liveness State Machine
//!
//! Pure transition logic for a pony's status. Heartbeats move any pony to `normal`;
//! the sweep moves silent `normal` ponies to `missing`. Nothing here touches storage or
//! sends notifications: callers persist the mutated model and act on the returned
//! [`Transition`], which only exists when the status value actually changed.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::models::PonyStatus;
use crate::models::pony::{Model as PonyModel, UnknownStatus};

/// Errors raised by invalid transition requests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LivenessError {
    #[error(transparent)]
    UnknownStatus(#[from] UnknownStatus),
    #[error("cannot mark pony missing from status '{current}'")]
    NotNormal { current: PonyStatus },
}

/// An observed status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub previous: PonyStatus,
    pub current: PonyStatus,
    pub at: DateTime<Utc>,
}

/// Apply a heartbeat at `now`.
///
/// Always refreshes `last_hi_time` and sets the status to `normal`. Returns `None` for a
/// repeated heartbeat on an already-normal pony.
pub fn heartbeat(
    pony: &mut PonyModel,
    now: DateTime<Utc>,
) -> Result<Option<Transition>, LivenessError> {
    let previous = pony.liveness()?;

    pony.last_hi_time = Some(now.fixed_offset());
    pony.status = PonyStatus::Normal.as_str().to_string();

    Ok(changed(previous, PonyStatus::Normal, now))
}

/// Move a `normal` pony to `missing`.
///
/// The silence check is the caller's job (see [`is_overdue`]); this only enforces that
/// the pony is currently `normal`.
pub fn mark_missing(pony: &mut PonyModel, now: DateTime<Utc>) -> Result<Transition, LivenessError> {
    let previous = pony.liveness()?;
    if previous != PonyStatus::Normal {
        return Err(LivenessError::NotNormal { current: previous });
    }

    pony.status = PonyStatus::Missing.as_str().to_string();

    Ok(Transition {
        previous,
        current: PonyStatus::Missing,
        at: now,
    })
}

/// Whether a pony last heard from at `last_hi_time` has exceeded `dark_minute + grace`.
///
/// Strict comparison: silence exactly equal to the tolerance is not overdue.
pub fn is_overdue(
    last_hi_time: DateTime<Utc>,
    dark_minute: i32,
    grace_minutes: u32,
    now: DateTime<Utc>,
) -> bool {
    let tolerance = Duration::minutes(i64::from(dark_minute) + i64::from(grace_minutes));
    now - last_hi_time > tolerance
}

fn changed(previous: PonyStatus, current: PonyStatus, at: DateTime<Utc>) -> Option<Transition> {
    (previous != current).then_some(Transition {
        previous,
        current,
        at,
    })
}
