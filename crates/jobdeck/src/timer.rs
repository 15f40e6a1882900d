//! Time-tracking engine for worker and machine assignments.
//!
//! A timer accrues whole seconds additively, at the moment each session
//! closes (pause or end). The accrued total is never derived from
//! `end_time - actual_start_time` — that would count paused intervals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from timer operations. All are state conflicts — the caller
/// issued an operation the timer's current state does not permit.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    #[error("a timing session is already open")]
    AlreadyRunning,

    #[error("no timing session is open")]
    NotRunning,

    #[error("the assignment has already ended")]
    AlreadyEnded,
}

/// Timing state embedded in a worker or machine assignment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimerState {
    /// Open-session marker: non-null exactly while a session is running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// Set once by `end`; the assignment is closed afterwards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// First-ever start. Immutable once set, preserved across pauses
    /// and rework resets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_start_time: Option<DateTime<Utc>>,
    /// Whole seconds accrued across all closed sessions.
    #[serde(default)]
    pub actual_duration_secs: i64,
}

impl TimerState {
    pub fn is_running(&self) -> bool {
        self.start_time.is_some()
    }

    pub fn is_ended(&self) -> bool {
        self.end_time.is_some()
    }

    /// Opens a timing session.
    ///
    /// Fails when a session is already open or the assignment has ended.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), TimerError> {
        if self.end_time.is_some() {
            return Err(TimerError::AlreadyEnded);
        }
        if self.start_time.is_some() {
            return Err(TimerError::AlreadyRunning);
        }
        self.start_time = Some(now);
        if self.actual_start_time.is_none() {
            self.actual_start_time = Some(now);
        }
        Ok(())
    }

    /// Closes the open session without ending the assignment.
    ///
    /// Returns the seconds accrued by this session. The timer can be
    /// started again later.
    pub fn pause(&mut self, now: DateTime<Utc>) -> Result<i64, TimerError> {
        let started = self.start_time.ok_or(TimerError::NotRunning)?;
        let elapsed = session_seconds(started, now);
        self.actual_duration_secs += elapsed;
        self.start_time = None;
        Ok(elapsed)
    }

    /// Closes the open session and ends the assignment.
    ///
    /// Not idempotent and not resumable: ending twice fails, as does
    /// ending with no open session.
    pub fn end(&mut self, now: DateTime<Utc>) -> Result<i64, TimerError> {
        if self.end_time.is_some() {
            return Err(TimerError::AlreadyEnded);
        }
        let started = self.start_time.ok_or(TimerError::NotRunning)?;
        let elapsed = session_seconds(started, now);
        self.actual_duration_secs += elapsed;
        self.start_time = None;
        self.end_time = Some(now);
        Ok(elapsed)
    }

    /// Re-opens the assignment after a quality rollback.
    ///
    /// Clears the session markers so work can be re-executed; accrued
    /// duration and the first-ever start are preserved.
    pub fn reset_for_rework(&mut self) {
        self.start_time = None;
        self.end_time = None;
    }
}

/// Elapsed whole seconds of one session, clamped at zero against clock skew.
fn session_seconds(started: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - started).num_seconds().max(0)
}
