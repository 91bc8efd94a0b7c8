//! # Testing / Arming Session
//!
//! Drives a remote device into testing mode, where trigger commands can fire
//! pyro or release events, and takes it back out.
//!
//! ```text
//!  Idle ──begin──> ReadyToArm ──start──> AwaitingArmConfirmation ──N armed reports──> Armed
//!   │                                         │ deadline                               │ disarmed / silent
//!   └──begin (stale)──> LinkNotReady          └──────────────> Failed <────────────────┘
//!
//!  exit: any state ──> Idle
//! ```
//!
//! The session borrows the link sessions it acts on for each call and keeps
//! no global state, so a new session always starts clean.

use tracing::{debug, info, warn};

use super::session::{LinkSession, RemoteReport};
use crate::error::{GroundLinkError, Result};

/// Time limits and debounce of the arming protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmingTiming {
    /// Maximum age of remote data for the link to count as ready
    pub freshness_ms: u64,

    /// Maximum age of a data update for it to count as a confirmation
    pub sample_freshness_ms: u64,

    /// Consecutive armed reports needed to enter `Armed`
    pub arm_debounce: u32,

    /// Time allowed for arm confirmation after entering testing
    pub arm_timeout_ms: u64,

    /// Maximum silence from the remote while armed; exceeding it fails the session
    pub armed_liveness_ms: u64,
}

impl Default for ArmingTiming {
    fn default() -> Self {
        Self {
            freshness_ms: 1000,
            sample_freshness_ms: 200,
            arm_debounce: 6,
            arm_timeout_ms: 10_000,
            armed_liveness_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmingState {
    Idle,
    LinkNotReady,
    ReadyToArm,
    AwaitingArmConfirmation,
    Armed,
    Failed,
}

/// Why an arming session ended in `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmingFailure {
    /// Not enough armed reports before the deadline
    ConfirmationTimeout,
    /// Remote reported a non-armed state while armed
    RemoteDisarmed,
    /// No data from the remote within the liveness window while armed
    LinkLost,
}

/// One arming attempt on a primary link
#[derive(Debug)]
pub struct ArmingSession {
    timing: ArmingTiming,
    state: ArmingState,
    arm_deadline: Option<u64>,
    confirmations: u32,
    seen_sequence: u64,
    testing_requested: bool,
    secondary_suppressed: bool,
    failure: Option<ArmingFailure>,
}

impl ArmingSession {
    pub fn new(timing: ArmingTiming) -> Self {
        Self {
            timing,
            state: ArmingState::Idle,
            arm_deadline: None,
            confirmations: 0,
            seen_sequence: 0,
            testing_requested: false,
            secondary_suppressed: false,
            failure: None,
        }
    }

    /// Check whether the remote is reachable
    ///
    /// Moves to `ReadyToArm` if the primary link received remote data within
    /// `freshness_ms`, otherwise to `LinkNotReady`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` unless the session is `Idle` or `LinkNotReady`
    pub fn begin(&mut self, now_ms: u64, primary: &LinkSession) -> Result<ArmingState> {
        if !matches!(self.state, ArmingState::Idle | ArmingState::LinkNotReady) {
            return Err(self.invalid("begin"));
        }

        let fresh = primary.telemetry().data.is_fresh(now_ms, self.timing.freshness_ms);
        self.state = if fresh {
            ArmingState::ReadyToArm
        } else {
            ArmingState::LinkNotReady
        };

        debug!("[{}] Arming check: {:?}", primary.name(), self.state);
        Ok(self.state)
    }

    /// Request testing mode on the primary link
    ///
    /// The secondary link, if given, is disabled for the duration of testing.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` unless the session is `ReadyToArm`
    pub fn start(
        &mut self,
        now_ms: u64,
        primary: &mut LinkSession,
        secondary: Option<&mut LinkSession>,
    ) -> Result<()> {
        if self.state != ArmingState::ReadyToArm {
            return Err(self.invalid("start"));
        }

        if let Some(secondary) = secondary {
            secondary.disable();
            self.secondary_suppressed = true;
        }

        primary.enter_testing(now_ms);
        self.testing_requested = true;
        self.confirmations = 0;
        self.seen_sequence = primary.telemetry().data.sequence();
        self.arm_deadline = Some(now_ms + self.timing.arm_timeout_ms);
        self.state = ArmingState::AwaitingArmConfirmation;

        info!("[{}] Waiting for arm confirmation", primary.name());
        Ok(())
    }

    /// Evaluate new remote data and deadlines; call once per tick
    ///
    /// Every remote report received since the last call is evaluated in
    /// arrival order, so a non-armed report followed by an armed one within a
    /// single tick still resets the debounce or fails an armed session.
    pub fn update(&mut self, now_ms: u64, primary: &mut LinkSession) -> ArmingState {
        if self.state == ArmingState::AwaitingArmConfirmation
            && self.arm_deadline.map_or(false, |deadline| now_ms >= deadline)
        {
            warn!(
                "[{}] Arm confirmation timed out ({} of {} confirmations)",
                primary.name(),
                self.confirmations,
                self.timing.arm_debounce
            );
            primary.disable();
            self.confirmations = 0;
            self.fail(ArmingFailure::ConfirmationTimeout);
            return self.state;
        }

        if !matches!(self.state, ArmingState::AwaitingArmConfirmation | ArmingState::Armed) {
            return self.state;
        }

        let reports: Vec<RemoteReport> = primary.reports_since(self.seen_sequence).copied().collect();
        for report in reports {
            self.seen_sequence = report.sequence;

            match self.state {
                ArmingState::AwaitingArmConfirmation => self.confirm(now_ms, &report, primary.name()),
                ArmingState::Armed if !report.is_testing_armed() => {
                    self.lose(now_ms, primary, ArmingFailure::RemoteDisarmed);
                    return self.state;
                }
                _ => {}
            }
        }

        if self.state == ArmingState::Armed {
            let silent = primary
                .telemetry()
                .data
                .age(now_ms)
                .map_or(true, |age| age > self.timing.armed_liveness_ms);
            if silent {
                self.lose(now_ms, primary, ArmingFailure::LinkLost);
            }
        }

        self.state
    }

    /// Leave the session from any state
    ///
    /// If testing was requested, the primary is disarmed and its mode restored;
    /// a suppressed secondary link is re-enabled. Calling this again, or from
    /// `Idle`, sends nothing.
    pub fn exit(
        &mut self,
        now_ms: u64,
        primary: &mut LinkSession,
        secondary: Option<&mut LinkSession>,
    ) {
        if self.testing_requested {
            self.testing_requested = false;
            primary.exit_testing(now_ms);
        }

        if self.secondary_suppressed {
            self.secondary_suppressed = false;
            if let Some(secondary) = secondary {
                secondary.enable();
            }
        }

        if self.state != ArmingState::Idle {
            debug!("[{}] Arming session closed from {:?}", primary.name(), self.state);
        }
        self.state = ArmingState::Idle;
        self.arm_deadline = None;
        self.confirmations = 0;
        self.failure = None;
    }

    /// Fire `event` on the remote; only allowed while `Armed`
    ///
    /// The link sends a neutral frame on its own after the release delay.
    pub fn trigger(&mut self, event: u8, now_ms: u64, primary: &mut LinkSession) -> Result<()> {
        if self.state != ArmingState::Armed {
            return Err(self.invalid("trigger"));
        }
        primary.trigger_event(event, now_ms)
    }

    fn confirm(&mut self, now_ms: u64, report: &RemoteReport, name: &str) {
        let fresh = now_ms.saturating_sub(report.received_ms) < self.timing.sample_freshness_ms;
        if fresh && report.is_testing_armed() {
            self.confirmations += 1;
        } else {
            self.confirmations = 0;
        }

        if self.confirmations >= self.timing.arm_debounce {
            self.state = ArmingState::Armed;
            self.arm_deadline = None;
            info!("[{}] Remote armed", name);
        }
    }

    fn lose(&mut self, now_ms: u64, primary: &mut LinkSession, failure: ArmingFailure) {
        warn!("[{}] Armed session lost: {:?}", primary.name(), failure);
        self.fail(failure);
        self.testing_requested = false;
        primary.exit_testing(now_ms);
    }

    fn fail(&mut self, failure: ArmingFailure) {
        self.state = ArmingState::Failed;
        self.failure = Some(failure);
    }

    fn invalid(&self, action: &str) -> GroundLinkError {
        GroundLinkError::InvalidState(format!("cannot {} while {:?}", action, self.state))
    }

    pub fn state(&self) -> ArmingState {
        self.state
    }

    pub fn is_armed(&self) -> bool {
        self.state == ArmingState::Armed
    }

    /// Consecutive armed reports seen while awaiting confirmation
    pub fn consecutive_confirmations(&self) -> u32 {
        self.confirmations
    }

    pub fn failure(&self) -> Option<ArmingFailure> {
        self.failure
    }

    pub fn arm_deadline(&self) -> Option<u64> {
        self.arm_deadline
    }
}

impl Default for ArmingSession {
    fn default() -> Self {
        Self::new(ArmingTiming::default())
    }
}
