//! # Link Session
//!
//! Owns one radio module: its configuration, the inbound frame decoder, the
//! telemetry store, and the outbound command queue.
//!
//! ## Configuration push
//!
//! Setters only mark the configuration dirty. The next [`LinkSession::tick`]
//! that finds no push in progress starts one, sending one command per
//! `step_delay_ms`:
//!
//! ```text
//! [DISABLE] -> DIRECTION -> MODE -> PA_GAIN -> [LINK_PHRASE -> ENABLE]
//! ```
//!
//! `DISABLE` is only sent when the link was up. Without a link phrase the push
//! stops after `PA_GAIN` and the link stays down. Setter calls during a push are
//! coalesced into one follow-up push.
//!
//! ## Timing
//!
//! Nothing here sleeps. Delays are deadlines compared against the `now_ms`
//! passed to `tick`; frames requested between ticks are written on the next
//! tick.

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use crate::error::{GroundLinkError, Result};
use crate::serial::LinkTransport;
use crate::telemetry::{RecordKind, TelemetryStore};
use crate::wire::crc::crc32;
use crate::wire::decoder::{DecoderStats, FrameDecoder};
use crate::wire::encoder::*;
use crate::wire::protocol::*;

/// Phrase length on the wire (zero padded)
pub const PHRASE_LEN: usize = 8;

/// Fixed-size, zero-padded pass phrase
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Phrase([u8; PHRASE_LEN]);

impl Phrase {
    /// Build a phrase from text
    ///
    /// # Errors
    ///
    /// Returns error if the phrase is longer than 8 bytes
    pub fn new(text: &str) -> Result<Self> {
        Self::from_bytes(text.as_bytes())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > PHRASE_LEN {
            return Err(GroundLinkError::Config(format!(
                "phrase is {} bytes, maximum is {}",
                bytes.len(),
                PHRASE_LEN
            )));
        }

        let mut phrase = [0u8; PHRASE_LEN];
        phrase[..bytes.len()].copy_from_slice(bytes);
        Ok(Self(phrase))
    }

    /// An empty phrase disables whatever it gates
    pub fn is_empty(&self) -> bool {
        self.0[0] == 0
    }

    /// CRC32 over all 8 bytes, padding included
    pub fn crc32(&self) -> u32 {
        crc32(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8; PHRASE_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for Phrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the phrase itself
        if self.is_empty() {
            f.write_str("Phrase(<empty>)")
        } else {
            f.write_str("Phrase(<set>)")
        }
    }
}

/// Settings pushed to the radio module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkConfig {
    pub direction: Direction,
    pub mode: Mode,
    pub tx_power: u8,
    pub link_phrase: Phrase,
    pub testing_phrase: Phrase,
}

/// Delays used by the session, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTiming {
    /// Pause between configuration commands
    pub step_delay_ms: u64,

    /// Pause between entering testing and switching to bidirectional mode
    pub settle_ms: u64,

    /// Pause between the disarm frame and restoring the normal mode
    pub mode_revert_ms: u64,

    /// Time after a trigger before the neutral frame is sent
    pub trigger_release_ms: u64,
}

impl Default for LinkTiming {
    fn default() -> Self {
        Self {
            step_delay_ms: 100,
            settle_ms: 50,
            mode_revert_ms: 1000,
            trigger_release_ms: 1000,
        }
    }
}

/// Link lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No configuration pushed yet
    Uninitialized,
    /// Configuration pushed (or in progress) but the link is not enabled
    Configuring,
    /// Link phrase sent and link enabled
    Linked,
}

/// One command of a configuration push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PushStep {
    Disable,
    Direction(Direction),
    Mode(Mode),
    PaGain(u8),
    LinkPhrase(u32),
    Enable,
}

impl PushStep {
    fn encode(&self) -> Vec<u8> {
        match *self {
            PushStep::Disable => encode_disable(),
            PushStep::Direction(dir) => encode_setting(CMD_DIRECTION, dir as u8),
            PushStep::Mode(mode) => encode_setting(CMD_MODE, mode as u8),
            PushStep::PaGain(gain) => encode_setting(CMD_PA_GAIN, gain),
            PushStep::LinkPhrase(crc) => encode_link_phrase_crc(crc),
            PushStep::Enable => encode_enable(),
        }
    }
}

/// Remote state carried by one applied `CMD_RX` frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteReport {
    /// Sequence number of the data record after this frame was applied
    pub sequence: u64,
    /// Local time the frame was drained
    pub received_ms: u64,
    pub state: u8,
}

impl RemoteReport {
    pub fn is_testing_armed(&self) -> bool {
        self.state == REMOTE_STATE_TESTING_ARMED
    }
}

/// Remote reports kept for readers that must see every one, not just the latest
pub const REPORT_HISTORY: usize = 128;

#[derive(Debug)]
struct ConfigPush {
    steps: VecDeque<PushStep>,
    next_at: u64,
}

/// Session with one radio module
#[derive(Debug)]
pub struct LinkSession {
    name: String,
    config: LinkConfig,
    timing: LinkTiming,
    state: LinkState,
    dirty: bool,
    push: Option<ConfigPush>,
    last_step_at: Option<u64>,
    testing_passcode: Option<u32>,
    testing_active: bool,
    normal_mode: Mode,
    pending_mode: Option<(u64, Mode)>,
    pending_release: Option<u64>,
    decoder: FrameDecoder,
    telemetry: TelemetryStore,
    reports: VecDeque<RemoteReport>,
    outbox: VecDeque<Vec<u8>>,
    frames_sent: u64,
}

impl LinkSession {
    /// Create a session; nothing is sent until the configuration is marked dirty
    pub fn new(name: impl Into<String>, config: LinkConfig, timing: LinkTiming) -> Self {
        let testing_passcode = passcode_for(&config.testing_phrase);

        Self {
            name: name.into(),
            config,
            timing,
            state: LinkState::Uninitialized,
            dirty: false,
            push: None,
            last_step_at: None,
            testing_passcode,
            testing_active: false,
            normal_mode: config.mode,
            pending_mode: None,
            pending_release: None,
            decoder: FrameDecoder::new(),
            telemetry: TelemetryStore::new(),
            reports: VecDeque::with_capacity(REPORT_HISTORY),
            outbox: VecDeque::new(),
            frames_sent: 0,
        }
    }

    pub fn set_direction(&mut self, direction: Direction) {
        if self.config.direction != direction {
            self.config.direction = direction;
            self.dirty = true;
        }
    }

    pub fn set_mode(&mut self, mode: Mode) {
        if self.config.mode != mode {
            self.config.mode = mode;
            self.dirty = true;
        }
    }

    pub fn set_tx_power(&mut self, tx_power: u8) {
        if self.config.tx_power != tx_power {
            self.config.tx_power = tx_power;
            self.dirty = true;
        }
    }

    /// Set the link phrase; an empty phrase keeps the link disabled
    pub fn set_link_phrase(&mut self, phrase: &str) -> Result<()> {
        self.config.link_phrase = Phrase::new(phrase)?;
        self.dirty = true;
        Ok(())
    }

    /// Set the testing phrase and derive the arming passcode from it
    pub fn set_testing_phrase(&mut self, phrase: &str) -> Result<()> {
        self.config.testing_phrase = Phrase::new(phrase)?;
        self.testing_passcode = passcode_for(&self.config.testing_phrase);
        self.dirty = true;
        Ok(())
    }

    /// Push the current configuration on the next tick
    pub fn request_configuration(&mut self) {
        self.dirty = true;
    }

    /// Enable the radio link now
    pub fn enable(&mut self) {
        self.emit(encode_enable());
        if !self.config.link_phrase.is_empty() {
            self.state = LinkState::Linked;
        }
        debug!("[{}] Link enable requested", self.name);
    }

    /// Disable the radio link now
    pub fn disable(&mut self) {
        self.emit(encode_disable());
        if self.state == LinkState::Linked {
            self.state = LinkState::Configuring;
        }
        debug!("[{}] Link disable requested", self.name);
    }

    /// Ask the remote to enter testing mode
    ///
    /// Sends the testing message with pyros enabled and switches the link to
    /// bidirectional mode after `settle_ms`. Ignored if testing is already active.
    pub fn enter_testing(&mut self, now_ms: u64) {
        if self.testing_active {
            debug!("[{}] Testing already active", self.name);
            return;
        }
        if self.testing_passcode.is_none() {
            warn!("[{}] Entering testing without a testing phrase", self.name);
        }

        self.testing_active = true;
        self.normal_mode = self.config.mode;
        self.emit_testing_message(true, 0);
        self.pending_mode = Some((now_ms + self.timing.settle_ms, Mode::Bidirectional));
        info!("[{}] Testing mode requested", self.name);
    }

    /// Disarm the remote and restore the normal mode after `mode_revert_ms`
    ///
    /// # Returns
    ///
    /// * `bool` - `false` if testing was not active (nothing sent)
    pub fn exit_testing(&mut self, now_ms: u64) -> bool {
        if !self.testing_active {
            return false;
        }

        self.testing_active = false;
        self.pending_release = None;
        self.emit_testing_message(false, 0);
        self.pending_mode = Some((now_ms + self.timing.mode_revert_ms, self.normal_mode));
        info!("[{}] Testing mode exit requested", self.name);
        true
    }

    /// Send a trigger for `event`, followed by a neutral frame after
    /// `trigger_release_ms`
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if testing mode is not active
    pub fn trigger_event(&mut self, event: u8, now_ms: u64) -> Result<()> {
        if !self.testing_active {
            return Err(GroundLinkError::InvalidState(format!(
                "[{}] cannot trigger event {} outside testing mode",
                self.name, event
            )));
        }

        self.emit_testing_message(true, event);
        self.pending_release = Some(now_ms + self.timing.trigger_release_ms);
        info!("[{}] Triggered event {}", self.name, event);
        Ok(())
    }

    /// Run pending work and drain received bytes
    ///
    /// # Errors
    ///
    /// Returns error if the transport rejects a frame; unsent frames stay
    /// queued for the next tick.
    pub fn tick<T: LinkTransport>(&mut self, now_ms: u64, io: &mut T) -> Result<()> {
        if self.push.is_none() && self.dirty {
            self.start_push(now_ms);
        }
        self.advance_push(now_ms);

        if let Some((at, mode)) = self.pending_mode {
            if now_ms >= at {
                self.pending_mode = None;
                debug!("[{}] Switching mode to {:?}", self.name, mode);
                self.set_mode(mode);
            }
        }

        if let Some(at) = self.pending_release {
            if now_ms >= at {
                self.pending_release = None;
                self.emit_testing_message(true, 0);
            }
        }

        self.drain_input(now_ms, io);
        self.flush(io)
    }

    /// Write queued frames to the transport
    pub fn flush<T: LinkTransport>(&mut self, io: &mut T) -> Result<()> {
        while let Some(frame) = self.outbox.front() {
            io.write_frame(frame)?;
            self.outbox.pop_front();
            self.frames_sent += 1;
        }
        Ok(())
    }

    fn start_push(&mut self, now_ms: u64) {
        self.dirty = false;

        let mut steps = VecDeque::new();
        if self.state == LinkState::Linked {
            steps.push_back(PushStep::Disable);
        }
        steps.push_back(PushStep::Direction(self.config.direction));
        steps.push_back(PushStep::Mode(self.config.mode));
        steps.push_back(PushStep::PaGain(self.config.tx_power));
        if !self.config.link_phrase.is_empty() {
            steps.push_back(PushStep::LinkPhrase(self.config.link_phrase.crc32()));
            steps.push_back(PushStep::Enable);
        }

        // Pacing carries over from the previous push
        let next_at = self
            .last_step_at
            .map_or(now_ms, |last| now_ms.max(last + self.timing.step_delay_ms));

        debug!("[{}] Pushing configuration ({} steps)", self.name, steps.len());
        self.state = LinkState::Configuring;
        self.push = Some(ConfigPush { steps, next_at });
    }

    fn advance_push(&mut self, now_ms: u64) {
        let Some(push) = self.push.as_mut() else {
            return;
        };
        if now_ms < push.next_at {
            return;
        }

        let step = push.steps.pop_front();
        push.next_at = now_ms + self.timing.step_delay_ms;
        let done = push.steps.is_empty();
        self.last_step_at = Some(now_ms);

        if let Some(step) = step {
            self.emit(step.encode());
            if step == PushStep::Enable {
                self.state = LinkState::Linked;
                info!("[{}] Link enabled", self.name);
            }
        }

        if done {
            self.push = None;
            if self.state != LinkState::Linked {
                info!("[{}] Configuration pushed, link disabled (no link phrase)", self.name);
            }
        }
    }

    fn drain_input<T: LinkTransport>(&mut self, now_ms: u64, io: &mut T) {
        let before = self.decoder.stats();

        while let Some(byte) = io.read_byte() {
            if let Some(frame) = self.decoder.process_byte(byte) {
                if self.telemetry.apply(&frame, now_ms) == Some(RecordKind::Data) {
                    self.record_report(now_ms);
                }
            }
        }

        let after = self.decoder.stats();
        let dropped = (after.checksum_errors - before.checksum_errors)
            + (after.length_errors - before.length_errors);
        if dropped > 0 {
            debug!("[{}] Dropped {} corrupt frame(s)", self.name, dropped);
        }
    }

    fn record_report(&mut self, now_ms: u64) {
        if self.reports.len() == REPORT_HISTORY {
            self.reports.pop_front();
        }
        let data = &self.telemetry.data;
        self.reports.push_back(RemoteReport {
            sequence: data.sequence(),
            received_ms: now_ms,
            state: data.value().state,
        });
    }

    fn emit_testing_message(&mut self, enable_pyros: bool, event: u8) {
        let msg = TestingMessage {
            passcode: self.testing_passcode.unwrap_or(0),
            enable_pyros,
            event,
        };
        self.emit(encode_testing_message(&msg));
    }

    fn emit(&mut self, frame: Vec<u8>) {
        self.outbox.push_back(frame);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// A configuration change is waiting for the next push
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// A configuration push is being sent
    pub fn is_configuring(&self) -> bool {
        self.push.is_some()
    }

    pub fn is_testing(&self) -> bool {
        self.testing_active
    }

    /// Passcode derived from the testing phrase, `None` if no phrase is set
    pub fn testing_passcode(&self) -> Option<u32> {
        self.testing_passcode
    }

    pub fn telemetry(&self) -> &TelemetryStore {
        &self.telemetry
    }

    /// Remote reports applied after data sequence `sequence`, oldest first
    ///
    /// Only the last [`REPORT_HISTORY`] reports are kept.
    pub fn reports_since(&self, sequence: u64) -> impl Iterator<Item = &RemoteReport> + '_ {
        self.reports.iter().filter(move |r| r.sequence > sequence)
    }

    /// Clear the updated flag of one record
    pub fn acknowledge(&mut self, kind: RecordKind) {
        self.telemetry.acknowledge(kind);
    }

    pub fn decoder_stats(&self) -> DecoderStats {
        self.decoder.stats()
    }

    /// Frames written to the transport so far
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }
}

fn passcode_for(phrase: &Phrase) -> Option<u32> {
    if phrase.is_empty() {
        None
    } else {
        Some(phrase.crc32())
    }
}
