//! # Link Module
//!
//! Sessions with the radio module and the remote device behind it.
//!
//! - [`session`]: configuration push, link lifecycle, telemetry intake and
//!   the timed testing commands of one radio module
//! - [`arming`]: the testing/arming protocol driven on top of a primary link

pub mod arming;
pub mod session;

pub use arming::{ArmingFailure, ArmingSession, ArmingState, ArmingTiming};
pub use session::{LinkConfig, LinkSession, LinkState, LinkTiming, Phrase};
