//! Play sessions: contiguous airings of one track on one station.
//!
//! - [`PlaySessionTracker`] merges detection events into sessions
//! - [`SessionRecorder`] persists the changes and feeds the stats sink
//! - [`format_duration`] / [`parse_duration`] for display

pub mod duration;
pub mod recorder;
pub mod tracker;

pub use duration::{format_duration, parse_duration};
pub use recorder::SessionRecorder;
pub use tracker::{OverlapAnomaly, PlaySession, PlaySessionTracker, SessionState, SessionUpdate};
