//! Lister - automated listing submission for multi-step posting wizards
//!
//! The engine drives one wizard step per page load: it observes the
//! rendered page through snapshots, derives the current phase, performs
//! that phase's actions through an [`sink::ActionSink`], and persists
//! enough state to re-enter cleanly after the navigation that follows.

pub mod channel;
pub mod config;
pub mod handlers;
pub mod logging;
pub mod page;
pub mod progress;
pub mod sink;
pub mod state;
pub mod workflow;
