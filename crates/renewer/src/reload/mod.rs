//! Runtime configuration reload.
//!
//! Reloads come from two sources: SIGHUP ([`signals`]) and file changes
//! picked up by [`autossl_config::ConfigWatcher`]. Either way the new
//! configuration lands in the shared [`autossl_config::ConfigStore`] and
//! takes effect at the start of the next cycle.

pub mod signals;

pub use signals::{SignalManager, SignalType};
