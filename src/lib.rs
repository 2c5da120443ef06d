#![cfg_attr(not(test), no_std)]

//! Attitude regulation core for a small flapping/fixed-wing flyer.
//!
//! Each control tick turns the estimated orientation and the commanded
//! reference orientation into thrust, steer and elevator commands, and records
//! a snapshot of the decision into a small telemetry pool that a slower task
//! drains.

// Must stay first so the logging macros are visible to every module below.
#[macro_use]
mod fmt;

pub mod drivers;
pub mod math;
pub mod regulator;
pub mod state;

pub use math::quat::Quaternion;
pub use regulator::{Axis, Mode, Regulator};
