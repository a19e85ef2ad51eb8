//! `teleop-kernel` – shared joint state and the rules that guard it.
//!
//! # Modules
//!
//! - [`channel`] – [`ActuatorChannel`][channel::ActuatorChannel]: one joint's
//!   configuration and its lock-free live state (goal angle, goal position,
//!   present position).
//! - [`limits`] – [`AngleLimits`][limits::AngleLimits]: the scaled angle
//!   interlock every goal angle is clamped into.
//! - [`stop`] – [`StopSignal`][stop::StopSignal]: the single cancellation
//!   flag handed to every task.

pub mod channel;
pub mod limits;
pub mod stop;

pub use channel::ActuatorChannel;
pub use limits::AngleLimits;
pub use stop::StopSignal;
