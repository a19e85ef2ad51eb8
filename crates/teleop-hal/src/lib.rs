//! `teleop-hal` – actuator bus abstraction and drivers.
//!
//! # Modules
//!
//! - [`actuator`] – [`ActuatorLink`][actuator::ActuatorLink]: the
//!   register-level contract (torque, velocity, goal position, present
//!   position) the control loop is written against.
//! - [`protocol`] – Dynamixel Protocol 1.0 packet framing and status
//!   decoding.
//! - [`serial`] – [`DynamixelLink`][serial::DynamixelLink]: the protocol
//!   spoken over a `serialport` device.
//! - [`sim`] – [`SimLink`][sim::SimLink]: an in-process bus for running the
//!   stack and its tests without hardware.
//! - [`units`] – linear range mapping and control-unit/degree conversion.

pub mod actuator;
pub mod protocol;
pub mod serial;
pub mod sim;
pub mod units;

pub use actuator::ActuatorLink;
pub use serial::DynamixelLink;
pub use sim::{SimHandle, SimLink};
