use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Highest value accepted by the position and velocity registers of the
/// supported actuators (10-bit control-input units).
pub const REGISTER_MAX: u16 = 1023;

/// The two independently controlled joints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Joint {
    Steering,
    Yawing,
}

impl Joint {
    pub const ALL: [Joint; 2] = [Joint::Steering, Joint::Yawing];

    pub fn name(&self) -> &'static str {
        match self {
            Joint::Steering => "steering",
            Joint::Yawing => "yawing",
        }
    }
}

impl std::fmt::Display for Joint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The fixed set of operator keys the input layer must report on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
    /// Opens a numeric entry for the steering goal angle.
    SteeringEntry,
    /// Opens a numeric entry for the yawing goal angle.
    YawingEntry,
    Quit,
}

/// Static configuration of one actuator channel.
///
/// All positions and limits are in control-input units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Bus identifier of the physical actuator.
    pub id: u8,
    /// Absolute position of the joint's zero pose.
    pub home_position: i32,
    /// Raw lower bound of the goal angle (before `scale_factor`).
    pub angle_limit_min: i32,
    /// Raw upper bound of the goal angle (before `scale_factor`).
    pub angle_limit_max: i32,
    /// Gain applied to both raw limits before clamping.
    #[serde(default = "default_scale_factor")]
    pub scale_factor: f64,
    /// Largest `|home_position - present_position|` that counts as homed.
    #[serde(default = "default_homing_threshold")]
    pub homing_threshold: i32,
}

fn default_scale_factor() -> f64 {
    1.0
}

fn default_homing_threshold() -> i32 {
    5
}

impl ChannelConfig {
    /// Steering joint of the reference rig: bus id 6, about ±90° of disk
    /// rotation.
    pub fn steering() -> Self {
        Self {
            id: 6,
            home_position: 512,
            angle_limit_min: -305,
            angle_limit_max: 305,
            scale_factor: default_scale_factor(),
            homing_threshold: default_homing_threshold(),
        }
    }

    /// Yawing joint of the reference rig: bus id 1, about ±30° of disk
    /// rotation.
    pub fn yawing() -> Self {
        Self {
            id: 1,
            home_position: 512,
            angle_limit_min: -100,
            angle_limit_max: 100,
            scale_factor: default_scale_factor(),
            homing_threshold: default_homing_threshold(),
        }
    }

    /// Integer goal-angle bounds after scaling.
    ///
    /// The lower bound rounds up and the upper bound rounds down so that every
    /// integer inside the returned range also lies inside the real-valued
    /// scaled interval.
    pub fn scaled_limits(&self) -> (i32, i32) {
        let min = (self.scale_factor * f64::from(self.angle_limit_min)).ceil();
        let max = (self.scale_factor * f64::from(self.angle_limit_max)).floor();
        (min as i32, max as i32)
    }

    /// Check that the configuration can never command a position outside the
    /// register range.
    ///
    /// # Errors
    ///
    /// Returns [`TeleopError::Config`] describing the first violated rule.
    pub fn validate(&self, joint: Joint) -> Result<(), TeleopError> {
        let max = i32::from(REGISTER_MAX);
        if !self.scale_factor.is_finite() || self.scale_factor < 0.0 {
            return Err(TeleopError::Config(format!(
                "{joint}: scale_factor must be a finite, non-negative number (got {})",
                self.scale_factor
            )));
        }
        if !(0..=max).contains(&self.home_position) {
            return Err(TeleopError::Config(format!(
                "{joint}: home_position {} outside 0..={max}",
                self.home_position
            )));
        }
        if self.homing_threshold < 0 {
            return Err(TeleopError::Config(format!(
                "{joint}: homing_threshold must not be negative"
            )));
        }
        let (lo, hi) = self.scaled_limits();
        if lo > hi {
            return Err(TeleopError::Config(format!(
                "{joint}: scaled angle limits are empty ([{lo}, {hi}])"
            )));
        }
        // goal_position = home - goal_angle must stay inside the register.
        let home = i64::from(self.home_position);
        if home - i64::from(hi) < 0 || home - i64::from(lo) > i64::from(max) {
            return Err(TeleopError::Config(format!(
                "{joint}: angle limits [{lo}, {hi}] around home {} leave 0..={max}",
                self.home_position
            )));
        }
        Ok(())
    }
}

/// A copy of one channel's live state.
///
/// Each field is read atomically; the three fields are not guaranteed to come
/// from the same control tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    pub goal_angle: i32,
    pub goal_position: i32,
    pub present_position: i32,
}

/// Published by the control loop once per drive tick for the status display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriveFrame {
    pub tick: u64,
    pub steering: ChannelSnapshot,
    pub yawing: ChannelSnapshot,
}

/// One row of the persisted telemetry log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    #[serde(rename = "time")]
    pub timestamp: DateTime<Utc>,
    pub steering_goal_angle: i32,
    pub yawing_goal_angle: i32,
    pub steering_goal_position: i32,
    pub yawing_goal_position: i32,
    pub steering_present_position: i32,
    pub yawing_present_position: i32,
}

impl TelemetryRecord {
    pub fn new(timestamp: DateTime<Utc>, steering: ChannelSnapshot, yawing: ChannelSnapshot) -> Self {
        Self {
            timestamp,
            steering_goal_angle: steering.goal_angle,
            yawing_goal_angle: yawing.goal_angle,
            steering_goal_position: steering.goal_position,
            yawing_goal_position: yawing.goal_position,
            steering_present_position: steering.present_position,
            yawing_present_position: yawing.present_position,
        }
    }
}

/// Error type spanning setup failures, bus faults, operator input and
/// persistence.
#[derive(Error, Debug)]
pub enum TeleopError {
    #[error("Setup failed on {device}: {details}")]
    FatalSetup { device: String, details: String },

    #[error("Communication fault on actuator {id}: {details}")]
    Comm { id: u8, details: String },

    #[error("Actuator {id} reported error status: {flags}")]
    ServoStatus { id: u8, flags: String },

    #[error("Value {value} out of register range 0..={max} for actuator {id}")]
    OutOfRange { id: u8, value: i32, max: u16 },

    #[error("Invalid operator input {input:?}: expected an integer")]
    InvalidOperatorInput { input: String },

    #[error("Homing timed out after {elapsed_ms} ms: {details}")]
    HomingTimeout { elapsed_ms: u128, details: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Telemetry sink error: {0}")]
    Telemetry(String),
}

impl TeleopError {
    /// `true` for single-transaction bus faults that the next tick retries.
    pub fn is_transient(&self) -> bool {
        matches!(self, TeleopError::Comm { .. } | TeleopError::ServoStatus { .. })
    }
}
