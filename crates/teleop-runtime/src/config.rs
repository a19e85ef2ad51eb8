//! [`SessionConfig`] – everything a [`TeleopSession`][crate::session::TeleopSession]
//! needs besides its link and its operator adapters.

use std::time::Duration;

use teleop_types::{ChannelConfig, Joint};

/// Moving speed written during homing.
pub const HOMING_VELOCITY: u16 = 50;
/// Moving speed written when teleoperation is armed.
pub const ACTIVE_VELOCITY: u16 = 31;

/// Configuration bundle for a teleoperation session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub steering: ChannelConfig,
    pub yawing: ChannelConfig,
    /// Moving speed register value used while homing.
    pub homing_velocity: u16,
    /// Moving speed register value used once active.
    pub active_velocity: u16,
    /// Upper bound on the homing poll.
    pub homing_timeout: Duration,
    /// Pause between two homing polls.
    pub homing_poll_interval: Duration,
    /// Target period of the drive loop.
    pub control_period: Duration,
    /// Period of the input sampler.
    pub sample_period: Duration,
    /// Period of the telemetry logger.
    pub log_period: Duration,
}

impl SessionConfig {
    pub fn channel(&self, joint: Joint) -> &ChannelConfig {
        match joint {
            Joint::Steering => &self.steering,
            Joint::Yawing => &self.yawing,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            steering: ChannelConfig::steering(),
            yawing: ChannelConfig::yawing(),
            homing_velocity: HOMING_VELOCITY,
            active_velocity: ACTIVE_VELOCITY,
            homing_timeout: Duration::from_secs(10),
            homing_poll_interval: Duration::from_millis(10),
            control_period: Duration::from_millis(10),
            sample_period: Duration::from_millis(20),
            log_period: Duration::from_millis(100),
        }
    }
}
