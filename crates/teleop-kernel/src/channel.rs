//! [`ActuatorChannel`] – static configuration plus lock-free live state of one
//! joint.
//!
//! The channel is shared as `Arc<ActuatorChannel>` between the control loop,
//! the input sampler and the telemetry logger.  Each live field is an
//! [`AtomicI32`], so readers always see a fully written value without taking
//! a lock.  Ownership of writes is by convention:
//!
//! | Field | Writer |
//! |---|---|
//! | `goal_angle` | input sampler |
//! | `goal_position` | control loop |
//! | `present_position` | control loop (homing runs on the same thread) |

use std::sync::atomic::{AtomicI32, Ordering};

use teleop_types::{ChannelConfig, ChannelSnapshot, Joint, TeleopError};

use crate::limits::AngleLimits;

#[derive(Debug)]
pub struct ActuatorChannel {
    joint: Joint,
    config: ChannelConfig,
    limits: AngleLimits,
    goal_angle: AtomicI32,
    goal_position: AtomicI32,
    present_position: AtomicI32,
}

impl ActuatorChannel {
    /// Build a channel at rest: goal angle zero, positions at home.
    ///
    /// # Errors
    ///
    /// Returns [`TeleopError::Config`] when `config` fails validation.
    pub fn new(joint: Joint, config: ChannelConfig) -> Result<Self, TeleopError> {
        config.validate(joint)?;
        let limits = AngleLimits::from_config(&config);
        let home = config.home_position;
        Ok(Self {
            joint,
            limits,
            goal_angle: AtomicI32::new(limits.clamp(0)),
            goal_position: AtomicI32::new(home),
            present_position: AtomicI32::new(home),
            config,
        })
    }

    pub fn joint(&self) -> Joint {
        self.joint
    }

    /// Bus id of the physical actuator.
    pub fn id(&self) -> u8 {
        self.config.id
    }

    pub fn home_position(&self) -> i32 {
        self.config.home_position
    }

    pub fn homing_threshold(&self) -> i32 {
        self.config.homing_threshold
    }

    pub fn limits(&self) -> AngleLimits {
        self.limits
    }

    pub fn goal_angle(&self) -> i32 {
        self.goal_angle.load(Ordering::Acquire)
    }

    /// Overwrite the goal angle, clamped into the joint limits.  Returns the
    /// stored value.
    pub fn set_goal_angle(&self, angle: i32) -> i32 {
        let clamped = self.limits.clamp(angle);
        self.goal_angle.store(clamped, Ordering::Release);
        clamped
    }

    /// Add `delta` to the goal angle and clamp the sum.  Returns the stored
    /// value.
    pub fn nudge_goal_angle(&self, delta: i32) -> i32 {
        let limits = self.limits;
        let step = |angle: i32| limits.clamp(angle.saturating_add(delta));
        match self
            .goal_angle
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |a| Some(step(a)))
        {
            Ok(previous) | Err(previous) => step(previous),
        }
    }

    /// Derive the goal position from a single read of the goal angle and
    /// store it.  Returns `(goal_angle, goal_position)`.
    pub fn update_goal_position(&self) -> (i32, i32) {
        let angle = self.goal_angle();
        let position = self.config.home_position - angle;
        self.goal_position.store(position, Ordering::Release);
        (angle, position)
    }

    pub fn goal_position(&self) -> i32 {
        self.goal_position.load(Ordering::Acquire)
    }

    pub fn present_position(&self) -> i32 {
        self.present_position.load(Ordering::Acquire)
    }

    /// Store a position read back from the actuator.  Only the control
    /// thread may call this.
    pub fn record_present_position(&self, position: i32) {
        self.present_position.store(position, Ordering::Release);
    }

    /// `true` when `present` lies within the homing threshold of home.
    pub fn is_homed(&self, present: i32) -> bool {
        (self.config.home_position - present).abs() <= self.config.homing_threshold
    }

    /// Per-field atomic copy of the live state.
    pub fn snapshot(&self) -> ChannelSnapshot {
        ChannelSnapshot {
            goal_angle: self.goal_angle(),
            goal_position: self.goal_position(),
            present_position: self.present_position(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn steering() -> ActuatorChannel {
        ActuatorChannel::new(Joint::Steering, ChannelConfig::steering()).unwrap()
    }

    #[test]
    fn new_channel_rests_at_home() {
        let ch = steering();
        assert_eq!(
            ch.snapshot(),
            ChannelSnapshot {
                goal_angle: 0,
                goal_position: 512,
                present_position: 512
            }
        );
        assert_eq!(ch.id(), 6);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut cfg = ChannelConfig::yawing();
        cfg.home_position = 2000;
        assert!(ActuatorChannel::new(Joint::Yawing, cfg).is_err());
    }

    #[test]
    fn set_goal_angle_clamps_to_limit() {
        let ch = steering();
        assert_eq!(ch.set_goal_angle(250), 250);
        assert_eq!(ch.set_goal_angle(400), 305);
        assert_eq!(ch.set_goal_angle(-400), -305);
    }

    #[test]
    fn nudge_is_applied_then_clamped() {
        let ch = steering();
        assert_eq!(ch.nudge_goal_angle(1), 1);
        ch.set_goal_angle(305);
        assert_eq!(ch.nudge_goal_angle(1), 305);
        // Net zero at the limit stays at the limit.
        assert_eq!(ch.nudge_goal_angle(0), 305);
        assert_eq!(ch.nudge_goal_angle(-2), 303);
    }

    #[test]
    fn goal_position_is_home_minus_angle() {
        let ch = steering();
        for angle in [-305, -1, 0, 1, 100, 305] {
            ch.set_goal_angle(angle);
            let (a, p) = ch.update_goal_position();
            assert_eq!(a, angle);
            assert_eq!(p, 512 - angle);
            assert_eq!(ch.home_position() - p, angle);
        }
    }

    #[test]
    fn homing_threshold_is_inclusive() {
        let ch = steering();
        assert!(ch.is_homed(517));
        assert!(ch.is_homed(507));
        assert!(!ch.is_homed(518));
        assert!(!ch.is_homed(506));
    }

    #[test]
    fn concurrent_nudges_never_escape_limits() {
        let ch = Arc::new(ActuatorChannel::new(Joint::Yawing, ChannelConfig::yawing()).unwrap());
        let writers: Vec<_> = [1, -1, 3]
            .into_iter()
            .map(|delta| {
                let ch = Arc::clone(&ch);
                thread::spawn(move || {
                    for _ in 0..500 {
                        let stored = ch.nudge_goal_angle(delta);
                        assert!(ch.limits().contains(stored));
                    }
                })
            })
            .collect();
        for _ in 0..500 {
            assert!(ch.limits().contains(ch.goal_angle()));
        }
        for w in writers {
            w.join().unwrap();
        }
        assert!(ch.limits().contains(ch.goal_angle()));
    }
}
