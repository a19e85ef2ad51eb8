//! [`AngleLimits`] – the static angle interlock of one joint.
//!
//! Unlike a reject-on-violation rule, operator commands are never refused:
//! every goal angle is clamped into the joint's scaled range before it is
//! stored, so the control loop can only ever observe in-range values.

use teleop_types::ChannelConfig;

/// Inclusive goal-angle bounds in control-input units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AngleLimits {
    pub min: i32,
    pub max: i32,
}

impl AngleLimits {
    /// Bounds after applying the channel's `scale_factor`.
    pub fn from_config(config: &ChannelConfig) -> Self {
        let (min, max) = config.scaled_limits();
        Self { min, max }
    }

    pub fn clamp(&self, angle: i32) -> i32 {
        angle.clamp(self.min, self.max)
    }

    pub fn contains(&self, angle: i32) -> bool {
        (self.min..=self.max).contains(&angle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_into_range() {
        let limits = AngleLimits { min: -100, max: 100 };
        assert_eq!(limits.clamp(250), 100);
        assert_eq!(limits.clamp(-101), -100);
        assert_eq!(limits.clamp(42), 42);
    }

    #[test]
    fn scale_factor_narrows_range() {
        let mut cfg = ChannelConfig::yawing();
        cfg.scale_factor = 0.3;
        let limits = AngleLimits::from_config(&cfg);
        assert_eq!(limits, AngleLimits { min: -30, max: 30 });
        assert!(limits.contains(30));
        assert!(!limits.contains(31));
    }
}
