//! [`ActuatorLink`] – the register-level contract of a servo bus.
//!
//! The control loop and the homing sequence only ever talk to this trait, so
//! the Dynamixel serial driver and the in-process simulator are
//! interchangeable.  Opening the device and configuring its baud rate happen
//! in the concrete link's constructor; everything after that is a
//! per-transaction call that may fail transiently.

use teleop_types::{REGISTER_MAX, TeleopError};

/// A bus of position-controlled servos addressed by numeric id.
pub trait ActuatorLink: Send {
    /// Human-readable name of the underlying device, e.g. `"/dev/ttyUSB0"`.
    fn device(&self) -> &str;

    /// Switch holding torque on or off for servo `id`.
    ///
    /// # Errors
    ///
    /// Returns [`TeleopError::Comm`] or [`TeleopError::ServoStatus`] when the
    /// transaction fails.
    fn enable_torque(&mut self, id: u8, enable: bool) -> Result<(), TeleopError>;

    /// Set the moving speed of servo `id` (`0..=1023`).
    ///
    /// # Errors
    ///
    /// Returns [`TeleopError::OutOfRange`] for values above the register
    /// maximum, otherwise the same transient errors as
    /// [`enable_torque`][Self::enable_torque].
    fn set_velocity(&mut self, id: u8, velocity: u16) -> Result<(), TeleopError>;

    /// Command servo `id` to move to the absolute `position` (`0..=1023`).
    ///
    /// # Errors
    ///
    /// Returns [`TeleopError::OutOfRange`] without touching the bus when
    /// `position` is outside the register range.
    fn write_goal_position(&mut self, id: u8, position: i32) -> Result<(), TeleopError>;

    /// Read the measured absolute position of servo `id`.
    ///
    /// # Errors
    ///
    /// Returns [`TeleopError::Comm`] or [`TeleopError::ServoStatus`] when the
    /// transaction fails.
    fn read_present_position(&mut self, id: u8) -> Result<i32, TeleopError>;

    /// Release the device.  Further calls fail with [`TeleopError::Comm`].
    fn close(&mut self);
}

impl<L: ActuatorLink + ?Sized> ActuatorLink for Box<L> {
    fn device(&self) -> &str {
        (**self).device()
    }

    fn enable_torque(&mut self, id: u8, enable: bool) -> Result<(), TeleopError> {
        (**self).enable_torque(id, enable)
    }

    fn set_velocity(&mut self, id: u8, velocity: u16) -> Result<(), TeleopError> {
        (**self).set_velocity(id, velocity)
    }

    fn write_goal_position(&mut self, id: u8, position: i32) -> Result<(), TeleopError> {
        (**self).write_goal_position(id, position)
    }

    fn read_present_position(&mut self, id: u8) -> Result<i32, TeleopError> {
        (**self).read_present_position(id)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Convert `value` into a 10-bit register value.
///
/// # Errors
///
/// Returns [`TeleopError::OutOfRange`] when `value` is negative or above
/// [`REGISTER_MAX`].
pub fn register_value(id: u8, value: i32) -> Result<u16, TeleopError> {
    match u16::try_from(value) {
        Ok(v) if v <= REGISTER_MAX => Ok(v),
        _ => Err(TeleopError::OutOfRange {
            id,
            value,
            max: REGISTER_MAX,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal in-process link used only for tests.
    struct MockLink {
        goal: i32,
        torque: bool,
        closed: bool,
    }

    impl ActuatorLink for MockLink {
        fn device(&self) -> &str {
            "mock"
        }

        fn enable_torque(&mut self, _id: u8, enable: bool) -> Result<(), TeleopError> {
            self.torque = enable;
            Ok(())
        }

        fn set_velocity(&mut self, id: u8, velocity: u16) -> Result<(), TeleopError> {
            register_value(id, i32::from(velocity)).map(|_| ())
        }

        fn write_goal_position(&mut self, id: u8, position: i32) -> Result<(), TeleopError> {
            self.goal = i32::from(register_value(id, position)?);
            Ok(())
        }

        fn read_present_position(&mut self, _id: u8) -> Result<i32, TeleopError> {
            Ok(self.goal)
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    #[test]
    fn boxed_link_forwards_calls() {
        let mut link: Box<dyn ActuatorLink> = Box::new(MockLink {
            goal: 0,
            torque: false,
            closed: false,
        });
        link.enable_torque(1, true).unwrap();
        link.write_goal_position(1, 412).unwrap();
        assert_eq!(link.read_present_position(1).unwrap(), 412);
        assert_eq!(link.device(), "mock");
        link.close();
    }

    #[test]
    fn register_value_bounds() {
        assert_eq!(register_value(1, 0).unwrap(), 0);
        assert_eq!(register_value(1, 1023).unwrap(), 1023);
        assert!(matches!(
            register_value(7, 1024),
            Err(TeleopError::OutOfRange { id: 7, value: 1024, .. })
        ));
        assert!(register_value(1, -1).is_err());
    }
}
