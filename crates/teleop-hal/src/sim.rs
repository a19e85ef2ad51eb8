//! In-process simulated servo bus for running the full stack without
//! hardware.
//!
//! [`SimLink`] implements [`ActuatorLink`] on top of shared [`SimBus`] state.
//! Each position read slews the simulated servo toward its goal at a rate
//! derived from the commanded velocity.  Tests keep a [`SimHandle`] to script
//! readings, inject one-shot faults and assert on the calls that reached the
//! bus after the link itself has been moved into the code under test.
//!
//! # Example
//!
//! ```rust
//! use teleop_hal::actuator::ActuatorLink;
//! use teleop_hal::sim::SimLink;
//!
//! let mut link = SimLink::new("sim").with_servo(1, 600);
//! let handle = link.handle();
//!
//! link.enable_torque(1, true).unwrap();
//! link.write_goal_position(1, 512).unwrap();
//! let first = link.read_present_position(1).unwrap();
//! assert!(first < 600);
//! assert_eq!(handle.goal(1), Some(512));
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use teleop_types::TeleopError;

use crate::actuator::{ActuatorLink, register_value};

/// Velocity register value `0` means "no speed control" on AX-12 servos.
const UNLIMITED_STEP: i32 = 1023;

// ────────────────────────────────────────────────────────────────────────────
// Simulated state
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct SimServo {
    goal: Option<i32>,
    present: i32,
    velocity: u16,
    torque: bool,
    torque_calls: Vec<bool>,
    goal_writes: Vec<i32>,
    script: VecDeque<i32>,
    failing_writes: u32,
    failing_reads: u32,
}

impl SimServo {
    fn step(&self) -> i32 {
        match self.velocity {
            0 => UNLIMITED_STEP,
            v => (i32::from(v) / 10).max(1),
        }
    }

    fn advance(&mut self) {
        if let Some(next) = self.script.pop_front() {
            self.present = next;
            return;
        }
        let Some(goal) = self.goal else { return };
        if !self.torque {
            return;
        }
        let delta = (goal - self.present).clamp(-self.step(), self.step());
        self.present += delta;
    }
}

/// Shared state behind a [`SimLink`] and its [`SimHandle`]s.
#[derive(Debug, Default)]
pub struct SimBus {
    servos: HashMap<u8, SimServo>,
    close_calls: u32,
}

fn lock(bus: &Mutex<SimBus>) -> MutexGuard<'_, SimBus> {
    bus.lock().unwrap_or_else(PoisonError::into_inner)
}

fn no_response(id: u8) -> TeleopError {
    TeleopError::Comm {
        id,
        details: "rx timeout: no status packet".to_string(),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimLink
// ────────────────────────────────────────────────────────────────────────────

/// A simulated bus.  Servos that were never added behave like absent
/// hardware: every transaction times out.
pub struct SimLink {
    device: String,
    bus: Arc<Mutex<SimBus>>,
    closed: bool,
}

impl SimLink {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            bus: Arc::new(Mutex::new(SimBus::default())),
            closed: false,
        }
    }

    /// Add a servo resting at `position`.
    pub fn with_servo(self, id: u8, position: i32) -> Self {
        lock(&self.bus).servos.insert(
            id,
            SimServo {
                present: position,
                ..SimServo::default()
            },
        );
        self
    }

    /// A handle onto the same simulated state.
    pub fn handle(&self) -> SimHandle {
        SimHandle {
            bus: Arc::clone(&self.bus),
        }
    }

    fn with_servo_mut<T>(
        &mut self,
        id: u8,
        f: impl FnOnce(&mut SimServo) -> Result<T, TeleopError>,
    ) -> Result<T, TeleopError> {
        if self.closed {
            return Err(TeleopError::Comm {
                id,
                details: "link is closed".to_string(),
            });
        }
        let mut bus = lock(&self.bus);
        let servo = bus.servos.get_mut(&id).ok_or_else(|| no_response(id))?;
        f(servo)
    }
}

impl ActuatorLink for SimLink {
    fn device(&self) -> &str {
        &self.device
    }

    fn enable_torque(&mut self, id: u8, enable: bool) -> Result<(), TeleopError> {
        self.with_servo_mut(id, |servo| {
            servo.torque = enable;
            servo.torque_calls.push(enable);
            Ok(())
        })
    }

    fn set_velocity(&mut self, id: u8, velocity: u16) -> Result<(), TeleopError> {
        let velocity = register_value(id, i32::from(velocity))?;
        self.with_servo_mut(id, |servo| {
            servo.velocity = velocity;
            Ok(())
        })
    }

    fn write_goal_position(&mut self, id: u8, position: i32) -> Result<(), TeleopError> {
        let position = i32::from(register_value(id, position)?);
        self.with_servo_mut(id, |servo| {
            if servo.failing_writes > 0 {
                servo.failing_writes -= 1;
                return Err(no_response(id));
            }
            servo.goal = Some(position);
            servo.goal_writes.push(position);
            Ok(())
        })
    }

    fn read_present_position(&mut self, id: u8) -> Result<i32, TeleopError> {
        self.with_servo_mut(id, |servo| {
            if servo.failing_reads > 0 {
                servo.failing_reads -= 1;
                return Err(no_response(id));
            }
            servo.advance();
            Ok(servo.present)
        })
    }

    fn close(&mut self) {
        self.closed = true;
        lock(&self.bus).close_calls += 1;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimHandle
// ────────────────────────────────────────────────────────────────────────────

/// Inspection and fault-injection handle for a [`SimLink`].
#[derive(Clone)]
pub struct SimHandle {
    bus: Arc<Mutex<SimBus>>,
}

impl SimHandle {
    /// Queue readings returned (in order) by the next position reads of `id`,
    /// before the servo resumes slewing toward its goal.
    pub fn script_readings(&self, id: u8, readings: impl IntoIterator<Item = i32>) {
        if let Some(servo) = lock(&self.bus).servos.get_mut(&id) {
            servo.script.extend(readings);
        }
    }

    /// Make the next `count` goal writes to `id` time out.
    pub fn fail_writes(&self, id: u8, count: u32) {
        if let Some(servo) = lock(&self.bus).servos.get_mut(&id) {
            servo.failing_writes = count;
        }
    }

    /// Make the next `count` position reads of `id` time out.
    pub fn fail_reads(&self, id: u8, count: u32) {
        if let Some(servo) = lock(&self.bus).servos.get_mut(&id) {
            servo.failing_reads = count;
        }
    }

    pub fn present(&self, id: u8) -> Option<i32> {
        lock(&self.bus).servos.get(&id).map(|s| s.present)
    }

    pub fn goal(&self, id: u8) -> Option<i32> {
        lock(&self.bus).servos.get(&id).and_then(|s| s.goal)
    }

    pub fn velocity(&self, id: u8) -> Option<u16> {
        lock(&self.bus).servos.get(&id).map(|s| s.velocity)
    }

    /// Every torque command sent to `id`, oldest first.
    pub fn torque_calls(&self, id: u8) -> Vec<bool> {
        lock(&self.bus)
            .servos
            .get(&id)
            .map(|s| s.torque_calls.clone())
            .unwrap_or_default()
    }

    /// Every goal position accepted by `id`, oldest first.
    pub fn goal_writes(&self, id: u8) -> Vec<i32> {
        lock(&self.bus)
            .servos
            .get(&id)
            .map(|s| s.goal_writes.clone())
            .unwrap_or_default()
    }

    pub fn close_calls(&self) -> u32 {
        lock(&self.bus).close_calls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn servo_slews_toward_goal_at_commanded_speed() {
        let mut link = SimLink::new("sim").with_servo(1, 600);
        link.enable_torque(1, true).unwrap();
        link.set_velocity(1, 50).unwrap();
        link.write_goal_position(1, 512).unwrap();

        assert_eq!(link.read_present_position(1).unwrap(), 595);
        assert_eq!(link.read_present_position(1).unwrap(), 590);
    }

    #[test]
    fn servo_without_torque_does_not_move() {
        let mut link = SimLink::new("sim").with_servo(1, 600);
        link.write_goal_position(1, 512).unwrap();
        assert_eq!(link.read_present_position(1).unwrap(), 600);
    }

    #[test]
    fn zero_velocity_reaches_goal_at_once() {
        let mut link = SimLink::new("sim").with_servo(1, 0);
        link.enable_torque(1, true).unwrap();
        link.write_goal_position(1, 1000).unwrap();
        assert_eq!(link.read_present_position(1).unwrap(), 1000);
    }

    #[test]
    fn scripted_readings_take_precedence() {
        let mut link = SimLink::new("sim").with_servo(1, 600);
        link.handle().script_readings(1, [580, 560]);
        assert_eq!(link.read_present_position(1).unwrap(), 580);
        assert_eq!(link.read_present_position(1).unwrap(), 560);
    }

    #[test]
    fn injected_faults_are_one_shot() {
        let mut link = SimLink::new("sim").with_servo(1, 512);
        let handle = link.handle();
        handle.fail_writes(1, 1);
        handle.fail_reads(1, 1);

        assert!(link.write_goal_position(1, 500).unwrap_err().is_transient());
        link.write_goal_position(1, 500).unwrap();
        assert!(link.read_present_position(1).is_err());
        assert!(link.read_present_position(1).is_ok());
        assert_eq!(handle.goal_writes(1), vec![500]);
    }

    #[test]
    fn unknown_servo_times_out() {
        let mut link = SimLink::new("sim");
        assert!(matches!(
            link.read_present_position(9),
            Err(TeleopError::Comm { id: 9, .. })
        ));
    }

    #[test]
    fn handle_records_torque_and_close() {
        let mut link = SimLink::new("sim").with_servo(6, 512);
        let handle = link.handle();
        link.enable_torque(6, true).unwrap();
        link.enable_torque(6, false).unwrap();
        link.close();

        assert_eq!(handle.torque_calls(6), vec![true, false]);
        assert_eq!(handle.close_calls(), 1);
        assert!(link.enable_torque(6, true).is_err());
    }
}
