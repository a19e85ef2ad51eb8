//! [`ControlLoop`] – the paced drive loop of the `Active` phase.
//!
//! Each tick, for each channel: derive `goal_position = home − goal_angle`
//! from a single load of the goal angle, write it to the bus, read the
//! present position back, and publish the resulting [`DriveFrame`].  Bus
//! faults are reported and the tick carries on; a failed read keeps the
//! previous present position.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use teleop_hal::ActuatorLink;
use teleop_kernel::{ActuatorChannel, StopSignal};
use teleop_types::{ChannelSnapshot, DriveFrame, TeleopError};
use tracing::{debug, error, warn};

use crate::publish::Publisher;

/// Counters reported when the loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriveSummary {
    pub ticks: u64,
    pub write_faults: u64,
    pub read_faults: u64,
    pub overruns: u64,
}

pub struct ControlLoop<'a, L: ?Sized> {
    link: &'a mut L,
    steering: Arc<ActuatorChannel>,
    yawing: Arc<ActuatorChannel>,
    display: Option<Publisher<DriveFrame>>,
    period: Duration,
    summary: DriveSummary,
}

impl<'a, L: ActuatorLink + ?Sized> ControlLoop<'a, L> {
    pub fn new(
        link: &'a mut L,
        steering: Arc<ActuatorChannel>,
        yawing: Arc<ActuatorChannel>,
        period: Duration,
    ) -> Self {
        Self {
            link,
            steering,
            yawing,
            display: None,
            period,
            summary: DriveSummary::default(),
        }
    }

    /// Publish every tick's frame to `display`.
    pub fn with_display(mut self, display: Publisher<DriveFrame>) -> Self {
        self.display = Some(display);
        self
    }

    pub fn summary(&self) -> DriveSummary {
        self.summary
    }

    fn report(fault: &str, channel: &ActuatorChannel, e: &TeleopError) {
        if e.is_transient() {
            warn!(joint = %channel.joint(), id = channel.id(), error = %e, "{fault}");
        } else {
            error!(joint = %channel.joint(), id = channel.id(), error = %e, "{fault}");
        }
    }

    fn drive(link: &mut L, channel: &ActuatorChannel, summary: &mut DriveSummary) -> ChannelSnapshot {
        let (goal_angle, goal_position) = channel.update_goal_position();

        if let Err(e) = link.write_goal_position(channel.id(), goal_position) {
            summary.write_faults += 1;
            Self::report("Goal position write failed", channel, &e);
        }

        match link.read_present_position(channel.id()) {
            Ok(position) => channel.record_present_position(position),
            Err(e) => {
                summary.read_faults += 1;
                Self::report("Present position read failed", channel, &e);
            }
        }

        ChannelSnapshot {
            goal_angle,
            goal_position,
            present_position: channel.present_position(),
        }
    }

    /// One drive tick over both channels.
    pub fn tick(&mut self) -> DriveFrame {
        let steering = Self::drive(&mut *self.link, &self.steering, &mut self.summary);
        let yawing = Self::drive(&mut *self.link, &self.yawing, &mut self.summary);
        let frame = DriveFrame {
            tick: self.summary.ticks,
            steering,
            yawing,
        };
        self.summary.ticks += 1;
        if let Some(publisher) = self.display.as_mut() {
            publisher.publish(frame);
        }
        frame
    }

    /// Drive until the stop signal is raised.  Each tick is padded to the
    /// configured period; an overrunning tick is followed immediately by the
    /// next.
    pub fn run(&mut self, stop: &StopSignal) -> DriveSummary {
        while !stop.is_requested() {
            let started = Instant::now();
            let frame = self.tick();
            debug!(
                tick = frame.tick,
                steering_goal = frame.steering.goal_position,
                steering_present = frame.steering.present_position,
                yawing_goal = frame.yawing.goal_position,
                yawing_present = frame.yawing.present_position,
                "Drive tick"
            );
            match self.period.checked_sub(started.elapsed()) {
                Some(rest) if !rest.is_zero() => thread::sleep(rest),
                _ => self.summary.overruns += 1,
            }
        }
        if let Some(publisher) = self.display.as_ref() {
            debug!(dropped = publisher.dropped(), "Display frames dropped");
        }
        self.summary
    }
}
