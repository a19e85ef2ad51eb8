//! Homing: drive every channel to its home position before the operator
//! gets control.
//!
//! Both channels are commanded home at the reduced homing velocity, then
//! polled until **every** channel has reported a position within its homing
//! threshold.  A channel that has not produced a reading yet never counts as
//! homed, nor does one whose home goal was never accepted.  The poll is
//! bounded by [`HomingPlan::timeout`] and abandoned as soon as the stop
//! signal is raised.

use std::time::{Duration, Instant};

use teleop_hal::ActuatorLink;
use teleop_kernel::{ActuatorChannel, StopSignal};
use teleop_types::TeleopError;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HomingPlan {
    pub velocity: u16,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HomingOutcome {
    /// Every channel is within its threshold; `polls` is the number of
    /// polling rounds it took.
    Homed { polls: u32 },
    /// The stop signal was raised before homing completed.
    Stopped,
}

/// Command `channels` home and wait until they get there.
///
/// Velocity and goal writes that fail are reported; a failed goal write is
/// retried on every poll until it is accepted.  Failed reads are reported
/// and the poll continues.
///
/// # Errors
///
/// Returns [`TeleopError::HomingTimeout`] when the channels are not all
/// homed within `plan.timeout`.
pub fn home_channels<L>(
    link: &mut L,
    channels: &[&ActuatorChannel],
    plan: &HomingPlan,
    stop: &StopSignal,
) -> Result<HomingOutcome, TeleopError>
where
    L: ActuatorLink + ?Sized,
{
    let started = Instant::now();
    info!(
        velocity = plan.velocity,
        timeout_ms = plan.timeout.as_millis() as u64,
        "Homing started"
    );

    let mut commanded = vec![false; channels.len()];
    let mut latest: Vec<Option<i32>> = vec![None; channels.len()];

    for ch in channels {
        if let Err(e) = link.set_velocity(ch.id(), plan.velocity) {
            warn!(joint = %ch.joint(), error = %e, "Homing velocity write failed");
        }
    }

    let mut polls = 0u32;
    loop {
        if stop.is_requested() {
            info!(polls, "Homing interrupted");
            return Ok(HomingOutcome::Stopped);
        }
        polls += 1;

        for (i, ch) in channels.iter().enumerate() {
            if !commanded[i] {
                match link.write_goal_position(ch.id(), ch.home_position()) {
                    Ok(()) => commanded[i] = true,
                    Err(e) => warn!(joint = %ch.joint(), error = %e, "Home goal write failed"),
                }
            }
            match link.read_present_position(ch.id()) {
                Ok(position) => {
                    ch.record_present_position(position);
                    latest[i] = Some(position);
                }
                Err(e) => warn!(joint = %ch.joint(), error = %e, "Homing read failed"),
            }
        }
        debug!(polls, positions = ?latest, "Homing poll");

        let homed = channels
            .iter()
            .zip(&latest)
            .zip(&commanded)
            .all(|((ch, reading), &sent)| sent && reading.is_some_and(|p| ch.is_homed(p)));
        if homed {
            info!(
                polls,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Homing complete"
            );
            return Ok(HomingOutcome::Homed { polls });
        }

        let elapsed = started.elapsed();
        if elapsed >= plan.timeout {
            return Err(TeleopError::HomingTimeout {
                elapsed_ms: elapsed.as_millis(),
                details: describe(channels, &latest),
            });
        }
        stop.sleep(plan.poll_interval);
    }
}

fn describe(channels: &[&ActuatorChannel], latest: &[Option<i32>]) -> String {
    channels
        .iter()
        .zip(latest)
        .map(|(ch, reading)| match reading {
            Some(p) => format!(
                "{} at {p} (home {} ±{})",
                ch.joint(),
                ch.home_position(),
                ch.homing_threshold()
            ),
            None => format!("{} never answered", ch.joint()),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
