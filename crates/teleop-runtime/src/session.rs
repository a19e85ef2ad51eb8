//! [`TeleopSession`] – the lifecycle of one teleoperation run.
//!
//! ```text
//! Connecting ──► Homing ──► Active ──► ShuttingDown
//!                   │
//!                   └──(timeout)──► Failed
//! ```
//!
//! [`TeleopSession::connect`] takes an opened link and enables torque.
//! [`TeleopSession::home`] drives both channels home.
//! [`TeleopSession::run_active`] starts the input sampler and telemetry
//! logger threads and runs the drive loop on the calling thread until the
//! stop signal is raised.  [`TeleopSession::shutdown`] disables torque and
//! closes the link; it runs exactly once, whether called explicitly, at the
//! end of `run_active`, or from `Drop`.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use teleop_hal::ActuatorLink;
use teleop_kernel::{ActuatorChannel, StopSignal};
use teleop_types::{DriveFrame, Joint, TeleopError};
use tracing::{error, info, info_span, warn};

use crate::config::SessionConfig;
use crate::control_loop::{ControlLoop, DriveSummary};
use crate::homing::{self, HomingOutcome, HomingPlan};
use crate::input_sampler::{InputSampler, NumericEntry};
use crate::operator::{KeySource, OperatorConsole};
use crate::publish::Publisher;
use crate::telemetry_logger::{LoggerSummary, TelemetryLogger, TelemetrySink};

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    Homing,
    Active,
    ShuttingDown,
    /// Homing did not complete; the session was shut down afterwards.
    Failed,
}

/// Operator and persistence adapters for the `Active` phase.
pub struct ActiveIo<K, C, S> {
    pub keys: K,
    pub console: C,
    pub sink: S,
    pub display: Option<Publisher<DriveFrame>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionReport {
    pub drive: DriveSummary,
    pub telemetry: LoggerSummary,
}

// ─────────────────────────────────────────────────────────────────────────────
// TeleopSession
// ─────────────────────────────────────────────────────────────────────────────

pub struct TeleopSession<L: ActuatorLink> {
    link: L,
    config: SessionConfig,
    steering: Arc<ActuatorChannel>,
    yawing: Arc<ActuatorChannel>,
    stop: StopSignal,
    phase: Phase,
    shut_down: bool,
}

impl<L: ActuatorLink> TeleopSession<L> {
    /// Build both channels and enable torque on them.
    ///
    /// A torque-enable failure is reported but does not abort; the homing
    /// poll surfaces an actuator that never responds.
    ///
    /// # Errors
    ///
    /// Returns [`TeleopError::Config`] when a channel configuration is
    /// invalid or both channels share a bus id.  The link is closed before
    /// returning.
    pub fn connect(
        mut link: L,
        config: SessionConfig,
        stop: StopSignal,
    ) -> Result<Self, TeleopError> {
        let _span = info_span!("connect", device = link.device()).entered();

        let channels = build_channels(&config);
        let (steering, yawing) = match channels {
            Ok(pair) => pair,
            Err(e) => {
                link.close();
                return Err(e);
            }
        };

        for ch in [&steering, &yawing] {
            match link.enable_torque(ch.id(), true) {
                Ok(()) => info!(joint = %ch.joint(), id = ch.id(), "Actuator connected"),
                Err(e) => error!(joint = %ch.joint(), id = ch.id(), error = %e, "Torque enable failed"),
            }
        }

        Ok(Self {
            link,
            config,
            steering: Arc::new(steering),
            yawing: Arc::new(yawing),
            stop,
            phase: Phase::Connecting,
            shut_down: false,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    pub fn channel(&self, joint: Joint) -> &Arc<ActuatorChannel> {
        match joint {
            Joint::Steering => &self.steering,
            Joint::Yawing => &self.yawing,
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Drive both channels home.
    ///
    /// # Errors
    ///
    /// Returns [`TeleopError::HomingTimeout`] when homing does not complete
    /// in time; the session moves to [`Phase::Failed`] and is shut down.
    pub fn home(&mut self) -> Result<HomingOutcome, TeleopError> {
        let _span = info_span!("homing").entered();
        self.phase = Phase::Homing;

        let plan = HomingPlan {
            velocity: self.config.homing_velocity,
            timeout: self.config.homing_timeout,
            poll_interval: self.config.homing_poll_interval,
        };
        let channels = [self.steering.as_ref(), self.yawing.as_ref()];
        match homing::home_channels(&mut self.link, &channels, &plan, &self.stop) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(error = %e, "Homing failed");
                self.phase = Phase::Failed;
                self.shutdown();
                Err(e)
            }
        }
    }

    /// Arm teleoperation and drive until the stop signal is raised, then
    /// shut down.
    ///
    /// # Errors
    ///
    /// Returns [`TeleopError::FatalSetup`] when a worker thread cannot be
    /// spawned, and [`TeleopError::Config`] when called before homing.
    pub fn run_active<K, C, S>(
        &mut self,
        io: ActiveIo<K, C, S>,
    ) -> Result<SessionReport, TeleopError>
    where
        K: KeySource + 'static,
        C: OperatorConsole + 'static,
        S: TelemetrySink + 'static,
    {
        if self.phase != Phase::Homing || self.shut_down {
            return Err(TeleopError::Config(format!(
                "teleoperation can only be armed after homing (phase {:?})",
                self.phase
            )));
        }
        let _span = info_span!("active").entered();
        self.phase = Phase::Active;

        for ch in [&self.steering, &self.yawing] {
            if let Err(e) = self.link.set_velocity(ch.id(), self.config.active_velocity) {
                warn!(joint = %ch.joint(), error = %e, "Active velocity write failed");
            }
        }

        let device = self.link.device().to_string();
        let spawn_failed = |task: &str, e: io::Error| TeleopError::FatalSetup {
            device: device.clone(),
            details: format!("cannot start {task}: {e}"),
        };

        let entry = NumericEntry::spawn(io.console, self.stop.clone())
            .map_err(|e| spawn_failed("numeric entry", e))?;
        let sampler = InputSampler::new(
            io.keys,
            Arc::clone(&self.steering),
            Arc::clone(&self.yawing),
            entry,
            self.stop.clone(),
            self.config.sample_period,
        );
        let sampler = spawn("input-sampler", move || sampler.run())
            .map_err(|e| spawn_failed("input sampler", e))?;

        let logger = TelemetryLogger::new(
            io.sink,
            Arc::clone(&self.steering),
            Arc::clone(&self.yawing),
            self.stop.clone(),
            self.config.log_period,
        );
        let logger = match spawn("telemetry-logger", move || logger.run()) {
            Ok(handle) => handle,
            Err(e) => {
                self.stop.request("task start failed");
                join(sampler, "input sampler");
                return Err(spawn_failed("telemetry logger", e));
            }
        };

        info!("Teleoperation active");
        let mut control = ControlLoop::new(
            &mut self.link,
            Arc::clone(&self.steering),
            Arc::clone(&self.yawing),
            self.config.control_period,
        );
        if let Some(display) = io.display {
            control = control.with_display(display);
        }
        let drive = control.run(&self.stop);
        drop(control);

        join(sampler, "input sampler");
        let telemetry = join(logger, "telemetry logger").unwrap_or_default();
        self.shutdown();

        Ok(SessionReport { drive, telemetry })
    }

    /// Stop every task, disable torque and close the link.  Only the first
    /// call has any effect.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        let _span = info_span!("shutdown").entered();
        self.stop.request("shutdown");
        if self.phase != Phase::Failed {
            self.phase = Phase::ShuttingDown;
        }

        for ch in [&self.steering, &self.yawing] {
            if let Err(e) = self.link.enable_torque(ch.id(), false) {
                warn!(joint = %ch.joint(), error = %e, "Torque disable failed");
            }
        }
        self.link.close();
        info!(phase = ?self.phase, "Session closed");
    }
}

impl<L: ActuatorLink> Drop for TeleopSession<L> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn build_channels(
    config: &SessionConfig,
) -> Result<(ActuatorChannel, ActuatorChannel), TeleopError> {
    if config.steering.id == config.yawing.id {
        return Err(TeleopError::Config(format!(
            "steering and yawing share bus id {}",
            config.steering.id
        )));
    }
    Ok((
        ActuatorChannel::new(Joint::Steering, config.steering.clone())?,
        ActuatorChannel::new(Joint::Yawing, config.yawing.clone())?,
    ))
}

fn spawn<T, F>(name: &str, f: F) -> io::Result<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    thread::Builder::new().name(name.to_string()).spawn(f)
}

fn join<T>(handle: JoinHandle<T>, task: &str) -> Option<T> {
    match handle.join() {
        Ok(value) => Some(value),
        Err(_) => {
            error!(task, "Task panicked");
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use teleop_hal::SimLink;

    fn sim() -> SimLink {
        SimLink::new("sim").with_servo(6, 512).with_servo(1, 512)
    }

    fn fast_config() -> SessionConfig {
        SessionConfig {
            homing_timeout: Duration::from_millis(500),
            homing_poll_interval: Duration::ZERO,
            ..SessionConfig::default()
        }
    }

    #[test]
    fn connect_enables_torque_on_both_channels() {
        let link = sim();
        let handle = link.handle();
        let session = TeleopSession::connect(link, fast_config(), StopSignal::new()).unwrap();
        assert_eq!(session.phase(), Phase::Connecting);
        assert_eq!(handle.torque_calls(6), vec![true]);
        assert_eq!(handle.torque_calls(1), vec![true]);
    }

    #[test]
    fn shared_bus_id_is_rejected_and_link_closed() {
        let link = sim();
        let handle = link.handle();
        let mut config = fast_config();
        config.yawing.id = config.steering.id;
        assert!(matches!(
            TeleopSession::connect(link, config, StopSignal::new()),
            Err(TeleopError::Config(_))
        ));
        assert_eq!(handle.close_calls(), 1);
    }

    #[test]
    fn shutdown_runs_once_across_explicit_call_and_drop() {
        let link = sim();
        let handle = link.handle();
        let mut session = TeleopSession::connect(link, fast_config(), StopSignal::new()).unwrap();
        session.shutdown();
        session.shutdown();
        assert_eq!(session.phase(), Phase::ShuttingDown);
        assert!(session.stop_signal().is_requested());
        drop(session);
        assert_eq!(handle.torque_calls(6), vec![true, false]);
        assert_eq!(handle.torque_calls(1), vec![true, false]);
        assert_eq!(handle.close_calls(), 1);
    }

    #[test]
    fn homing_timeout_fails_and_shuts_down() {
        let link = SimLink::new("sim").with_servo(6, 512);
        let handle = link.handle();
        let mut config = fast_config();
        config.homing_timeout = Duration::from_millis(30);
        let mut session = TeleopSession::connect(link, config, StopSignal::new()).unwrap();

        assert!(matches!(
            session.home(),
            Err(TeleopError::HomingTimeout { .. })
        ));
        assert_eq!(session.phase(), Phase::Failed);
        assert!(session.is_shut_down());
        assert_eq!(handle.close_calls(), 1);
    }

    #[test]
    fn run_active_requires_homing() {
        let mut session = TeleopSession::connect(sim(), fast_config(), StopSignal::new()).unwrap();
        struct NoKeys;
        impl KeySource for NoKeys {
            fn is_held(&self, _: teleop_types::Key) -> bool {
                false
            }
        }
        struct NoConsole;
        impl OperatorConsole for NoConsole {
            fn read_line(&mut self, _: &str) -> io::Result<Option<String>> {
                Ok(None)
            }
            fn report(&mut self, _: &str) {}
        }
        struct NoSink;
        impl TelemetrySink for NoSink {
            fn append(&mut self, _: &teleop_types::TelemetryRecord) -> Result<(), TeleopError> {
                Ok(())
            }
            fn flush(&mut self) -> Result<(), TeleopError> {
                Ok(())
            }
        }
        let io = ActiveIo {
            keys: NoKeys,
            console: NoConsole,
            sink: NoSink,
            display: None,
        };
        assert!(matches!(session.run_active(io), Err(TeleopError::Config(_))));
    }
}
