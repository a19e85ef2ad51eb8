//! [`TelemetryLogger`] – periodic snapshots of both channels into a
//! [`TelemetrySink`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use teleop_kernel::{ActuatorChannel, StopSignal};
use teleop_types::{TeleopError, TelemetryRecord};
use tracing::{debug, error, info, warn};

/// Destination of telemetry records.
pub trait TelemetrySink: Send {
    /// Append one record.
    ///
    /// # Errors
    ///
    /// Returns [`TeleopError::Telemetry`] when the record cannot be written.
    fn append(&mut self, record: &TelemetryRecord) -> Result<(), TeleopError>;

    /// Push buffered records to durable storage.
    ///
    /// # Errors
    ///
    /// Returns [`TeleopError::Telemetry`] when the flush fails.
    fn flush(&mut self) -> Result<(), TeleopError>;
}

/// Counters reported when the logger stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoggerSummary {
    pub appended: u64,
    pub failed: u64,
}

pub struct TelemetryLogger<S> {
    sink: S,
    steering: Arc<ActuatorChannel>,
    yawing: Arc<ActuatorChannel>,
    stop: StopSignal,
    period: Duration,
    summary: LoggerSummary,
}

impl<S: TelemetrySink> TelemetryLogger<S> {
    pub fn new(
        sink: S,
        steering: Arc<ActuatorChannel>,
        yawing: Arc<ActuatorChannel>,
        stop: StopSignal,
        period: Duration,
    ) -> Self {
        Self {
            sink,
            steering,
            yawing,
            stop,
            period,
            summary: LoggerSummary::default(),
        }
    }

    /// Snapshot both channels and append one record.  A failed append is
    /// logged and counted; the logger keeps going.
    pub fn record(&mut self) {
        let record = TelemetryRecord::new(
            Utc::now(),
            self.steering.snapshot(),
            self.yawing.snapshot(),
        );
        match self.sink.append(&record) {
            Ok(()) => self.summary.appended += 1,
            Err(e) => {
                self.summary.failed += 1;
                warn!(error = %e, "Telemetry append failed");
            }
        }
    }

    /// Record until the stop signal is raised, then flush the sink.
    pub fn run(mut self) -> LoggerSummary {
        info!(period_ms = self.period.as_millis() as u64, "Telemetry logger started");
        while !self.stop.is_requested() {
            self.record();
            self.stop.sleep(self.period);
        }
        if let Err(e) = self.sink.flush() {
            error!(error = %e, "Telemetry flush failed");
        }
        debug!(
            appended = self.summary.appended,
            failed = self.summary.failed,
            "Telemetry logger stopped"
        );
        self.summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::thread;
    use teleop_types::{ChannelConfig, Joint};

    #[derive(Clone, Default)]
    struct MemorySink {
        records: Arc<Mutex<Vec<TelemetryRecord>>>,
        flushes: Arc<Mutex<u32>>,
        fail_next: Arc<Mutex<u32>>,
    }

    impl TelemetrySink for MemorySink {
        fn append(&mut self, record: &TelemetryRecord) -> Result<(), TeleopError> {
            let mut fail = self.fail_next.lock().unwrap();
            if *fail > 0 {
                *fail -= 1;
                return Err(TeleopError::Telemetry("disk full".to_string()));
            }
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
        fn flush(&mut self) -> Result<(), TeleopError> {
            *self.flushes.lock().unwrap() += 1;
            Ok(())
        }
    }

    fn channels() -> (Arc<ActuatorChannel>, Arc<ActuatorChannel>) {
        (
            Arc::new(ActuatorChannel::new(Joint::Steering, ChannelConfig::steering()).unwrap()),
            Arc::new(ActuatorChannel::new(Joint::Yawing, ChannelConfig::yawing()).unwrap()),
        )
    }

    #[test]
    fn record_captures_both_channels() {
        let (steering, yawing) = channels();
        steering.set_goal_angle(10);
        steering.update_goal_position();
        yawing.record_present_position(530);
        let sink = MemorySink::default();
        let mut logger = TelemetryLogger::new(
            sink.clone(),
            steering,
            yawing,
            StopSignal::new(),
            Duration::from_millis(100),
        );
        logger.record();
        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].steering_goal_angle, 10);
        assert_eq!(records[0].steering_goal_position, 502);
        assert_eq!(records[0].yawing_present_position, 530);
    }

    #[test]
    fn append_failure_does_not_stop_logging() {
        let (steering, yawing) = channels();
        let sink = MemorySink::default();
        *sink.fail_next.lock().unwrap() = 1;
        let mut logger = TelemetryLogger::new(
            sink.clone(),
            steering,
            yawing,
            StopSignal::new(),
            Duration::from_millis(100),
        );
        logger.record();
        logger.record();
        assert_eq!(logger.summary, LoggerSummary { appended: 1, failed: 1 });
        assert_eq!(sink.records.lock().unwrap().len(), 1);
    }

    #[test]
    fn run_flushes_once_on_stop() {
        let (steering, yawing) = channels();
        let sink = MemorySink::default();
        let stop = StopSignal::new();
        let logger = TelemetryLogger::new(
            sink.clone(),
            steering,
            yawing,
            stop.clone(),
            Duration::from_millis(5),
        );
        let t = thread::spawn(move || logger.run());
        thread::sleep(Duration::from_millis(40));
        stop.request("test");
        let summary = t.join().unwrap();
        assert!(summary.appended >= 1);
        assert_eq!(*sink.flushes.lock().unwrap(), 1);
    }
}
