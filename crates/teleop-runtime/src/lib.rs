//! `teleop-runtime` – the teleoperation session engine.
//!
//! Runs the homing state machine and, once armed, three concurrent tasks
//! over the shared channel state: the paced drive loop on the caller's
//! thread, the input sampler, and the telemetry logger.
//!
//! # Modules
//!
//! - [`session`] – [`TeleopSession`][session::TeleopSession]: the
//!   `Connecting → Homing → Active → ShuttingDown` lifecycle with an
//!   exactly-once shutdown.
//! - [`homing`] – the bounded homing poll.
//! - [`control_loop`] – [`ControlLoop`][control_loop::ControlLoop]: writes
//!   `home − goal_angle` and reads the present position every tick.
//! - [`input_sampler`] – [`InputSampler`][input_sampler::InputSampler] and
//!   the [`NumericEntry`][input_sampler::NumericEntry] worker.
//! - [`telemetry_logger`] – [`TelemetryLogger`][telemetry_logger::TelemetryLogger]
//!   and the [`TelemetrySink`][telemetry_logger::TelemetrySink] seam.
//! - [`csv_sink`] – [`CsvSink`][csv_sink::CsvSink]: telemetry as CSV rows.
//! - [`operator`] – the [`KeySource`][operator::KeySource] and
//!   [`OperatorConsole`][operator::OperatorConsole] seams.
//! - [`publish`] – [`Publisher`][publish::Publisher]: non-blocking hand-off
//!   to the status display.
//! - [`config`] – [`SessionConfig`][config::SessionConfig].
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: the global
//!   `tracing` subscriber with an optional OTLP span exporter.

pub mod config;
pub mod control_loop;
pub mod csv_sink;
pub mod homing;
pub mod input_sampler;
pub mod operator;
pub mod publish;
pub mod session;
pub mod telemetry;
pub mod telemetry_logger;

pub use config::SessionConfig;
pub use csv_sink::CsvSink;
pub use homing::HomingOutcome;
pub use operator::{KeySource, OperatorConsole};
pub use publish::Publisher;
pub use session::{ActiveIo, Phase, SessionReport, TeleopSession};
pub use telemetry_logger::TelemetrySink;
