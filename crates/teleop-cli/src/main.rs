//! `teleop` – keyboard teleoperation of a two-joint Dynamixel rig.
//!
//! The binary:
//!
//! 1. Loads `~/.teleop/config.toml`, writing the defaults on first run.
//! 2. Opens the actuator bus (serial, or the simulator with `link = "sim"`).
//! 3. Homes both joints, then waits for the operator to confirm.
//! 4. Switches the terminal to raw mode and hands control to the operator:
//!    arrows nudge the joints, `s`/`y` open a numeric entry, `Esc` quits.
//! 5. Intercepts **Ctrl-C** and SIGTERM to shut the session down cleanly.

mod config;
mod display;
mod terminal;

use colored::Colorize;
use std::io::{BufRead, BufReader, Read, Write};
use std::process::ExitCode;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

use teleop_hal::units::degrees_to_units;
use teleop_hal::{ActuatorLink, DynamixelLink, SimLink};
use teleop_kernel::StopSignal;
use teleop_runtime::{
    ActiveIo, CsvSink, HomingOutcome, SessionReport, TeleopSession, publish, telemetry,
};
use teleop_types::TeleopError;

use crate::config::{Config, LinkKind};
use crate::terminal::Terminal;

/// Offsets from home, in degrees, the simulated servos start at, so homing
/// has work to do.
const SIM_START_OFFSET_DEG: (f64, f64) = (12.0, -7.5);

fn main() -> ExitCode {
    let _tracing = telemetry::init_tracing("teleop", terminal::log_writer);

    print_banner();

    // ── Shared stop signal ────────────────────────────────────────────────
    let stop = StopSignal::new();
    let handler_stop = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        handler_stop.request("interrupt signal");
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; use Esc to quit");
    }

    match run(&stop) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Teleoperation aborted");
            eprintln!("{}: {e}", "Error".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run(stop: &StopSignal) -> Result<(), TeleopError> {
    let path = config::config_path();
    let (cfg, created) = config::load_or_init(&path)?;
    if created {
        println!(
            "  {} Default config written to {}",
            "✓".green().bold(),
            path.display().to_string().bold()
        );
    } else {
        println!(
            "  Config loaded from {}",
            path.display().to_string().bold()
        );
    }
    cfg.validate()?;

    match cfg.link {
        LinkKind::Serial => {
            let link = DynamixelLink::open(&cfg.device, cfg.baud_rate, cfg.link_timeout())?;
            println!(
                "  Port {} open at {} baud",
                cfg.device.bold(),
                cfg.baud_rate
            );
            drive(link, &cfg, stop)
        }
        LinkKind::Sim => {
            let (steering_offset, yawing_offset) = SIM_START_OFFSET_DEG;
            let link = SimLink::new("sim")
                .with_servo(
                    cfg.steering.id,
                    cfg.steering.home_position + degrees_to_units(steering_offset),
                )
                .with_servo(
                    cfg.yawing.id,
                    cfg.yawing.home_position + degrees_to_units(yawing_offset),
                );
            println!("  Using the {} bus", "simulated".yellow());
            drive(link, &cfg, stop)
        }
    }
}

fn drive<L: ActuatorLink>(link: L, cfg: &Config, stop: &StopSignal) -> Result<(), TeleopError> {
    let mut session = TeleopSession::connect(link, cfg.session_config(), stop.clone())?;

    println!("  Homing …");
    match session.home()? {
        HomingOutcome::Homed { polls } => {
            println!("  {} Both joints home after {polls} polls", "✓".green().bold());
        }
        HomingOutcome::Stopped => {
            session.shutdown();
            println!("  Stopped during homing.");
            return Ok(());
        }
    }

    if cfg.confirm_before_active && !confirm(stop) {
        session.shutdown();
        println!("  Teleoperation not started.");
        return Ok(());
    }

    let sink = CsvSink::create(&cfg.log_path)?;
    let (publisher, frames) = publish::bounded(1);

    print_controls();
    let terminal_failed = |e: std::io::Error| TeleopError::FatalSetup {
        device: "terminal".to_string(),
        details: e.to_string(),
    };
    let (terminal, keys, console) = Terminal::start(stop.clone()).map_err(terminal_failed)?;
    let status = display::spawn(
        frames,
        terminal.entry_open(),
        (cfg.steering.home_position, cfg.yawing.home_position),
    )
    .map_err(terminal_failed)?;

    let result = session.run_active(ActiveIo {
        keys,
        console,
        sink,
        display: Some(publisher),
    });

    if status.join().is_err() {
        error!("Status display thread panicked");
    }
    drop(terminal);

    let report = result?;
    print_summary(&report, cfg);
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner & prompts
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("  {} {}",
        "teleop".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Steering / yawing keyboard teleoperation");
    println!();
}

fn print_controls() {
    println!();
    println!("  {}  steering ±1", "↑ ↓".bold());
    println!("  {}  yawing ±1", "← →".bold());
    println!("  {}    type a steering / yawing goal angle", "s y".bold());
    println!("  {}    quit", "Esc".bold());
    println!();
}

/// Wait for Enter.  Returns `false` when the operator aborts or stdin closes.
fn confirm(stop: &StopSignal) -> bool {
    print!(
        "  Press {} to start teleoperation (Ctrl-C to abort) ",
        "Enter".bold()
    );
    std::io::stdout().flush().ok();
    wait_for_enter(std::io::stdin(), stop, CONFIRM_POLL)
}

/// How often the arming prompt re-checks the stop signal.
const CONFIRM_POLL: Duration = Duration::from_millis(50);

/// Read one line from `input` on a helper thread while polling `stop`.
///
/// The signal handler does not interrupt a blocking read, so the read runs
/// off the main thread.  On stop the helper is left blocked and dies with
/// the process.
fn wait_for_enter<R>(input: R, stop: &StopSignal, poll: Duration) -> bool
where
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let reader = thread::Builder::new()
        .name("confirm-input".to_string())
        .spawn(move || {
            let mut line = String::new();
            let answered = matches!(BufReader::new(input).read_line(&mut line), Ok(n) if n > 0);
            let _ = tx.send(answered);
        });
    if let Err(e) = reader {
        warn!(error = %e, "Cannot read the confirmation");
        return false;
    }

    loop {
        if stop.is_requested() {
            return false;
        }
        match rx.recv_timeout(poll) {
            Ok(answered) => return answered && !stop.is_requested(),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return false,
        }
    }
}

fn print_summary(report: &SessionReport, cfg: &Config) {
    info!(
        ticks = report.drive.ticks,
        write_faults = report.drive.write_faults,
        read_faults = report.drive.read_faults,
        overruns = report.drive.overruns,
        rows = report.telemetry.appended,
        "Session finished"
    );
    println!();
    println!(
        "  {} {} drive ticks, {} telemetry rows written to {}",
        "✓".green().bold(),
        report.drive.ticks,
        report.telemetry.appended,
        cfg.log_path.display().to_string().bold()
    );
    let faults = report.drive.write_faults + report.drive.read_faults;
    if faults > 0 {
        println!("  {} {faults} bus faults during the session", "!".yellow().bold());
    }
}
