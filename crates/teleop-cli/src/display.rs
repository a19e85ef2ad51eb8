//! Live status line fed by the drive loop.
//!
//! Frames arrive through a bounded [`Publisher`][teleop_runtime::Publisher]
//! queue, and the line is redrawn at most every [`REDRAW_INTERVAL`].  While a
//! numeric entry owns the screen the display stays quiet.

use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use colored::Colorize;
use crossterm::queue;
use crossterm::terminal::{Clear, ClearType};
use teleop_hal::units::units_to_degrees;
use teleop_types::{ChannelSnapshot, DriveFrame};

pub const REDRAW_INTERVAL: Duration = Duration::from_millis(50);

/// One joint's part of the status line.  The measured angle is
/// `home − present`, shown in units and degrees.
pub fn render_channel(label: &str, home: i32, snap: &ChannelSnapshot) -> String {
    let measured = home - snap.present_position;
    format!(
        "{} goal {:>4} → {:>4}  present {:>4}  angle {:>4} ({:>7.2}°)",
        label.bold(),
        snap.goal_angle,
        snap.goal_position,
        snap.present_position,
        measured,
        units_to_degrees(measured),
    )
}

pub fn render(frame: &DriveFrame, steering_home: i32, yawing_home: i32) -> String {
    format!(
        "{}   {}",
        render_channel("STEER", steering_home, &frame.steering),
        render_channel("YAW", yawing_home, &frame.yawing),
    )
}

/// Start the display thread.  It exits once every publisher is dropped.
///
/// # Errors
///
/// Returns the OS error when the thread cannot be spawned.
pub fn spawn(
    frames: Receiver<DriveFrame>,
    entry_open: Arc<AtomicBool>,
    homes: (i32, i32),
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("status-display".to_string())
        .spawn(move || {
            let mut out = io::stdout();
            let mut last_draw: Option<Instant> = None;
            for frame in frames {
                if entry_open.load(Ordering::Acquire) {
                    continue;
                }
                if last_draw.is_some_and(|t| t.elapsed() < REDRAW_INTERVAL) {
                    continue;
                }
                last_draw = Some(Instant::now());
                let line = render(&frame, homes.0, homes.1);
                let drawn = write!(out, "\r")
                    .and_then(|()| queue!(out, Clear(ClearType::UntilNewLine)))
                    .and_then(|()| write!(out, "{line}"))
                    .and_then(|()| out.flush());
                if drawn.is_err() {
                    break;
                }
            }
            let _ = write!(out, "\r\n");
            let _ = out.flush();
        })
}
