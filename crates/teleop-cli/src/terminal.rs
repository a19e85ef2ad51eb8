//! Raw-mode terminal adapters: held-key state for the input sampler and a
//! line console for numeric entry.
//!
//! A single pump thread owns `crossterm::event::read`.  Outside numeric
//! entry it feeds a held-key table; while an entry is open it forwards typed
//! characters to [`TerminalConsole`] instead.  Terminals that report key
//! releases give exact hold state.  Elsewhere a key counts as held for
//! [`HOLD_WINDOW`] after its last press or auto-repeat.

use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use colored::Colorize;
use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{self, disable_raw_mode, enable_raw_mode};
use teleop_kernel::StopSignal;
use teleop_runtime::{KeySource, OperatorConsole};
use teleop_types::Key;
use tracing::{debug, error, warn};

/// How long a key stays held after its last press or repeat event when the
/// terminal does not report releases.
pub const HOLD_WINDOW: Duration = Duration::from_millis(100);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

// ─────────────────────────────────────────────────────────────────────────────
// Key mapping and hold tracking
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) fn map_key(code: KeyCode) -> Option<Key> {
    match code {
        KeyCode::Up => Some(Key::Up),
        KeyCode::Down => Some(Key::Down),
        KeyCode::Left => Some(Key::Left),
        KeyCode::Right => Some(Key::Right),
        KeyCode::Char('s') | KeyCode::Char('S') => Some(Key::SteeringEntry),
        KeyCode::Char('y') | KeyCode::Char('Y') => Some(Key::YawingEntry),
        KeyCode::Esc => Some(Key::Quit),
        _ => None,
    }
}

#[derive(Debug)]
pub(crate) struct HeldKeys {
    last_seen: HashMap<Key, Instant>,
    release_events: bool,
    window: Duration,
}

impl HeldKeys {
    pub(crate) fn new(release_events: bool, window: Duration) -> Self {
        Self {
            last_seen: HashMap::new(),
            release_events,
            window,
        }
    }

    pub(crate) fn press(&mut self, key: Key, now: Instant) {
        self.last_seen.insert(key, now);
    }

    pub(crate) fn release(&mut self, key: Key) {
        self.last_seen.remove(&key);
    }

    pub(crate) fn clear(&mut self) {
        self.last_seen.clear();
    }

    pub(crate) fn is_held(&self, key: Key, now: Instant) -> bool {
        match self.last_seen.get(&key) {
            None => false,
            Some(_) if self.release_events => true,
            Some(&seen) => now.saturating_duration_since(seen) < self.window,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared state
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKey {
    Char(char),
    Backspace,
    Submit,
    Cancel,
}

struct Shared {
    held: Mutex<HeldKeys>,
    entry_open: Arc<AtomicBool>,
    closing: AtomicBool,
}

impl Shared {
    fn held(&self) -> MutexGuard<'_, HeldKeys> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle_key(&self, key: KeyEvent, entry_tx: &Sender<EntryKey>, stop: &StopSignal) {
        if key.kind == KeyEventKind::Press
            && key.modifiers.contains(KeyModifiers::CONTROL)
            && key.code == KeyCode::Char('c')
        {
            stop.request("ctrl-c");
            return;
        }

        if self.entry_open.load(Ordering::Acquire) {
            if key.kind == KeyEventKind::Release {
                return;
            }
            let entry = match key.code {
                KeyCode::Char(c) => EntryKey::Char(c),
                KeyCode::Backspace => EntryKey::Backspace,
                KeyCode::Enter => EntryKey::Submit,
                KeyCode::Esc => EntryKey::Cancel,
                _ => return,
            };
            // The console may have just closed; a lost keystroke is harmless.
            let _ = entry_tx.send(entry);
            return;
        }

        let Some(mapped) = map_key(key.code) else {
            return;
        };
        match key.kind {
            KeyEventKind::Press | KeyEventKind::Repeat => self.held().press(mapped, Instant::now()),
            KeyEventKind::Release => self.held().release(mapped),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Terminal
// ─────────────────────────────────────────────────────────────────────────────

/// Raw-mode session on the controlling terminal.  Dropping it stops the
/// event pump and restores the terminal.
pub struct Terminal {
    shared: Arc<Shared>,
    pump: Option<JoinHandle<()>>,
    enhanced: bool,
}

impl Terminal {
    /// Enter raw mode and start the event pump.
    ///
    /// # Errors
    ///
    /// Returns the I/O error when raw mode cannot be enabled or the pump
    /// thread cannot be spawned.
    pub fn start(stop: StopSignal) -> io::Result<(Self, TerminalKeys, TerminalConsole)> {
        enable_raw_mode()?;
        let enhanced = matches!(terminal::supports_keyboard_enhancement(), Ok(true))
            && execute!(
                io::stdout(),
                PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
            )
            .is_ok();
        debug!(release_events = enhanced, "Raw terminal mode enabled");

        let shared = Arc::new(Shared {
            held: Mutex::new(HeldKeys::new(enhanced, HOLD_WINDOW)),
            entry_open: Arc::new(AtomicBool::new(false)),
            closing: AtomicBool::new(false),
        });
        let (entry_tx, entry_rx) = mpsc::channel();

        let pump_shared = Arc::clone(&shared);
        let pump_stop = stop.clone();
        let pump = thread::Builder::new()
            .name("terminal-input".to_string())
            .spawn(move || pump_events(&pump_shared, &entry_tx, &pump_stop));
        let pump = match pump {
            Ok(handle) => handle,
            Err(e) => {
                restore(enhanced);
                return Err(e);
            }
        };

        let keys = TerminalKeys {
            shared: Arc::clone(&shared),
        };
        let console = TerminalConsole {
            shared: Arc::clone(&shared),
            entries: entry_rx,
            stop,
        };
        Ok((
            Self {
                shared,
                pump: Some(pump),
                enhanced,
            },
            keys,
            console,
        ))
    }

    /// Raised while a numeric entry owns the screen.
    pub fn entry_open(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shared.entry_open)
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        self.shared.closing.store(true, Ordering::Release);
        if let Some(pump) = self.pump.take() {
            if pump.join().is_err() {
                error!("Terminal input thread panicked");
            }
        }
        restore(self.enhanced);
    }
}

fn restore(enhanced: bool) {
    if enhanced {
        let _ = execute!(io::stdout(), PopKeyboardEnhancementFlags);
    }
    if let Err(e) = disable_raw_mode() {
        warn!(error = %e, "Failed to leave raw terminal mode");
    }
}

fn pump_events(shared: &Shared, entry_tx: &Sender<EntryKey>, stop: &StopSignal) {
    while !shared.closing.load(Ordering::Acquire) && !stop.is_requested() {
        match event::poll(POLL_INTERVAL) {
            Ok(false) => continue,
            Ok(true) => {}
            Err(e) => {
                error!(error = %e, "Terminal input failed");
                stop.request("terminal input failed");
                break;
            }
        }
        match event::read() {
            Ok(Event::Key(key)) => shared.handle_key(key, entry_tx, stop),
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "Terminal input failed");
                stop.request("terminal input failed");
                break;
            }
        }
    }
    debug!("Terminal input thread exited");
}

// ─────────────────────────────────────────────────────────────────────────────
// KeySource / OperatorConsole adapters
// ─────────────────────────────────────────────────────────────────────────────

pub struct TerminalKeys {
    shared: Arc<Shared>,
}

impl KeySource for TerminalKeys {
    fn is_held(&self, key: Key) -> bool {
        self.shared.held().is_held(key, Instant::now())
    }
}

pub struct TerminalConsole {
    shared: Arc<Shared>,
    entries: Receiver<EntryKey>,
    stop: StopSignal,
}

impl TerminalConsole {
    /// Echo keystrokes until the operator submits or cancels.
    fn edit_line(&self, prompt: &str) -> io::Result<Option<String>> {
        let mut out = io::stdout();
        let mut line = String::new();
        write!(out, "\r\n{}", prompt.bold())?;
        out.flush()?;
        loop {
            match self.entries.recv_timeout(POLL_INTERVAL) {
                Ok(EntryKey::Char(c)) => {
                    line.push(c);
                    write!(out, "{c}")?;
                }
                Ok(EntryKey::Backspace) => {
                    if line.pop().is_some() {
                        write!(out, "\x08 \x08")?;
                    }
                }
                Ok(EntryKey::Submit) => {
                    write!(out, "\r\n")?;
                    out.flush()?;
                    return Ok(Some(line));
                }
                Ok(EntryKey::Cancel) | Err(RecvTimeoutError::Disconnected) => {
                    write!(out, "\r\n")?;
                    out.flush()?;
                    return Ok(None);
                }
                Err(RecvTimeoutError::Timeout) if self.stop.is_requested() => return Ok(None),
                Err(RecvTimeoutError::Timeout) => {}
            }
            out.flush()?;
        }
    }
}

impl OperatorConsole for TerminalConsole {
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        // Keys pressed before the prompt must not stay held behind it.
        self.shared.held().clear();
        while self.entries.try_recv().is_ok() {}
        self.shared.entry_open.store(true, Ordering::Release);

        let result = self.edit_line(prompt);

        self.shared.held().clear();
        self.shared.entry_open.store(false, Ordering::Release);
        result
    }

    fn report(&mut self, message: &str) {
        let mut out = io::stdout();
        let _ = write!(out, "{}\r\n", message.yellow());
        let _ = out.flush();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Log writer
// ─────────────────────────────────────────────────────────────────────────────

/// Translates bare `\n` into `\r\n` so log lines start at column zero while
/// the terminal is in raw mode.
pub struct CrlfWriter<W>(pub W);

impl<W: Write> Write for CrlfWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut start = 0;
        for (i, &b) in buf.iter().enumerate() {
            if b == b'\n' && (i == 0 || buf[i - 1] != b'\r') {
                self.0.write_all(&buf[start..i])?;
                self.0.write_all(b"\r\n")?;
                start = i + 1;
            }
        }
        self.0.write_all(&buf[start..])?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

/// `MakeWriter` for the tracing subscriber: CRLF-translated stderr.
pub fn log_writer() -> CrlfWriter<io::Stderr> {
    CrlfWriter(io::stderr())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn shared(release_events: bool) -> Shared {
        Shared {
            held: Mutex::new(HeldKeys::new(release_events, HOLD_WINDOW)),
            entry_open: Arc::new(AtomicBool::new(false)),
            closing: AtomicBool::new(false),
        }
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new_with_kind(code, KeyModifiers::NONE, KeyEventKind::Press)
    }

    fn release(code: KeyCode) -> KeyEvent {
        KeyEvent::new_with_kind(code, KeyModifiers::NONE, KeyEventKind::Release)
    }

    #[test]
    fn maps_operator_keys() {
        assert_eq!(map_key(KeyCode::Up), Some(Key::Up));
        assert_eq!(map_key(KeyCode::Char('s')), Some(Key::SteeringEntry));
        assert_eq!(map_key(KeyCode::Char('Y')), Some(Key::YawingEntry));
        assert_eq!(map_key(KeyCode::Esc), Some(Key::Quit));
        assert_eq!(map_key(KeyCode::Char('q')), None);
    }

    #[test]
    fn hold_window_expires_without_release_events() {
        let mut held = HeldKeys::new(false, Duration::from_millis(100));
        let t0 = Instant::now();
        held.press(Key::Left, t0);
        assert!(held.is_held(Key::Left, t0 + Duration::from_millis(99)));
        assert!(!held.is_held(Key::Left, t0 + Duration::from_millis(100)));
        // Auto-repeat refreshes the window.
        held.press(Key::Left, t0 + Duration::from_millis(90));
        assert!(held.is_held(Key::Left, t0 + Duration::from_millis(150)));
    }

    #[test]
    fn release_events_give_exact_hold_state() {
        let mut held = HeldKeys::new(true, Duration::from_millis(1));
        let t0 = Instant::now();
        held.press(Key::Up, t0);
        assert!(held.is_held(Key::Up, t0 + Duration::from_secs(5)));
        held.release(Key::Up);
        assert!(!held.is_held(Key::Up, t0));
    }

    #[test]
    fn ctrl_c_raises_stop() {
        let s = shared(false);
        let (tx, _rx) = mpsc::channel();
        let stop = StopSignal::new();
        s.handle_key(
            KeyEvent::new_with_kind(KeyCode::Char('c'), KeyModifiers::CONTROL, KeyEventKind::Press),
            &tx,
            &stop,
        );
        assert!(stop.is_requested());
    }

    #[test]
    fn keys_update_held_table_outside_entry() {
        let s = shared(true);
        let (tx, rx) = mpsc::channel();
        let stop = StopSignal::new();
        s.handle_key(press(KeyCode::Right), &tx, &stop);
        assert!(s.held().is_held(Key::Right, Instant::now()));
        s.handle_key(release(KeyCode::Right), &tx, &stop);
        assert!(!s.held().is_held(Key::Right, Instant::now()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn entry_mode_routes_characters_to_console() {
        let s = shared(true);
        s.entry_open.store(true, Ordering::Release);
        let (tx, rx) = mpsc::channel();
        let stop = StopSignal::new();
        for code in [
            KeyCode::Char('2'),
            KeyCode::Char('5'),
            KeyCode::Backspace,
            KeyCode::Up,
            KeyCode::Enter,
        ] {
            s.handle_key(press(code), &tx, &stop);
        }
        s.handle_key(release(KeyCode::Char('5')), &tx, &stop);

        let got: Vec<EntryKey> = rx.try_iter().collect();
        assert_eq!(
            got,
            vec![
                EntryKey::Char('2'),
                EntryKey::Char('5'),
                EntryKey::Backspace,
                EntryKey::Submit
            ]
        );
        assert!(!s.held().is_held(Key::Up, Instant::now()));
        // Esc cancels the entry rather than quitting.
        s.handle_key(press(KeyCode::Esc), &tx, &stop);
        assert_eq!(rx.try_recv(), Ok(EntryKey::Cancel));
        assert!(!s.held().is_held(Key::Quit, Instant::now()));
    }

    #[test]
    fn crlf_writer_translates_bare_newlines_only() {
        let mut w = CrlfWriter(Vec::new());
        w.write_all(b"one\ntwo\r\nthree\n").unwrap();
        assert_eq!(w.0, b"one\r\ntwo\r\nthree\r\n");
    }
}
