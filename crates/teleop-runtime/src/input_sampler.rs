//! [`InputSampler`] – turns held keys into goal-angle updates on a fixed
//! period.
//!
//! Directional keys nudge the goal angle by one unit per tick while held
//! (steering: up/down, yawing: right/left).  The direct-entry keys open a
//! blocking numeric prompt, which runs on the [`NumericEntry`] worker thread
//! so the sampler keeps polling while the operator types.  A completed entry
//! overrides the accumulated goal angle on the next tick.  Every write goes
//! through [`ActuatorChannel`], which clamps into the joint limits.

use std::io;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::Duration;

use teleop_kernel::{ActuatorChannel, StopSignal};
use teleop_types::{Joint, Key, TeleopError};
use tracing::{debug, info, warn};

use crate::operator::{KeySource, OperatorConsole};

// ─────────────────────────────────────────────────────────────────────────────
// Numeric entry
// ─────────────────────────────────────────────────────────────────────────────

/// What the numeric-entry worker handed back for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    Value(Joint, i32),
    Cancelled(Joint),
}

/// Sampler-side handle onto the numeric-entry worker thread.
///
/// At most one request is outstanding at a time.  The worker exits once this
/// handle is dropped and its current prompt (if any) returns.
pub struct NumericEntry {
    requests: Sender<Joint>,
    results: Receiver<EntryOutcome>,
    pending: Option<Joint>,
}

impl NumericEntry {
    /// Start the worker thread reading from `console`.
    ///
    /// # Errors
    ///
    /// Returns the OS error when the thread cannot be spawned.
    pub fn spawn<C>(console: C, stop: StopSignal) -> io::Result<Self>
    where
        C: OperatorConsole + 'static,
    {
        let (requests, request_rx) = mpsc::channel();
        let (result_tx, results) = mpsc::channel();
        thread::Builder::new()
            .name("numeric-entry".to_string())
            .spawn(move || entry_worker(console, request_rx, result_tx, stop))?;
        Ok(Self {
            requests,
            results,
            pending: None,
        })
    }

    /// The joint whose entry is currently open, if any.
    pub fn pending(&self) -> Option<Joint> {
        self.pending
    }

    /// Ask the worker for a value.  Returns `false` when an entry is already
    /// open or the worker is gone.
    fn request(&mut self, joint: Joint) -> bool {
        if self.pending.is_some() {
            return false;
        }
        if self.requests.send(joint).is_err() {
            warn!(%joint, "Numeric entry worker is gone");
            return false;
        }
        debug!(%joint, "Numeric entry opened");
        self.pending = Some(joint);
        true
    }

    fn poll(&mut self) -> Option<EntryOutcome> {
        match self.results.try_recv() {
            Ok(outcome) => {
                self.pending = None;
                Some(outcome)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.pending = None;
                None
            }
        }
    }
}

fn entry_worker<C: OperatorConsole>(
    mut console: C,
    requests: Receiver<Joint>,
    results: Sender<EntryOutcome>,
    stop: StopSignal,
) {
    for joint in requests {
        let outcome = match read_goal_angle(&mut console, joint, &stop) {
            Some(value) => EntryOutcome::Value(joint, value),
            None => EntryOutcome::Cancelled(joint),
        };
        if results.send(outcome).is_err() {
            break;
        }
    }
    debug!("Numeric entry worker exited");
}

/// Prompt until the operator submits an integer.  Invalid lines are
/// reported and the prompt repeats.
fn read_goal_angle<C: OperatorConsole>(
    console: &mut C,
    joint: Joint,
    stop: &StopSignal,
) -> Option<i32> {
    let prompt = match joint {
        Joint::Steering => "Steering motor input: ",
        Joint::Yawing => "Yawing motor input: ",
    };
    while !stop.is_requested() {
        match console.read_line(prompt) {
            Ok(Some(line)) => match parse_operator_integer(&line) {
                Ok(value) => return Some(value),
                Err(e) => {
                    warn!(%joint, error = %e, "Rejected operator input");
                    console.report("Please enter a valid number.");
                }
            },
            Ok(None) => return None,
            Err(e) => {
                warn!(%joint, error = %e, "Console read failed");
                return None;
            }
        }
    }
    None
}

/// Parse one line of operator input as a signed integer.
///
/// # Errors
///
/// Returns [`TeleopError::InvalidOperatorInput`] when the trimmed line is not
/// an integer.
pub fn parse_operator_integer(line: &str) -> Result<i32, TeleopError> {
    let trimmed = line.trim();
    trimmed
        .parse::<i32>()
        .map_err(|_| TeleopError::InvalidOperatorInput {
            input: trimmed.to_string(),
        })
}

// ─────────────────────────────────────────────────────────────────────────────
// InputSampler
// ─────────────────────────────────────────────────────────────────────────────

pub struct InputSampler<K> {
    keys: K,
    steering: Arc<ActuatorChannel>,
    yawing: Arc<ActuatorChannel>,
    entry: NumericEntry,
    stop: StopSignal,
    period: Duration,
}

impl<K: KeySource> InputSampler<K> {
    pub fn new(
        keys: K,
        steering: Arc<ActuatorChannel>,
        yawing: Arc<ActuatorChannel>,
        entry: NumericEntry,
        stop: StopSignal,
        period: Duration,
    ) -> Self {
        Self {
            keys,
            steering,
            yawing,
            entry,
            stop,
            period,
        }
    }

    fn channel(&self, joint: Joint) -> &ActuatorChannel {
        match joint {
            Joint::Steering => &self.steering,
            Joint::Yawing => &self.yawing,
        }
    }

    /// Net direction of an axis: `+1`, `-1`, or `0` when both or neither
    /// key is held.
    fn axis(&self, plus: Key, minus: Key) -> i32 {
        i32::from(self.keys.is_held(plus)) - i32::from(self.keys.is_held(minus))
    }

    /// One sampling pass.
    pub fn tick(&mut self) {
        while let Some(outcome) = self.entry.poll() {
            match outcome {
                EntryOutcome::Value(joint, requested) => {
                    let goal_angle = self.channel(joint).set_goal_angle(requested);
                    info!(%joint, requested, goal_angle, "Direct goal angle applied");
                }
                EntryOutcome::Cancelled(joint) => debug!(%joint, "Numeric entry cancelled"),
            }
        }

        if self.keys.is_held(Key::Quit) {
            self.stop.request("quit key");
        }

        let entry_key = if self.keys.is_held(Key::SteeringEntry) {
            Some(Joint::Steering)
        } else if self.keys.is_held(Key::YawingEntry) {
            Some(Joint::Yawing)
        } else {
            None
        };

        // Directional keys are ignored while an entry key is held.  A zero
        // delta still clamps.
        let (steering, yawing) = match entry_key {
            Some(joint) => {
                self.entry.request(joint);
                (0, 0)
            }
            None => (self.axis(Key::Up, Key::Down), self.axis(Key::Right, Key::Left)),
        };
        self.steering.nudge_goal_angle(steering);
        self.yawing.nudge_goal_angle(yawing);
    }

    /// Sample until the stop signal is raised.
    pub fn run(mut self) {
        info!(period_ms = self.period.as_millis() as u64, "Input sampler started");
        while !self.stop.is_requested() {
            self.tick();
            self.stop.sleep(self.period);
        }
        debug!("Input sampler stopped");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashSet, VecDeque};
    use std::sync::Mutex;
    use std::time::Instant;
    use teleop_types::ChannelConfig;

    #[derive(Clone, Default)]
    struct HeldKeys(Arc<Mutex<HashSet<Key>>>);

    impl HeldKeys {
        fn press(&self, key: Key) {
            self.0.lock().unwrap().insert(key);
        }
        fn release(&self, key: Key) {
            self.0.lock().unwrap().remove(&key);
        }
    }

    impl KeySource for HeldKeys {
        fn is_held(&self, key: Key) -> bool {
            self.0.lock().unwrap().contains(&key)
        }
    }

    #[derive(Default)]
    struct ScriptedConsole {
        lines: VecDeque<String>,
        reports: Arc<Mutex<Vec<String>>>,
    }

    impl OperatorConsole for ScriptedConsole {
        fn read_line(&mut self, _prompt: &str) -> io::Result<Option<String>> {
            Ok(self.lines.pop_front())
        }
        fn report(&mut self, message: &str) {
            self.reports.lock().unwrap().push(message.to_string());
        }
    }

    fn sampler(lines: &[&str]) -> (InputSampler<HeldKeys>, HeldKeys, Arc<Mutex<Vec<String>>>) {
        let stop = StopSignal::new();
        let console = ScriptedConsole {
            lines: lines.iter().map(|s| s.to_string()).collect(),
            ..ScriptedConsole::default()
        };
        let reports = Arc::clone(&console.reports);
        let entry = NumericEntry::spawn(console, stop.clone()).unwrap();
        let keys = HeldKeys::default();
        let s = InputSampler::new(
            keys.clone(),
            Arc::new(ActuatorChannel::new(Joint::Steering, ChannelConfig::steering()).unwrap()),
            Arc::new(ActuatorChannel::new(Joint::Yawing, ChannelConfig::yawing()).unwrap()),
            entry,
            stop,
            Duration::from_millis(20),
        );
        (s, keys, reports)
    }

    /// Tick until no entry is pending.
    fn settle(s: &mut InputSampler<HeldKeys>) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while s.entry.pending().is_some() {
            assert!(Instant::now() < deadline, "numeric entry never completed");
            thread::sleep(Duration::from_millis(2));
            s.tick();
        }
    }

    #[test]
    fn parse_accepts_signed_integers() {
        assert_eq!(parse_operator_integer(" -42\n").unwrap(), -42);
        assert!(matches!(
            parse_operator_integer("abc"),
            Err(TeleopError::InvalidOperatorInput { input }) if input == "abc"
        ));
        assert!(parse_operator_integer("1.5").is_err());
    }

    #[test]
    fn held_keys_accumulate_once_per_tick() {
        let (mut s, keys, _) = sampler(&[]);
        keys.press(Key::Up);
        keys.press(Key::Left);
        for _ in 0..3 {
            s.tick();
        }
        assert_eq!(s.steering.goal_angle(), 3);
        assert_eq!(s.yawing.goal_angle(), -3);
    }

    #[test]
    fn opposing_keys_cancel() {
        let (mut s, keys, _) = sampler(&[]);
        keys.press(Key::Right);
        keys.press(Key::Left);
        s.tick();
        assert_eq!(s.yawing.goal_angle(), 0);
    }

    #[test]
    fn goal_angle_never_leaves_limits() {
        let (mut s, keys, _) = sampler(&[]);
        keys.press(Key::Right);
        for _ in 0..150 {
            s.tick();
            assert!(s.yawing.limits().contains(s.yawing.goal_angle()));
        }
        assert_eq!(s.yawing.goal_angle(), 100);
        keys.release(Key::Right);
        keys.press(Key::Left);
        for _ in 0..250 {
            s.tick();
        }
        assert_eq!(s.yawing.goal_angle(), -100);
    }

    #[test]
    fn direct_entry_overrides_accumulated_angle() {
        let (mut s, keys, _) = sampler(&["250"]);
        keys.press(Key::Up);
        for _ in 0..5 {
            s.tick();
        }
        keys.release(Key::Up);
        keys.press(Key::SteeringEntry);
        s.tick();
        keys.release(Key::SteeringEntry);
        assert_eq!(s.entry.pending(), Some(Joint::Steering));
        settle(&mut s);
        assert_eq!(s.steering.goal_angle(), 250);
    }

    #[test]
    fn entry_key_suppresses_directional_keys() {
        let (mut s, keys, _) = sampler(&[]);
        keys.press(Key::SteeringEntry);
        keys.press(Key::Up);
        keys.press(Key::Left);
        s.tick();
        assert_eq!(s.steering.goal_angle(), 0);
        assert_eq!(s.yawing.goal_angle(), 0);
        assert_eq!(s.entry.pending(), Some(Joint::Steering));

        keys.release(Key::SteeringEntry);
        settle(&mut s);
        s.tick();
        assert!(s.steering.goal_angle() > 0);
        assert!(s.yawing.goal_angle() < 0);
    }

    #[test]
    fn direct_entry_is_clamped() {
        let (mut s, keys, _) = sampler(&["250"]);
        keys.press(Key::YawingEntry);
        s.tick();
        keys.release(Key::YawingEntry);
        settle(&mut s);
        assert_eq!(s.yawing.goal_angle(), 100);
    }

    #[test]
    fn invalid_entry_reprompts() {
        let (mut s, keys, reports) = sampler(&["abc", "-20"]);
        keys.press(Key::YawingEntry);
        s.tick();
        keys.release(Key::YawingEntry);
        settle(&mut s);
        assert_eq!(s.yawing.goal_angle(), -20);
        assert_eq!(reports.lock().unwrap().len(), 1);
    }

    #[test]
    fn cancelled_entry_keeps_goal_angle() {
        let (mut s, keys, _) = sampler(&[]);
        s.steering.set_goal_angle(12);
        keys.press(Key::SteeringEntry);
        s.tick();
        keys.release(Key::SteeringEntry);
        settle(&mut s);
        assert_eq!(s.steering.goal_angle(), 12);
    }

    #[test]
    fn quit_key_raises_stop() {
        let (mut s, keys, _) = sampler(&[]);
        keys.press(Key::Quit);
        s.tick();
        assert!(s.stop.is_requested());
    }

    #[test]
    fn run_returns_once_stopped() {
        let (s, _keys, _) = sampler(&[]);
        let stop = s.stop.clone();
        let t = thread::spawn(move || s.run());
        thread::sleep(Duration::from_millis(50));
        stop.request("test");
        t.join().unwrap();
    }
}
