//! Operator-facing seams: the keyboard state the sampler polls and the line
//! console used for direct numeric entry.
//!
//! The CLI implements both on top of a raw-mode terminal; tests implement
//! them with scripted doubles.

use std::io;

use teleop_types::Key;

/// Instantaneous keyboard state.
pub trait KeySource: Send {
    /// `true` while `key` is held down.
    fn is_held(&self, key: Key) -> bool;
}

/// A blocking line console.
pub trait OperatorConsole: Send {
    /// Show `prompt` and block until the operator submits a line.
    ///
    /// Returns `Ok(None)` when the entry was cancelled or input is closed.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures of the underlying terminal.
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>>;

    /// Show a one-line message to the operator.
    fn report(&mut self, message: &str);
}
