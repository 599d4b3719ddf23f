//! Operator cancellation.
//!
//! The loop checks for a quit request once per cycle and never waits for input.
//! `q` and ESC both end the run; every other key is ignored.

use std::io::{self, Read};
use std::sync::mpsc::{self, Receiver};
use std::thread;

use tracing::{debug, warn};

use crate::hardware::capabilities::{Key, KeySource};

/// Key that ends the run
pub const QUIT_KEY: char = 'q';

/// Whether `key` asks to end the run
pub fn is_quit(key: Key) -> bool {
    matches!(key, Key::Escape | Key::Char(QUIT_KEY))
}

/// Latches the first quit key seen on a [`KeySource`]
pub struct CancellationWatch<K: KeySource> {
    keys: K,
    requested: bool,
}

impl<K: KeySource> CancellationWatch<K> {
    /// Watch `keys` for a quit request
    pub fn new(keys: K) -> Self {
        Self {
            keys,
            requested: false,
        }
    }

    /// Drain pending keys; true once a quit key has been seen
    pub fn poll(&mut self) -> bool {
        while !self.requested {
            match self.keys.poll_nonblocking() {
                Some(key) if is_quit(key) => {
                    debug!(?key, "Cancellation requested");
                    self.requested = true;
                }
                Some(_) => {}
                None => break,
            }
        }
        self.requested
    }

    /// Whether a quit key has been seen
    pub fn is_requested(&self) -> bool {
        self.requested
    }

    /// Access the underlying key source, e.g. to wait for any key after the run
    pub fn keys_mut(&mut self) -> &mut K {
        &mut self.keys
    }
}

/// Key source backed by the process's standard input.
///
/// A background thread reads stdin byte by byte and forwards each byte over a
/// channel; polling never blocks. The terminal is left in its normal line mode,
/// so keys typed at a console arrive once Enter is pressed.
pub struct StdinKeys {
    rx: Receiver<u8>,
}

impl StdinKeys {
    /// Start the reader thread
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel();
        let reader = thread::Builder::new()
            .name("stdin-keys".to_string())
            .spawn(move || {
                for byte in io::stdin().lock().bytes() {
                    match byte {
                        Ok(b) => {
                            if tx.send(b).is_err() {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }
            });
        if let Err(e) = reader {
            warn!(error = %e, "Cannot read keyboard; 'q' will not stop the run");
        }
        Self { rx }
    }
}

impl KeySource for StdinKeys {
    fn poll_nonblocking(&mut self) -> Option<Key> {
        self.rx.try_recv().ok().map(Key::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::ScriptedKeys;

    #[test]
    fn test_quit_keys() {
        assert!(is_quit(Key::Char('q')));
        assert!(is_quit(Key::Escape));
        assert!(!is_quit(Key::Char('Q')));
        assert!(!is_quit(Key::Char('\n')));
    }

    #[test]
    fn test_other_keys_are_ignored() {
        let keys = ScriptedKeys::new([Some(Key::Char('x')), Some(Key::Char('\n')), None]);
        let mut watch = CancellationWatch::new(keys);
        assert!(!watch.poll());
        assert!(!watch.is_requested());
    }

    #[test]
    fn test_escape_latches() {
        let mut watch = CancellationWatch::new(ScriptedKeys::new([
            None,
            Some(Key::Char('a')),
            Some(Key::Escape),
        ]));
        assert!(!watch.poll());
        assert!(watch.poll());
        // Stays requested after the source runs dry
        assert!(watch.poll());
    }
}
