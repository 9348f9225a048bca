use std::io::Read;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use super::Endpoint;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyCommand {
    /// Route the next capture to this endpoint.
    Select(Endpoint),
    Quit,
}

/// Fixed key table. Unrecognized keys map to `None`.
pub fn key_command(key: char) -> Option<KeyCommand> {
    match key {
        '1' => Some(KeyCommand::Select(Endpoint::Ocr)),
        '2' => Some(KeyCommand::Select(Endpoint::Traffic)),
        '3' => Some(KeyCommand::Select(Endpoint::Search)),
        'q' | 'Q' => Some(KeyCommand::Quit),
        _ => None,
    }
}

/// Non-blocking key source polled by the trigger loop.
pub trait InputPoller: Send {
    /// Wait at most `timeout` for one key press.
    fn poll(&mut self, timeout: Duration) -> Option<char>;
}

/// Keys delivered over a channel, from stdin or from a test.
pub struct ChannelInput {
    rx: Receiver<char>,
    closed: bool,
}

impl ChannelInput {
    pub fn new(rx: Receiver<char>) -> Self {
        Self { rx, closed: false }
    }

    /// Sender/input pair for feeding keys by hand.
    pub fn pair() -> (Sender<char>, Self) {
        let (tx, rx) = mpsc::channel();
        (tx, Self::new(rx))
    }

    /// Read keys from stdin on a background thread.
    ///
    /// Combine with [`RawTerminal`] to get keys without waiting for Enter.
    pub fn stdin() -> Self {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let mut stdin = std::io::stdin().lock();
            let mut byte = [0u8; 1];
            loop {
                match stdin.read(&mut byte) {
                    Ok(0) => break,
                    Ok(_) => {
                        if tx.send(char::from(byte[0])).is_err() {
                            break;
                        }
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(err) => {
                        log::warn!("keyboard input stopped: {}", err);
                        break;
                    }
                }
            }
            log::debug!("keyboard input closed");
        });
        Self::new(rx)
    }
}

impl InputPoller for ChannelInput {
    fn poll(&mut self, timeout: Duration) -> Option<char> {
        if self.closed {
            std::thread::sleep(timeout);
            return None;
        }
        match self.rx.recv_timeout(timeout) {
            Ok(key) => Some(key),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                self.closed = true;
                None
            }
        }
    }
}

/// Puts the controlling terminal into unbuffered, no-echo mode until dropped.
#[cfg(unix)]
pub struct RawTerminal {
    original: libc::termios,
}

#[cfg(unix)]
impl RawTerminal {
    /// Returns `None` when stdin is not a terminal.
    pub fn enable() -> Option<Self> {
        // SAFETY: isatty/tcgetattr/tcsetattr only read and write the termios
        // struct we own, for the process's own stdin descriptor.
        unsafe {
            if libc::isatty(libc::STDIN_FILENO) != 1 {
                return None;
            }
            let mut original: libc::termios = std::mem::zeroed();
            if libc::tcgetattr(libc::STDIN_FILENO, &mut original) != 0 {
                return None;
            }
            let mut raw = original;
            raw.c_lflag &= !(libc::ICANON | libc::ECHO);
            raw.c_cc[libc::VMIN] = 1;
            raw.c_cc[libc::VTIME] = 0;
            if libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &raw) != 0 {
                return None;
            }
            Some(Self { original })
        }
    }
}

#[cfg(unix)]
impl Drop for RawTerminal {
    fn drop(&mut self) {
        // SAFETY: restores the settings captured in `enable`.
        unsafe {
            libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &self.original);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_table() {
        assert_eq!(key_command('1'), Some(KeyCommand::Select(Endpoint::Ocr)));
        assert_eq!(key_command('2'), Some(KeyCommand::Select(Endpoint::Traffic)));
        assert_eq!(key_command('3'), Some(KeyCommand::Select(Endpoint::Search)));
        assert_eq!(key_command('q'), Some(KeyCommand::Quit));
        assert_eq!(key_command('x'), None);
        assert_eq!(key_command('\n'), None);
    }

    #[test]
    fn channel_input_times_out_and_survives_close() {
        let (tx, mut input) = ChannelInput::pair();
        assert_eq!(input.poll(Duration::from_millis(5)), None);
        tx.send('2').unwrap();
        assert_eq!(input.poll(Duration::from_millis(5)), Some('2'));
        drop(tx);
        assert_eq!(input.poll(Duration::from_millis(5)), None);
        assert_eq!(input.poll(Duration::from_millis(5)), None);
    }
}
