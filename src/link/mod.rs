//! Serial link to the coaster: setpoint commands out, temperature readings in.
//!
//! The protocol is newline-terminated ASCII. Outbound commands are `N1<value>`
//! (preferred temperature), `N2<value>` (upper threshold) and `N3<value>` (lower
//! threshold). Inbound reads carry a bare decimal temperature.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use log::{debug, error, info, trace, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::AppResult;

pub const DEFAULT_PREFERRED_TEMPERATURE: f32 = 40.0;
const READ_BUFFER_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SetpointCommand {
    PreferredTemperature(f32),
    MaxThreshold(f32),
    MinThreshold(f32),
}

impl SetpointCommand {
    pub fn encode(&self) -> String {
        // `{:?}` keeps a decimal digit on whole numbers: 40.0, not 40.
        match self {
            SetpointCommand::PreferredTemperature(v) => format!("N1{:?}\n", v),
            SetpointCommand::MaxThreshold(v) => format!("N2{:?}\n", v),
            SetpointCommand::MinThreshold(v) => format!("N3{:?}\n", v),
        }
    }
}

/// A temperature reading from one inbound chunk, or `None` if it is not a number.
pub fn parse_temperature(chunk: &[u8]) -> Option<f32> {
    std::str::from_utf8(chunk)
        .ok()?
        .trim()
        .parse::<f32>()
        .ok()
        .filter(|t| t.is_finite())
}

struct Setpoints {
    preferred: f32,
    threshold: f32,
}

pub struct TemperatureController {
    setpoints: Mutex<Setpoints>,
    current: watch::Receiver<f32>,
    writer: Mutex<Option<Box<dyn Write + Send>>>,
}

impl TemperatureController {
    /// `current` is fed by [`spawn_read_loop`].
    pub fn new(current: watch::Receiver<f32>) -> Self {
        Self {
            setpoints: Mutex::new(Setpoints {
                preferred: DEFAULT_PREFERRED_TEMPERATURE,
                threshold: 0.0,
            }),
            current,
            writer: Mutex::new(None),
        }
    }

    pub fn attach_writer(&self, writer: Box<dyn Write + Send>) {
        *lock(&self.writer) = Some(writer);
        info!("Coaster link writer attached");
    }

    pub fn detach_writer(&self) {
        lock(&self.writer).take();
    }

    pub fn current_temperature(&self) -> f32 {
        *self.current.borrow()
    }

    pub fn preferred_temperature(&self) -> f32 {
        lock(&self.setpoints).preferred
    }

    pub fn threshold(&self) -> f32 {
        lock(&self.setpoints).threshold
    }

    pub fn update_preferred_temperature(&self, value: f32) {
        lock(&self.setpoints).preferred = value;
        self.send(SetpointCommand::PreferredTemperature(value));
    }

    /// One threshold drives both bounds on the device.
    pub fn update_threshold(&self, value: f32) {
        lock(&self.setpoints).threshold = value;
        self.send(SetpointCommand::MaxThreshold(value));
        self.send(SetpointCommand::MinThreshold(value));
    }

    fn send(&self, command: SetpointCommand) {
        let mut writer = lock(&self.writer);
        let Some(out) = writer.as_mut() else {
            debug!("No coaster link attached, dropping {:?}", command);
            return;
        };

        let line = command.encode();
        let result = out.write_all(line.as_bytes()).and_then(|_| out.flush());
        match result {
            Ok(()) => trace!("Sent {}", line.trim_end()),
            Err(e) => error!("Failed to send {:?} to coaster: {}", command, e),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Open a serial device node for reading and writing.
pub fn open_device(path: &Path) -> AppResult<(File, File)> {
    let reader = OpenOptions::new().read(true).write(true).open(path)?;
    let writer = reader.try_clone()?;
    info!("Opened coaster device {:?}", path);
    Ok((reader, writer))
}

/// Publish temperatures read from `reader` until EOF, a read error, or shutdown.
///
/// Runs on the blocking pool. A read already in progress is not interrupted, so
/// shutdown is noticed after the next chunk arrives.
pub fn spawn_read_loop<R>(
    mut reader: R,
    sender: watch::Sender<f32>,
    shutdown: CancellationToken,
) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut buffer = [0u8; READ_BUFFER_SIZE];
        while !shutdown.is_cancelled() {
            let n = match reader.read(&mut buffer) {
                Ok(0) => {
                    info!("Coaster link closed");
                    break;
                }
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("Coaster link read failed: {}", e);
                    break;
                }
            };

            match parse_temperature(&buffer[..n]) {
                Some(temperature) => {
                    if sender.send(temperature).is_err() {
                        debug!("No temperature observers left");
                        break;
                    }
                }
                None => debug!("Skipping unparseable reading {:?}", String::from_utf8_lossy(&buffer[..n])),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(ErrorKind::BrokenPipe, "gone"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn controller() -> TemperatureController {
        let (_tx, rx) = watch::channel(0.0);
        TemperatureController::new(rx)
    }

    #[test]
    fn test_command_encoding() {
        assert_eq!(SetpointCommand::PreferredTemperature(40.0).encode(), "N140.0\n");
        assert_eq!(SetpointCommand::MaxThreshold(2.5).encode(), "N22.5\n");
        assert_eq!(SetpointCommand::MinThreshold(-1.0).encode(), "N3-1.0\n");
    }

    #[test]
    fn test_parse_temperature() {
        assert_eq!(parse_temperature(b"42.5"), Some(42.5));
        assert_eq!(parse_temperature(b" 38\r\n"), Some(38.0));
        assert_eq!(parse_temperature(b"hot"), None);
        assert_eq!(parse_temperature(b"NaN"), None);
        assert_eq!(parse_temperature(&[0xff, 0xfe]), None);
    }

    #[test]
    fn test_defaults() {
        let controller = controller();
        assert_eq!(controller.preferred_temperature(), 40.0);
        assert_eq!(controller.threshold(), 0.0);
        assert_eq!(controller.current_temperature(), 0.0);
    }

    #[test]
    fn test_update_threshold_sends_both_bounds() {
        let controller = controller();
        let out = SharedBuffer::default();
        controller.attach_writer(Box::new(out.clone()));

        controller.update_preferred_temperature(55.0);
        controller.update_threshold(3.0);

        assert_eq!(out.contents(), "N155.0\nN23.0\nN33.0\n");
        assert_eq!(controller.preferred_temperature(), 55.0);
        assert_eq!(controller.threshold(), 3.0);
    }

    #[test]
    fn test_updates_without_link_keep_state() {
        let controller = controller();
        controller.update_preferred_temperature(60.0);
        assert_eq!(controller.preferred_temperature(), 60.0);
    }

    #[test]
    fn test_write_failure_is_absorbed() {
        let controller = controller();
        controller.attach_writer(Box::new(BrokenPipe));
        controller.update_threshold(1.0);
        assert_eq!(controller.threshold(), 1.0);
    }

    #[tokio::test]
    async fn test_read_loop_publishes_latest_reading() {
        let (tx, rx) = watch::channel(0.0);
        let controller = TemperatureController::new(rx);

        let task = spawn_read_loop(Cursor::new(b"41.5".to_vec()), tx, CancellationToken::new());
        task.await.unwrap();

        assert_eq!(controller.current_temperature(), 41.5);
    }

    #[tokio::test]
    async fn test_read_loop_skips_garbage() {
        let (tx, rx) = watch::channel(12.0);
        let task = spawn_read_loop(Cursor::new(b"garbage".to_vec()), tx, CancellationToken::new());
        task.await.unwrap();

        assert_eq!(*rx.borrow(), 12.0);
    }

    #[tokio::test]
    async fn test_read_loop_honours_shutdown() {
        let (tx, rx) = watch::channel(0.0);
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        spawn_read_loop(Cursor::new(b"30.0".to_vec()), tx, shutdown).await.unwrap();
        assert_eq!(*rx.borrow(), 0.0);
    }
}
