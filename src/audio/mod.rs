use rodio::{Decoder, OutputStream, Sink, Source};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use log::{info, error, warn, debug};
use anyhow::{Result, Context};

pub const DEFAULT_VOLUME: f32 = 0.7;

/// Plays the alarm sound on a loop until told to stop.
///
/// `rodio::OutputStream` is not `Send`, so each ring owns a dedicated thread that
/// opens the stream, plays, and parks on a stop channel.
#[derive(Clone)]
pub struct AudioManager {
    volume: Arc<Mutex<f32>>,
    sound_file: Arc<Mutex<Option<PathBuf>>>,
    ringing: Arc<Mutex<Option<Ringing>>>,
    output_enabled: bool,
}

struct Ringing {
    stop: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl AudioManager {
    pub fn new(sound_file: Option<PathBuf>, volume: f32) -> Self {
        info!("Initializing audio system");

        AudioManager {
            volume: Arc::new(Mutex::new(volume.clamp(0.0, 1.0))),
            sound_file: Arc::new(Mutex::new(sound_file)),
            ringing: Arc::new(Mutex::new(None)),
            output_enabled: true,
        }
    }

    /// Create a dummy audio manager that tracks ringing state but never opens a device.
    /// Used when no output is available and in tests.
    pub fn new_dummy() -> Self {
        warn!("Using dummy audio manager - alarm sounds will be silent");

        AudioManager {
            volume: Arc::new(Mutex::new(0.0)),
            sound_file: Arc::new(Mutex::new(None)),
            ringing: Arc::new(Mutex::new(None)),
            output_enabled: false,
        }
    }

    pub fn set_volume(&self, volume: f32) {
        let vol = volume.clamp(0.0, 1.0);
        *lock(&self.volume) = vol;
        info!("Set audio volume to {:.0}%", vol * 100.0);
    }

    pub fn get_volume(&self) -> f32 {
        *lock(&self.volume)
    }

    pub fn set_sound_file(&self, sound_file: Option<PathBuf>) {
        *lock(&self.sound_file) = sound_file;
        info!("Updated alarm sound path");
    }

    pub fn sound_file(&self) -> Option<PathBuf> {
        lock(&self.sound_file).clone()
    }

    pub fn is_ringing(&self) -> bool {
        match lock(&self.ringing).as_ref() {
            Some(ringing) => ringing.thread.as_ref().map_or(true, |t| !t.is_finished()),
            None => false,
        }
    }

    /// Start looping the alarm sound. Restarts from the top if already ringing.
    pub fn start_ringing(&self) -> Result<()> {
        self.stop_ringing();

        let (stop, stop_rx) = mpsc::channel();
        let thread = if self.output_enabled {
            let sound_file = self.sound_file();
            let volume = self.get_volume();
            let handle = thread::Builder::new()
                .name("alarm-audio".to_string())
                .spawn(move || {
                    if let Err(e) = Self::ring_until_stopped(sound_file.as_deref(), volume, stop_rx) {
                        error!("Alarm sound failed: {:#}", e);
                    }
                })
                .context("Failed to spawn audio thread")?;
            Some(handle)
        } else {
            debug!("Dummy audio: ringing silently");
            None
        };

        *lock(&self.ringing) = Some(Ringing { stop, thread });
        Ok(())
    }

    /// Silence the alarm. Safe to call when nothing is playing.
    pub fn stop_ringing(&self) {
        let Some(ringing) = lock(&self.ringing).take() else {
            return;
        };

        let _ = ringing.stop.send(());
        if let Some(thread) = ringing.thread {
            if thread.join().is_err() {
                error!("Audio thread panicked");
            }
        }
        debug!("Alarm sound stopped");
    }

    fn ring_until_stopped(sound_file: Option<&Path>, volume: f32, stop: Receiver<()>) -> Result<()> {
        let (_stream, stream_handle) = OutputStream::try_default()
            .context("Failed to create audio output stream")?;
        let sink = Sink::try_new(&stream_handle)?;

        match sound_file.filter(|path| path.exists()) {
            Some(path) => {
                debug!("Playing sound file: {:?}", path);
                let file = File::open(path).context("Failed to open sound file")?;
                let source = Decoder::new(BufReader::new(file))
                    .context("Failed to decode sound file")?
                    .repeat_infinite()
                    .convert_samples::<f32>()
                    .amplify(volume);
                sink.append(source);
            }
            None => {
                warn!("Playing default tone (no sound file found)");
                let source = rodio::source::SineWave::new(880.0)
                    .take_duration(Duration::from_millis(400))
                    .delay(Duration::from_millis(400))
                    .repeat_infinite()
                    .amplify(volume * 0.3);
                sink.append(source);
            }
        }

        // Err means the manager was dropped; stop either way.
        let _ = stop.recv();
        sink.stop();
        Ok(())
    }
}

impl Default for AudioManager {
    fn default() -> Self {
        Self::new(None, DEFAULT_VOLUME)
    }
}
