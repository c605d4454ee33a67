use log::{debug, info};
use tokio::sync::watch;

use crate::audio::AudioManager;
use crate::error::{AppError, AppResult};
use crate::models::RingingAlert;
use crate::wake::AlarmSideEffects;

/// The user-visible "alarm is ringing" surface.
///
/// Holds at most one alert; a new alarm replaces the previous one. Observers
/// subscribe to a `watch` channel and tapping the alert maps to a stop intent.
#[derive(Clone)]
pub struct AlertBoard {
    sender: watch::Sender<Option<RingingAlert>>,
}

impl AlertBoard {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self { sender }
    }

    pub fn show(&self, alert: RingingAlert) {
        info!("Showing alert: {}", alert.title);
        self.sender.send_replace(Some(alert));
    }

    pub fn dismiss(&self) {
        if self.sender.send_replace(None).is_some() {
            debug!("Alert dismissed");
        }
    }

    pub fn current(&self) -> Option<RingingAlert> {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<RingingAlert>> {
        self.sender.subscribe()
    }
}

impl Default for AlertBoard {
    fn default() -> Self {
        Self::new()
    }
}

/// Alarm side effects backed by the audio loop and the alert board.
pub struct AlarmRinger {
    audio: AudioManager,
    board: AlertBoard,
}

impl AlarmRinger {
    pub fn new(audio: AudioManager, board: AlertBoard) -> Self {
        Self { audio, board }
    }

    pub fn board(&self) -> &AlertBoard {
        &self.board
    }

    pub fn audio(&self) -> &AudioManager {
        &self.audio
    }
}

impl AlarmSideEffects for AlarmRinger {
    fn start(&self, alarm_label: &str) -> AppResult<()> {
        // The alert goes up even when there is no sound device.
        self.board.show(RingingAlert::new(alarm_label));
        self.audio
            .start_ringing()
            .map_err(|e| AppError::audio(format!("{:#}", e)))
    }

    fn stop(&self) -> AppResult<()> {
        self.audio.stop_ringing();
        self.board.dismiss();
        Ok(())
    }
}
