use coastercompanion::{AlarmRinger, AlarmSideEffects, AlertBoard, AudioManager};
use std::fs::File;
use std::io::Write;
use tempfile::TempDir;
use tokio_test::assert_ok;

#[test]
fn test_audio_manager_full_workflow() {
    let manager = AudioManager::new_dummy();

    // Test volume changes
    manager.set_volume(0.5);
    assert_eq!(manager.get_volume(), 0.5);

    // Test volume boundaries
    manager.set_volume(1.2);
    assert_eq!(manager.get_volume(), 1.0);

    manager.set_volume(-0.1);
    assert_eq!(manager.get_volume(), 0.0);

    // Ring, restart and stop without a device
    manager.start_ringing().unwrap();
    manager.start_ringing().unwrap();
    assert!(manager.is_ringing());
    manager.stop_ringing();
    assert!(!manager.is_ringing());
}

#[test]
fn test_sound_file_configuration() {
    let manager = AudioManager::new_dummy();
    let temp_dir = TempDir::new().unwrap();

    let alarm_sound = temp_dir.path().join("alarm.wav");
    let mut file = File::create(&alarm_sound).unwrap();
    file.write_all(&[0; 44]).unwrap(); // Minimal WAV header

    manager.set_sound_file(Some(alarm_sound.clone()));
    assert_eq!(manager.sound_file(), Some(alarm_sound));

    manager.set_sound_file(None);
    assert!(manager.sound_file().is_none());
}

#[tokio::test]
async fn test_ringer_drives_board_and_audio_together() {
    let board = AlertBoard::new();
    let mut alerts = board.subscribe();
    let ringer = AlarmRinger::new(AudioManager::new_dummy(), board.clone());

    assert_ok!(ringer.start("Coffee"));
    alerts.changed().await.unwrap();
    assert_eq!(
        alerts.borrow_and_update().as_ref().map(|a| a.title.clone()),
        Some("Coffee Alarm".to_string())
    );
    assert!(ringer.audio().is_ringing());

    // A second alarm replaces the first alert.
    ringer.start("Hydrate").unwrap();
    assert_eq!(board.current().unwrap().alarm_label, "Hydrate");

    assert_ok!(ringer.stop());
    assert_ok!(ringer.stop());
    assert!(board.current().is_none());
    assert!(!ringer.audio().is_ringing());
}
