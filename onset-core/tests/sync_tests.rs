mod common;

use common::{Call, ScriptedAudio};
use onset_core::error::OnsetError;
use onset_core::sync::{SyncNotice, SyncPhase, SyncSettings, Synchronizer};

/// Selects `device` and ticks until the startup sequence has finished.
fn started(devices: &[&str], device: &str) -> (Synchronizer, ScriptedAudio, u64) {
    let mut audio = ScriptedAudio::new(devices);
    let mut sync = Synchronizer::new(SyncSettings::default());
    sync.switch_device(&mut audio, device).unwrap();

    let mut now = 0;
    while sync.phase() != &SyncPhase::Idle || !audio.playing {
        now += 16;
        sync.tick(&mut audio, now);
        assert!(now < 16 * 50, "startup sequence did not finish");
    }
    audio.calls.clear();
    (sync, audio, now)
}

#[test]
fn test_unknown_device_falls_back_to_first() {
    let mut audio = ScriptedAudio::new(&["Mic A"]);
    let mut sync = Synchronizer::default();

    let selection = sync.select_device(&mut audio, "Mic B").unwrap();

    assert_eq!(selection.device, "Mic A");
    assert!(matches!(selection.fallback, Some(OnsetError::DeviceNotFound(ref name)) if name == "Mic B"));
    assert_eq!(sync.device(), Some("Mic A"));
}

#[test]
fn test_select_device_without_any_device() {
    let mut audio = ScriptedAudio::new(&[]);
    let mut sync = Synchronizer::default();
    assert!(matches!(
        sync.select_device(&mut audio, "Mic A"),
        Err(OnsetError::NoInputDevices)
    ));
}

#[test]
fn test_switch_to_unknown_device_leaves_state_untouched() {
    let (mut sync, mut audio, _) = started(&["Mic A"], "Mic A");
    let before = sync.state().clone();

    let result = sync.switch_device(&mut audio, "Mic B");

    assert!(matches!(result, Err(OnsetError::DeviceNotFound(_))));
    assert_eq!(sync.state(), &before);
    assert_eq!(sync.device(), Some("Mic A"));
    assert_eq!(sync.phase(), &SyncPhase::Idle);
    assert!(audio.calls.is_empty());
}

#[test]
fn test_zero_sample_rate_is_rejected() {
    let mut audio = ScriptedAudio::new(&["Broken"]);
    audio.sample_rates.insert("Broken".into(), 0);
    let mut sync = Synchronizer::default();

    assert!(matches!(
        sync.switch_device(&mut audio, "Broken"),
        Err(OnsetError::InvalidSampleRate(0))
    ));
    assert_eq!(sync.device(), None);
    assert_eq!(sync.state().capture_sample_rate, 0);
}

#[test]
fn test_startup_sequence_one_step_per_tick() {
    let mut audio = ScriptedAudio::new(&["Mic A"]);
    let mut sync = Synchronizer::default();
    audio.capture_pos = 24_000;
    sync.switch_device(&mut audio, "Mic A").unwrap();
    assert_eq!(sync.phase(), &SyncPhase::AwaitingRelease);
    assert!(audio.calls.is_empty());

    let notice = sync.tick(&mut audio, 100);
    assert!(matches!(notice, Some(SyncNotice::CaptureStarted { sample_rate: 48_000, .. })));
    assert_eq!(audio.calls, vec![Call::Start("Mic A".into())]);
    assert_eq!(sync.state().capture_start_timestamp, Some(100));

    sync.tick(&mut audio, 116);
    assert_eq!(sync.phase(), &SyncPhase::Settling);

    sync.tick(&mut audio, 132);
    assert_eq!(audio.calls.last(), Some(&Call::Stop));
    assert!(matches!(sync.phase(), SyncPhase::Stopped { .. }));

    sync.tick(&mut audio, 148);
    assert_eq!(audio.calls.last(), Some(&Call::Seek(0.5)));
    assert_eq!(sync.phase(), &SyncPhase::Seeked);
    assert!(!audio.playing);

    let notice = sync.tick(&mut audio, 164);
    assert!(matches!(notice, Some(SyncNotice::ResyncComplete)));
    assert_eq!(audio.calls.last(), Some(&Call::Play));
    assert!(audio.playing);
    assert_eq!(sync.phase(), &SyncPhase::Idle);
}

#[test]
fn test_drift_triggers_exactly_one_resync() {
    let (mut sync, mut audio, mut now) = started(&["Mic A"], "Mic A");
    audio.set_positions(5.0, 0.3);

    let mut notices = Vec::new();
    for _ in 0..10 {
        now += 16;
        if let Some(notice) = sync.tick(&mut audio, now) {
            notices.push(notice);
        }
    }

    assert_eq!(audio.calls, vec![Call::Stop, Call::Seek(5.0), Call::Play]);
    assert!(matches!(notices[0], SyncNotice::ResyncStarted { offset } if (offset - 0.3).abs() < 1e-3));
    assert!(matches!(notices[1], SyncNotice::ResyncComplete));
    assert_eq!(notices.len(), 2);
    assert!(sync.state().current_playback_offset.abs() < 1e-4);
    assert!(audio.playing);
}

#[test]
fn test_offset_within_tolerance_is_left_alone() {
    let (mut sync, mut audio, mut now) = started(&["Mic A"], "Mic A");
    audio.set_positions(5.0, -0.2);

    for _ in 0..10 {
        now += 16;
        assert!(sync.tick(&mut audio, now).is_none());
    }
    assert!(audio.calls.is_empty());
    assert!((sync.state().current_playback_offset + 0.2).abs() < 1e-3);
}

#[test]
fn test_forced_resync_is_one_shot() {
    let (mut sync, mut audio, mut now) = started(&["Mic A"], "Mic A");
    audio.set_positions(2.0, 0.0);

    sync.request_resync();
    assert!(sync.state().force_resync_requested);
    for _ in 0..10 {
        now += 16;
        sync.tick(&mut audio, now);
    }

    assert_eq!(audio.calls, vec![Call::Stop, Call::Seek(2.0), Call::Play]);
    assert!(!sync.state().force_resync_requested);
}

#[test]
fn test_no_resync_while_playback_is_stopped() {
    let (mut sync, mut audio, mut now) = started(&["Mic A"], "Mic A");
    audio.playing = false;
    audio.set_positions(5.0, 3.0);

    for _ in 0..5 {
        now += 16;
        sync.tick(&mut audio, now);
    }
    assert!(audio.calls.is_empty());
    assert!((sync.state().current_playback_offset - 3.0).abs() < 1e-3);
}

#[test]
fn test_device_start_timeout_is_not_fatal() {
    let mut audio = ScriptedAudio::new(&["Slow Mic"]);
    audio.start_delay_polls = u32::MAX;
    let mut sync = Synchronizer::default();
    sync.switch_device(&mut audio, "Slow Mic").unwrap();

    let mut timeouts = Vec::new();
    for tick in 0..200u64 {
        if let Some(SyncNotice::DeviceStartTimeout(err)) = sync.tick(&mut audio, tick * 16) {
            timeouts.push(err);
        }
    }

    assert_eq!(timeouts.len(), 1);
    assert!(matches!(
        &timeouts[0],
        OnsetError::DeviceStartTimeout { attempts: 100, device } if device == "Slow Mic"
    ));
    // Processing carried on: playback was still started
    assert_eq!(audio.count(&Call::Play), 1);
    assert!(audio.playing);
    assert_eq!(sync.phase(), &SyncPhase::Idle);
}

#[test]
fn test_slow_device_is_picked_up_within_budget() {
    let mut audio = ScriptedAudio::new(&["Mic A"]);
    audio.start_delay_polls = 5;
    let mut sync = Synchronizer::default();
    sync.switch_device(&mut audio, "Mic A").unwrap();

    let mut saw_timeout = false;
    for tick in 0..20u64 {
        if let Some(SyncNotice::DeviceStartTimeout(_)) = sync.tick(&mut audio, tick) {
            saw_timeout = true;
        }
    }
    assert!(!saw_timeout);
    assert!(audio.playing);
}

#[test]
fn test_device_switch_cancels_in_flight_resync() {
    let (mut sync, mut audio, mut now) = started(&["Mic A", "Mic B"], "Mic A");
    audio.set_positions(5.0, 1.0);

    now += 16;
    sync.tick(&mut audio, now);
    assert!(matches!(sync.phase(), SyncPhase::Stopped { .. }));

    sync.switch_device(&mut audio, "Mic B").unwrap();
    assert_eq!(audio.calls, vec![Call::Stop, Call::Stop, Call::Unload, Call::Dispose]);
    assert_eq!(sync.phase(), &SyncPhase::AwaitingRelease);

    audio.capture_pos = 0;
    for _ in 0..10 {
        now += 16;
        sync.tick(&mut audio, now);
    }

    // The old target (5.0 s) is never sought; the new device starts first
    assert_eq!(
        audio.calls[4..],
        [Call::Start("Mic B".into()), Call::Stop, Call::Seek(0.0), Call::Play]
    );
    assert_eq!(sync.device(), Some("Mic B"));
}

#[test]
fn test_offset_is_current_on_notice_ticks() {
    let mut audio = ScriptedAudio::new(&["Mic A"]);
    let mut sync = Synchronizer::default();
    audio.capture_pos = 24_000;
    audio.playback = 2.0;
    sync.switch_device(&mut audio, "Mic A").unwrap();

    let notice = sync.tick(&mut audio, 0);
    assert!(matches!(notice, Some(SyncNotice::CaptureStarted { .. })));
    assert!((sync.state().current_playback_offset - 1.5).abs() < 1e-4);

    // Settle, stop, seek
    for now in 1..=3 {
        sync.tick(&mut audio, now);
    }
    assert_eq!(sync.phase(), &SyncPhase::Seeked);

    // Drift appears between the seek and the play step
    audio.playback += 0.1;
    let notice = sync.tick(&mut audio, 4);
    assert!(matches!(notice, Some(SyncNotice::ResyncComplete)));
    assert!((sync.state().current_playback_offset - 0.1).abs() < 1e-4);
}

#[test]
fn test_tighter_tolerance_triggers_resync() {
    let (mut sync, mut audio, mut now) = started(&["Mic A"], "Mic A");
    audio.set_positions(5.0, 0.2);

    now += 16;
    assert!(sync.tick(&mut audio, now).is_none());

    sync.set_max_allowed_offset(0.1);
    assert_eq!(sync.state().max_allowed_offset, 0.1);
    now += 16;
    assert!(matches!(sync.tick(&mut audio, now), Some(SyncNotice::ResyncStarted { .. })));
    assert_eq!(audio.calls, vec![Call::Stop]);
}
