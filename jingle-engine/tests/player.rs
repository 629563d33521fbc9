use std::collections::HashMap;

use jingle_core::automation::AutomationEvent;
use jingle_engine::backend::{NodeId, ParamKind, TestOp};
use jingle_engine::{ManualClock, MelodyEvent, Player, PlayerConfig, PlayerError, TestBackend};

type TestPlayer = Player<TestBackend, ManualClock>;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn player_with(cfg: PlayerConfig) -> (TestPlayer, TestBackend, ManualClock) {
    init_logs();
    let clock = ManualClock::new();
    let backend = TestBackend::with_clock(clock.clone());
    let probe = backend.clone();
    let p = Player::new(cfg, backend, clock.clone()).unwrap();
    (p, probe, clock)
}

fn three_note_config(tempo: f32) -> PlayerConfig {
    PlayerConfig {
        tempo,
        melody: Some(vec![
            MelodyEvent::new(440.0, 0.25),
            MelodyEvent::new(550.0, 0.5),
            MelodyEvent::new(660.0, 0.25),
        ]),
        ..PlayerConfig::default()
    }
}

/// Drive the clock from deadline to deadline up to `until`.
fn run_until(p: &mut TestPlayer, clock: &ManualClock, until: f64) {
    while let Some(d) = p.next_deadline() {
        if d > until {
            break;
        }
        clock.set(d);
        p.run_due();
        assert!(p.scheduler().armed_advances() <= 1, "two advancement chains at {d}");
    }
    clock.set(until);
    p.run_due();
}

/// `(start time, oscillator frequency)` of every note, in order.
fn notes(probe: &TestBackend) -> Vec<(f64, f32)> {
    let mut freq: HashMap<NodeId, f32> = HashMap::new();
    let mut out = Vec::new();
    for op in probe.operations() {
        match op {
            TestOp::CreateOscillator { node, freq_hz, .. } => {
                freq.insert(node, freq_hz);
            }
            TestOp::Start { node, at } => out.push((at, freq[&node])),
            _ => {}
        }
    }
    out
}

fn relative(freq: f32) -> f64 {
    match freq {
        f if f == 440.0 => 0.25,
        f if f == 550.0 => 0.5,
        _ => 0.25,
    }
}

#[test]
fn tempo_change_never_doubles_the_advancement_chain() {
    for (t1, t2) in [(120.0, 240.0), (60.0, 300.0), (300.0, 45.0), (90.0, 91.0)] {
        let (mut p, probe, clock) = player_with(three_note_config(t1));
        p.start().unwrap();
        run_until(&mut p, &clock, 0.8);
        let before = notes(&probe).len();

        p.set_tempo(t2);
        let commit = 0.8 + 0.15;
        run_until(&mut p, &clock, 6.0);

        let all = notes(&probe);
        let restart = all.iter().position(|(at, _)| (*at - commit).abs() < 1e-9).unwrap();
        assert!(restart >= before, "restart note for {t1}->{t2}");

        // before the change every gap is one old-tempo duration, after it one new-tempo duration
        for (k, pair) in all.windows(2).enumerate() {
            if k + 1 == restart {
                continue;
            }
            let tempo = if k + 1 < restart { t1 } else { t2 };
            let expected = relative(pair[0].1) * 120.0 / f64::from(tempo);
            let gap = pair[1].0 - pair[0].0;
            assert!((gap - expected).abs() < 1e-9, "{t1}->{t2}: gap {gap} != {expected} at note {k}");
        }
    }
}

#[test]
fn restart_resumes_at_the_melody_position() {
    let (mut p, probe, clock) = player_with(three_note_config(120.0));
    p.start().unwrap();
    // note 0 at 0.0, note 1 at 0.25; position is now 2
    run_until(&mut p, &clock, 0.3);
    p.set_tempo(60.0);
    run_until(&mut p, &clock, 0.5);
    let all = notes(&probe);
    assert_eq!(all.iter().map(|(_, f)| *f).collect::<Vec<_>>(), vec![440.0, 550.0, 660.0]);
    assert!((all[2].0 - 0.45).abs() < 1e-9);
    assert_eq!(p.tempo(), 60.0);
}

#[test]
fn stop_leaves_nothing_behind_from_any_state() {
    // idle
    let (mut p, probe, _) = player_with(PlayerConfig::default());
    p.stop();
    assert_eq!(p.active_sound_count(), 0);
    assert_eq!(p.pending_timer_count(), 0);
    assert!(probe.operations().is_empty());

    // playing, mid-note, with a tempo change pending
    let (mut p, probe, clock) = player_with(PlayerConfig::default());
    p.start().unwrap();
    run_until(&mut p, &clock, 0.6);
    p.set_tempo(200.0);
    clock.set(0.65);
    p.stop();
    assert!(!p.is_playing());
    assert_eq!(p.active_sound_count(), 0);
    assert_eq!(p.pending_timer_count(), 0);
    assert!(probe.live_nodes().is_empty());

    // nothing fires afterwards, and stopping again is harmless
    let ops = probe.operations().len();
    run_until(&mut p, &clock, 5.0);
    p.stop();
    assert_eq!(probe.operations().len(), ops);
    assert_eq!(p.tempo(), 200.0, "commit while stopped becomes the baseline");
}

#[test]
fn idle_changes_only_move_the_baseline() {
    let (mut p, probe, _) = player_with(PlayerConfig::default());
    p.set_volume(30.0);
    p.set_reverb(80.0);
    p.set_frequency_multiplier_base(880.0);
    assert!(probe.operations().is_empty());
    assert_eq!(p.volume(), 30.0);
    assert_eq!(p.reverb(), 80.0);

    p.start().unwrap();
    let ops = probe.operations();
    assert!(ops.iter().any(|op| matches!(op, TestOp::CreateGain { gain, .. } if *gain == 0.3)));
    assert!(ops.iter().any(|op| matches!(op, TestOp::CreateGain { gain, .. } if *gain == 0.8)));
    assert_eq!(probe.note_frequencies(), vec![329.63 * 2.0]);
}

#[test]
fn tempo_burst_commits_once_with_the_last_value() {
    let (mut p, probe, clock) = player_with(PlayerConfig { tempo: 100.0, ..PlayerConfig::default() });
    p.start().unwrap();
    for (at, bpm) in [(0.0, 60.0), (0.05, 90.0), (0.1, 120.0)] {
        clock.set(at);
        p.set_tempo(bpm);
        p.run_due();
    }
    clock.set(0.2);
    p.run_due();
    assert_eq!(p.tempo(), 100.0);
    clock.set(0.25);
    p.run_due();
    assert_eq!(p.tempo(), 120.0);
    assert_eq!(p.pending_tempo(), None);
    // the initial note plus exactly one restart
    assert_eq!(probe.note_starts().len(), 2);
}

#[test]
fn initial_tempo_is_not_a_change() {
    let (mut p, probe, clock) = player_with(PlayerConfig::default());
    p.start().unwrap();
    p.set_tempo(120.0);
    clock.set(0.2);
    p.run_due();
    assert_eq!(probe.note_starts().len(), 1);
}

#[test]
fn reference_pitch_leaves_melody_untouched() {
    let (mut p, probe, _) = player_with(PlayerConfig::default());
    p.start().unwrap();
    assert_eq!(probe.note_frequencies(), vec![329.63]);
}

#[test]
fn double_tempo_halves_durations() {
    let cfg = PlayerConfig {
        tempo: 240.0,
        melody: Some(vec![MelodyEvent::new(440.0, 0.25), MelodyEvent::new(440.0, 0.5)]),
        ..PlayerConfig::default()
    };
    let (mut p, probe, clock) = player_with(cfg);
    p.start().unwrap();
    run_until(&mut p, &clock, 0.2);

    let ops = probe.operations();
    let starts: HashMap<NodeId, f64> = probe.note_starts().into_iter().collect();
    let durations: Vec<f64> = ops
        .iter()
        .filter_map(|op| match op {
            TestOp::Stop { node, at } => Some(at - starts[node]),
            _ => None,
        })
        .collect();
    assert_eq!(durations, vec![0.125, 0.25]);
}

#[test]
fn full_reverb_keeps_half_the_dry_signal() {
    let (mut p, probe, _) = player_with(PlayerConfig { reverb: 100.0, ..PlayerConfig::default() });
    p.start().unwrap();
    let gains: Vec<f32> = probe
        .operations()
        .iter()
        .filter_map(|op| match op {
            TestOp::CreateGain { gain, .. } => Some(*gain),
            _ => None,
        })
        .collect();
    // master, dry, wet, then the first note's envelope
    assert_eq!(&gains[..3], &[0.5, 0.5, 1.0]);

    probe.clear();
    p.set_reverb(0.0);
    p.set_reverb(100.0);
    let targets: Vec<f32> = probe
        .operations()
        .iter()
        .filter_map(|op| match op {
            TestOp::Automate { event: AutomationEvent::SetTarget { target, .. }, .. } => Some(*target),
            _ => None,
        })
        .collect();
    assert_eq!(targets, vec![1.0, 0.0, 0.5, 1.0]);
}

#[test]
fn second_start_is_a_no_op() {
    let (mut p, probe, _) = player_with(PlayerConfig::default());
    p.start().unwrap();
    p.start().unwrap();
    assert!(p.is_playing());
    assert_eq!(probe.count(|op| matches!(op, TestOp::Open)), 1);
    assert_eq!(probe.count(|op| matches!(op, TestOp::CreateConvolver { .. })), 1);
    assert_eq!(probe.note_starts().len(), 1);
}

#[test]
fn failed_start_leaves_no_session() {
    let (mut p, probe, _) = player_with(PlayerConfig::default());
    probe.refuse_open("audio device busy");
    assert!(matches!(p.start(), Err(PlayerError::ResourceUnavailable(_))));
    assert!(!p.is_playing());
    assert_eq!(p.pending_timer_count(), 0);
    assert_eq!(p.active_sound_count(), 0);
    assert!(probe.live_nodes().is_empty());

    // a half-built graph is torn down too
    let (mut p, probe, _) = player_with(PlayerConfig::default());
    probe.fail_after_creates(3);
    assert!(p.start().is_err());
    assert!(!p.is_playing());
    assert!(probe.live_nodes().is_empty());
}

#[test]
fn live_pitch_change_retunes_sounding_notes() {
    let (mut p, probe, _) = player_with(PlayerConfig::default());
    p.start().unwrap();
    probe.clear();
    p.set_frequency_multiplier_base(220.0);
    let ops = probe.operations();
    assert_eq!(ops.len(), 1);
    assert!(matches!(
        ops[0],
        TestOp::Automate {
            param: ParamKind::Frequency,
            event: AutomationEvent::SetTarget { target, .. },
            ..
        } if target == 329.63 * 0.5
    ));
}

#[test]
fn pitch_change_during_overlap_retunes_both_notes() {
    let cfg = PlayerConfig {
        tempo: 120.0,
        frequency: 440.0,
        base_frequency: 440.0,
        melody: Some(vec![MelodyEvent::new(400.0, 0.25), MelodyEvent::new(500.0, 0.25)]),
        ..PlayerConfig::default()
    };
    let (mut p, probe, clock) = player_with(cfg);
    p.start().unwrap();
    // note 1 starts at 0.25 while note 0 is still in its release grace
    clock.set(0.25);
    p.run_due();
    assert_eq!(p.active_sound_count(), 2);

    probe.clear();
    p.set_frequency_multiplier_base(880.0);
    let targets: Vec<f32> = probe
        .operations()
        .iter()
        .filter_map(|op| match op {
            TestOp::Automate { param: ParamKind::Frequency, event: AutomationEvent::SetTarget { target, .. }, .. } => {
                Some(*target)
            }
            _ => None,
        })
        .collect();
    assert_eq!(targets, vec![800.0, 1000.0]);
}
