//! Note scheduler: the melody loop state machine.
//!
//! States are `Idle` and `Looping(PlaybackSession)`.
//!
//! - `start` builds the graph, produces note 0 and arms the advance timer.
//! - An advance timer produces the note at the session's melody position and
//!   arms the next one, so exactly one advancement chain exists per session.
//! - `restart_at_current` (tempo commit) bumps the session generation,
//!   cancels the armed advance timer and produces the note at the current
//!   position right away with the new tempo.
//! - `stop` cancels every session timer, frees in-flight notes and releases
//!   the graph.
//!
//! Timer actions are tagged records carrying the session id and generation
//! they were armed under. A timer that fires after its session was stopped or
//! restarted no longer matches and is dropped.

use log::{debug, info, trace, warn};

use jingle_core::envelopes::NoteEnvelope;

use crate::backend::{AudioBackend, BackendResult, NodeId, ParamKind, Port};
use crate::config::{ImpulseConfig, PlayerConfig};
use crate::error::PlayerResult;
use crate::graph::{build_graph, release_graph, GraphHandles};
use crate::melody::Melody;
use crate::nodes::Wave;
use crate::reverb::generate_impulse;
use crate::timer::TimerQueue;

/// Extra time a finished note stays registered so its release tail is
/// covered even when the audio clock runs slightly behind the timer clock.
pub const RELEASE_GRACE_S: f64 = 0.02;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

/// Action attached to a session timer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SessionTimer {
    /// Produce the note at the session's melody position.
    Advance { session: SessionId, generation: u64 },
    /// A note finished; drop its handle and free its nodes.
    NoteEnded { session: SessionId, oscillator: NodeId },
}

/// One in-flight note.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ActiveSoundHandle {
    /// Melody pitch before the pitch multiplier.
    pub base_frequency_hz: f32,
    pub oscillator: NodeId,
    pub envelope: NodeId,
    /// Timer-clock time at which the note is over.
    pub ends_at: f64,
}

/// Live values the scheduler reads when producing a note.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Controls {
    /// Master gain, 0..=1.
    pub volume: f32,
    /// Pitch base in Hz.
    pub pitch_hz: f32,
    /// Committed tempo in BPM.
    pub tempo_bpm: f32,
    /// Reverb amount, 0..=1.
    pub reverb_mix: f32,
}

/// Fixed parameters of the loop.
#[derive(Clone, Debug, PartialEq)]
pub struct SchedulerSettings {
    pub base_frequency_hz: f32,
    pub reference_tempo_bpm: f32,
    pub envelope: NoteEnvelope,
    pub wave: Wave,
    pub impulse: ImpulseConfig,
}

impl SchedulerSettings {
    pub fn from_config(cfg: &PlayerConfig) -> Self {
        Self {
            base_frequency_hz: cfg.base_frequency,
            reference_tempo_bpm: cfg.reference_tempo,
            envelope: NoteEnvelope::new(cfg.timing.attack_ms / 1000.0, cfg.timing.release_ms / 1000.0),
            wave: cfg.wave,
            impulse: cfg.impulse.clone(),
        }
    }
}

/// State owned by a running loop.
#[derive(Clone, Debug)]
pub struct PlaybackSession {
    id: SessionId,
    generation: u64,
    graph: GraphHandles,
    current_event_index: usize,
    active: Vec<ActiveSoundHandle>,
}

impl PlaybackSession {
    #[inline] pub fn id(&self) -> SessionId { self.id }
    #[inline] pub fn generation(&self) -> u64 { self.generation }
    #[inline] pub fn graph(&self) -> &GraphHandles { &self.graph }
    /// Melody position: the index the loop produces next.
    #[inline] pub fn current_event_index(&self) -> usize { self.current_event_index }
    #[inline] pub fn active_sounds(&self) -> &[ActiveSoundHandle] { &self.active }
}

#[derive(Debug)]
enum SchedulerState {
    Idle,
    Looping(PlaybackSession),
}

/// `pitch_hz / base_hz`; 1.0 leaves the melody untransposed.
#[inline]
pub fn pitch_multiplier(pitch_hz: f32, base_hz: f32) -> f32 {
    pitch_hz / base_hz
}

/// Note length in seconds: `relative * (reference_tempo / tempo)`.
#[inline]
pub fn note_duration(relative: f32, reference_tempo_bpm: f32, tempo_bpm: f32) -> f64 {
    f64::from(relative) * (f64::from(reference_tempo_bpm) / f64::from(tempo_bpm))
}

/// Create, wire and start the oscillator + envelope pair for one note.
fn spawn_voice<B: AudioBackend + ?Sized>(
    backend: &mut B,
    master: NodeId,
    wave: Wave,
    freq_hz: f32,
    envelope: &NoteEnvelope,
    start: f64,
    duration: f64,
) -> BackendResult<(NodeId, NodeId)> {
    let oscillator = backend.create_oscillator(wave, freq_hz)?;
    let gain = match backend.create_gain(0.0) {
        Ok(g) => g,
        Err(e) => {
            let _ = backend.free_node(oscillator);
            return Err(e);
        }
    };
    if let Err(e) = wire_voice(backend, master, oscillator, gain, envelope, start, duration) {
        let _ = backend.free_node(oscillator);
        let _ = backend.free_node(gain);
        return Err(e);
    }
    Ok((oscillator, gain))
}

fn wire_voice<B: AudioBackend + ?Sized>(
    backend: &mut B,
    master: NodeId,
    oscillator: NodeId,
    gain: NodeId,
    envelope: &NoteEnvelope,
    start: f64,
    duration: f64,
) -> BackendResult {
    backend.connect(oscillator, Port::Node(gain))?;
    backend.connect(gain, Port::Node(master))?;
    for ev in envelope.events(start, duration) {
        backend.automate(gain, ParamKind::Gain, ev)?;
    }
    backend.start_node(oscillator, start)?;
    backend.stop_node(oscillator, start + duration)
}

/// The melody loop.
#[derive(Debug)]
pub struct NoteScheduler<B: AudioBackend> {
    backend: B,
    melody: Melody,
    settings: SchedulerSettings,
    controls: Controls,
    timers: TimerQueue<SessionTimer>,
    state: SchedulerState,
    sessions_started: u64,
}

impl<B: AudioBackend> NoteScheduler<B> {
    pub fn new(backend: B, melody: Melody, settings: SchedulerSettings, controls: Controls) -> Self {
        Self {
            backend,
            melody,
            settings,
            controls,
            timers: TimerQueue::new(),
            state: SchedulerState::Idle,
            sessions_started: 0,
        }
    }

    #[inline] pub fn is_looping(&self) -> bool { matches!(self.state, SchedulerState::Looping(_)) }

    pub fn session(&self) -> Option<&PlaybackSession> {
        match &self.state {
            SchedulerState::Looping(s) => Some(s),
            SchedulerState::Idle => None,
        }
    }

    /// Backend and session together, for live modulation.
    pub fn live_parts(&mut self) -> Option<(&mut B, &PlaybackSession)> {
        match &self.state {
            SchedulerState::Looping(s) => Some((&mut self.backend, s)),
            SchedulerState::Idle => None,
        }
    }

    #[inline] pub fn controls(&self) -> &Controls { &self.controls }
    #[inline] pub fn controls_mut(&mut self) -> &mut Controls { &mut self.controls }
    #[inline] pub fn settings(&self) -> &SchedulerSettings { &self.settings }
    #[inline] pub fn melody(&self) -> &Melody { &self.melody }
    #[inline] pub fn backend(&self) -> &B { &self.backend }
    #[inline] pub fn backend_mut(&mut self) -> &mut B { &mut self.backend }

    /// Session timers still armed (advance + note completion).
    #[inline] pub fn pending_timers(&self) -> usize { self.timers.len() }

    /// Advance timers still armed; at most one while looping.
    pub fn armed_advances(&self) -> usize {
        self.timers.count_where(|t| matches!(t, SessionTimer::Advance { .. }))
    }

    pub fn next_deadline(&self) -> Option<f64> { self.timers.next_deadline() }

    /// Idle → Looping. No-op while already looping.
    pub fn start(&mut self, now: f64) -> PlayerResult {
        if self.is_looping() {
            debug!("start ignored: already playing");
            return Ok(());
        }
        let ImpulseConfig { seconds, decay } = self.settings.impulse;
        let graph = build_graph(&mut self.backend, self.controls.volume, self.controls.reverb_mix, |sr| {
            generate_impulse(seconds, decay, sr)
        })?;
        self.sessions_started += 1;
        self.state = SchedulerState::Looping(PlaybackSession {
            id: SessionId(self.sessions_started),
            generation: 0,
            graph,
            current_event_index: 0,
            active: Vec::new(),
        });
        info!(
            "playing {} notes at {} BPM, pitch base {} Hz",
            self.melody.len(),
            self.controls.tempo_bpm,
            self.controls.pitch_hz
        );
        self.produce_note(now);
        Ok(())
    }

    /// Any state → Idle. Never fails.
    pub fn stop(&mut self) {
        let SchedulerState::Looping(session) = std::mem::replace(&mut self.state, SchedulerState::Idle) else {
            return;
        };
        self.timers.clear();
        for h in &session.active {
            let _ = self.backend.free_node(h.oscillator);
            let _ = self.backend.free_node(h.envelope);
        }
        release_graph(&mut self.backend, session.graph);
        info!("stopped at melody position {}", session.current_event_index);
    }

    /// Drop the armed advancement chain and resume at the current melody
    /// position with the current (newly committed) tempo.
    pub fn restart_at_current(&mut self, now: f64) {
        let SchedulerState::Looping(session) = &mut self.state else {
            return;
        };
        session.generation += 1;
        let id = session.id;
        let cancelled = self
            .timers
            .cancel_where(|t| matches!(t, SessionTimer::Advance { session, .. } if *session == id));
        info!(
            "tempo {} BPM: resuming at note {} ({cancelled} advance timer(s) cancelled)",
            self.controls.tempo_bpm, session.current_event_index
        );
        self.produce_note(now);
    }

    /// Fire the earliest due timer, if any. Returns whether one fired.
    pub fn fire_due(&mut self, now: f64) -> bool {
        let Some((_, action)) = self.timers.pop_due(now) else {
            return false;
        };
        match action {
            SessionTimer::Advance { session, generation } => {
                let current = matches!(
                    &self.state,
                    SchedulerState::Looping(s) if s.id == session && s.generation == generation
                );
                if current {
                    self.produce_note(now);
                } else {
                    trace!("stale advance timer for {session:?} gen {generation} discarded");
                }
            }
            SessionTimer::NoteEnded { session, oscillator } => self.finish_note(session, oscillator),
        }
        true
    }

    fn finish_note(&mut self, session: SessionId, oscillator: NodeId) {
        let SchedulerState::Looping(s) = &mut self.state else {
            trace!("note end for {session:?} after stop discarded");
            return;
        };
        if s.id != session {
            trace!("note end for {session:?} discarded");
            return;
        }
        if let Some(pos) = s.active.iter().position(|h| h.oscillator == oscillator) {
            let h = s.active.remove(pos);
            let _ = self.backend.free_node(h.oscillator);
            let _ = self.backend.free_node(h.envelope);
        }
    }

    /// Produce the note at the melody position and arm the next advance.
    ///
    /// Checks at call time that a loop is still wanted.
    fn produce_note(&mut self, now: f64) {
        let SchedulerState::Looping(session) = &mut self.state else {
            return;
        };
        let index = session.current_event_index;
        let ev = self.melody.event(index);
        let freq = ev.pitch_hz * pitch_multiplier(self.controls.pitch_hz, self.settings.base_frequency_hz);
        let duration =
            note_duration(ev.relative_duration, self.settings.reference_tempo_bpm, self.controls.tempo_bpm);
        let start = self.backend.current_time();
        debug!("note {index}: {freq:.2} Hz, tempo {} BPM, duration {duration:.3} s", self.controls.tempo_bpm);

        match spawn_voice(
            &mut self.backend,
            session.graph.master,
            self.settings.wave,
            freq,
            &self.settings.envelope,
            start,
            duration,
        ) {
            Ok((oscillator, envelope)) => {
                let ends_at = now + duration;
                session.active.push(ActiveSoundHandle {
                    base_frequency_hz: ev.pitch_hz,
                    oscillator,
                    envelope,
                    ends_at,
                });
                self.timers.arm(ends_at + RELEASE_GRACE_S, SessionTimer::NoteEnded { session: session.id, oscillator });
            }
            Err(e) => warn!("note {index} skipped: {e}"),
        }

        session.current_event_index = self.melody.next_index(index);
        self.timers.arm(now + duration, SessionTimer::Advance { session: session.id, generation: session.generation });
    }
}
