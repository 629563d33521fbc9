//! The public player: lifecycle, live controls and the tempo debouncer on top
//! of the note scheduler.
//!
//! `Player` is single-threaded. A driver calls [`Player::run_due`] whenever
//! [`Player::next_deadline`] has passed on the player's clock; the
//! [`runtime`](crate::runtime) module does this on a dedicated thread, the
//! offline renderer does it between audio blocks.

use log::{info, warn};

use crate::backend::AudioBackend;
use crate::config::{PlayerConfig, FREQUENCY_RANGE, REVERB_RANGE, TEMPO_RANGE, VOLUME_RANGE};
use crate::error::PlayerResult;
use crate::modulator::Modulator;
use crate::scheduler::{pitch_multiplier, Controls, NoteScheduler, SchedulerSettings};
use crate::tempo::TempoDebouncer;
use crate::timer::Clock;

/// Clamp a knob value, rejecting NaN and infinities.
fn knob(name: &str, v: f32, (lo, hi): (f32, f32)) -> Option<f32> {
    if !v.is_finite() {
        warn!("{name} {v} ignored");
        return None;
    }
    let c = v.clamp(lo, hi);
    if c != v {
        warn!("{name} {v} clamped to {c}");
    }
    Some(c)
}

pub struct Player<B: AudioBackend, C: Clock> {
    clock: C,
    scheduler: NoteScheduler<B>,
    modulator: Modulator,
    tempo: TempoDebouncer,
    // user-facing 0..=100 values; the scheduler holds them normalized
    volume: f32,
    reverb: f32,
}

impl<B: AudioBackend, C: Clock> Player<B, C> {
    /// Build an idle player. Initial values come from `config` and are
    /// clamped like live input; none of them counts as a change.
    pub fn new(config: PlayerConfig, backend: B, clock: C) -> PlayerResult<Self> {
        config.validate()?;
        let melody = config.melody()?;
        let volume = knob("volume", config.volume, VOLUME_RANGE).unwrap_or(50.0);
        let reverb = knob("reverb", config.reverb, REVERB_RANGE).unwrap_or(0.0);
        let pitch_hz = knob("frequency", config.frequency, FREQUENCY_RANGE).unwrap_or(config.base_frequency);
        let tempo_bpm = knob("tempo", config.tempo, TEMPO_RANGE).unwrap_or(config.reference_tempo);

        let controls = Controls { volume: volume / 100.0, pitch_hz, tempo_bpm, reverb_mix: reverb / 100.0 };
        let scheduler = NoteScheduler::new(backend, melody, SchedulerSettings::from_config(&config), controls);
        Ok(Self {
            clock,
            scheduler,
            modulator: Modulator::from_timing(&config.timing),
            tempo: TempoDebouncer::new(tempo_bpm, config.timing.debounce_ms / 1000.0),
            volume,
            reverb,
        })
    }

    /// Begin looping the melody from its first note. No-op when playing.
    pub fn start(&mut self) -> PlayerResult {
        let now = self.clock.now();
        self.scheduler.start(now)
    }

    /// Silence and release everything. No-op when stopped.
    pub fn stop(&mut self) {
        self.scheduler.stop();
    }

    #[inline] pub fn is_playing(&self) -> bool { self.scheduler.is_looping() }

    /// Master volume, 0..=100.
    pub fn set_volume(&mut self, volume: f32) {
        let Some(v) = knob("volume", volume, VOLUME_RANGE) else { return };
        self.volume = v;
        self.scheduler.controls_mut().volume = v / 100.0;
        if let Some((backend, session)) = self.scheduler.live_parts() {
            if let Err(e) = self.modulator.apply_volume(backend, session, v / 100.0) {
                warn!("volume change not applied: {e}");
            }
        }
    }

    /// Pitch base in Hz; the melody is transposed by `hz / base_frequency`.
    pub fn set_frequency_multiplier_base(&mut self, hz: f32) {
        let Some(f) = knob("frequency", hz, FREQUENCY_RANGE) else { return };
        self.scheduler.controls_mut().pitch_hz = f;
        let multiplier = pitch_multiplier(f, self.scheduler.settings().base_frequency_hz);
        if let Some((backend, session)) = self.scheduler.live_parts() {
            if let Err(e) = self.modulator.apply_pitch(backend, session, multiplier) {
                warn!("pitch change not applied: {e}");
            }
        }
    }

    /// Reverb amount, 0..=100.
    pub fn set_reverb(&mut self, amount: f32) {
        let Some(r) = knob("reverb", amount, REVERB_RANGE) else { return };
        self.reverb = r;
        self.scheduler.controls_mut().reverb_mix = r / 100.0;
        if let Some((backend, session)) = self.scheduler.live_parts() {
            if let Err(e) = self.modulator.apply_reverb(backend, session, r / 100.0) {
                warn!("reverb change not applied: {e}");
            }
        }
    }

    /// Request a tempo in BPM. Takes effect once input has been quiet for
    /// the debounce window (see [`run_due`](Self::run_due)).
    pub fn set_tempo(&mut self, bpm: f32) {
        let Some(t) = knob("tempo", bpm, TEMPO_RANGE) else { return };
        let now = self.clock.now();
        self.tempo.request(t, now);
    }

    /// Earliest time (player clock) at which `run_due` has work.
    pub fn next_deadline(&self) -> Option<f64> {
        match (self.tempo.deadline(), self.scheduler.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Run every timer and tempo commit due at the current clock time, in
    /// deadline order. A tempo commit wins a tie with a scheduler timer.
    /// Returns how many fired.
    pub fn run_due(&mut self) -> usize {
        let now = self.clock.now();
        let mut fired = 0;
        loop {
            let tempo_due = self.tempo.deadline().filter(|d| *d <= now);
            let timer_due = self.scheduler.next_deadline().filter(|d| *d <= now);
            match (tempo_due, timer_due) {
                (Some(t), Some(s)) if s < t => {
                    self.scheduler.fire_due(now);
                }
                (Some(_), _) => self.commit_tempo(now),
                (None, Some(_)) => {
                    self.scheduler.fire_due(now);
                }
                (None, None) => break,
            }
            fired += 1;
        }
        fired
    }

    fn commit_tempo(&mut self, now: f64) {
        let Some(bpm) = self.tempo.poll(now) else { return };
        self.scheduler.controls_mut().tempo_bpm = bpm;
        if self.scheduler.is_looping() {
            self.scheduler.restart_at_current(now);
        } else {
            info!("tempo {bpm} BPM will apply on next start");
        }
    }

    #[inline] pub fn now(&self) -> f64 { self.clock.now() }
    #[inline] pub fn volume(&self) -> f32 { self.volume }
    #[inline] pub fn reverb(&self) -> f32 { self.reverb }
    #[inline] pub fn frequency(&self) -> f32 { self.scheduler.controls().pitch_hz }

    /// Tempo in effect (last committed value).
    #[inline] pub fn tempo(&self) -> f32 { self.tempo.committed() }

    /// Tempo waiting out the debounce window.
    #[inline] pub fn pending_tempo(&self) -> Option<f32> { self.tempo.pending() }

    #[inline] pub fn scheduler(&self) -> &NoteScheduler<B> { &self.scheduler }
    #[inline] pub fn backend(&self) -> &B { self.scheduler.backend() }

    /// Notes currently sounding.
    pub fn active_sound_count(&self) -> usize {
        self.scheduler.session().map_or(0, |s| s.active_sounds().len())
    }

    /// Session timers still armed.
    #[inline] pub fn pending_timer_count(&self) -> usize { self.scheduler.pending_timers() }
}
