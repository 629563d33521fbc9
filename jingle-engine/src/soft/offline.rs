//! Faster-than-realtime rendering of a player.
//!
//! The player's clock follows the rendered frame count, so timers fire on
//! block boundaries exactly as they would against a device, just without
//! waiting.

use crate::config::PlayerConfig;
use crate::error::PlayerResult;
use crate::player::Player;
use crate::soft::{RendererSlot, SoftBackend};
use crate::timer::ManualClock;

/// Frames rendered between two timer checks.
pub const BLOCK_FRAMES: usize = 256;

pub struct OfflineRender {
    player: Player<SoftBackend, ManualClock>,
    slot: RendererSlot,
    clock: ManualClock,
    sample_rate: u32,
    channels: usize,
    frames_done: u64,
}

impl OfflineRender {
    pub fn new(config: PlayerConfig, sample_rate: u32, channels: u16) -> PlayerResult<Self> {
        #[allow(clippy::cast_precision_loss)]
        let (backend, slot) = SoftBackend::offline(sample_rate.max(1) as f32);
        let clock = ManualClock::new();
        let player = Player::new(config, backend, clock.clone())?;
        Ok(Self {
            player,
            slot,
            clock,
            sample_rate: sample_rate.max(1),
            channels: usize::from(channels.max(1)),
            frames_done: 0,
        })
    }

    #[inline] pub fn player(&self) -> &Player<SoftBackend, ManualClock> { &self.player }
    #[inline] pub fn player_mut(&mut self) -> &mut Player<SoftBackend, ManualClock> { &mut self.player }
    #[inline] pub fn sample_rate(&self) -> u32 { self.sample_rate }
    #[inline] pub fn channels(&self) -> usize { self.channels }

    /// Seconds rendered so far.
    #[allow(clippy::cast_precision_loss)]
    pub fn time(&self) -> f64 {
        self.frames_done as f64 / f64::from(self.sample_rate)
    }

    /// Run what is due, then render `out` (interleaved, `channels()` wide).
    ///
    /// Long buffers are cut into [`BLOCK_FRAMES`] pieces with a timer check
    /// before each piece.
    pub fn render(&mut self, out: &mut [f32]) {
        for block in out.chunks_mut(BLOCK_FRAMES * self.channels) {
            self.player.run_due();
            self.slot.render(block, self.channels);
            self.frames_done += (block.len() / self.channels) as u64;
            self.clock.set(self.time());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImpulseConfig;

    fn rms(buf: &[f32]) -> f32 {
        (buf.iter().map(|s| s * s).sum::<f32>() / buf.len().max(1) as f32).sqrt()
    }

    #[test]
    fn renders_audible_notes_and_advances_the_melody() {
        let cfg = PlayerConfig { impulse: ImpulseConfig { seconds: 0.05, decay: 2.0 }, ..PlayerConfig::default() };
        let mut r = OfflineRender::new(cfg, 8_000, 2).unwrap();
        r.player_mut().start().unwrap();
        let mut buf = vec![0.0; 8_000 * 2];
        r.render(&mut buf);
        assert!((r.time() - 1.0).abs() < 1e-9);
        assert!(rms(&buf) > 0.01, "rms {}", rms(&buf));
        // notes start near 0, 0.25 and 0.5 s; the next one is due after 1 s
        let pos = r.player().scheduler().session().unwrap().current_event_index();
        assert_eq!(pos, 3);
    }

    #[test]
    fn stopped_player_renders_silence() {
        let mut r = OfflineRender::new(PlayerConfig::default(), 8_000, 1).unwrap();
        let mut buf = vec![1.0; 1024];
        r.render(&mut buf);
        assert!(buf.iter().all(|s| *s == 0.0));
    }
}
