//! Threaded driver: one dispatch thread owns the [`Player`] and serializes
//! every command from any number of callers.
//!
//! The thread blocks on the command channel until the player's next deadline,
//! then runs whatever is due. Backends that are not `Send` (a cpal stream)
//! are constructed on the dispatch thread itself.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{debug, warn};

use crate::backend::AudioBackend;
use crate::config::PlayerConfig;
use crate::error::{PlayerError, PlayerResult};
use crate::player::Player;
use crate::timer::{Clock, SystemClock};

enum Command {
    Start(Sender<PlayerResult>),
    Stop,
    SetVolume(f32),
    SetFrequency(f32),
    SetReverb(f32),
    SetTempo(f32),
    IsPlaying(Sender<bool>),
    Shutdown,
}

fn thread_gone() -> PlayerError {
    PlayerError::ResourceUnavailable("player thread has exited".into())
}

/// Handle to a player running on its own thread.
///
/// Dropping the handle stops playback and joins the thread.
pub struct PlayerHandle {
    tx: Sender<Command>,
    join_handle: Option<JoinHandle<()>>,
}

impl PlayerHandle {
    /// Spawn the dispatch thread. `make_backend` runs on that thread.
    pub fn spawn<B, F>(config: PlayerConfig, make_backend: F) -> PlayerResult<Self>
    where
        B: AudioBackend + 'static,
        F: FnOnce() -> B + Send + 'static,
    {
        let (tx, rx) = crossbeam_channel::unbounded();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<PlayerResult>(1);

        let join_handle = thread::Builder::new()
            .name("jingle-player".into())
            .spawn(move || match Player::new(config, make_backend(), SystemClock::new()) {
                Ok(player) => {
                    let _ = ready_tx.send(Ok(()));
                    dispatch(player, &rx);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| PlayerError::ResourceUnavailable(e.to_string()))?;

        ready_rx.recv().map_err(|_| thread_gone())??;
        Ok(Self { tx, join_handle: Some(join_handle) })
    }

    fn send(&self, cmd: Command) {
        if self.tx.send(cmd).is_err() {
            warn!("command dropped: player thread has exited");
        }
    }

    pub fn start(&self) -> PlayerResult {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.tx.send(Command::Start(reply_tx)).map_err(|_| thread_gone())?;
        reply_rx.recv().map_err(|_| thread_gone())?
    }

    pub fn stop(&self) { self.send(Command::Stop); }
    pub fn set_volume(&self, volume: f32) { self.send(Command::SetVolume(volume)); }
    pub fn set_frequency_multiplier_base(&self, hz: f32) { self.send(Command::SetFrequency(hz)); }
    pub fn set_reverb(&self, amount: f32) { self.send(Command::SetReverb(amount)); }
    pub fn set_tempo(&self, bpm: f32) { self.send(Command::SetTempo(bpm)); }

    pub fn is_playing(&self) -> bool {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        if self.tx.send(Command::IsPlaying(reply_tx)).is_err() {
            return false;
        }
        reply_rx.recv().unwrap_or(false)
    }

    /// Stop playback and wait for the thread to finish.
    pub fn shutdown(mut self) { self.join(); }

    fn join(&mut self) {
        let _ = self.tx.send(Command::Shutdown);
        if let Some(handle) = self.join_handle.take() {
            if handle.join().is_err() {
                warn!("player thread panicked");
            }
        }
    }
}

impl Drop for PlayerHandle {
    fn drop(&mut self) { self.join(); }
}

/// Time to sleep before a deadline `secs` away; saturates for far deadlines.
fn wait_until(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
}

fn dispatch<B: AudioBackend, C: Clock>(mut player: Player<B, C>, rx: &Receiver<Command>) {
    loop {
        let cmd = match player.next_deadline() {
            Some(deadline) => {
                match rx.recv_timeout(wait_until(deadline - player.now())) {
                    Ok(cmd) => Some(cmd),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match rx.recv() {
                Ok(cmd) => Some(cmd),
                Err(_) => break,
            },
        };

        if let Some(cmd) = cmd {
            match cmd {
                Command::Start(reply) => {
                    let _ = reply.send(player.start());
                }
                Command::Stop => player.stop(),
                Command::SetVolume(v) => player.set_volume(v),
                Command::SetFrequency(hz) => player.set_frequency_multiplier_base(hz),
                Command::SetReverb(r) => player.set_reverb(r),
                Command::SetTempo(bpm) => player.set_tempo(bpm),
                Command::IsPlaying(reply) => {
                    let _ = reply.send(player.is_playing());
                }
                Command::Shutdown => break,
            }
        }
        player.run_due();
    }
    player.stop();
    debug!("player thread exiting");
}
