//! Jingle Engine: a looping toy synthesizer with live controls.
//!
//! Crate layout:
//! - [`player`]    : public `Player` (start/stop, volume, pitch, reverb, tempo)
//! - [`scheduler`] : melody loop state machine and note production
//! - [`modulator`] : click-free live changes on a running session
//! - [`tempo`]     : tempo input debouncer
//! - [`graph`]     : session signal graph (master, dry/wet, convolver)
//! - [`backend`]   : semantic audio backend trait + recording test backend
//! - [`soft`]      : software backend (cpal device or offline render)
//! - [`runtime`]   : threaded driver with a command channel
//! - [`timer`]     : clocks and the cancellable timer queue
//! - [`melody`], [`reverb`], [`nodes`], [`config`], [`error`]
//!
//! The player is single-threaded and does no I/O of its own: every time-based
//! action is a timer polled with `run_due`, and every sound is a backend call.

pub mod backend;
pub mod config;
pub mod error;
pub mod graph;
pub mod melody;
pub mod modulator;
pub mod nodes;
pub mod player;
pub mod reverb;
pub mod runtime;
pub mod scheduler;
pub mod soft;
pub mod tempo;
pub mod timer;

// Re-export some commonly used items to make downstream imports ergonomic.
pub use backend::{AudioBackend, BackendError, TestBackend};
pub use config::PlayerConfig;
pub use error::{PlayerError, PlayerResult};
pub use melody::{Melody, MelodyEvent};
pub use nodes::Wave;
pub use player::Player;
pub use runtime::PlayerHandle;
pub use soft::{OfflineRender, SoftBackend};
pub use timer::{Clock, ManualClock, SystemClock};
