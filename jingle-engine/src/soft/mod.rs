//! Software backend: realises the player's graph with the crate's own DSP.
//!
//! The control side ([`SoftBackend`]) allocates node ids, builds render nodes
//! and sends them to a [`SoftRenderer`] over a channel. The renderer is driven
//! either by a cpal output stream (feature `realtime`) or by the caller
//! through a [`RendererSlot`] for offline rendering. The backend clock is the
//! renderer's frame counter.

#[cfg(feature = "realtime")]
pub mod device;
pub mod offline;
pub mod render;

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender};
use log::{debug, info};

use jingle_core::automation::AutomationEvent;

use crate::backend::{AudioBackend, BackendError, BackendResult, NodeId, ParamKind, Port};
use crate::nodes::Wave;
use crate::reverb::ImpulseBuffer;

#[cfg(feature = "realtime")]
pub use device::{output_device_names, DeviceOptions};
pub use offline::OfflineRender;
pub use render::{GraphCmd, RenderNode, SoftRenderer, NODE_CAPACITY};

/// Shared home of an offline renderer. The backend installs a fresh renderer
/// on `open` and removes it on `close`; the driver renders through it.
#[derive(Clone, Debug, Default)]
pub struct RendererSlot(Arc<Mutex<Option<SoftRenderer>>>);

impl RendererSlot {
    fn install(&self, r: SoftRenderer) {
        if let Ok(mut g) = self.0.lock() {
            *g = Some(r);
        }
    }

    fn clear(&self) {
        if let Ok(mut g) = self.0.lock() {
            *g = None;
        }
    }

    pub fn is_installed(&self) -> bool {
        self.0.lock().map(|g| g.is_some()).unwrap_or(false)
    }

    /// Render into `out`, or write silence when no context is open.
    pub fn render(&self, out: &mut [f32], channels: usize) {
        match self.0.lock() {
            Ok(mut g) => match g.as_mut() {
                Some(r) => r.render(out, channels),
                None => out.fill(0.0),
            },
            Err(_) => out.fill(0.0),
        }
    }
}

#[derive(Debug)]
enum Sink {
    Offline { sample_rate: f32, slot: RendererSlot },
    #[cfg(feature = "realtime")]
    Device(DeviceOptions),
}

struct Context {
    tx: Sender<GraphCmd>,
    // nodes the renderer freed, dropped here instead of on the render thread
    retired: Receiver<RenderNode>,
    frames: Arc<AtomicU64>,
    sample_rate: f32,
    #[cfg(feature = "realtime")]
    _stream: Option<cpal::Stream>,
}

pub struct SoftBackend {
    sink: Sink,
    ctx: Option<Context>,
    next_id: NodeId,
    live: HashSet<NodeId>,
}

impl SoftBackend {
    /// Backend rendered by the caller through the returned slot.
    pub fn offline(sample_rate: f32) -> (Self, RendererSlot) {
        let slot = RendererSlot::default();
        let sink = Sink::Offline { sample_rate: sample_rate.max(1.0), slot: slot.clone() };
        (Self::with_sink(sink), slot)
    }

    /// Backend that plays through an output device when opened.
    #[cfg(feature = "realtime")]
    pub fn device(options: DeviceOptions) -> Self {
        Self::with_sink(Sink::Device(options))
    }

    fn with_sink(sink: Sink) -> Self {
        Self { sink, ctx: None, next_id: 0, live: HashSet::new() }
    }

    fn context(&self) -> BackendResult<&Context> {
        self.ctx.as_ref().ok_or_else(|| BackendError::from("no audio context"))
    }

    fn send(&self, cmd: GraphCmd) -> BackendResult {
        let ctx = self.context()?;
        ctx.retired.try_iter().for_each(drop);
        ctx.tx.send(cmd).map_err(|_| BackendError::from("renderer has gone away"))
    }

    fn add(&mut self, node: RenderNode) -> BackendResult<NodeId> {
        let id = self.next_id;
        self.send(GraphCmd::Add { id, node })?;
        self.next_id += 1;
        self.live.insert(id);
        Ok(id)
    }

    fn known(&self, id: NodeId) -> BackendResult {
        if self.live.contains(&id) {
            Ok(())
        } else {
            Err(BackendError(format!("unknown node {id}")))
        }
    }

    fn sample_rate(&self) -> BackendResult<f32> {
        Ok(self.context()?.sample_rate)
    }
}

impl AudioBackend for SoftBackend {
    fn open(&mut self) -> BackendResult<f32> {
        if let Some(ctx) = &self.ctx {
            return Ok(ctx.sample_rate);
        }
        let (tx, rx) = crossbeam_channel::unbounded();
        let (retired_tx, retired) = crossbeam_channel::bounded(NODE_CAPACITY);
        let frames = Arc::new(AtomicU64::new(0));
        let ctx = match &self.sink {
            Sink::Offline { sample_rate, slot } => {
                slot.install(SoftRenderer::new(*sample_rate, rx, retired_tx, frames.clone()));
                Context {
                    tx,
                    retired,
                    frames,
                    sample_rate: *sample_rate,
                    #[cfg(feature = "realtime")]
                    _stream: None,
                }
            }
            #[cfg(feature = "realtime")]
            Sink::Device(options) => {
                let counter = frames.clone();
                let (stream, sample_rate) =
                    device::open_stream(options, move |sr| SoftRenderer::new(sr, rx, retired_tx, counter))?;
                Context { tx, retired, frames, sample_rate, _stream: Some(stream) }
            }
        };
        info!("audio context open at {} Hz", ctx.sample_rate);
        let sr = ctx.sample_rate;
        self.ctx = Some(ctx);
        Ok(sr)
    }

    fn close(&mut self) {
        if self.ctx.take().is_some() {
            if let Sink::Offline { slot, .. } = &self.sink {
                slot.clear();
            }
            self.live.clear();
            debug!("audio context closed");
        }
    }

    fn is_open(&self) -> bool { self.ctx.is_some() }

    fn current_time(&self) -> f64 {
        match &self.ctx {
            #[allow(clippy::cast_precision_loss)]
            Some(ctx) => ctx.frames.load(Ordering::Acquire) as f64 / f64::from(ctx.sample_rate),
            None => 0.0,
        }
    }

    fn create_gain(&mut self, gain: f32) -> BackendResult<NodeId> {
        let sr = self.sample_rate()?;
        self.add(RenderNode::gain(gain, sr))
    }

    fn create_oscillator(&mut self, wave: Wave, freq_hz: f32) -> BackendResult<NodeId> {
        let sr = self.sample_rate()?;
        self.add(RenderNode::oscillator(wave, freq_hz, sr))
    }

    fn create_convolver(&mut self, impulse: ImpulseBuffer) -> BackendResult<NodeId> {
        self.context()?;
        self.add(RenderNode::convolver(&impulse))
    }

    fn connect(&mut self, from: NodeId, to: Port) -> BackendResult {
        self.known(from)?;
        if let Port::Node(n) = to {
            self.known(n)?;
        }
        self.send(GraphCmd::Connect { from, to })
    }

    fn automate(&mut self, node: NodeId, param: ParamKind, event: AutomationEvent) -> BackendResult {
        self.known(node)?;
        self.send(GraphCmd::Automate { id: node, param, event })
    }

    fn start_node(&mut self, node: NodeId, at: f64) -> BackendResult {
        self.known(node)?;
        self.send(GraphCmd::Start { id: node, at })
    }

    fn stop_node(&mut self, node: NodeId, at: f64) -> BackendResult {
        self.known(node)?;
        self.send(GraphCmd::Stop { id: node, at })
    }

    fn free_node(&mut self, node: NodeId) -> BackendResult {
        self.known(node)?;
        self.live.remove(&node);
        self.send(GraphCmd::Free { id: node })
    }
}
