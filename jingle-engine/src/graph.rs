//! Session signal graph.
//!
//! ```text
//!   note osc -> note gain --+
//!                           v
//!                      master gain --> dry gain -----------> output
//!                           |
//!                           +--> convolver --> wet gain ---> output
//! ```
//!
//! The master/dry/convolver/wet chain lives for the whole session; per-note
//! oscillator + envelope pairs are attached to `master` by the scheduler.

use log::debug;

use crate::backend::{AudioBackend, BackendResult, NodeId, Port};
use crate::reverb::ImpulseBuffer;

/// Dry and wet levels for a reverb amount in `[0, 1]`.
///
/// The dry path never drops below 0.5 so full reverb still keeps the note
/// attack audible: `dry = 1 - 0.5 * mix`, `wet = mix`.
#[inline]
pub fn mix_levels(reverb_mix: f32) -> (f32, f32) {
    let mix = reverb_mix.clamp(0.0, 1.0);
    (1.0 - mix * 0.5, mix)
}

/// Node handles of the session-wide part of the graph.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GraphHandles {
    pub master: NodeId,
    pub dry: NodeId,
    pub convolver: NodeId,
    pub wet: NodeId,
}

/// Open the backend and build the master → dry/wet → output chain.
///
/// On failure the backend context is closed again, so no partially built
/// graph survives.
pub fn build_graph<B: AudioBackend + ?Sized>(
    backend: &mut B,
    volume: f32,
    reverb_mix: f32,
    impulse: impl FnOnce(f32) -> ImpulseBuffer,
) -> BackendResult<GraphHandles> {
    let sr = backend.open()?;
    match wire(backend, volume, reverb_mix, impulse(sr)) {
        Ok(handles) => {
            debug!("graph built at {sr} Hz: {handles:?}");
            Ok(handles)
        }
        Err(e) => {
            backend.close();
            Err(e)
        }
    }
}

fn wire<B: AudioBackend + ?Sized>(
    backend: &mut B,
    volume: f32,
    reverb_mix: f32,
    impulse: ImpulseBuffer,
) -> BackendResult<GraphHandles> {
    let (dry_level, wet_level) = mix_levels(reverb_mix);
    let master = backend.create_gain(volume.clamp(0.0, 1.0))?;
    let dry = backend.create_gain(dry_level)?;
    let wet = backend.create_gain(wet_level)?;
    let convolver = backend.create_convolver(impulse)?;

    backend.connect(master, Port::Node(dry))?;
    backend.connect(master, Port::Node(convolver))?;
    backend.connect(convolver, Port::Node(wet))?;
    backend.connect(dry, Port::Output)?;
    backend.connect(wet, Port::Output)?;

    Ok(GraphHandles { master, dry, convolver, wet })
}

/// Free the session chain and close the backend context. Never fails.
pub fn release_graph<B: AudioBackend + ?Sized>(backend: &mut B, handles: GraphHandles) {
    for node in [handles.master, handles.dry, handles.convolver, handles.wet] {
        if let Err(e) = backend.free_node(node) {
            debug!("free of node {node} during release: {e}");
        }
    }
    backend.close();
}
