//! Render side of the software backend.
//!
//! `SoftRenderer` owns the live nodes and turns the graph into stereo frames.
//! It never blocks: mutations arrive over a channel and are drained at the
//! start of every `render` call. Nodes are evaluated per frame in
//! topological order; the plan is rebuilt only when the topology changes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

use jingle_core::automation::{AutomatedParam, AutomationEvent};
use jingle_core::convolver::{Convolver, DEFAULT_BLOCK};

use crate::backend::{NodeId, ParamKind, Port};
use crate::nodes::{Osc, Wave};
use crate::reverb::ImpulseBuffer;

type Frame = [f32; 2];

/// A node as the renderer runs it. Built on the control side so the render
/// thread never plans FFTs or allocates impulse partitions.
#[derive(Debug)]
pub enum RenderNode {
    Gain {
        gain: AutomatedParam,
    },
    Oscillator {
        osc: Osc,
        freq: AutomatedParam,
        start: Option<f64>,
        stop: Option<f64>,
    },
    Convolver {
        left: Box<Convolver>,
        right: Box<Convolver>,
    },
}

impl RenderNode {
    pub fn gain(gain: f32, sr: f32) -> Self {
        Self::Gain { gain: AutomatedParam::new(gain, sr) }
    }

    pub fn oscillator(wave: Wave, freq_hz: f32, sr: f32) -> Self {
        Self::Oscillator { osc: Osc::new(wave), freq: AutomatedParam::new(freq_hz, sr), start: None, stop: None }
    }

    /// Stereo convolver; a mono impulse feeds both sides.
    pub fn convolver(impulse: &ImpulseBuffer) -> Self {
        let left = impulse.channel(0);
        let right = if impulse.channel_count() > 1 { impulse.channel(1) } else { left };
        Self::Convolver {
            left: Box::new(Convolver::new(left, DEFAULT_BLOCK)),
            right: Box::new(Convolver::new(right, DEFAULT_BLOCK)),
        }
    }

    fn param_mut(&mut self, kind: ParamKind) -> Option<&mut AutomatedParam> {
        match (self, kind) {
            (Self::Gain { gain }, ParamKind::Gain) => Some(gain),
            (Self::Oscillator { freq, .. }, ParamKind::Frequency) => Some(freq),
            _ => None,
        }
    }

    #[inline]
    fn tick(&mut self, input: Frame, t: f64, sr: f32) -> Frame {
        match self {
            Self::Gain { gain } => {
                let g = gain.next(t);
                [input[0] * g, input[1] * g]
            }
            Self::Oscillator { osc, freq, start, stop } => {
                let f = freq.next(t);
                let running = start.is_some_and(|s| t >= s) && stop.map_or(true, |e| t < e);
                if running {
                    let s = osc.next(f, sr);
                    [s, s]
                } else {
                    [0.0; 2]
                }
            }
            Self::Convolver { left, right } => {
                let mid = 0.5 * (input[0] + input[1]);
                [left.process(mid), right.process(mid)]
            }
        }
    }
}

/// Graph mutation sent from the control side.
#[derive(Debug)]
pub enum GraphCmd {
    Add { id: NodeId, node: RenderNode },
    Connect { from: NodeId, to: Port },
    Automate { id: NodeId, param: ParamKind, event: AutomationEvent },
    Start { id: NodeId, at: f64 },
    Stop { id: NodeId, at: f64 },
    Free { id: NodeId },
}

/// Nodes and edges the renderer holds before its buffers grow.
pub const NODE_CAPACITY: usize = 256;
pub const EDGE_CAPACITY: usize = 512;

/// Evaluation order plus the scratch used to compute it. Every buffer is
/// reserved up front and reused, so replanning does not allocate.
#[derive(Debug)]
struct Plan {
    // slot indices in evaluation order
    order: Vec<usize>,
    // slot -> position in `order`, usize::MAX when the slot sits on a cycle
    pos: Vec<usize>,
    // inputs of position k are inputs[input_start[k]..input_start[k + 1]]
    input_start: Vec<usize>,
    inputs: Vec<usize>,
    // positions feeding the output
    outputs: Vec<usize>,
    // edges resolved to slots; None is the output
    links: Vec<(usize, Option<usize>)>,
    indegree: Vec<usize>,
    cursor: Vec<usize>,
}

impl Plan {
    fn with_capacity(nodes: usize, edges: usize) -> Self {
        Self {
            order: Vec::with_capacity(nodes),
            pos: Vec::with_capacity(nodes),
            input_start: Vec::with_capacity(nodes + 1),
            inputs: Vec::with_capacity(edges),
            outputs: Vec::with_capacity(edges),
            links: Vec::with_capacity(edges),
            indegree: Vec::with_capacity(nodes),
            cursor: Vec::with_capacity(nodes),
        }
    }

    #[inline]
    fn inputs_of(&self, k: usize) -> &[usize] {
        &self.inputs[self.input_start[k]..self.input_start[k + 1]]
    }

    /// Kahn's algorithm over `ids`. Nodes on a cycle are left out.
    fn rebuild(&mut self, ids: &[NodeId], edges: &[(NodeId, Port)]) {
        let n = ids.len();
        self.links.clear();
        for (from, to) in edges {
            let Some(a) = slot_of(ids, *from) else { continue };
            match to {
                Port::Output => self.links.push((a, None)),
                Port::Node(to) => {
                    if let Some(b) = slot_of(ids, *to) {
                        self.links.push((a, Some(b)));
                    }
                }
            }
        }

        self.indegree.clear();
        self.indegree.resize(n, 0);
        for &(_, b) in &self.links {
            if let Some(b) = b {
                self.indegree[b] += 1;
            }
        }
        self.cursor.clear();
        self.cursor.extend((0..n).filter(|i| self.indegree[*i] == 0));
        self.order.clear();
        while let Some(i) = self.cursor.pop() {
            self.order.push(i);
            for &(a, b) in &self.links {
                let Some(b) = b.filter(|_| a == i) else { continue };
                self.indegree[b] -= 1;
                if self.indegree[b] == 0 {
                    self.cursor.push(b);
                }
            }
        }

        self.pos.clear();
        self.pos.resize(n, usize::MAX);
        for (k, &i) in self.order.iter().enumerate() {
            self.pos[i] = k;
        }

        let m = self.order.len();
        self.input_start.clear();
        self.input_start.resize(m + 1, 0);
        self.outputs.clear();
        for &(a, b) in &self.links {
            let pa = self.pos[a];
            if pa == usize::MAX {
                continue;
            }
            match b {
                None => self.outputs.push(pa),
                Some(b) if self.pos[b] != usize::MAX => self.input_start[self.pos[b] + 1] += 1,
                Some(_) => {}
            }
        }
        for k in 0..m {
            self.input_start[k + 1] += self.input_start[k];
        }

        self.inputs.clear();
        self.inputs.resize(self.input_start[m], 0);
        self.cursor.clear();
        self.cursor.extend_from_slice(&self.input_start[..m]);
        for &(a, b) in &self.links {
            let Some(b) = b else { continue };
            let (pa, pb) = (self.pos[a], self.pos[b]);
            if pa == usize::MAX || pb == usize::MAX {
                continue;
            }
            self.inputs[self.cursor[pb]] = pa;
            self.cursor[pb] += 1;
        }
    }
}

fn slot_of(ids: &[NodeId], id: NodeId) -> Option<usize> {
    ids.iter().position(|n| *n == id)
}

/// Render-thread end of the software backend.
///
/// Freed nodes go back to the control side over `retired` so they are
/// dropped there; the render thread only drops one when that channel is full.
#[derive(Debug)]
pub struct SoftRenderer {
    sr: f32,
    rx: Receiver<GraphCmd>,
    retired: Sender<RenderNode>,
    frames: Arc<AtomicU64>,
    position: u64,
    ids: Vec<NodeId>,
    nodes: Vec<RenderNode>,
    edges: Vec<(NodeId, Port)>,
    plan: Plan,
    dirty: bool,
    values: Vec<Frame>,
}

impl SoftRenderer {
    pub fn new(sr: f32, rx: Receiver<GraphCmd>, retired: Sender<RenderNode>, frames: Arc<AtomicU64>) -> Self {
        Self {
            sr,
            rx,
            retired,
            frames,
            position: 0,
            ids: Vec::with_capacity(NODE_CAPACITY),
            nodes: Vec::with_capacity(NODE_CAPACITY),
            edges: Vec::with_capacity(EDGE_CAPACITY),
            plan: Plan::with_capacity(NODE_CAPACITY, EDGE_CAPACITY),
            dirty: false,
            values: Vec::with_capacity(NODE_CAPACITY),
        }
    }

    #[inline] pub fn sample_rate(&self) -> f32 { self.sr }
    #[inline] pub fn node_count(&self) -> usize { self.nodes.len() }

    fn apply(&mut self, cmd: GraphCmd) {
        match cmd {
            GraphCmd::Add { id, node } => {
                self.ids.push(id);
                self.nodes.push(node);
                self.dirty = true;
            }
            GraphCmd::Connect { from, to } => {
                self.edges.push((from, to));
                self.dirty = true;
            }
            GraphCmd::Automate { id, param, event } => {
                let Some(i) = slot_of(&self.ids, id) else { return };
                if let Some(p) = self.nodes[i].param_mut(param) {
                    p.schedule(event);
                }
            }
            GraphCmd::Start { id, at } => {
                let Some(i) = slot_of(&self.ids, id) else { return };
                if let RenderNode::Oscillator { start, .. } = &mut self.nodes[i] {
                    *start = Some(at);
                }
            }
            GraphCmd::Stop { id, at } => {
                let Some(i) = slot_of(&self.ids, id) else { return };
                if let RenderNode::Oscillator { stop, .. } = &mut self.nodes[i] {
                    *stop = Some(at);
                }
            }
            GraphCmd::Free { id } => {
                if let Some(i) = slot_of(&self.ids, id) {
                    self.ids.swap_remove(i);
                    let node = self.nodes.swap_remove(i);
                    let _ = self.retired.try_send(node);
                }
                self.edges.retain(|(from, to)| *from != id && *to != Port::Node(id));
                self.dirty = true;
            }
        }
    }

    fn rebuild_plan(&mut self) {
        self.plan.rebuild(&self.ids, &self.edges);
        self.values.clear();
        self.values.resize(self.plan.order.len(), [0.0; 2]);
        self.dirty = false;
    }

    /// Render interleaved frames into `out` (`channels` per frame).
    ///
    /// Channel 0 is left, 1 is right, any further channel gets the mid.
    /// Mono output gets the mid.
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        while let Ok(cmd) = self.rx.try_recv() {
            self.apply(cmd);
        }
        if self.dirty {
            self.rebuild_plan();
        }
        let channels = channels.max(1);
        let sr = f64::from(self.sr);
        let mut rendered = 0u64;
        for frame in out.chunks_mut(channels) {
            #[allow(clippy::cast_precision_loss)]
            let t = (self.position + rendered) as f64 / sr;
            let y = self.tick(t);
            let mid = 0.5 * (y[0] + y[1]);
            for (c, s) in frame.iter_mut().enumerate() {
                *s = match (channels, c) {
                    (1, _) => mid,
                    (_, 0) => y[0],
                    (_, 1) => y[1],
                    _ => mid,
                };
            }
            rendered += 1;
        }
        self.position += rendered;
        self.frames.store(self.position, Ordering::Release);
    }

    #[inline]
    fn tick(&mut self, t: f64) -> Frame {
        let sr = self.sr;
        for k in 0..self.plan.order.len() {
            let mut input = [0.0f32; 2];
            for &j in self.plan.inputs_of(k) {
                input[0] += self.values[j][0];
                input[1] += self.values[j][1];
            }
            let slot = self.plan.order[k];
            self.values[k] = self.nodes[slot].tick(input, t, sr);
        }
        let mut y = [0.0f32; 2];
        for &j in &self.plan.outputs {
            y[0] += self.values[j][0];
            y[1] += self.values[j][1];
        }
        [y[0].clamp(-1.0, 1.0), y[1].clamp(-1.0, 1.0)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 8_000.0;

    fn renderer() -> (SoftRenderer, Sender<GraphCmd>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let (retired, _) = crossbeam_channel::bounded(NODE_CAPACITY);
        (SoftRenderer::new(SR, rx, retired, Arc::new(AtomicU64::new(0))), tx)
    }

    fn peak(buf: &[f32]) -> f32 {
        buf.iter().fold(0.0f32, |m, s| m.max(s.abs()))
    }

    #[test]
    fn oscillator_sounds_only_between_start_and_stop() {
        let (mut r, tx) = renderer();
        tx.send(GraphCmd::Add { id: 0, node: RenderNode::gain(0.5, SR) }).unwrap();
        tx.send(GraphCmd::Add { id: 1, node: RenderNode::oscillator(Wave::Saw, 200.0, SR) }).unwrap();
        tx.send(GraphCmd::Connect { from: 1, to: Port::Node(0) }).unwrap();
        tx.send(GraphCmd::Connect { from: 0, to: Port::Output }).unwrap();
        tx.send(GraphCmd::Start { id: 1, at: 0.1 }).unwrap();
        tx.send(GraphCmd::Stop { id: 1, at: 0.2 }).unwrap();

        let mut buf = vec![0.0; 800 * 2];
        r.render(&mut buf, 2);
        assert_eq!(peak(&buf), 0.0, "before start");
        r.render(&mut buf, 2);
        let p = peak(&buf);
        assert!(p > 0.3 && p <= 0.5, "peak {p}");
        r.render(&mut buf, 2);
        assert_eq!(peak(&buf), 0.0, "after stop");
    }

    #[test]
    fn freed_nodes_drop_out_of_the_graph() {
        let (mut r, tx) = renderer();
        tx.send(GraphCmd::Add { id: 3, node: RenderNode::oscillator(Wave::Saw, 100.0, SR) }).unwrap();
        tx.send(GraphCmd::Connect { from: 3, to: Port::Output }).unwrap();
        tx.send(GraphCmd::Start { id: 3, at: 0.0 }).unwrap();
        let mut buf = vec![0.0; 400];
        r.render(&mut buf, 1);
        assert!(peak(&buf) > 0.5);
        tx.send(GraphCmd::Free { id: 3 }).unwrap();
        r.render(&mut buf, 1);
        assert_eq!(peak(&buf), 0.0);
        assert_eq!(r.node_count(), 0);
    }

    #[test]
    fn gain_automation_reaches_the_output() {
        let (mut r, tx) = renderer();
        tx.send(GraphCmd::Add { id: 0, node: RenderNode::gain(1.0, SR) }).unwrap();
        tx.send(GraphCmd::Add { id: 1, node: RenderNode::oscillator(Wave::Saw, 100.0, SR) }).unwrap();
        tx.send(GraphCmd::Connect { from: 1, to: Port::Node(0) }).unwrap();
        tx.send(GraphCmd::Connect { from: 0, to: Port::Output }).unwrap();
        tx.send(GraphCmd::Start { id: 1, at: 0.0 }).unwrap();
        tx.send(GraphCmd::Automate {
            id: 0,
            param: ParamKind::Gain,
            event: AutomationEvent::SetValue { value: 0.0, time: 0.05 },
        })
        .unwrap();
        let mut buf = vec![0.0; 800];
        r.render(&mut buf, 1);
        assert!(peak(&buf[..300]) > 0.5);
        assert_eq!(peak(&buf[450..]), 0.0);
    }

    #[test]
    fn frame_counter_tracks_rendered_frames() {
        let (tx, rx) = crossbeam_channel::unbounded::<GraphCmd>();
        let frames = Arc::new(AtomicU64::new(0));
        let (retired, _) = crossbeam_channel::bounded(1);
        let mut r = SoftRenderer::new(SR, rx, retired, frames.clone());
        let mut buf = vec![0.0; 256 * 2];
        r.render(&mut buf, 2);
        r.render(&mut buf, 2);
        assert_eq!(frames.load(Ordering::Acquire), 512);
        drop(tx);
    }

    #[test]
    fn freed_nodes_are_handed_back() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let (retired_tx, retired_rx) = crossbeam_channel::bounded(NODE_CAPACITY);
        let mut r = SoftRenderer::new(SR, rx, retired_tx, Arc::new(AtomicU64::new(0)));
        tx.send(GraphCmd::Add { id: 4, node: RenderNode::gain(0.5, SR) }).unwrap();
        let mut buf = vec![0.0; 64];
        r.render(&mut buf, 1);
        assert!(retired_rx.try_recv().is_err());

        tx.send(GraphCmd::Free { id: 4 }).unwrap();
        r.render(&mut buf, 1);
        assert!(matches!(retired_rx.try_recv(), Ok(RenderNode::Gain { .. })));
        assert_eq!(r.node_count(), 0);
    }

    #[test]
    fn replanning_reuses_its_buffers() {
        let (mut r, tx) = renderer();
        let capacities = |r: &SoftRenderer| {
            (r.plan.order.capacity(), r.plan.inputs.capacity(), r.plan.links.capacity(), r.values.capacity())
        };
        let before = capacities(&r);
        let mut buf = vec![0.0; 64];
        tx.send(GraphCmd::Add { id: 0, node: RenderNode::gain(1.0, SR) }).unwrap();
        tx.send(GraphCmd::Connect { from: 0, to: Port::Output }).unwrap();
        for note in 1..40 {
            tx.send(GraphCmd::Add { id: note, node: RenderNode::oscillator(Wave::Sine, 220.0, SR) }).unwrap();
            tx.send(GraphCmd::Connect { from: note, to: Port::Node(0) }).unwrap();
            r.render(&mut buf, 1);
            if note > 2 {
                tx.send(GraphCmd::Free { id: note - 2 }).unwrap();
            }
        }
        r.render(&mut buf, 1);
        assert_eq!(r.node_count(), 3);
        assert_eq!(r.plan.order.len(), 3);
        assert_eq!(r.plan.inputs_of(r.plan.pos[0]).len(), 2);
        assert_eq!(capacities(&r), before);
    }

    #[test]
    fn cycles_are_left_out_of_the_plan() {
        let (mut r, tx) = renderer();
        tx.send(GraphCmd::Add { id: 0, node: RenderNode::gain(1.0, SR) }).unwrap();
        tx.send(GraphCmd::Add { id: 1, node: RenderNode::gain(1.0, SR) }).unwrap();
        tx.send(GraphCmd::Add { id: 2, node: RenderNode::oscillator(Wave::Saw, 100.0, SR) }).unwrap();
        tx.send(GraphCmd::Connect { from: 0, to: Port::Node(1) }).unwrap();
        tx.send(GraphCmd::Connect { from: 1, to: Port::Node(0) }).unwrap();
        tx.send(GraphCmd::Connect { from: 2, to: Port::Output }).unwrap();
        tx.send(GraphCmd::Start { id: 2, at: 0.0 }).unwrap();
        let mut buf = vec![0.0; 400];
        r.render(&mut buf, 1);
        assert_eq!(r.plan.order, vec![2]);
        assert!(peak(&buf) > 0.5);
    }
}
