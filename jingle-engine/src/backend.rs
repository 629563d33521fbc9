//! Audio backend trait: what the player *means* to do to the audio graph.
//!
//! The player never renders audio itself. It opens a backend context, creates
//! nodes (gains, oscillators, a convolver), wires them, and schedules param
//! automation on the backend's own clock. Implementations either realise the
//! graph ([`SoftBackend`](crate::soft::SoftBackend)) or record the calls
//! ([`TestBackend`]) so scheduling logic can be tested without a device.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use jingle_core::automation::AutomationEvent;

use crate::nodes::Wave;
use crate::reverb::ImpulseBuffer;
use crate::timer::{Clock, ManualClock};

/// Result type for backend operations.
pub type BackendResult<T = ()> = Result<T, BackendError>;

/// Error from a backend operation.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendError(pub String);

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BackendError {}

impl From<String> for BackendError {
    fn from(s: String) -> Self {
        BackendError(s)
    }
}

impl From<&str> for BackendError {
    fn from(s: &str) -> Self {
        BackendError(s.to_string())
    }
}

/// Node handle, unique within one backend for its whole lifetime.
pub type NodeId = u32;

/// Where a node's output goes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Port {
    Node(NodeId),
    Output,
}

/// Automatable parameter of a node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// Linear gain of a gain node.
    Gain,
    /// Oscillator frequency in Hz.
    Frequency,
}

/// Semantic-level audio backend.
///
/// Times are absolute seconds on the backend clock (`current_time`). Node
/// operations outside an open context fail.
pub trait AudioBackend {
    /// Acquire the host audio subsystem. Returns the context sample rate.
    fn open(&mut self) -> BackendResult<f32>;

    /// Release every node and the context. Safe to call when not open.
    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Backend clock in seconds.
    fn current_time(&self) -> f64;

    fn create_gain(&mut self, gain: f32) -> BackendResult<NodeId>;

    /// An oscillator that stays silent until `start_node`.
    fn create_oscillator(&mut self, wave: Wave, freq_hz: f32) -> BackendResult<NodeId>;

    fn create_convolver(&mut self, impulse: ImpulseBuffer) -> BackendResult<NodeId>;

    fn connect(&mut self, from: NodeId, to: Port) -> BackendResult;

    fn automate(&mut self, node: NodeId, param: ParamKind, event: AutomationEvent) -> BackendResult;

    fn start_node(&mut self, node: NodeId, at: f64) -> BackendResult;

    fn stop_node(&mut self, node: NodeId, at: f64) -> BackendResult;

    /// Remove a node and its connections.
    fn free_node(&mut self, node: NodeId) -> BackendResult;
}

// ─── Test Backend ───────────────────────────────────────────────────

/// An operation recorded by `TestBackend` for assertion in tests.
#[derive(Debug, Clone, PartialEq)]
pub enum TestOp {
    Open,
    Close,
    CreateGain { node: NodeId, gain: f32 },
    CreateOscillator { node: NodeId, wave: Wave, freq_hz: f32 },
    CreateConvolver { node: NodeId, channels: usize, frames: usize },
    Connect { from: NodeId, to: Port },
    Automate { node: NodeId, param: ParamKind, event: AutomationEvent },
    Start { node: NodeId, at: f64 },
    Stop { node: NodeId, at: f64 },
    Free(NodeId),
}

#[derive(Debug, Default)]
struct TestState {
    ops: Vec<TestOp>,
    open: bool,
    next_id: NodeId,
    live: Vec<NodeId>,
    refuse_open: Option<String>,
    // node creations allowed before failing; None = unlimited
    create_budget: Option<usize>,
}

/// A backend that records all operations for assertions.
///
/// Clones share state, so a test keeps one clone while the player owns the
/// other. Time comes from a [`ManualClock`].
#[derive(Debug, Clone, Default)]
pub struct TestBackend {
    state: Arc<Mutex<TestState>>,
    clock: ManualClock,
}

impl TestBackend {
    pub fn new() -> Self { Self::default() }

    pub fn with_clock(clock: ManualClock) -> Self {
        Self { state: Arc::default(), clock }
    }

    /// Make the next `open` calls fail with `why`.
    pub fn refuse_open(&self, why: &str) {
        self.lock().refuse_open = Some(why.to_string());
    }

    /// Allow only `n` more node creations, then fail.
    pub fn fail_after_creates(&self, n: usize) {
        self.lock().create_budget = Some(n);
    }

    fn lock(&self) -> MutexGuard<'_, TestState> {
        // a panicking test thread must not hide the recorded ops
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Return all recorded operations.
    pub fn operations(&self) -> Vec<TestOp> { self.lock().ops.clone() }

    /// Clear recorded operations.
    pub fn clear(&self) { self.lock().ops.clear(); }

    /// Count operations matching a predicate.
    pub fn count<F: Fn(&TestOp) -> bool>(&self, f: F) -> usize {
        self.lock().ops.iter().filter(|op| f(op)).count()
    }

    /// Nodes created and not yet freed in the current context.
    pub fn live_nodes(&self) -> Vec<NodeId> { self.lock().live.clone() }

    /// `(oscillator, start time)` of every started oscillator, in call order.
    pub fn note_starts(&self) -> Vec<(NodeId, f64)> {
        self.lock()
            .ops
            .iter()
            .filter_map(|op| match op {
                TestOp::Start { node, at } => Some((*node, *at)),
                _ => None,
            })
            .collect()
    }

    /// Frequencies oscillators were created with, in call order.
    pub fn note_frequencies(&self) -> Vec<f32> {
        self.lock()
            .ops
            .iter()
            .filter_map(|op| match op {
                TestOp::CreateOscillator { freq_hz, .. } => Some(*freq_hz),
                _ => None,
            })
            .collect()
    }

    fn create(&self, make: impl FnOnce(NodeId) -> TestOp) -> BackendResult<NodeId> {
        let mut st = self.lock();
        if !st.open {
            return Err("no audio context".into());
        }
        if let Some(budget) = st.create_budget.as_mut() {
            if *budget == 0 {
                return Err("node allocation failed".into());
            }
            *budget -= 1;
        }
        let id = st.next_id;
        st.next_id += 1;
        st.live.push(id);
        st.ops.push(make(id));
        Ok(id)
    }

    fn record(&self, op: TestOp) -> BackendResult {
        let mut st = self.lock();
        if !st.open {
            return Err("no audio context".into());
        }
        st.ops.push(op);
        Ok(())
    }
}

impl AudioBackend for TestBackend {
    fn open(&mut self) -> BackendResult<f32> {
        let mut st = self.lock();
        if let Some(why) = st.refuse_open.clone() {
            return Err(BackendError(why));
        }
        st.open = true;
        st.ops.push(TestOp::Open);
        Ok(48_000.0)
    }

    fn close(&mut self) {
        let mut st = self.lock();
        if st.open {
            st.open = false;
            st.live.clear();
            st.ops.push(TestOp::Close);
        }
    }

    fn is_open(&self) -> bool { self.lock().open }

    fn current_time(&self) -> f64 { self.clock.now() }

    fn create_gain(&mut self, gain: f32) -> BackendResult<NodeId> {
        self.create(|node| TestOp::CreateGain { node, gain })
    }

    fn create_oscillator(&mut self, wave: Wave, freq_hz: f32) -> BackendResult<NodeId> {
        self.create(|node| TestOp::CreateOscillator { node, wave, freq_hz })
    }

    fn create_convolver(&mut self, impulse: ImpulseBuffer) -> BackendResult<NodeId> {
        self.create(|node| TestOp::CreateConvolver { node, channels: impulse.channel_count(), frames: impulse.len() })
    }

    fn connect(&mut self, from: NodeId, to: Port) -> BackendResult {
        self.record(TestOp::Connect { from, to })
    }

    fn automate(&mut self, node: NodeId, param: ParamKind, event: AutomationEvent) -> BackendResult {
        self.record(TestOp::Automate { node, param, event })
    }

    fn start_node(&mut self, node: NodeId, at: f64) -> BackendResult {
        self.record(TestOp::Start { node, at })
    }

    fn stop_node(&mut self, node: NodeId, at: f64) -> BackendResult {
        self.record(TestOp::Stop { node, at })
    }

    fn free_node(&mut self, node: NodeId) -> BackendResult {
        let mut st = self.lock();
        if !st.open {
            return Err("no audio context".into());
        }
        st.live.retain(|n| *n != node);
        st.ops.push(TestOp::Free(node));
        Ok(())
    }
}
