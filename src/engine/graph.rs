// Realized processing graph
//
// Nodes are primitive processors addressed by NodeId. Each non-marker chain
// row realizes as one Stage, a tagged variant naming the node(s) it owns and
// routing its parameters to them. Connections are an explicit ordered edge
// list from Source to Sink.

use log::debug;

use super::dsp::{
  delay::FeedbackDelay,
  drive::Drive,
  filter::{Filter, FilterMode},
  mix::{Gain, Panner},
  pitch::PitchShift,
  reverb::Reverb,
  shifter::FrequencyShifter,
};
use super::params::{amount_to_drive, balance_to_pan, cutoff_to_freq, ratio_to_semitones, time_to_decay};
use super::registry::EffectKind;

const MASTER_GAIN: f32 = 0.8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
  pub fn index(self) -> usize { self.0 }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endpoint {
  /// Looping sample player; its level is the marker row's `level`.
  Source,
  Node(NodeId),
  /// Master output.
  Sink,
}

/// A settable quantity on a node, in the node's own units.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
  Gain,
  Pan,
  Frequency,
  Drive,
  Wet,
  DelayTime,
  Feedback,
  Decay,
  Shift,
  Pitch,
}

pub enum Processor {
  Gain(Gain),
  Panner(Panner),
  Filter(Filter),
  Drive(Drive),
  Delay(FeedbackDelay),
  Reverb(Reverb),
  Shifter(FrequencyShifter),
  Pitch(PitchShift),
}

impl Processor {
  pub fn label(&self) -> &'static str {
    match self {
      Processor::Gain(_) => "gain",
      Processor::Panner(_) => "panner",
      Processor::Filter(f) => match f.mode() { FilterMode::Lowpass => "lowpass", FilterMode::Highpass => "highpass" },
      Processor::Drive(_) => "drive",
      Processor::Delay(_) => "delay",
      Processor::Reverb(_) => "reverb",
      Processor::Shifter(_) => "shifter",
      Processor::Pitch(_) => "pitch",
    }
  }

  /// Returns false when the node has no such control.
  pub fn set(&mut self, control: Control, v: f32) -> bool {
    match (self, control) {
      (Processor::Gain(g), Control::Gain) => g.set_gain(v),
      (Processor::Panner(p), Control::Pan) => p.set_pan(v),
      (Processor::Filter(f), Control::Frequency) => f.set_freq(v),
      (Processor::Drive(d), Control::Drive) => d.set_drive(v),
      (Processor::Drive(d), Control::Wet) => d.set_wet(v),
      (Processor::Delay(d), Control::DelayTime) => d.set_time(v),
      (Processor::Delay(d), Control::Feedback) => d.set_feedback(v),
      (Processor::Delay(d), Control::Wet) => d.set_wet(v),
      (Processor::Reverb(r), Control::Decay) => r.set_decay(v),
      (Processor::Reverb(r), Control::Wet) => r.set_wet(v),
      (Processor::Shifter(s), Control::Shift) => s.set_shift(v),
      (Processor::Shifter(s), Control::Wet) => s.set_wet(v),
      (Processor::Pitch(p), Control::Pitch) => p.set_semitones(v),
      (Processor::Pitch(p), Control::Wet) => p.set_wet(v),
      _ => return false,
    }
    true
  }

  pub fn get(&self, control: Control) -> Option<f32> {
    Some(match (self, control) {
      (Processor::Gain(g), Control::Gain) => g.gain(),
      (Processor::Panner(p), Control::Pan) => p.pan(),
      (Processor::Filter(f), Control::Frequency) => f.freq(),
      (Processor::Drive(d), Control::Drive) => d.drive(),
      (Processor::Drive(d), Control::Wet) => d.wet(),
      (Processor::Delay(d), Control::DelayTime) => d.time(),
      (Processor::Delay(d), Control::Feedback) => d.feedback(),
      (Processor::Delay(d), Control::Wet) => d.wet(),
      (Processor::Reverb(r), Control::Decay) => r.decay(),
      (Processor::Reverb(r), Control::Wet) => r.wet(),
      (Processor::Shifter(s), Control::Shift) => s.shift(),
      (Processor::Shifter(s), Control::Wet) => s.wet(),
      (Processor::Pitch(p), Control::Pitch) => p.semitones(),
      (Processor::Pitch(p), Control::Wet) => p.wet(),
      _ => return None,
    })
  }

  fn process(&mut self, l: f32, r: f32) -> (f32, f32) {
    match self {
      Processor::Gain(g) => g.process(l, r),
      Processor::Panner(p) => p.process(l, r),
      Processor::Filter(f) => f.process(l, r),
      Processor::Drive(d) => d.process(l, r),
      Processor::Delay(d) => d.process(l, r),
      Processor::Reverb(rv) => rv.process(l, r),
      Processor::Shifter(s) => s.process(l, r),
      Processor::Pitch(p) => p.process(l, r),
    }
  }
}

/// Realized form of one chain row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
  Balance { panner: NodeId },
  Lowpass { filter: NodeId },
  Highpass { filter: NodeId },
  /// highpass -> drive -> lowpass, wired internally.
  Dist { highpass: NodeId, drive: NodeId, lowpass: NodeId },
  Delay { delay: NodeId },
  Reverb { reverb: NodeId },
  Ring { shifter: NodeId },
  Harmony { pitch: NodeId },
  Ssb { shifter: NodeId },
  /// Unknown kinds pass audio through unchanged.
  Passthrough { gain: NodeId },
}

impl Stage {
  pub fn kind(&self) -> Option<EffectKind> {
    Some(match self {
      Stage::Balance { .. } => EffectKind::Balance,
      Stage::Lowpass { .. } => EffectKind::Lowpass,
      Stage::Highpass { .. } => EffectKind::Highpass,
      Stage::Dist { .. } => EffectKind::Dist,
      Stage::Delay { .. } => EffectKind::Delay,
      Stage::Reverb { .. } => EffectKind::Reverb,
      Stage::Ring { .. } => EffectKind::Ring,
      Stage::Harmony { .. } => EffectKind::Harmony,
      Stage::Ssb { .. } => EffectKind::Ssb,
      Stage::Passthrough { .. } => return None,
    })
  }

  pub fn input(&self) -> NodeId {
    match *self {
      Stage::Dist { highpass, .. } => highpass,
      _ => self.output(),
    }
  }

  pub fn output(&self) -> NodeId {
    match *self {
      Stage::Balance { panner: n }
      | Stage::Lowpass { filter: n }
      | Stage::Highpass { filter: n }
      | Stage::Delay { delay: n }
      | Stage::Reverb { reverb: n }
      | Stage::Ring { shifter: n }
      | Stage::Harmony { pitch: n }
      | Stage::Ssb { shifter: n }
      | Stage::Passthrough { gain: n } => n,
      Stage::Dist { lowpass, .. } => lowpass,
    }
  }

  /// All nodes owned by this stage, input first.
  pub fn nodes(&self) -> Vec<NodeId> {
    match *self {
      Stage::Dist { highpass, drive, lowpass } => vec![highpass, drive, lowpass],
      _ => vec![self.output()],
    }
  }

  /// Node, control and node-unit value for an already clamped parameter value.
  /// Parameters with no realized control route to `None`.
  pub fn route(&self, param: &str, v: f32) -> Option<(NodeId, Control, f32)> {
    match (*self, param) {
      (Stage::Balance { panner }, "balance") => Some((panner, Control::Pan, balance_to_pan(v))),
      (Stage::Lowpass { filter } | Stage::Highpass { filter }, "cutoff") => Some((filter, Control::Frequency, cutoff_to_freq(v))),
      (Stage::Dist { drive, .. }, "amount") => Some((drive, Control::Drive, amount_to_drive(v))),
      (Stage::Dist { drive, .. }, "mix") => Some((drive, Control::Wet, v)),
      (Stage::Dist { lowpass, .. }, "lowpass-cutoff") => Some((lowpass, Control::Frequency, cutoff_to_freq(v))),
      (Stage::Dist { highpass, .. }, "highpass-cutoff") => Some((highpass, Control::Frequency, cutoff_to_freq(v))),
      (Stage::Delay { delay }, "time") => Some((delay, Control::DelayTime, v)),
      (Stage::Delay { delay }, "echo") => Some((delay, Control::Feedback, v)),
      (Stage::Delay { delay }, "wet-level") => Some((delay, Control::Wet, v)),
      (Stage::Reverb { reverb }, "time") => Some((reverb, Control::Decay, time_to_decay(v))),
      (Stage::Reverb { reverb }, "wet-level") => Some((reverb, Control::Wet, v)),
      (Stage::Ring { shifter }, "frequency") => Some((shifter, Control::Shift, v)),
      (Stage::Ring { shifter }, "mix") => Some((shifter, Control::Wet, v)),
      (Stage::Harmony { pitch }, "pitch") => Some((pitch, Control::Pitch, ratio_to_semitones(v))),
      (Stage::Harmony { pitch }, "dry-level") => Some((pitch, Control::Wet, 1.0 - v)),
      (Stage::Ssb { shifter }, "frequency") => Some((shifter, Control::Shift, v)),
      _ => None,
    }
  }
}

/// Marker parameters that reach the graph: only `level`, on the source.
pub fn marker_route(param: &str, v: f32) -> Option<(Endpoint, Control, f32)> {
  match param {
    "level" => Some((Endpoint::Source, Control::Gain, v)),
    _ => None,
  }
}

pub struct RealizedGraph {
  sr: f32,
  nodes: Vec<Processor>,
  connections: Vec<(Endpoint, Endpoint)>,
  stages: Vec<Stage>,
  index: Vec<Option<usize>>,
  source_gain: f32,
  // signal order derived from `connections`
  path: Vec<NodeId>,
}

impl RealizedGraph {
  /// Graph with the source wired straight to the sink.
  pub fn new(sr: f32) -> Self {
    let mut g = Self::detached(sr);
    g.connect(Endpoint::Source, Endpoint::Sink);
    g.rebuild_path();
    g
  }

  pub(crate) fn detached(sr: f32) -> Self {
    Self { sr, nodes: Vec::new(), connections: Vec::new(), stages: Vec::new(), index: Vec::new(), source_gain: 1.0, path: Vec::new() }
  }

  pub fn sample_rate(&self) -> f32 { self.sr }

  pub(crate) fn add_node(&mut self, p: Processor) -> NodeId {
    self.nodes.push(p);
    NodeId(self.nodes.len() - 1)
  }

  pub(crate) fn connect(&mut self, from: Endpoint, to: Endpoint) { self.connections.push((from, to)); }

  pub(crate) fn push_position(&mut self, stage: Option<Stage>) {
    let slot = stage.map(|s| { self.stages.push(s); self.stages.len() - 1 });
    self.index.push(slot);
  }

  pub(crate) fn set_source_gain(&mut self, g: f32) { self.source_gain = g.max(0.0); }

  pub fn source_gain(&self) -> f32 { self.source_gain }

  pub fn stages(&self) -> &[Stage] { &self.stages }

  pub fn node_count(&self) -> usize { self.nodes.len() }

  pub fn connections(&self) -> &[(Endpoint, Endpoint)] { &self.connections }

  /// Chain position to stage index; marker positions map to `None`.
  pub fn index_map(&self) -> &[Option<usize>] { &self.index }

  pub fn stage_at(&self, position: usize) -> Option<&Stage> {
    let i = (*self.index.get(position)?)?;
    self.stages.get(i)
  }

  pub fn node(&self, id: NodeId) -> Option<&Processor> { self.nodes.get(id.0) }

  pub fn control(&self, at: Endpoint, control: Control) -> Option<f32> {
    match (at, control) {
      (Endpoint::Source, Control::Gain) => Some(self.source_gain),
      (Endpoint::Node(id), c) => self.nodes.get(id.0)?.get(c),
      _ => None,
    }
  }

  /// Value of a chain parameter as realized in the graph, in node units.
  pub fn realized(&self, position: usize, param: &str, stored: f32) -> Option<f32> {
    let (node, control, _) = self.stage_at(position)?.route(param, stored)?;
    self.control(Endpoint::Node(node), control)
  }

  /// Sets a control; topology is untouched. Returns false if nothing took the value.
  pub fn apply(&mut self, at: Endpoint, control: Control, v: f32) -> bool {
    match (at, control) {
      (Endpoint::Source, Control::Gain) => { self.set_source_gain(v); true }
      (Endpoint::Node(id), c) => self.nodes.get_mut(id.0).map_or(false, |n| n.set(c, v)),
      _ => false,
    }
  }

  /// Releases every node and connection. The graph is unusable until rebuilt.
  pub fn dispose(&mut self) {
    debug!("disposing graph: {} nodes, {} connections", self.nodes.len(), self.connections.len());
    self.nodes.clear();
    self.connections.clear();
    self.stages.clear();
    self.index.clear();
    self.path.clear();
  }

  pub fn is_disposed(&self) -> bool { self.connections.is_empty() }

  /// Follows edges from the source; the compiler only builds a single path.
  pub(crate) fn rebuild_path(&mut self) {
    self.path.clear();
    let mut at = Endpoint::Source;
    while let Some(&(_, to)) = self.connections.iter().find(|(from, _)| *from == at) {
      match to {
        Endpoint::Node(id) => self.path.push(id),
        Endpoint::Sink | Endpoint::Source => break,
      }
      if self.path.len() > self.nodes.len() { break; }
      at = to;
    }
  }

  /// Node ids in signal order.
  pub fn signal_path(&self) -> &[NodeId] { &self.path }

  pub fn render_frame(&mut self, l: f32, r: f32) -> (f32, f32) {
    if self.is_disposed() { return (0.0, 0.0); }
    let (mut l, mut r) = (l * self.source_gain, r * self.source_gain);
    for &id in &self.path {
      let (nl, nr) = self.nodes[id.0].process(l, r);
      l = nl; r = nr;
    }
    let (l, r) = if l.is_finite() && r.is_finite() { (l, r) } else { (0.0, 0.0) };
    (soft_clip(l * MASTER_GAIN), soft_clip(r * MASTER_GAIN))
  }
}

fn soft_clip(x: f32) -> f32 { (x.tanh()).clamp(-1.0, 1.0) }
