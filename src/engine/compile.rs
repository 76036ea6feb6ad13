// Chain Compiler
//
// Chain -> RealizedGraph. Markers realize no node but keep their position
// in the index map. Stages are wired strictly in chain order, each stage's
// output feeding the next stage's input; compound internals are wired when
// the stage is built.

use log::{debug, warn};

use super::dsp::{
  delay::FeedbackDelay,
  drive::Drive,
  filter::{Filter, FilterMode},
  mix::{Gain, Panner},
  pitch::PitchShift,
  reverb::Reverb,
  shifter::FrequencyShifter,
};
use super::graph::{Endpoint, Processor, RealizedGraph, Stage};
use super::params::{amount_to_drive, balance_to_pan, cutoff_to_freq, ratio_to_semitones, time_to_decay};
use super::preset::{Chain, EffectInstance};
use super::registry::EffectKind;

// Longest DELAY time plus headroom for smoothing.
const DELAY_BUFFER_SECS: f32 = 1.2;

pub fn compile(chain: &Chain, sr: f32) -> RealizedGraph {
  let mut graph = RealizedGraph::detached(sr);
  let level = chain
    .marker_position()
    .and_then(|p| chain.get(p))
    .and_then(|m| m.value("level"))
    .unwrap_or(1.0);
  graph.set_source_gain(level);

  let mut upstream = Endpoint::Source;
  for row in chain {
    let Some(stage) = build_stage(&mut graph, row) else {
      graph.push_position(None);
      continue;
    };
    graph.connect(upstream, Endpoint::Node(stage.input()));
    upstream = Endpoint::Node(stage.output());
    graph.push_position(Some(stage));
  }
  // with no stages this is the direct source -> sink hookup
  graph.connect(upstream, Endpoint::Sink);
  graph.rebuild_path();
  let path: Vec<&str> = graph.signal_path().iter().filter_map(|&id| graph.node(id)).map(Processor::label).collect();
  debug!("compiled {} rows into {} stages: {}", chain.len(), graph.stages().len(), path.join(" -> "));
  graph
}

/// Replaces `live` with a freshly compiled graph, releasing the old one first.
pub fn recompile(live: &mut RealizedGraph, chain: &Chain) {
  let sr = live.sample_rate();
  live.dispose();
  *live = compile(chain, sr);
}

/// Realizes one row. Markers hold their position without nodes.
fn build_stage(graph: &mut RealizedGraph, row: &EffectInstance) -> Option<Stage> {
  let sr = graph.sample_rate();
  // every schema parameter resolves, so unwrap_or only guards unknown names
  let v = |name: &str| row.value(name).unwrap_or(0.0);
  let Some(kind) = row.kind() else {
    warn!("unknown effect kind `{}`, passing audio through", row.effect);
    let gain = graph.add_node(Processor::Gain(Gain::new(1.0)));
    return Some(Stage::Passthrough { gain });
  };
  let stage = match kind {
    EffectKind::Sample => return None,
    EffectKind::Balance => {
      let panner = graph.add_node(Processor::Panner(Panner::new(balance_to_pan(v("balance")))));
      Stage::Balance { panner }
    }
    EffectKind::Lowpass => {
      let filter = graph.add_node(Processor::Filter(Filter::new(FilterMode::Lowpass, cutoff_to_freq(v("cutoff")), sr)));
      Stage::Lowpass { filter }
    }
    EffectKind::Highpass => {
      let filter = graph.add_node(Processor::Filter(Filter::new(FilterMode::Highpass, cutoff_to_freq(v("cutoff")), sr)));
      Stage::Highpass { filter }
    }
    EffectKind::Dist => {
      let highpass = graph.add_node(Processor::Filter(Filter::new(FilterMode::Highpass, cutoff_to_freq(v("highpass-cutoff")), sr)));
      let drive = graph.add_node(Processor::Drive(Drive::new(amount_to_drive(v("amount")), v("mix"))));
      let lowpass = graph.add_node(Processor::Filter(Filter::new(FilterMode::Lowpass, cutoff_to_freq(v("lowpass-cutoff")), sr)));
      graph.connect(Endpoint::Node(highpass), Endpoint::Node(drive));
      graph.connect(Endpoint::Node(drive), Endpoint::Node(lowpass));
      Stage::Dist { highpass, drive, lowpass }
    }
    EffectKind::Delay => {
      let delay = graph.add_node(Processor::Delay(FeedbackDelay::new(DELAY_BUFFER_SECS, sr, v("time"), v("echo"), v("wet-level"))));
      Stage::Delay { delay }
    }
    EffectKind::Reverb => {
      let reverb = graph.add_node(Processor::Reverb(Reverb::new(sr, time_to_decay(v("time")), v("wet-level"))));
      Stage::Reverb { reverb }
    }
    EffectKind::Ring => {
      let shifter = graph.add_node(Processor::Shifter(FrequencyShifter::new(sr, v("frequency"), v("mix"))));
      Stage::Ring { shifter }
    }
    EffectKind::Harmony => {
      let pitch = graph.add_node(Processor::Pitch(PitchShift::new(sr, ratio_to_semitones(v("pitch")), 1.0 - v("dry-level"))));
      Stage::Harmony { pitch }
    }
    EffectKind::Ssb => {
      let shifter = graph.add_node(Processor::Shifter(FrequencyShifter::new(sr, v("frequency"), 1.0)));
      Stage::Ssb { shifter }
    }
  };
  Some(stage)
}
