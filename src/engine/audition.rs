use std::time::Instant;

use log::info;

use super::compile::recompile;
use super::graph::RealizedGraph;
use super::modulation::{FrameQueue, FrameRequest, FrameScheduler, Modulation, Source};
use super::patch;
use super::preset::{Chain, Preset};

/// The live graph for the auditioned preset plus the modulation sources driving it.
pub struct Audition<S: FrameScheduler = FrameQueue> {
  graph: RealizedGraph,
  modulation: Modulation<S>,
}

impl Audition<FrameQueue> {
  pub fn new(sr: f32) -> Self { Self::with_modulation(sr, Modulation::new(FrameQueue::new())) }
}

impl<S: FrameScheduler> Audition<S> {
  pub fn with_modulation(sr: f32, modulation: Modulation<S>) -> Self {
    Self { graph: RealizedGraph::new(sr), modulation }
  }

  pub fn graph(&self) -> &RealizedGraph { &self.graph }
  pub fn modulation(&self) -> &Modulation<S> { &self.modulation }
  pub fn modulation_mut(&mut self) -> &mut Modulation<S> { &mut self.modulation }

  /// Tears down the live graph and builds one for `chain`.
  pub fn compile(&mut self, chain: &Chain) { recompile(&mut self.graph, chain); }

  pub fn set_parameter(&mut self, chain: &mut Chain, position: usize, param: &str, value: f32) -> Option<f32> {
    patch::set_parameter(chain, &mut self.graph, position, param, value)
  }

  pub fn arm_handle(&mut self, preset: &mut Preset, active: bool) {
    self.modulation.arm(Source::Handle, preset.handle.as_ref(), active, &mut preset.list, &mut self.graph);
  }

  pub fn arm_shake(&mut self, preset: &mut Preset, active: bool) {
    self.modulation.arm(Source::Shake, preset.shake.as_ref(), active, &mut preset.list, &mut self.graph);
  }

  pub fn start_lfo(&mut self, preset: &mut Preset, now: Instant) {
    self.modulation.start_lfo(preset.lfo.as_ref(), &mut preset.list, &mut self.graph, now);
  }

  pub fn stop_lfo(&mut self, preset: &mut Preset) {
    self.modulation.stop_lfo(preset.lfo.as_ref(), &mut preset.list, &mut self.graph);
  }

  pub fn on_frame(&mut self, preset: &mut Preset, req: FrameRequest, now: Instant) -> bool {
    self.modulation.on_frame(req, &mut preset.list, &mut self.graph, now)
  }

  pub fn clear_base_values(&mut self) { self.modulation.clear_base_values(); }

  /// Stops every source on the outgoing preset (restoring its values) and
  /// forgets the base snapshots. Call before compiling a different chain.
  pub fn release_all(&mut self, preset: &mut Preset) {
    self.stop_lfo(preset);
    self.arm_handle(preset, false);
    self.arm_shake(preset, false);
    self.clear_base_values();
  }

  /// Switches the auditioned preset: releases `outgoing`, then compiles `incoming`.
  pub fn select(&mut self, outgoing: &mut Preset, incoming: &Preset) {
    self.release_all(outgoing);
    self.compile(&incoming.list);
    info!("auditioning `{}` ({} rows)", incoming.name, incoming.list.len());
  }

  pub fn render_frame(&mut self, l: f32, r: f32) -> (f32, f32) { self.graph.render_frame(l, r) }
}
