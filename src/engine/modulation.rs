// Modulation Engine
//
// Three sources (Handle, Shake, LFO) displace chain parameters through the
// patch protocol. Each (row, param) target has one base snapshot, taken the
// first time any source touches it, and one displacement per source. What
// gets written is clamp(base + sum of displacements); releasing the last
// source writes the base back exactly.

use std::collections::HashMap;
use std::f32::consts::TAU;
use std::time::Instant;

use log::{debug, trace};
use rand::{rngs::StdRng, Rng, SeedableRng};

use super::graph::RealizedGraph;
use super::params::ParamDef;
use super::patch::set_parameter;
use super::preset::{Chain, LfoBinding, LfoShape, ModBinding};

/// Random shape draws this many values per cycle.
const RANDOM_STEPS_PER_CYCLE: f32 = 4.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Source {
  Handle,
  Shake,
  Lfo,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Target {
  pub row: usize,
  pub param: String,
}

impl From<&ModBinding> for Target {
  fn from(b: &ModBinding) -> Self { Self { row: b.row, param: b.param.clone() } }
}

/// Pre-modulation values keyed by (row, param).
#[derive(Debug, Default)]
pub struct BaseValueCache {
  values: HashMap<Target, f32>,
}

impl BaseValueCache {
  /// Stores `current` unless a value is already cached; returns the cached value.
  pub fn capture(&mut self, target: &Target, current: f32) -> f32 {
    *self.values.entry(target.clone()).or_insert(current)
  }
  pub fn get(&self, target: &Target) -> Option<f32> { self.values.get(target).copied() }
  pub fn retain(&mut self, mut keep: impl FnMut(&Target) -> bool) { self.values.retain(|t, _| keep(t)); }
  pub fn len(&self) -> usize { self.values.len() }
  pub fn is_empty(&self) -> bool { self.values.is_empty() }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameRequest(u64);

/// Display-refresh callback source. The engine asks for one frame at a time and
/// may cancel the outstanding request.
pub trait FrameScheduler {
  fn request_frame(&mut self) -> FrameRequest;
  fn cancel_frame(&mut self, req: FrameRequest);
}

/// Holds at most one outstanding request; the host drains it with `take_due`
/// on every display refresh and hands it back through `on_frame`.
#[derive(Debug, Default)]
pub struct FrameQueue {
  next: u64,
  pending: Option<FrameRequest>,
}

impl FrameQueue {
  pub fn new() -> Self { Self::default() }
  pub fn pending(&self) -> Option<FrameRequest> { self.pending }
  pub fn take_due(&mut self) -> Option<FrameRequest> { self.pending.take() }
}

impl FrameScheduler for FrameQueue {
  fn request_frame(&mut self) -> FrameRequest {
    self.next += 1;
    let req = FrameRequest(self.next);
    self.pending = Some(req);
    req
  }
  fn cancel_frame(&mut self, req: FrameRequest) {
    if self.pending == Some(req) { self.pending = None; }
  }
}

/// Sample-and-hold state for the random shape.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomHold {
  step: Option<i64>,
  value: f32,
}

/// Oscillator value in [-1, 1] at `t` seconds after start.
pub fn oscillator<R: Rng>(shape: LfoShape, speed: f32, t: f32, hold: &mut RandomHold, rng: &mut R) -> f32 {
  match shape {
    LfoShape::Sine => (TAU * speed * t).sin(),
    LfoShape::Square => if (TAU * speed * t).sin() >= 0.0 { 1.0 } else { -1.0 },
    LfoShape::Sawtooth => 2.0 * (speed * t).rem_euclid(1.0) - 1.0,
    LfoShape::Random => {
      let step = (t * speed * RANDOM_STEPS_PER_CYCLE).floor() as i64;
      if hold.step != Some(step) {
        hold.step = Some(step);
        hold.value = rng.gen_range(-1.0..=1.0);
      }
      hold.value
    }
  }
}

struct LfoRun {
  binding: LfoBinding,
  started: Instant,
  frame: Option<FrameRequest>,
  hold: RandomHold,
}

pub struct Modulation<S: FrameScheduler = FrameQueue> {
  cache: BaseValueCache,
  offsets: HashMap<Target, Vec<(Source, f32)>>,
  armed: HashMap<Source, Target>,
  lfo: Option<LfoRun>,
  scheduler: S,
  rng: StdRng,
}

fn resolve(chain: &Chain, b: &ModBinding) -> Option<(Target, ParamDef, f32)> {
  let row = chain.get(b.row)?;
  let def = *row.kind()?.definition().param(&b.param)?;
  let current = row.value(&b.param)?;
  Some((Target::from(b), def, current))
}

impl<S: FrameScheduler> Modulation<S> {
  pub fn new(scheduler: S) -> Self { Self::with_rng(scheduler, StdRng::from_entropy()) }

  pub fn with_rng(scheduler: S, rng: StdRng) -> Self {
    Self { cache: BaseValueCache::default(), offsets: HashMap::new(), armed: HashMap::new(), lfo: None, scheduler, rng }
  }

  pub fn cache(&self) -> &BaseValueCache { &self.cache }
  pub fn scheduler(&self) -> &S { &self.scheduler }
  pub fn scheduler_mut(&mut self) -> &mut S { &mut self.scheduler }
  pub fn is_armed(&self, source: Source) -> bool { self.armed.contains_key(&source) }
  pub fn lfo_running(&self) -> bool { self.lfo.is_some() }

  /// Displacement currently held by `source` on `target`.
  pub fn offset(&self, source: Source, target: &Target) -> Option<f32> {
    self.offsets.get(target)?.iter().find(|(s, _)| *s == source).map(|(_, o)| *o)
  }

  fn total_offset(&self, target: &Target) -> f32 {
    self.offsets.get(target).map_or(0.0, |s| s.iter().map(|(_, o)| o).sum())
  }

  fn drive(&mut self, source: Source, binding: &ModBinding, unit: f32, chain: &mut Chain, graph: &mut RealizedGraph) -> Option<Target> {
    let (target, def, current) = resolve(chain, binding)?;
    let base = self.cache.capture(&target, current);
    let offset = def.range() * binding.depth() * unit;
    let slot = self.offsets.entry(target.clone()).or_default();
    match slot.iter_mut().find(|(s, _)| *s == source) {
      Some(entry) => entry.1 = offset,
      None => slot.push((source, offset)),
    }
    let out = def.clamp(base + self.total_offset(&target));
    trace!("{source:?} -> {}.{} = {out}", target.row, target.param);
    set_parameter(chain, graph, target.row, &target.param, out);
    Some(target)
  }

  fn release(&mut self, source: Source, target: &Target, chain: &mut Chain, graph: &mut RealizedGraph) {
    if let Some(slot) = self.offsets.get_mut(target) {
      slot.retain(|(s, _)| *s != source);
      if slot.is_empty() { self.offsets.remove(target); }
    }
    let Some(base) = self.cache.get(target) else { return };
    // the row may have been edited away since the source armed
    let def = chain.get(target.row).and_then(|r| r.kind()).and_then(|k| k.definition().param(&target.param)).copied();
    let Some(def) = def else { return };
    let out = def.clamp(base + self.total_offset(target));
    debug!("{source:?} released {}.{} -> {out}", target.row, target.param);
    set_parameter(chain, graph, target.row, &target.param, out);
  }

  /// Handle and Shake: full-depth displacement while active, base restored on release.
  pub fn arm(&mut self, source: Source, binding: Option<&ModBinding>, active: bool, chain: &mut Chain, graph: &mut RealizedGraph) {
    if active {
      if let Some(prev) = self.armed.remove(&source) {
        if binding.map(Target::from).as_ref() != Some(&prev) {
          self.release(source, &prev, chain, graph);
        }
      }
      match binding.and_then(|b| self.drive(source, b, 1.0, chain, graph)) {
        Some(target) => { self.armed.insert(source, target); }
        None => debug!("{source:?}: binding does not resolve, ignored"),
      }
    } else {
      let target = self.armed.remove(&source).or_else(|| binding.map(Target::from));
      if let Some(target) = target {
        self.release(source, &target, chain, graph);
      }
    }
  }

  /// Starts (or restarts) the LFO. The first value is applied immediately.
  pub fn start_lfo(&mut self, binding: Option<&LfoBinding>, chain: &mut Chain, graph: &mut RealizedGraph, now: Instant) {
    if self.lfo.is_some() {
      self.stop_lfo(None, chain, graph);
    }
    let Some(binding) = binding else { return };
    if resolve(chain, &binding.target).is_none() {
      debug!("lfo: binding does not resolve, not started");
      return;
    }
    self.lfo = Some(LfoRun { binding: binding.clone(), started: now, frame: None, hold: RandomHold::default() });
    self.tick(chain, graph, now);
  }

  /// Cancels the pending frame, then restores the base value.
  pub fn stop_lfo(&mut self, binding: Option<&LfoBinding>, chain: &mut Chain, graph: &mut RealizedGraph) {
    let run = self.lfo.take();
    if let Some(req) = run.as_ref().and_then(|r| r.frame) {
      self.scheduler.cancel_frame(req);
    }
    let target = run.as_ref().map(|r| Target::from(&r.binding.target)).or_else(|| binding.map(|b| Target::from(&b.target)));
    if let Some(target) = target {
      self.release(Source::Lfo, &target, chain, graph);
    }
  }

  /// Frame callback. Requests that were cancelled or superseded are ignored.
  pub fn on_frame(&mut self, req: FrameRequest, chain: &mut Chain, graph: &mut RealizedGraph, now: Instant) -> bool {
    let due = self.lfo.as_ref().map_or(false, |r| r.frame == Some(req));
    if !due {
      trace!("ignoring stale frame {req:?}");
      return false;
    }
    self.tick(chain, graph, now);
    true
  }

  fn tick(&mut self, chain: &mut Chain, graph: &mut RealizedGraph, now: Instant) {
    let Some(run) = self.lfo.as_mut() else { return };
    let t = now.saturating_duration_since(run.started).as_secs_f32();
    let unit = oscillator(run.binding.shape, run.binding.speed(), t, &mut run.hold, &mut self.rng);
    let target = run.binding.target.clone();
    // a stale binding skips the write but keeps the loop alive
    self.drive(Source::Lfo, &target, unit, chain, graph);
    let req = self.scheduler.request_frame();
    if let Some(run) = self.lfo.as_mut() {
      run.frame = Some(req);
    }
  }

  /// Forgets base snapshots. Targets a source is still displacing keep theirs,
  /// so a later release or stop lands on the pre-modulation value.
  pub fn clear_base_values(&mut self) {
    let offsets = &self.offsets;
    self.cache.retain(|t| offsets.contains_key(t));
    debug!("base values cleared, {} held by active sources", self.cache.len());
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::engine::compile::compile;
  use crate::engine::preset::EffectInstance;
  use crate::engine::registry::EffectKind;
  use std::time::Duration;

  const SR: f32 = 44_100.0;

  fn setup() -> (Chain, RealizedGraph, Modulation) {
    let chain = Chain::new(vec![EffectInstance::new(EffectKind::Lowpass), EffectInstance::new(EffectKind::Sample)]);
    let graph = compile(&chain, SR);
    (chain, graph, Modulation::with_rng(FrameQueue::new(), StdRng::seed_from_u64(7)))
  }

  fn cutoff(chain: &Chain) -> f32 { chain.get(0).unwrap().params["cutoff"] }

  #[test]
  fn oscillator_shapes() {
    let mut h = RandomHold::default();
    let mut rng = StdRng::seed_from_u64(1);
    assert!((oscillator(LfoShape::Sine, 1.0, 0.25, &mut h, &mut rng) - 1.0).abs() < 1e-6);
    assert_eq!(oscillator(LfoShape::Square, 1.0, 0.0, &mut h, &mut rng), 1.0);
    assert_eq!(oscillator(LfoShape::Square, 1.0, 0.75, &mut h, &mut rng), -1.0);
    assert_eq!(oscillator(LfoShape::Sawtooth, 1.0, 0.25, &mut h, &mut rng), -0.5);
    assert_eq!(oscillator(LfoShape::Sawtooth, 2.0, 0.0, &mut h, &mut rng), -1.0);
  }

  #[test]
  fn random_shape_holds_between_steps() {
    let mut h = RandomHold::default();
    let mut rng = StdRng::seed_from_u64(3);
    let a = oscillator(LfoShape::Random, 1.0, 0.01, &mut h, &mut rng);
    let b = oscillator(LfoShape::Random, 1.0, 0.24, &mut h, &mut rng);
    assert_eq!(a, b);
    assert!((-1.0..=1.0).contains(&a));
    let c = oscillator(LfoShape::Random, 1.0, 0.26, &mut h, &mut rng);
    assert_eq!(h.step, Some(1));
    assert!((-1.0..=1.0).contains(&c));
  }

  #[test]
  fn handle_round_trip_restores_base() {
    let (mut chain, mut graph, mut m) = setup();
    chain.get_mut(0).unwrap().set("cutoff", 0.3);
    let b = ModBinding::new(0, "cutoff", 0.5);
    m.arm(Source::Handle, Some(&b), true, &mut chain, &mut graph);
    assert!((cutoff(&chain) - 0.8).abs() < 1e-6);
    assert!(m.is_armed(Source::Handle));
    m.arm(Source::Handle, Some(&b), false, &mut chain, &mut graph);
    assert_eq!(cutoff(&chain), 0.3);
    // cache entry survives release
    assert_eq!(m.cache().get(&Target::from(&b)), Some(0.3));
    m.arm(Source::Handle, Some(&b), true, &mut chain, &mut graph);
    m.arm(Source::Handle, Some(&b), false, &mut chain, &mut graph);
    assert_eq!(cutoff(&chain), 0.3);
  }

  #[test]
  fn displacement_is_clamped() {
    let (mut chain, mut graph, mut m) = setup();
    let b = ModBinding::new(0, "cutoff", 1.0);
    m.arm(Source::Shake, Some(&b), true, &mut chain, &mut graph);
    assert_eq!(cutoff(&chain), 1.0);
    m.arm(Source::Shake, Some(&b), false, &mut chain, &mut graph);
    assert_eq!(cutoff(&chain), 0.5);
  }

  #[test]
  fn stale_binding_is_silent() {
    let (mut chain, mut graph, mut m) = setup();
    let before = chain.clone();
    m.arm(Source::Handle, Some(&ModBinding::new(5, "cutoff", 1.0)), true, &mut chain, &mut graph);
    m.arm(Source::Handle, Some(&ModBinding::new(0, "amount", 1.0)), true, &mut chain, &mut graph);
    m.arm(Source::Handle, None, true, &mut chain, &mut graph);
    assert_eq!(chain, before);
    assert!(!m.is_armed(Source::Handle));
    assert!(m.cache().is_empty());
  }

  #[test]
  fn sources_sum_against_one_base() {
    let (mut chain, mut graph, mut m) = setup();
    let handle = ModBinding::new(0, "cutoff", 0.2);
    let shake = ModBinding::new(0, "cutoff", 0.1);
    m.arm(Source::Handle, Some(&handle), true, &mut chain, &mut graph);
    m.arm(Source::Shake, Some(&shake), true, &mut chain, &mut graph);
    assert!((cutoff(&chain) - 0.8).abs() < 1e-6);
    m.arm(Source::Handle, Some(&handle), false, &mut chain, &mut graph);
    assert!((cutoff(&chain) - 0.6).abs() < 1e-6);
    m.arm(Source::Shake, Some(&shake), false, &mut chain, &mut graph);
    assert_eq!(cutoff(&chain), 0.5);
  }

  #[test]
  fn lfo_sawtooth_scenario() {
    let (mut chain, mut graph, mut m) = setup();
    let b = LfoBinding::new(0, "cutoff", 0.5, LfoShape::Sawtooth, 1.0);
    let t0 = Instant::now();
    m.start_lfo(Some(&b), &mut chain, &mut graph, t0);
    // t = 0: saw is at -1
    assert_eq!(cutoff(&chain), 0.0);
    let req = m.scheduler_mut().take_due().unwrap();
    assert!(m.on_frame(req, &mut chain, &mut graph, t0 + Duration::from_millis(250)));
    assert!((cutoff(&chain) - 0.25).abs() < 1e-4);
    let mut full = setup();
    let b = LfoBinding::new(0, "cutoff", 1.0, LfoShape::Sawtooth, 1.0);
    full.2.start_lfo(Some(&b), &mut full.0, &mut full.1, t0);
    let req = full.2.scheduler_mut().take_due().unwrap();
    full.2.on_frame(req, &mut full.0, &mut full.1, t0 + Duration::from_millis(250));
    assert!(cutoff(&full.0).abs() < 1e-4);
  }

  #[test]
  fn stop_cancels_pending_frame_then_restores() {
    let (mut chain, mut graph, mut m) = setup();
    let b = LfoBinding::new(0, "cutoff", 0.5, LfoShape::Sine, 2.0);
    let t0 = Instant::now();
    m.start_lfo(Some(&b), &mut chain, &mut graph, t0);
    let req = m.scheduler().pending().unwrap();
    m.stop_lfo(Some(&b), &mut chain, &mut graph);
    assert!(m.scheduler().pending().is_none());
    assert_eq!(cutoff(&chain), 0.5);
    assert!(!m.on_frame(req, &mut chain, &mut graph, t0 + Duration::from_millis(125)));
    assert_eq!(cutoff(&chain), 0.5);
  }

  #[test]
  fn restart_supersedes_old_frame() {
    let (mut chain, mut graph, mut m) = setup();
    let b = LfoBinding::new(0, "cutoff", 0.5, LfoShape::Sine, 1.0);
    let t0 = Instant::now();
    m.start_lfo(Some(&b), &mut chain, &mut graph, t0);
    let old = m.scheduler().pending().unwrap();
    m.start_lfo(Some(&b), &mut chain, &mut graph, t0);
    assert!(m.lfo_running());
    assert!(!m.on_frame(old, &mut chain, &mut graph, t0));
    let new = m.scheduler_mut().take_due().unwrap();
    assert!(m.on_frame(new, &mut chain, &mut graph, t0));
  }

  #[test]
  fn clear_forgets_released_snapshots() {
    let (mut chain, mut graph, mut m) = setup();
    let b = ModBinding::new(0, "cutoff", 0.1);
    m.arm(Source::Handle, Some(&b), true, &mut chain, &mut graph);
    m.arm(Source::Handle, Some(&b), false, &mut chain, &mut graph);
    assert_eq!(m.cache().len(), 1);
    m.clear_base_values();
    assert!(m.cache().is_empty());
    assert_eq!(m.offset(Source::Handle, &Target::from(&b)), None);
  }

  #[test]
  fn clear_while_lfo_runs_keeps_its_base() {
    let (mut chain, mut graph, mut m) = setup();
    let b = LfoBinding::new(0, "cutoff", 0.25, LfoShape::Square, 1.0);
    let t0 = Instant::now();
    m.start_lfo(Some(&b), &mut chain, &mut graph, t0);
    assert_eq!(cutoff(&chain), 0.75);
    m.clear_base_values();
    assert_eq!(m.cache().len(), 1);
    let req = m.scheduler_mut().take_due().unwrap();
    m.on_frame(req, &mut chain, &mut graph, t0 + Duration::from_millis(100));
    assert_eq!(cutoff(&chain), 0.75);
    m.stop_lfo(Some(&b), &mut chain, &mut graph);
    assert_eq!(cutoff(&chain), 0.5);
  }

  #[test]
  fn clear_while_handle_is_held_still_restores() {
    let (mut chain, mut graph, mut m) = setup();
    let b = ModBinding::new(0, "cutoff", 0.2);
    m.arm(Source::Handle, Some(&b), true, &mut chain, &mut graph);
    m.clear_base_values();
    assert!((m.offset(Source::Handle, &Target::from(&b)).unwrap() - 0.2).abs() < 1e-6);
    m.arm(Source::Handle, Some(&b), false, &mut chain, &mut graph);
    assert_eq!(cutoff(&chain), 0.5);
    m.clear_base_values();
    assert!(m.cache().is_empty());
  }
}
