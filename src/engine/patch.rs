// Parameter Patch Protocol
//
// Live parameter edits: clamp, store on the row, push to the realized node.
// Never touches topology. Out-of-range input is clamped silently.

use log::debug;

use super::graph::{marker_route, Endpoint, RealizedGraph};
use super::preset::Chain;

/// Applies `value` to `param` of the row at `position`.
///
/// Returns the clamped value that was stored, or `None` when the call was a
/// no-op (no such row, unknown kind, parameter not in the schema, or a marker
/// parameter without a realized control).
pub fn set_parameter(chain: &mut Chain, graph: &mut RealizedGraph, position: usize, param: &str, value: f32) -> Option<f32> {
  // recomputed from the current chain on every call
  let node_index = chain.node_index(position);
  let row = chain.get_mut(position)?;
  let kind = row.kind()?;
  let v = kind.definition().param(param)?.clamp(value);

  if kind.is_marker() {
    let (at, control, mapped) = marker_route(param, v)?;
    row.set(param, v);
    graph.apply(at, control, mapped);
    debug!("patch marker {position}.{param} = {v}");
    return Some(v);
  }

  row.set(param, v);
  let stage = node_index.and_then(|i| graph.stages().get(i).copied());
  match stage {
    // a stage of another kind means the graph predates a structural edit
    Some(stage) if stage.kind() == Some(kind) => {
      if let Some((node, control, mapped)) = stage.route(param, v) {
        graph.apply(Endpoint::Node(node), control, mapped);
      }
    }
    _ => debug!("patch {position}.{param}: no realized node, value stored only"),
  }
  Some(v)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::engine::compile::compile;
  use crate::engine::graph::{Control, Stage};
  use crate::engine::preset::EffectInstance;
  use crate::engine::registry::EffectKind;

  const SR: f32 = 44_100.0;

  fn chain(kinds: &[EffectKind]) -> Chain { Chain::new(kinds.iter().map(|&k| EffectInstance::new(k)).collect()) }

  #[test]
  fn clamps_and_stores() {
    let mut c = chain(&[EffectKind::Sample, EffectKind::Lowpass]);
    let mut g = compile(&c, SR);
    assert_eq!(set_parameter(&mut c, &mut g, 1, "cutoff", 2.0), Some(1.0));
    assert_eq!(c.get(1).unwrap().params["cutoff"], 1.0);
    assert!((g.realized(1, "cutoff", 1.0).unwrap() - 20_000.0).abs() < 0.5);
    assert_eq!(set_parameter(&mut c, &mut g, 1, "cutoff", -1.0), Some(0.0));
    assert!((g.realized(1, "cutoff", 0.0).unwrap() - 20.0).abs() < 1e-3);
  }

  #[test]
  fn out_of_bounds_and_unknown_params_are_noops() {
    let mut c = chain(&[EffectKind::Lowpass]);
    let mut g = compile(&c, SR);
    let before = c.clone();
    assert_eq!(set_parameter(&mut c, &mut g, 7, "cutoff", 0.1), None);
    assert_eq!(set_parameter(&mut c, &mut g, 0, "amount", 0.1), None);
    assert_eq!(c, before);
  }

  #[test]
  fn marker_only_level_is_patchable() {
    let mut c = chain(&[EffectKind::Sample, EffectKind::Ring]);
    let mut g = compile(&c, SR);
    let before = c.clone();
    assert_eq!(set_parameter(&mut c, &mut g, 0, "speed", 3.0), None);
    assert_eq!(c, before);
    assert_eq!(set_parameter(&mut c, &mut g, 0, "level", 0.25), Some(0.25));
    assert_eq!(g.source_gain(), 0.25);
    assert_eq!(g.stages().len(), 1);
  }

  #[test]
  fn compound_params_reach_their_sub_nodes() {
    let mut c = chain(&[EffectKind::Lowpass, EffectKind::Sample, EffectKind::Dist]);
    let mut g = compile(&c, SR);
    set_parameter(&mut c, &mut g, 2, "amount", 40.0);
    set_parameter(&mut c, &mut g, 2, "highpass-cutoff", 1.0);
    let Stage::Dist { highpass, drive, lowpass } = g.stages()[1] else { panic!("expected DIST") };
    assert_eq!(g.control(Endpoint::Node(drive), Control::Drive), Some(1.0));
    assert!((g.control(Endpoint::Node(highpass), Control::Frequency).unwrap() - 20_000.0).abs() < 0.5);
    // lowpass-cutoff default is 1.0 and was not touched
    assert!((g.control(Endpoint::Node(lowpass), Control::Frequency).unwrap() - 20_000.0).abs() < 0.5);
  }

  #[test]
  fn stale_graph_stores_without_touching_nodes() {
    let mut c = chain(&[EffectKind::Lowpass]);
    let mut g = compile(&c, SR);
    let mut edited = chain(&[EffectKind::Highpass]);
    assert_eq!(set_parameter(&mut edited, &mut g, 0, "cutoff", 0.0), Some(0.0));
    assert!((g.realized(0, "cutoff", 0.5).unwrap() - crate::engine::params::cutoff_to_freq(0.5)).abs() < 1e-2);
    assert_eq!(set_parameter(&mut c, &mut g, 0, "cutoff", 0.0), Some(0.0));
  }
}
