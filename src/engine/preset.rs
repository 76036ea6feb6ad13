use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::registry::EffectKind;

/// One row of a preset: an effect kind plus its stored parameter values.
///
/// Serialized flat, e.g. `{"effect": "LOWPASS", "cutoff": 0.5}`. The kind is
/// kept as a string so rows naming an unknown kind survive a round trip.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EffectInstance {
  pub effect: String,
  #[serde(flatten)]
  pub params: BTreeMap<String, f32>,
}

impl EffectInstance {
  /// Instance with every schema parameter at its default.
  pub fn new(kind: EffectKind) -> Self {
    let params = kind.definition().params().iter().map(|p| (p.name.to_string(), p.default)).collect();
    Self { effect: kind.name().to_string(), params }
  }

  pub fn kind(&self) -> Option<EffectKind> { EffectKind::from_name(&self.effect) }

  pub fn is_marker(&self) -> bool { self.kind().map_or(false, EffectKind::is_marker) }

  /// Effective value of a schema parameter: stored value clamped, or the default.
  /// `None` when the kind is unknown or has no such parameter.
  pub fn value(&self, param: &str) -> Option<f32> {
    let def = self.kind()?.definition().param(param)?;
    Some(def.resolve(self.params.get(param).copied()))
  }

  pub fn set(&mut self, param: &str, value: f32) { self.params.insert(param.to_string(), value); }
}

/// Ordered effect rows. Position is the only addressing key; nothing here reorders.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Chain(Vec<EffectInstance>);

impl Chain {
  pub fn new(rows: Vec<EffectInstance>) -> Self { Self(rows) }
  pub fn len(&self) -> usize { self.0.len() }
  pub fn is_empty(&self) -> bool { self.0.is_empty() }
  pub fn get(&self, position: usize) -> Option<&EffectInstance> { self.0.get(position) }
  pub fn get_mut(&mut self, position: usize) -> Option<&mut EffectInstance> { self.0.get_mut(position) }
  pub fn iter(&self) -> std::slice::Iter<'_, EffectInstance> { self.0.iter() }
  pub fn push(&mut self, row: EffectInstance) { self.0.push(row) }
  pub fn rows(&self) -> &[EffectInstance] { &self.0 }

  pub fn has_marker(&self) -> bool { self.0.iter().any(EffectInstance::is_marker) }

  /// Realized-node index for `position`: the number of non-marker rows strictly
  /// before it. `None` for marker rows and out-of-range positions.
  pub fn node_index(&self, position: usize) -> Option<usize> {
    let row = self.0.get(position)?;
    if row.is_marker() { return None; }
    Some(self.0[..position].iter().filter(|r| !r.is_marker()).count())
  }

  pub fn marker_position(&self) -> Option<usize> { self.0.iter().position(EffectInstance::is_marker) }
}

impl<'a> IntoIterator for &'a Chain {
  type Item = &'a EffectInstance;
  type IntoIter = std::slice::Iter<'a, EffectInstance>;
  fn into_iter(self) -> Self::IntoIter { self.0.iter() }
}

fn default_depth() -> f32 { 0.5 }
fn default_speed() -> f32 { 1.0 }

/// Target of a modulation source: a row, one of its parameters, and a depth in 0..1.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModBinding {
  pub row: usize,
  pub param: String,
  #[serde(default = "default_depth")]
  pub depth: f32,
}

impl ModBinding {
  pub fn new(row: usize, param: &str, depth: f32) -> Self { Self { row, param: param.to_string(), depth } }
  pub fn depth(&self) -> f32 { if self.depth.is_finite() { self.depth.clamp(0.0, 1.0) } else { 0.0 } }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LfoShape {
  #[default]
  Sine,
  Square,
  Sawtooth,
  Random,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LfoBinding {
  #[serde(flatten)]
  pub target: ModBinding,
  #[serde(default)]
  pub shape: LfoShape,
  #[serde(default = "default_speed")]
  pub speed: f32,
}

impl LfoBinding {
  pub fn new(row: usize, param: &str, depth: f32, shape: LfoShape, speed: f32) -> Self {
    Self { target: ModBinding::new(row, param, depth), shape, speed }
  }
  /// Cycles per second; non-positive speeds run at 1 Hz.
  pub fn speed(&self) -> f32 { if self.speed.is_finite() && self.speed > 0.0 { self.speed } else { 1.0 } }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PresetError {
  #[error("unknown effect kind `{0}`")]
  UnknownKind(String),
  #[error("{0} can only be added once per preset")]
  SingleInstance(&'static str),
  #[error("the input pickup row cannot be removed")]
  MarkerRemoval,
  #[error("row {0} is out of range")]
  OutOfRange(usize),
}

/// A preset as the editing layer hands it over: chain plus optional bindings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Preset {
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub comment: String,
  #[serde(default)]
  pub list: Chain,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub handle: Option<ModBinding>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub shake: Option<ModBinding>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub lfo: Option<LfoBinding>,
  // Round-tripped only; no engine source reads it.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub trigger: Option<ModBinding>,
}

impl Preset {
  /// Fresh preset holding only the input pickup.
  pub fn new() -> Self {
    Self { list: Chain::new(vec![EffectInstance::new(EffectKind::Sample)]), ..Self::default() }
  }

  pub fn ensure_marker(&mut self) {
    if !self.list.has_marker() {
      self.list.push(EffectInstance::new(EffectKind::Sample));
    }
  }

  /// Appends a default instance of `kind`, adding the pickup first if missing.
  pub fn add_effect(&mut self, kind: &str) -> Result<usize, PresetError> {
    let k = EffectKind::from_name(kind).ok_or_else(|| PresetError::UnknownKind(kind.to_string()))?;
    if k.is_single_instance() && self.list.iter().any(|r| r.kind() == Some(k)) {
      return Err(PresetError::SingleInstance(k.name()));
    }
    self.ensure_marker();
    if k.is_marker() {
      return Ok(self.list.marker_position().unwrap_or(self.list.len() - 1));
    }
    self.list.push(EffectInstance::new(k));
    Ok(self.list.len() - 1)
  }

  /// Removes a row and retargets bindings: bindings on the row are dropped,
  /// bindings below it move up by one.
  pub fn remove_effect(&mut self, index: usize) -> Result<EffectInstance, PresetError> {
    let row = self.list.get(index).ok_or(PresetError::OutOfRange(index))?;
    if row.is_marker() { return Err(PresetError::MarkerRemoval); }
    let removed = self.list.0.remove(index);
    self.retarget(|row| match row.cmp(&index) {
      std::cmp::Ordering::Less => Some(row),
      std::cmp::Ordering::Equal => None,
      std::cmp::Ordering::Greater => Some(row - 1),
    });
    Ok(removed)
  }

  /// Moves a row and keeps every binding on the instance it pointed at.
  pub fn move_effect(&mut self, from: usize, to: usize) -> Result<(), PresetError> {
    let len = self.list.len();
    if from >= len { return Err(PresetError::OutOfRange(from)); }
    if to >= len { return Err(PresetError::OutOfRange(to)); }
    if from == to { return Ok(()); }
    let row = self.list.0.remove(from);
    self.list.0.insert(to, row);
    self.retarget(|row| {
      Some(if row == from {
        to
      } else if from < to && row > from && row <= to {
        row - 1
      } else if to < from && row >= to && row < from {
        row + 1
      } else {
        row
      })
    });
    Ok(())
  }

  fn retarget(&mut self, map: impl Fn(usize) -> Option<usize>) {
    let remap = |b: Option<ModBinding>| b.and_then(|mut b| { b.row = map(b.row)?; Some(b) });
    self.handle = remap(self.handle.take());
    self.shake = remap(self.shake.take());
    self.trigger = remap(self.trigger.take());
    self.lfo = self.lfo.take().and_then(|mut l| { l.target.row = map(l.target.row)?; Some(l) });
  }
}

pub const PACK_SLOTS: usize = 4;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PackEntry {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub pos: Option<usize>,
  #[serde(flatten)]
  pub preset: Preset,
}

/// A pack of up to four preset slots, as exchanged with the storage layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pack {
  #[serde(default = "default_pack_name")]
  pub name: String,
  #[serde(default)]
  pub presets: Vec<PackEntry>,
}

fn default_pack_name() -> String { "MY PACK".to_string() }

impl Pack {
  /// Places entries into slots; entries without `pos` take the first free slot.
  /// Every placed preset gets an input pickup if it lacks one.
  pub fn into_slots(self) -> [Option<Preset>; PACK_SLOTS] {
    let mut slots: [Option<Preset>; PACK_SLOTS] = Default::default();
    for entry in self.presets {
      let pos = entry.pos.or_else(|| slots.iter().position(Option::is_none));
      match pos {
        Some(p) if p < PACK_SLOTS => {
          let mut preset = entry.preset;
          preset.ensure_marker();
          slots[p] = Some(preset);
        }
        _ => log::warn!("dropping preset `{}`: no free slot", entry.preset.name),
      }
    }
    slots
  }

  pub fn from_slots(name: &str, slots: &[Option<Preset>]) -> Self {
    let presets = slots
      .iter()
      .enumerate()
      .filter_map(|(i, p)| p.as_ref().map(|p| PackEntry { pos: Some(i), preset: p.clone() }))
      .collect();
    Self { name: name.to_string(), presets }
  }
}
