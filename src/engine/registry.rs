// Effect Type Registry
//
// Static schema of every effect kind. Everything that clamps, defaults or
// enumerates parameters goes through here.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::params::ParamDef;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EffectKind {
  Balance,
  Lowpass,
  Highpass,
  Dist,
  Delay,
  Reverb,
  Ring,
  Harmony,
  Ssb,
  Sample,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
  #[error("unknown effect kind `{0}`")]
  UnknownKind(String),
}

#[derive(Clone, Debug)]
pub struct EffectDef {
  pub kind: EffectKind,
  params: Vec<ParamDef>,
}

impl EffectDef {
  pub fn params(&self) -> &[ParamDef] { &self.params }
  pub fn param(&self, name: &str) -> Option<&ParamDef> { self.params.iter().find(|p| p.name == name) }
  pub fn param_names(&self) -> impl Iterator<Item = &'static str> + '_ { self.params.iter().map(|p| p.name) }
}

const ALL_KINDS: [EffectKind; 10] = [
  EffectKind::Balance,
  EffectKind::Lowpass,
  EffectKind::Highpass,
  EffectKind::Dist,
  EffectKind::Delay,
  EffectKind::Reverb,
  EffectKind::Ring,
  EffectKind::Harmony,
  EffectKind::Ssb,
  EffectKind::Sample,
];

static REGISTRY: Lazy<Vec<EffectDef>> = Lazy::new(|| {
  ALL_KINDS.iter().map(|&kind| EffectDef { kind, params: schema(kind) }).collect()
});

fn schema(kind: EffectKind) -> Vec<ParamDef> {
  use EffectKind::*;
  match kind {
    Balance => vec![ParamDef::new("balance", 0.0, 1.0, 0.5)],
    Lowpass | Highpass => vec![ParamDef::new("cutoff", 0.0, 1.0, 0.5)],
    Dist => vec![
      ParamDef::new("amount", 0.0, 40.0, 10.0),
      ParamDef::new("mix", 0.0, 1.0, 0.5),
      ParamDef::new("lowpass-cutoff", 0.0, 1.0, 1.0),
      ParamDef::new("highpass-cutoff", 0.0, 1.0, 0.0),
    ],
    Delay => vec![
      ParamDef::new("time", 0.0, 1.1, 0.5),
      ParamDef::new("echo", 0.0, 1.0, 0.5),
      ParamDef::new("wet-level", 0.0, 1.0, 0.5),
      ParamDef::new("dry-level", 0.0, 1.0, 1.0),
      ParamDef::new("lowpass-cutoff", 0.0, 1.0, 1.0),
      ParamDef::new("highpass-cutoff", 0.0, 1.0, 0.0),
      ParamDef::new("cross-feed", 0.0, 1.0, 0.0),
      ParamDef::new("balance", 0.0, 1.0, 0.5),
    ],
    Reverb => vec![
      ParamDef::new("time", 0.0, 1.0, 0.5),
      ParamDef::new("wet-level", 0.0, 1.0, 0.5),
      ParamDef::new("dry-level", 0.0, 1.0, 1.0),
      ParamDef::new("spring-mix", 0.0, 1.0, 0.0),
      ParamDef::new("highpass-cutoff", 0.0, 1.0, 0.0),
    ],
    Ring => vec![
      ParamDef::new("frequency", 0.0, 20_000.0, 400.0),
      ParamDef::new("mix", 0.0, 1.0, 0.5),
    ],
    Harmony => vec![
      ParamDef::new("pitch", 0.5, 2.0, 1.0),
      ParamDef::new("dry-level", 0.0, 1.0, 0.0),
    ],
    Ssb => vec![ParamDef::new("frequency", -20_000.0, 20_000.0, 0.0)],
    Sample => vec![
      ParamDef::new("speed", 0.0, 4.0, 1.0),
      ParamDef::new("pitch", -24.0, 24.0, 0.0),
      ParamDef::new("level", 0.0, 1.0, 1.0),
      ParamDef::new("balance", 0.0, 1.0, 0.5),
    ],
  }
}

impl EffectKind {
  pub fn from_name(name: &str) -> Option<Self> {
    ALL_KINDS.iter().copied().find(|k| k.name() == name)
  }

  pub fn name(self) -> &'static str {
    match self {
      EffectKind::Balance => "BALANCE",
      EffectKind::Lowpass => "LOWPASS",
      EffectKind::Highpass => "HIGHPASS",
      EffectKind::Dist => "DIST",
      EffectKind::Delay => "DELAY",
      EffectKind::Reverb => "REVERB",
      EffectKind::Ring => "RING",
      EffectKind::Harmony => "HARMONY",
      EffectKind::Ssb => "SSB",
      EffectKind::Sample => "SAMPLE",
    }
  }

  /// Label shown to the user; the input pickup reads "MIC IN".
  pub fn display_name(self) -> &'static str {
    match self {
      EffectKind::Sample => "MIC IN",
      other => other.name(),
    }
  }

  pub fn definition(self) -> &'static EffectDef {
    // REGISTRY is built from ALL_KINDS in declaration order
    &REGISTRY[self as usize]
  }

  pub fn is_marker(self) -> bool { self == EffectKind::Sample }

  pub fn is_compound(self) -> bool { self == EffectKind::Dist }

  /// Kinds that may appear at most once in a preset.
  pub fn is_single_instance(self) -> bool {
    matches!(self, EffectKind::Ssb | EffectKind::Reverb | EffectKind::Harmony | EffectKind::Delay)
  }
}

pub fn kinds() -> &'static [EffectKind] { &ALL_KINDS }

pub fn definition_of(name: &str) -> Result<&'static EffectDef, RegistryError> {
  EffectKind::from_name(name)
    .map(EffectKind::definition)
    .ok_or_else(|| RegistryError::UnknownKind(name.to_string()))
}

pub fn is_marker(name: &str) -> bool { EffectKind::from_name(name).map_or(false, EffectKind::is_marker) }

pub fn is_compound(name: &str) -> bool { EffectKind::from_name(name).map_or(false, EffectKind::is_compound) }

/// Schema entry for `param` of kind `name`, if both exist.
pub fn param_def(name: &str, param: &str) -> Option<&'static ParamDef> {
  definition_of(name).ok()?.param(param)
}
