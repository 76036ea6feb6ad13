use serde::Deserialize;

use super::preset::{LfoBinding, ModBinding, Preset};

/// Control messages for a running session. The editing surface sends these;
/// the render loop applies them between blocks.
#[derive(Clone, Debug, Deserialize)]
pub enum EngineMsg {
  /// Rebuild the graph from the current chain.
  Compile,
  SetParam { position: usize, param: String, value: f32 },
  AddEffect { kind: String },
  RemoveEffect { index: usize },
  MoveEffect { from: usize, to: usize },
  SetHandle { binding: Option<ModBinding> },
  SetShake { binding: Option<ModBinding> },
  SetLfo { binding: Option<LfoBinding> },
  ArmHandle { active: bool },
  ArmShake { active: bool },
  StartLfo,
  StopLfo,
  ClearBaseValues,
  SelectPreset { preset: Preset },
  Transport { playing: bool },
  Quit,
}
