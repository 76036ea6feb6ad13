/// Range and default of one effect parameter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParamDef {
  pub name: &'static str,
  pub min: f32,
  pub max: f32,
  pub default: f32,
}

impl ParamDef {
  pub const fn new(name: &'static str, min: f32, max: f32, default: f32) -> Self {
    Self { name, min, max, default }
  }
  #[inline]
  pub fn range(&self) -> f32 { self.max - self.min }
  /// Clamps into `[min, max]`; NaN falls back to the default.
  #[inline]
  pub fn clamp(&self, v: f32) -> f32 {
    if v.is_nan() { return self.default; }
    v.clamp(self.min, self.max)
  }
  /// Stored value when present, schema default otherwise, always in range.
  #[inline]
  pub fn resolve(&self, stored: Option<f32>) -> f32 {
    stored.map(|v| self.clamp(v)).unwrap_or(self.default)
  }
}

const MIN_CUTOFF_HZ: f32 = 20.0;
const MAX_CUTOFF_HZ: f32 = 20_000.0;

/// Normalized cutoff 0..1 to 20..20000 Hz on a log scale.
#[inline]
pub fn cutoff_to_freq(cutoff: f32) -> f32 {
  MIN_CUTOFF_HZ * (MAX_CUTOFF_HZ / MIN_CUTOFF_HZ).powf(cutoff)
}

/// Balance 0..1 to pan -1..1.
#[inline]
pub fn balance_to_pan(balance: f32) -> f32 { balance * 2.0 - 1.0 }

/// DIST amount 0..40 to drive 0..1.
#[inline]
pub fn amount_to_drive(amount: f32) -> f32 { amount / 40.0 }

/// REVERB time 0..1 to decay seconds 0.1..10.1.
#[inline]
pub fn time_to_decay(time: f32) -> f32 { time * 10.0 + 0.1 }

/// HARMONY pitch ratio to semitones (2.0 is one octave up).
#[inline]
pub fn ratio_to_semitones(ratio: f32) -> f32 { ratio.max(1e-6).log2() * 12.0 }

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn clamp_and_resolve() {
    let p = ParamDef::new("cutoff", 0.0, 1.0, 0.5);
    assert_eq!(p.clamp(2.0), 1.0);
    assert_eq!(p.clamp(-3.0), 0.0);
    assert_eq!(p.clamp(f32::NAN), 0.5);
    assert_eq!(p.resolve(None), 0.5);
    assert_eq!(p.resolve(Some(7.0)), 1.0);
    assert_eq!(p.range(), 1.0);
  }

  #[test]
  fn cutoff_mapping_endpoints() {
    assert!((cutoff_to_freq(0.0) - 20.0).abs() < 1e-3);
    assert!((cutoff_to_freq(1.0) - 20_000.0).abs() < 0.5);
    let mid = cutoff_to_freq(0.5);
    assert!((mid - (20.0f32 * 20_000.0).sqrt()).abs() < 0.5);
  }

  #[test]
  fn unit_mappings() {
    assert_eq!(balance_to_pan(0.5), 0.0);
    assert_eq!(balance_to_pan(1.0), 1.0);
    assert_eq!(amount_to_drive(10.0), 0.25);
    assert!((time_to_decay(0.5) - 5.1).abs() < 1e-5);
    assert!((ratio_to_semitones(2.0) - 12.0).abs() < 1e-4);
    assert!((ratio_to_semitones(0.5) + 12.0).abs() < 1e-4);
  }
}
