pub struct Gain { gain: f32 }
impl Gain {
  pub fn new(gain: f32) -> Self { Self { gain } }
  pub fn set_gain(&mut self, g: f32) { self.gain = g.max(0.0); }
  pub fn gain(&self) -> f32 { self.gain }
  #[inline] pub fn process(&self, l: f32, r: f32) -> (f32, f32) { (l * self.gain, r * self.gain) }
}

/// Constant-power panner; pan -1 is hard left, 1 hard right.
pub struct Panner { pan: f32, gl: f32, gr: f32 }
impl Panner {
  pub fn new(pan: f32) -> Self {
    let mut p = Self { pan: 0.0, gl: 1.0, gr: 1.0 };
    p.set_pan(pan);
    p
  }
  pub fn set_pan(&mut self, pan: f32) {
    self.pan = pan.clamp(-1.0, 1.0);
    let theta = (self.pan + 1.0) * std::f32::consts::FRAC_PI_4;
    self.gl = theta.cos();
    self.gr = theta.sin();
  }
  pub fn pan(&self) -> f32 { self.pan }
  #[inline] pub fn process(&self, l: f32, r: f32) -> (f32, f32) { (l * self.gl, r * self.gr) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn hard_pan_silences_other_side() {
    let (l, r) = Panner::new(-1.0).process(1.0, 1.0);
    assert!((l - 1.0).abs() < 1e-6);
    assert!(r.abs() < 1e-6);
    let (l, r) = Panner::new(0.0).process(1.0, 1.0);
    assert!((l - r).abs() < 1e-6);
  }

  #[test]
  fn gain_never_negative() {
    let mut g = Gain::new(1.0);
    g.set_gain(-2.0);
    assert_eq!(g.gain(), 0.0);
  }
}
