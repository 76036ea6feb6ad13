use std::f32::consts::TAU;

struct AllPass { a: f32, x1: f32, y1: f32 }

impl AllPass {
  fn new(a: f32) -> Self { Self { a, x1: 0.0, y1: 0.0 } }
  #[inline]
  fn tick(&mut self, x: f32) -> f32 {
    let y = self.a * x + self.x1 - self.a * self.y1;
    self.x1 = x;
    self.y1 = y;
    y
  }
}

// Two allpass chains roughly 90 degrees apart across the audio band.
struct Hilbert { i: [AllPass; 2], q: [AllPass; 2] }

impl Hilbert {
  fn new() -> Self {
    Self {
      i: [AllPass::new(0.692_387_8), AllPass::new(0.936_065_4)],
      q: [AllPass::new(0.402_192_1), AllPass::new(0.856_171_1)],
    }
  }
  #[inline]
  fn tick(&mut self, x: f32) -> (f32, f32) {
    let i = self.i.iter_mut().fold(x, |s, ap| ap.tick(s));
    let q = self.q.iter_mut().fold(x, |s, ap| ap.tick(s));
    (i, q)
  }
}

/// Single-sideband frequency shifter with wet/dry mix.
pub struct FrequencyShifter {
  sr: f32,
  shift: f32,
  wet: f32,
  phase: f32,
  hl: Hilbert,
  hr: Hilbert,
}

impl FrequencyShifter {
  pub fn new(sr: f32, shift: f32, wet: f32) -> Self {
    let mut s = Self { sr, shift, wet: 0.0, phase: 0.0, hl: Hilbert::new(), hr: Hilbert::new() };
    s.set_wet(wet);
    s
  }
  pub fn set_shift(&mut self, hz: f32) { self.shift = hz; }
  pub fn set_wet(&mut self, wet: f32) { self.wet = wet.clamp(0.0, 1.0); }
  pub fn shift(&self) -> f32 { self.shift }
  pub fn wet(&self) -> f32 { self.wet }

  pub fn process(&mut self, l: f32, r: f32) -> (f32, f32) {
    let (c, s) = { let a = TAU * self.phase; (a.cos(), a.sin()) };
    let (il, ql) = self.hl.tick(l);
    let (ir, qr) = self.hr.tick(r);
    let yl = il * c - ql * s;
    let yr = ir * c - qr * s;
    self.phase = (self.phase + self.shift / self.sr).rem_euclid(1.0);
    let dry = 1.0 - self.wet;
    (l * dry + yl * self.wet, r * dry + yr * self.wet)
  }
}
