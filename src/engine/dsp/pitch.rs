use std::f32::consts::PI;

const WINDOW_SECS: f32 = 0.05;

struct Line { buf: Vec<f32>, wr: usize }

impl Line {
  fn new(len: usize) -> Self { Self { buf: vec![0.0; len], wr: 0 } }
  fn push(&mut self, x: f32) { self.buf[self.wr] = x; self.wr = (self.wr + 1) % self.buf.len(); }
  /// Sample `delay` samples behind the newest one, linearly interpolated.
  fn read(&self, delay: f32) -> f32 {
    let len = self.buf.len();
    let pos = (self.wr as f32 - 1.0 - delay).rem_euclid(len as f32);
    let i0 = pos.floor() as usize % len;
    let i1 = (i0 + 1) % len;
    let frac = pos - pos.floor();
    self.buf[i0] + (self.buf[i1] - self.buf[i0]) * frac
  }
}

/// Two-tap crossfading delay-line pitch shifter.
pub struct PitchShift {
  window: f32,
  semitones: f32,
  ratio: f32,
  wet: f32,
  phase: f32,
  l: Line,
  r: Line,
}

impl PitchShift {
  pub fn new(sr: f32, semitones: f32, wet: f32) -> Self {
    let window = (WINDOW_SECS * sr).max(16.0);
    let len = window.ceil() as usize + 4;
    let mut p = Self { window, semitones: 0.0, ratio: 1.0, wet: 0.0, phase: 0.0, l: Line::new(len), r: Line::new(len) };
    p.set_semitones(semitones);
    p.set_wet(wet);
    p
  }
  pub fn set_semitones(&mut self, st: f32) { self.semitones = st; self.ratio = 2.0_f32.powf(st / 12.0); }
  pub fn set_wet(&mut self, wet: f32) { self.wet = wet.clamp(0.0, 1.0); }
  pub fn semitones(&self) -> f32 { self.semitones }
  pub fn wet(&self) -> f32 { self.wet }

  pub fn process(&mut self, l: f32, r: f32) -> (f32, f32) {
    self.l.push(l);
    self.r.push(r);
    let p2 = (self.phase + 0.5).fract();
    let (d1, d2) = (self.phase * self.window, p2 * self.window);
    let (g1, g2) = ((PI * self.phase).sin(), (PI * p2).sin());
    let yl = self.l.read(d1) * g1 + self.l.read(d2) * g2;
    let yr = self.r.read(d1) * g1 + self.r.read(d2) * g2;
    // the read taps slide through the window at (1 - ratio) samples per sample
    self.phase = (self.phase + (1.0 - self.ratio) / self.window).rem_euclid(1.0);
    let dry = 1.0 - self.wet;
    (l * dry + yl * self.wet, r * dry + yr * self.wet)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unity_ratio_holds_phase() {
    let mut p = PitchShift::new(44_100.0, 0.0, 1.0);
    for _ in 0..100 { p.process(0.1, 0.1); }
    assert_eq!(p.phase, 0.0);
  }

  #[test]
  fn output_stays_bounded() {
    let mut p = PitchShift::new(44_100.0, 12.0, 1.0);
    for n in 0..10_000 {
      let x = (n as f32 * 0.01).sin();
      let (l, _) = p.process(x, x);
      assert!(l.abs() <= 1.5);
    }
  }
}
