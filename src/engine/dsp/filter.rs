use std::f32::consts::{FRAC_1_SQRT_2, PI};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterMode { Lowpass, Highpass }

#[derive(Clone, Default)]
struct SvfState { ic1eq: f32, ic2eq: f32 }

impl SvfState {
  fn process(&mut self, x: f32, g: f32, k: f32) -> (f32, f32) {
    let v1 = (self.ic1eq + g * (x - self.ic2eq)) / (1.0 + g * (g + k));
    let v2 = self.ic2eq + g * v1;
    self.ic1eq = 2.0 * v1 - self.ic1eq;
    self.ic2eq = 2.0 * v2 - self.ic2eq;
    let lp = v2;
    let hp = x - k * v1 - lp;
    (lp, hp)
  }
}

/// Stereo 12 dB/oct state-variable filter.
#[derive(Clone)]
pub struct Filter {
  mode: FilterMode,
  sr: f32,
  freq: f32,
  g: f32,
  k: f32,
  l: SvfState,
  r: SvfState,
}

impl Filter {
  pub fn new(mode: FilterMode, freq: f32, sr: f32) -> Self {
    let mut f = Self { mode, sr, freq: 0.0, g: 0.1, k: 1.0 / FRAC_1_SQRT_2, l: SvfState::default(), r: SvfState::default() };
    f.set_freq(freq);
    f
  }

  pub fn mode(&self) -> FilterMode { self.mode }

  /// Requested frequency is kept as-is; the coefficient is computed below Nyquist.
  pub fn set_freq(&mut self, hz: f32) {
    self.freq = hz;
    let fc = hz.clamp(1.0, self.sr * 0.49);
    self.g = (PI * (fc / self.sr)).tan();
  }

  pub fn freq(&self) -> f32 { self.freq }

  pub fn process(&mut self, l: f32, r: f32) -> (f32, f32) {
    let (ll, lh) = self.l.process(l, self.g, self.k);
    let (rl, rh) = self.r.process(r, self.g, self.k);
    match self.mode {
      FilterMode::Lowpass => (ll, rl),
      FilterMode::Highpass => (lh, rh),
    }
  }
}
