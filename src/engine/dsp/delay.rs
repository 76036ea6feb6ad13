pub struct Smooth { pub y: f32, a: f32 }
impl Smooth {
  pub fn new(sr: f32, ms: f32, initial: f32) -> Self {
    let a = (-1.0 / (ms * 0.001 * sr)).exp();
    Self { y: initial, a }
  }
  #[inline]
  pub fn next(&mut self, target: f32) -> f32 { self.y = self.a * self.y + (1.0 - self.a) * target; self.y }
}

/// Stereo feedback delay. Time in seconds, feedback and wet in 0..1.
pub struct FeedbackDelay {
  buf_l: Vec<f32>,
  buf_r: Vec<f32>,
  wr_l: usize,
  wr_r: usize,
  len_l: usize,
  len_r: usize,
  sr: f32,
  time: f32,
  feedback: f32,
  wet: f32,
  time_samp: Smooth,
  fb: Smooth,
  wet_s: Smooth,
}

impl FeedbackDelay {
  pub fn new(max_secs: f32, sr: f32, time: f32, feedback: f32, wet: f32) -> Self {
    let len_l = ((max_secs * sr).ceil().max(64.0)) as usize;
    // Slightly longer right buffer to avoid identical wrap alignment
    let len_r = (((max_secs * sr) * 1.03).ceil().max(64.0)) as usize;
    let mut d = Self {
      buf_l: vec![0.0; len_l],
      buf_r: vec![0.0; len_r],
      wr_l: 0,
      wr_r: 0,
      len_l,
      len_r,
      sr,
      time: 0.0,
      feedback: 0.0,
      wet: 0.0,
      time_samp: Smooth::new(sr, 15.0, 1.0),
      fb: Smooth::new(sr, 8.0, 0.0),
      wet_s: Smooth::new(sr, 8.0, 0.0),
    };
    d.set_time(time);
    d.set_feedback(feedback);
    d.set_wet(wet);
    d.time_samp.y = d.target_samples();
    d.fb.y = d.feedback.min(0.98);
    d.wet_s.y = d.wet;
    d
  }

  pub fn set_time(&mut self, secs: f32) { self.time = secs.max(0.0); }
  pub fn set_feedback(&mut self, fb: f32) { self.feedback = fb.clamp(0.0, 1.0); }
  pub fn set_wet(&mut self, wet: f32) { self.wet = wet.clamp(0.0, 1.0); }
  pub fn time(&self) -> f32 { self.time }
  pub fn feedback(&self) -> f32 { self.feedback }
  pub fn wet(&self) -> f32 { self.wet }

  fn target_samples(&self) -> f32 {
    let max_len = self.len_l.min(self.len_r).saturating_sub(2) as f32;
    (self.time * self.sr).clamp(1.0, max_len)
  }

  #[inline]
  fn wrap(len: usize, i: i32) -> usize { let m = len as i32; let mut k = i % m; if k < 0 { k += m; } k as usize }
  #[inline]
  fn lerp(buf: &[f32], idx: f32, len: usize) -> f32 { let i0 = idx.floor() as i32; let frac = idx - i0 as f32; let i1 = i0 + 1; let s0 = buf[Self::wrap(len, i0)]; let s1 = buf[Self::wrap(len, i1)]; s0 + (s1 - s0) * frac }

  pub fn process(&mut self, dl: f32, dr: f32) -> (f32, f32) {
    let target = self.target_samples();
    let d = self.time_samp.next(target);
    // keep headroom below unity so repeats always decay
    let fb = self.fb.next(self.feedback.min(0.98));
    let wet = self.wet_s.next(self.wet);
    let dry = 1.0 - wet;
    // read delayed BEFORE writing (per-channel pointers)
    let yl = Self::lerp(&self.buf_l, (self.wr_l as f32) - d, self.len_l);
    let yr = Self::lerp(&self.buf_r, (self.wr_r as f32) - d, self.len_r);
    self.buf_l[self.wr_l] = dl + yl * fb;
    self.buf_r[self.wr_r] = dr + yr * fb;
    self.wr_l += 1; if self.wr_l >= self.len_l { self.wr_l = 0; }
    self.wr_r += 1; if self.wr_r >= self.len_r { self.wr_r = 0; }
    (dl * dry + yl * wet, dr * dry + yr * wet)
  }
}
