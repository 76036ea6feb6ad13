/// Waveshaping distortion with a wet/dry mix. Drive in 0..1.
pub struct Drive {
  drive: f32,
  wet: f32,
}

impl Drive {
  pub fn new(drive: f32, wet: f32) -> Self {
    let mut d = Self { drive: 0.0, wet: 0.0 };
    d.set_drive(drive);
    d.set_wet(wet);
    d
  }
  pub fn set_drive(&mut self, drive: f32) { self.drive = drive.clamp(0.0, 1.0); }
  pub fn set_wet(&mut self, wet: f32) { self.wet = wet.clamp(0.0, 1.0); }
  pub fn drive(&self) -> f32 { self.drive }
  pub fn wet(&self) -> f32 { self.wet }

  #[inline]
  fn shape(&self, x: f32) -> f32 {
    let k = self.drive * 100.0;
    ((1.0 + k) * x / (1.0 + k * x.abs())).clamp(-1.0, 1.0)
  }

  pub fn process(&mut self, l: f32, r: f32) -> (f32, f32) {
    let dry = 1.0 - self.wet;
    (l * dry + self.shape(l) * self.wet, r * dry + self.shape(r) * self.wet)
  }
}
