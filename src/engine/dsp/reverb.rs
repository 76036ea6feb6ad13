use freeverb::Freeverb;

pub struct OnePoleLP { a: f32, y: f32 }
impl OnePoleLP {
  pub fn new() -> Self { Self { a: 0.5, y: 0.0 } }
  #[inline] pub fn set_hf_damp(&mut self, amt: f32) { self.a = 0.3 + 0.6 * amt.clamp(0.0, 1.0); }
  #[inline] pub fn tick(&mut self, x: f32) -> f32 { self.y += self.a * (x - self.y); self.y }
}

const MAX_DECAY_SECS: f32 = 10.1;

/// Freeverb tank with a decay control in seconds and a wet mix.
pub struct Reverb {
  rv: Freeverb,
  lp_l: OnePoleLP,
  lp_r: OnePoleLP,
  decay: f32,
  wet: f32,
}

impl Reverb {
  pub fn new(sr: f32, decay: f32, wet: f32) -> Self {
    let mut rv = Freeverb::new(sr as usize);
    rv.set_dampening(0.6); rv.set_wet(1.0); rv.set_dry(0.0); rv.set_width(0.9);
    let mut r = Self { rv, lp_l: OnePoleLP::new(), lp_r: OnePoleLP::new(), decay: 0.0, wet: 0.0 };
    r.lp_l.set_hf_damp(0.8);
    r.lp_r.set_hf_damp(0.8);
    r.set_decay(decay);
    r.set_wet(wet);
    r
  }

  /// Longer decays map to a larger room.
  pub fn set_decay(&mut self, secs: f32) {
    self.decay = secs.clamp(0.0, MAX_DECAY_SECS);
    let room = 0.2 + 0.78 * (self.decay / MAX_DECAY_SECS);
    self.rv.set_room_size(room as f64);
  }
  pub fn set_wet(&mut self, wet: f32) { self.wet = wet.clamp(0.0, 1.0); }
  pub fn decay(&self) -> f32 { self.decay }
  pub fn wet(&self) -> f32 { self.wet }

  pub fn process(&mut self, l: f32, r: f32) -> (f32, f32) {
    let (wl, wr) = self.rv.tick((l as f64, r as f64));
    let wl = self.lp_l.tick(wl as f32);
    let wr = self.lp_r.tick(wr as f32);
    (l * (1.0 - self.wet) + wl * self.wet, r * (1.0 - self.wet) + wr * self.wet)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn dry_when_wet_is_zero() {
    let mut r = Reverb::new(44_100.0, 2.0, 0.0);
    assert_eq!(r.process(0.5, -0.25), (0.5, -0.25));
  }

  #[test]
  fn decay_is_kept_in_range() {
    let mut r = Reverb::new(44_100.0, 2.0, 0.5);
    r.set_decay(50.0);
    assert_eq!(r.decay(), MAX_DECAY_SECS);
  }
}
