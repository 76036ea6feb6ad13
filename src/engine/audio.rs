use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use log::{debug, info, warn};
use std::time::{Duration, Instant};

use super::{
  audition::Audition,
  messages::EngineMsg,
  preset::{Preset, PresetError},
};

#[derive(Clone, Copy, Debug)]
pub struct SessionConfig {
  pub sample_rate: f32,
  /// Frames rendered between message drains.
  pub block_size: usize,
  /// Display refresh rate driving the LFO.
  pub frame_rate: f32,
  pub max_msgs_per_block: usize,
}

impl Default for SessionConfig {
  fn default() -> Self { Self { sample_rate: 44_100.0, block_size: 512, frame_rate: 60.0, max_msgs_per_block: 24 } }
}

/// Looping stand-in for the decoded input sample: a plucked chord every half second.
pub struct TestLoop { buf: Vec<f32>, pos: usize }

impl TestLoop {
  pub fn new(sr: f32) -> Self {
    let len = (sr * 2.0) as usize;
    let chord = [220.0f32, 261.63, 329.63];
    let buf = (0..len)
      .map(|i| {
        let t = i as f32 / sr;
        let env = (-(t % 0.5) * 6.0).exp();
        let s: f32 = chord.iter().map(|f| 2.0 * (f * t).rem_euclid(1.0) - 1.0).sum();
        0.2 * s * env
      })
      .collect();
    Self { buf, pos: 0 }
  }
  #[inline] pub fn tick(&mut self) -> f32 {
    if self.buf.is_empty() { return 0.0; }
    let s = self.buf[self.pos];
    self.pos = (self.pos + 1) % self.buf.len();
    s
  }
}

/// Message sent once the rendered time passes `at` seconds.
#[derive(Clone, Debug)]
pub struct Cue { pub at: f32, pub msg: EngineMsg }

/// Offline render loop: drains control messages between blocks, fires display
/// frames on a sample clock and runs the test loop through the auditioned chain.
pub struct Session {
  tx: Sender<EngineMsg>,
  rx: Receiver<EngineMsg>,
  cfg: SessionConfig,
  audition: Audition,
  preset: Preset,
  source: TestLoop,
  playing: bool,
  quit: bool,
  origin: Instant,
  rendered: u64,
  next_frame: u64,
  frame_period: u64,
}

impl Session {
  pub fn new(cfg: SessionConfig, preset: Preset) -> Self { Self::with_audition(cfg, preset, Audition::new(cfg.sample_rate)) }

  pub fn with_audition(cfg: SessionConfig, mut preset: Preset, mut audition: Audition) -> Self {
    let (tx, rx) = unbounded();
    preset.ensure_marker();
    audition.compile(&preset.list);
    let frame_period = (cfg.sample_rate / cfg.frame_rate.max(1.0)).round().max(1.0) as u64;
    Self {
      tx,
      rx,
      cfg,
      audition,
      preset,
      source: TestLoop::new(cfg.sample_rate),
      playing: true,
      quit: false,
      origin: Instant::now(),
      rendered: 0,
      next_frame: 0,
      frame_period,
    }
  }

  pub fn sender(&self) -> Sender<EngineMsg> { self.tx.clone() }
  pub fn config(&self) -> &SessionConfig { &self.cfg }
  pub fn preset(&self) -> &Preset { &self.preset }
  pub fn audition(&self) -> &Audition { &self.audition }
  pub fn is_finished(&self) -> bool { self.quit }
  pub fn rendered_frames(&self) -> u64 { self.rendered }

  /// Clock derived from rendered samples.
  pub fn now(&self) -> Instant { self.origin + Duration::from_secs_f64(self.rendered as f64 / self.cfg.sample_rate as f64) }

  /// Applies pending messages, at most `max_msgs_per_block` of them.
  pub fn drain(&mut self) -> usize {
    let mut drained = 0usize;
    while drained < self.cfg.max_msgs_per_block {
      match self.rx.try_recv() {
        Ok(msg) => self.apply_msg(msg),
        Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
      }
      drained += 1;
    }
    drained
  }

  /// Fills an interleaved stereo buffer.
  pub fn render_block(&mut self, out: &mut [f32]) {
    self.drain();
    for frame in out.chunks_mut(2) {
      if self.rendered >= self.next_frame {
        self.fire_frame();
        self.next_frame += self.frame_period;
      }
      let x = self.source.tick();
      let (l, r) = if self.playing && !self.quit { self.audition.render_frame(x, x) } else { (0.0, 0.0) };
      frame[0] = l;
      if frame.len() > 1 { frame[1] = r; }
      self.rendered += 1;
    }
  }

  /// Renders `seconds` of audio, posting each cue at the first block boundary past its time.
  pub fn render(&mut self, seconds: f32, cues: &[Cue]) -> Vec<f32> {
    let total = (seconds.max(0.0) * self.cfg.sample_rate) as usize;
    let mut pending: Vec<&Cue> = cues.iter().collect();
    pending.sort_by(|a, b| a.at.total_cmp(&b.at));
    let mut pending = pending.into_iter().peekable();
    let mut out = vec![0.0f32; total * 2];
    let block = self.cfg.block_size.max(1) * 2;
    for chunk in out.chunks_mut(block) {
      let t = self.rendered as f32 / self.cfg.sample_rate;
      while let Some(cue) = pending.next_if(|c| c.at <= t) {
        if let Err(e) = self.tx.send(cue.msg.clone()) {
          debug!("cue at {}s dropped: {e}", cue.at);
        }
      }
      self.render_block(chunk);
      if self.quit { break; }
    }
    out
  }

  fn fire_frame(&mut self) {
    let now = self.now();
    if let Some(req) = self.audition.modulation_mut().scheduler_mut().take_due() {
      self.audition.on_frame(&mut self.preset, req, now);
    }
  }

  /// Swaps in `incoming` and returns the outgoing preset with its values restored.
  pub fn select_preset(&mut self, mut incoming: Preset) -> Preset {
    incoming.ensure_marker();
    let mut outgoing = std::mem::replace(&mut self.preset, incoming);
    self.audition.select(&mut outgoing, &self.preset);
    outgoing
  }

  /// Releases modulation against the current row layout, edits, recompiles.
  /// A running LFO is restarted on its (possibly retargeted) binding.
  fn edit(&mut self, what: &str, f: impl FnOnce(&mut Preset) -> Result<(), PresetError>) {
    let lfo = self.audition.modulation().lfo_running();
    self.audition.release_all(&mut self.preset);
    if let Err(e) = f(&mut self.preset) {
      warn!("{what}: {e}");
    }
    self.audition.compile(&self.preset.list);
    if lfo {
      let now = self.now();
      self.audition.start_lfo(&mut self.preset, now);
    }
  }

  fn apply_msg(&mut self, msg: EngineMsg) {
    debug!("msg {msg:?}");
    match msg {
      EngineMsg::Compile => self.edit("compile", |_| Ok(())),
      EngineMsg::SetParam { position, param, value } => {
        if self.audition.set_parameter(&mut self.preset.list, position, &param, value).is_none() {
          debug!("set {position}.{param} ignored");
        }
      }
      EngineMsg::AddEffect { kind } => self.edit("add effect", |p| p.add_effect(&kind).map(|_| ())),
      EngineMsg::RemoveEffect { index } => self.edit("remove effect", |p| p.remove_effect(index).map(|_| ())),
      EngineMsg::MoveEffect { from, to } => self.edit("move effect", |p| p.move_effect(from, to)),
      EngineMsg::SetHandle { binding } => {
        self.audition.arm_handle(&mut self.preset, false);
        self.preset.handle = binding;
      }
      EngineMsg::SetShake { binding } => {
        self.audition.arm_shake(&mut self.preset, false);
        self.preset.shake = binding;
      }
      EngineMsg::SetLfo { binding } => {
        let running = self.audition.modulation().lfo_running();
        self.audition.stop_lfo(&mut self.preset);
        self.preset.lfo = binding;
        if running {
          let now = self.now();
          self.audition.start_lfo(&mut self.preset, now);
        }
      }
      EngineMsg::ArmHandle { active } => self.audition.arm_handle(&mut self.preset, active),
      EngineMsg::ArmShake { active } => self.audition.arm_shake(&mut self.preset, active),
      EngineMsg::StartLfo => {
        let now = self.now();
        self.audition.start_lfo(&mut self.preset, now);
      }
      EngineMsg::StopLfo => self.audition.stop_lfo(&mut self.preset),
      EngineMsg::ClearBaseValues => self.audition.clear_base_values(),
      EngineMsg::SelectPreset { preset } => { self.select_preset(preset); }
      EngineMsg::Transport { playing } => { self.playing = playing; }
      EngineMsg::Quit => {
        info!("session quit after {} frames", self.rendered);
        self.quit = true;
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::engine::preset::{LfoBinding, LfoShape, ModBinding};

  fn lowpass_preset() -> Preset {
    let mut p = Preset::new();
    p.add_effect("LOWPASS").unwrap();
    p
  }

  fn cutoff(s: &Session) -> f32 { s.preset().list.get(1).unwrap().params["cutoff"] }

  #[test]
  fn drain_is_capped_per_block() {
    let cfg = SessionConfig { max_msgs_per_block: 2, ..SessionConfig::default() };
    let mut s = Session::new(cfg, lowpass_preset());
    let tx = s.sender();
    for v in [0.1, 0.2, 0.3] {
      tx.send(EngineMsg::SetParam { position: 1, param: "cutoff".into(), value: v }).unwrap();
    }
    assert_eq!(s.drain(), 2);
    assert_eq!(cutoff(&s), 0.2);
    assert_eq!(s.drain(), 1);
    assert_eq!(cutoff(&s), 0.3);
  }

  #[test]
  fn lfo_runs_on_display_frames_and_stops_clean() {
    let mut p = lowpass_preset();
    p.lfo = Some(LfoBinding::new(1, "cutoff", 0.5, LfoShape::Sawtooth, 1.0));
    let mut s = Session::new(SessionConfig::default(), p);
    let tx = s.sender();
    tx.send(EngineMsg::StartLfo).unwrap();
    let mut buf = vec![0.0; 512 * 2];
    for _ in 0..20 { s.render_block(&mut buf); }
    assert!(s.audition().modulation().lfo_running());
    assert_ne!(cutoff(&s), 0.5);
    tx.send(EngineMsg::StopLfo).unwrap();
    s.render_block(&mut buf);
    assert_eq!(cutoff(&s), 0.5);
    assert!(buf.iter().all(|x| x.is_finite() && x.abs() <= 1.0));
  }

  #[test]
  fn clearing_bases_mid_modulation_still_restores() {
    let mut p = lowpass_preset();
    p.handle = Some(ModBinding::new(1, "cutoff", 0.1));
    p.lfo = Some(LfoBinding::new(1, "cutoff", 0.25, LfoShape::Square, 1.0));
    let mut s = Session::new(SessionConfig::default(), p);
    let tx = s.sender();
    tx.send(EngineMsg::StartLfo).unwrap();
    tx.send(EngineMsg::ArmHandle { active: true }).unwrap();
    tx.send(EngineMsg::ClearBaseValues).unwrap();
    let mut buf = vec![0.0; 512 * 2];
    for _ in 0..10 { s.render_block(&mut buf); }
    assert!((cutoff(&s) - 0.85).abs() < 1e-6);
    tx.send(EngineMsg::StopLfo).unwrap();
    s.drain();
    assert!((cutoff(&s) - 0.6).abs() < 1e-6);
    tx.send(EngineMsg::ArmHandle { active: false }).unwrap();
    s.drain();
    assert_eq!(cutoff(&s), 0.5);
    assert_eq!(s.audition().modulation().cache().len(), 1);
  }

  #[test]
  fn remove_effect_releases_and_retargets() {
    let mut p = lowpass_preset();
    p.add_effect("HIGHPASS").unwrap();
    p.handle = Some(ModBinding::new(2, "cutoff", 0.5));
    let mut s = Session::new(SessionConfig::default(), p);
    let tx = s.sender();
    tx.send(EngineMsg::ArmHandle { active: true }).unwrap();
    s.drain();
    assert_eq!(s.preset().list.get(2).unwrap().params["cutoff"], 1.0);
    tx.send(EngineMsg::RemoveEffect { index: 1 }).unwrap();
    s.drain();
    assert_eq!(s.preset().list.len(), 2);
    assert_eq!(s.preset().handle.as_ref().map(|h| h.row), Some(1));
    assert_eq!(s.preset().list.get(1).unwrap().params["cutoff"], 0.5);
    assert_eq!(s.audition().graph().stages().len(), 1);
  }

  #[test]
  fn cues_and_quit() {
    let mut s = Session::new(SessionConfig::default(), lowpass_preset());
    let cues = [
      Cue { at: 0.0, msg: EngineMsg::SetParam { position: 1, param: "cutoff".into(), value: 0.9 } },
      Cue { at: 0.5, msg: EngineMsg::Quit },
    ];
    let out = s.render(2.0, &cues);
    assert_eq!(out.len(), 2 * 88_200);
    assert_eq!(cutoff(&s), 0.9);
    assert!(s.is_finished());
    assert!(s.rendered_frames() < 88_200);
  }
}
