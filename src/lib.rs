pub mod engine {
  pub mod registry;
  pub mod params;
  pub mod preset;
  pub mod dsp;
  pub mod graph;
  pub mod compile;
  pub mod patch;
  pub mod modulation;
  pub mod audition;
  pub mod messages;
  pub mod audio;
}

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context};
use clap::Parser;
use log::info;

use engine::audio::{Cue, Session, SessionConfig};
use engine::messages::EngineMsg;
use engine::preset::{Pack, Preset};

/// Seconds range `START..END`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Span { pub start: f32, pub end: f32 }

impl FromStr for Span {
  type Err = String;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (a, b) = s.split_once("..").ok_or_else(|| format!("expected START..END, got `{s}`"))?;
    let start: f32 = a.trim().parse().map_err(|e| format!("bad start `{a}`: {e}"))?;
    let end: f32 = b.trim().parse().map_err(|e| format!("bad end `{b}`: {e}"))?;
    if end < start { return Err(format!("span ends before it starts: `{s}`")); }
    Ok(Self { start, end })
  }
}

#[derive(Parser, Debug)]
#[command(name = "audition", about = "Render a preset's effect chain over a test loop to a WAV file")]
pub struct Args {
  /// Preset or pack JSON.
  pub input: PathBuf,
  #[arg(short, long, default_value = "audition.wav")]
  pub out: PathBuf,
  #[arg(short, long, default_value_t = 4.0)]
  pub seconds: f32,
  /// Pack slot to audition when the input is a pack.
  #[arg(long, default_value_t = 0)]
  pub slot: usize,
  /// Run the preset's LFO for the whole render.
  #[arg(long)]
  pub lfo: bool,
  /// Engage the handle at this many seconds and hold it.
  #[arg(long)]
  pub handle_at: Option<f32>,
  /// Hold the shake source over START..END seconds.
  #[arg(long)]
  pub shake_at: Option<Span>,
}

impl Args {
  pub fn cues(&self) -> Vec<Cue> {
    let mut cues = Vec::new();
    if self.lfo { cues.push(Cue { at: 0.0, msg: EngineMsg::StartLfo }); }
    if let Some(at) = self.handle_at { cues.push(Cue { at, msg: EngineMsg::ArmHandle { active: true } }); }
    if let Some(span) = self.shake_at {
      cues.push(Cue { at: span.start, msg: EngineMsg::ArmShake { active: true } });
      cues.push(Cue { at: span.end, msg: EngineMsg::ArmShake { active: false } });
    }
    cues
  }
}

/// Reads a single preset, or slot `slot` of a pack (a document with `presets`).
pub fn load_preset(path: &Path, slot: usize) -> anyhow::Result<Preset> {
  let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
  let doc: serde_json::Value = serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
  if doc.get("presets").is_some() {
    let pack: Pack = serde_json::from_value(doc).context("invalid pack")?;
    let name = pack.name.clone();
    let slots = pack.into_slots();
    let Some(found) = slots.get(slot) else { bail!("slot {slot} out of range") };
    match found.clone() {
      Some(p) => Ok(p),
      None => bail!("pack `{name}` has no preset in slot {slot}"),
    }
  } else {
    let mut preset: Preset = serde_json::from_value(doc).context("invalid preset")?;
    preset.ensure_marker();
    Ok(preset)
  }
}

pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> anyhow::Result<()> {
  let spec = hound::WavSpec { channels: 2, sample_rate, bits_per_sample: 16, sample_format: hound::SampleFormat::Int };
  let mut w = hound::WavWriter::create(path, spec).with_context(|| format!("creating {}", path.display()))?;
  for &s in samples {
    w.write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
  }
  w.finalize()?;
  Ok(())
}

pub fn run() -> anyhow::Result<()> {
  tracing_subscriber::fmt::init();
  let args = Args::parse();
  let preset = load_preset(&args.input, args.slot)?;
  info!("loaded `{}` with {} rows", preset.name, preset.list.len());

  let cfg = SessionConfig::default();
  let mut session = Session::new(cfg, preset);
  let out = session.render(args.seconds, &args.cues());
  write_wav(&args.out, &out, cfg.sample_rate as u32)?;
  info!("wrote {:.1}s to {}", args.seconds, args.out.display());
  Ok(())
}
