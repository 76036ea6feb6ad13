use std::fs;

use clap::Parser;
use fxaudition_lib::engine::audio::{Session, SessionConfig};
use fxaudition_lib::engine::messages::EngineMsg;
use fxaudition_lib::{load_preset, write_wav, Args, Span};

const PACK: &str = r#"{"name":"LIVE","presets":[
  {"pos":2,"name":"WASH","comment":"","list":[{"effect":"REVERB","time":0.8}]},
  {"name":"GRIT","comment":"","list":[{"effect":"SAMPLE"},{"effect":"DIST","amount":30.0}],
   "shake":{"row":1,"param":"amount","depth":0.25}}
]}"#;

#[test]
fn pack_slots_and_markers() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("pack.json");
  fs::write(&path, PACK).unwrap();

  let grit = load_preset(&path, 0).unwrap();
  assert_eq!(grit.name, "GRIT");
  let wash = load_preset(&path, 2).unwrap();
  assert_eq!(wash.name, "WASH");
  assert!(wash.list.has_marker());
  assert!(load_preset(&path, 1).is_err());
  assert!(load_preset(&path, 9).is_err());
}

#[test]
fn single_preset_and_bad_input() {
  let dir = tempfile::tempdir().unwrap();
  let good = dir.path().join("p.json");
  fs::write(&good, r#"{"name":"LP","list":[{"effect":"LOWPASS","cutoff":0.3}]}"#).unwrap();
  let p = load_preset(&good, 0).unwrap();
  assert_eq!(p.list.len(), 2);
  let bad = dir.path().join("bad.json");
  fs::write(&bad, "{not json").unwrap();
  assert!(load_preset(&bad, 0).is_err());
  assert!(load_preset(&dir.path().join("missing.json"), 0).is_err());
}

#[test]
fn span_parsing() {
  assert_eq!("1.5..3".parse::<Span>(), Ok(Span { start: 1.5, end: 3.0 }));
  assert!("3..1".parse::<Span>().is_err());
  assert!("soon".parse::<Span>().is_err());
}

#[test]
fn args_become_cues() {
  let args = Args::try_parse_from(["audition", "p.json", "--lfo", "--handle-at", "1", "--shake-at", "0.5..2"]).unwrap();
  let cues = args.cues();
  assert_eq!(cues.len(), 4);
  assert!(matches!(cues[0].msg, EngineMsg::StartLfo));
  assert!(matches!(cues[3].msg, EngineMsg::ArmShake { active: false }));
  assert_eq!(cues[3].at, 2.0);
}

#[test]
fn render_to_wav() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("pack.json");
  fs::write(&path, PACK).unwrap();
  let preset = load_preset(&path, 0).unwrap();
  let cfg = SessionConfig::default();
  let mut session = Session::new(cfg, preset);
  let args = Args::try_parse_from(["audition", "pack.json", "--shake-at", "0.1..0.3"]).unwrap();
  let out = session.render(0.5, &args.cues());
  assert!(out.iter().any(|s| s.abs() > 1e-3));
  // shake released at 0.3s, base restored
  assert_eq!(session.preset().list.get(1).unwrap().params["amount"], 30.0);

  let wav = dir.path().join("out.wav");
  write_wav(&wav, &out, cfg.sample_rate as u32).unwrap();
  let reader = hound::WavReader::open(&wav).unwrap();
  assert_eq!(reader.spec().channels, 2);
  assert_eq!(reader.spec().sample_rate, 44_100);
  assert_eq!(reader.len() as usize, out.len());
}
