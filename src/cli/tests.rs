use clap::Parser;
use tempfile::TempDir;

use crate::audio::tests::synth::{StreamBuilder, FRAME_SIZE};
use crate::cli::{CliApp, Commands};
use crate::config::EngineConfig;

fn parse(args: &[&str]) -> Result<CliApp, clap::Error> {
    CliApp::try_parse_from(std::iter::once("mpegplay").chain(args.iter().copied()))
}

/// A directory holding a 40 frame stream and an empty config path
fn fixture() -> (TempDir, String, String) {
    let dir = TempDir::new().unwrap();
    let track = dir.path().join("track.mp3");
    std::fs::write(&track, StreamBuilder::cbr().frames(40).xing(576, 1000).build()).unwrap();
    let config = dir.path().join("config.toml");
    (
        dir,
        track.to_string_lossy().into_owned(),
        config.to_string_lossy().into_owned(),
    )
}

#[test]
fn test_parse_probe() {
    let cli = parse(&["probe", "song.mp3"]).unwrap();
    match cli.command {
        Commands::Probe { file, json } => {
            assert_eq!(file, "song.mp3");
            assert!(!json);
        }
        other => panic!("Expected Probe command, got {:?}", other),
    }

    let cli = parse(&["probe", "song.mp3", "--json"]).unwrap();
    assert!(matches!(cli.command, Commands::Probe { json: true, .. }));
}

#[test]
fn test_parse_decode_options() {
    let cli = parse(&[
        "decode", "song.mp3", "--output", "out.f32", "--seek", "44100", "--max-frames", "1000", "--no-gapless",
    ])
    .unwrap();
    match cli.command {
        Commands::Decode { file, output, seek, max_frames, no_gapless } => {
            assert_eq!(file, "song.mp3");
            assert_eq!(output.as_deref(), Some("out.f32"));
            assert_eq!(seek, Some(44100));
            assert_eq!(max_frames, Some(1000));
            assert!(no_gapless);
        }
        other => panic!("Expected Decode command, got {:?}", other),
    }

    let cli = parse(&["decode", "song.mp3"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Decode { output: None, seek: None, max_frames: None, no_gapless: false, .. }
    ));
}

#[test]
fn test_parse_rejects_bad_input() {
    assert!(parse(&[]).is_err());
    assert!(parse(&["decode"]).is_err());
    assert!(parse(&["decode", "song.mp3", "--seek", "-5"]).is_err());
    assert!(parse(&["decode", "song.mp3", "--max-frames", "many"]).is_err());
    assert!(parse(&["play", "song.mp3"]).is_err());
}

#[test]
fn test_global_config_flag() {
    let cli = parse(&["index", "song.mp3", "--config", "/tmp/engine.toml"]).unwrap();
    assert_eq!(cli.config.as_deref(), Some("/tmp/engine.toml"));
    assert!(matches!(cli.command, Commands::Index { .. }));

    let cli = parse(&["--config", "/tmp/engine.toml", "config", "--reset"]).unwrap();
    assert_eq!(cli.config.as_deref(), Some("/tmp/engine.toml"));
    assert!(matches!(cli.command, Commands::Config { reset: true }));
}

#[test]
fn test_config_reset_writes_file() {
    let (_dir, _track, config) = fixture();
    std::fs::write(&config, "ring_buffer_frames = 8192\ngapless = false\n").unwrap();

    let cli = parse(&["--config", &config, "config"]).unwrap();
    let manager = cli.config_manager().unwrap();
    assert_eq!(manager.get_config().ring_buffer_frames, 8192);
    assert!(!manager.get_config().gapless);

    parse(&["--config", &config, "config", "--reset"]).unwrap().run().unwrap();
    let reloaded = parse(&["--config", &config, "config"]).unwrap().config_manager().unwrap();
    assert_eq!(reloaded.get_config(), &EngineConfig::default());
}

#[test]
fn test_probe_runs_on_synthetic_stream() {
    let (_dir, track, config) = fixture();
    parse(&["--config", &config, "probe", &track]).unwrap().run().unwrap();
    parse(&["--config", &config, "probe", &track, "--json"]).unwrap().run().unwrap();
}

#[test]
fn test_probe_missing_file_fails() {
    let (_dir, _track, config) = fixture();
    let result = parse(&["--config", &config, "probe", "/nonexistent/track.mp3"]).unwrap().run();
    let error = result.unwrap_err();
    assert!(!error.user_message().is_empty());
    assert!(!error.recovery_suggestions().is_empty());
}

#[test]
fn test_probe_rejects_non_mpeg_data() {
    let (dir, _track, config) = fixture();
    let garbage = dir.path().join("garbage.mp3");
    std::fs::write(&garbage, vec![0x42u8; 4 * FRAME_SIZE]).unwrap();

    let result = parse(&["--config", &config, "probe", &garbage.to_string_lossy()]).unwrap().run();
    assert!(result.is_err());
}

#[test]
fn test_decode_writes_whole_sample_frames() {
    let (dir, track, config) = fixture();
    let output = dir.path().join("out.f32");
    let output_arg = output.to_string_lossy().into_owned();

    parse(&["--config", &config, "decode", &track, "--output", &output_arg, "--max-frames", "3000"])
        .unwrap()
        .run()
        .unwrap();

    let written = std::fs::metadata(&output).unwrap().len();
    // stereo f32
    assert_eq!(written % 8, 0);
    assert!(written <= 3000 * 8);
}

#[test]
fn test_index_runs_on_synthetic_stream() {
    let (_dir, track, config) = fixture();
    parse(&["--config", &config, "index", &track]).unwrap().run().unwrap();
}

#[test]
fn test_unusual_extension_still_opens() {
    let (dir, _track, config) = fixture();
    let renamed = dir.path().join("track.bin");
    std::fs::write(&renamed, StreamBuilder::cbr().frames(40).build()).unwrap();
    assert!(!crate::models::is_mpeg_extension(&renamed));

    parse(&["--config", &config, "probe", &renamed.to_string_lossy()]).unwrap().run().unwrap();
}
