// crates/voicetuner-cli/src/main.rs
//
// `voicetuner`: command-line front end for the voice pipeline.
//
//   voicetuner presets [--json]
//   voicetuner process <VIDEO> [--preset P] [--save-to DIR] [--deny-save]
//                              [--preview-secs N] [--realtime]
//   voicetuner extract <VIDEO> <DST>
//   voicetuner mux <VIDEO> <AUDIO>
//
// `process` is the whole flow (extract, preview, preset, render, mux, save).
// `extract` and `mux` run a single stage on the background worker.

mod collab;
mod helpers;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

use voicetuner_core::config::{PipelineConfig, RenderMode};
use voicetuner_core::graph::GraphParameters;
use voicetuner_core::helpers::time::format_duration;
use voicetuner_core::media_types::{MediaAsset, MediaKind, PipelineResult};
use voicetuner_core::presets::EffectPreset;
use voicetuner_media::probe::{probe_audio_duration, probe_video};
use voicetuner_media::{EditingSession, PipelineWorker};

use collab::{FolderLibrary, PathPicker};
use helpers::format::{describe_params, progress_bar, truncate};

#[derive(Parser)]
#[command(name = "voicetuner", version, about = "Apply voice effects to the audio of a video")]
struct Cli {
    /// JSON pipeline configuration. Missing fields take their defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for convertedVideo.mp4 (overrides the config).
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// -v for debug, -vv for trace. RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the voice effects.
    Presets {
        #[arg(long)]
        json: bool,
    },
    /// Run the full pipeline on one video.
    Process(ProcessArgs),
    /// Copy the audio track of a video into an .m4a file.
    Extract { video: PathBuf, dst: PathBuf },
    /// Combine a video track with an audio file.
    Mux { video: PathBuf, audio: PathBuf },
}

#[derive(Args)]
struct ProcessArgs {
    video: PathBuf,

    #[arg(long, default_value = "default")]
    preset: EffectPreset,

    /// Where the finished video is saved. Defaults to the output directory.
    #[arg(long)]
    save_to: Option<PathBuf>,

    /// Refuse permission to save, exercising the failure path.
    #[arg(long)]
    deny_save: bool,

    /// Let the preview play for this many seconds before exporting.
    #[arg(long, default_value_t = 0)]
    preview_secs: u64,

    /// Render at playback speed through the output sink.
    #[arg(long)]
    realtime: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    helpers::log::init(cli.verbose);
    ffmpeg_the_third::init().context("FFmpeg init failed")?;

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None       => PipelineConfig::default(),
    };
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }

    match cli.command {
        Command::Presets { json }       => list_presets(json),
        Command::Process(args)          => process(config, args),
        Command::Extract { video, dst } => extract(config, video, dst),
        Command::Mux { video, audio }   => mux(config, &video, &audio),
    }
}

fn list_presets(json: bool) -> Result<()> {
    if json {
        let entries: Vec<_> = EffectPreset::ALL.iter().map(|p| {
            serde_json::json!({
                "name":   p.name(),
                "icon":   p.icon_name(),
                "params": GraphParameters::for_preset(*p),
            })
        }).collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    for p in EffectPreset::ALL {
        println!("{:<8} {:<11} {}", p.name(), p.icon_name(), describe_params(&GraphParameters::for_preset(p)));
    }
    Ok(())
}

fn process(mut config: PipelineConfig, args: ProcessArgs) -> Result<()> {
    if args.realtime {
        config.render_mode = RenderMode::RealTime;
    }
    let save_dir = args.save_to.unwrap_or_else(|| config.output_dir.clone());

    let mut picker = PathPicker::new(args.video.clone());
    let Some(mut session) = EditingSession::from_picker(config, &mut picker)? else {
        bail!("no video selected ({} is not a file)", args.video.display());
    };
    println!(
        "{}: {} of audio, previewing",
        truncate(&args.video.display().to_string(), 60),
        format_duration(session.audio().duration_secs),
    );

    session.apply_preset(args.preset)?;
    tracing::info!("[cli] preset {}: {}", args.preset, describe_params(&session.engine().parameters()));

    if args.preview_secs > 0 {
        std::thread::sleep(Duration::from_secs(args.preview_secs));
    }

    let mut library = FolderLibrary::new(save_dir, !args.deny_save, &args.video, args.preset);
    let saved = session.export(&mut library)?;
    println!("saved {}", saved.display());
    Ok(())
}

fn extract(config: PipelineConfig, video: PathBuf, dst: PathBuf) -> Result<()> {
    let worker = PipelineWorker::new(config);
    let job = Uuid::new_v4();
    worker.extract_audio(job, video, dst);
    match wait_for(&worker, job)? {
        PipelineResult::AudioExtracted { asset, .. } => {
            println!("{} ({})", asset.path.display(), format_duration(asset.duration_secs));
            Ok(())
        }
        PipelineResult::Failed { error, .. } => Err(error.into()),
        other => bail!("unexpected result {other:?}"),
    }
}

fn mux(config: PipelineConfig, video: &Path, audio: &Path) -> Result<()> {
    let vinfo = probe_video(video).map_err(anyhow::Error::msg).context("probe video")?;
    let adur  = probe_audio_duration(audio).map_err(anyhow::Error::msg).context("probe audio")?;

    let worker = PipelineWorker::new(config);
    let job = Uuid::new_v4();
    worker.mux(
        job,
        MediaAsset::new(video, MediaKind::Video, vinfo.duration),
        MediaAsset::new(audio, MediaKind::Audio, adur),
    );
    match wait_for(&worker, job)? {
        PipelineResult::Muxed { asset, .. } => {
            println!("{} ({})", asset.path.display(), format_duration(asset.duration_secs));
            Ok(())
        }
        PipelineResult::Failed { error, .. } => Err(error.into()),
        other => bail!("unexpected result {other:?}"),
    }
}

/// Block until `job` reports a terminal result, drawing progress on stderr.
fn wait_for(worker: &PipelineWorker, job: Uuid) -> Result<PipelineResult> {
    let mut drew = false;
    loop {
        let result = worker.rx.recv().context("worker channel closed")?;
        if result.job() != job {
            continue;
        }
        if let PipelineResult::Progress { done, total, .. } = result {
            eprint!("\r{}", progress_bar(done, total, 30));
            let _ = std::io::stderr().flush();
            drew = true;
            continue;
        }
        if drew {
            eprintln!();
        }
        return Ok(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn process_parses_preset_by_name() {
        let cli = Cli::try_parse_from(["voicetuner", "process", "in.mov", "--preset", "Monster", "--deny-save"]).unwrap();
        match cli.command {
            Command::Process(args) => {
                assert_eq!(args.preset, EffectPreset::Monster);
                assert!(args.deny_save);
                assert!(!args.realtime);
            }
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn unknown_preset_is_rejected() {
        assert!(Cli::try_parse_from(["voicetuner", "process", "in.mov", "--preset", "robot"]).is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["voicetuner", "presets", "-vv", "--output-dir", "/tmp/out"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.output_dir, Some(PathBuf::from("/tmp/out")));
    }
}
