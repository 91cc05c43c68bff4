//! DramaForge command line
//!
//! Usage:
//!   dramaforge timeline <project>                      - Print the assembled timeline
//!   dramaforge export-wav <project> <out.wav>          - Mixed WAV with cue points
//!   dramaforge export-project <project> <out-dir>      - Reaper project bundle
//!   dramaforge resegment <project> <source> -m 3,7     - Re-slice a master recording
//!   dramaforge cues <file.wav>                         - List cue points of a WAV
//!   dramaforge play <project> [--from 12.5]            - Play on the default device (`device` feature)

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use df_core::{ExportScope, StudioConfig};
use df_file::{ProjectDirectory, read_cue_points};
use df_offline::{ExportInput, export_mixed_audio_to_path, export_project};
use df_state::{RealignWindow, RealignmentEngine};
use df_timeline::{AudioCache, ClipDurationResolver, TimelineBuilder};

#[derive(Parser)]
#[command(name = "dramaforge", about = "Audio drama timeline tools")]
struct Cli {
    /// Configuration file (defaults to the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the assembled timeline
    Timeline {
        project: PathBuf,
        /// Restrict to these chapters
        #[arg(short, long = "chapter")]
        chapters: Vec<String>,
        /// Print clips as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export a mixed WAV with one cue point per line
    ExportWav {
        project: PathBuf,
        output: PathBuf,
        #[arg(short, long = "chapter")]
        chapters: Vec<String>,
    },
    /// Export a multi-track Reaper project
    ExportProject {
        project: PathBuf,
        output_dir: PathBuf,
        /// Project file name (defaults to the project name)
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long = "chapter")]
        chapters: Vec<String>,
    },
    /// Re-slice a master recording at new markers
    Resegment {
        project: PathBuf,
        source: String,
        /// Split points in seconds
        #[arg(short, long, value_delimiter = ',')]
        markers: Vec<f64>,
        /// Only recalibrate these lines
        #[arg(long, value_delimiter = ',', requires_all = ["window_start", "window_end"])]
        window_lines: Vec<String>,
        #[arg(long)]
        window_start: Option<f64>,
        #[arg(long)]
        window_end: Option<f64>,
        /// Show the new segments without writing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// List cue points of a WAV file
    Cues { file: PathBuf },
    /// Play the timeline on the default audio device
    #[cfg(feature = "device")]
    Play {
        project: PathBuf,
        /// Timeline position to start from (seconds)
        #[arg(long, default_value_t = 0.0)]
        from: f64,
        #[arg(short, long = "chapter")]
        chapters: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let config = match &cli.config {
        Some(path) => StudioConfig::load_from(path),
        None => StudioConfig::load(),
    };
    config.validate().context("Invalid configuration")?;

    match cli.command {
        Commands::Timeline {
            project,
            chapters,
            json,
        } => print_timeline(&project, scope(chapters), json, &config),
        Commands::ExportWav {
            project,
            output,
            chapters,
        } => export_wav(&project, &output, scope(chapters), &config),
        Commands::ExportProject {
            project,
            output_dir,
            name,
            chapters,
        } => export_bundle(&project, &output_dir, name, scope(chapters), &config),
        Commands::Resegment {
            project,
            source,
            markers,
            window_lines,
            window_start,
            window_end,
            dry_run,
        } => {
            let window = match (window_lines.is_empty(), window_start, window_end) {
                (true, _, _) => None,
                (false, Some(start), Some(end)) => Some(RealignWindow {
                    line_ids: window_lines,
                    start,
                    end,
                }),
                _ => bail!("--window-lines needs --window-start and --window-end"),
            };
            resegment(&project, &source, &markers, window, dry_run, &config)
        }
        Commands::Cues { file } => print_cues(&file),
        #[cfg(feature = "device")]
        Commands::Play {
            project,
            from,
            chapters,
        } => play(&project, from, scope(chapters), &config),
    }
}

fn scope(chapters: Vec<String>) -> ExportScope {
    if chapters.is_empty() {
        ExportScope::All
    } else {
        ExportScope::Chapters(chapters)
    }
}

fn open_project(path: &Path) -> Result<Arc<ProjectDirectory>> {
    let dir = ProjectDirectory::open(path)
        .with_context(|| format!("Failed to open project {}", path.display()))?;
    Ok(Arc::new(dir))
}

fn resolver(project: &Arc<ProjectDirectory>, config: &StudioConfig) -> ClipDurationResolver {
    let cache = Arc::new(AudioCache::with_max_size(config.cache.max_decoded_bytes));
    ClipDurationResolver::with_cache(project.clone(), cache)
}

fn print_timeline(path: &Path, scope: ExportScope, json: bool, config: &StudioConfig) -> Result<()> {
    let project = open_project(path)?;
    let resolver = resolver(&project, config);
    let build = TimelineBuilder::new(&resolver)
        .build_project(project.as_ref(), project.as_ref(), &scope)
        .context("Failed to build timeline")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&build.clips)?);
    } else {
        for clip in &build.clips {
            println!(
                "{:>10.3}  {:>8.3}  {:<5}  {:<24}  {}",
                clip.start_time,
                clip.duration,
                format!("{:?}", clip.track).to_lowercase(),
                clip.id,
                clip.label
            );
        }
        println!("Total: {:.3}s, {} clips", build.total_duration, build.clips.len());
    }

    for failure in &build.failures {
        log::warn!(
            "Line '{}' in chapter '{}' left out: {}",
            failure.line_id,
            failure.chapter_id,
            failure.reason
        );
    }
    Ok(())
}

fn export_wav(path: &Path, output: &Path, scope: ExportScope, config: &StudioConfig) -> Result<()> {
    let project = open_project(path)?;
    let resolver = resolver(&project, config);
    let input = ExportInput {
        store: project.as_ref(),
        library: project.as_ref(),
        resolver: &resolver,
        config,
    };

    let export = export_mixed_audio_to_path(&input, &scope, output)
        .with_context(|| format!("Failed to export {}", output.display()))?;
    println!(
        "Wrote {} ({:.2}s, {} cues, {} lines left out, {} clips silent)",
        output.display(),
        export.total_duration,
        export.cue_points.len(),
        export.failures.len(),
        export.skipped.len()
    );
    Ok(())
}

fn export_bundle(
    path: &Path,
    output_dir: &Path,
    name: Option<String>,
    scope: ExportScope,
    config: &StudioConfig,
) -> Result<()> {
    let project = open_project(path)?;
    let resolver = resolver(&project, config);
    let input = ExportInput {
        store: project.as_ref(),
        library: project.as_ref(),
        resolver: &resolver,
        config,
    };

    let name = name.unwrap_or_else(|| project.manifest().name);
    let bundle = export_project(&input, &scope, &name).context("Failed to build project export")?;
    let written = bundle
        .write_to_dir(output_dir)
        .with_context(|| format!("Failed to write {}", output_dir.display()))?;

    for track in &bundle.tracks {
        println!("{:<32} {} items", track.name, track.items.len());
    }
    println!("Wrote {} files to {}", written.len(), output_dir.display());
    Ok(())
}

fn resegment(
    path: &Path,
    source: &str,
    markers: &[f64],
    window: Option<RealignWindow>,
    dry_run: bool,
    config: &StudioConfig,
) -> Result<()> {
    let project = open_project(path)?;
    let engine = RealignmentEngine::new(project).with_bit_depth(config.audio.bit_depth);

    let lines = if dry_run {
        engine.preview(source, markers, window.as_ref())?
    } else {
        engine.resegment(source, markers, window.as_ref())?.lines
    };

    for line in &lines {
        match line.span {
            Some((start, end)) => println!("{:<24} {:>10.3} - {:>10.3}", line.line_id, start, end),
            None => println!("{:<24} (skipped, cleared)", line.line_id),
        }
    }
    if dry_run {
        println!("Dry run: nothing written");
    }
    Ok(())
}

fn print_cues(file: &Path) -> Result<()> {
    let bytes = std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let cues = read_cue_points(&bytes)?;
    if cues.is_empty() {
        println!("No cue points");
    }
    for cue in cues {
        println!("{:>4}  {:>12}  {}", cue.id, cue.sample_offset, cue.label);
    }
    Ok(())
}

#[cfg(feature = "device")]
fn play(path: &Path, from: f64, scope: ExportScope, config: &StudioConfig) -> Result<()> {
    use df_engine::{DEFAULT_FRAME_INTERVAL, DeviceOutput, PlaybackScheduler, SchedulerDriver};

    let project = open_project(path)?;
    let resolver = Arc::new(resolver(&project, config));
    let build = TimelineBuilder::new(&resolver)
        .build_project(project.as_ref(), project.as_ref(), &scope)
        .context("Failed to build timeline")?;

    let output = DeviceOutput::open_default().context("Failed to open the audio device")?;
    let mut scheduler = PlaybackScheduler::new(&build, resolver, Box::new(output), &config.playback)?;
    scheduler.start(from)?;
    println!("Playing {:.2}s from {:.2}s", build.total_duration, from);

    let scheduler = Arc::new(parking_lot::Mutex::new(scheduler));
    let driver = SchedulerDriver::spawn(Arc::clone(&scheduler), DEFAULT_FRAME_INTERVAL)?;
    // Auto-stop at the end of the timeline ends the run
    while scheduler.lock().is_playing() {
        std::thread::sleep(std::time::Duration::from_millis(100));
    }
    driver.shutdown();
    Ok(())
}
