//! Storyreel CLI: edit, preview, and export timeline projects headlessly.
//!
//! Usage:
//!   storyreel init <TITLE>                  Create an empty project
//!   storyreel info <PROJECT>                Show project information
//!   storyreel list                          List stored projects
//!   storyreel add <PROJECT> <URL>           Upload a clip and drop it on the timeline
//!   storyreel add-gallery <PROJECT> <JSON>  Add clips from a gallery listing
//!   storyreel import <PROJECT> <JSON>       Apply a generation response
//!   storyreel overlay <PROJECT> <TEXT>      Add a text overlay
//!   storyreel voiceover <PROJECT> <URL>     Add a voice recording
//!   storyreel split <PROJECT> <CLIP> <OFF>  Split a clip at an offset
//!   storyreel split-at <PROJECT> <TIME>     Split the video clip under the playhead
//!   storyreel trim <PROJECT> <CLIP> ...     Set a clip's interval
//!   storyreel delete <PROJECT> <CLIP>       Remove a clip
//!   storyreel arrange <PROJECT>             Close gaps on a track
//!   storyreel play <PROJECT>                Run the transport against simulated media
//!   storyreel export <PROJECT>              Export to video

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use storyreel_common::{AppConfig, ExportFormat, QualityPreset};
use storyreel_project_model::{OverlayPosition, TrackKind};

mod commands;

#[derive(Parser)]
#[command(
    name = "storyreel",
    about = "Timeline editing, preview, and export for generated animation projects",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/storyreel/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the projects directory
    #[arg(long, global = true)]
    projects_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Track {
    Video,
    Audio,
}

impl From<Track> for TrackKind {
    fn from(track: Track) -> Self {
        match track {
            Track::Video => TrackKind::Video,
            Track::Audio => TrackKind::Audio,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Position {
    Top,
    Center,
    Bottom,
}

impl From<Position> for OverlayPosition {
    fn from(position: Position) -> Self {
        match position {
            Position::Top => OverlayPosition::Top,
            Position::Center => OverlayPosition::Center,
            Position::Bottom => OverlayPosition::Bottom,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Quality {
    Low,
    Medium,
    High,
}

impl From<Quality> for QualityPreset {
    fn from(quality: Quality) -> Self {
        match quality {
            Quality::Low => QualityPreset::Low,
            Quality::Medium => QualityPreset::Medium,
            Quality::High => QualityPreset::High,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Mp4,
    Webm,
}

impl From<Format> for ExportFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Mp4 => ExportFormat::Mp4,
            Format::Webm => ExportFormat::Webm,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new empty project
    Init {
        /// Project title
        title: String,

        /// Project description
        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Show project information
    Info {
        /// Project id
        project: String,

        /// Print the raw snapshot JSON
        #[arg(long)]
        json: bool,
    },

    /// List stored projects
    List,

    /// Delete a stored project
    Remove { project: String },

    /// Upload a clip: add it to the library and drop it on the timeline
    Add {
        project: String,

        /// Media locator (path or URL)
        url: String,

        /// Display name (defaults to the file name)
        #[arg(short, long)]
        name: Option<String>,

        /// Track the clip belongs on
        #[arg(long, value_enum, default_value = "video")]
        track: Track,

        /// Duration in seconds; probed with ffprobe when omitted
        #[arg(long)]
        duration: Option<f64>,

        /// Only add to the library
        #[arg(long)]
        library_only: bool,
    },

    /// Add clips from a gallery listing JSON file
    AddGallery {
        project: String,

        /// Gallery listing (array or `{ "videos": [...] }`)
        listing: PathBuf,

        /// Also drop every gallery clip on the timeline
        #[arg(long)]
        place: bool,
    },

    /// Apply a generation service response JSON file
    Import {
        project: String,

        /// Generation response
        response: PathBuf,

        /// Prompt the response was generated from
        #[arg(long)]
        prompt: Option<String>,

        /// Also drop every generated clip on the timeline
        #[arg(long)]
        place: bool,
    },

    /// Add a text overlay
    Overlay {
        project: String,

        text: String,

        /// Start time (seconds)
        #[arg(long, default_value = "0")]
        start: f64,

        /// Duration (seconds, default 5)
        #[arg(long)]
        duration: Option<f64>,

        #[arg(long, value_enum, default_value = "bottom")]
        position: Position,

        #[arg(long)]
        font_size: Option<f32>,
    },

    /// Add a voice recording to the audio track
    Voiceover {
        project: String,

        url: String,

        /// Recording length (seconds)
        #[arg(long)]
        duration: f64,

        /// Anchor the recording at this time as a voiceover
        #[arg(long)]
        at: Option<f64>,
    },

    /// Split a clip at an offset from its start
    Split {
        project: String,
        clip: String,
        /// Seconds from the clip's start
        offset: f64,
    },

    /// Split the video clip under the playhead
    SplitAt {
        project: String,
        /// Playhead time (seconds)
        time: f64,
    },

    /// Set a clip's timeline interval
    Trim {
        project: String,
        clip: String,
        start: f64,
        end: f64,

        /// Reject intervals that overlap a neighbor
        #[arg(long)]
        strict: bool,
    },

    /// Remove a clip from the timeline
    Delete { project: String, clip: String },

    /// Close every gap on a track
    Arrange {
        project: String,

        #[arg(long, value_enum, default_value = "video")]
        track: Track,
    },

    /// Run the transport against simulated media elements
    Play {
        project: String,

        /// Start position (seconds)
        #[arg(long, default_value = "0")]
        from: f64,

        /// Trajectory sampling interval (seconds of timeline time)
        #[arg(long, default_value = "1.0")]
        sample: f64,

        /// Sources that fail to load
        #[arg(long)]
        fail: Vec<String>,

        /// Simulated buffering time per source (seconds)
        #[arg(long, default_value = "0")]
        load_secs: f64,

        /// Run on the wall clock instead of stepping instantly
        #[arg(long)]
        realtime: bool,

        /// Stop a realtime run after this many seconds
        #[arg(long)]
        max_secs: Option<f64>,

        /// Store the final cursor position in the project
        #[arg(long)]
        save: bool,
    },

    /// Export a project to video
    Export {
        project: String,

        /// Output directory (defaults to the current directory)
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        #[arg(long, value_enum)]
        quality: Option<Quality>,

        #[arg(long, value_enum)]
        format: Option<Format>,

        #[arg(long)]
        fps: Option<u32>,

        /// Font for overlays and the placeholder card
        #[arg(long)]
        font: Option<PathBuf>,

        /// Show the export plan without rendering
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    if let Some(dir) = cli.projects_dir {
        config.projects_dir = dir;
    }
    storyreel_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Init { title, description } => commands::init::run(&config, title, description),
        Commands::Info { project, json } => commands::info::run(&config, &project, json),
        Commands::List => commands::info::list(&config),
        Commands::Remove { project } => commands::info::remove(&config, &project),
        Commands::Add {
            project,
            url,
            name,
            track,
            duration,
            library_only,
        } => {
            commands::edit::add(
                &config,
                &project,
                url,
                name,
                track.into(),
                duration,
                library_only,
            )
            .await
        }
        Commands::AddGallery {
            project,
            listing,
            place,
        } => commands::import::gallery(&config, &project, &listing, place),
        Commands::Import {
            project,
            response,
            prompt,
            place,
        } => commands::import::generation(&config, &project, &response, prompt, place),
        Commands::Overlay {
            project,
            text,
            start,
            duration,
            position,
            font_size,
        } => commands::edit::overlay(
            &config,
            &project,
            text,
            start,
            duration,
            position.into(),
            font_size,
        ),
        Commands::Voiceover {
            project,
            url,
            duration,
            at,
        } => commands::edit::voiceover(&config, &project, &url, duration, at),
        Commands::Split {
            project,
            clip,
            offset,
        } => commands::edit::split(&config, &project, &clip, offset),
        Commands::SplitAt { project, time } => commands::edit::split_at(&config, &project, time),
        Commands::Trim {
            project,
            clip,
            start,
            end,
            strict,
        } => commands::edit::trim(&config, &project, &clip, start, end, strict),
        Commands::Delete { project, clip } => commands::edit::delete(&config, &project, &clip),
        Commands::Arrange { project, track } => {
            commands::edit::arrange(&config, &project, track.into())
        }
        Commands::Play {
            project,
            from,
            sample,
            fail,
            load_secs,
            realtime,
            max_secs,
            save,
        } => {
            let options = commands::play::PlayOptions {
                from,
                sample,
                fail,
                load_secs,
                realtime,
                max_secs,
                save,
            };
            commands::play::run(&config, &project, options).await
        }
        Commands::Export {
            project,
            output,
            quality,
            format,
            fps,
            font,
            dry_run,
        } => {
            let mut defaults = config.export.clone();
            if let Some(q) = quality {
                defaults.quality = q.into();
            }
            if let Some(f) = format {
                defaults.format = f.into();
            }
            if let Some(fps) = fps {
                defaults.fps = fps;
            }
            if font.is_some() {
                defaults.font_path = font;
            }
            commands::export::run(&config, &project, &defaults, output, dry_run).await
        }
    }
}
