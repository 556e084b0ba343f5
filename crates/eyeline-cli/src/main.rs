mod add;
mod check;
mod config;
mod interactive;
mod pre;
mod render;
mod tidy;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use config::Config;
use eyeline_core::schedule::RenderMode;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "eyeline", version, about = "Eye-aligned daily photo timelapses")]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/eyeline/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Also write log lines to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

/// Locations shared by the store-backed commands.
#[derive(Args)]
struct StoreArgs {
    /// Permanent photo directory
    #[arg(long)]
    photo_dir: Option<PathBuf>,
    /// Eye position store
    #[arg(long)]
    db: Option<PathBuf>,
}

impl StoreArgs {
    fn apply(self, config: &mut Config) {
        if let Some(dir) = self.photo_dir {
            config.photo_dir = Some(dir);
        }
        if let Some(db) = self.db {
            config.db_path = db;
        }
    }
}

/// Working image and zoom window sizes.
#[derive(Args)]
struct ViewArgs {
    /// Longest side of the image used for detection and coarse correction
    #[arg(long)]
    max_size: Option<u32>,
    /// Side of the fine correction window
    #[arg(long)]
    zoom_size: Option<u32>,
}

impl ViewArgs {
    fn apply(self, config: &mut Config) {
        if let Some(v) = self.max_size {
            config.max_size = v;
        }
        if let Some(v) = self.zoom_size {
            config.zoom_size = v;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Copy new photos into the photo directory, named after their capture time
    Pre {
        /// Directory with fresh camera photos
        #[arg(long)]
        drop_dir: Option<PathBuf>,
        #[arg(long)]
        photo_dir: Option<PathBuf>,
        /// Prepended to the new file names
        #[arg(short, long)]
        prefix: Option<String>,
        /// Move instead of copy
        #[arg(short, long)]
        delete: bool,
        /// strftime pattern matching whole file names
        #[arg(long)]
        filename_pattern: Option<String>,
    },
    /// Detect and correct eyes in photos not yet in the store
    Add {
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        view: ViewArgs,
        /// Directory holding the detection models
        #[arg(long)]
        model_dir: Option<PathBuf>,
        /// Show detected faces and eyes before correcting
        #[arg(long)]
        detection_debug: bool,
        #[arg(long)]
        filename_pattern: Option<String>,
    },
    /// Correct eye positions already in the store
    Check {
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        view: ViewArgs,
        /// Also run the whole-image correction
        #[arg(long)]
        coarse: bool,
        /// Photo file name to begin with
        begin_with: Option<String>,
    },
    /// Remove records whose photo is gone from the photo directory
    Tidy {
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Render aligned frames for the timelapse
    Render {
        #[command(flatten)]
        store: StoreArgs,
        /// Output directory for the frames
        #[arg(long)]
        target_dir: Option<PathBuf>,
        /// `fill` renders every day, `all` every photo
        #[arg(long, default_value_t = RenderMode::Fill)]
        mode: RenderMode,
        /// Mark the stored eye positions on each frame
        #[arg(long)]
        pos_debug: bool,
        /// Preview every frame; press q to stop
        #[arg(long)]
        show: bool,
        /// TrueType font for the date caption
        #[arg(long)]
        font: Option<PathBuf>,
        #[arg(long)]
        font_size: Option<f32>,
        /// strftime format of the date caption
        #[arg(long)]
        date_format: Option<String>,
        /// Locale of the date caption, e.g. en_US
        #[arg(long)]
        locale: Option<String>,
    },
    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a commented template to the config path
    Init,
}

fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    if let Commands::Config { action: ConfigAction::Init } = cli.command {
        let path = cli.config.unwrap_or_else(config::default_config_path);
        config::init(&path)?;
        println!("Wrote config template to {}", path.display());
        return Ok(());
    }

    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Pre {
            drop_dir,
            photo_dir,
            prefix,
            delete,
            filename_pattern,
        } => {
            config.drop_dir = drop_dir.or(config.drop_dir);
            config.photo_dir = photo_dir.or(config.photo_dir);
            config.prefix = prefix.or(config.prefix);
            config.delete |= delete;
            config.date_format_in_filename = filename_pattern.or(config.date_format_in_filename);
            pre::run(&config)
        }
        Commands::Add {
            store,
            view,
            model_dir,
            detection_debug,
            filename_pattern,
        } => {
            store.apply(&mut config);
            view.apply(&mut config);
            if let Some(dir) = model_dir {
                config.model_dir = dir;
            }
            config.detection_debug |= detection_debug;
            config.date_format_in_filename = filename_pattern.or(config.date_format_in_filename);
            add::run(&config)
        }
        Commands::Check {
            store,
            view,
            coarse,
            begin_with,
        } => {
            store.apply(&mut config);
            view.apply(&mut config);
            check::run(&config, begin_with.as_deref(), coarse)
        }
        Commands::Tidy { store } => {
            store.apply(&mut config);
            tidy::run(&config)
        }
        Commands::Render {
            store,
            target_dir,
            mode,
            pos_debug,
            show,
            font,
            font_size,
            date_format,
            locale,
        } => {
            store.apply(&mut config);
            config.target_dir = target_dir.or(config.target_dir);
            config.pos_debug |= pos_debug;
            config.font_path = font.or(config.font_path);
            config.font_size = font_size.unwrap_or(config.font_size);
            config.date_format = date_format.unwrap_or(config.date_format);
            config.locale = locale.unwrap_or(config.locale);
            render::run(&config, mode, show)
        }
        Commands::Config { .. } => Ok(()),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref())?;

    let result = run(cli);
    if let Err(e) = &result {
        tracing::error!("{e:#}");
    }
    result
}
