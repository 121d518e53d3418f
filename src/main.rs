mod cli;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};

use mf_av::tools::FFMPEG;
use mf_av::{FfmpegConverter, MediaConverter, ToolRegistry};
use mf_core::config::{is_supported_file, Config};

/// Config file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "mp3forge.json";

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise use defaults based on the verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "mp3forge=trace,mf_core=trace,mf_av=trace,mf_jobs=trace,mf_server=trace,tower_http=debug"
                .to_string()
        } else {
            "mp3forge=debug,mf_core=debug,mf_av=debug,mf_jobs=debug,mf_server=debug,tower_http=info"
                .to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }

            tracing::info!("Starting mp3forge {}", env!("CARGO_PKG_VERSION"));
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(mf_server::start(config))?;
            Ok(())
        }
        Commands::Convert {
            inputs,
            output,
            bitrate,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(bitrate) = bitrate {
                config.audio.bitrate = bitrate;
            }
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(convert_files(&inputs, output.as_deref(), &config))
        }
        Commands::CheckTools => {
            let config = load_config(cli.config.as_deref())?;
            check_tools(&config)
        }
        Commands::Validate { file } => {
            let path = file.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("mp3forge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Load an explicitly given config file strictly; otherwise fall back to
/// `./mp3forge.json` or built-in defaults.
fn load_config(explicit: Option<&Path>) -> Result<Config> {
    match explicit {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => {
            let config = Config::load_or_default(Some(Path::new(DEFAULT_CONFIG_FILE)));
            config.check()?;
            Ok(config)
        }
    }
}

/// Expand the command line inputs into the list of videos to convert.
/// Folders contribute their supported files (not recursive), sorted by name.
fn collect_videos(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut videos = Vec::new();

    for input in inputs {
        if input.is_dir() {
            for entry in walkdir::WalkDir::new(input)
                .min_depth(1)
                .max_depth(1)
                .sort_by_file_name()
            {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy();
                if entry.file_type().is_file() && is_supported_file(&name) {
                    videos.push(entry.into_path());
                }
            }
        } else if input.is_file() {
            if is_supported_file(&input.to_string_lossy()) {
                videos.push(input.clone());
            } else {
                println!("Skipping unsupported file: {}", input.display());
            }
        } else {
            anyhow::bail!("Input does not exist: {}", input.display());
        }
    }

    Ok(videos)
}

async fn convert_files(inputs: &[PathBuf], output: Option<&Path>, config: &Config) -> Result<()> {
    let videos = collect_videos(inputs)?;
    if videos.is_empty() {
        println!("No compatible video files found.");
        return Ok(());
    }

    let tools = ToolRegistry::discover(&config.tools);
    tools.require(FFMPEG)?;
    let converter = FfmpegConverter::new(&tools, &config.audio);

    if let Some(dir) = output {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output folder {}", dir.display()))?;
    }

    let mut failed = 0usize;
    for video in &videos {
        let name = video
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let stem = video
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| name.clone());
        let audio_name = format!("{stem}.mp3");
        let target_dir = match output {
            Some(dir) => dir.to_path_buf(),
            None => video.parent().map(Path::to_path_buf).unwrap_or_default(),
        };

        println!("Converting: {name} → {audio_name}");
        if let Err(e) = converter.convert(video, &target_dir.join(&audio_name)).await {
            failed += 1;
            println!("Failed to convert {name}: {e}");
        }
    }

    let converted = videos.len() - failed;
    if failed == 0 {
        println!("Conversion completed! {converted} file(s) converted.");
        Ok(())
    } else {
        anyhow::bail!(
            "{failed} of {} file(s) failed to convert ({converted} converted)",
            videos.len()
        )
    }
}

fn check_tools(config: &Config) -> Result<()> {
    println!("Checking external tools...\n");

    let tools = ToolRegistry::discover(&config.tools);
    let mut all_ok = true;

    for tool in tools.check_all() {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);
        if let Some(ref version) = tool.version {
            print!(" ({version})");
        }
        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }
        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
        Ok(())
    } else {
        anyhow::bail!("Some tools are missing; install ffmpeg to enable conversions")
    }
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let path = path.map(Path::to_path_buf).or_else(|| {
        let default = PathBuf::from(DEFAULT_CONFIG_FILE);
        default.exists().then_some(default)
    });

    let config = match path {
        Some(ref p) => {
            println!("Validating config: {}", p.display());
            Config::load(p).with_context(|| format!("Invalid config {}", p.display()))?
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("✓ Configuration is valid");
    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!(
        "  Uploads: up to {} files of {} MB",
        config.uploads.max_files, config.uploads.max_file_size_mb
    );
    println!(
        "  Jobs: {} concurrent conversions, retained {}s",
        config.jobs.max_concurrent_conversions, config.jobs.retention_secs
    );
    println!("  Audio: {} bitrate", config.audio.bitrate);

    for warning in config.validate() {
        println!("  warning: {warning}");
    }

    Ok(())
}
