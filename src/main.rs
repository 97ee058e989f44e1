mod cli;

use vid2audio::{config, server};
use vid2audio_av::{
    output_file_name, FfmpegEngine, ToolRegistry, TranscodeEngine, TranscodeEvent,
    TranscodeRequest,
};
use vid2audio_core::{JobId, TrimWindow};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::{Path, PathBuf};
use std::sync::Arc;

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    // CLI flags win over file and environment.
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    tracing::info!("Starting vid2audio server");
    tracing::info!(
        "Uploads in {:?}, outputs in {:?}, retention {}s",
        config.storage.upload_dir,
        config.storage.output_dir,
        config.queue.retention_secs
    );

    let registry = ToolRegistry::discover(&config.tools);
    let tools = registry.check_all();
    for tool in &tools {
        if !tool.available {
            tracing::warn!("Tool {} is not available", tool.name);
        }
    }

    let engine = FfmpegEngine::new(&registry, config.transcode.clone())
        .context("ffmpeg is required to run the server")?;

    server::start_server(config, Arc::new(engine), tools).await
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "vid2audio=trace,vid2audio_av=trace,vid2audio_core=debug,tower_http=debug".to_string()
        } else {
            "vid2audio=debug,vid2audio_av=debug,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Convert {
            input,
            start,
            end,
            output_dir,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(convert_file(
                &input,
                start.as_deref(),
                end.as_deref(),
                output_dir,
                cli.config.as_deref(),
            ))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("vid2audio {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn convert_file(
    input: &Path,
    start: Option<&str>,
    end: Option<&str>,
    output_dir: Option<PathBuf>,
    config_path: Option<&Path>,
) -> Result<()> {
    let trim = TrimWindow::parse(start, end)?;

    if !input.exists() {
        anyhow::bail!("Input file does not exist: {:?}", input);
    }

    let config = config::load_config_or_default(config_path)?;
    let registry = ToolRegistry::discover(&config.tools);
    let engine = FfmpegEngine::new(&registry, config.transcode.clone())?;

    let output_dir = match output_dir {
        Some(dir) => dir,
        None => input
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create output directory {:?}", output_dir))?;

    let display_name = input
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "input".to_string());
    let final_path = output_dir.join(output_file_name(
        &display_name,
        trim.as_ref(),
        engine.output_extension(),
    ));

    println!("Converting {}", input.display());
    let mut stream = engine.transcode(TranscodeRequest {
        job_id: JobId::new(),
        source: input.to_path_buf(),
        display_name,
        trim,
        output_dir,
    });

    let mut last_reported = -1;
    while let Some(event) = stream.next().await {
        match event {
            TranscodeEvent::Progress(pct) => {
                let whole = pct.floor() as i32;
                if whole / 10 > last_reported / 10 {
                    println!("  {:>3}%", whole);
                    last_reported = whole;
                }
            }
            TranscodeEvent::Completed(path) => {
                std::fs::rename(&path, &final_path)
                    .with_context(|| format!("Failed to move output to {:?}", final_path))?;
                println!("✓ Wrote {}", final_path.display());
                return Ok(());
            }
            TranscodeEvent::Failed(message) => {
                anyhow::bail!("Conversion failed: {}", message);
            }
        }
    }

    anyhow::bail!("Conversion ended without a result")
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = config::load_config_or_default(config_path)?;
    let tools = ToolRegistry::discover(&config.tools).check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install ffmpeg to enable conversion.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Push path: {}", config.server.push_path);
    println!("  Upload dir: {}", config.storage.upload_dir.display());
    println!("  Output dir: {}", config.storage.output_dir.display());
    println!("  Retention: {}s", config.queue.retention_secs);
    println!(
        "  Output: {} {} .{}",
        config.transcode.audio_codec, config.transcode.audio_bitrate, config.transcode.output_extension
    );

    for warning in config.validate() {
        println!("  ⚠ {}", warning);
    }

    Ok(())
}
