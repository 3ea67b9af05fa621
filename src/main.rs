mod cli;

use vodforge::{
    catalog::{self, VideoUpload},
    config,
    server::{self, AppContext},
    transcode::{
        command::ToolCommand, encoder::resolve_ffmpeg, EncodeSettings, FfmpegEncoder, JobQueue,
        JobRunner, RunnerSettings, WorkerPool,
    },
};
use vodforge_core::events::EventBus;
use vodforge_core::{AssetLayout, JobState, VideoId};
use vodforge_db::pool::{init_pool, DbPool};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Open the database named in the config, creating its directory.
fn open_database(config: &config::Config) -> Result<DbPool> {
    let db_path = &config.storage.database_path;
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory {:?}", parent))?;
    }
    let db_path_str = db_path.to_string_lossy();
    tracing::info!("Initializing database at {}", db_path_str);
    Ok(init_pool(&db_path_str)?)
}

fn job_queue(config: &config::Config, db: &DbPool, events: &Arc<EventBus>) -> JobQueue {
    JobQueue::new(
        db.clone(),
        Arc::clone(events),
        config.transcode.resolutions.clone(),
        config.transcode.max_requeues,
    )
}

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&Path>,
) -> Result<()> {
    // Load config
    let mut config = config::load_config_or_default(config_path)?;

    // Override host/port from CLI if specified
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config::validate_config(&config)?;

    tracing::info!("Starting Vodforge server");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    let db_pool = open_database(&config)?;

    std::fs::create_dir_all(&config.storage.media_root).with_context(|| {
        format!("Failed to create media root {:?}", config.storage.media_root)
    })?;
    let layout = AssetLayout::new(config.storage.media_root.clone());

    let events = Arc::new(EventBus::default());
    let queue = Arc::new(job_queue(&config, &db_pool, &events));

    // Resolve jobs interrupted by a previous crash before any worker starts
    let recovered = queue.recover_orphans()?;
    if !recovered.is_empty() {
        tracing::info!("Recovered {} interrupted transcode jobs", recovered.len());
    }

    let ffmpeg = resolve_ffmpeg(&config.tools).context(
        "ffmpeg not found; install it or set tools.ffmpeg_path in the config",
    )?;
    tracing::info!("Using ffmpeg at {}", ffmpeg.display());

    let encoder = Arc::new(FfmpegEncoder::new(
        ffmpeg,
        EncodeSettings::from(&config.transcode),
    ));
    let runner = Arc::new(JobRunner::new(
        db_pool.clone(),
        layout,
        encoder,
        Arc::clone(&events),
        RunnerSettings {
            max_attempts: config.transcode.max_attempts,
            per_job_parallelism: config.transcode.per_job_parallelism,
        },
    ));

    // Start transcode workers
    let cancel = CancellationToken::new();
    let pool = WorkerPool::new(
        db_pool.clone(),
        runner,
        Arc::clone(&events),
        queue.notifier(),
        config.transcode.max_concurrent_jobs,
        config.transcode.poll_interval(),
    );
    let workers_handle = tokio::spawn(pool.run(cancel.clone()));

    // Start HTTP server
    let ctx = AppContext::new(Arc::new(config), db_pool, events, queue);
    let server_result = server::start_server(ctx, server::shutdown_signal()).await;

    // Cleanup
    tracing::info!("Shutting down...");
    cancel.cancel();
    if tokio::time::timeout(Duration::from_secs(10), workers_handle)
        .await
        .is_err()
    {
        tracing::warn!("Transcode workers did not stop in time");
    }

    server_result
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "vodforge=trace,vodforge_core=trace,vodforge_db=debug,tower_http=debug".to_string()
        } else {
            "vodforge=debug,vodforge_core=debug,vodforge_db=info,tower_http=info".to_string()
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
        Commands::Register {
            title,
            category,
            source,
            description,
        } => {
            let upload = VideoUpload {
                title,
                description,
                category,
                source_path: source.to_string_lossy().to_string(),
                thumbnail_path: None,
            };
            register_video(&upload, cli.config.as_deref())
        }
        Commands::Enqueue { video_id } => enqueue(VideoId::from(video_id), cli.config.as_deref()),
        Commands::Jobs { status } => list_jobs(status.as_deref(), cli.config.as_deref()),
        Commands::CheckTools => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(check_tools(cli.config.as_deref()))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("vodforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn register_video(upload: &VideoUpload, config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let db_pool = open_database(&config)?;
    let events = Arc::new(EventBus::default());
    let queue = job_queue(&config, &db_pool, &events);

    let (video, job) = catalog::register_video(&db_pool, &queue, &events, upload)?;
    println!("Registered video {} ({})", video.id, video.title);
    println!("Queued job {} for {:?}", job.id, job.resolutions);
    Ok(())
}

fn enqueue(video_id: VideoId, config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let db_pool = open_database(&config)?;
    let events = Arc::new(EventBus::default());
    let queue = job_queue(&config, &db_pool, &events);

    let job = queue.enqueue(video_id)?;
    println!("Queued job {} for video {}", job.id, video_id);
    Ok(())
}

fn list_jobs(status: Option<&str>, config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let db_pool = open_database(&config)?;
    let events = Arc::new(EventBus::default());
    let queue = job_queue(&config, &db_pool, &events);

    let state = status.map(str::parse::<JobState>).transpose()?;
    let jobs = queue.list_jobs(state, 0, 100)?;
    if jobs.is_empty() {
        println!("No jobs.");
        return Ok(());
    }

    for job in &jobs {
        print!(
            "{}  video {:<6} {:<20} requeues {}/{}",
            job.id,
            job.video_id.to_string(),
            job.state.as_str(),
            job.requeue_count,
            job.max_requeues
        );
        if let Some(ref error) = job.error {
            print!("  error: {}", error);
        }
        println!();
    }

    Ok(())
}

async fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");
    let config = config::load_config_or_default(config_path)?;

    let Some(ffmpeg) = resolve_ffmpeg(&config.tools) else {
        println!("✗ ffmpeg");
        println!("\nffmpeg is required for transcoding. Install it or set tools.ffmpeg_path.");
        return Ok(());
    };

    let mut cmd = ToolCommand::new(ffmpeg.clone());
    cmd.arg("-version").timeout(Duration::from_secs(10));
    match cmd.execute().await {
        Ok(output) if output.status.success() => {
            println!(
                "✓ ffmpeg ({}) - {}",
                output.stdout.lines().next().unwrap_or(""),
                ffmpeg.display()
            );
            println!("\nAll required tools are available!");
        }
        Ok(output) => {
            println!("✗ ffmpeg - {} ({})", ffmpeg.display(), output.status);
        }
        Err(e) => {
            println!("✗ ffmpeg - {}: {}", ffmpeg.display(), e);
        }
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!("  Auth enabled: {}", config.server.auth.enabled);
            println!("  Media root: {}", config.storage.media_root.display());
            println!("  Database: {}", config.storage.database_path.display());
            println!(
                "  Resolutions: {}",
                config
                    .transcode
                    .resolutions
                    .iter()
                    .map(|r| r.label())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            println!(
                "  Workers: {} (parallelism {} per job)",
                config.transcode.max_concurrent_jobs, config.transcode.per_job_parallelism
            );
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!(
                "  Auth enabled: {} (set server.auth.tokens before `start`)",
                config.server.auth.enabled
            );
            println!("  Media root: {}", config.storage.media_root.display());
        }
    }

    Ok(())
}
