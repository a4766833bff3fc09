//! rtsp-sentinel - Unattended camera surveillance
//!
//! Main entry point. Wires the components together for one subcommand
//! and runs until the session ends or Ctrl-C is pressed.

use clap::Parser;
use rtsp_sentinel::{
    analysis_client::{AnalysisClient, AnalysisPrompt, GeminiBackend},
    cli::{
        CameraArgs, CaptureArgs, Cli, Command, MonitorArgs, PromptArg, ScanVideoArgs,
        SummarizeArgs,
    },
    config::{env_lookup, AppConfig},
    frame_source::{FfmpegTransport, FrameSource},
    notification_sink::{NotificationSink, TelegramTransport},
    result_store::ResultStore,
    surveillance_loop::{SurveillanceLoop, VideoScan},
    video_file::FfmpegVideoFile,
    Error, Result,
};
use std::fs::OpenOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let file_layer = if cli.no_log_file {
        None
    } else {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&cli.log_file)?;
        Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(file)),
        )
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rtsp_sentinel=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    tracing::info!("Starting rtsp-sentinel v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::from_env();
    tracing::info!(
        frames_dir = %config.frames_dir.display(),
        analysis_dir = %config.analysis_dir.display(),
        "Configuration loaded"
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Stop signal received, shutting down");
                cancel.cancel();
            }
        });
    }

    let result = match cli.command {
        Command::Monitor(args) => run_monitor(&config, args, cancel).await,
        Command::Capture(args) => run_capture(&config, args, cancel).await,
        Command::ScanVideo(args) => run_scan(&config, args, cancel).await,
        Command::Summarize(args) => run_summarize(&config, args).await,
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "rtsp-sentinel exiting with error");
    }
    result.map_err(Into::into)
}

async fn frame_source(camera: &CameraArgs) -> Result<FrameSource> {
    let transport = FfmpegTransport::new(camera.rtsp_transport.into());
    let version = transport.check_ffmpeg().await?;
    tracing::info!(ffmpeg = %version, "ffmpeg available");

    let target = camera.connection_target();
    if target.is_empty() {
        return Err(Error::Config("no camera URL candidates".to_string()));
    }
    Ok(FrameSource::new(target, Arc::new(transport)))
}

fn analysis_client(config: &AppConfig, prompt: AnalysisPrompt) -> Result<AnalysisClient> {
    let api_key = AppConfig::gemini_api_key(env_lookup)?;
    let backend = GeminiBackend::new(config.gemini_endpoint.clone(), api_key);
    tracing::info!(prompt = prompt.name(), "Vision analysis enabled");
    Ok(AnalysisClient::new(Arc::new(backend), prompt))
}

fn notification_sink(config: &AppConfig, cancel: &CancellationToken) -> Result<NotificationSink> {
    let credentials = AppConfig::telegram_credentials(env_lookup)?;
    let transport = TelegramTransport::new(config.telegram_api_base.clone(), credentials);
    Ok(NotificationSink::new(Arc::new(transport)).with_cancellation(cancel.clone()))
}

fn result_store(config: &AppConfig) -> ResultStore {
    ResultStore::new(config.frames_dir.clone(), config.analysis_dir.clone())
}

async fn run_monitor(
    config: &AppConfig,
    args: MonitorArgs,
    cancel: CancellationToken,
) -> Result<()> {
    let prompt = args.prompt.resolve(PromptArg::General).await?;
    let client = analysis_client(config, prompt)?;
    let source = frame_source(&args.camera).await?;

    let mut session = SurveillanceLoop::new(
        source,
        result_store(config),
        args.camera.loop_config(args.interval),
        cancel.clone(),
    )
    .with_analysis(client);

    if args.no_notify {
        tracing::info!("Notifications disabled");
    } else {
        session = session.with_notifications(notification_sink(config, &cancel)?);
    }

    session.run().await?;
    Ok(())
}

async fn run_capture(
    config: &AppConfig,
    args: CaptureArgs,
    cancel: CancellationToken,
) -> Result<()> {
    let source = frame_source(&args.camera).await?;
    let mut session = SurveillanceLoop::new(
        source,
        result_store(config),
        args.camera.loop_config(args.interval),
        cancel,
    );

    session.run().await?;
    Ok(())
}

async fn run_scan(
    config: &AppConfig,
    args: ScanVideoArgs,
    cancel: CancellationToken,
) -> Result<()> {
    let prompt = args.prompt.resolve(PromptArg::Exam).await?;
    let client = analysis_client(config, prompt)?;
    let reader = FfmpegVideoFile::new(args.path.clone());

    let mut scan = VideoScan::new(
        Arc::new(reader),
        client,
        result_store(config),
        args.scan_config(),
        cancel.clone(),
    );
    if !args.no_notify {
        scan = scan.with_notifications(notification_sink(config, &cancel)?);
    }

    let report = scan.run().await?;
    if let Some(batch) = &report.batch {
        if !batch.is_complete() {
            tracing::warn!(
                delivered = batch.delivered,
                failed = batch.failures.len(),
                skipped = batch.skipped,
                "Batch delivery incomplete"
            );
        }
    }
    if let Some(path) = &report.collection {
        tracing::info!(path = %path.display(), "Results saved");
    }
    Ok(())
}

async fn run_summarize(config: &AppConfig, args: SummarizeArgs) -> Result<()> {
    let records = ResultStore::load_collection(&args.file).await?;
    tracing::info!(records = records.len(), file = %args.file.display(), "Collection loaded");

    let sink = notification_sink(config, &CancellationToken::new())?;
    sink.send_summary(&records).await?;
    Ok(())
}
