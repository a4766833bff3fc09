//! Command line definition

use crate::analysis_client::AnalysisPrompt;
use crate::frame_source::{CameraAddress, ConnectionTarget, RtspTransport, DEFAULT_RTSP_PORT};
use crate::surveillance_loop::{LoopConfig, ReconnectPolicy, ScanConfig};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "rtsp-sentinel", version)]
#[command(about = "Periodic RTSP camera capture with remote vision analysis and Telegram alerts")]
pub struct Cli {
    /// Plain-text log file (appended)
    #[arg(long, global = true, default_value = "rtsp_sentinel.log")]
    pub log_file: PathBuf,

    /// Log to the console only
    #[arg(long, global = true)]
    pub no_log_file: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Live surveillance: capture, analyze, persist, notify
    Monitor(MonitorArgs),
    /// Capture and save frames only
    Capture(CaptureArgs),
    /// Analyze a pre-recorded video and send the results as one batch
    ScanVideo(ScanVideoArgs),
    /// Send the keyword summary of a saved result collection
    Summarize(SummarizeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CameraArgs {
    /// Camera IP address or host name
    #[arg(long, required_unless_present = "rtsp_urls")]
    pub host: Option<String>,

    #[arg(long, default_value = "admin")]
    pub username: String,

    #[arg(long, env = "CAMERA_PASSWORD", hide_env_values = true, default_value = "")]
    pub password: String,

    #[arg(long, default_value_t = DEFAULT_RTSP_PORT)]
    pub port: u16,

    #[arg(long, default_value_t = 1)]
    pub channel: u32,

    /// Explicit stream URI, tried before the vendor dialects (repeatable)
    #[arg(long = "rtsp-url")]
    pub rtsp_urls: Vec<String>,

    #[arg(long, value_enum, default_value_t = TransportArg::Tcp)]
    pub rtsp_transport: TransportArg,

    /// Seconds to wait for one frame
    #[arg(long, default_value_t = 3)]
    pub read_timeout: u64,

    /// Total session length in seconds (unbounded when omitted)
    #[arg(long)]
    pub duration: Option<u64>,

    /// Stop after this many captures
    #[arg(long)]
    pub max_captures: Option<u64>,

    /// Reconnect attempts after a failed capture
    #[arg(long, default_value_t = 1)]
    pub reconnect_attempts: u32,

    /// Base reconnect backoff in seconds (doubles per attempt)
    #[arg(long, default_value_t = 0)]
    pub reconnect_backoff: u64,
}

impl CameraArgs {
    /// Candidate URIs for this camera
    pub fn connection_target(&self) -> ConnectionTarget {
        match &self.host {
            Some(host) => {
                let address = CameraAddress::new(host, &self.username, &self.password)
                    .with_port(self.port)
                    .with_channel(self.channel);
                ConnectionTarget::for_camera(&address, &self.rtsp_urls)
            }
            None => ConnectionTarget::from_uris(self.rtsp_urls.iter().cloned()),
        }
    }

    pub fn loop_config(&self, interval_secs: u64) -> LoopConfig {
        LoopConfig {
            interval: Duration::from_secs(interval_secs.max(1)),
            duration: self.duration.map(Duration::from_secs),
            max_ticks: self.max_captures,
            read_timeout: Duration::from_secs(self.read_timeout.max(1)),
            reconnect: ReconnectPolicy {
                max_attempts: self.reconnect_attempts.max(1),
                backoff: Duration::from_secs(self.reconnect_backoff),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportArg {
    Tcp,
    Udp,
}

impl From<TransportArg> for RtspTransport {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Tcp => RtspTransport::Tcp,
            TransportArg::Udp => RtspTransport::Udp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PromptArg {
    General,
    Exam,
}

/// Prompt preset, optionally replaced by a file
#[derive(Args, Debug, Clone)]
pub struct PromptArgs {
    #[arg(long = "prompt", value_enum)]
    pub preset: Option<PromptArg>,

    /// Read the prompt text from a file instead
    #[arg(long, conflicts_with = "preset")]
    pub prompt_file: Option<PathBuf>,
}

impl PromptArgs {
    pub async fn resolve(&self, default: PromptArg) -> std::io::Result<AnalysisPrompt> {
        if let Some(path) = &self.prompt_file {
            return AnalysisPrompt::from_file(path).await;
        }
        Ok(match self.preset.unwrap_or(default) {
            PromptArg::General => AnalysisPrompt::general_surveillance(),
            PromptArg::Exam => AnalysisPrompt::exam_hall(),
        })
    }
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    #[command(flatten)]
    pub camera: CameraArgs,

    #[command(flatten)]
    pub prompt: PromptArgs,

    /// Seconds between captures, measured from capture start
    #[arg(long, default_value_t = 60)]
    pub interval: u64,

    /// Analyze and persist without sending notifications
    #[arg(long)]
    pub no_notify: bool,
}

#[derive(Args, Debug)]
pub struct CaptureArgs {
    #[command(flatten)]
    pub camera: CameraArgs,

    #[arg(long, default_value_t = 10)]
    pub interval: u64,
}

#[derive(Args, Debug)]
pub struct ScanVideoArgs {
    /// Video file to analyze
    #[arg(long)]
    pub path: PathBuf,

    #[command(flatten)]
    pub prompt: PromptArgs,

    /// Seconds between sampled frames
    #[arg(long, default_value_t = 60)]
    pub interval: u64,

    /// Milliseconds between batch messages
    #[arg(long, default_value_t = crate::notification_sink::DEFAULT_BATCH_DELAY_MS)]
    pub delay_ms: u64,

    /// Also send the keyword summary
    #[arg(long)]
    pub summary: bool,

    /// Analyze and persist without sending notifications
    #[arg(long)]
    pub no_notify: bool,
}

impl ScanVideoArgs {
    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            interval: Duration::from_secs(self.interval.max(1)),
            batch_delay: Duration::from_millis(self.delay_ms),
            send_summary: self.summary,
        }
    }
}

#[derive(Args, Debug)]
pub struct SummarizeArgs {
    /// Collection file written by `scan-video`
    #[arg(long)]
    pub file: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_monitor_defaults() {
        let cli = Cli::try_parse_from(["rtsp-sentinel", "monitor", "--host", "192.168.1.130"]).unwrap();
        let Command::Monitor(args) = cli.command else {
            panic!("expected monitor");
        };

        let config = args.camera.loop_config(args.interval);
        assert_eq!(config.interval, Duration::from_secs(60));
        assert_eq!(config.read_timeout, Duration::from_secs(3));
        assert_eq!(config.reconnect, ReconnectPolicy::default());
        assert_eq!(config.duration, None);
        assert_eq!(args.camera.connection_target().len(), 4);
        assert!(!cli.no_log_file);
    }

    #[test]
    fn test_explicit_urls_tried_first() {
        let cli = Cli::try_parse_from([
            "rtsp-sentinel",
            "capture",
            "--host",
            "cam",
            "--rtsp-url",
            "rtsp://cam/custom",
        ])
        .unwrap();
        let Command::Capture(args) = cli.command else {
            panic!("expected capture");
        };

        let target = args.camera.connection_target();
        assert_eq!(target.len(), 5);
        assert_eq!(target.candidates()[0].uri(), "rtsp://cam/custom");
        assert_eq!(args.interval, 10);
    }

    #[test]
    fn test_host_or_url_required() {
        assert!(Cli::try_parse_from(["rtsp-sentinel", "monitor"]).is_err());
        assert!(Cli::try_parse_from(["rtsp-sentinel", "monitor", "--rtsp-url", "rtsp://x/y"]).is_ok());
    }

    #[tokio::test]
    async fn test_scan_video_defaults_to_exam_prompt() {
        let cli = Cli::try_parse_from(["rtsp-sentinel", "scan-video", "--path", "exam.mp4"]).unwrap();
        let Command::ScanVideo(args) = cli.command else {
            panic!("expected scan-video");
        };

        let prompt = args.prompt.resolve(PromptArg::Exam).await.unwrap();
        assert_eq!(prompt.name(), "exam");
        assert_eq!(args.scan_config().batch_delay, Duration::from_millis(1000));
    }
}
