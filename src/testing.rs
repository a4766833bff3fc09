//! Scripted fakes for the transport, backend and messaging boundaries

use crate::analysis_client::{BackendError, VisionBackend, VisionReply, VisionRequest};
use crate::frame_source::{TransportError, VideoStream, VideoTransport};
use crate::notification_sink::{MessageTransport, NotificationFailure};
use crate::video_file::{VideoError, VideoInfo, VideoReader};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Small valid JPEG
pub fn tiny_jpeg() -> Vec<u8> {
    jpeg_of_size(16, 12)
}

pub fn jpeg_of_size(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut buf = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, 90);
    img.write_with_encoder(encoder).unwrap();
    buf
}

// ---------------------------------------------------------------------------
// Video transport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStep {
    Frame,
    Empty,
    Fail,
    Hang,
}

#[derive(Debug, Clone)]
pub struct StreamScript {
    steps: VecDeque<ReadStep>,
    then: ReadStep,
}

impl StreamScript {
    pub fn new(steps: Vec<ReadStep>, then: ReadStep) -> Self {
        Self {
            steps: steps.into(),
            then,
        }
    }

    pub fn endless(step: ReadStep) -> Self {
        Self::new(Vec::new(), step)
    }
}

#[derive(Debug, Clone)]
enum OpenScript {
    Refuse,
    Hang,
    Stream(StreamScript),
}

/// Transport whose behavior per URI is scripted
///
/// Each `open` consumes the next script queued for the URI; the last
/// script is reused once the queue is down to one entry. Unscripted URIs
/// refuse to open.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<OpenScript>>>,
    opened: Mutex<Vec<String>>,
    closes: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, uri: &str, script: OpenScript) {
        self.scripts
            .lock()
            .unwrap()
            .entry(uri.to_string())
            .or_default()
            .push_back(script);
    }

    pub fn script(&self, uri: &str, script: StreamScript) {
        self.push(uri, OpenScript::Stream(script));
    }

    pub fn refuse(&self, uri: &str) {
        self.push(uri, OpenScript::Refuse);
    }

    pub fn hang_on_open(&self, uri: &str) {
        self.push(uri, OpenScript::Hang);
    }

    /// URIs in the order they were opened (including refused ones)
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoTransport for ScriptedTransport {
    async fn open(&self, uri: &str) -> Result<Box<dyn VideoStream>, TransportError> {
        self.opened.lock().unwrap().push(uri.to_string());

        let script = {
            let mut scripts = self.scripts.lock().unwrap();
            match scripts.get_mut(uri) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match script.unwrap_or(OpenScript::Refuse) {
            OpenScript::Refuse => Err(TransportError::Open(format!("connection refused: {}", uri))),
            OpenScript::Hang => std::future::pending().await,
            OpenScript::Stream(script) => Ok(Box::new(ScriptedStream {
                script,
                closes: self.closes.clone(),
            })),
        }
    }
}

struct ScriptedStream {
    script: StreamScript,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl VideoStream for ScriptedStream {
    async fn read(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let step = self.script.steps.pop_front().unwrap_or(self.script.then);
        match step {
            ReadStep::Frame => Ok(Some(tiny_jpeg())),
            ReadStep::Empty => Ok(None),
            ReadStep::Fail => Err(TransportError::Stream("connection reset".to_string())),
            ReadStep::Hang => std::future::pending().await,
        }
    }

    async fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Vision backend
// ---------------------------------------------------------------------------

pub fn gemini_body(text: &str) -> String {
    serde_json::json!({
        "candidates": [{
            "content": { "parts": [{ "text": text }], "role": "model" },
            "finishReason": "STOP"
        }]
    })
    .to_string()
}

#[derive(Debug, Clone)]
pub enum BackendStep {
    Reply { status: u16, body: String },
    Transport(String),
    Hang,
}

/// Backend returning queued replies, then numbered successes
#[derive(Default)]
pub struct ScriptedBackend {
    steps: Mutex<VecDeque<BackendStep>>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    uploads: Mutex<Vec<Vec<u8>>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, step: BackendStep) {
        self.steps.lock().unwrap().push_back(step);
    }

    pub fn reply(&self, status: u16, body: impl Into<String>) {
        self.push(BackendStep::Reply {
            status,
            body: body.into(),
        });
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Image bytes of every request, in call order
    pub fn uploads(&self) -> Vec<Vec<u8>> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl VisionBackend for ScriptedBackend {
    async fn generate(&self, request: &VisionRequest) -> Result<VisionReply, BackendError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.prompts.lock().unwrap().push(request.prompt.clone());
        self.uploads.lock().unwrap().push(request.image.clone());

        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(BackendStep::Reply { status, body }) => Ok(VisionReply { status, body }),
            Some(BackendStep::Transport(msg)) => Err(BackendError::Transport(msg)),
            Some(BackendStep::Hang) => std::future::pending().await,
            None => Ok(VisionReply {
                status: 200,
                body: gemini_body(&format!("analysis #{}", n)),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Messaging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Message(String),
    Photo { caption: String, size: usize },
}

/// Messenger that records deliveries and can fail chosen calls
#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<Sent>>,
    message_calls: AtomicUsize,
    fail_messages: Mutex<HashSet<usize>>,
    fail_all: AtomicBool,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the n-th (1-based) `send_message` call
    pub fn fail_message_call(&self, n: usize) {
        self.fail_messages.lock().unwrap().insert(n);
    }

    pub fn fail_everything(&self) {
        self.fail_all.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Message(text) => Some(text),
                Sent::Photo { .. } => None,
            })
            .collect()
    }

    pub fn photos(&self) -> usize {
        self.sent()
            .iter()
            .filter(|s| matches!(s, Sent::Photo { .. }))
            .count()
    }
}

#[async_trait]
impl MessageTransport for RecordingMessenger {
    async fn send_message(&self, text: &str) -> Result<(), NotificationFailure> {
        let n = self.message_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_all.load(Ordering::SeqCst) || self.fail_messages.lock().unwrap().contains(&n) {
            return Err(NotificationFailure::Delivery("sink unavailable".to_string()));
        }
        self.sent.lock().unwrap().push(Sent::Message(text.to_string()));
        Ok(())
    }

    async fn send_photo(&self, image: &[u8], caption: &str) -> Result<(), NotificationFailure> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(NotificationFailure::Delivery("sink unavailable".to_string()));
        }
        self.sent.lock().unwrap().push(Sent::Photo {
            caption: caption.to_string(),
            size: image.len(),
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Video file
// ---------------------------------------------------------------------------

/// Video whose probe result and frame availability are fixed up front
pub struct ScriptedVideo {
    duration: Duration,
    frames_end: Duration,
    failing: HashSet<Duration>,
    requested: Mutex<Vec<Duration>>,
}

impl ScriptedVideo {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            frames_end: duration,
            failing: HashSet::new(),
            requested: Mutex::new(Vec::new()),
        }
    }

    /// Frames stop at `end` although the probe reports the full duration
    pub fn frames_end_at(mut self, end: Duration) -> Self {
        self.frames_end = end;
        self
    }

    pub fn fail_at(mut self, offset: Duration) -> Self {
        self.failing.insert(offset);
        self
    }

    pub fn requested(&self) -> Vec<Duration> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl VideoReader for ScriptedVideo {
    async fn probe(&self) -> Result<VideoInfo, VideoError> {
        Ok(VideoInfo {
            duration: self.duration,
        })
    }

    async fn frame_at(&self, offset: Duration) -> Result<Option<Vec<u8>>, VideoError> {
        self.requested.lock().unwrap().push(offset);
        if self.failing.contains(&offset) {
            return Err(VideoError::Extract {
                offset,
                reason: "decoder error".to_string(),
            });
        }
        if offset >= self.frames_end {
            return Ok(None);
        }
        Ok(Some(tiny_jpeg()))
    }
}
