//! rtsp-sentinel Library
//!
//! Unattended surveillance of one IP camera: grab a frame on a fixed
//! cadence, have a remote vision model describe it, keep the result on
//! disk and relay it to a Telegram chat.
//!
//! ## Components
//!
//! 1. FrameSource - RTSP connection with candidate URL fallback
//! 2. AnalysisClient - Vision backend adapter
//! 3. NotificationSink - Telegram delivery, batches and summaries
//! 4. ResultStore - JSON records and raw frames on disk
//! 5. SurveillanceLoop - Live capture cadence and reconnects
//! 6. VideoScan - Offline variant over a recorded file

pub mod analysis_client;
pub mod cli;
pub mod config;
pub mod error;
pub mod frame_source;
pub mod models;
pub mod notification_sink;
pub mod result_store;
pub mod surveillance_loop;
pub mod video_file;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
