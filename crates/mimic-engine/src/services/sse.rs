//! Server-sent event stream registry and heartbeats.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info};

pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

/// Comment frame sent to keep an idle stream open.
const HEARTBEAT_FRAME: &[u8] = b":heartbeat\n\n";

/// Whether a content type denotes an event stream (parameters ignored).
pub fn is_event_stream(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| {
        ct.trim_start()
            .get(..EVENT_STREAM_CONTENT_TYPE.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(EVENT_STREAM_CONTENT_TYPE))
    })
}

#[derive(Debug, Default)]
struct StreamEntry {
    heartbeat: Option<JoinHandle<()>>,
}

/// Tracks open event streams and their heartbeat tasks.
#[derive(Debug, Default)]
pub struct SseService {
    streams: Mutex<HashMap<String, StreamEntry>>,
}

impl SseService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start sending heartbeat frames to `sink` every `interval`.
    ///
    /// Replaces any heartbeat already running for `stream_id`. The task ends on
    /// its own once the receiving side of `sink` is dropped.
    pub fn open_heartbeat(&self, stream_id: &str, interval: Duration, sink: mpsc::Sender<Bytes>) {
        let id = stream_id.to_string();
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            loop {
                ticker.tick().await;
                if sink.send(Bytes::from_static(HEARTBEAT_FRAME)).await.is_err() {
                    debug!("Event stream {} closed, stopping heartbeat", id);
                    break;
                }
            }
        });

        let mut streams = self.streams.lock();
        let entry = streams.entry(stream_id.to_string()).or_default();
        if let Some(previous) = entry.heartbeat.replace(task) {
            previous.abort();
        }
    }

    /// Abort every heartbeat task. Streams stay registered.
    pub fn interrupt_all_heartbeats(&self) {
        let mut streams = self.streams.lock();
        let mut interrupted = 0;
        for entry in streams.values_mut() {
            if let Some(task) = entry.heartbeat.take() {
                task.abort();
                interrupted += 1;
            }
        }
        if interrupted > 0 {
            info!("Interrupted {} SSE heartbeat tasks", interrupted);
        }
    }

    /// Interrupt every heartbeat and forget all streams.
    pub fn clear_state(&self) {
        self.interrupt_all_heartbeats();
        self.streams.lock().clear();
    }

    pub fn active_streams(&self) -> usize {
        self.streams.lock().len()
    }

    /// Heartbeat tasks that have not been interrupted or finished.
    pub fn active_heartbeats(&self) -> usize {
        self.streams
            .lock()
            .values()
            .filter(|entry| entry.heartbeat.as_ref().is_some_and(|t| !t.is_finished()))
            .count()
    }
}
