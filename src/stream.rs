//! Async driving of the document pipeline.
//!
//! The pipeline itself is synchronous: each pass pulls chunks from its
//! [`Generator`]. [`ChannelGenerator`] bridges that to async producers. Every
//! request is sent over a tokio channel as a [`PendingRequest`] together with
//! a bounded chunk channel, and the pass blocks on that channel while the
//! producer awaits its source. The pipeline runs on a blocking thread
//! (`spawn_blocking`); events are forwarded to an unbounded tokio channel.
//!
//! ```text
//! producer task  <-- PendingRequest --  ChannelGenerator (blocking thread)
//!                --- chunks --------->  pass -> EventForwarder --> events rx
//! ```

use tokio::sync::mpsc;
use tracing::{debug, warn};

use docsplice_python::{
    document, ChunkStream, DocumentOutput, EngineConfig, EventSink, GenerationError, GenerationRequest, Generator,
    NoRepair, PassEvent, StreamChunk,
};

use crate::error::CliError;
use crate::replay::ReplayGenerator;

/// Chunk channel capacity per request.
pub const CHUNK_CHANNEL_CAPACITY: usize = 64;

pub type ChunkSender = mpsc::Sender<Result<StreamChunk, GenerationError>>;

/// A request waiting for its producer.
#[derive(Debug)]
pub struct PendingRequest {
    pub request: GenerationRequest,
    pub chunks: ChunkSender,
}

/// A [`Generator`] whose output is produced by an async task.
///
/// `generate` must be called off the async runtime's worker threads.
#[derive(Debug, Clone)]
pub struct ChannelGenerator {
    requests: mpsc::UnboundedSender<PendingRequest>,
    capacity: usize,
}

impl ChannelGenerator {
    pub fn new(requests: mpsc::UnboundedSender<PendingRequest>) -> Self {
        ChannelGenerator {
            requests,
            capacity: CHUNK_CHANNEL_CAPACITY,
        }
    }
}

impl Generator for ChannelGenerator {
    fn generate(&mut self, request: &GenerationRequest) -> Result<ChunkStream<'_>, GenerationError> {
        let (tx, mut rx) = mpsc::channel(self.capacity);
        self.requests
            .send(PendingRequest {
                request: request.clone(),
                chunks: tx,
            })
            .map_err(|_| GenerationError::new("generation producer has shut down"))?;
        Ok(Box::new(std::iter::from_fn(move || rx.blocking_recv())))
    }
}

/// Forwards pass events into a tokio channel.
#[derive(Debug, Clone)]
pub struct EventForwarder(pub mpsc::UnboundedSender<PassEvent>);

impl EventSink for EventForwarder {
    fn emit(&mut self, event: PassEvent) {
        if self.0.send(event).is_err() {
            debug!("event receiver dropped");
        }
    }
}

/// Answer requests from a replay, one chunk at a time, until the request
/// channel closes.
pub async fn serve_replay(mut replay: ReplayGenerator, mut requests: mpsc::UnboundedReceiver<PendingRequest>) {
    while let Some(PendingRequest { request, chunks }) = requests.recv().await {
        let produced = match replay.next_chunks(&request) {
            Ok(produced) => produced.into_iter().map(Ok).collect(),
            Err(e) => vec![Err(e)],
        };
        for chunk in produced {
            if chunks.send(chunk).await.is_err() {
                warn!(task = %request.task, "pass stopped reading its stream");
                break;
            }
            tokio::task::yield_now().await;
        }
    }
}

/// Run the pipeline over `source`, answered by `replay` through the async
/// bridge. Events are forwarded to `events`.
pub async fn document_streaming(
    source: String,
    config: EngineConfig,
    replay: ReplayGenerator,
    events: mpsc::UnboundedSender<PassEvent>,
) -> Result<DocumentOutput, CliError> {
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let producer = tokio::spawn(serve_replay(replay, request_rx));

    let pipeline = tokio::task::spawn_blocking(move || {
        let mut generator = ChannelGenerator::new(request_tx);
        let mut sink = EventForwarder(events);
        document(&source, &config, &mut generator, &mut NoRepair, &mut sink)
    });

    let result = pipeline
        .await
        .map_err(|e| CliError::internal(format!("pipeline task failed: {e}")))?;
    producer
        .await
        .map_err(|e| CliError::internal(format!("producer task failed: {e}")))?;
    result.map_err(CliError::from)
}
