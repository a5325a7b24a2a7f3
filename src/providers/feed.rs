//! Externally fed payload source

use futures::{FutureExt, Stream, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::trace;

use crate::Result;
use crate::mapper::PayloadMapper;
use crate::provider::PayloadSource;
use crate::types::OutboundPayload;

/// Maps flat telemetry objects from an external producer into payloads.
///
/// Uses "latest-wins" semantics: when several objects are already queued,
/// only the newest is mapped.
pub struct FeedSource<S> {
    stream: S,
    mapper: PayloadMapper,
}

impl FeedSource<ReceiverStream<Value>> {
    /// Feed from an mpsc receiver
    pub fn from_receiver(receiver: mpsc::Receiver<Value>, mapper: PayloadMapper) -> Self {
        Self::new(ReceiverStream::new(receiver), mapper)
    }
}

impl<S> FeedSource<S>
where
    S: Stream<Item = Value> + Send + Unpin + 'static,
{
    /// Feed from any stream of flat telemetry objects
    pub fn new(stream: S, mapper: PayloadMapper) -> Self {
        Self { stream, mapper }
    }
}

#[async_trait::async_trait]
impl<S> PayloadSource for FeedSource<S>
where
    S: Stream<Item = Value> + Send + Unpin + 'static,
{
    async fn next_payload(&mut self) -> Result<Option<OutboundPayload>> {
        let Some(mut latest) = self.stream.next().await else {
            return Ok(None);
        };

        let mut dropped = 0usize;
        while let Some(Some(newer)) = self.stream.next().now_or_never() {
            latest = newer;
            dropped += 1;
        }
        if dropped > 0 {
            trace!(dropped, "Superseded feed items skipped");
        }

        Ok(Some(self.mapper.from_flat(&latest)))
    }
}
