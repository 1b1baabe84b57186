//! Bounded-concurrency fan-out of utterance fetches.
//!
//! Utterances are processed in consecutive groups of at most `concurrency`.
//! All fetches of a group run concurrently and are awaited together, then the
//! group's results are handed to an [`AudioSink`] in index order before the
//! next group starts. The first failing fetch cancels the rest of its group,
//! no further group is started, and the sink is aborted.

use std::future::Future;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::future::try_join_all;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::core::error::{SynthesisError, SynthesisResult};
use crate::core::text::Utterance;

/// Audio for one utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioResult {
    pub index: usize,
    pub audio: Bytes,
}

/// Receives group results in index order.
#[async_trait]
pub trait AudioSink: Send {
    /// Accept one group of results, already ordered by index.
    async fn write_group(&mut self, results: Vec<AudioResult>) -> SynthesisResult<()>;

    /// All groups were written successfully.
    async fn close(&mut self) -> SynthesisResult<()>;

    /// The run failed with `error`; no further writes follow.
    async fn abort(&mut self, error: &SynthesisError);
}

/// Collects every result and exposes the concatenation once closed.
#[derive(Debug, Default)]
pub struct BufferedSink {
    staged: Vec<Bytes>,
    closed: bool,
}

impl BufferedSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concatenated audio, `None` unless the run completed.
    pub fn into_audio(self) -> Option<Bytes> {
        if !self.closed {
            return None;
        }
        let total = self.staged.iter().map(Bytes::len).sum();
        let mut out = BytesMut::with_capacity(total);
        for chunk in &self.staged {
            out.extend_from_slice(chunk);
        }
        Some(out.freeze())
    }
}

#[async_trait]
impl AudioSink for BufferedSink {
    async fn write_group(&mut self, results: Vec<AudioResult>) -> SynthesisResult<()> {
        self.staged.extend(results.into_iter().map(|r| r.audio));
        Ok(())
    }

    async fn close(&mut self) -> SynthesisResult<()> {
        self.closed = true;
        Ok(())
    }

    async fn abort(&mut self, _error: &SynthesisError) {
        self.staged.clear();
        self.closed = false;
    }
}

/// Forwards each result to a channel as soon as its group completes.
///
/// Dropping the sender ends the stream normally. An aborted run sends one
/// terminal `Err` first: the original error when no audio was delivered yet,
/// [`SynthesisError::StreamAborted`] otherwise.
pub struct StreamingSink {
    tx: Option<mpsc::Sender<SynthesisResult<Bytes>>>,
    started: bool,
}

impl StreamingSink {
    pub fn new(tx: mpsc::Sender<SynthesisResult<Bytes>>) -> Self {
        Self {
            tx: Some(tx),
            started: false,
        }
    }

    /// Whether any audio chunk has been sent.
    pub fn started(&self) -> bool {
        self.started
    }
}

#[async_trait]
impl AudioSink for StreamingSink {
    async fn write_group(&mut self, results: Vec<AudioResult>) -> SynthesisResult<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| SynthesisError::StreamAborted("stream already finished".to_string()))?;

        for result in results {
            tx.send(Ok(result.audio))
                .await
                .map_err(|_| SynthesisError::StreamAborted("client disconnected".to_string()))?;
            self.started = true;
        }
        Ok(())
    }

    async fn close(&mut self) -> SynthesisResult<()> {
        self.tx.take();
        Ok(())
    }

    async fn abort(&mut self, error: &SynthesisError) {
        if let Some(tx) = self.tx.take() {
            let terminal = if self.started {
                SynthesisError::StreamAborted(error.to_string())
            } else {
                error.clone()
            };
            let _ = tx.send(Err(terminal)).await;
        }
    }
}

/// Runs utterance fetches in groups of at most `concurrency`.
#[derive(Debug, Clone, Copy)]
pub struct BatchExecutor {
    concurrency: usize,
}

impl BatchExecutor {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Fetch audio for every utterance and deliver it to `sink` in index order.
    pub async fn run<F, Fut, S>(
        &self,
        utterances: Vec<Utterance>,
        fetch: F,
        sink: &mut S,
    ) -> SynthesisResult<()>
    where
        F: Fn(Utterance) -> Fut,
        Fut: Future<Output = SynthesisResult<Bytes>>,
        S: AudioSink + ?Sized,
    {
        let total = utterances.len();
        let mut pending = utterances.into_iter().peekable();
        let mut group = 0usize;

        while pending.peek().is_some() {
            let batch: Vec<Utterance> = pending.by_ref().take(self.concurrency).collect();
            let batch_len = batch.len();

            debug!(group, utterances = batch_len, total, "Fetching utterance group");

            let fetches = batch.into_iter().map(|utterance| {
                let index = utterance.index;
                let fut = fetch(utterance);
                async move { fut.await.map(|audio| AudioResult { index, audio }) }
            });

            let outcome = match try_join_all(fetches).await {
                Ok(results) => sink.write_group(results).await,
                Err(e) => Err(e),
            };

            if let Err(e) = outcome {
                warn!(group, error = %e, "Aborting synthesis batch");
                sink.abort(&e).await;
                return Err(e);
            }

            group += 1;
        }

        sink.close().await
    }
}
