//! Streaming API: run a processor in a background task and yield its events.
//!
//! Large documents take minutes (four service calls per page). Streaming
//! lets callers show each section as it lands, drive a progress bar, or
//! write pages out incrementally, while keeping a [`ProcessorHandle`] to
//! pause, resume or cancel the run.

use crate::config::TranscriptionConfig;
use crate::error::ScribeError;
use crate::output::TranscriptOutput;
use crate::pipeline::input::ResolvedInput;
use crate::processor::{BatchProcessor, ProcessorHandle};
use crate::progress::{EventChannel, TranscriptionEvent};
use crate::transcribe::{prepare, PreparedRun};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::info;

/// A running transcription.
pub struct TranscriptionStream {
    /// Pause, resume or cancel the run.
    pub handle: ProcessorHandle,
    /// Every observer callback, in order. Ends when the run task finishes.
    pub events: UnboundedReceiverStream<TranscriptionEvent>,
    /// Resolves to the final output once the run stops.
    pub task: JoinHandle<Result<TranscriptOutput, ScribeError>>,
}

impl TranscriptionStream {
    /// Wait for the run to finish.
    pub async fn join(self) -> Result<TranscriptOutput, ScribeError> {
        self.task
            .await
            .map_err(|e| ScribeError::Internal(format!("Transcription task panicked: {}", e)))?
    }
}

/// Load and run `processor` on a spawned task.
///
/// The processor's observer is replaced by an [`EventChannel`]. `load()` is
/// called first when it has not been already; its error ends the task.
pub fn spawn(mut processor: BatchProcessor) -> TranscriptionStream {
    let (channel, events) = EventChannel::new();
    processor.set_observer(Arc::new(channel));
    let handle = processor.handle();

    let task = tokio::spawn(async move {
        if processor.estimate().is_none() {
            processor.load().await?;
        }
        processor.process_all().await
    });

    TranscriptionStream {
        handle,
        events,
        task,
    }
}

/// Transcribe a PDF or image, streaming events as sections complete.
///
/// Fatal errors that happen before the run starts (missing file, no
/// recognizer) are returned directly; load errors surface from
/// [`TranscriptionStream::join`].
pub async fn transcribe_stream(
    input_str: impl AsRef<str>,
    config: &TranscriptionConfig,
) -> Result<TranscriptionStream, ScribeError> {
    let input_str = input_str.as_ref();
    info!("Starting streaming transcription: {}", input_str);

    let PreparedRun { processor, input } = prepare(input_str, config).await?;
    let mut stream = spawn(processor);

    // Keep a downloaded document alive until the run task is done.
    let task = stream.task;
    stream.task = tokio::spawn(async move {
        let result = task.await;
        drop::<ResolvedInput>(input);
        result.map_err(|e| ScribeError::Internal(format!("Transcription task panicked: {}", e)))?
    });
    Ok(stream)
}
