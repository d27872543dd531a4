//! One-shot entry points: resolve input, wire the pipeline, run to the end.
//!
//! [`transcribe`] is the simple API: it waits for every page and returns
//! the full [`TranscriptOutput`]. Callers that need pause/cancel or live
//! progress build a [`BatchProcessor`] with [`prepare`] and drive it
//! themselves, or use [`crate::stream::transcribe_stream`].

use crate::config::TranscriptionConfig;
use crate::error::{RecognitionError, ScribeError};
use crate::output::{DocumentEstimate, TranscriptOutput, TranscriptStats};
use crate::pipeline::encode::SectionImage;
use crate::pipeline::input::{self, InputKind, ResolvedInput};
use crate::pipeline::recognize::{HttpRecognizer, LlmRecognizer, Recognizer};
use crate::pipeline::render::{DocumentReader, ImageSequenceReader, PdfiumReader};
use crate::processor::BatchProcessor;
use async_trait::async_trait;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Model used when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// A processor ready to `load()`, plus the input it reads from.
///
/// The input must outlive the processor: a downloaded document lives in a
/// temp directory that is removed when `input` is dropped.
pub struct PreparedRun {
    pub processor: BatchProcessor,
    pub input: ResolvedInput,
}

/// Resolve `input`, pick a reader and a recognizer, and build a processor.
pub async fn prepare(
    input_str: impl AsRef<str>,
    config: &TranscriptionConfig,
) -> Result<PreparedRun, ScribeError> {
    let input_str = input_str.as_ref();
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let reader = open_reader(&resolved, config.password.clone());
    let recognizer = resolve_recognizer(config)?;
    Ok(PreparedRun {
        processor: BatchProcessor::new(reader, recognizer, config.clone()),
        input: resolved,
    })
}

/// Transcribe a PDF or image, by path or URL.
///
/// # Returns
/// `Ok(TranscriptOutput)` even if some sections failed (check
/// `output.failed_sections`).
///
/// # Errors
/// Only fatal errors: unreadable input, zero pages, no recognizer.
pub async fn transcribe(
    input_str: impl AsRef<str>,
    config: &TranscriptionConfig,
) -> Result<TranscriptOutput, ScribeError> {
    let input_str = input_str.as_ref();
    info!("Starting transcription: {}", input_str);

    let PreparedRun {
        mut processor,
        input: _input,
    } = prepare(input_str, config).await?;
    processor.load().await?;
    processor.process_all().await
}

/// Transcribe and write the Markdown rendering to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn transcribe_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &TranscriptionConfig,
) -> Result<TranscriptStats, ScribeError> {
    let input_str = input_str.as_ref();
    let output = transcribe(input_str, config).await?;
    let markdown = output.to_markdown(&source_name(input_str));
    write_atomic(output_path.as_ref(), markdown.as_bytes()).await?;
    Ok(output.stats)
}

/// Page count and time/cost estimate, without calling any service.
pub async fn inspect(
    input_str: impl AsRef<str>,
    config: &TranscriptionConfig,
) -> Result<DocumentEstimate, ScribeError> {
    let resolved = input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?;
    let reader = open_reader(&resolved, config.password.clone());
    let mut processor = BatchProcessor::new(reader, Arc::new(Unconfigured), config.clone());
    processor.load().await
}

/// Write `bytes` to `path` via a sibling temp file and a rename.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ScribeError> {
    let write_err = |e: std::io::Error| ScribeError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = std::path::PathBuf::from(tmp_name);

    tokio::fs::write(&tmp_path, bytes).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}

/// File name of a path or URL, for document headers.
pub fn source_name(input_str: &str) -> String {
    input_str
        .trim_end_matches('/')
        .rsplit(['/', '\\'])
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(input_str)
        .to_string()
}

/// Pick the reader for the detected input kind.
pub fn open_reader(resolved: &ResolvedInput, password: Option<String>) -> Arc<dyn DocumentReader> {
    match resolved.kind() {
        InputKind::Pdf => Arc::new(PdfiumReader::new(resolved.path(), password)),
        InputKind::Image => Arc::new(ImageSequenceReader::new(vec![resolved.path().to_path_buf()])),
    }
}

/// Build the recognizer the config asks for.
///
/// An explicit `endpoint` wins; otherwise sections go to a vision LLM.
pub fn resolve_recognizer(config: &TranscriptionConfig) -> Result<Arc<dyn Recognizer>, ScribeError> {
    if let Some(ref endpoint) = config.endpoint {
        info!("Recognizing via endpoint {}", endpoint);
        let client = HttpRecognizer::new(
            endpoint.clone(),
            config.api_key.clone(),
            config.request_timeout_secs,
        )?;
        return Ok(Arc::new(client));
    }

    let provider = resolve_provider(config)?;
    info!(
        "Recognizing via LLM provider {} / {}",
        config.provider_name.as_deref().unwrap_or("auto"),
        config.model.as_deref().unwrap_or("default model")
    );
    Ok(Arc::new(LlmRecognizer::new(
        provider,
        config.temperature,
        config.max_tokens,
        config.request_timeout_secs,
    )))
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, ScribeError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ScribeError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. a pre-built `config.provider`;
/// 2. `config.provider_name` plus `config.model`;
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` when both are set;
/// 4. `OPENAI_API_KEY`, then full auto-detection via `ProviderFactory::from_env`.
fn resolve_provider(config: &TranscriptionConfig) -> Result<Arc<dyn LLMProvider>, ScribeError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ScribeError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No recognizer could be configured.\n\
                Pass --endpoint, or set OPENAI_API_KEY / ANTHROPIC_API_KEY.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

/// Stand-in recognizer for estimate-only loads; never called.
struct Unconfigured;

#[async_trait]
impl Recognizer for Unconfigured {
    async fn recognize(&self, _image: &SectionImage, _prompt: &str) -> Result<String, RecognitionError> {
        Err(RecognitionError::Service {
            status: None,
            message: "no recognizer configured".into(),
        })
    }
}
