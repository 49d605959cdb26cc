//! Eager end-to-end entry points: capture session in, ledger record out.
//!
//! [`capture_to_ledger`] is the single call behind the "scan a receipt"
//! flow: quality gate (optional) → extraction → reconciliation →
//! persistence. [`analyze_capture`] stops after extraction, for hosts that
//! show the parsed fields to the user for correction before submitting.
//!
//! Both suspend until the model responds or the attempt fails — there is no
//! streaming or partial delivery, and cancellation is caller-driven only.
//! Duplicate-submission protection belongs to the caller's session layer;
//! an abandoned in-flight submission may still complete.

use crate::config::PipelineConfig;
use crate::error::LedgerError;
use crate::ledger::{Ledger, SubmissionOutcome};
use crate::model::{ActorContext, ExtractionResult};
use crate::pipeline::{extract, quality};
use crate::session::CaptureSession;
use crate::store::{DocumentStore, ObjectStore};
use crate::validate::{reconcile, ExpenseDraft, FieldOverrides};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::sync::Arc;
use tracing::info;

/// Analyse a capture session without persisting anything.
///
/// Runs the optional quality gate on the first (representative) image, then
/// one extraction call over every page. This is the "show me what the
/// receipt says" half of the flow; the caller collects the user's
/// corrections and proceeds with [`capture_to_ledger`] or a plain
/// [`Ledger::submit`].
pub async fn analyze_capture(
    session: &CaptureSession,
    config: &PipelineConfig,
) -> Result<ExtractionResult, LedgerError> {
    if session.is_empty() {
        return Err(LedgerError::EmptySession);
    }
    let provider = resolve_provider(config)?;

    if config.quality_gate {
        let verdict = quality::assess(&provider, &session.images()[0].image, config).await;
        if !verdict.usable {
            return Err(quality::reject(verdict));
        }
    }

    extract::extract_receipt(&provider, session.images(), config).await
}

/// Run the full pipeline: gate, extract, reconcile with `overrides`, and
/// persist record + images.
///
/// # Errors
/// Everything before the record write is recoverable per stage
/// ([`LedgerError::UnusableImage`], [`LedgerError::ExtractionUnavailable`],
/// [`LedgerError::ExtractionParse`], [`LedgerError::AmountMismatch`], …).
/// Failed image uploads do **not** error — they degrade the returned
/// [`SubmissionOutcome`]. Only [`LedgerError::Persistence`] means nothing
/// was saved.
pub async fn capture_to_ledger<O: ObjectStore, D: DocumentStore>(
    session: CaptureSession,
    overrides: FieldOverrides,
    ctx: &ActorContext,
    ledger: &Ledger<O, D>,
    config: &PipelineConfig,
) -> Result<SubmissionOutcome, LedgerError> {
    info!(
        "Submitting {}-page capture for household {}",
        session.len(),
        ctx.household_id
    );

    let extraction = analyze_capture(&session, config).await?;
    let validated = reconcile(ExpenseDraft::from_extraction(extraction), overrides)?;
    ledger.submit(ctx, validated, session.into_images()).await
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// The four-level fallback chain lets library users and CLI users each set
/// exactly as much or as little as they need:
///
/// 1. **Pre-built provider** (`config.provider`) — the caller constructed
///    and configured the provider entirely; used as-is.
///
/// 2. **Named provider + model** (`config.provider_name`) — the factory
///    reads the corresponding API key (`OPENAI_API_KEY`, etc.) from the
///    environment.
///
/// 3. **Environment pair** (`RECEIPT2LEDGER_LLM_PROVIDER` +
///    `RECEIPT2LEDGER_MODEL`) — a provider and model chosen at the execution
///    environment level (shell profile, CI). Checked before auto-detection
///    so the choice is honoured even when multiple API keys are present.
///
/// 4. **Full auto-detection** (`ProviderFactory::from_env`) — scans known
///    API key variables and picks the first available provider, preferring
///    OpenAI when its key is set.
pub fn resolve_provider(config: &PipelineConfig) -> Result<Arc<dyn LLMProvider>, LedgerError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or("gpt-4.1-nano");
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("RECEIPT2LEDGER_LLM_PROVIDER"),
        std::env::var("RECEIPT2LEDGER_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or("gpt-4.1-nano");
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| LedgerError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from the environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {e}"
            ),
        })?;

    Ok(llm_provider)
}

/// Instantiate a named provider with the given model.
fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, LedgerError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        LedgerError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}
