//! Quality gate: a cheap "is this a readable receipt?" pre-check.
//!
//! One representative image is shown to the model before the (more
//! expensive) extraction call. The gate **fails closed**: a transport error,
//! a missing verdict, or unparsable JSON all count as "not usable" — a
//! spurious retake prompt costs the user seconds, while a bad extraction
//! that slips through costs them a wrong ledger entry.
//!
//! The whole stage is optional ([`crate::config::PipelineConfig::quality_gate`]).
//! When skipped, low-quality photos simply degrade extraction accuracy and
//! surface later as parse failures.

use crate::config::PipelineConfig;
use crate::error::LedgerError;
use crate::model::EncodedImage;
use crate::pipeline::extract::locate_json;
use crate::prompts::QUALITY_CHECK_PROMPT;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use serde::Deserialize;
use std::sync::Arc;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

/// The gate's judgement on one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityVerdict {
    /// Whether extraction is worth attempting on this capture.
    pub usable: bool,
    /// Human-readable reason, suitable for a retake prompt.
    pub reason: String,
}

impl QualityVerdict {
    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            usable: false,
            reason: reason.into(),
        }
    }
}

/// Raw wire shape of the model's verdict JSON.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVerdict {
    #[serde(default)]
    is_receipt: bool,
    #[serde(default)]
    is_readable: bool,
    #[serde(default)]
    reason: Option<String>,
}

/// Ask the model whether `image` is a legible receipt.
///
/// Never returns an error: every failure mode collapses to a "not usable"
/// verdict with the failure as the reason. A single attempt is made — the
/// gate is a cheap pre-check, and retrying it would double the cost of every
/// submission for marginal benefit.
pub async fn assess(
    provider: &Arc<dyn LLMProvider>,
    image: &EncodedImage,
    config: &PipelineConfig,
) -> QualityVerdict {
    let messages = vec![
        ChatMessage::system(QUALITY_CHECK_PROMPT),
        ChatMessage::user_with_images(
            "",
            vec![ImageData::new(image.to_base64(), image.mime_type.as_str())],
        ),
    ];

    let options = CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(256),
        ..Default::default()
    };

    let call = provider.chat(&messages, Some(&options));
    match timeout(Duration::from_secs(config.api_timeout_secs), call).await {
        Ok(Ok(response)) => {
            debug!("Quality verdict raw output: {} bytes", response.content.len());
            parse_verdict(&response.content).unwrap_or_else(|| {
                warn!("Quality gate returned no parsable verdict; failing closed");
                QualityVerdict::rejected("quality check returned an unreadable verdict")
            })
        }
        Ok(Err(e)) => {
            warn!("Quality gate call failed ({e}); failing closed");
            QualityVerdict::rejected(format!("quality check unavailable: {e}"))
        }
        Err(_) => {
            warn!(
                "Quality gate timed out after {}s; failing closed",
                config.api_timeout_secs
            );
            QualityVerdict::rejected("quality check timed out")
        }
    }
}

/// Parse the verdict JSON out of free-form model output.
///
/// `None` when no verdict can be located — the caller fails closed.
pub fn parse_verdict(text: &str) -> Option<QualityVerdict> {
    let json = locate_json(text)?;
    let raw: RawVerdict = serde_json::from_str(json).ok()?;
    Some(QualityVerdict {
        usable: raw.is_receipt && raw.is_readable,
        reason: raw.reason.unwrap_or_default(),
    })
}

/// Map an unusable verdict to the error callers surface to the user.
pub fn reject(verdict: QualityVerdict) -> LedgerError {
    LedgerError::UnusableImage {
        reason: verdict.reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usable_requires_both_flags() {
        let v = parse_verdict(r#"{"isReceipt": true, "isReadable": true, "reason": "sharp"}"#)
            .unwrap();
        assert!(v.usable);

        let v = parse_verdict(r#"{"isReceipt": true, "isReadable": false, "reason": "blurry"}"#)
            .unwrap();
        assert!(!v.usable);
        assert_eq!(v.reason, "blurry");

        let v = parse_verdict(r#"{"isReceipt": false, "isReadable": true}"#).unwrap();
        assert!(!v.usable);
    }

    #[test]
    fn fenced_verdict_is_parsed() {
        let text = "Sure!\n```json\n{\"isReceipt\": true, \"isReadable\": true}\n```";
        assert!(parse_verdict(text).unwrap().usable);
    }

    #[test]
    fn missing_fields_default_to_not_usable() {
        let v = parse_verdict(r#"{"reason": "can't tell"}"#).unwrap();
        assert!(!v.usable);
    }

    #[test]
    fn prose_without_json_is_none() {
        assert!(parse_verdict("looks fine to me").is_none());
    }
}
