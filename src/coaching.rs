//! Coaching message seam
//!
//! Adaptation decisions can be narrated to the user by an external
//! natural-language coaching service. The service is opaque and may be
//! unavailable; delivery is strictly best-effort and must never block or
//! fail the decision pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::adaptation::AdaptationResult;

/// Coaching delivery errors
#[derive(Error, Debug)]
pub enum CoachingError {
    #[error("coaching service unavailable: {0}")]
    Unavailable(String),
    #[error("coaching service rejected prompt: {0}")]
    Rejected(String),
    #[error("coaching delivery timed out after {0}ms")]
    Timeout(u64),
}

/// Short structured prompt describing one adaptation decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoachingPrompt {
    pub user_id: String,

    /// Action kind label, e.g. "swap_exercise"
    pub action: String,

    /// Exercise the action concerns
    pub exercise: Option<String>,

    /// Replacement exercise for substitutions
    pub replacement: Option<String>,

    /// Rule rationale in plain words
    pub reason: Option<String>,

    /// Whether the action already took effect or awaits confirmation
    pub applied: bool,
}

impl CoachingPrompt {
    /// Build a prompt for a decision; `NoAction` produces no prompt
    pub fn from_result(user_id: &str, result: &AdaptationResult) -> Option<Self> {
        let (exercise, replacement, reason) = match result {
            AdaptationResult::IncreaseRest {
                exercise, reason, ..
            }
            | AdaptationResult::BlacklistExercise {
                exercise, reason, ..
            }
            | AdaptationResult::VolumeAdjustment {
                exercise, reason, ..
            } => (Some(exercise.clone()), None, Some(reason.clone())),
            AdaptationResult::SwapExercise {
                exercise,
                replacement_exercise,
                reason,
                ..
            } => (
                Some(exercise.clone()),
                Some(replacement_exercise.clone()),
                Some(reason.clone()),
            ),
            AdaptationResult::NoAction => return None,
        };

        Some(CoachingPrompt {
            user_id: user_id.to_string(),
            action: result.kind_label().to_string(),
            exercise,
            replacement,
            reason,
            applied: result.applied(),
        })
    }
}

/// Rendered coaching output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoachingMessage {
    pub text: String,

    /// Voice rendition URL when the service produced one
    pub voice_url: Option<String>,
}

/// Opaque remote coaching service
pub trait CoachingService {
    fn deliver(&self, prompt: &CoachingPrompt) -> Result<CoachingMessage, CoachingError>;
}

/// No-op implementation for deployments without coaching
pub struct SilentCoach;

impl CoachingService for SilentCoach {
    fn deliver(&self, _prompt: &CoachingPrompt) -> Result<CoachingMessage, CoachingError> {
        Ok(CoachingMessage {
            text: String::new(),
            voice_url: None,
        })
    }
}

/// Deliver a prompt for a decision, degrading to a warning log on any
/// failure
pub fn notify_best_effort(
    service: &impl CoachingService,
    user_id: &str,
    result: &AdaptationResult,
) {
    let Some(prompt) = CoachingPrompt::from_result(user_id, result) else {
        return;
    };

    match service.deliver(&prompt) {
        Ok(message) => {
            if !message.text.is_empty() {
                tracing::debug!(user_id, action = %prompt.action, "coaching message delivered");
            }
        }
        Err(e) => {
            tracing::warn!(
                user_id,
                action = %prompt.action,
                error = %e,
                "coaching delivery failed, continuing without message"
            );
        }
    }
}
