//! Effects (side effects as data).
//!
//! Effects describe what should happen as a result of a state transition.
//! The controller executes them, which keeps the transition logic testable
//! without an analyzer or a clock.

use std::sync::Arc;

use super::state::{AnalysisId, PublishId};
use crate::analysis::ImagePayload;

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Send the photo to the analysis service.
    RequestAnalysis {
        analysis_id: AnalysisId,
        image: Arc<ImagePayload>,
    },

    /// Abort an analysis superseded by a newer selection.
    CancelAnalysis { analysis_id: AnalysisId },

    /// Ask the user whether to publish without an account.
    PromptAnonymousPublish { publish_id: PublishId },

    /// Start the one-shot timer that returns the session to Idle.
    SchedulePublishReset { publish_id: PublishId },
}
