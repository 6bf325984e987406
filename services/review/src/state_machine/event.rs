//! Events that trigger state transitions.
//!
//! User actions come from the shell; analysis results and timer expiries come
//! from tasks the controller spawned.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::ClientError;

use super::state::{AnalysisId, PublishId};
use crate::analysis::{Analysis, ImagePayload};

/// All events that can trigger state transitions.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    // =========================================================================
    // User actions
    // =========================================================================
    /// A photo was picked. Selecting implies analyzing.
    ImageSelected {
        analysis_id: AnalysisId,
        image: Arc<ImagePayload>,
    },

    /// The review text was replaced wholesale.
    ReviewEdited { text: String },

    /// A suggestion chip was clicked.
    SuggestionToggled { tag: String },

    /// A star was clicked. Values outside 1..=5 are rejected.
    RatingSet { rating: i32 },

    /// A vendor chip was clicked, possibly the "Other" sentinel.
    VendorSelected { name: String },

    /// Free text entered after choosing "Other".
    CustomVendorSubmitted { text: String },

    /// Publish clicked. `author` is the signed-in username, `None` if anonymous.
    PublishRequested {
        publish_id: PublishId,
        author: Option<String>,
        published_at: DateTime<Utc>,
    },

    /// Answer to the "publish anonymously?" question.
    AnonymousPublishAnswered {
        publish_id: PublishId,
        confirmed: bool,
        published_at: DateTime<Utc>,
    },

    /// Abandon the current draft or error.
    StartOver,

    // =========================================================================
    // Background results
    // =========================================================================
    AnalysisSucceeded {
        analysis_id: AnalysisId,
        analysis: Analysis,
    },

    AnalysisFailed {
        analysis_id: AnalysisId,
        error: ClientError,
    },

    /// The post-publish confirmation delay is over.
    PublishTimerElapsed { publish_id: PublishId },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::ImageSelected { .. } => "select image",
            Event::ReviewEdited { .. } => "edit review",
            Event::SuggestionToggled { .. } => "toggle suggestion",
            Event::RatingSet { .. } => "set rating",
            Event::VendorSelected { .. } => "select vendor",
            Event::CustomVendorSubmitted { .. } => "submit custom vendor",
            Event::PublishRequested { .. } => "publish",
            Event::AnonymousPublishAnswered { .. } => "answer anonymous publish",
            Event::StartOver => "start over",
            Event::AnalysisSucceeded { .. } => "analysis succeeded",
            Event::AnalysisFailed { .. } => "analysis failed",
            Event::PublishTimerElapsed { .. } => "publish timer elapsed",
        }
    }
}
