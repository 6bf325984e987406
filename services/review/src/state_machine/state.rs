//! Session states.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::ErrorKind;

use super::draft::ReviewDraft;
use crate::analysis::{Analysis, ImagePayload};

/// Identifies one analysis request so late results can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnalysisId(pub u64);

impl fmt::Display for AnalysisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "analysis-{}", self.0)
    }
}

/// Identifies one accepted publish and its reset timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublishId(pub u64);

impl fmt::Display for PublishId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "publish-{}", self.0)
    }
}

/// Snapshot of the draft taken when it is published.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedReview {
    pub business_name: String,
    pub review_text: String,
    /// 0 when the user never picked a rating
    pub rating: u8,
    pub vendor: Option<String>,
    /// Username of the author; `None` for an anonymous review
    pub author: Option<String>,
    pub published_at: DateTime<Utc>,
}

/// The five states of a review-authoring session.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ReviewState {
    /// Nothing selected yet (initial and rest state).
    #[default]
    Idle,

    /// A photo was selected and its analysis is in flight.
    Analyzing {
        analysis_id: AnalysisId,
        image: Arc<ImagePayload>,
    },

    /// The analysis arrived; the draft is editable.
    ResultReady {
        image: Arc<ImagePayload>,
        draft: ReviewDraft,
    },

    /// The review was published; a timer brings the session back to Idle.
    Published {
        publish_id: PublishId,
        image: Arc<ImagePayload>,
        review: PublishedReview,
    },

    /// The analysis failed; only a new selection leaves this state.
    Error {
        image: Arc<ImagePayload>,
        message: String,
        kind: ErrorKind,
    },
}

impl ReviewState {
    pub fn name(&self) -> &'static str {
        match self {
            ReviewState::Idle => "idle",
            ReviewState::Analyzing { .. } => "analyzing",
            ReviewState::ResultReady { .. } => "result-ready",
            ReviewState::Published { .. } => "published",
            ReviewState::Error { .. } => "error",
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, ReviewState::Idle)
    }

    pub fn image(&self) -> Option<&ImagePayload> {
        match self {
            ReviewState::Idle => None,
            ReviewState::Analyzing { image, .. }
            | ReviewState::ResultReady { image, .. }
            | ReviewState::Published { image, .. }
            | ReviewState::Error { image, .. } => Some(image.as_ref()),
        }
    }

    pub fn draft(&self) -> Option<&ReviewDraft> {
        match self {
            ReviewState::ResultReady { draft, .. } => Some(draft),
            _ => None,
        }
    }

    pub fn analysis(&self) -> Option<&Analysis> {
        self.draft().map(ReviewDraft::analysis)
    }

    /// Current review text; empty outside `ResultReady`
    pub fn review_text(&self) -> &str {
        self.draft().map(ReviewDraft::review_text).unwrap_or("")
    }

    /// Current rating; 0 outside `ResultReady` or when unset
    pub fn user_rating(&self) -> u8 {
        self.draft().map(ReviewDraft::user_rating).unwrap_or(0)
    }

    pub fn selected_vendor(&self) -> Option<&str> {
        self.draft().and_then(ReviewDraft::selected_vendor)
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            ReviewState::Error { message, .. } => Some(message),
            _ => None,
        }
    }

    pub fn published_review(&self) -> Option<&PublishedReview> {
        match self {
            ReviewState::Published { review, .. } => Some(review),
            _ => None,
        }
    }
}
