//! Pure state transition function.
//!
//! Takes the current state and an event and returns the new state, the effects
//! to execute and whether the event was applied. Nothing here touches the
//! network or the clock.

use std::sync::Arc;

use thiserror::Error;

use super::draft::ReviewDraft;
use super::effect::Effect;
use super::event::Event;
use super::state::{AnalysisId, ReviewState};
use crate::analysis::ImagePayload;

/// Why an event was refused. The state is left untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("Rating must be between 1 and 5, got {0}")]
    RatingOutOfRange(i32),

    #[error("Vendor name cannot be empty")]
    EmptyVendor,

    #[error("Custom vendor entry is not open")]
    VendorInputClosed,

    #[error("No publish is waiting for confirmation")]
    NoPendingConfirmation,

    #[error("Cannot {event} while {state}")]
    NotAllowed {
        state: &'static str,
        event: &'static str,
    },
}

/// What happened to the event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// A background result for a superseded request, or a no-op.
    Ignored,
    Rejected(Rejection),
}

/// Result of a state transition.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionResult {
    /// The new state after the transition.
    pub state: ReviewState,
    /// Effects to execute.
    pub effects: Vec<Effect>,
    pub outcome: Outcome,
}

impl TransitionResult {
    pub fn new(state: ReviewState, effects: Vec<Effect>) -> Self {
        Self {
            state,
            effects,
            outcome: Outcome::Applied,
        }
    }

    pub fn applied(state: ReviewState) -> Self {
        Self::new(state, vec![])
    }

    pub fn ignored(state: ReviewState) -> Self {
        Self {
            state,
            effects: vec![],
            outcome: Outcome::Ignored,
        }
    }

    pub fn rejected(state: ReviewState, rejection: Rejection) -> Self {
        Self {
            state,
            effects: vec![],
            outcome: Outcome::Rejected(rejection),
        }
    }

    fn not_allowed(state: ReviewState, event: &Event) -> Self {
        let rejection = Rejection::NotAllowed {
            state: state.name(),
            event: event.name(),
        };
        Self::rejected(state, rejection)
    }
}

/// Pure state transition function.
pub fn transition(state: ReviewState, event: Event) -> TransitionResult {
    match event {
        // Selection is valid everywhere and supersedes whatever was going on
        Event::ImageSelected { analysis_id, image } => {
            let mut effects = Vec::with_capacity(2);
            if let ReviewState::Analyzing {
                analysis_id: previous,
                ..
            } = &state
            {
                effects.push(Effect::CancelAnalysis {
                    analysis_id: *previous,
                });
            }
            effects.push(Effect::RequestAnalysis {
                analysis_id,
                image: image.clone(),
            });
            TransitionResult::new(ReviewState::Analyzing { analysis_id, image }, effects)
        }

        event => match state {
            ReviewState::Idle => idle(event),
            ReviewState::Analyzing { analysis_id, image } => analyzing(analysis_id, image, event),
            ReviewState::ResultReady { image, draft } => result_ready(image, draft, event),
            state @ ReviewState::Published { .. } => published(state, event),
            state @ ReviewState::Error { .. } => error(state, event),
        },
    }
}

fn idle(event: Event) -> TransitionResult {
    match event {
        Event::StartOver => TransitionResult::ignored(ReviewState::Idle),
        event if is_background(&event) => TransitionResult::ignored(ReviewState::Idle),
        event => TransitionResult::not_allowed(ReviewState::Idle, &event),
    }
}

fn analyzing(analysis_id: AnalysisId, image: Arc<ImagePayload>, event: Event) -> TransitionResult {
    match event {
        Event::AnalysisSucceeded {
            analysis_id: id,
            analysis,
        } if id == analysis_id => TransitionResult::applied(ReviewState::ResultReady {
            image,
            draft: ReviewDraft::new(analysis),
        }),

        Event::AnalysisFailed {
            analysis_id: id,
            error,
        } if id == analysis_id => TransitionResult::applied(ReviewState::Error {
            image,
            message: error.user_message(),
            kind: error.kind(),
        }),

        event => {
            let state = ReviewState::Analyzing { analysis_id, image };
            if is_background(&event) {
                TransitionResult::ignored(state)
            } else {
                TransitionResult::not_allowed(state, &event)
            }
        }
    }
}

fn result_ready(image: Arc<ImagePayload>, mut draft: ReviewDraft, event: Event) -> TransitionResult {
    let edit = match &event {
        Event::ReviewEdited { text } => {
            draft.edit_review(text.clone());
            Ok(())
        }
        Event::SuggestionToggled { tag } => {
            draft.toggle_suggestion(tag);
            Ok(())
        }
        Event::RatingSet { rating } => draft.set_rating(*rating),
        Event::VendorSelected { name } => draft.select_vendor(name),
        Event::CustomVendorSubmitted { text } => draft.submit_custom_vendor(text),

        Event::PublishRequested {
            publish_id,
            author: Some(author),
            published_at,
        } => {
            let review = draft.snapshot(Some(author.clone()), *published_at);
            return TransitionResult::new(
                ReviewState::Published {
                    publish_id: *publish_id,
                    image,
                    review,
                },
                vec![Effect::SchedulePublishReset {
                    publish_id: *publish_id,
                }],
            );
        }

        Event::PublishRequested {
            publish_id,
            author: None,
            ..
        } => {
            draft.await_confirmation(*publish_id);
            return TransitionResult::new(
                ReviewState::ResultReady { image, draft },
                vec![Effect::PromptAnonymousPublish {
                    publish_id: *publish_id,
                }],
            );
        }

        Event::AnonymousPublishAnswered {
            publish_id,
            confirmed,
            published_at,
        } => {
            if !draft.take_pending_publish(*publish_id) {
                Err(Rejection::NoPendingConfirmation)
            } else if *confirmed {
                let review = draft.snapshot(None, *published_at);
                return TransitionResult::new(
                    ReviewState::Published {
                        publish_id: *publish_id,
                        image,
                        review,
                    },
                    vec![Effect::SchedulePublishReset {
                        publish_id: *publish_id,
                    }],
                );
            } else {
                Ok(())
            }
        }

        Event::StartOver => return TransitionResult::applied(ReviewState::Idle),

        event if is_background(event) => {
            return TransitionResult::ignored(ReviewState::ResultReady { image, draft });
        }

        _ => {
            return TransitionResult::not_allowed(ReviewState::ResultReady { image, draft }, &event);
        }
    };

    let state = ReviewState::ResultReady { image, draft };
    match edit {
        Ok(()) => TransitionResult::applied(state),
        Err(rejection) => TransitionResult::rejected(state, rejection),
    }
}

fn published(state: ReviewState, event: Event) -> TransitionResult {
    let ReviewState::Published { publish_id, .. } = &state else {
        return TransitionResult::ignored(state);
    };

    match event {
        Event::PublishTimerElapsed { publish_id: id } if id == *publish_id => {
            TransitionResult::applied(ReviewState::Idle)
        }
        event if is_background(&event) => TransitionResult::ignored(state),
        event => TransitionResult::not_allowed(state, &event),
    }
}

fn error(state: ReviewState, event: Event) -> TransitionResult {
    if is_background(&event) {
        TransitionResult::ignored(state)
    } else {
        TransitionResult::not_allowed(state, &event)
    }
}

fn is_background(event: &Event) -> bool {
    matches!(
        event,
        Event::AnalysisSucceeded { .. }
            | Event::AnalysisFailed { .. }
            | Event::PublishTimerElapsed { .. }
    )
}
