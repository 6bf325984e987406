//! Review session controller
//!
//! Owns one [`ReviewState`], feeds user actions through the pure transition
//! function and runs the resulting effects on the tokio runtime. Background
//! work reports back over a channel drained by [`ReviewController::next_event`].

use std::sync::Arc;
use std::time::Duration;

use auth::User;
use chrono::Utc;
use common::{ClientError, config::ClientConfig};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::analysis::{ImageAnalyzer, ImagePayload};
use crate::state_machine::{
    AnalysisId, Effect, Event, Outcome, PublishId, Rejection, ReviewState, transition,
};

/// Timing knobs of a review session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewSettings {
    pub analysis_timeout: Duration,
    pub publish_reset_delay: Duration,
}

impl Default for ReviewSettings {
    fn default() -> Self {
        Self {
            analysis_timeout: Duration::from_secs(60),
            publish_reset_delay: Duration::from_millis(2000),
        }
    }
}

impl ReviewSettings {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            analysis_timeout: config.analysis_timeout(),
            publish_reset_delay: config.publish_reset_delay(),
        }
    }
}

/// Result of a publish request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The review is published and the reset timer is running
    Published,
    /// The user is anonymous; the shell must ask before publishing
    ConfirmationRequired,
    /// The user declined to publish anonymously; the draft is still editable
    Declined,
}

pub struct ReviewController<A: ImageAnalyzer + 'static> {
    analyzer: Arc<A>,
    settings: ReviewSettings,
    state: ReviewState,
    next_analysis_id: u64,
    next_publish_id: u64,
    in_flight: Option<(AnalysisId, JoinHandle<()>)>,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
}

impl<A: ImageAnalyzer + 'static> ReviewController<A> {
    pub fn new(analyzer: A, settings: ReviewSettings) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            analyzer: Arc::new(analyzer),
            settings,
            state: ReviewState::Idle,
            next_analysis_id: 0,
            next_publish_id: 0,
            in_flight: None,
            events_tx,
            events_rx,
        }
    }

    pub fn state(&self) -> &ReviewState {
        &self.state
    }

    pub fn settings(&self) -> ReviewSettings {
        self.settings
    }

    /// Select a photo and start analyzing it, superseding any analysis in flight
    pub fn select_image(&mut self, image: ImagePayload) -> AnalysisId {
        self.next_analysis_id += 1;
        let analysis_id = AnalysisId(self.next_analysis_id);
        self.apply(Event::ImageSelected {
            analysis_id,
            image: Arc::new(image),
        });
        analysis_id
    }

    pub fn edit_review(&mut self, text: impl Into<String>) -> Result<(), Rejection> {
        let text = text.into();
        self.user_action(Event::ReviewEdited { text })
    }

    pub fn toggle_suggestion(&mut self, tag: impl Into<String>) -> Result<(), Rejection> {
        let tag = tag.into();
        self.user_action(Event::SuggestionToggled { tag })
    }

    pub fn set_rating(&mut self, rating: i32) -> Result<(), Rejection> {
        self.user_action(Event::RatingSet { rating })
    }

    pub fn select_vendor(&mut self, name: impl Into<String>) -> Result<(), Rejection> {
        let name = name.into();
        self.user_action(Event::VendorSelected { name })
    }

    pub fn submit_custom_vendor(&mut self, text: impl Into<String>) -> Result<(), Rejection> {
        let text = text.into();
        self.user_action(Event::CustomVendorSubmitted { text })
    }

    /// Publish the current draft.
    ///
    /// With a signed-in `user` the review is published at once under their
    /// username. Without one the draft waits for
    /// [`answer_anonymous_publish`](Self::answer_anonymous_publish).
    pub fn publish(&mut self, user: Option<&User>) -> Result<PublishOutcome, Rejection> {
        self.next_publish_id += 1;
        let event = Event::PublishRequested {
            publish_id: PublishId(self.next_publish_id),
            author: user.map(|user| user.username.clone()),
            published_at: Utc::now(),
        };

        self.user_action(event)?;
        if self.state.published_review().is_some() {
            Ok(PublishOutcome::Published)
        } else {
            Ok(PublishOutcome::ConfirmationRequired)
        }
    }

    /// Answer the "publish anonymously?" question raised by [`publish`](Self::publish)
    pub fn answer_anonymous_publish(&mut self, confirmed: bool) -> Result<PublishOutcome, Rejection> {
        let publish_id = self
            .state
            .draft()
            .and_then(|draft| draft.pending_publish())
            .ok_or(Rejection::NoPendingConfirmation)?;

        self.user_action(Event::AnonymousPublishAnswered {
            publish_id,
            confirmed,
            published_at: Utc::now(),
        })?;

        if confirmed {
            Ok(PublishOutcome::Published)
        } else {
            Ok(PublishOutcome::Declined)
        }
    }

    /// Discard the draft and go back to Idle
    pub fn start_over(&mut self) -> Result<(), Rejection> {
        self.user_action(Event::StartOver)
    }

    /// Wait for the next background result and apply it.
    ///
    /// Returns the event that was processed, stale ones included.
    pub async fn next_event(&mut self) -> Option<Event> {
        let event = self.events_rx.recv().await?;
        self.apply(event.clone());
        Some(event)
    }

    fn user_action(&mut self, event: Event) -> Result<(), Rejection> {
        match self.apply(event) {
            Outcome::Rejected(rejection) => Err(rejection),
            Outcome::Applied | Outcome::Ignored => Ok(()),
        }
    }

    fn apply(&mut self, event: Event) -> Outcome {
        let event_name = event.name();
        let finished = match &event {
            Event::AnalysisSucceeded { analysis_id, .. }
            | Event::AnalysisFailed { analysis_id, .. } => Some(*analysis_id),
            _ => None,
        };

        let state = std::mem::take(&mut self.state);
        let from = state.name();
        let result = transition(state, event);
        self.state = result.state;

        match &result.outcome {
            Outcome::Applied => {
                info!("Review session: {} -> {} on {}", from, self.state.name(), event_name);
                if let Some(id) = finished
                    && self.in_flight.as_ref().is_some_and(|(current, _)| *current == id)
                {
                    self.in_flight = None;
                }
            }
            Outcome::Ignored => debug!("Ignored {} while {}", event_name, from),
            Outcome::Rejected(rejection) => warn!("Rejected {}: {}", event_name, rejection),
        }

        for effect in result.effects {
            self.execute(effect);
        }
        result.outcome
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::RequestAnalysis { analysis_id, image } => {
                let analyzer = Arc::clone(&self.analyzer);
                let events = self.events_tx.clone();
                let limit = self.settings.analysis_timeout;

                let handle = tokio::spawn(async move {
                    let event = match tokio::time::timeout(limit, analyzer.analyze(&image)).await {
                        Ok(Ok(analysis)) => Event::AnalysisSucceeded {
                            analysis_id,
                            analysis,
                        },
                        Ok(Err(error)) => Event::AnalysisFailed { analysis_id, error },
                        Err(_) => {
                            warn!("Analysis {} timed out after {:?}", analysis_id, limit);
                            Event::AnalysisFailed {
                                analysis_id,
                                error: ClientError::Timeout,
                            }
                        }
                    };
                    // The receiver is gone only when the controller was dropped
                    let _ = events.send(event);
                });

                debug!("Started {}", analysis_id);
                self.in_flight = Some((analysis_id, handle));
            }

            Effect::CancelAnalysis { analysis_id } => {
                if let Some((current, handle)) = self.in_flight.take() {
                    if current == analysis_id {
                        info!("Cancelling superseded {}", analysis_id);
                        handle.abort();
                    } else {
                        self.in_flight = Some((current, handle));
                    }
                }
            }

            Effect::PromptAnonymousPublish { publish_id } => {
                info!("{} needs confirmation to publish anonymously", publish_id);
            }

            Effect::SchedulePublishReset { publish_id } => {
                let events = self.events_tx.clone();
                let delay = self.settings.publish_reset_delay;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = events.send(Event::PublishTimerElapsed { publish_id });
                });
                debug!("Session resets {:?} after {}", delay, publish_id);
            }
        }
    }
}

impl<A: ImageAnalyzer + 'static> Drop for ReviewController<A> {
    fn drop(&mut self) {
        if let Some((_, handle)) = self.in_flight.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use common::ClientResult;

    use super::*;
    use crate::analysis::Analysis;

    struct Fixed;

    #[async_trait]
    impl ImageAnalyzer for Fixed {
        async fn analyze(&self, _image: &ImagePayload) -> ClientResult<Analysis> {
            Ok(Analysis {
                business_name: "Café X".to_string(),
                ..Default::default()
            })
        }
    }

    fn photo() -> ImagePayload {
        ImagePayload::new("image/png", vec![0x89, 0x50]).expect("valid image")
    }

    #[tokio::test]
    async fn test_select_image_runs_analysis() {
        let mut controller = ReviewController::new(Fixed, ReviewSettings::default());
        let id = controller.select_image(photo());
        assert_eq!(controller.state().name(), "analyzing");

        let event = controller.next_event().await.expect("event");
        assert!(matches!(event, Event::AnalysisSucceeded { analysis_id, .. } if analysis_id == id));
        assert_eq!(
            controller.state().analysis().map(|a| a.business_name.as_str()),
            Some("Café X")
        );
    }

    #[tokio::test]
    async fn test_answer_without_prompt_is_rejected() {
        let mut controller = ReviewController::new(Fixed, ReviewSettings::default());
        assert_eq!(
            controller.answer_anonymous_publish(true),
            Err(Rejection::NoPendingConfirmation)
        );
    }

    #[test]
    fn test_settings_from_config() {
        let config = ClientConfig {
            api_base_url: "http://localhost/api".to_string(),
            analysis_url: "http://localhost/api/analyze-image".to_string(),
            request_timeout_secs: 5,
            analysis_timeout_secs: 12,
            publish_reset_delay_ms: 2500,
            storage_path: None,
        };
        let settings = ReviewSettings::from_config(&config);
        assert_eq!(settings.analysis_timeout, Duration::from_secs(12));
        assert_eq!(settings.publish_reset_delay, Duration::from_millis(2500));
    }
}
