//! Review capture for R8it
//!
//! A photo goes to the analysis service, the returned analysis becomes an
//! editable draft, and the draft is published. The session lifecycle is an
//! explicit state machine driven by [`controller::ReviewController`].

pub mod analysis;
pub mod controller;
pub mod state_machine;

pub use analysis::{Analysis, HttpImageAnalyzer, ImageAnalyzer, ImageError, ImagePayload};
pub use controller::{PublishOutcome, ReviewController, ReviewSettings};
pub use state_machine::{Outcome, Rejection, ReviewState};
