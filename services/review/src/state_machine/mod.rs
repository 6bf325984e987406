//! Explicit state machine for one review-authoring session.
//!
//! The design separates:
//! - **State**: where the session is (`ReviewState`)
//! - **Events**: what happened (`Event`)
//! - **Effects**: what to do next (`Effect`)
//! - **Transition**: pure function `(State, Event) -> (State, Vec<Effect>)`
//!
//! The controller executes effects against the analyzer and the clock and
//! feeds their results back as events.

pub mod draft;
pub mod effect;
pub mod event;
pub mod state;
pub mod transition;

pub use draft::*;
pub use effect::*;
pub use event::*;
pub use state::*;
pub use transition::*;
