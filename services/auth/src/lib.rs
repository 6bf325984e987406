//! Authenticated API client for the R8it identity backend
//!
//! Provides the token-managing HTTP client, the persisted session it
//! reads and writes, the user models and the profile editor's form state.

pub mod client;
pub mod models;
pub mod profile;
pub mod session;
pub mod validation;

pub use client::{AuthClient, SessionEvent};
pub use models::{NewUser, UpdateProfile, User};
pub use profile::ProfileForm;
pub use session::AuthSession;
