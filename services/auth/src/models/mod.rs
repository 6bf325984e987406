//! Authentication client models

pub mod token;
pub mod user;

// Re-export for convenience
pub use token::{MessageResponse, RefreshTokenResponse, TokenResponse, UserResponse};
pub use user::{LoginCredentials, NewUser, UpdateProfile, User};
