//! Form state behind the profile editor

use crate::{
    models::{UpdateProfile, User},
    validation::validate_username,
};

/// Editable copy of the user's profile fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileForm {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub bio: String,
    pub location: String,
}

impl ProfileForm {
    /// Seed the form from the cached user; missing fields become empty
    pub fn from_user(user: &User) -> Self {
        Self {
            first_name: user.first_name.clone().unwrap_or_default(),
            last_name: user.last_name.clone().unwrap_or_default(),
            username: user.username.clone(),
            bio: user.bio.clone().unwrap_or_default(),
            location: user.location.clone().unwrap_or_default(),
        }
    }

    /// Discard edits by re-seeding from the user
    pub fn reset(&mut self, user: &User) {
        *self = Self::from_user(user);
    }

    /// True when the form differs from what the user record holds
    pub fn is_dirty(&self, user: &User) -> bool {
        *self != Self::from_user(user)
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_username(self.username.trim())
    }

    /// Payload sent on submit; the whole form is sent, trimmed
    pub fn to_update(&self) -> UpdateProfile {
        UpdateProfile {
            first_name: Some(self.first_name.trim().to_string()),
            last_name: Some(self.last_name.trim().to_string()),
            username: Some(self.username.trim().to_string()),
            bio: Some(self.bio.trim().to_string()),
            location: Some(self.location.trim().to_string()),
        }
    }
}
