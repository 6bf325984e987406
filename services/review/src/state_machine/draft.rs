//! Editable review draft built from an analysis.
//!
//! Suggestion tags are kept in the review text as comma-separated segments.
//! Toggling a tag removes its last occurrence or appends it; a removal is
//! remembered so that toggling the same tag straight away puts it back where
//! it was.

use chrono::{DateTime, Utc};

use super::state::{PublishId, PublishedReview};
use super::transition::Rejection;
use crate::analysis::Analysis;

/// Separator between suggestion segments in the review text
pub const SUGGESTION_SEPARATOR: &str = ", ";

/// Vendor chip that opens free-text entry instead of selecting itself
pub const OTHER_VENDOR: &str = "Other";

/// State of the free-text vendor entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VendorInput {
    #[default]
    Closed,
    Open,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Removal {
    tag: Vec<String>,
    index: usize,
    text_after: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewDraft {
    analysis: Analysis,
    review_text: String,
    user_rating: u8,
    selected_vendor: Option<String>,
    vendor_input: VendorInput,
    pending_publish: Option<PublishId>,
    last_removal: Option<Removal>,
}

impl ReviewDraft {
    /// Seed a draft. The text comes from `analysis.review`; the rating starts
    /// unset whatever the suggested rating is.
    pub fn new(analysis: Analysis) -> Self {
        let review_text = analysis.review.clone().unwrap_or_default();
        Self {
            analysis,
            review_text,
            user_rating: 0,
            selected_vendor: None,
            vendor_input: VendorInput::Closed,
            pending_publish: None,
            last_removal: None,
        }
    }

    pub fn analysis(&self) -> &Analysis {
        &self.analysis
    }

    pub fn review_text(&self) -> &str {
        &self.review_text
    }

    pub fn user_rating(&self) -> u8 {
        self.user_rating
    }

    pub fn selected_vendor(&self) -> Option<&str> {
        self.selected_vendor.as_deref()
    }

    pub fn vendor_input(&self) -> VendorInput {
        self.vendor_input
    }

    /// Publish waiting for the anonymous-publish answer, if any
    pub fn pending_publish(&self) -> Option<PublishId> {
        self.pending_publish
    }

    /// True when `tag` currently appears as a whole segment of the text
    pub fn contains_suggestion(&self, tag: &str) -> bool {
        let tag = segments(tag);
        find_last(&segments(&self.review_text), &tag).is_some()
    }

    pub(crate) fn edit_review(&mut self, text: String) {
        self.review_text = text;
        self.last_removal = None;
    }

    pub(crate) fn toggle_suggestion(&mut self, tag: &str) {
        let tag = segments(tag);
        if tag.is_empty() {
            return;
        }
        let mut current = segments(&self.review_text);

        if let Some(removal) = self.last_removal.take()
            && removal.tag == tag
            && removal.text_after == self.review_text
        {
            let index = removal.index.min(current.len());
            current.splice(index..index, tag);
            self.review_text = current.join(SUGGESTION_SEPARATOR);
            return;
        }

        match find_last(&current, &tag) {
            Some(index) => {
                current.drain(index..index + tag.len());
                self.review_text = current.join(SUGGESTION_SEPARATOR);
                self.last_removal = Some(Removal {
                    tag,
                    index,
                    text_after: self.review_text.clone(),
                });
            }
            None => {
                current.extend(tag);
                self.review_text = current.join(SUGGESTION_SEPARATOR);
            }
        }
    }

    pub(crate) fn set_rating(&mut self, rating: i32) -> Result<(), Rejection> {
        if !(1..=5).contains(&rating) {
            return Err(Rejection::RatingOutOfRange(rating));
        }
        self.user_rating = rating as u8;
        Ok(())
    }

    pub(crate) fn select_vendor(&mut self, name: &str) -> Result<(), Rejection> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Rejection::EmptyVendor);
        }

        if name == OTHER_VENDOR {
            self.selected_vendor = None;
            self.vendor_input = VendorInput::Open;
        } else {
            self.selected_vendor = Some(name.to_string());
            self.vendor_input = VendorInput::Closed;
        }
        Ok(())
    }

    pub(crate) fn submit_custom_vendor(&mut self, text: &str) -> Result<(), Rejection> {
        if self.vendor_input != VendorInput::Open {
            return Err(Rejection::VendorInputClosed);
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(Rejection::EmptyVendor);
        }

        self.selected_vendor = Some(text.to_string());
        self.vendor_input = VendorInput::Closed;
        Ok(())
    }

    pub(crate) fn await_confirmation(&mut self, publish_id: PublishId) {
        self.pending_publish = Some(publish_id);
    }

    /// Clear the pending publish if it is `publish_id`
    pub(crate) fn take_pending_publish(&mut self, publish_id: PublishId) -> bool {
        if self.pending_publish == Some(publish_id) {
            self.pending_publish = None;
            true
        } else {
            false
        }
    }

    pub(crate) fn snapshot(
        &self,
        author: Option<String>,
        published_at: DateTime<Utc>,
    ) -> PublishedReview {
        PublishedReview {
            business_name: self.analysis.business_name.clone(),
            review_text: self.review_text.trim().to_string(),
            rating: self.user_rating,
            vendor: self.selected_vendor.clone(),
            author,
            published_at,
        }
    }
}

fn segments(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(String::from)
        .collect()
}

fn find_last(haystack: &[String], needle: &[String]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .rev()
        .find(|&start| haystack[start..start + needle.len()] == *needle)
}
