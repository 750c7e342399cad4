//! Flash-message extraction
//!
//! Scenarios assert on what the user would actually read after a form
//! submission, so outcome checks go through the rendered alert box rather
//! than any structured response.

use crate::html;

/// Strategy for pulling the user-visible outcome message out of a page
pub trait NotificationExtractor: Send + Sync {
    /// Trimmed message text, or an empty string when the page shows none
    fn extract(&self, html: &str) -> String;
}

/// Finds the first element carrying one of a fixed set of alert classes
#[derive(Debug, Clone)]
pub struct AlertClassExtractor {
    classes: Vec<String>,
}

impl AlertClassExtractor {
    pub fn new<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            classes: classes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

impl Default for AlertClassExtractor {
    fn default() -> Self {
        Self::new(["alert", "alert-danger", "alert-warning", "alert-info"])
    }
}

impl NotificationExtractor for AlertClassExtractor {
    fn extract(&self, html: &str) -> String {
        html::find_first(html, |tag| tag.has_any_class(&self.classes))
            .map(|element| element.text())
            .unwrap_or_default()
    }
}

/// Extract the notification with the default alert classes
pub fn extract_notification(html: &str) -> String {
    AlertClassExtractor::default().extract(html)
}
