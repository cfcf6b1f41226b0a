use serde::{Deserialize, Serialize};

use crate::error::Error;

use super::fingerprint::ContentClass;

/// Fewest distinct observers that can ever trigger an echo.
pub const MIN_OBSERVERS: usize = 2;

fn default_text_probabilities() -> Vec<f64> {
    vec![0.5, 0.9, 0.95]
}

fn default_attachment_probabilities() -> Vec<f64> {
    vec![0.9, 1.0]
}

/// Trigger probabilities keyed by content class and distinct-observer count.
///
/// Entry `i` of each list is the probability for `i + 2` observers; the last
/// entry applies to every larger count. Fewer than two observers never
/// trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityTable {
    #[serde(default = "default_text_probabilities")]
    pub text: Vec<f64>,
    #[serde(default = "default_attachment_probabilities")]
    pub attachment: Vec<f64>,
}

impl Default for ProbabilityTable {
    fn default() -> Self {
        Self {
            text: default_text_probabilities(),
            attachment: default_attachment_probabilities(),
        }
    }
}

impl ProbabilityTable {
    /// Probability in `[0, 1]` that `observers` distinct users posting the same
    /// content should make the bot join in.
    pub fn trigger_probability(&self, class: ContentClass, observers: usize) -> f64 {
        if observers < MIN_OBSERVERS {
            return 0.0;
        }
        let row = match class {
            ContentClass::Text => &self.text,
            ContentClass::Attachment => &self.attachment,
        };
        let idx = (observers - MIN_OBSERVERS).min(row.len().saturating_sub(1));
        row.get(idx).copied().unwrap_or(0.0).clamp(0.0, 1.0)
    }

    /// Reject tables that are empty, out of range, or decreasing.
    pub fn validate(&self) -> Result<(), Error> {
        validate_row("text", &self.text)?;
        validate_row("attachment", &self.attachment)
    }
}

fn validate_row(name: &str, row: &[f64]) -> Result<(), Error> {
    if row.is_empty() {
        return Err(Error::Config(format!(
            "repeat.probability.{name} must have at least one entry"
        )));
    }
    for (i, p) in row.iter().enumerate() {
        if !(0.0..=1.0).contains(p) {
            return Err(Error::Config(format!(
                "repeat.probability.{name}[{i}] = {p} is outside [0, 1]"
            )));
        }
    }
    if let Some(i) = row.windows(2).position(|w| w[1] < w[0]) {
        return Err(Error::Config(format!(
            "repeat.probability.{name} must be non-decreasing (entry {} < entry {i})",
            i + 1
        )));
    }
    Ok(())
}
