//! Title resolution.

use async_trait::async_trait;
use quill_core::{TitleError, TitleGenerator};

/// Local title generator: first non-empty line of the plain text, cut on a
/// word boundary.
#[derive(Debug, Clone)]
pub struct HeuristicTitleGenerator {
    pub max_chars: usize,
}

impl Default for HeuristicTitleGenerator {
    fn default() -> Self {
        Self { max_chars: 60 }
    }
}

impl HeuristicTitleGenerator {
    pub fn title_for(&self, plain_text: &str) -> Option<String> {
        let line = plain_text.lines().map(str::trim).find(|l| !l.is_empty())?;
        if line.chars().count() <= self.max_chars {
            return Some(line.to_string());
        }

        let cut: String = line.chars().take(self.max_chars).collect();
        let title = match cut.rfind(char::is_whitespace) {
            Some(idx) if idx > 0 => cut[..idx].trim_end().to_string(),
            _ => cut,
        };
        Some(title)
    }
}

#[async_trait]
impl TitleGenerator for HeuristicTitleGenerator {
    async fn generate_title(&self, plain_text: &str) -> Result<String, TitleError> {
        self.title_for(plain_text).ok_or(TitleError::Empty)
    }
}

/// Ask `generator` for a title, returning `None` when none is available.
///
/// Failures are logged and never propagated.
pub(crate) async fn generate(generator: Option<&dyn TitleGenerator>, plain_text: &str) -> Option<String> {
    let generator = generator?;
    if plain_text.trim().is_empty() {
        return None;
    }
    match generator.generate_title(plain_text).await {
        Ok(title) if !title.trim().is_empty() => Some(title.trim().to_string()),
        Ok(_) => {
            log::warn!("title generator returned an empty title");
            None
        }
        Err(e) => {
            log::warn!("title generation failed: {e}");
            None
        }
    }
}
