use super::is_name_character;

/// Decides whether a piece of text is acceptable for some purpose.
#[cfg_attr(test, mockall::automock)]
pub trait TextValidator: Send + Sync {
    fn is_valid(&self, text: &str) -> bool;

    fn is_invalid(&self, text: &str) -> bool {
        !self.is_valid(text)
    }
}

/// Accepts non-empty names made only of ASCII letters, digits and underscores.
///
/// Project names double as directory names, so anything outside this charset is
/// rejected rather than escaped.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectNameValidator;

impl ProjectNameValidator {
    pub fn new() -> Self {
        Self
    }
}

impl TextValidator for ProjectNameValidator {
    fn is_valid(&self, text: &str) -> bool {
        !text.is_empty() && text.chars().all(is_name_character)
    }
}
