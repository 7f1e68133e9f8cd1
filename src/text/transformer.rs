use super::is_name_character;

/// Rewrites text into some canonical form.
pub trait TextTransformer: Send + Sync {
    fn transform(&self, text: &str) -> String;
}

/// Canonicalizes free-form text into a project name.
///
/// Spaces become underscores; every other character outside `[A-Za-z0-9_]` is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectNameTransformer;

/// (from, to) pairs applied before filtering.
const REPLACEMENTS: &[(char, char)] = &[(' ', '_')];

impl ProjectNameTransformer {
    pub fn new() -> Self {
        Self
    }

    fn replace(c: char) -> char {
        REPLACEMENTS
            .iter()
            .find_map(|&(from, to)| (from == c).then_some(to))
            .unwrap_or(c)
    }
}

impl TextTransformer for ProjectNameTransformer {
    fn transform(&self, text: &str) -> String {
        text.chars()
            .map(Self::replace)
            .filter(|&c| is_name_character(c))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::{ProjectNameValidator, TextValidator};
    use proptest::prelude::*;

    #[test]
    fn test_transform_drops_punctuation_and_replaces_spaces() {
        let transformer = ProjectNameTransformer::new();
        assert_eq!(transformer.transform("My Mod!!"), "My_Mod");
        assert_eq!(transformer.transform("  a b  "), "__a_b__");
        assert_eq!(transformer.transform("Crème brûlée"), "Crme_brle");
        assert_eq!(transformer.transform("!!!"), "");
    }

    #[test]
    fn test_transformed_name_passes_validator() {
        let transformer = ProjectNameTransformer::new();
        let validator = ProjectNameValidator::new();

        assert!(validator.is_invalid("My Mod!!"));
        assert!(validator.is_valid(&transformer.transform("My Mod!!")));
    }

    proptest! {
        #[test]
        fn prop_transform_is_idempotent(text in ".{0,60}") {
            let transformer = ProjectNameTransformer::new();
            let once = transformer.transform(&text);
            prop_assert_eq!(transformer.transform(&once), once.clone());
        }

        #[test]
        fn prop_non_empty_output_is_valid(text in ".{0,60}") {
            let output = ProjectNameTransformer::new().transform(&text);
            prop_assume!(!output.is_empty());
            prop_assert!(ProjectNameValidator::new().is_valid(&output));
        }
    }
}
