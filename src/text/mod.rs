//! Text capabilities used to vet and canonicalize user-entered names.
//!
//! - [`TextValidator`] / [`ProjectNameValidator`]: accepts only `[A-Za-z0-9_]+`
//! - [`TextTransformer`] / [`ProjectNameTransformer`]: rewrites free-form text into that charset
//!
//! Both are stateless; construct one of each at startup and pass them down.

pub mod transformer;
pub mod validator;

pub use transformer::{ProjectNameTransformer, TextTransformer};
pub use validator::{ProjectNameValidator, TextValidator};

/// True when the text is empty or consists only of whitespace.
pub fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

/// Characters allowed in a project name besides ASCII letters and digits.
const EXTRA_NAME_CHARACTERS: &[char] = &['_'];

pub(crate) fn is_name_character(c: char) -> bool {
    c.is_ascii_alphanumeric() || EXTRA_NAME_CHARACTERS.contains(&c)
}
