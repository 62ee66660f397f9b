//! Supported languages.
//!
//! - `language`: the `Language` value (`{id, title}`)
//! - `registry`: the fixed, ordered set of languages a translation job fans out to

mod language;
mod registry;

pub use language::Language;
pub use registry::LanguageRegistry;
