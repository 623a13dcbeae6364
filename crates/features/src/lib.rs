//! Feature extraction for reference/path matching.
//!
//! Provides pure functions used by every scoring stage:
//! - Text normalization (`clean`, `tokenize`, `generalize`)
//! - Path decomposition (`basename`, `parent_folder`, `folder_segments`)
//! - Word-level and character-level similarity

pub mod normalize;
pub mod similarity;

pub use normalize::{
    basename, clean, folder_segments, generalize, is_stop_word, parent_folder, tokenize,
    trailing_number, word_tokens, MIN_TERM_LEN, STOP_WORDS,
};
pub use similarity::{char_score, is_partial_match, word_score, PARTIAL_CREDIT, PHONETIC_CREDIT};
