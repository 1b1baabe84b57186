//! Text preparation: cleaning and segmentation into utterances.

pub mod sanitizer;
pub mod segmenter;

pub use sanitizer::{CleaningOptions, CleaningOptionsPatch, clean};
pub use segmenter::{Utterance, segment};
