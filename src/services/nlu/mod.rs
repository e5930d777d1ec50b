pub mod keyword;

use crate::models::Extraction;

pub use keyword::KeywordExtractor;

pub trait Extractor: Send + Sync {
    fn extract(&self, utterance: &str) -> Extraction;
}
