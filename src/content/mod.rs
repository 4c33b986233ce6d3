pub mod corpus;

pub use corpus::FallbackCorpus;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ContentFetchError;

/// Used when even the embedded corpus cannot be read.
const LAST_RESORT: &str = "The quick brown fox jumps over the lazy dog.";

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    ValueEnum,
    strum_macros::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];
}

/// Source of target sentences for a race.
pub trait ContentProvider {
    fn fetch_sentences(&mut self, difficulty: Difficulty)
        -> Result<Vec<String>, ContentFetchError>;
}

impl<F> ContentProvider for F
where
    F: FnMut(Difficulty) -> Result<Vec<String>, ContentFetchError>,
{
    fn fetch_sentences(
        &mut self,
        difficulty: Difficulty,
    ) -> Result<Vec<String>, ContentFetchError> {
        self(difficulty)
    }
}

/// Wraps a provider so fetching never fails: errors and empty results are
/// replaced by the embedded corpus for the requested tier.
pub struct WithFallback<P> {
    inner: P,
    corpus: FallbackCorpus,
}

impl<P: ContentProvider> WithFallback<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            corpus: FallbackCorpus::default(),
        }
    }

    pub fn with_corpus(inner: P, corpus: FallbackCorpus) -> Self {
        Self { inner, corpus }
    }

    /// Always yields at least one non-empty sentence.
    pub fn fetch(&mut self, difficulty: Difficulty) -> Vec<String> {
        let fetched = self
            .inner
            .fetch_sentences(difficulty)
            .map(non_empty)
            .and_then(|s| {
                if s.is_empty() {
                    Err(ContentFetchError::Empty)
                } else {
                    Ok(s)
                }
            });

        match fetched {
            Ok(sentences) => {
                debug!("fetched {} {} sentences", sentences.len(), difficulty);
                sentences
            }
            Err(e) => {
                warn!("falling back to built-in {} sentences: {}", difficulty, e);
                self.fallback(difficulty)
            }
        }
    }

    fn fallback(&mut self, difficulty: Difficulty) -> Vec<String> {
        match self.corpus.fetch_sentences(difficulty).map(non_empty) {
            Ok(sentences) if !sentences.is_empty() => sentences,
            Ok(_) => vec![LAST_RESORT.to_string()],
            Err(e) => {
                warn!("built-in corpus unreadable: {}", e);
                vec![LAST_RESORT.to_string()]
            }
        }
    }
}

impl<P: ContentProvider> ContentProvider for WithFallback<P> {
    fn fetch_sentences(
        &mut self,
        difficulty: Difficulty,
    ) -> Result<Vec<String>, ContentFetchError> {
        Ok(self.fetch(difficulty))
    }
}

/// Drops blank entries and surrounding whitespace.
pub fn non_empty(sentences: Vec<String>) -> Vec<String> {
    sentences
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
