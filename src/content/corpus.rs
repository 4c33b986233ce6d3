use include_dir::{include_dir, Dir};
use rand::seq::SliceRandom;
use serde::Deserialize;
use serde_json::from_str;

use super::{ContentProvider, Difficulty};
use crate::error::ContentFetchError;

static CORPUS_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/src/corpus");

#[derive(Deserialize, Clone, Debug)]
struct CorpusFile {
    difficulty: Difficulty,
    sentences: Vec<String>,
}

/// Built-in sentences per difficulty tier, used whenever the real content
/// source fails.
#[derive(Debug, Clone, Copy)]
pub struct FallbackCorpus {
    shuffle: bool,
}

impl Default for FallbackCorpus {
    fn default() -> Self {
        Self { shuffle: true }
    }
}

impl FallbackCorpus {
    pub fn new(shuffle: bool) -> Self {
        Self { shuffle }
    }

    /// Corpus that returns sentences in file order.
    pub fn ordered() -> Self {
        Self::new(false)
    }
}

impl ContentProvider for FallbackCorpus {
    fn fetch_sentences(
        &mut self,
        difficulty: Difficulty,
    ) -> Result<Vec<String>, ContentFetchError> {
        let mut sentences = read_corpus(difficulty)?;
        if self.shuffle {
            sentences.shuffle(&mut rand::thread_rng());
        }
        Ok(sentences)
    }
}

fn read_corpus(difficulty: Difficulty) -> Result<Vec<String>, ContentFetchError> {
    let file_name = format!("{difficulty}.json");
    let file = CORPUS_DIR
        .get_file(&file_name)
        .ok_or_else(|| ContentFetchError::Unavailable(format!("{file_name} not bundled")))?;

    let text = file
        .contents_utf8()
        .ok_or_else(|| ContentFetchError::Unavailable(format!("{file_name} is not utf-8")))?;

    let corpus: CorpusFile =
        from_str(text).map_err(|e| ContentFetchError::Unavailable(e.to_string()))?;

    if corpus.difficulty != difficulty {
        return Err(ContentFetchError::Unavailable(format!(
            "{file_name} holds {} sentences",
            corpus.difficulty
        )));
    }
    if corpus.sentences.is_empty() {
        return Err(ContentFetchError::Empty);
    }
    Ok(corpus.sentences)
}
