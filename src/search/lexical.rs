/// Okapi BM25 lexical scoring over the metadata table.
///
/// Recovers exact brand and product-name matches that embedding similarity
/// blurs. Every document gets a score for every query, including 0.0 when it
/// shares no terms with the query, so the result is position-aligned with the
/// corpus it was built from.
///
/// Parameters follow the usual Okapi defaults (k1 = 1.5, b = 0.75). Terms that
/// occur in more than half the corpus would get a negative IDF; those are
/// floored at `EPSILON * mean_idf` instead.

use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::LazyLock;

use crate::errors::NestragError;
use crate::index::ChunkMetadata;

const K1: f32 = 1.5;
const B: f32 = 0.75;
const EPSILON: f32 = 0.25;

/// Which text each metadata entry contributes to the lexical corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LexicalCorpus {
    /// `name brand category`
    #[default]
    Identity,
    /// The stored chunk text, falling back to the identity fields when absent
    ChunkText,
}

impl FromStr for LexicalCorpus {
    type Err = NestragError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "identity" => Ok(LexicalCorpus::Identity),
            "chunk_text" => Ok(LexicalCorpus::ChunkText),
            other => Err(NestragError::validation(
                "lexical_corpus",
                &format!("Unknown lexical corpus '{}': expected 'identity' or 'chunk_text'", other),
            )),
        }
    }
}

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+").expect("Invalid word regex pattern"));

/// Lowercase word-boundary tokenization shared by corpus and query.
pub fn tokenize(text: &str) -> Vec<String> {
    WORD.find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Text a metadata entry contributes to the lexical corpus.
pub fn document_text(meta: &ChunkMetadata, corpus: LexicalCorpus) -> String {
    let identity = || {
        [Some(meta.entity_name()), meta.brand(), meta.category()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ")
    };
    match corpus {
        LexicalCorpus::Identity => identity(),
        LexicalCorpus::ChunkText => meta.text().map(str::to_string).unwrap_or_else(identity),
    }
}

/// Precomputed term statistics for one tokenized corpus.
#[derive(Debug, Clone, Default)]
pub struct Bm25Scorer {
    doc_freqs: Vec<HashMap<String, u32>>,
    doc_lens: Vec<f32>,
    avgdl: f32,
    idf: HashMap<String, f32>,
}

impl Bm25Scorer {
    pub fn new<S: AsRef<str>>(documents: &[S]) -> Self {
        let doc_freqs: Vec<HashMap<String, u32>> = documents
            .iter()
            .map(|d| {
                let mut tf = HashMap::new();
                for token in tokenize(d.as_ref()) {
                    *tf.entry(token).or_insert(0) += 1;
                }
                tf
            })
            .collect();

        let doc_lens: Vec<f32> = doc_freqs
            .iter()
            .map(|tf| tf.values().sum::<u32>() as f32)
            .collect();

        let n = doc_freqs.len() as f32;
        let avgdl = if doc_freqs.is_empty() {
            0.0
        } else {
            doc_lens.iter().sum::<f32>() / n
        };

        // ordered so the IDF sum is reproducible across runs
        let mut containing: BTreeMap<&str, u32> = BTreeMap::new();
        for tf in &doc_freqs {
            for term in tf.keys() {
                *containing.entry(term.as_str()).or_insert(0) += 1;
            }
        }

        let mut idf: HashMap<String, f32> = HashMap::with_capacity(containing.len());
        let mut idf_sum = 0.0f32;
        let mut negative = Vec::new();
        for (term, freq) in &containing {
            let freq = *freq as f32;
            let value = (n - freq + 0.5).ln() - (freq + 0.5).ln();
            idf_sum += value;
            if value < 0.0 {
                negative.push(term.to_string());
            }
            idf.insert(term.to_string(), value);
        }
        if !idf.is_empty() {
            let floor = EPSILON * idf_sum / idf.len() as f32;
            for term in negative {
                idf.insert(term, floor);
            }
        }

        Bm25Scorer {
            doc_freqs,
            doc_lens,
            avgdl,
            idf,
        }
    }

    /// Build the corpus from a metadata table.
    pub fn from_metadata(metadata: &[ChunkMetadata], corpus: LexicalCorpus) -> Self {
        let docs: Vec<String> = metadata.iter().map(|m| document_text(m, corpus)).collect();
        Self::new(&docs)
    }

    pub fn len(&self) -> usize {
        self.doc_freqs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_freqs.is_empty()
    }

    /// One BM25 score per document, in corpus order.
    pub fn scores(&self, query: &str) -> Vec<f32> {
        let terms = tokenize(query);
        let avgdl = if self.avgdl > 0.0 { self.avgdl } else { 1.0 };

        self.doc_freqs
            .iter()
            .zip(&self.doc_lens)
            .map(|(tf, &len)| {
                terms
                    .iter()
                    .map(|term| {
                        let f = tf.get(term).copied().unwrap_or(0) as f32;
                        if f == 0.0 {
                            return 0.0;
                        }
                        let idf = self.idf.get(term).copied().unwrap_or(0.0);
                        idf * (f * (K1 + 1.0)) / (f + K1 * (1.0 - B + B * len / avgdl))
                    })
                    .sum()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_lowercases_and_splits() {
        assert_eq!(tokenize("KIT KAT® Chunky, 4-pack!"), vec!["kit", "kat", "chunky", "4", "pack"]);
        assert!(tokenize("  ...  ").is_empty());
    }

    #[test]
    fn test_tokenize_keeps_unicode_words_whole() {
        assert_eq!(tokenize("Crème_Brûlée mix"), vec!["crème_brûlée", "mix"]);
    }

    #[test]
    fn test_one_score_per_document_including_zeros() {
        let scorer = Bm25Scorer::new(&["aero chocolate", "smarties candy", "coffee crisp wafer"]);
        let scores = scorer.scores("aero");
        assert_eq!(scores.len(), 3);
        assert!(scores[0] > 0.0);
        assert_eq!(scores[1], 0.0);
        assert_eq!(scores[2], 0.0);
    }

    #[test]
    fn test_rare_term_outweighs_common_term() {
        let scorer = Bm25Scorer::new(&[
            "aero milk chocolate",
            "kitkat milk chocolate",
            "smarties milk chocolate",
            "quality street toffee",
        ]);
        let scores = scorer.scores("aero chocolate");
        assert!(scores[0] > scores[1]);
        assert!((scores[1] - scores[2]).abs() < 1e-6);
    }

    #[test]
    fn test_negative_idf_floored_positive() {
        // "milk" appears in 3 of 4 documents, raw idf would be negative
        let scorer = Bm25Scorer::new(&["milk a", "milk b", "milk c", "d"]);
        let scores = scorer.scores("milk");
        assert!(scores[0] > 0.0);
        assert_eq!(scores[3], 0.0);
    }

    #[test]
    fn test_empty_corpus_and_query() {
        let empty: [&str; 0] = [];
        assert!(Bm25Scorer::new(&empty).scores("aero").is_empty());
        let scorer = Bm25Scorer::new(&["aero"]);
        assert_eq!(scorer.scores(""), vec![0.0]);
    }

    #[test]
    fn test_document_text_identity_and_chunk_text() {
        let meta: ChunkMetadata = serde_json::from_str(
            r#"{"chunk_type": "overview", "product_name": "AERO Bar", "brand": "Aero",
                "category": "Chocolate", "text": "Bubbly milk chocolate"}"#,
        )
        .unwrap();
        assert_eq!(document_text(&meta, LexicalCorpus::Identity), "AERO Bar Aero Chocolate");
        assert_eq!(document_text(&meta, LexicalCorpus::ChunkText), "Bubbly milk chocolate");
    }

    #[test]
    fn test_lexical_corpus_from_str() {
        assert_eq!("chunk_text".parse::<LexicalCorpus>().unwrap(), LexicalCorpus::ChunkText);
        assert!("bogus".parse::<LexicalCorpus>().is_err());
    }
}
