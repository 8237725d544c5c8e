//! Text capabilities consumed by the pipeline: tokenize-and-stem and
//! string distance.
//!
//! Both are traits so callers can plug in their own algorithms. The
//! defaults are Snowball stemmers (`rust-stemmers`) and the similarity
//! functions from `strsim`, resolved by name from plugin options.

use anyhow::{bail, Result};
use rust_stemmers::Algorithm;

/// Converts free text into a sequence of normalized stems.
pub trait Stemmer: Send + Sync {
    fn tokenize_and_stem(&self, text: &str) -> Result<Vec<String>>;
}

/// Similarity between two stems in `[0, 1]`, higher is closer.
pub trait Distance: Send + Sync {
    fn distance(&self, a: &str, b: &str) -> Result<f64>;
}

pub const DEFAULT_STEMMER: &str = "PorterStemmer";
pub const DEFAULT_DISTANCE: &str = "JaroWinklerDistance";

const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "am", "an", "and", "any", "are", "as", "at", "be",
    "been", "but", "by", "can", "could", "did", "do", "does", "for", "from", "had", "has",
    "have", "he", "her", "his", "how", "i", "if", "in", "into", "is", "it", "its", "me", "my",
    "no", "not", "of", "on", "or", "our", "she", "so", "than", "that", "the", "their", "them",
    "then", "there", "these", "they", "this", "to", "too", "us", "was", "we", "were", "what",
    "when", "where", "which", "who", "will", "with", "would", "you", "your",
];

const PORTUGUESE_STOP_WORDS: &[&str] = &[
    "a", "ao", "aos", "as", "com", "como", "da", "das", "de", "do", "dos", "e", "ela", "ele",
    "em", "entre", "era", "essa", "esse", "esta", "este", "eu", "foi", "isso", "isto", "já",
    "mas", "na", "nas", "no", "nos", "o", "os", "ou", "para", "pela", "pelo", "por", "que",
    "se", "sem", "seu", "sua", "são", "também", "um", "uma", "você",
];

/// Tokenizer + Snowball stemmer for one language.
pub struct SnowballStemmer {
    stemmer: rust_stemmers::Stemmer,
    stop_words: &'static [&'static str],
}

impl SnowballStemmer {
    pub fn new(algorithm: Algorithm) -> Self {
        let stop_words: &'static [&'static str] = match algorithm {
            Algorithm::English => ENGLISH_STOP_WORDS,
            Algorithm::Portuguese => PORTUGUESE_STOP_WORDS,
            _ => &[],
        };
        Self {
            stemmer: rust_stemmers::Stemmer::create(algorithm),
            stop_words,
        }
    }
}

impl Stemmer for SnowballStemmer {
    fn tokenize_and_stem(&self, text: &str) -> Result<Vec<String>> {
        Ok(tokenize(text)
            .into_iter()
            .filter(|token| !self.stop_words.contains(&token.as_str()))
            .map(|token| self.stemmer.stem(&token).into_owned())
            .filter(|stem| !stem.is_empty())
            .collect())
    }
}

/// Lowercase and split on anything that is not alphanumeric.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// The similarity functions shipped with the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringDistance {
    JaroWinkler,
    Jaro,
    Levenshtein,
    Dice,
}

impl Distance for StringDistance {
    fn distance(&self, a: &str, b: &str) -> Result<f64> {
        Ok(match self {
            StringDistance::JaroWinkler => strsim::jaro_winkler(a, b),
            StringDistance::Jaro => strsim::jaro(a, b),
            StringDistance::Levenshtein => strsim::normalized_levenshtein(a, b),
            StringDistance::Dice => strsim::sorensen_dice(a, b),
        })
    }
}

/// Resolve a stemmer by configured name.
pub fn stemmer_by_name(name: &str) -> Result<SnowballStemmer> {
    let algorithm = match name.to_ascii_lowercase().as_str() {
        "porterstemmer" | "porter" | "english" => Algorithm::English,
        "porterstemmerpt" | "portuguese" => Algorithm::Portuguese,
        "porterstemmeres" | "spanish" => Algorithm::Spanish,
        "porterstemmerfr" | "french" => Algorithm::French,
        "porterstemmerde" | "german" => Algorithm::German,
        "porterstemmerit" | "italian" => Algorithm::Italian,
        _ => bail!("unknown stemmer: {}", name),
    };
    Ok(SnowballStemmer::new(algorithm))
}

/// Resolve a distance function by configured name.
pub fn distance_by_name(name: &str) -> Result<StringDistance> {
    Ok(match name.to_ascii_lowercase().as_str() {
        "jarowinklerdistance" | "jaro_winkler" => StringDistance::JaroWinkler,
        "jarodistance" | "jaro" => StringDistance::Jaro,
        "levenshteindistance" | "levenshtein" => StringDistance::Levenshtein,
        "dicecoefficient" | "dice" => StringDistance::Dice,
        _ => bail!("unknown distance: {}", name),
    })
}
