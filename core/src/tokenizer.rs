use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::{HashMap, HashSet};
use unicode_normalization::UnicodeNormalization;

use crate::Keyword;

lazy_static! {
    static ref RE: Regex = Regex::new(r"(?u)\p{L}[\p{L}\p{N}_']*").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","can't","cannot","could","couldn't",
            "did","didn't","do","does","doesn't","doing","don't","down","during",
            "each","few","for","from","further",
            "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
            "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
            "let's","me","more","most","mustn't","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","she'd","she'll","she's","should","shouldn't","so","some","such",
            "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
            "under","until","up","very",
            "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","won't","would","wouldn't",
            "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }

/// A tokenized document: total token count plus one weighted entry per
/// distinct keyword.
#[derive(Debug, Clone, Default)]
pub struct TokenizedText {
    pub token_length: u32,
    pub keywords: Vec<Keyword>,
}

/// Turns raw document text into a weighted keyword set.
///
/// Implementations must be pure with respect to the input text and must not
/// fail: empty input yields an empty keyword set.
pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> TokenizedText;
}

/// Built-in tokenizer: NFKC normalization, lowercasing, word extraction,
/// stopword removal, and English stemming. Keyword weights are term
/// frequencies normalized by the document's maximum, so the heaviest
/// keyword in a document always weighs 1.0.
#[derive(Debug, Default)]
pub struct DefaultTokenizer;

impl Tokenizer for DefaultTokenizer {
    fn tokenize(&self, text: &str) -> TokenizedText {
        let normalized = text.nfkc().collect::<String>().to_lowercase();
        let mut counts: HashMap<String, u32> = HashMap::new();
        let mut token_length = 0u32;
        for mat in RE.find_iter(&normalized) {
            let token = mat.as_str();
            if is_stopword(token) {
                continue;
            }
            let stem = STEMMER.stem(token).to_string();
            *counts.entry(stem).or_insert(0) += 1;
            token_length += 1;
        }

        let max_count = counts.values().copied().max().unwrap_or(0);
        if max_count == 0 {
            return TokenizedText::default();
        }
        let keywords = counts
            .into_iter()
            .map(|(word, count)| Keyword { word, weight: count as f32 / max_count as f32 })
            .collect();
        TokenizedText { token_length, keywords }
    }
}
