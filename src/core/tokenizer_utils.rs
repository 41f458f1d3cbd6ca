/*
 * This module provides token estimation for file contents.
 * It defines the `TokenCounterOperations` abstraction for a single counting
 * strategy, concrete counters backed by `tiktoken-rs`, a whitespace word count,
 * and a character/word heuristic, plus `TokenEstimator`, which resolves the
 * configured `TokenizerStrategy` once and always answers with a usable integer.
 * A strategy that cannot be built, or a counter that panics, silently degrades
 * to the heuristic.
 */
use log::{debug, error, warn};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use tiktoken_rs::CoreBPE;

/*
 * Defines the contract for a service that can count tokens in a given text string.
 * Implementations of this trait will provide specific tokenization strategies.
 */
pub trait TokenCounterOperations: Send + Sync {
    fn count_tokens(&self, text: &str) -> usize;
}

/*
 * The configured tokenizer. Parsed from the configuration's strategy id; ids
 * that are not recognised are kept as `Unknown` so the estimator can log them
 * and fall back instead of rejecting the configuration.
 */
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TokenizerStrategy {
    Heuristic,
    Whitespace,
    Cl100k,
    O200k,
    P50k,
    Model(String),
    Unknown(String),
}

impl TokenizerStrategy {
    /*
     * Maps a configuration strategy id (and optional model identifier) onto a
     * strategy. Matching is case-insensitive. The `model`/`tiktoken` id needs a
     * model identifier; without one it is treated as unknown.
     */
    pub fn from_config(id: &str, model: Option<&str>) -> Self {
        let normalized = id.trim().to_lowercase();
        match normalized.as_str() {
            "" | "heuristic" | "fallback" | "estimate" => TokenizerStrategy::Heuristic,
            "whitespace" | "words" => TokenizerStrategy::Whitespace,
            "cl100k" | "cl100k_base" => TokenizerStrategy::Cl100k,
            "o200k" | "o200k_base" => TokenizerStrategy::O200k,
            "p50k" | "p50k_base" => TokenizerStrategy::P50k,
            "model" | "tiktoken" => match model.map(str::trim).filter(|m| !m.is_empty()) {
                Some(m) => TokenizerStrategy::Model(m.to_string()),
                None => TokenizerStrategy::Unknown(normalized),
            },
            _ => TokenizerStrategy::Unknown(id.trim().to_string()),
        }
    }
}

impl fmt::Display for TokenizerStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenizerStrategy::Heuristic => write!(f, "heuristic"),
            TokenizerStrategy::Whitespace => write!(f, "whitespace"),
            TokenizerStrategy::Cl100k => write!(f, "cl100k_base"),
            TokenizerStrategy::O200k => write!(f, "o200k_base"),
            TokenizerStrategy::P50k => write!(f, "p50k_base"),
            TokenizerStrategy::Model(m) => write!(f, "model:{m}"),
            TokenizerStrategy::Unknown(id) => write!(f, "unknown:{id}"),
        }
    }
}

/*
 * A `TokenCounterOperations` implementation backed by a `tiktoken-rs` BPE.
 * The BPE is built once when the counter is created, so a missing or broken
 * encoding is detected at configuration time rather than on every count.
 */
pub struct CoreTikTokenCounter {
    bpe: CoreBPE,
}

impl CoreTikTokenCounter {
    /*
     * Builds the BPE for a tiktoken-backed strategy. Returns `None` for
     * strategies that are not tiktoken encodings or when the encoding cannot
     * be initialised; the error is logged.
     */
    pub fn for_strategy(strategy: &TokenizerStrategy) -> Option<Self> {
        let bpe = match strategy {
            TokenizerStrategy::Cl100k => tiktoken_rs::cl100k_base(),
            TokenizerStrategy::O200k => tiktoken_rs::o200k_base(),
            TokenizerStrategy::P50k => tiktoken_rs::p50k_base(),
            TokenizerStrategy::Model(model) => tiktoken_rs::get_bpe_from_model(model),
            _ => return None,
        };
        match bpe {
            Ok(bpe) => Some(CoreTikTokenCounter { bpe }),
            Err(e) => {
                error!("CoreTikTokenCounter: Failed to initialize BPE for {strategy}: {e:?}");
                None
            }
        }
    }
}

impl TokenCounterOperations for CoreTikTokenCounter {
    fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

/*
 * A concrete implementation of `TokenCounterOperations` that estimates tokens
 * by counting words separated by whitespace. This is a very basic estimation.
 */
pub struct SimpleWhitespaceTokenCounter;

impl SimpleWhitespaceTokenCounter {
    pub fn new() -> Self {
        SimpleWhitespaceTokenCounter
    }
}

impl TokenCounterOperations for SimpleWhitespaceTokenCounter {
    fn count_tokens(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

/*
 * The deterministic fallback: `max(ceil(chars / 4), ceil(words * 1.3))`,
 * at least 1 for any text with a non-whitespace character and 0 otherwise.
 */
pub struct HeuristicTokenCounter;

impl TokenCounterOperations for HeuristicTokenCounter {
    fn count_tokens(&self, text: &str) -> usize {
        heuristic_token_count(text)
    }
}

pub fn heuristic_token_count(text: &str) -> usize {
    if text.trim().is_empty() {
        return 0;
    }
    let char_count = text.chars().count();
    let word_count = text.split_whitespace().count();
    let by_chars = char_count.div_ceil(4);
    // ceil(words * 1.3) in integer arithmetic
    let by_words = (word_count * 13).div_ceil(10);
    by_chars.max(by_words).max(1)
}

/*
 * Resolves a `TokenizerStrategy` into a primary counter once, and answers
 * `estimate` calls with it. When no primary counter could be resolved, or the
 * primary counter panics, the heuristic answers instead. `estimate` never
 * fails.
 */
pub struct TokenEstimator {
    strategy: TokenizerStrategy,
    primary: Option<Box<dyn TokenCounterOperations>>,
}

impl TokenEstimator {
    pub fn new(strategy: TokenizerStrategy) -> Self {
        let primary: Option<Box<dyn TokenCounterOperations>> = match &strategy {
            TokenizerStrategy::Heuristic => None,
            TokenizerStrategy::Whitespace => Some(Box::new(SimpleWhitespaceTokenCounter::new())),
            TokenizerStrategy::Unknown(id) => {
                warn!("TokenEstimator: Unknown tokenizer '{id}'. Using heuristic estimate.");
                None
            }
            tiktoken => match CoreTikTokenCounter::for_strategy(tiktoken) {
                Some(counter) => Some(Box::new(counter)),
                None => {
                    warn!("TokenEstimator: Tokenizer {tiktoken} unavailable. Using heuristic estimate.");
                    None
                }
            },
        };
        debug!(
            "TokenEstimator: Resolved strategy {strategy} (primary available: {}).",
            primary.is_some()
        );
        TokenEstimator { strategy, primary }
    }

    /* Uses an injected counter as the primary strategy. */
    pub fn with_counter(strategy: TokenizerStrategy, counter: Box<dyn TokenCounterOperations>) -> Self {
        TokenEstimator {
            strategy,
            primary: Some(counter),
        }
    }

    pub fn strategy(&self) -> &TokenizerStrategy {
        &self.strategy
    }

    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }

    pub fn estimate(&self, text: &str) -> usize {
        let Some(counter) = &self.primary else {
            return heuristic_token_count(text);
        };
        match panic::catch_unwind(AssertUnwindSafe(|| counter.count_tokens(text))) {
            Ok(count) => count,
            Err(_) => {
                warn!(
                    "TokenEstimator: Tokenizer {} panicked. Using heuristic estimate.",
                    self.strategy
                );
                heuristic_token_count(text)
            }
        }
    }
}

impl Default for TokenEstimator {
    fn default() -> Self {
        TokenEstimator::new(TokenizerStrategy::Heuristic)
    }
}
