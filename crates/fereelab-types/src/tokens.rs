//! Rough token-count and cost estimates shown next to messages.
//!
//! These are approximations (about four characters per token, or 1.3 tokens
//! per word, whichever is larger); they are not tokenizer-accurate.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenCost {
    pub token_count: u64,
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
}

pub fn estimate_token_count(text: &str) -> u64 {
    if text.trim().is_empty() {
        return 0;
    }
    let chars = text.chars().count() as f64;
    let words = text.split_whitespace().count() as f64;
    let by_chars = (chars / 4.0).ceil();
    let by_words = (words * 1.3).ceil();
    by_chars.max(by_words) as u64
}

/// Cost of `text` given prices per 1K input (and optionally output) tokens.
pub fn calculate_token_cost(
    text: &str,
    input_price_per_k: f64,
    output_price_per_k: Option<f64>,
) -> TokenCost {
    let token_count = estimate_token_count(text);
    let thousands = token_count as f64 / 1000.0;
    let input_cost = thousands * input_price_per_k;
    let output_cost = output_price_per_k.map_or(0.0, |price| thousands * price);
    TokenCost {
        token_count,
        input_cost,
        output_cost,
        total_cost: input_cost + output_cost,
    }
}
