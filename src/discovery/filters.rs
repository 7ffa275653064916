use crate::config::DiscoveryConfig;
use crate::types::Token;
use once_cell::sync::Lazy;
use regex::Regex;

static CLEAN_SYMBOL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9$. ]{1,15}$").unwrap());

/// `true` iff `symbol` passes the clean-symbol heuristic from spec §4.4
/// step 5: no interior spaces, no run of 3+ consonants, no 2+ digits
/// when the whole symbol is lowercase.
pub fn is_clean_symbol(symbol: &str) -> bool {
    if !CLEAN_SYMBOL.is_match(symbol) {
        return false;
    }
    let trimmed = symbol.trim();
    if trimmed.len() != symbol.len() {
        return false;
    }
    if symbol.trim().contains(' ') {
        return false;
    }

    let mut consonant_run = 0;
    for c in symbol.chars() {
        if c.is_ascii_alphabetic() && !"aeiouAEIOU".contains(c) {
            consonant_run += 1;
            if consonant_run >= 3 {
                return false;
            }
        } else {
            consonant_run = 0;
        }
    }

    if symbol.chars().any(|c| c.is_ascii_uppercase()) {
        return true;
    }
    let digit_count = symbol.chars().filter(|c| c.is_ascii_digit()).count();
    digit_count < 2
}

pub fn passes_filters(token: &Token, cfg: &DiscoveryConfig) -> bool {
    token.market_cap_usd >= cfg.min_market_cap_usd
        && token.market_cap_usd <= cfg.max_market_cap_usd
        && token.price_multiplier >= cfg.min_multiplier
        && token.liquidity_usd >= cfg.min_liquidity_usd
        && token.volume_24h_usd >= cfg.min_volume_24h_usd
        && token.liquidity_to_mcap_ratio() >= cfg.min_liquidity_to_mcap_ratio
        && token.holder_count >= cfg.min_holder_count
        && is_clean_symbol(&token.symbol)
        && token.passes_safety()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_interior_spaces() {
        assert!(!is_clean_symbol("FOO BAR"));
    }

    #[test]
    fn rejects_long_consonant_runs() {
        assert!(!is_clean_symbol("XQPR"));
    }

    #[test]
    fn rejects_multi_digit_lowercase() {
        assert!(!is_clean_symbol("abc12"));
    }

    #[test]
    fn accepts_normal_ticker() {
        assert!(is_clean_symbol("BONK"));
        assert!(is_clean_symbol("$WIF"));
    }

    #[test]
    fn single_digit_lowercase_is_fine() {
        assert!(is_clean_symbol("pepe2"));
    }
}
