/// Token discovery pipeline: gather, normalize, dedupe, enrich, filter,
/// persist. Grounded in `scout/scanner.rs`'s periodic-scan loop and
/// `scout/filter.rs`'s separate-filter-module shape.
mod filters;

use crate::config::DiscoveryConfig;
use crate::error::AppResult;
use crate::market_data::{MarketDataAdapter, MarketSnapshot};
use crate::store::Store;
use crate::types::Token;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

#[async_trait]
pub trait DiscoverySource: Send + Sync {
    fn name(&self) -> &str;
    async fn candidates(&self) -> AppResult<Vec<MarketSnapshot>>;
}

pub struct TokenDiscovery {
    sources: Vec<Box<dyn DiscoverySource>>,
    market_data: Arc<dyn MarketDataAdapter>,
    store: Store,
    config: DiscoveryConfig,
}

impl TokenDiscovery {
    pub fn new(
        sources: Vec<Box<dyn DiscoverySource>>,
        market_data: Arc<dyn MarketDataAdapter>,
        store: Store,
        config: DiscoveryConfig,
    ) -> Self {
        Self { sources, market_data, store, config }
    }

    #[instrument(skip(self))]
    pub async fn run_once(&self) -> AppResult<usize> {
        let mut by_mint: HashMap<String, MarketSnapshot> = HashMap::new();

        for source in &self.sources {
            match source.candidates().await {
                Ok(candidates) => {
                    debug!(source = source.name(), count = candidates.len(), "gathered candidates");
                    for c in candidates {
                        by_mint
                            .entry(c.mint.clone())
                            .and_modify(|existing| {
                                if c.market_cap_usd > existing.market_cap_usd {
                                    *existing = c.clone();
                                }
                            })
                            .or_insert(c);
                    }
                }
                Err(e) => warn!(source = source.name(), error = %e, "discovery source failed, continuing"),
            }
        }

        let mut tokens = Vec::with_capacity(by_mint.len());
        for (mint, snapshot) in by_mint {
            let price_multiplier = if self.config.enrich_price_multiplier {
                self.enrich_multiplier(&mint, snapshot.price_usd).await
            } else {
                1.0
            };

            let token = Token {
                mint: snapshot.mint,
                symbol: snapshot.symbol,
                name: snapshot.name,
                market_cap_usd: snapshot.market_cap_usd,
                price_usd: snapshot.price_usd,
                volume_24h_usd: snapshot.volume_24h_usd,
                liquidity_usd: snapshot.liquidity_usd,
                holder_count: snapshot.holder_count,
                price_multiplier,
                safety: Default::default(),
            };

            if filters::passes_filters(&token, &self.config) {
                tokens.push(token);
            }
        }

        tokens.sort_by(|a, b| b.price_multiplier.partial_cmp(&a.price_multiplier).unwrap_or(std::cmp::Ordering::Equal));

        for token in &tokens {
            self.store.upsert_token(token).await?;
        }

        info!(discovered = tokens.len(), "discovery pass complete");
        Ok(tokens.len())
    }

    async fn enrich_multiplier(&self, mint: &str, current_price: f64) -> f64 {
        if current_price <= 0.0 {
            return 1.0;
        }
        match self.market_data.price_history(mint, self.config.lookback_window_secs).await {
            Ok(samples) if !samples.is_empty() => {
                let min_price = samples.iter().cloned().fold(f64::INFINITY, f64::min);
                if min_price > 0.0 {
                    current_price / min_price
                } else {
                    1.0
                }
            }
            _ => 1.0,
        }
    }
}
