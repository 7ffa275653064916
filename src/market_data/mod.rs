/// Price, market-cap, liquidity, and holder-count lookups with declared
/// fallback ordering across providers, grounded in `momentum/dexscreener_client.rs`.
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub mint: String,
    pub symbol: String,
    pub name: String,
    pub price_usd: f64,
    pub market_cap_usd: f64,
    pub volume_24h_usd: f64,
    pub liquidity_usd: f64,
    pub holder_count: u64,
}

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn snapshot(&self, mint: &str) -> AppResult<Option<MarketSnapshot>>;
    /// Price samples over the lookback window, oldest first; used to
    /// derive `price_multiplier` when a provider doesn't report it directly.
    async fn price_history(&self, mint: &str, lookback_secs: u64) -> AppResult<Vec<f64>>;
}

#[async_trait]
pub trait MarketDataAdapter: Send + Sync {
    async fn snapshot(&self, mint: &str) -> AppResult<Option<MarketSnapshot>>;
    async fn price_history(&self, mint: &str, lookback_secs: u64) -> AppResult<Vec<f64>>;
}

/// Tries each configured provider in order, returning the first
/// non-empty response (spec §2's "fallback ordering across providers").
pub struct CompositeMarketDataAdapter {
    providers: Vec<Box<dyn MarketDataProvider>>,
}

impl CompositeMarketDataAdapter {
    pub fn new(providers: Vec<Box<dyn MarketDataProvider>>) -> Self {
        Self { providers }
    }
}

#[async_trait]
impl MarketDataAdapter for CompositeMarketDataAdapter {
    #[instrument(skip(self))]
    async fn snapshot(&self, mint: &str) -> AppResult<Option<MarketSnapshot>> {
        let mut last_err = None;
        for provider in &self.providers {
            match provider.snapshot(mint).await {
                Ok(Some(snap)) => return Ok(Some(snap)),
                Ok(None) => {
                    debug!(provider = provider.name(), mint, "no data, trying next provider");
                    continue;
                }
                Err(e) => {
                    warn!(provider = provider.name(), mint, error = %e, "provider failed, trying next");
                    last_err = Some(e);
                }
            }
        }
        match last_err {
            Some(e) if self.providers.len() == 1 => Err(e),
            _ => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn price_history(&self, mint: &str, lookback_secs: u64) -> AppResult<Vec<f64>> {
        for provider in &self.providers {
            match provider.price_history(mint, lookback_secs).await {
                Ok(samples) if !samples.is_empty() => return Ok(samples),
                Ok(_) => continue,
                Err(e) => {
                    warn!(provider = provider.name(), mint, error = %e, "price history provider failed");
                }
            }
        }
        Ok(Vec::new())
    }
}

#[derive(Debug, Deserialize)]
struct DexScreenerResponse {
    pairs: Option<Vec<DexScreenerPair>>,
}

#[derive(Debug, Deserialize)]
struct DexScreenerPair {
    #[serde(rename = "baseToken")]
    base_token: DexScreenerToken,
    #[serde(rename = "priceUsd")]
    price_usd: Option<String>,
    volume: DexScreenerVolume,
    liquidity: Option<DexScreenerLiquidity>,
    #[serde(rename = "marketCap")]
    market_cap: Option<f64>,
    #[serde(rename = "priceChange")]
    price_change: DexScreenerPriceChange,
}

#[derive(Debug, Deserialize)]
struct DexScreenerToken {
    address: String,
    name: String,
    symbol: String,
}

#[derive(Debug, Deserialize)]
struct DexScreenerVolume {
    h24: f64,
}

#[derive(Debug, Deserialize)]
struct DexScreenerLiquidity {
    usd: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DexScreenerPriceChange {
    h24: Option<f64>,
}

pub struct DexScreenerProvider {
    http: reqwest::Client,
    base_url: String,
}

impl DexScreenerProvider {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client builds with a static timeout"),
            base_url: "https://api.dexscreener.com/latest/dex/tokens".to_string(),
        }
    }

    async fn fetch_pair(&self, mint: &str) -> AppResult<Option<DexScreenerPair>> {
        let url = format!("{}/{}", self.base_url, mint);
        let resp = self.http.get(&url).send().await.map_err(|e| AppError::ProviderUnavailable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(AppError::ProviderRejection(format!("dexscreener returned {}", resp.status())));
        }
        let data: DexScreenerResponse = resp.json().await.map_err(|e| AppError::ProviderUnavailable(e.to_string()))?;
        Ok(data.pairs.and_then(|mut pairs| {
            pairs.sort_by(|a, b| {
                let la = a.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0);
                let lb = b.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0);
                lb.partial_cmp(&la).unwrap_or(std::cmp::Ordering::Equal)
            });
            pairs.into_iter().next()
        }))
    }
}

impl Default for DexScreenerProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketDataProvider for DexScreenerProvider {
    fn name(&self) -> &str {
        "dexscreener"
    }

    #[instrument(skip(self))]
    async fn snapshot(&self, mint: &str) -> AppResult<Option<MarketSnapshot>> {
        let Some(pair) = self.fetch_pair(mint).await? else {
            return Ok(None);
        };
        let price_usd = pair.price_usd.as_deref().and_then(|p| p.parse::<f64>().ok()).unwrap_or(0.0);
        Ok(Some(MarketSnapshot {
            mint: pair.base_token.address,
            symbol: pair.base_token.symbol,
            name: pair.base_token.name,
            price_usd,
            market_cap_usd: pair.market_cap.unwrap_or(0.0),
            volume_24h_usd: pair.volume.h24,
            liquidity_usd: pair.liquidity.and_then(|l| l.usd).unwrap_or(0.0),
            holder_count: 0,
        }))
    }

    /// DexScreener exposes only a 24h percentage change, not a full
    /// series; we synthesize a two-point series (min, current) so the
    /// discovery pipeline's `current / min` multiplier formula still holds.
    #[instrument(skip(self))]
    async fn price_history(&self, mint: &str, _lookback_secs: u64) -> AppResult<Vec<f64>> {
        let Some(pair) = self.fetch_pair(mint).await? else {
            return Ok(Vec::new());
        };
        let current = pair.price_usd.as_deref().and_then(|p| p.parse::<f64>().ok()).unwrap_or(0.0);
        if current <= 0.0 {
            return Ok(Vec::new());
        }
        let change_24h = pair.price_change.h24.unwrap_or(0.0);
        let past = current / (1.0 + change_24h / 100.0);
        Ok(vec![past.min(current), current])
    }
}
