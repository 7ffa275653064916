/// Swap aggregator integration, grounded in `strike/dex_client.rs`'s
/// Jupiter-style quote/swap client and `strike/wallet.rs`'s signing path.
use crate::chain::ChainAdapter;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solana_sdk::signature::Keypair;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanSell {
    Yes,
    No,
    Unknown,
}

impl CanSell {
    /// The core treats `unknown` as `yes`: a network hiccup must not
    /// block a trade whose risk is already bounded by position size.
    pub fn treat_as_sellable(self) -> bool {
        !matches!(self, CanSell::No)
    }
}

#[derive(Debug, Clone)]
pub struct Quote {
    pub out_amount: u64,
    pub price_impact_pct: f64,
    pub route_label: String,
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapOutcome {
    Confirmed,
    Failed,
    Timeout,
}

#[derive(Debug, Clone)]
pub struct SwapConfirmation {
    pub outcome: SwapOutcome,
    pub reason: Option<String>,
}

#[async_trait]
pub trait SwapAdapter: Send + Sync {
    async fn quote(
        &self,
        in_mint: &str,
        out_mint: &str,
        amount_atomic: u64,
        slippage_bps: u32,
    ) -> AppResult<Option<Quote>>;

    async fn execute(&self, quote: &Quote, signer: &Keypair) -> AppResult<String>;

    async fn confirm(&self, tx_handle: &str, timeout_secs: u64) -> AppResult<SwapConfirmation>;

    async fn can_sell(&self, mint: &str) -> CanSell;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JupiterQuoteResponse {
    out_amount: String,
    price_impact_pct: String,
    #[serde(default)]
    route_plan: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct JupiterSwapRequest<'a> {
    #[serde(rename = "quoteResponse")]
    quote_response: &'a serde_json::Value,
    #[serde(rename = "userPublicKey")]
    user_public_key: String,
    wrap_and_unwrap_sol: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JupiterSwapResponse {
    swap_transaction: String,
}

/// Probe amount used for the honeypot check: small enough to risk
/// nothing, large enough to clear most AMMs' minimum trade size.
const HONEYPOT_PROBE_LAMPORTS: u64 = 1_000_000;

pub struct JupiterSwapAdapter {
    http: reqwest::Client,
    aggregator_base_url: String,
    chain: Arc<dyn ChainAdapter>,
}

impl JupiterSwapAdapter {
    pub fn new(aggregator_base_url: &str, chain: Arc<dyn ChainAdapter>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .expect("reqwest client builds with a static timeout"),
            aggregator_base_url: aggregator_base_url.to_string(),
            chain,
        }
    }
}

#[async_trait]
impl SwapAdapter for JupiterSwapAdapter {
    #[instrument(skip(self))]
    async fn quote(
        &self,
        in_mint: &str,
        out_mint: &str,
        amount_atomic: u64,
        slippage_bps: u32,
    ) -> AppResult<Option<Quote>> {
        let url = format!("{}/quote", self.aggregator_base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("inputMint", in_mint),
                ("outputMint", out_mint),
                ("amount", &amount_atomic.to_string()),
                ("slippageBps", &slippage_bps.to_string()),
            ])
            .send()
            .await
            .map_err(|e| AppError::ProviderUnavailable(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(AppError::ProviderRejection(format!("quote rejected: {}", resp.status())));
        }

        let raw: serde_json::Value = resp.json().await.map_err(|e| AppError::ProviderUnavailable(e.to_string()))?;
        let parsed: JupiterQuoteResponse =
            serde_json::from_value(raw.clone()).map_err(|e| AppError::ProviderRejection(e.to_string()))?;

        let out_amount = parsed.out_amount.parse::<u64>().unwrap_or(0);
        if out_amount == 0 {
            return Ok(None);
        }
        let price_impact_pct = parsed.price_impact_pct.parse::<f64>().unwrap_or(0.0);
        let route_label = parsed
            .route_plan
            .first()
            .and_then(|s| s.get("swapInfo"))
            .and_then(|s| s.get("label"))
            .and_then(|l| l.as_str())
            .unwrap_or("unknown")
            .to_string();

        Ok(Some(Quote { out_amount, price_impact_pct, route_label, raw }))
    }

    #[instrument(skip(self, quote, signer))]
    async fn execute(&self, quote: &Quote, signer: &Keypair) -> AppResult<String> {
        use solana_sdk::signer::Signer as _;

        let url = format!("{}/swap", self.aggregator_base_url);
        let body = JupiterSwapRequest {
            quote_response: &quote.raw,
            user_public_key: signer.pubkey().to_string(),
            wrap_and_unwrap_sol: true,
        };
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ProviderUnavailable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(AppError::ProviderRejection(format!("swap build rejected: {}", resp.status())));
        }
        let swap: JupiterSwapResponse = resp.json().await.map_err(|e| AppError::ProviderUnavailable(e.to_string()))?;

        let tx_bytes = base64_decode(&swap.swap_transaction)?;
        let mut tx: solana_sdk::transaction::VersionedTransaction =
            bincode::deserialize(&tx_bytes).map_err(|e| AppError::ProviderRejection(e.to_string()))?;
        if let solana_sdk::transaction::VersionedMessage::Legacy(ref msg) = tx.message {
            let mut legacy_tx = solana_sdk::transaction::Transaction {
                signatures: tx.signatures.clone(),
                message: msg.clone(),
            };
            legacy_tx.partial_sign(&[signer], msg.recent_blockhash);
            tx.signatures = legacy_tx.signatures;
        }

        let raw = bincode::serialize(&tx).map_err(|e| AppError::ProviderRejection(e.to_string()))?;
        self.chain.submit_signed(&raw).await
    }

    #[instrument(skip(self))]
    async fn confirm(&self, tx_handle: &str, timeout_secs: u64) -> AppResult<SwapConfirmation> {
        let result = self.chain.confirm(tx_handle, timeout_secs).await?;
        let (outcome, reason) = match result.outcome {
            crate::chain::TxOutcome::Confirmed => (SwapOutcome::Confirmed, None),
            crate::chain::TxOutcome::Failed => (SwapOutcome::Failed, result.reason),
            crate::chain::TxOutcome::Timeout => (SwapOutcome::Timeout, None),
        };
        Ok(SwapConfirmation { outcome, reason })
    }

    #[instrument(skip(self))]
    async fn can_sell(&self, mint: &str) -> CanSell {
        let wrapped_sol = "So11111111111111111111111111111111111111112";
        match self.quote(mint, wrapped_sol, HONEYPOT_PROBE_LAMPORTS, 500).await {
            Ok(Some(_)) => CanSell::Yes,
            Ok(None) => CanSell::No,
            Err(AppError::ProviderRejection(reason)) => {
                debug!(mint, reason, "sell probe rejected by aggregator, treating as honeypot");
                CanSell::No
            }
            Err(e) => {
                warn!(mint, error = %e, "sell probe unreachable, treating as unknown");
                CanSell::Unknown
            }
        }
    }
}

fn base64_decode(s: &str) -> AppResult<Vec<u8>> {
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD
        .decode(s)
        .map_err(|e| AppError::ProviderRejection(e.to_string()))
}
