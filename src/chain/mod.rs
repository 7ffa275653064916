/// On-chain read/write access, grounded in this codebase's
/// `stalker/monitor.rs` polling loop and `strike/wallet.rs` signing path,
/// generalized behind a trait so the pipeline components never touch
/// `solana-client` directly.
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use solana_client::client_error::ClientErrorKind;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_client::GetConfirmedSignaturesForAddress2Config;
use solana_client::rpc_request::TokenAccountsFilter;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_transaction_status::option_serializer::OptionSerializer;
use solana_transaction_status::{
    EncodedTransaction, UiMessage, UiTransactionEncoding, UiTransactionTokenBalance,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    Confirmed,
    Failed,
    Timeout,
}

#[derive(Debug, Clone)]
pub struct ConfirmResult {
    pub outcome: TxOutcome,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureInfo {
    pub signature: String,
    pub slot: u64,
    pub err: Option<String>,
    pub block_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenTransfer {
    pub mint: String,
    pub from: String,
    pub to: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeTransfer {
    pub from: String,
    pub to: String,
    pub lamports: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedTransaction {
    pub signature: String,
    pub tx_type: String,
    pub fee_payer: String,
    pub timestamp: DateTime<Utc>,
    pub token_transfers: Vec<TokenTransfer>,
    pub native_transfers: Vec<NativeTransfer>,
    pub instruction_descriptions: Vec<String>,
    pub err: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenAccount {
    pub pubkey: String,
    pub mint: String,
    pub owner: String,
    pub amount: u64,
    pub decimals: u8,
}

#[async_trait]
pub trait ChainAdapter: Send + Sync {
    async fn get_native_balance(&self, address: &str) -> AppResult<f64>;
    async fn list_signatures(
        &self,
        address: &str,
        limit: usize,
        before: Option<&str>,
    ) -> AppResult<Vec<SignatureInfo>>;
    async fn parse_transactions(&self, signatures: &[String]) -> AppResult<Vec<ParsedTransaction>>;
    async fn wallet_history(&self, address: &str, max: usize) -> AppResult<Vec<ParsedTransaction>>;
    async fn submit_signed(&self, raw_tx: &[u8]) -> AppResult<String>;
    async fn confirm(&self, handle: &str, timeout_secs: u64) -> AppResult<ConfirmResult>;
    async fn get_token_accounts(&self, owner: &str) -> AppResult<Vec<TokenAccount>>;
}

pub struct RpcChainAdapter {
    client: RpcClient,
    max_retries: u32,
    batch_size: usize,
    inter_batch_delay: Duration,
}

impl RpcChainAdapter {
    pub fn new(rpc_endpoint: &str, commitment: &str, max_retries: u32, batch_size: usize, inter_batch_delay_ms: u64) -> Self {
        let commitment = match commitment {
            "finalized" => CommitmentConfig::finalized(),
            "processed" => CommitmentConfig::processed(),
            _ => CommitmentConfig::confirmed(),
        };
        let client = RpcClient::new_with_commitment(rpc_endpoint.to_string(), commitment);
        Self {
            client,
            max_retries,
            batch_size: batch_size.min(100),
            inter_batch_delay: Duration::from_millis(inter_batch_delay_ms),
        }
    }

    /// Retries transient/429 failures with linear backoff up to `max_retries`.
    async fn with_retries<T, F, Fut>(&self, op: F) -> AppResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, solana_client::client_error::ClientError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if attempt < self.max_retries && is_transient(&e) => {
                    attempt += 1;
                    let backoff = Duration::from_millis(250 * attempt as u64);
                    warn!(attempt, error = %e, "transient RPC error, retrying");
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(AppError::ProviderUnavailable(e.to_string())),
            }
        }
    }

    fn parse_one(&self, signature: &str, tx: solana_transaction_status::EncodedConfirmedTransactionWithStatusMeta) -> ParsedTransaction {
        let block_time = tx
            .block_time
            .and_then(|t| Utc.timestamp_opt(t, 0).single())
            .unwrap_or_else(Utc::now);

        let mut fee_payer = String::new();
        let mut instruction_descriptions = Vec::new();
        let mut native_transfers = Vec::new();

        if let EncodedTransaction::Json(ui_tx) = &tx.transaction.transaction {
            if let UiMessage::Raw(msg) = &ui_tx.message {
                fee_payer = msg.account_keys.first().cloned().unwrap_or_default();
                for ix in &msg.instructions {
                    instruction_descriptions.push(format!("program#{}", ix.program_id_index));
                }
            }
        }

        let err = tx.transaction.meta.as_ref().and_then(|m| m.err.as_ref()).map(|e| format!("{e:?}"));

        if let Some(meta) = &tx.transaction.meta {
            let pre = meta.pre_balances.clone();
            let post = meta.post_balances.clone();
            if pre.len() == post.len() && !fee_payer.is_empty() {
                for (i, (before, after)) in pre.iter().zip(post.iter()).enumerate() {
                    if i == 0 {
                        continue;
                    }
                    if after > before {
                        native_transfers.push(NativeTransfer {
                            from: fee_payer.clone(),
                            to: format!("account#{i}"),
                            lamports: after - before,
                        });
                    }
                }
            }
        }

        let token_transfers = tx
            .transaction
            .meta
            .as_ref()
            .map(|meta| Self::diff_token_balances(&meta.pre_token_balances, &meta.post_token_balances))
            .unwrap_or_default();

        ParsedTransaction {
            signature: signature.to_string(),
            tx_type: "SWAP".to_string(),
            fee_payer,
            timestamp: block_time,
            token_transfers,
            native_transfers,
            instruction_descriptions,
            err,
        }
    }

    /// Owner-level token-balance deltas between pre/post state, surfaced
    /// as directed transfers (a positive delta is a transfer `to` that
    /// owner; the matching negative delta elsewhere is its `from`).
    fn diff_token_balances(
        pre: &OptionSerializer<Vec<UiTransactionTokenBalance>>,
        post: &OptionSerializer<Vec<UiTransactionTokenBalance>>,
    ) -> Vec<TokenTransfer> {
        let (OptionSerializer::Some(pre), OptionSerializer::Some(post)) = (pre, post) else {
            return Vec::new();
        };

        let mut pre_by_index: std::collections::HashMap<u8, &UiTransactionTokenBalance> = std::collections::HashMap::new();
        for b in pre {
            pre_by_index.insert(b.account_index, b);
        }

        let mut increases = Vec::new();
        let mut decreases = Vec::new();
        for b in post {
            let pre_amount = pre_by_index
                .get(&b.account_index)
                .and_then(|p| p.ui_token_amount.ui_amount)
                .unwrap_or(0.0);
            let post_amount = b.ui_token_amount.ui_amount.unwrap_or(0.0);
            let delta = post_amount - pre_amount;
            let OptionSerializer::Some(owner) = &b.owner else { continue };
            if delta > 0.0 {
                increases.push((b.mint.clone(), owner.clone(), delta));
            } else if delta < 0.0 {
                decreases.push((b.mint.clone(), owner.clone(), -delta));
            }
        }

        // Pair increases with decreases of the same mint, largest first;
        // this is an approximation when a transaction touches >2 holders
        // of the same mint (e.g. a multi-hop swap route).
        let mut transfers = Vec::new();
        for (mint, to, amount) in increases {
            if let Some(pos) = decreases.iter().position(|(m, _, _)| *m == mint) {
                let (_, from, _) = decreases.remove(pos);
                transfers.push(TokenTransfer { mint, from, to, amount });
            }
        }
        transfers
    }
}

fn is_transient(e: &solana_client::client_error::ClientError) -> bool {
    match e.kind() {
        ClientErrorKind::Reqwest(_) => true,
        ClientErrorKind::RpcError(_) => e.to_string().contains("429") || e.to_string().contains("rate limit"),
        _ => false,
    }
}

#[async_trait]
impl ChainAdapter for RpcChainAdapter {
    #[instrument(skip(self))]
    async fn get_native_balance(&self, address: &str) -> AppResult<f64> {
        let pubkey = Pubkey::from_str(address).map_err(|e| AppError::ConfigInvalid(e.to_string()))?;
        let lamports = self.with_retries(|| self.client.get_balance(&pubkey)).await?;
        Ok(lamports as f64 / 1_000_000_000.0)
    }

    #[instrument(skip(self))]
    async fn list_signatures(&self, address: &str, limit: usize, before: Option<&str>) -> AppResult<Vec<SignatureInfo>> {
        let pubkey = Pubkey::from_str(address).map_err(|e| AppError::ConfigInvalid(e.to_string()))?;
        let before_sig = before.map(|s| Signature::from_str(s)).transpose().map_err(|e| AppError::ConfigInvalid(e.to_string()))?;
        let config = GetConfirmedSignaturesForAddress2Config {
            before: before_sig,
            until: None,
            limit: Some(limit),
            commitment: Some(CommitmentConfig::confirmed()),
        };
        let sigs = self
            .with_retries(|| self.client.get_signatures_for_address_with_config(&pubkey, config.clone()))
            .await?;
        Ok(sigs
            .into_iter()
            .map(|s| SignatureInfo {
                signature: s.signature,
                slot: s.slot,
                err: s.err.map(|e| format!("{e:?}")),
                block_time: s.block_time.and_then(|t| Utc.timestamp_opt(t, 0).single()),
            })
            .collect())
    }

    #[instrument(skip(self, signatures))]
    async fn parse_transactions(&self, signatures: &[String]) -> AppResult<Vec<ParsedTransaction>> {
        let mut out = Vec::with_capacity(signatures.len());
        for chunk in signatures.chunks(self.batch_size) {
            for sig_str in chunk {
                let sig = Signature::from_str(sig_str).map_err(|e| AppError::ConfigInvalid(e.to_string()))?;
                let tx = self
                    .with_retries(|| {
                        self.client.get_transaction(&sig, UiTransactionEncoding::Json)
                    })
                    .await;
                match tx {
                    Ok(tx) => out.push(self.parse_one(sig_str, tx)),
                    Err(AppError::ProviderUnavailable(msg)) => {
                        debug!(signature = %sig_str, error = %msg, "transaction not found or unparseable, skipping");
                    }
                    Err(e) => return Err(e),
                }
            }
            if signatures.len() > self.batch_size {
                tokio::time::sleep(self.inter_batch_delay).await;
            }
        }
        Ok(out)
    }

    #[instrument(skip(self))]
    async fn wallet_history(&self, address: &str, max: usize) -> AppResult<Vec<ParsedTransaction>> {
        let mut collected = Vec::new();
        let mut before: Option<String> = None;
        while collected.len() < max {
            let page_limit = (max - collected.len()).min(100);
            let page = self.list_signatures(address, page_limit, before.as_deref()).await?;
            if page.is_empty() {
                break;
            }
            before = page.last().map(|s| s.signature.clone());
            let sigs: Vec<String> = page.into_iter().map(|s| s.signature).collect();
            let parsed = self.parse_transactions(&sigs).await?;
            let got_fewer_than_page = parsed.len() < page_limit;
            collected.extend(parsed);
            if got_fewer_than_page {
                break;
            }
        }
        collected.truncate(max);
        Ok(collected)
    }

    #[instrument(skip(self, raw_tx))]
    async fn submit_signed(&self, raw_tx: &[u8]) -> AppResult<String> {
        let tx: solana_sdk::transaction::VersionedTransaction =
            bincode::deserialize(raw_tx).map_err(|e| AppError::ConfigInvalid(e.to_string()))?;
        let config = solana_client::rpc_config::RpcSendTransactionConfig {
            skip_preflight: true,
            max_retries: Some(3),
            ..Default::default()
        };
        let sig = self
            .with_retries(|| self.client.send_transaction_with_config(&tx, config))
            .await?;
        Ok(sig.to_string())
    }

    #[instrument(skip(self))]
    async fn confirm(&self, handle: &str, timeout_secs: u64) -> AppResult<ConfirmResult> {
        let sig = Signature::from_str(handle).map_err(|e| AppError::ConfigInvalid(e.to_string()))?;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout_secs);
        loop {
            if tokio::time::Instant::now() >= deadline {
                return Ok(ConfirmResult { outcome: TxOutcome::Timeout, reason: None });
            }
            match self.client.get_signature_status(&sig).await {
                Ok(Some(Ok(()))) => return Ok(ConfirmResult { outcome: TxOutcome::Confirmed, reason: None }),
                Ok(Some(Err(e))) => {
                    return Ok(ConfirmResult { outcome: TxOutcome::Failed, reason: Some(e.to_string()) })
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "status poll failed, retrying until timeout"),
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    #[instrument(skip(self))]
    async fn get_token_accounts(&self, owner: &str) -> AppResult<Vec<TokenAccount>> {
        let pubkey = Pubkey::from_str(owner).map_err(|e| AppError::ConfigInvalid(e.to_string()))?;
        let accounts = self
            .with_retries(|| {
                self.client
                    .get_token_accounts_by_owner(&pubkey, TokenAccountsFilter::ProgramId(spl_token::id()))
            })
            .await?;

        let mut out = Vec::with_capacity(accounts.len());
        for acc in accounts {
            if let solana_account_decoder::UiAccountData::Json(parsed) = acc.account.data {
                if let Some(info) = parsed.parsed.get("info") {
                    let mint = info.get("mint").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                    let owner = info.get("owner").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                    let token_amount = info.get("tokenAmount");
                    let amount = token_amount
                        .and_then(|t| t.get("amount"))
                        .and_then(|v| v.as_str())
                        .and_then(|s| s.parse::<u64>().ok())
                        .unwrap_or(0);
                    let decimals = token_amount
                        .and_then(|t| t.get("decimals"))
                        .and_then(|v| v.as_u64())
                        .unwrap_or(0) as u8;
                    out.push(TokenAccount { pubkey: acc.pubkey, mint, owner, amount, decimals });
                }
            }
        }
        Ok(out)
    }
}
