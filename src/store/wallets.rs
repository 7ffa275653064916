use super::{Store, StoreError};
use crate::types::{Wallet, WalletEnrichment, WalletSource, WalletStats, WalletSubScores, WalletTokenTrade};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;

impl Store {
    /// Merge semantics: insert if new, else overwrite fields. Re-running
    /// with the same row is a no-op on the resulting state.
    pub async fn upsert_wallet(&self, w: &Wallet) -> Result<(), StoreError> {
        let tags = serde_json::to_string(&w.tags)?;
        sqlx::query(
            r#"
            INSERT INTO wallets (address, pnl_score, win_rate_score, timing_score, consistency_score,
                total_pnl_native, total_trades, winning_trades, avg_entry_rank, unique_winning_tokens,
                profit_30d_usd, sol_balance, win_rate, buys_30d, sells_30d, tags,
                is_flagged, flag_reason, is_monitored, source, first_seen_at, last_active_at, score_updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(address) DO UPDATE SET
                pnl_score = excluded.pnl_score,
                win_rate_score = excluded.win_rate_score,
                timing_score = excluded.timing_score,
                consistency_score = excluded.consistency_score,
                total_pnl_native = excluded.total_pnl_native,
                total_trades = excluded.total_trades,
                winning_trades = excluded.winning_trades,
                avg_entry_rank = excluded.avg_entry_rank,
                unique_winning_tokens = excluded.unique_winning_tokens,
                profit_30d_usd = excluded.profit_30d_usd,
                sol_balance = excluded.sol_balance,
                win_rate = excluded.win_rate,
                buys_30d = excluded.buys_30d,
                sells_30d = excluded.sells_30d,
                tags = excluded.tags,
                is_flagged = excluded.is_flagged,
                flag_reason = excluded.flag_reason,
                is_monitored = excluded.is_monitored,
                last_active_at = excluded.last_active_at,
                score_updated_at = excluded.score_updated_at
            "#,
        )
        .bind(&w.address)
        .bind(w.scores.pnl_score)
        .bind(w.scores.win_rate_score)
        .bind(w.scores.timing_score)
        .bind(w.scores.consistency_score)
        .bind(w.stats.total_pnl_native)
        .bind(w.stats.total_trades as i64)
        .bind(w.stats.winning_trades as i64)
        .bind(w.stats.avg_entry_rank)
        .bind(w.stats.unique_winning_tokens as i64)
        .bind(w.enrichment.profit_30d_usd)
        .bind(w.enrichment.sol_balance)
        .bind(w.enrichment.win_rate)
        .bind(w.enrichment.buys_30d as i64)
        .bind(w.enrichment.sells_30d as i64)
        .bind(tags)
        .bind(w.is_flagged)
        .bind(&w.flag_reason)
        .bind(w.is_monitored)
        .bind(w.source.to_string())
        .bind(w.first_seen_at.timestamp())
        .bind(w.last_active_at.timestamp())
        .bind(w.score_updated_at.timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_wallet_score(&self, address: &str, scores: WalletSubScores) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE wallets SET pnl_score=?, win_rate_score=?, timing_score=?, consistency_score=?, score_updated_at=? WHERE address=?",
        )
        .bind(scores.pnl_score)
        .bind(scores.win_rate_score)
        .bind(scores.timing_score)
        .bind(scores.consistency_score)
        .bind(Utc::now().timestamp())
        .bind(address)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_wallet_monitored(&self, address: &str, monitored: bool) -> Result<(), StoreError> {
        sqlx::query("UPDATE wallets SET is_monitored=? WHERE address=?")
            .bind(monitored)
            .bind(address)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn top_wallets(&self, limit: i64, only_monitored: bool) -> Result<Vec<Wallet>, StoreError> {
        let rows = if only_monitored {
            sqlx::query_as::<_, WalletRow>(
                "SELECT * FROM wallets WHERE is_monitored=1 ORDER BY (pnl_score+win_rate_score+timing_score+consistency_score) DESC LIMIT ?",
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, WalletRow>(
                "SELECT * FROM wallets ORDER BY (pnl_score+win_rate_score+timing_score+consistency_score) DESC LIMIT ?",
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        };
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn monitored_wallets(&self) -> Result<Vec<Wallet>, StoreError> {
        let rows = sqlx::query_as::<_, WalletRow>("SELECT * FROM wallets WHERE is_monitored=1")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn get_wallet(&self, address: &str) -> Result<Option<Wallet>, StoreError> {
        let row = sqlx::query_as::<_, WalletRow>("SELECT * FROM wallets WHERE address=?")
            .bind(address)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    pub async fn all_wallets(&self) -> Result<Vec<Wallet>, StoreError> {
        let rows = sqlx::query_as::<_, WalletRow>("SELECT * FROM wallets").fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Cursor for the Monitor's incremental signature polling; `None`
    /// until the wallet has been polled once.
    pub async fn get_last_seen_signature(&self, address: &str) -> Result<Option<String>, StoreError> {
        let row: Option<(Option<String>,)> = sqlx::query_as("SELECT last_seen_signature FROM wallets WHERE address=?")
            .bind(address)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.and_then(|(sig,)| sig))
    }

    pub async fn set_last_seen_signature(&self, address: &str, signature: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE wallets SET last_seen_signature=? WHERE address=?")
            .bind(signature)
            .bind(address)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_wallet_token_trade(&self, t: &WalletTokenTrade) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO wallet_token_trades
            (wallet_address, token_mint, buy_amount_native, sell_amount_native, pnl_native,
             buy_price_usd, sell_price_usd, entry_rank, first_buy_at, last_sell_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&t.wallet_address)
        .bind(&t.token_mint)
        .bind(t.buy_amount_native)
        .bind(t.sell_amount_native)
        .bind(t.pnl_native)
        .bind(t.buy_price_usd)
        .bind(t.sell_price_usd)
        .bind(t.entry_rank as i64)
        .bind(t.first_buy_at.timestamp())
        .bind(t.last_sell_at.map(|d| d.timestamp()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_wallet_token_trades_for_wallet(&self, address: &str) -> Result<Vec<WalletTokenTrade>, StoreError> {
        let rows = sqlx::query_as::<_, TradeRow>("SELECT * FROM wallet_token_trades WHERE wallet_address=?")
            .bind(address)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Clears the monitored wallet set entirely. Used by the CLI's
    /// `--wipe-wallets` flag before a fresh import.
    pub async fn wipe_wallets(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM wallets").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// `{address -> realized+unrealized native}` across open and closed
    /// positions the wallet's signals triggered.
    pub async fn copy_performance_by_wallet(&self) -> Result<HashMap<String, f64>, StoreError> {
        let rows: Vec<(String, f64, f64)> = sqlx::query_as(
            r#"SELECT triggering_wallet, COALESCE(SUM(realized_pnl_native),0), COALESCE(SUM(unrealized_pnl_native),0)
               FROM positions WHERE triggering_wallet IS NOT NULL GROUP BY triggering_wallet"#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(addr, r, u)| (addr, r + u)).collect())
    }
}

#[derive(sqlx::FromRow)]
struct WalletRow {
    address: String,
    pnl_score: f64,
    win_rate_score: f64,
    timing_score: f64,
    consistency_score: f64,
    total_pnl_native: f64,
    total_trades: i64,
    winning_trades: i64,
    avg_entry_rank: f64,
    unique_winning_tokens: i64,
    profit_30d_usd: f64,
    sol_balance: f64,
    win_rate: Option<f64>,
    buys_30d: i64,
    sells_30d: i64,
    tags: String,
    is_flagged: bool,
    flag_reason: Option<String>,
    is_monitored: bool,
    source: String,
    first_seen_at: i64,
    last_active_at: i64,
    score_updated_at: i64,
}

impl TryFrom<WalletRow> for Wallet {
    type Error = StoreError;

    fn try_from(r: WalletRow) -> Result<Self, StoreError> {
        let source = match r.source.as_str() {
            "manual" => WalletSource::Manual,
            "gmgn" => WalletSource::Gmgn,
            "fomo" => WalletSource::Fomo,
            "cluster" => WalletSource::Cluster,
            other => return Err(StoreError::SchemaViolation(format!("unknown wallet source `{other}`"))),
        };
        Ok(Wallet {
            address: r.address,
            scores: WalletSubScores {
                pnl_score: r.pnl_score,
                win_rate_score: r.win_rate_score,
                timing_score: r.timing_score,
                consistency_score: r.consistency_score,
            },
            stats: WalletStats {
                total_pnl_native: r.total_pnl_native,
                total_trades: r.total_trades as u32,
                winning_trades: r.winning_trades as u32,
                avg_entry_rank: r.avg_entry_rank,
                unique_winning_tokens: r.unique_winning_tokens as u32,
            },
            enrichment: WalletEnrichment {
                profit_30d_usd: r.profit_30d_usd,
                sol_balance: r.sol_balance,
                win_rate: r.win_rate,
                buys_30d: r.buys_30d as u32,
                sells_30d: r.sells_30d as u32,
            },
            tags: serde_json::from_str(&r.tags).unwrap_or_default(),
            is_flagged: r.is_flagged,
            flag_reason: r.flag_reason,
            is_monitored: r.is_monitored,
            source,
            first_seen_at: from_ts(r.first_seen_at),
            last_active_at: from_ts(r.last_active_at),
            score_updated_at: from_ts(r.score_updated_at),
        })
    }
}

#[derive(sqlx::FromRow)]
struct TradeRow {
    wallet_address: String,
    token_mint: String,
    buy_amount_native: f64,
    sell_amount_native: f64,
    pnl_native: f64,
    buy_price_usd: f64,
    sell_price_usd: f64,
    entry_rank: i64,
    first_buy_at: i64,
    last_sell_at: Option<i64>,
}

impl From<TradeRow> for WalletTokenTrade {
    fn from(r: TradeRow) -> Self {
        WalletTokenTrade {
            wallet_address: r.wallet_address,
            token_mint: r.token_mint,
            buy_amount_native: r.buy_amount_native,
            sell_amount_native: r.sell_amount_native,
            pnl_native: r.pnl_native,
            buy_price_usd: r.buy_price_usd,
            sell_price_usd: r.sell_price_usd,
            entry_rank: r.entry_rank as u32,
            first_buy_at: from_ts(r.first_buy_at),
            last_sell_at: r.last_sell_at.map(from_ts),
        }
    }
}

fn from_ts(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).single().unwrap_or_else(Utc::now)
}
