use super::{Store, StoreError};
use crate::types::{Trade, TradeSide, TradeStatus};
use chrono::{TimeZone, Utc};

impl Store {
    pub async fn insert_trade(&self, t: &Trade) -> Result<i64, StoreError> {
        let id = sqlx::query(
            r#"INSERT INTO trades (token_mint, side, amount_native, amount_tokens, price_usd,
                triggering_wallet, signal_id, sell_reason, tx_handle, status, slippage_bps,
                priority_fee_native, error_message, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&t.token_mint)
        .bind(side_str(t.side))
        .bind(t.amount_native)
        .bind(t.amount_tokens)
        .bind(t.price_usd)
        .bind(&t.triggering_wallet)
        .bind(t.signal_id)
        .bind(&t.sell_reason)
        .bind(&t.tx_handle)
        .bind(status_str(t.status))
        .bind(t.slippage_bps)
        .bind(t.priority_fee_native)
        .bind(&t.error_message)
        .bind(t.created_at.timestamp())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    pub async fn update_trade_status(
        &self,
        id: i64,
        status: TradeStatus,
        tx_handle: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE trades SET status=?, tx_handle=COALESCE(?, tx_handle), error_message=? WHERE id=?")
            .bind(status_str(status))
            .bind(tx_handle)
            .bind(error_message)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn todays_trades(&self) -> Result<Vec<Trade>, StoreError> {
        let start_of_day = Utc::now().date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp();
        let rows = sqlx::query_as::<_, TradeRow>("SELECT * FROM trades WHERE created_at >= ?")
            .bind(start_of_day)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn todays_pnl(&self) -> Result<f64, StoreError> {
        let start_of_day = Utc::now().date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp();
        let pnl: Option<f64> = sqlx::query_scalar(
            "SELECT SUM(realized_pnl_native) FROM positions WHERE closed_at >= ?",
        )
        .bind(start_of_day)
        .fetch_one(&self.pool)
        .await?;
        Ok(pnl.unwrap_or(0.0))
    }
}

fn side_str(s: TradeSide) -> &'static str {
    match s {
        TradeSide::Buy => "buy",
        TradeSide::Sell => "sell",
    }
}

fn status_str(s: TradeStatus) -> &'static str {
    match s {
        TradeStatus::Pending => "pending",
        TradeStatus::Confirmed => "confirmed",
        TradeStatus::Unconfirmed => "unconfirmed",
        TradeStatus::Failed => "failed",
        TradeStatus::DryRun => "dry_run",
    }
}

#[derive(sqlx::FromRow)]
struct TradeRow {
    id: i64,
    token_mint: String,
    side: String,
    amount_native: f64,
    amount_tokens: f64,
    price_usd: f64,
    triggering_wallet: Option<String>,
    signal_id: Option<i64>,
    sell_reason: Option<String>,
    tx_handle: Option<String>,
    status: String,
    slippage_bps: Option<i64>,
    priority_fee_native: Option<f64>,
    error_message: Option<String>,
    created_at: i64,
}

impl TryFrom<TradeRow> for Trade {
    type Error = StoreError;

    fn try_from(r: TradeRow) -> Result<Self, StoreError> {
        let side = match r.side.as_str() {
            "buy" => TradeSide::Buy,
            "sell" => TradeSide::Sell,
            other => return Err(StoreError::SchemaViolation(format!("unknown trade side `{other}`"))),
        };
        let status = match r.status.as_str() {
            "pending" => TradeStatus::Pending,
            "confirmed" => TradeStatus::Confirmed,
            "unconfirmed" => TradeStatus::Unconfirmed,
            "failed" => TradeStatus::Failed,
            "dry_run" => TradeStatus::DryRun,
            other => return Err(StoreError::SchemaViolation(format!("unknown trade status `{other}`"))),
        };
        Ok(Trade {
            id: Some(r.id),
            token_mint: r.token_mint,
            side,
            amount_native: r.amount_native,
            amount_tokens: r.amount_tokens,
            price_usd: r.price_usd,
            triggering_wallet: r.triggering_wallet,
            signal_id: r.signal_id,
            sell_reason: r.sell_reason,
            tx_handle: r.tx_handle,
            status,
            slippage_bps: r.slippage_bps.map(|v| v as u32),
            priority_fee_native: r.priority_fee_native,
            error_message: r.error_message,
            created_at: Utc.timestamp_opt(r.created_at, 0).single().unwrap_or_else(Utc::now),
        })
    }
}
