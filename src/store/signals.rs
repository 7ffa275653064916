use super::{Store, StoreError};
use crate::types::{Signal, SignalType};
use chrono::{TimeZone, Utc};

impl Store {
    pub async fn insert_signal(&self, s: &Signal) -> Result<i64, StoreError> {
        let signal_type = signal_type_str(s.signal_type);
        let id = sqlx::query(
            r#"INSERT INTO signals (wallet_address, token_mint, signal_type, wallet_score_at_emission,
                confidence, executed, trade_id, skip_reason, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&s.wallet_address)
        .bind(&s.token_mint)
        .bind(signal_type)
        .bind(s.wallet_score_at_emission)
        .bind(s.confidence)
        .bind(s.executed)
        .bind(s.trade_id)
        .bind(&s.skip_reason)
        .bind(s.created_at.timestamp())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    pub async fn mark_signal_executed(&self, id: i64, trade_id: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE signals SET executed=1, trade_id=? WHERE id=?")
            .bind(trade_id)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_signal_skipped(&self, id: i64, reason: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE signals SET executed=0, skip_reason=? WHERE id=?")
            .bind(reason)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Signals within `window_secs` of now, used by the Brain's scan step.
    pub async fn recent_signals(&self, window_secs: i64) -> Result<Vec<Signal>, StoreError> {
        let since = Utc::now().timestamp() - window_secs;
        let rows = sqlx::query_as::<_, SignalRow>("SELECT * FROM signals WHERE created_at >= ? ORDER BY created_at ASC")
            .bind(since)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

fn signal_type_str(t: SignalType) -> &'static str {
    match t {
        SignalType::Buy => "buy",
        SignalType::Sell => "sell",
        SignalType::LargeBuy => "large_buy",
        SignalType::LargeSell => "large_sell",
    }
}

#[derive(sqlx::FromRow)]
struct SignalRow {
    id: i64,
    wallet_address: String,
    token_mint: String,
    signal_type: String,
    wallet_score_at_emission: f64,
    confidence: f64,
    executed: bool,
    trade_id: Option<i64>,
    skip_reason: Option<String>,
    created_at: i64,
}

impl TryFrom<SignalRow> for Signal {
    type Error = StoreError;

    fn try_from(r: SignalRow) -> Result<Self, StoreError> {
        let signal_type = match r.signal_type.as_str() {
            "buy" => SignalType::Buy,
            "sell" => SignalType::Sell,
            "large_buy" => SignalType::LargeBuy,
            "large_sell" => SignalType::LargeSell,
            other => return Err(StoreError::SchemaViolation(format!("unknown signal_type `{other}`"))),
        };
        Ok(Signal {
            id: Some(r.id),
            wallet_address: r.wallet_address,
            token_mint: r.token_mint,
            signal_type,
            wallet_score_at_emission: r.wallet_score_at_emission,
            confidence: r.confidence,
            executed: r.executed,
            trade_id: r.trade_id,
            skip_reason: r.skip_reason,
            created_at: Utc.timestamp_opt(r.created_at, 0).single().unwrap_or_else(Utc::now),
        })
    }
}
