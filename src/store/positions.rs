use super::{Store, StoreError};
use crate::types::{Position, PositionStatus, SourceType, TakeProfitLevel};
use chrono::{TimeZone, Utc};

impl Store {
    /// Fails with `StoreError::SchemaViolation` if a position is already
    /// open on this mint — the unique partial index enforces P2 even
    /// under concurrent writers.
    pub async fn open_position(&self, p: &Position) -> Result<i64, StoreError> {
        let ladder = serde_json::to_string(&p.take_profit_ladder)?;
        let result = sqlx::query(
            r#"INSERT INTO positions (mint, entry_price_usd, current_price_usd, invested_native,
                tokens_held, take_profit_ladder, stop_loss_price_usd, triggering_wallet, status,
                close_reason, realized_pnl_native, unrealized_pnl_native, source_type, opened_at,
                closed_at, last_checked_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'open', NULL, 0, 0, ?, ?, NULL, ?)"#,
        )
        .bind(&p.mint)
        .bind(p.entry_price_usd)
        .bind(p.current_price_usd)
        .bind(p.invested_native)
        .bind(p.tokens_held)
        .bind(ladder)
        .bind(p.stop_loss_price_usd)
        .bind(&p.triggering_wallet)
        .bind(source_type_str(p.source_type))
        .bind(p.opened_at.timestamp())
        .bind(p.last_checked_at.timestamp())
        .execute(&self.pool)
        .await;

        match result {
            Ok(r) => Ok(r.last_insert_rowid()),
            Err(sqlx::Error::Database(e)) if e.message().contains("UNIQUE") => {
                Err(StoreError::SchemaViolation(format!("position already open for mint {}", p.mint)))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_open_positions(&self) -> Result<Vec<Position>, StoreError> {
        let rows = sqlx::query_as::<_, PositionRow>("SELECT * FROM positions WHERE status='open'")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn get_position_by_token(&self, mint: &str) -> Result<Option<Position>, StoreError> {
        let row = sqlx::query_as::<_, PositionRow>("SELECT * FROM positions WHERE mint=? AND status='open'")
            .bind(mint)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    /// No-op if the position is already closed (idempotence invariant).
    pub async fn close_position(&self, id: i64, reason: &str, realized_pnl: f64) -> Result<(), StoreError> {
        sqlx::query(
            r#"UPDATE positions SET status='closed', close_reason=?, realized_pnl_native=?, closed_at=?
               WHERE id=? AND status='open'"#,
        )
        .bind(reason)
        .bind(realized_pnl)
        .bind(Utc::now().timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_position_price(&self, id: i64, price_usd: f64, unrealized: f64) -> Result<(), StoreError> {
        sqlx::query("UPDATE positions SET current_price_usd=?, unrealized_pnl_native=?, last_checked_at=? WHERE id=?")
            .bind(price_usd)
            .bind(unrealized)
            .bind(Utc::now().timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Persists a partial sell: reduced `tokens_held` and the ladder with
    /// the triggering level's `hit` flag flipped. Position stays open.
    pub async fn record_partial_sell(
        &self,
        id: i64,
        remaining_tokens: f64,
        ladder: &[TakeProfitLevel],
    ) -> Result<(), StoreError> {
        let ladder_json = serde_json::to_string(ladder)?;
        sqlx::query("UPDATE positions SET tokens_held=?, take_profit_ladder=? WHERE id=? AND status='open'")
            .bind(remaining_tokens)
            .bind(ladder_json)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn source_type_str(s: SourceType) -> &'static str {
    match s {
        SourceType::Human => "human",
        SourceType::Bot => "bot",
        SourceType::Consensus => "consensus",
    }
}

#[derive(sqlx::FromRow)]
struct PositionRow {
    id: i64,
    mint: String,
    entry_price_usd: f64,
    current_price_usd: f64,
    invested_native: f64,
    tokens_held: f64,
    take_profit_ladder: String,
    stop_loss_price_usd: f64,
    triggering_wallet: Option<String>,
    status: String,
    close_reason: Option<String>,
    realized_pnl_native: f64,
    unrealized_pnl_native: f64,
    source_type: String,
    opened_at: i64,
    closed_at: Option<i64>,
    last_checked_at: i64,
}

impl TryFrom<PositionRow> for Position {
    type Error = StoreError;

    fn try_from(r: PositionRow) -> Result<Self, StoreError> {
        let status = match r.status.as_str() {
            "open" => PositionStatus::Open,
            "closed" => PositionStatus::Closed,
            other => return Err(StoreError::SchemaViolation(format!("unknown position status `{other}`"))),
        };
        let source_type = match r.source_type.as_str() {
            "human" => SourceType::Human,
            "bot" => SourceType::Bot,
            "consensus" => SourceType::Consensus,
            other => return Err(StoreError::SchemaViolation(format!("unknown source_type `{other}`"))),
        };
        Ok(Position {
            id: Some(r.id),
            mint: r.mint,
            entry_price_usd: r.entry_price_usd,
            current_price_usd: r.current_price_usd,
            invested_native: r.invested_native,
            tokens_held: r.tokens_held,
            take_profit_ladder: serde_json::from_str(&r.take_profit_ladder)?,
            stop_loss_price_usd: r.stop_loss_price_usd,
            triggering_wallet: r.triggering_wallet,
            status,
            close_reason: r.close_reason,
            realized_pnl_native: r.realized_pnl_native,
            unrealized_pnl_native: r.unrealized_pnl_native,
            source_type,
            opened_at: Utc.timestamp_opt(r.opened_at, 0).single().unwrap_or_else(Utc::now),
            closed_at: r.closed_at.and_then(|t| Utc.timestamp_opt(t, 0).single()),
            last_checked_at: Utc.timestamp_opt(r.last_checked_at, 0).single().unwrap_or_else(Utc::now),
        })
    }
}
