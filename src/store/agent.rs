use super::{Store, StoreError};
use crate::types::{AgentDecision, DailyStats, DecisionKind};
use chrono::{TimeZone, Utc};

impl Store {
    pub async fn insert_agent_decision(&self, d: &AgentDecision) -> Result<i64, StoreError> {
        let reasons = serde_json::to_string(&d.reasons)?;
        let id = sqlx::query(
            r#"INSERT INTO agent_decisions (token_mint, decision, confidence, reasons, unique_wallets,
                amount_native, executed, trade_id, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&d.token_mint)
        .bind(decision_str(d.decision))
        .bind(d.confidence)
        .bind(reasons)
        .bind(d.unique_wallets as i64)
        .bind(d.amount_native)
        .bind(d.executed)
        .bind(d.trade_id)
        .bind(d.created_at.timestamp())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    /// Decisions in the last `window_secs`, used by the learning loop to
    /// join against realized PnL on closed positions.
    pub async fn recent_agent_decisions(&self, window_secs: i64) -> Result<Vec<AgentDecision>, StoreError> {
        let since = Utc::now().timestamp() - window_secs;
        let rows = sqlx::query_as::<_, DecisionRow>(
            "SELECT * FROM agent_decisions WHERE created_at >= ? ORDER BY created_at ASC",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// All executed buy decisions with a linked trade whose position has
    /// since closed, joined to the triggering wallet and realized PnL —
    /// the learning loop's input for both the confidence-bucket and
    /// per-wallet-trust analyses.
    pub async fn executed_decisions_with_wallet_and_pnl(&self) -> Result<Vec<(AgentDecision, Option<String>, f64)>, StoreError> {
        let rows: Vec<(DecisionRow, Option<String>, f64)> = sqlx::query_as(
            r#"SELECT ad.*, t.triggering_wallet, p.realized_pnl_native
               FROM agent_decisions ad
               JOIN trades t ON t.id = ad.trade_id
               JOIN positions p ON p.mint = t.token_mint AND p.status = 'closed'
               WHERE ad.executed = 1 AND ad.decision = 'buy'"#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(row, wallet, pnl)| Ok((row.try_into()?, wallet, pnl)))
            .collect()
    }

    /// Recomputes today's row from `trades` and `positions`; callable any
    /// number of times for the same day with the same result.
    pub async fn update_daily_stats(&self) -> Result<DailyStats, StoreError> {
        let day = Utc::now().date_naive().to_string();
        let start_of_day = Utc::now().date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp();

        let trades_executed: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM trades WHERE created_at >= ? AND status IN ('confirmed','dry_run')")
                .bind(start_of_day)
                .fetch_one(&self.pool)
                .await?;
        let positions_opened: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM positions WHERE opened_at >= ?")
            .bind(start_of_day)
            .fetch_one(&self.pool)
            .await?;
        let positions_closed: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM positions WHERE closed_at >= ?")
                .bind(start_of_day)
                .fetch_one(&self.pool)
                .await?;
        let realized_pnl: Option<f64> =
            sqlx::query_scalar("SELECT SUM(realized_pnl_native) FROM positions WHERE closed_at >= ?")
                .bind(start_of_day)
                .fetch_one(&self.pool)
                .await?;
        let best: Option<f64> =
            sqlx::query_scalar("SELECT MAX(realized_pnl_native) FROM positions WHERE closed_at >= ?")
                .bind(start_of_day)
                .fetch_one(&self.pool)
                .await?;
        let worst: Option<f64> =
            sqlx::query_scalar("SELECT MIN(realized_pnl_native) FROM positions WHERE closed_at >= ?")
                .bind(start_of_day)
                .fetch_one(&self.pool)
                .await?;

        let realized_pnl = realized_pnl.unwrap_or(0.0);
        let stats = DailyStats {
            trades_executed: trades_executed as u32,
            positions_opened: positions_opened as u32,
            positions_closed: positions_closed as u32,
            realized_pnl_native: realized_pnl,
            best_trade_native: best.unwrap_or(0.0),
            worst_trade_native: worst.unwrap_or(0.0),
            max_drawdown_native: worst.unwrap_or(0.0).abs(),
            hit_daily_loss_limit: false,
        };

        sqlx::query(
            r#"INSERT INTO daily_stats (day, trades_executed, positions_opened, positions_closed,
                realized_pnl_native, best_trade_native, worst_trade_native, max_drawdown_native, hit_daily_loss_limit)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(day) DO UPDATE SET
                trades_executed=excluded.trades_executed,
                positions_opened=excluded.positions_opened,
                positions_closed=excluded.positions_closed,
                realized_pnl_native=excluded.realized_pnl_native,
                best_trade_native=excluded.best_trade_native,
                worst_trade_native=excluded.worst_trade_native,
                max_drawdown_native=excluded.max_drawdown_native"#,
        )
        .bind(&day)
        .bind(stats.trades_executed as i64)
        .bind(stats.positions_opened as i64)
        .bind(stats.positions_closed as i64)
        .bind(stats.realized_pnl_native)
        .bind(stats.best_trade_native)
        .bind(stats.worst_trade_native)
        .bind(stats.max_drawdown_native)
        .bind(stats.hit_daily_loss_limit)
        .execute(&self.pool)
        .await?;

        Ok(stats)
    }
}

fn decision_str(d: DecisionKind) -> &'static str {
    match d {
        DecisionKind::Buy => "buy",
        DecisionKind::Skip => "skip",
        DecisionKind::Hold => "hold",
    }
}

#[derive(sqlx::FromRow)]
struct DecisionRow {
    id: i64,
    token_mint: String,
    decision: String,
    confidence: f64,
    reasons: String,
    unique_wallets: i64,
    amount_native: Option<f64>,
    executed: bool,
    trade_id: Option<i64>,
    created_at: i64,
}

impl TryFrom<DecisionRow> for AgentDecision {
    type Error = StoreError;

    fn try_from(r: DecisionRow) -> Result<Self, StoreError> {
        let decision = match r.decision.as_str() {
            "buy" => DecisionKind::Buy,
            "skip" => DecisionKind::Skip,
            "hold" => DecisionKind::Hold,
            other => return Err(StoreError::SchemaViolation(format!("unknown decision `{other}`"))),
        };
        Ok(AgentDecision {
            id: Some(r.id),
            token_mint: r.token_mint,
            decision,
            confidence: r.confidence,
            reasons: serde_json::from_str(&r.reasons)?,
            unique_wallets: r.unique_wallets as u32,
            amount_native: r.amount_native,
            executed: r.executed,
            trade_id: r.trade_id,
            created_at: Utc.timestamp_opt(r.created_at, 0).single().unwrap_or_else(Utc::now),
        })
    }
}
