/// Additive, idempotent schema migrations.
///
/// Mirrors `database/migrations.rs`'s numbered-migration-list design
/// (spec §9 REDESIGN FLAGS: "persistent schema evolution via ad-hoc
/// ALTERs" becomes a codified migration list). Each migration is a
/// plain `CREATE TABLE IF NOT EXISTS` / `ALTER TABLE ... ADD COLUMN`
/// statement; columns are only ever added, never dropped, and existing
/// data is preserved. The runner refuses to start if the database's
/// recorded schema version is ahead of what this binary knows about.
use sqlx::SqlitePool;

pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub sql: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: r#"
            CREATE TABLE IF NOT EXISTS tokens (
                mint TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                name TEXT NOT NULL,
                market_cap_usd REAL NOT NULL,
                price_usd REAL NOT NULL,
                volume_24h_usd REAL NOT NULL,
                liquidity_usd REAL NOT NULL,
                holder_count INTEGER NOT NULL,
                price_multiplier REAL NOT NULL,
                rug_ratio REAL NOT NULL DEFAULT 0,
                wash_trading INTEGER NOT NULL DEFAULT 0,
                bundler_rate REAL NOT NULL DEFAULT 0,
                mint_authority_renounced INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS wallets (
                address TEXT PRIMARY KEY,
                pnl_score REAL NOT NULL DEFAULT 0,
                win_rate_score REAL NOT NULL DEFAULT 0,
                timing_score REAL NOT NULL DEFAULT 0,
                consistency_score REAL NOT NULL DEFAULT 0,
                total_pnl_native REAL NOT NULL DEFAULT 0,
                total_trades INTEGER NOT NULL DEFAULT 0,
                winning_trades INTEGER NOT NULL DEFAULT 0,
                avg_entry_rank REAL NOT NULL DEFAULT 500,
                unique_winning_tokens INTEGER NOT NULL DEFAULT 0,
                profit_30d_usd REAL NOT NULL DEFAULT 0,
                sol_balance REAL NOT NULL DEFAULT 0,
                win_rate REAL,
                buys_30d INTEGER NOT NULL DEFAULT 0,
                sells_30d INTEGER NOT NULL DEFAULT 0,
                tags TEXT NOT NULL DEFAULT '[]',
                is_flagged INTEGER NOT NULL DEFAULT 0,
                flag_reason TEXT,
                is_monitored INTEGER NOT NULL DEFAULT 0,
                source TEXT NOT NULL DEFAULT 'manual',
                first_seen_at INTEGER NOT NULL,
                last_active_at INTEGER NOT NULL,
                score_updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS wallet_token_trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                wallet_address TEXT NOT NULL,
                token_mint TEXT NOT NULL,
                buy_amount_native REAL NOT NULL DEFAULT 0,
                sell_amount_native REAL NOT NULL DEFAULT 0,
                pnl_native REAL NOT NULL DEFAULT 0,
                buy_price_usd REAL NOT NULL DEFAULT 0,
                sell_price_usd REAL NOT NULL DEFAULT 0,
                entry_rank INTEGER NOT NULL DEFAULT 500,
                first_buy_at INTEGER NOT NULL,
                last_sell_at INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_wtt_wallet ON wallet_token_trades(wallet_address);
            CREATE INDEX IF NOT EXISTS idx_wtt_token ON wallet_token_trades(token_mint);

            CREATE TABLE IF NOT EXISTS signals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                wallet_address TEXT NOT NULL,
                token_mint TEXT NOT NULL,
                signal_type TEXT NOT NULL,
                wallet_score_at_emission REAL NOT NULL,
                confidence REAL NOT NULL,
                executed INTEGER NOT NULL DEFAULT 0,
                trade_id INTEGER,
                skip_reason TEXT,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_signals_token ON signals(token_mint);
            CREATE INDEX IF NOT EXISTS idx_signals_created ON signals(created_at);

            CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                token_mint TEXT NOT NULL,
                side TEXT NOT NULL,
                amount_native REAL NOT NULL,
                amount_tokens REAL NOT NULL DEFAULT 0,
                price_usd REAL NOT NULL DEFAULT 0,
                triggering_wallet TEXT,
                signal_id INTEGER,
                sell_reason TEXT,
                tx_handle TEXT,
                status TEXT NOT NULL,
                slippage_bps INTEGER,
                priority_fee_native REAL,
                error_message TEXT,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_trades_created ON trades(created_at);

            CREATE TABLE IF NOT EXISTS positions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                mint TEXT NOT NULL,
                entry_price_usd REAL NOT NULL,
                current_price_usd REAL NOT NULL,
                invested_native REAL NOT NULL,
                tokens_held REAL NOT NULL,
                take_profit_ladder TEXT NOT NULL DEFAULT '[]',
                stop_loss_price_usd REAL NOT NULL,
                triggering_wallet TEXT,
                status TEXT NOT NULL,
                close_reason TEXT,
                realized_pnl_native REAL NOT NULL DEFAULT 0,
                unrealized_pnl_native REAL NOT NULL DEFAULT 0,
                source_type TEXT NOT NULL,
                opened_at INTEGER NOT NULL,
                closed_at INTEGER,
                last_checked_at INTEGER NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_positions_open_mint
                ON positions(mint) WHERE status = 'open';

            CREATE TABLE IF NOT EXISTS clusters (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                seed_wallet TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS cluster_members (
                cluster_id INTEGER NOT NULL,
                wallet_address TEXT NOT NULL,
                relationship_type TEXT NOT NULL,
                is_side_wallet INTEGER NOT NULL DEFAULT 0,
                confidence REAL NOT NULL,
                avg_lead_time_seconds REAL NOT NULL DEFAULT 0,
                evidence TEXT NOT NULL DEFAULT '{}',
                PRIMARY KEY (cluster_id, wallet_address)
            );

            CREATE TABLE IF NOT EXISTS agent_decisions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                token_mint TEXT NOT NULL,
                decision TEXT NOT NULL,
                confidence REAL NOT NULL,
                reasons TEXT NOT NULL DEFAULT '[]',
                unique_wallets INTEGER NOT NULL DEFAULT 0,
                amount_native REAL,
                executed INTEGER NOT NULL DEFAULT 0,
                trade_id INTEGER,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS daily_stats (
                day TEXT PRIMARY KEY,
                trades_executed INTEGER NOT NULL DEFAULT 0,
                positions_opened INTEGER NOT NULL DEFAULT 0,
                positions_closed INTEGER NOT NULL DEFAULT 0,
                realized_pnl_native REAL NOT NULL DEFAULT 0,
                best_trade_native REAL NOT NULL DEFAULT 0,
                worst_trade_native REAL NOT NULL DEFAULT 0,
                max_drawdown_native REAL NOT NULL DEFAULT 0,
                hit_daily_loss_limit INTEGER NOT NULL DEFAULT 0
            );
        "#,
    },
    Migration {
        version: 2,
        name: "wallet_enrichment_indexes",
        sql: r#"
            CREATE INDEX IF NOT EXISTS idx_wallets_monitored ON wallets(is_monitored);
            CREATE INDEX IF NOT EXISTS idx_wallets_score ON wallets(pnl_score, win_rate_score, timing_score, consistency_score);
        "#,
    },
    Migration {
        version: 3,
        name: "wallet_monitor_cursor",
        sql: r#"
            ALTER TABLE wallets ADD COLUMN last_seen_signature TEXT;
        "#,
    },
];

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (version INTEGER PRIMARY KEY, name TEXT NOT NULL, applied_at INTEGER NOT NULL)",
    )
    .execute(pool)
    .await?;

    let applied: Vec<i64> = sqlx::query_scalar("SELECT version FROM schema_migrations ORDER BY version")
        .fetch_all(pool)
        .await?;

    if let Some(&max_known) = MIGRATIONS.iter().map(|m| &m.version).max() {
        if let Some(&max_applied) = applied.iter().max() {
            if max_applied > max_known {
                panic!(
                    "database schema version {max_applied} is ahead of this binary's known migrations ({max_known}); refusing to start"
                );
            }
        }
    }

    for migration in MIGRATIONS {
        if applied.contains(&migration.version) {
            continue;
        }
        tracing::info!(version = migration.version, name = migration.name, "applying migration");
        sqlx::raw_sql(migration.sql).execute(pool).await?;
        sqlx::query("INSERT INTO schema_migrations (version, name, applied_at) VALUES (?, ?, strftime('%s','now'))")
            .bind(migration.version)
            .bind(migration.name)
            .execute(pool)
            .await?;
    }

    Ok(())
}
