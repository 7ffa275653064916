use super::{Store, StoreError};
use crate::types::{SafetyFlags, Token};
use chrono::Utc;

impl Store {
    /// Upsert on the `(mint)` unique key; re-running with the same row is
    /// equivalent to running it once (P7, discovery idempotence).
    pub async fn upsert_token(&self, token: &Token) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO tokens (mint, symbol, name, market_cap_usd, price_usd, volume_24h_usd,
                liquidity_usd, holder_count, price_multiplier, rug_ratio, wash_trading,
                bundler_rate, mint_authority_renounced, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(mint) DO UPDATE SET
                symbol = excluded.symbol,
                name = excluded.name,
                market_cap_usd = excluded.market_cap_usd,
                price_usd = excluded.price_usd,
                volume_24h_usd = excluded.volume_24h_usd,
                liquidity_usd = excluded.liquidity_usd,
                holder_count = excluded.holder_count,
                price_multiplier = excluded.price_multiplier,
                rug_ratio = excluded.rug_ratio,
                wash_trading = excluded.wash_trading,
                bundler_rate = excluded.bundler_rate,
                mint_authority_renounced = excluded.mint_authority_renounced,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&token.mint)
        .bind(&token.symbol)
        .bind(&token.name)
        .bind(token.market_cap_usd)
        .bind(token.price_usd)
        .bind(token.volume_24h_usd)
        .bind(token.liquidity_usd)
        .bind(token.holder_count as i64)
        .bind(token.price_multiplier)
        .bind(token.safety.rug_ratio)
        .bind(token.safety.wash_trading)
        .bind(token.safety.bundler_rate)
        .bind(token.safety.mint_authority_renounced)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn top_tokens(&self, limit: i64) -> Result<Vec<Token>, StoreError> {
        let rows = sqlx::query_as::<_, TokenRow>(
            "SELECT * FROM tokens ORDER BY price_multiplier DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[derive(sqlx::FromRow)]
struct TokenRow {
    mint: String,
    symbol: String,
    name: String,
    market_cap_usd: f64,
    price_usd: f64,
    volume_24h_usd: f64,
    liquidity_usd: f64,
    holder_count: i64,
    price_multiplier: f64,
    rug_ratio: f64,
    wash_trading: bool,
    bundler_rate: f64,
    mint_authority_renounced: bool,
}

impl From<TokenRow> for Token {
    fn from(r: TokenRow) -> Self {
        Token {
            mint: r.mint,
            symbol: r.symbol,
            name: r.name,
            market_cap_usd: r.market_cap_usd,
            price_usd: r.price_usd,
            volume_24h_usd: r.volume_24h_usd,
            liquidity_usd: r.liquidity_usd,
            holder_count: r.holder_count as u64,
            price_multiplier: r.price_multiplier,
            safety: SafetyFlags {
                rug_ratio: r.rug_ratio,
                wash_trading: r.wash_trading,
                bundler_rate: r.bundler_rate,
                mint_authority_renounced: r.mint_authority_renounced,
            },
        }
    }
}
