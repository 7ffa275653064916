use crate::error::AppError;
use crate::types::Mode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub mode: String,
    pub store: StoreConfig,
    pub chain: ChainConfig,
    pub swap: SwapConfig,
    pub market_data: MarketDataConfig,
    pub discovery: DiscoveryConfig,
    pub scoring: ScoringConfig,
    pub cluster: ClusterConfig,
    pub monitor: MonitorConfig,
    pub validator: ValidatorConfig,
    pub risk: RiskConfig,
    pub position: PositionConfig,
    pub brain: BrainConfig,
}

impl Config {
    pub fn load_from_file(path: &str) -> Result<Self, AppError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| AppError::ConfigInvalid(e.to_string()))
    }

    pub fn mode(&self) -> Result<Mode, AppError> {
        self.mode.parse()
    }

    /// Basic cross-field sanity checks (spec §7 `ConfigInvalid`).
    pub fn validate(&self) -> Result<(), AppError> {
        self.mode()?;
        if self.discovery.min_market_cap_usd > self.discovery.max_market_cap_usd {
            return Err(AppError::ConfigInvalid(
                "discovery.min_market_cap_usd must be <= max_market_cap_usd".into(),
            ));
        }
        if self.validator.min_copy_trade_mcap_usd > self.validator.max_copy_trade_mcap_usd {
            return Err(AppError::ConfigInvalid(
                "validator.min_copy_trade_mcap_usd must be <= max_copy_trade_mcap_usd".into(),
            ));
        }
        if self.risk.daily_loss_limit_native <= 0.0 {
            return Err(AppError::ConfigInvalid("risk.daily_loss_limit_native must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    pub database_path: String,
    pub strategy_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainConfig {
    pub rpc_endpoint: String,
    pub commitment: String,
    pub max_retries: u32,
    pub batch_size: usize,
    pub inter_batch_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SwapConfig {
    pub aggregator_base_url: String,
    pub default_slippage_bps: u32,
    pub confirm_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MarketDataConfig {
    /// Providers in fallback order; the first non-empty response wins.
    pub provider_order: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoveryConfig {
    pub sources: Vec<String>,
    pub min_market_cap_usd: f64,
    pub max_market_cap_usd: f64,
    pub min_multiplier: f64,
    pub min_liquidity_usd: f64,
    pub min_volume_24h_usd: f64,
    pub min_liquidity_to_mcap_ratio: f64,
    pub min_holder_count: u64,
    pub enrich_price_multiplier: bool,
    pub lookback_window_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScoringConfig {
    pub trade_count_cap: u32,
    pub sol_usd_reference_rate: f64,
    pub top_n_monitored: usize,
    pub bot_speed_trades_per_day: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClusterConfig {
    pub min_transfer_native: f64,
    pub funding_depth: u32,
    pub timing_lead_window_secs: i64,
    pub min_confidence: f64,
    pub max_cluster_monitored: usize,
    pub known_exchange_wallets: Vec<String>,
    pub stablecoin_mints: Vec<String>,
    pub wrapped_native_mint: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitorConfig {
    pub tick_interval_secs: u64,
    pub wallet_spacing_ms: u64,
    pub max_monitored_wallets: usize,
    pub dedup_cap: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ValidatorConfig {
    pub min_liquidity_usd: f64,
    pub min_copy_trade_mcap_usd: f64,
    pub max_copy_trade_mcap_usd: f64,
    pub consensus_window_secs: i64,
    pub consensus_multiplier: f64,
    pub bot_multiplier: f64,
    pub base_position_native: f64,
    pub max_position_size_native: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RiskConfig {
    pub daily_loss_limit_native: f64,
    pub max_open_positions: usize,
    pub per_token_cap_native: f64,
    pub balance_floor_native: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PositionConfig {
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrainConfig {
    pub cycle_interval_secs: u64,
    pub learn_interval_secs: u64,
    pub signal_window_secs: i64,
    pub min_closed_trades_to_learn: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: "dry_run".to_string(),
            store: StoreConfig {
                database_path: "data/badger.db".to_string(),
                strategy_path: "data/agent_strategy.json".to_string(),
            },
            chain: ChainConfig {
                rpc_endpoint: "https://api.mainnet-beta.solana.com".to_string(),
                commitment: "confirmed".to_string(),
                max_retries: 5,
                batch_size: 100,
                inter_batch_delay_ms: 200,
            },
            swap: SwapConfig {
                aggregator_base_url: "https://quote-api.jup.ag/v6".to_string(),
                default_slippage_bps: 300,
                confirm_timeout_secs: 30,
            },
            market_data: MarketDataConfig { provider_order: vec!["primary".into(), "secondary".into()] },
            discovery: DiscoveryConfig {
                sources: vec!["primary".into()],
                min_market_cap_usd: 50_000.0,
                max_market_cap_usd: 10_000_000.0,
                min_multiplier: 1.5,
                min_liquidity_usd: 10_000.0,
                min_volume_24h_usd: 5_000.0,
                min_liquidity_to_mcap_ratio: 0.005,
                min_holder_count: 50,
                enrich_price_multiplier: true,
                lookback_window_secs: 86_400,
            },
            scoring: ScoringConfig {
                trade_count_cap: 15_000,
                sol_usd_reference_rate: 150.0,
                top_n_monitored: 50,
                bot_speed_trades_per_day: 20.0,
            },
            cluster: ClusterConfig {
                min_transfer_native: 0.01,
                funding_depth: 2,
                timing_lead_window_secs: 1800,
                min_confidence: 0.3,
                max_cluster_monitored: 5,
                known_exchange_wallets: vec![
                    "5tzFkiKscjHb5gRMRhMkDw98JhxTFLYT7A3cCp1qhxgR".to_string(),
                    "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM".to_string(),
                    "2ojv9BAiHUrvsm9gxDe7fJSzbNZSJcxZvf8dqmWGHG8S".to_string(),
                    "ASTyfSima4LLAdDgoFGkgqoKowG1LZFDr9fAQrg7iaJZ".to_string(),
                ],
                stablecoin_mints: vec![
                    "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".to_string(),
                    "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB".to_string(),
                ],
                wrapped_native_mint: "So11111111111111111111111111111111111111112".to_string(),
            },
            monitor: MonitorConfig {
                tick_interval_secs: 5,
                wallet_spacing_ms: 500,
                max_monitored_wallets: 200,
                dedup_cap: 1000,
            },
            validator: ValidatorConfig {
                min_liquidity_usd: 10_000.0,
                min_copy_trade_mcap_usd: 50_000.0,
                max_copy_trade_mcap_usd: 10_000_000.0,
                consensus_window_secs: 300,
                consensus_multiplier: 1.5,
                bot_multiplier: 0.5,
                base_position_native: 0.1,
                max_position_size_native: 1.0,
            },
            risk: RiskConfig {
                daily_loss_limit_native: 1.0,
                max_open_positions: 10,
                per_token_cap_native: 0.5,
                balance_floor_native: 0.05,
            },
            position: PositionConfig { poll_interval_secs: 10 },
            brain: BrainConfig {
                cycle_interval_secs: 60,
                learn_interval_secs: 3600,
                signal_window_secs: 1800,
                min_closed_trades_to_learn: 5,
            },
        }
    }
}
