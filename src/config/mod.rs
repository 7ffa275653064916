/// Configuration structures and the hot-reloading manager.
///
/// Mirrors `config/strategy.rs` + `config/manager.rs`'s TOML-backed
/// `Config`/`ConfigManager` split, generalized from the single
/// pump.fun strategy file to the sections this pipeline needs.
mod control;
mod manager;
mod schema;

pub use control::TradingControl;
pub use manager::ConfigManager;
pub use schema::*;
