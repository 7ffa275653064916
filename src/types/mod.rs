/// Shared entity shapes from the data model (spec.md §3).
///
/// Every component that crosses a component boundary exchanges these
/// types rather than provider-native or database-row shapes; providers
/// are normalized at the adapter boundary into these structs.
pub mod agent;
pub mod cluster;
pub mod position;
pub mod signal;
pub mod token;
pub mod trade;
pub mod wallet;

pub use agent::*;
pub use cluster::*;
pub use position::*;
pub use signal::*;
pub use token::*;
pub use trade::*;
pub use wallet::*;

use serde::{Deserialize, Serialize};

/// Trading mode. The core never submits on-chain in anything but `Live`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Live,
    DryRun,
    AlertOnly,
}

impl std::str::FromStr for Mode {
    type Err = crate::error::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "live" => Ok(Mode::Live),
            "dry_run" => Ok(Mode::DryRun),
            "alert_only" => Ok(Mode::AlertOnly),
            other => Err(crate::error::AppError::ConfigInvalid(format!(
                "unknown mode `{other}`, expected live|dry_run|alert_only"
            ))),
        }
    }
}

/// Who is behind a signal, determining the exit ladder and sizing multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Human,
    Bot,
    Consensus,
}
