use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    TimingCorrelated,
    TransferPartner,
    FundingDestination,
    FundingSource,
    TokenOverlap,
}

/// A cluster has exactly one seed wallet and a set of members.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cluster {
    pub id: Option<i64>,
    pub seed_wallet: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterMember {
    pub cluster_id: i64,
    pub wallet_address: String,
    pub relationship_type: RelationshipType,
    pub is_side_wallet: bool,
    pub confidence: f64,
    pub avg_lead_time_seconds: f64,
    pub evidence: serde_json::Value,
}
