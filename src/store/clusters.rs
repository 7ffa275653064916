use super::{Store, StoreError};
use crate::types::{Cluster, ClusterMember, RelationshipType};

impl Store {
    /// Exactly one cluster per seed wallet; idempotent on repeated calls.
    pub async fn create_cluster(&self, seed_wallet: &str) -> Result<i64, StoreError> {
        if let Some(existing) = self.get_cluster_by_seed(seed_wallet).await? {
            return Ok(existing.id.expect("persisted cluster always has an id"));
        }
        let id = sqlx::query("INSERT INTO clusters (seed_wallet) VALUES (?)")
            .bind(seed_wallet)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();
        Ok(id)
    }

    pub async fn add_cluster_member(&self, m: &ClusterMember) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO cluster_members (cluster_id, wallet_address, relationship_type, is_side_wallet,
                confidence, avg_lead_time_seconds, evidence)
               VALUES (?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(cluster_id, wallet_address) DO UPDATE SET
                relationship_type = excluded.relationship_type,
                is_side_wallet = excluded.is_side_wallet,
                confidence = excluded.confidence,
                avg_lead_time_seconds = excluded.avg_lead_time_seconds,
                evidence = excluded.evidence"#,
        )
        .bind(m.cluster_id)
        .bind(&m.wallet_address)
        .bind(relationship_str(m.relationship_type))
        .bind(m.is_side_wallet)
        .bind(m.confidence)
        .bind(m.avg_lead_time_seconds)
        .bind(m.evidence.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_cluster_by_seed(&self, seed_wallet: &str) -> Result<Option<Cluster>, StoreError> {
        let row: Option<(i64, String)> = sqlx::query_as("SELECT id, seed_wallet FROM clusters WHERE seed_wallet=?")
            .bind(seed_wallet)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(id, seed_wallet)| Cluster { id: Some(id), seed_wallet }))
    }

    pub async fn get_cluster_members(&self, cluster_id: i64) -> Result<Vec<ClusterMember>, StoreError> {
        let rows = sqlx::query_as::<_, MemberRow>("SELECT * FROM cluster_members WHERE cluster_id=?")
            .bind(cluster_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn get_side_wallets(&self) -> Result<Vec<ClusterMember>, StoreError> {
        let rows = sqlx::query_as::<_, MemberRow>("SELECT * FROM cluster_members WHERE is_side_wallet=1")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

fn relationship_str(r: RelationshipType) -> &'static str {
    match r {
        RelationshipType::TimingCorrelated => "timing_correlated",
        RelationshipType::TransferPartner => "transfer_partner",
        RelationshipType::FundingDestination => "funding_destination",
        RelationshipType::FundingSource => "funding_source",
        RelationshipType::TokenOverlap => "token_overlap",
    }
}

#[derive(sqlx::FromRow)]
struct MemberRow {
    cluster_id: i64,
    wallet_address: String,
    relationship_type: String,
    is_side_wallet: bool,
    confidence: f64,
    avg_lead_time_seconds: f64,
    evidence: String,
}

impl TryFrom<MemberRow> for ClusterMember {
    type Error = StoreError;

    fn try_from(r: MemberRow) -> Result<Self, StoreError> {
        let relationship_type = match r.relationship_type.as_str() {
            "timing_correlated" => RelationshipType::TimingCorrelated,
            "transfer_partner" => RelationshipType::TransferPartner,
            "funding_destination" => RelationshipType::FundingDestination,
            "funding_source" => RelationshipType::FundingSource,
            "token_overlap" => RelationshipType::TokenOverlap,
            other => return Err(StoreError::SchemaViolation(format!("unknown relationship_type `{other}`"))),
        };
        Ok(ClusterMember {
            cluster_id: r.cluster_id,
            wallet_address: r.wallet_address,
            relationship_type,
            is_side_wallet: r.is_side_wallet,
            confidence: r.confidence,
            avg_lead_time_seconds: r.avg_lead_time_seconds,
            evidence: serde_json::from_str(&r.evidence).unwrap_or(serde_json::Value::Null),
        })
    }
}
