/// Wallet cluster detection: traces funding, transfer, timing, and
/// token-overlap links from a seed wallet to its likely side wallets,
/// grounded in `stalker/detector.rs`'s pattern-detector shape (the
/// teacher's version is a stub; the scoring/classification math here
/// follows the distilled specification directly).
use crate::chain::{ChainAdapter, ParsedTransaction};
use crate::config::ClusterConfig;
use crate::error::AppResult;
use crate::store::Store;
use crate::types::{ClusterMember, RelationshipType};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument};

const HISTORY_LIMIT: usize = 200;
const TIMING_FALLBACK_LIMIT: usize = 100;
const MAX_FUNDING_CANDIDATES_PER_LEVEL: usize = 5;

#[derive(Debug, Clone)]
struct FundingLink {
    address: String,
    total_sol: f64,
    direction: RelationshipType,
}

#[derive(Debug, Clone)]
struct TransferEvidence {
    shared_transfers: u32,
}

#[derive(Debug, Clone)]
struct TimingEvidence {
    total_shared: u32,
    lead_count: u32,
    avg_lead_seconds: f64,
}

#[derive(Debug, Clone)]
struct OverlapEvidence {
    overlap_count: u32,
    shared_tokens: Vec<String>,
}

#[derive(Debug, Clone, Default)]
struct Evidence {
    funding: Option<FundingLink>,
    transfers: Option<TransferEvidence>,
    timing: Option<TimingEvidence>,
    overlap: Option<OverlapEvidence>,
}

#[derive(Debug, Clone)]
pub struct ClusterSummary {
    pub cluster_id: i64,
    pub seed_wallet: String,
    pub member_count: usize,
    pub promoted: Vec<String>,
}

pub struct ClusterDetector {
    chain: Arc<dyn ChainAdapter>,
    store: Store,
    config: ClusterConfig,
}

impl ClusterDetector {
    pub fn new(chain: Arc<dyn ChainAdapter>, store: Store, config: ClusterConfig) -> Self {
        Self { chain, store, config }
    }

    /// Runs the full funding/transfer/timing/overlap analysis for one seed
    /// wallet. Returns `None` if the seed was already analyzed or no
    /// candidate produced enough evidence to clear `min_confidence`.
    #[instrument(skip(self), fields(seed = seed))]
    pub async fn analyze_seed(&self, seed: &str) -> AppResult<Option<ClusterSummary>> {
        if self.store.get_cluster_by_seed(seed).await?.is_some() {
            debug!("seed already analyzed, skipping");
            return Ok(None);
        }

        let mut cache: HashMap<String, Vec<ParsedTransaction>> = HashMap::new();

        let funding_links = self.funding_analysis(seed, &mut cache).await?;
        if funding_links.is_empty() {
            return Ok(None);
        }
        let candidates: HashSet<String> = funding_links.iter().map(|l| l.address.clone()).collect();
        let funding_by_addr: HashMap<String, FundingLink> =
            funding_links.into_iter().map(|l| (l.address.clone(), l)).collect();

        let seed_history = self.fetch_history(seed, &mut cache).await?;
        let transfer_evidence = Self::transfer_patterns(seed, &seed_history, &candidates);
        let timing_evidence = self.timing_correlation(seed, &candidates, &mut cache).await?;
        let overlap_evidence = self.token_overlap(seed, &candidates).await?;

        let mut members = Vec::new();
        for addr in &candidates {
            let evidence = Evidence {
                funding: funding_by_addr.get(addr).cloned(),
                transfers: transfer_evidence.get(addr).cloned(),
                timing: timing_evidence.get(addr).cloned(),
                overlap: overlap_evidence.get(addr).cloned(),
            };

            let confidence = Self::score_relationship(&evidence);
            if confidence < self.config.min_confidence {
                continue;
            }

            let is_side_wallet = Self::classify_side_wallet(&evidence);
            let avg_lead_time_seconds = evidence.timing.as_ref().map(|t| t.avg_lead_seconds).unwrap_or(0.0).max(0.0);
            let relationship_type = Self::primary_relationship(&evidence);
            let evidence_json = serde_json::json!({
                "funding_sol": evidence.funding.as_ref().map(|f| f.total_sol),
                "transfer_count": evidence.transfers.as_ref().map(|t| t.shared_transfers),
                "timing_shared": evidence.timing.as_ref().map(|t| t.total_shared),
                "timing_lead_count": evidence.timing.as_ref().map(|t| t.lead_count),
                "overlap_count": evidence.overlap.as_ref().map(|o| o.overlap_count),
                "shared_tokens": evidence.overlap.as_ref().map(|o| o.shared_tokens.iter().take(5).collect::<Vec<_>>()),
            });

            members.push(ClusterMember {
                cluster_id: 0,
                wallet_address: addr.clone(),
                relationship_type,
                is_side_wallet,
                confidence,
                avg_lead_time_seconds,
                evidence: evidence_json,
            });
        }

        if members.is_empty() {
            return Ok(None);
        }

        let cluster_id = self.store.create_cluster(seed).await?;
        for mut m in members.iter().cloned() {
            m.cluster_id = cluster_id;
            self.store.add_cluster_member(&m).await?;
        }

        let promoted = self.promote_side_wallets(cluster_id).await?;

        info!(members = members.len(), promoted = promoted.len(), "cluster analysis complete");

        Ok(Some(ClusterSummary {
            cluster_id,
            seed_wallet: seed.to_string(),
            member_count: members.len(),
            promoted,
        }))
    }

    async fn promote_side_wallets(&self, cluster_id: i64) -> AppResult<Vec<String>> {
        let mut members = self.store.get_cluster_members(cluster_id).await?;
        members.retain(|m| m.is_side_wallet);
        members.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.avg_lead_time_seconds.partial_cmp(&a.avg_lead_time_seconds).unwrap_or(Ordering::Equal))
        });

        let mut promoted = Vec::new();
        for m in members.into_iter().take(self.config.max_cluster_monitored) {
            self.store.set_wallet_monitored(&m.wallet_address, true).await?;
            promoted.push(m.wallet_address);
        }
        Ok(promoted)
    }

    async fn fetch_history(
        &self,
        wallet: &str,
        cache: &mut HashMap<String, Vec<ParsedTransaction>>,
    ) -> AppResult<Vec<ParsedTransaction>> {
        self.fetch_history_capped(wallet, HISTORY_LIMIT, cache).await
    }

    async fn fetch_history_capped(
        &self,
        wallet: &str,
        limit: usize,
        cache: &mut HashMap<String, Vec<ParsedTransaction>>,
    ) -> AppResult<Vec<ParsedTransaction>> {
        if let Some(h) = cache.get(wallet) {
            return Ok(h.clone());
        }
        let h = self.chain.wallet_history(wallet, limit).await?;
        cache.insert(wallet.to_string(), h.clone());
        Ok(h)
    }

    /// Step 1: funding analysis. Recurses up to `config.funding_depth`
    /// levels, each time following the top-5-by-volume candidates found
    /// at the previous level.
    async fn funding_analysis(
        &self,
        seed: &str,
        cache: &mut HashMap<String, Vec<ParsedTransaction>>,
    ) -> AppResult<Vec<FundingLink>> {
        let mut merged: HashMap<String, FundingLink> = HashMap::new();
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(seed.to_string());
        let mut frontier = vec![seed.to_string()];

        for _level in 0..self.config.funding_depth.max(1) {
            let mut next_frontier = Vec::new();
            for wallet in &frontier {
                let direct = self.direct_funding_links(wallet, cache).await?;
                let mut by_volume = direct.clone();
                by_volume.sort_by(|a, b| b.total_sol.partial_cmp(&a.total_sol).unwrap_or(Ordering::Equal));

                for link in &direct {
                    if link.address == seed {
                        continue;
                    }
                    merged
                        .entry(link.address.clone())
                        .and_modify(|existing| existing.total_sol += link.total_sol)
                        .or_insert_with(|| link.clone());
                }

                for link in by_volume.into_iter().take(MAX_FUNDING_CANDIDATES_PER_LEVEL) {
                    if !visited.contains(&link.address) {
                        visited.insert(link.address.clone());
                        next_frontier.push(link.address);
                    }
                }
            }
            frontier = next_frontier;
            if frontier.is_empty() {
                break;
            }
        }

        let mut links: Vec<FundingLink> = merged
            .into_values()
            .filter(|l| l.total_sol >= self.config.min_transfer_native && !self.config.known_exchange_wallets.contains(&l.address))
            .collect();
        links.sort_by(|a, b| b.total_sol.partial_cmp(&a.total_sol).unwrap_or(Ordering::Equal));
        Ok(links)
    }

    async fn direct_funding_links(
        &self,
        wallet: &str,
        cache: &mut HashMap<String, Vec<ParsedTransaction>>,
    ) -> AppResult<Vec<FundingLink>> {
        let history = self.fetch_history(wallet, cache).await?;
        let mut by_addr: HashMap<String, (f64, RelationshipType)> = HashMap::new();
        for tx in &history {
            for nt in &tx.native_transfers {
                let sol = nt.lamports as f64 / 1_000_000_000.0;
                if nt.from == wallet && nt.to != wallet {
                    let e = by_addr.entry(nt.to.clone()).or_insert((0.0, RelationshipType::FundingDestination));
                    e.0 += sol;
                } else if nt.to == wallet && nt.from != wallet {
                    let e = by_addr.entry(nt.from.clone()).or_insert((0.0, RelationshipType::FundingSource));
                    e.0 += sol;
                }
            }
        }
        Ok(by_addr.into_iter().map(|(address, (total_sol, direction))| FundingLink { address, total_sol, direction }).collect())
    }

    /// Step 2: count token transfers in the seed's own history where the
    /// counterparty is one of the funding candidates.
    fn transfer_patterns(
        seed: &str,
        seed_history: &[ParsedTransaction],
        candidates: &HashSet<String>,
    ) -> HashMap<String, TransferEvidence> {
        let mut counts: HashMap<String, u32> = HashMap::new();
        for tx in seed_history {
            for tt in &tx.token_transfers {
                let counterparty = if tt.from == seed {
                    Some(&tt.to)
                } else if tt.to == seed {
                    Some(&tt.from)
                } else {
                    None
                };
                if let Some(cp) = counterparty {
                    if candidates.contains(cp) {
                        *counts.entry(cp.clone()).or_insert(0) += 1;
                    }
                }
            }
        }
        counts.into_iter().map(|(addr, shared_transfers)| (addr, TransferEvidence { shared_transfers })).collect()
    }

    /// Step 3: for every candidate, overlap `mint -> first_buy_ts` with the
    /// seed's. A candidate buying strictly earlier within the lead window
    /// counts as a positive lead.
    async fn timing_correlation(
        &self,
        seed: &str,
        candidates: &HashSet<String>,
        cache: &mut HashMap<String, Vec<ParsedTransaction>>,
    ) -> AppResult<HashMap<String, TimingEvidence>> {
        let seed_map = self.mint_to_first_buy(seed, cache).await?;
        let mut out = HashMap::new();
        for cand in candidates {
            let cand_map = self.mint_to_first_buy(cand, cache).await?;
            let mut shared = 0u32;
            let mut lead_count = 0u32;
            let mut lead_seconds_sum = 0i64;
            for (mint, seed_ts) in &seed_map {
                if let Some(cand_ts) = cand_map.get(mint) {
                    shared += 1;
                    let gap = (*seed_ts - *cand_ts).num_seconds();
                    if seed_ts > cand_ts && gap <= self.config.timing_lead_window_secs {
                        lead_count += 1;
                        lead_seconds_sum += gap;
                    }
                }
            }
            if shared >= 3 && lead_count >= 2 {
                let avg_lead_seconds = lead_seconds_sum as f64 / lead_count as f64;
                out.insert(cand.clone(), TimingEvidence { total_shared: shared, lead_count, avg_lead_seconds });
            }
        }
        Ok(out)
    }

    async fn mint_to_first_buy(
        &self,
        wallet: &str,
        cache: &mut HashMap<String, Vec<ParsedTransaction>>,
    ) -> AppResult<HashMap<String, DateTime<Utc>>> {
        let trades = self.store.get_wallet_token_trades_for_wallet(wallet).await?;
        if !trades.is_empty() {
            return Ok(trades.into_iter().map(|t| (t.token_mint, t.first_buy_at)).collect());
        }

        let history = self.fetch_history_capped(wallet, TIMING_FALLBACK_LIMIT, cache).await?;
        let mut map: HashMap<String, DateTime<Utc>> = HashMap::new();
        for tx in &history {
            for tt in &tx.token_transfers {
                if tt.to == wallet && tt.mint != self.config.wrapped_native_mint {
                    map.entry(tt.mint.clone())
                        .and_modify(|existing| {
                            if tx.timestamp < *existing {
                                *existing = tx.timestamp;
                            }
                        })
                        .or_insert(tx.timestamp);
                }
            }
        }
        Ok(map)
    }

    /// Step 4: shared traded mints, excluding stablecoins and wrapped
    /// native, read from the store's `wallet_token_trades` table.
    async fn token_overlap(&self, seed: &str, candidates: &HashSet<String>) -> AppResult<HashMap<String, OverlapEvidence>> {
        let seed_mints: HashSet<String> = self
            .store
            .get_wallet_token_trades_for_wallet(seed)
            .await?
            .into_iter()
            .map(|t| t.token_mint)
            .filter(|m| !self.is_excluded_mint(m))
            .collect();

        let mut out = HashMap::new();
        for cand in candidates {
            let cand_mints: HashSet<String> = self
                .store
                .get_wallet_token_trades_for_wallet(cand)
                .await?
                .into_iter()
                .map(|t| t.token_mint)
                .filter(|m| !self.is_excluded_mint(m))
                .collect();
            let shared: Vec<String> = seed_mints.intersection(&cand_mints).cloned().collect();
            if shared.len() >= 3 {
                out.insert(cand.clone(), OverlapEvidence { overlap_count: shared.len() as u32, shared_tokens: shared });
            }
        }
        Ok(out)
    }

    fn is_excluded_mint(&self, mint: &str) -> bool {
        mint == self.config.wrapped_native_mint || self.config.stablecoin_mints.iter().any(|s| s == mint)
    }

    fn score_relationship(evidence: &Evidence) -> f64 {
        let mut score = 0.0;
        let mut types_found = 0;

        if let Some(f) = &evidence.funding {
            score += 0.25;
            types_found += 1;
            if f.total_sol >= 1.0 {
                score += 0.05;
            }
        }
        if let Some(t) = &evidence.transfers {
            score += 0.20;
            types_found += 1;
            if t.shared_transfers >= 3 {
                score += 0.05;
            }
        }
        if let Some(t) = &evidence.timing {
            score += 0.35;
            types_found += 1;
            if t.lead_count >= 4 {
                score += 0.10;
            }
            if t.total_shared >= 5 {
                score += 0.05;
            }
        }
        if let Some(o) = &evidence.overlap {
            score += 0.10;
            types_found += 1;
            if o.overlap_count >= 5 {
                score += 0.05;
            }
        }

        if types_found >= 3 {
            score += 0.10;
        } else if types_found >= 2 {
            score += 0.05;
        }

        score.min(1.0)
    }

    fn classify_side_wallet(evidence: &Evidence) -> bool {
        let Some(timing) = &evidence.timing else { return false };
        if timing.avg_lead_seconds <= 0.0 || timing.lead_count < 2 {
            return false;
        }
        evidence.funding.is_some() || evidence.overlap.is_some() || timing.lead_count >= 3
    }

    fn primary_relationship(evidence: &Evidence) -> RelationshipType {
        if let Some(t) = &evidence.timing {
            if t.lead_count >= 2 {
                return RelationshipType::TimingCorrelated;
            }
        }
        if let Some(t) = &evidence.transfers {
            if t.shared_transfers >= 2 {
                return RelationshipType::TransferPartner;
            }
        }
        if let Some(f) = &evidence.funding {
            return f.direction;
        }
        if evidence.overlap.is_some() {
            return RelationshipType::TokenOverlap;
        }
        RelationshipType::FundingSource
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pure_funding_only_scores_below_two_type_bonus() {
        let evidence = Evidence {
            funding: Some(FundingLink { address: "x".into(), total_sol: 0.5, direction: RelationshipType::FundingSource }),
            ..Default::default()
        };
        assert_eq!(ClusterDetector::score_relationship(&evidence), 0.25);
    }

    #[test]
    fn large_funding_plus_timing_gets_bonuses_and_multitype() {
        let evidence = Evidence {
            funding: Some(FundingLink { address: "x".into(), total_sol: 2.0, direction: RelationshipType::FundingDestination }),
            timing: Some(TimingEvidence { total_shared: 6, lead_count: 5, avg_lead_seconds: 120.0 }),
            ..Default::default()
        };
        // 0.25 + 0.05 (funding) + 0.35 + 0.10 + 0.05 (timing) + 0.05 (2-type bonus) = 0.90
        let score = ClusterDetector::score_relationship(&evidence);
        assert!((score - 0.90).abs() < 1e-9);
    }

    #[test]
    fn confidence_caps_at_one() {
        let evidence = Evidence {
            funding: Some(FundingLink { address: "x".into(), total_sol: 5.0, direction: RelationshipType::FundingDestination }),
            transfers: Some(TransferEvidence { shared_transfers: 5 }),
            timing: Some(TimingEvidence { total_shared: 6, lead_count: 5, avg_lead_seconds: 60.0 }),
            overlap: Some(OverlapEvidence { overlap_count: 6, shared_tokens: vec!["a".into()] }),
        };
        assert_eq!(ClusterDetector::score_relationship(&evidence), 1.0);
    }

    #[test]
    fn side_wallet_requires_positive_lead_and_second_signal() {
        let timing_only = Evidence {
            timing: Some(TimingEvidence { total_shared: 4, lead_count: 2, avg_lead_seconds: 30.0 }),
            ..Default::default()
        };
        assert!(!ClusterDetector::classify_side_wallet(&timing_only));

        let timing_plus_funding = Evidence {
            funding: Some(FundingLink { address: "x".into(), total_sol: 0.2, direction: RelationshipType::FundingSource }),
            timing: Some(TimingEvidence { total_shared: 4, lead_count: 2, avg_lead_seconds: 30.0 }),
            ..Default::default()
        };
        assert!(ClusterDetector::classify_side_wallet(&timing_plus_funding));

        let strong_lead_alone = Evidence {
            timing: Some(TimingEvidence { total_shared: 4, lead_count: 3, avg_lead_seconds: 30.0 }),
            ..Default::default()
        };
        assert!(ClusterDetector::classify_side_wallet(&strong_lead_alone));
    }

    #[test]
    fn primary_relationship_priority_order() {
        let timing = Evidence { timing: Some(TimingEvidence { total_shared: 3, lead_count: 2, avg_lead_seconds: 1.0 }), ..Default::default() };
        assert_eq!(ClusterDetector::primary_relationship(&timing), RelationshipType::TimingCorrelated);

        let transfers = Evidence { transfers: Some(TransferEvidence { shared_transfers: 2 }), ..Default::default() };
        assert_eq!(ClusterDetector::primary_relationship(&transfers), RelationshipType::TransferPartner);

        let funding = Evidence {
            funding: Some(FundingLink { address: "x".into(), total_sol: 0.1, direction: RelationshipType::FundingDestination }),
            ..Default::default()
        };
        assert_eq!(ClusterDetector::primary_relationship(&funding), RelationshipType::FundingDestination);

        let overlap = Evidence { overlap: Some(OverlapEvidence { overlap_count: 3, shared_tokens: vec![] }), ..Default::default() };
        assert_eq!(ClusterDetector::primary_relationship(&overlap), RelationshipType::TokenOverlap);
    }
}
