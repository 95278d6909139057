//! Grouped sums and the portfolio/claim merge
//!
//! Portfolio and claim tables are summed independently over the requested
//! key set, then LEFT-joined on the shared dimensions: claim groups with no
//! matching portfolio group are dropped, portfolio groups with no claims
//! carry zero claim KPIs. BTreeMap grouping keeps output order deterministic
//! (ascending year, then key values), which fixes Total-row placement.

use std::collections::BTreeMap;

use crate::allocation::{AllocationConfig, PolicyYears, PortfolioShape};
use crate::calendar::Year;
use crate::portfolio::{ClaimRecord, ColumnSchema, FeatureValue};

use super::table::{AnalysisRow, GroupKey, Kpis, RowLabel};
use super::YearLevel;

/// How the Total row is synthesized, decided by which sides the grouping key
/// touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TotalPolicy {
    /// Sum every KPI column over the rows (portfolio-only or bare-year keys)
    SumAll,
    /// The portfolio KPIs are the same broadcast values on every row; summing
    /// them again would double count, so copy them and sum only the claim
    /// side (single-claim-attribute keys)
    BroadcastPortfolio,
    /// Grouping spans both sides jointly: no Total row
    None,
}

/// Aggregated rows plus the Total-row rule they call for.
#[derive(Debug, Clone)]
pub struct PreparedTable {
    pub rows: Vec<AnalysisRow>,
    pub total_policy: TotalPolicy,
}

/// Per-policy lookup used to resolve claim-side grouping values.
///
/// Rows are kept in contract-date order per policy, so "first" is the
/// inception row and "last" the latest amendment.
pub struct PolicyIndex<'a> {
    by_id: BTreeMap<&'a str, Vec<&'a PolicyYears>>,
}

impl<'a> PolicyIndex<'a> {
    pub fn new(portfolio: &'a [PolicyYears]) -> Self {
        let mut by_id: BTreeMap<&str, Vec<&PolicyYears>> = BTreeMap::new();
        for row in portfolio {
            by_id.entry(row.policy.policy_id.as_str()).or_default().push(row);
        }
        for rows in by_id.values_mut() {
            rows.sort_by_key(|r| r.policy.start_date);
        }
        Self { by_id }
    }

    /// Resolve a portfolio feature for a claim: the claim's own copy wins,
    /// then the latest contract row, then the unknown placeholder.
    fn feature_for_claim(&self, claim: &ClaimRecord, name: &str) -> FeatureValue {
        if let Some(value) = claim.attribute(name) {
            return value.clone();
        }
        self.by_id
            .get(claim.policy_id.as_str())
            .and_then(|rows| rows.last())
            .and_then(|row| row.policy.feature(name).cloned())
            .unwrap_or_else(FeatureValue::unknown)
    }

    /// Effective year of the contract row covering the claim: the latest
    /// amendment starting at or before the occurrence date.
    fn effective_year(&self, claim: &ClaimRecord) -> Year {
        self.by_id
            .get(claim.policy_id.as_str())
            .map(|rows| {
                rows.iter()
                    .rev()
                    .find(|r| r.policy.start_date <= claim.occurrence_date)
                    .unwrap_or(&rows[0])
                    .policy
                    .start_year()
            })
            .unwrap_or_else(|| claim.occurrence_year())
    }

    /// Inception year of the claimed policy (earliest contract row).
    fn inception_year(&self, claim: &ClaimRecord) -> Year {
        self.by_id
            .get(claim.policy_id.as_str())
            .map(|rows| rows[0].policy.start_year())
            .unwrap_or_else(|| claim.occurrence_year())
    }
}

fn portfolio_key_values(row: &PolicyYears, features: &[String]) -> Vec<FeatureValue> {
    features
        .iter()
        .map(|name| {
            row.policy
                .feature(name)
                .cloned()
                .unwrap_or_else(FeatureValue::unknown)
        })
        .collect()
}

fn claim_feature_values(
    claim: &ClaimRecord,
    features: &[String],
    index: &PolicyIndex<'_>,
) -> Vec<FeatureValue> {
    features
        .iter()
        .map(|name| index.feature_for_claim(claim, name))
        .collect()
}

fn claim_attribute_values(claim: &ClaimRecord, attributes: &[String]) -> Vec<FeatureValue> {
    attributes
        .iter()
        .map(|name| {
            claim
                .attribute(name)
                .cloned()
                .unwrap_or_else(FeatureValue::unknown)
        })
        .collect()
}

/// Claim sums keyed by the shared dimensions, sub-keyed by claim attributes.
type ClaimGroups = BTreeMap<GroupKey, BTreeMap<Vec<FeatureValue>, Kpis>>;

fn group_claims(
    claims: &[ClaimRecord],
    index: &PolicyIndex<'_>,
    features: &[String],
    attributes: &[String],
    year_of: impl Fn(&ClaimRecord) -> Option<Year>,
    policy_key: bool,
) -> ClaimGroups {
    let mut groups: ClaimGroups = BTreeMap::new();
    for claim in claims {
        let key = GroupKey {
            year: year_of(claim),
            policy_id: policy_key.then(|| claim.policy_id.clone()),
            features: claim_feature_values(claim, features, index),
            attributes: Vec::new(),
        };
        groups
            .entry(key)
            .or_default()
            .entry(claim_attribute_values(claim, attributes))
            .or_default()
            .add_claim(claim);
    }
    groups
}

/// LEFT-join portfolio groups with claim groups on the shared key.
fn merge_left(
    portfolio_groups: BTreeMap<GroupKey, Kpis>,
    claim_groups: &ClaimGroups,
    attribute_count: usize,
) -> Vec<AnalysisRow> {
    let mut rows = Vec::new();
    for (key, portfolio_kpis) in portfolio_groups {
        match claim_groups.get(&key) {
            Some(subgroups) => {
                for (attribute_values, claim_kpis) in subgroups {
                    let mut merged = portfolio_kpis;
                    merged.add_claim_side(claim_kpis);
                    let mut row_key = key.clone();
                    row_key.attributes = attribute_values.clone();
                    rows.push(AnalysisRow::new(row_key, merged));
                }
            }
            None => {
                // No claims in this bucket: the bucket still exists
                let mut row_key = key;
                row_key.attributes = vec![FeatureValue::unknown(); attribute_count];
                rows.push(AnalysisRow::new(row_key, portfolio_kpis));
            }
        }
    }
    rows
}

/// Summary grouped by portfolio features and/or claim attributes (no year
/// dimension). Caller guarantees at least one grouping dimension.
pub fn feature_summary(
    portfolio: &[PolicyYears],
    claims: &[ClaimRecord],
    features: &[String],
    attributes: &[String],
) -> PreparedTable {
    let index = PolicyIndex::new(portfolio);
    let claim_groups = group_claims(claims, &index, features, attributes, |_| None, false);

    if features.is_empty() {
        // Portfolio collapses to one scalar row that is broadcast-joined
        // against every claim-attribute group
        let mut portfolio_kpis = Kpis::default();
        for row in portfolio {
            portfolio_kpis.add_portfolio(row);
        }
        let mut groups = BTreeMap::new();
        groups.insert(GroupKey::empty(), portfolio_kpis);
        let rows = merge_left(groups, &claim_groups, attributes.len());

        let total_policy = if attributes.len() == 1 {
            TotalPolicy::BroadcastPortfolio
        } else {
            TotalPolicy::None
        };
        return PreparedTable { rows, total_policy };
    }

    let mut portfolio_groups: BTreeMap<GroupKey, Kpis> = BTreeMap::new();
    for row in portfolio {
        let key = GroupKey {
            year: None,
            policy_id: None,
            features: portfolio_key_values(row, features),
            attributes: Vec::new(),
        };
        portfolio_groups.entry(key).or_default().add_portfolio(row);
    }
    let rows = merge_left(portfolio_groups, &claim_groups, attributes.len());

    let total_policy = if attributes.is_empty() {
        TotalPolicy::SumAll
    } else {
        TotalPolicy::None
    };
    PreparedTable { rows, total_policy }
}

/// Summary grouped by calendar year (occurrence, inception or effective),
/// optionally crossed with portfolio features and claim attributes.
pub fn year_summary(
    portfolio: &[PolicyYears],
    claims: &[ClaimRecord],
    level: YearLevel,
    features: &[String],
    attributes: &[String],
    config: &AllocationConfig,
    schema: &ColumnSchema,
) -> PreparedTable {
    let index = PolicyIndex::new(portfolio);

    let portfolio_groups = match level {
        YearLevel::Occurrence => occurrence_portfolio_groups(portfolio, features, config, schema),
        YearLevel::Inception | YearLevel::Effective => {
            contract_year_portfolio_groups(portfolio, level, features, config)
        }
    };

    let claim_groups = group_claims(
        claims,
        &index,
        features,
        attributes,
        |claim| {
            Some(match level {
                YearLevel::Occurrence => claim.occurrence_year(),
                YearLevel::Effective => index.effective_year(claim),
                YearLevel::Inception => index.inception_year(claim),
            })
        },
        false,
    );

    let rows = merge_left(portfolio_groups, &claim_groups, attributes.len());

    // Year and feature keys both partition the portfolio, so their crossing
    // still sums cleanly; only claim attributes in the key rule a Total out
    let total_policy = if attributes.is_empty() {
        TotalPolicy::SumAll
    } else {
        TotalPolicy::None
    };
    PreparedTable { rows, total_policy }
}

/// The portfolio has no per-row occurrence date: occurrence-year totals come
/// from the per-year bucket maps, one synthetic row per calendar year. Rows
/// with the unknown-policy sentinel contribute zero written premium but every
/// year in range stays present, so yearly tables remain complete.
fn occurrence_portfolio_groups(
    portfolio: &[PolicyYears],
    features: &[String],
    config: &AllocationConfig,
    schema: &ColumnSchema,
) -> BTreeMap<GroupKey, Kpis> {
    let mut groups: BTreeMap<GroupKey, Kpis> = BTreeMap::new();

    for row in portfolio {
        let feature_values = portfolio_key_values(row, features);
        let unknown_policy = row.policy.policy_id == schema.unknown_policy_marker;
        if unknown_policy {
            log::debug!("Unknown-policy row kept with zero written premium");
        }

        for year in config.years() {
            let key = GroupKey {
                year: Some(year),
                policy_id: None,
                features: feature_values.clone(),
                attributes: Vec::new(),
            };
            let kpis = groups.entry(key).or_default();
            kpis.exposure += row.buckets.exposure_in(year);
            kpis.earned_premium += row.buckets.earned_in(year);

            match config.shape {
                // Effective year stands in for occurrence year on the
                // written side: each row is one annual installment
                PortfolioShape::RowPerContractYear => {
                    if row.policy.start_year() == year && !unknown_policy {
                        kpis.written_premium += row.written_premium();
                    }
                }
                PortfolioShape::RowPerContract => {
                    kpis.written_premium += row.buckets.written_in(year);
                }
            }
        }
    }

    groups
}

/// Inception/effective-year portfolio grouping. Inception level on
/// row-per-contract-year data first collapses each policy to one row: the
/// earliest amendment keeps the features and the date, the KPIs are summed.
fn contract_year_portfolio_groups(
    portfolio: &[PolicyYears],
    level: YearLevel,
    features: &[String],
    config: &AllocationConfig,
) -> BTreeMap<GroupKey, Kpis> {
    let mut groups: BTreeMap<GroupKey, Kpis> = BTreeMap::new();

    let collapse = level == YearLevel::Inception
        && config.shape == PortfolioShape::RowPerContractYear;

    if collapse {
        let index = PolicyIndex::new(portfolio);
        for rows in index.by_id.values() {
            let representative = rows[0];
            let key = GroupKey {
                year: Some(representative.policy.start_year()),
                policy_id: None,
                features: portfolio_key_values(representative, features),
                attributes: Vec::new(),
            };
            let kpis = groups.entry(key).or_default();
            for row in rows {
                kpis.add_portfolio(row);
            }
        }
    } else {
        for row in portfolio {
            let key = GroupKey {
                year: Some(row.policy.start_year()),
                policy_id: None,
                features: portfolio_key_values(row, features),
                attributes: Vec::new(),
            };
            groups.entry(key).or_default().add_portfolio(row);
        }
    }

    groups
}

/// One row per policy (plus effective year when requested): the wide table
/// that feeds prediction models. Features are never summed; the latest
/// contract row by date provides the representative feature set.
pub fn prediction_rows(
    portfolio: &[PolicyYears],
    claims: &[ClaimRecord],
    per_effective_year: bool,
) -> PreparedTable {
    let index = PolicyIndex::new(portfolio);

    let mut portfolio_groups: BTreeMap<GroupKey, Kpis> = BTreeMap::new();
    for row in portfolio {
        let key = GroupKey {
            year: per_effective_year.then(|| row.policy.start_year()),
            policy_id: Some(row.policy.policy_id.clone()),
            features: Vec::new(),
            attributes: Vec::new(),
        };
        portfolio_groups.entry(key).or_default().add_portfolio(row);
    }

    let claim_groups = group_claims(
        claims,
        &index,
        &[],
        &[],
        |claim| per_effective_year.then(|| index.effective_year(claim)),
        true,
    );

    let mut rows = merge_left(portfolio_groups, &claim_groups, 0);

    // Attach the representative features per policy
    for row in rows.iter_mut() {
        if let RowLabel::Group(key) = &row.label {
            if let Some(policy_id) = &key.policy_id {
                if let Some(policy_rows) = index.by_id.get(policy_id.as_str()) {
                    if let Some(latest) = policy_rows.last() {
                        row.features = latest.policy.features.clone();
                    }
                }
            }
        }
    }

    PreparedTable {
        rows,
        total_policy: TotalPolicy::None,
    }
}

/// Append the Total row according to the policy decided at aggregation time.
pub fn append_total(rows: &mut Vec<AnalysisRow>, policy: TotalPolicy) {
    match policy {
        TotalPolicy::None => {}
        TotalPolicy::SumAll => {
            let mut total = Kpis::default();
            for row in rows.iter() {
                total.add(&row.kpis);
            }
            rows.push(AnalysisRow {
                label: RowLabel::Total,
                features: BTreeMap::new(),
                kpis: total,
                derived: None,
            });
        }
        TotalPolicy::BroadcastPortfolio => {
            let Some(first) = rows.first() else { return };
            let mut total = Kpis {
                full_cost: 0.0,
                capped_cost: 0.0,
                claim_count: 0.0,
                ..first.kpis
            };
            for row in rows.iter() {
                total.add_claim_side(&row.kpis);
            }
            rows.push(AnalysisRow {
                label: RowLabel::Total,
                features: BTreeMap::new(),
                kpis: total,
                derived: None,
            });
        }
    }
}
