//! Duplicate similarity and client risk heuristics.
//!
//! Everything here is a fixed formula over already-aggregated numbers. No I/O,
//! no learned parameters.

use chrono::NaiveDateTime;
use serde::Serialize;

/// Scores strictly above this mark a pair as a likely duplicate.
pub const DUPLICATE_THRESHOLD: f64 = 0.7;

const AMOUNT_TOLERANCE: f64 = 0.01;

// ---------------------------------------------------------------------------
// Similarity
// ---------------------------------------------------------------------------

/// Per-criterion weights of the duplicate similarity score.
///
/// Two weightings exist because the intake check and the ledger scan compare
/// different things: a candidate not yet stored has no creation time but does
/// carry a branch, while two stored cheques can be compared on creation date.
#[derive(Debug, Clone, Copy)]
pub struct SimilarityWeights {
    pub number: f64,
    pub amount: f64,
    pub client: f64,
    pub branch: f64,
    /// Created at most one day apart.
    pub same_day: f64,
    /// Created at most seven days apart (and more than one).
    pub same_week: f64,
}

impl SimilarityWeights {
    /// Checking a new cheque against stored ones.
    pub const INTAKE: SimilarityWeights = SimilarityWeights {
        number: 0.5,
        amount: 0.3,
        client: 0.15,
        branch: 0.05,
        same_day: 0.0,
        same_week: 0.0,
    };

    /// Pairwise scan over the stored ledger.
    pub const LEDGER_SCAN: SimilarityWeights = SimilarityWeights {
        number: 0.5,
        amount: 0.3,
        client: 0.2,
        branch: 0.0,
        same_day: 0.2,
        same_week: 0.1,
    };
}

/// The fields of a cheque that take part in duplicate comparison.
#[derive(Debug, Clone)]
pub struct ChequeFingerprint {
    pub cheque_number: String,
    pub amount: f64,
    pub client_id: Option<i64>,
    pub branch_id: Option<i64>,
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MatchReason {
    SameNumber,
    SameAmount,
    SameClient,
    SameBranch,
    CloseDates { days: i64 },
}

impl MatchReason {
    pub fn describe(&self) -> String {
        match self {
            Self::SameNumber => "Même numéro de chèque".to_string(),
            Self::SameAmount => "Même montant".to_string(),
            Self::SameClient => "Même client".to_string(),
            Self::SameBranch => "Même agence".to_string(),
            Self::CloseDates { days } => format!("Dates proches ({days} jour(s))"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Similarity {
    /// In [0, 1].
    pub score: f64,
    pub reasons: Vec<MatchReason>,
}

impl Similarity {
    pub fn is_likely_duplicate(&self) -> bool {
        self.score > DUPLICATE_THRESHOLD
    }

    pub fn percent(&self) -> f64 {
        (self.score * 1000.0).round() / 10.0
    }
}

pub fn similarity(a: &ChequeFingerprint, b: &ChequeFingerprint, weights: &SimilarityWeights) -> Similarity {
    let mut score = 0.0;
    let mut reasons = Vec::new();

    if a.cheque_number.trim() == b.cheque_number.trim() {
        score += weights.number;
        reasons.push(MatchReason::SameNumber);
    }
    if (a.amount - b.amount).abs() < AMOUNT_TOLERANCE {
        score += weights.amount;
        reasons.push(MatchReason::SameAmount);
    }
    // Two cheques without a client do not count as the same client.
    if a.client_id.is_some() && a.client_id == b.client_id {
        score += weights.client;
        reasons.push(MatchReason::SameClient);
    }
    if weights.branch > 0.0 && a.branch_id.is_some() && a.branch_id == b.branch_id {
        score += weights.branch;
        reasons.push(MatchReason::SameBranch);
    }
    if let (Some(da), Some(db)) = (a.created_at, b.created_at) {
        let days = (da - db).num_days().abs();
        if days <= 1 {
            score += weights.same_day;
        } else if days <= 7 {
            score += weights.same_week;
        }
        if days <= 7 && (weights.same_day > 0.0 || weights.same_week > 0.0) {
            reasons.push(MatchReason::CloseDates { days });
        }
    }

    Similarity {
        score: score.clamp(0.0, 1.0),
        reasons,
    }
}

// ---------------------------------------------------------------------------
// Risk
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score < 40.0 {
            Self::Low
        } else if score < 60.0 {
            Self::Medium
        } else if score < 80.0 {
            Self::High
        } else {
            Self::Critical
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Aggregated history used by the client risk profile.
#[derive(Debug, Clone)]
pub struct RiskFactors {
    /// Percentage of cheques that ended bounced or unpaid, 0..=100.
    pub bounce_rate_pct: f64,
    pub total_cheques: i64,
    pub total_amount: f64,
    pub avg_processing_days: f64,
    pub last_bounce: Option<NaiveDateTime>,
}

/// Piecewise score in [0, 100]; higher is riskier.
pub fn profile_risk_score(f: &RiskFactors, now: NaiveDateTime) -> f64 {
    let mut score = (f.bounce_rate_pct.max(0.0) * 2.0).min(40.0);

    score += if f.total_cheques < 5 {
        20.0
    } else if f.total_cheques < 20 {
        10.0
    } else {
        0.0
    };

    score += if f.total_amount < 10_000.0 {
        15.0
    } else if f.total_amount < 50_000.0 {
        8.0
    } else {
        0.0
    };

    score += if f.avg_processing_days > 30.0 {
        10.0
    } else if f.avg_processing_days > 14.0 {
        5.0
    } else {
        0.0
    };

    if let Some(last) = f.last_bounce {
        let days = (now - last).num_days();
        score += if days < 30 {
            15.0
        } else if days < 90 {
            10.0
        } else if days < 180 {
            5.0
        } else {
            0.0
        };
    }

    score.min(100.0)
}

/// Inputs of the weighted-feature heuristic.
#[derive(Debug, Clone)]
pub struct HeuristicFeatures {
    pub total_cheques: i64,
    pub avg_amount: f64,
    pub bounced: i64,
    pub avg_processing_days: Option<f64>,
    pub days_since_last_cheque: Option<i64>,
    pub branches_used: i64,
}

/// Returned for clients without any cheque history.
pub const NEUTRAL_RISK_SCORE: f64 = 50.0;

/// Weighted linear combination of six normalised features, clamped to
/// [0, 100]. Bounce rate carries the largest weight.
pub fn heuristic_risk_score(f: &HeuristicFeatures) -> f64 {
    if f.total_cheques <= 0 {
        return NEUTRAL_RISK_SCORE;
    }
    let bounce_rate = (f.bounced as f64 / f.total_cheques as f64).clamp(0.0, 1.0);

    let recency = match f.days_since_last_cheque {
        Some(days) => (100.0 - days.max(0) as f64 / 30.0 * 10.0).max(0.0),
        None => 0.0,
    };
    let volume = (f.total_cheques as f64 * 2.0).min(100.0);
    let amount_variance = 100.0 - (f.avg_amount.max(0.0) / 1000.0).min(50.0);
    let processing = match f.avg_processing_days {
        Some(d) if d > 0.0 => (100.0 - d * 2.0).max(0.0),
        _ => 100.0,
    };
    let diversification = (f.branches_used as f64 * 20.0).min(100.0);

    let score = bounce_rate * 40.0
        + (100.0 - recency) * 0.15
        + (100.0 - volume) * 0.15
        + amount_variance * 0.10
        + (100.0 - processing) * 0.10
        + (100.0 - diversification) * 0.10;

    score.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(12, 0, 0).unwrap()
    }

    fn fp(number: &str, amount: f64, client: Option<i64>, branch: Option<i64>) -> ChequeFingerprint {
        ChequeFingerprint {
            cheque_number: number.to_string(),
            amount,
            client_id: client,
            branch_id: branch,
            created_at: None,
        }
    }

    #[test]
    fn test_intake_full_match_scores_one() {
        let a = fp("A1", 1000.0, Some(5), Some(2));
        let s = similarity(&a, &a.clone(), &SimilarityWeights::INTAKE);
        assert!((s.score - 1.0).abs() < 1e-9);
        assert_eq!(s.reasons.len(), 4);
        assert!(s.is_likely_duplicate());
    }

    #[test]
    fn test_intake_number_and_amount_only_is_over_threshold() {
        let a = fp("A1", 1000.0, Some(5), Some(2));
        let b = fp("A1", 1000.0, Some(6), Some(3));
        let s = similarity(&a, &b, &SimilarityWeights::INTAKE);
        assert!((s.score - 0.8).abs() < 1e-9);
        assert!(s.is_likely_duplicate());
    }

    #[test]
    fn test_amount_and_client_alone_is_below_threshold() {
        let a = fp("A1", 1000.0, Some(5), Some(2));
        let b = fp("B7", 1000.004, Some(5), Some(9));
        let s = similarity(&a, &b, &SimilarityWeights::INTAKE);
        assert!((s.score - 0.45).abs() < 1e-9);
        assert!(!s.is_likely_duplicate());
        assert_eq!(s.reasons, vec![MatchReason::SameAmount, MatchReason::SameClient]);
    }

    #[test]
    fn test_missing_clients_do_not_match() {
        let a = fp("A1", 10.0, None, None);
        let b = fp("A2", 99.0, None, None);
        let s = similarity(&a, &b, &SimilarityWeights::INTAKE);
        assert_eq!(s.score, 0.0);
        assert!(s.reasons.is_empty());
    }

    #[test]
    fn test_ledger_scan_is_capped_at_one() {
        let mut a = fp("A1", 1000.0, Some(5), Some(2));
        a.created_at = Some(at(2025, 1, 1));
        let mut b = a.clone();
        b.created_at = Some(at(2025, 1, 2));
        let s = similarity(&a, &b, &SimilarityWeights::LEDGER_SCAN);
        assert_eq!(s.score, 1.0);
        assert!(s.reasons.contains(&MatchReason::CloseDates { days: 1 }));
    }

    #[test]
    fn test_ledger_scan_week_proximity() {
        let mut a = fp("A1", 500.0, Some(5), None);
        a.created_at = Some(at(2025, 1, 1));
        let mut b = fp("Z9", 500.0, Some(5), None);
        b.created_at = Some(at(2025, 1, 6));
        let s = similarity(&a, &b, &SimilarityWeights::LEDGER_SCAN);
        assert!((s.score - 0.6).abs() < 1e-9);
        assert_eq!(s.percent(), 60.0);
    }

    #[test]
    fn test_similarity_monotone_in_matched_criteria() {
        let base = fp("A1", 1000.0, Some(5), Some(2));
        let variants = [
            fp("X", 1.0, Some(9), Some(9)),
            fp("X", 1.0, Some(9), Some(2)),
            fp("X", 1.0, Some(5), Some(2)),
            fp("X", 1000.0, Some(5), Some(2)),
            fp("A1", 1000.0, Some(5), Some(2)),
        ];
        let mut last = -1.0;
        for v in &variants {
            let s = similarity(&base, v, &SimilarityWeights::INTAKE);
            assert!(s.score >= last, "score decreased: {} < {last}", s.score);
            assert!((0.0..=1.0).contains(&s.score));
            last = s.score;
        }
    }

    #[test]
    fn test_risk_level_buckets() {
        assert_eq!(RiskLevel::from_score(0.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(39.99), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(40.0), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(60.0), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(79.9), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(80.0), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(100.0), RiskLevel::Critical);
    }

    fn factors(bounce_pct: f64) -> RiskFactors {
        RiskFactors {
            bounce_rate_pct: bounce_pct,
            total_cheques: 12,
            total_amount: 30_000.0,
            avg_processing_days: 20.0,
            last_bounce: None,
        }
    }

    #[test]
    fn test_profile_score_components() {
        let now = at(2025, 6, 1);
        // 10% bounces -> 20, 12 cheques -> 10, 30k -> 8, 20 days -> 5
        assert!((profile_risk_score(&factors(10.0), now) - 43.0).abs() < 1e-9);

        let mut recent = factors(10.0);
        recent.last_bounce = Some(at(2025, 5, 20));
        assert!((profile_risk_score(&recent, now) - 58.0).abs() < 1e-9);
    }

    #[test]
    fn test_profile_score_bounded() {
        let now = at(2025, 6, 1);
        let worst = RiskFactors {
            bounce_rate_pct: 100.0,
            total_cheques: 1,
            total_amount: 10.0,
            avg_processing_days: 90.0,
            last_bounce: Some(now),
        };
        assert_eq!(profile_risk_score(&worst, now), 100.0);
        let best = RiskFactors {
            bounce_rate_pct: 0.0,
            total_cheques: 200,
            total_amount: 1_000_000.0,
            avg_processing_days: 2.0,
            last_bounce: None,
        };
        assert_eq!(profile_risk_score(&best, now), 0.0);
    }

    #[test]
    fn test_profile_score_non_decreasing_in_bounce_rate() {
        let now = at(2025, 6, 1);
        let mut last = 0.0;
        for pct in 0..=100 {
            let s = profile_risk_score(&factors(pct as f64), now);
            assert!(s >= last);
            assert!((0.0..=100.0).contains(&s));
            last = s;
        }
    }

    fn features(bounced: i64) -> HeuristicFeatures {
        HeuristicFeatures {
            total_cheques: 20,
            avg_amount: 4_000.0,
            bounced,
            avg_processing_days: Some(10.0),
            days_since_last_cheque: Some(15),
            branches_used: 2,
        }
    }

    #[test]
    fn test_heuristic_neutral_without_history() {
        let mut f = features(0);
        f.total_cheques = 0;
        assert_eq!(heuristic_risk_score(&f), NEUTRAL_RISK_SCORE);
    }

    #[test]
    fn test_heuristic_known_value() {
        // recency 95, volume 40, amount_variance 96, processing 80, diversification 40
        // 0*40 + 5*0.15 + 60*0.15 + 96*0.1 + 20*0.1 + 60*0.1 = 27.35
        assert!((heuristic_risk_score(&features(0)) - 27.35).abs() < 1e-9);
    }

    #[test]
    fn test_heuristic_non_decreasing_in_bounces_and_bounded() {
        let mut last = 0.0;
        for bounced in 0..=20 {
            let s = heuristic_risk_score(&features(bounced));
            assert!(s >= last);
            assert!((0.0..=100.0).contains(&s));
            last = s;
        }
    }
}
