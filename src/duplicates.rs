//! Fuzzy duplicate detection over the cheque ledger.

use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::Serialize;

use crate::error::Result;
use crate::scoring::{self, ChequeFingerprint, SimilarityWeights};

const CANDIDATE_LIMIT: usize = 10;
const CANDIDATE_WINDOW_DAYS: i64 = 30;
const SCAN_WINDOW_DAYS: i64 = 7;

fn parse_ts(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").ok()
}

/// A cheque about to be recorded.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub cheque_number: String,
    pub amount: f64,
    pub client_id: Option<i64>,
    pub branch_id: Option<i64>,
}

impl Candidate {
    fn fingerprint(&self) -> ChequeFingerprint {
        ChequeFingerprint {
            cheque_number: self.cheque_number.clone(),
            amount: self.amount,
            client_id: self.client_id,
            branch_id: self.branch_id,
            created_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateMatch {
    pub cheque_id: i64,
    pub cheque_number: String,
    pub amount: f64,
    pub score_pct: f64,
    pub reasons: Vec<String>,
}

/// Stored cheques that look like `candidate`, best match first.
pub fn find_candidates(conn: &Connection, candidate: &Candidate, now: NaiveDateTime) -> Result<Vec<DuplicateMatch>> {
    let now_s = now.format("%Y-%m-%d %H:%M:%S").to_string();
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT id, cheque_number, amount, client_id, branch_id FROM cheques \
         WHERE cheque_number = ?1 \
            OR (amount = ?2 AND client_id = ?3) \
            OR (abs(amount - ?2) < 0.01 AND client_id = ?3 \
                AND abs(julianday(created_at) - julianday(?4)) <= {CANDIDATE_WINDOW_DAYS}) \
         ORDER BY created_at DESC, id DESC LIMIT {CANDIDATE_LIMIT}"
    ))?;
    let rows = stmt.query_map(
        rusqlite::params![candidate.cheque_number.trim(), candidate.amount, candidate.client_id, now_s],
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                ChequeFingerprint {
                    cheque_number: row.get(1)?,
                    amount: row.get(2)?,
                    client_id: row.get(3)?,
                    branch_id: row.get(4)?,
                    created_at: None,
                },
            ))
        },
    )?;
    let stored = rows.collect::<std::result::Result<Vec<_>, _>>()?;

    let probe = candidate.fingerprint();
    let mut matches: Vec<DuplicateMatch> = stored
        .into_iter()
        .filter_map(|(id, fp)| {
            let sim = scoring::similarity(&probe, &fp, &SimilarityWeights::INTAKE);
            sim.is_likely_duplicate().then(|| DuplicateMatch {
                cheque_id: id,
                cheque_number: fp.cheque_number,
                amount: fp.amount,
                score_pct: sim.percent(),
                reasons: sim.reasons.iter().map(|r| r.describe()).collect(),
            })
        })
        .collect();
    matches.sort_by(|a, b| b.score_pct.total_cmp(&a.score_pct));
    Ok(matches)
}

#[derive(Debug, Clone, Serialize)]
pub struct PairSide {
    pub id: i64,
    pub cheque_number: String,
    pub amount: f64,
    pub client_name: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicatePair {
    pub first: PairSide,
    pub second: PairSide,
    pub score_pct: f64,
    pub reasons: Vec<String>,
}

/// Pairwise scan of the whole ledger.
pub fn scan_ledger(conn: &Connection) -> Result<Vec<DuplicatePair>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT c1.id, c1.cheque_number, c1.amount, c1.client_id, c1.created_at, cl1.name, \
                c2.id, c2.cheque_number, c2.amount, c2.client_id, c2.created_at, cl2.name \
         FROM cheques c1 \
         JOIN cheques c2 ON c1.id < c2.id \
         LEFT JOIN clients cl1 ON c1.client_id = cl1.id \
         LEFT JOIN clients cl2 ON c2.client_id = cl2.id \
         WHERE c1.cheque_number = c2.cheque_number \
            OR (c1.amount = c2.amount AND c1.client_id = c2.client_id \
                AND abs(julianday(c1.created_at) - julianday(c2.created_at)) <= {SCAN_WINDOW_DAYS}) \
         ORDER BY c1.created_at DESC, c1.id, c2.id"
    ))?;

    let rows = stmt.query_map([], |row| {
        let side = |offset: usize| -> rusqlite::Result<(PairSide, ChequeFingerprint)> {
            let created_at: String = row.get(offset + 4)?;
            let fp = ChequeFingerprint {
                cheque_number: row.get(offset + 1)?,
                amount: row.get(offset + 2)?,
                client_id: row.get(offset + 3)?,
                branch_id: None,
                created_at: parse_ts(&created_at),
            };
            let info = PairSide {
                id: row.get(offset)?,
                cheque_number: fp.cheque_number.clone(),
                amount: fp.amount,
                client_name: row.get(offset + 5)?,
                created_at,
            };
            Ok((info, fp))
        };
        Ok((side(0)?, side(6)?))
    })?;

    let mut pairs = Vec::new();
    for row in rows {
        let ((first, fp1), (second, fp2)) = row?;
        let sim = scoring::similarity(&fp1, &fp2, &SimilarityWeights::LEDGER_SCAN);
        if sim.is_likely_duplicate() {
            pairs.push(DuplicatePair {
                first,
                second,
                score_pct: sim.percent(),
                reasons: sim.reasons.iter().map(|r| r.describe()).collect(),
            });
        }
    }
    log::debug!("ledger scan found {} likely duplicate pairs", pairs.len());
    Ok(pairs)
}
