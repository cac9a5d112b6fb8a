use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

use crate::error::Result;
use crate::scoring::{self, HeuristicFeatures, RiskFactors, RiskLevel};

/// Success rate assumed for projections when no cheque has been processed
/// in the past year.
pub const DEFAULT_SUCCESS_RATE: f64 = 0.8;

const BOUNCE_STATUSES: &str = "('bounced', 'unpaid')";
const PROCESSED_STATUSES: &str = "('cleared', 'bounced', 'unpaid')";
const OPEN_STATUSES: &str = "('pending', 'deposited')";

fn ts(dt: NaiveDateTime) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn ymd(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// `created_at` range clause shared by the date-filtered reports.
fn created_range(alias: &str, from: Option<&str>, to: Option<&str>) -> (String, Vec<String>) {
    let mut clause = String::from("1=1");
    let mut params = Vec::new();
    if let Some(f) = from {
        params.push(f.to_string());
        clause.push_str(&format!(" AND date({alias}created_at) >= ?{}", params.len()));
    }
    if let Some(t) = to {
        params.push(t.to_string());
        clause.push_str(&format!(" AND date({alias}created_at) <= ?{}", params.len()));
    }
    (clause, params)
}

fn as_sql(params: &[String]) -> Vec<&dyn rusqlite::types::ToSql> {
    params.iter().map(|p| p as &dyn rusqlite::types::ToSql).collect()
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct StatusTotal {
    pub status: String,
    pub count: i64,
    pub amount: f64,
}

#[derive(Debug, Serialize)]
pub struct BankTotal {
    pub bank: String,
    pub count: i64,
    pub amount: f64,
}

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub total_cheques: i64,
    pub total_amount: f64,
    pub by_status: Vec<StatusTotal>,
    pub overdue_count: i64,
    pub overdue_amount: f64,
    pub top_banks: Vec<BankTotal>,
}

pub fn dashboard_stats(conn: &Connection, today: NaiveDate) -> Result<DashboardStats> {
    let (total_cheques, total_amount): (i64, f64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(amount), 0) FROM cheques",
        [],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;

    let mut stmt = conn.prepare(
        "SELECT status, COUNT(*), COALESCE(SUM(amount), 0) FROM cheques GROUP BY status ORDER BY status",
    )?;
    let by_status = stmt
        .query_map([], |row| {
            Ok(StatusTotal {
                status: row.get(0)?,
                count: row.get(1)?,
                amount: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let (overdue_count, overdue_amount): (i64, f64) = conn.query_row(
        &format!(
            "SELECT COUNT(*), COALESCE(SUM(amount), 0) FROM cheques \
             WHERE status IN {OPEN_STATUSES} AND due_date < ?1"
        ),
        [ymd(today)],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;

    let mut stmt = conn.prepare(
        "SELECT bk.name, COUNT(*), COALESCE(SUM(c.amount), 0) FROM cheques c \
         JOIN branches b ON c.branch_id = b.id JOIN banks bk ON b.bank_id = bk.id \
         GROUP BY bk.id, bk.name ORDER BY SUM(c.amount) DESC LIMIT 5",
    )?;
    let top_banks = stmt
        .query_map([], |row| {
            Ok(BankTotal {
                bank: row.get(0)?,
                count: row.get(1)?,
                amount: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(DashboardStats {
        total_cheques,
        total_amount,
        by_status,
        overdue_count,
        overdue_amount,
        top_banks,
    })
}

// ---------------------------------------------------------------------------
// Aging
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct AgingRow {
    pub status: String,
    pub avg_days: f64,
    pub min_days: i64,
    pub max_days: i64,
    pub count: i64,
    pub percentage: f64,
}

/// Days each cheque has spent in its current status, grouped by status.
/// Pending cheques are measured up to `now`; others from creation to their
/// last update.
pub fn aging_analysis(conn: &Connection, from: Option<&str>, to: Option<&str>, now: NaiveDateTime) -> Result<Vec<AgingRow>> {
    let (clause, mut params) = created_range("c.", from, to);
    params.push(ts(now));
    let now_idx = params.len();
    let sql = format!(
        "WITH durations AS ( \
            SELECT c.status, \
                   CASE WHEN c.status = 'pending' THEN julianday(?{now_idx}) - julianday(c.created_at) \
                        ELSE julianday(c.updated_at) - julianday(c.created_at) END AS days \
            FROM cheques c WHERE {clause} \
         ) \
         SELECT status, AVG(days), MIN(days), MAX(days), COUNT(*), \
                COUNT(*) * 100.0 / (SELECT COUNT(*) FROM durations) \
         FROM durations GROUP BY status ORDER BY AVG(days) DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(as_sql(&params).as_slice(), |row| {
        Ok(AgingRow {
            status: row.get(0)?,
            avg_days: round2(row.get(1)?),
            min_days: row.get::<_, f64>(2)? as i64,
            max_days: row.get::<_, f64>(3)? as i64,
            count: row.get(4)?,
            percentage: round2(row.get(5)?),
        })
    })?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

// ---------------------------------------------------------------------------
// Seasonal trends
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct PeriodTotal {
    /// `YYYY-MM` for months, `YYYY-Qn` for quarters.
    pub period: String,
    pub count: i64,
    pub total: f64,
    pub avg: f64,
}

#[derive(Debug, Serialize)]
pub struct WeekdayTotal {
    pub day: &'static str,
    pub count: i64,
    pub avg_amount: f64,
}

#[derive(Debug, Serialize)]
pub struct SeasonalTrends {
    pub monthly: Vec<PeriodTotal>,
    pub quarterly: Vec<PeriodTotal>,
    pub weekdays: Vec<WeekdayTotal>,
}

const WEEKDAYS: [&str; 7] = ["Dimanche", "Lundi", "Mardi", "Mercredi", "Jeudi", "Vendredi", "Samedi"];

/// Monthly and quarterly totals over the last `years` years, and day-of-week
/// patterns over the last year, all by creation date.
pub fn seasonal_trends(conn: &Connection, years: u32, now: NaiveDateTime) -> Result<SeasonalTrends> {
    let since = ts(now - chrono::Duration::days(365 * i64::from(years)));
    let year_ago = ts(now - chrono::Duration::days(365));

    let period_rows = |sql: &str, since: &str| -> Result<Vec<PeriodTotal>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([since], |row| {
            Ok(PeriodTotal {
                period: row.get(0)?,
                count: row.get(1)?,
                total: row.get(2)?,
                avg: round2(row.get(3)?),
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    };

    let monthly = period_rows(
        "SELECT strftime('%Y-%m', created_at) AS p, COUNT(*), SUM(amount), AVG(amount) \
         FROM cheques WHERE created_at >= ?1 GROUP BY p ORDER BY p",
        &since,
    )?;
    let quarterly = period_rows(
        "SELECT strftime('%Y', created_at) || '-Q' || ((CAST(strftime('%m', created_at) AS INTEGER) + 2) / 3) AS p, \
                COUNT(*), SUM(amount), AVG(amount) \
         FROM cheques WHERE created_at >= ?1 GROUP BY p ORDER BY p",
        &since,
    )?;

    let mut stmt = conn.prepare(
        "SELECT CAST(strftime('%w', created_at) AS INTEGER) AS d, COUNT(*), AVG(amount) \
         FROM cheques WHERE created_at >= ?1 GROUP BY d ORDER BY d",
    )?;
    let weekdays = stmt
        .query_map([&year_ago], |row| {
            let d: usize = row.get::<_, i64>(0)?.clamp(0, 6) as usize;
            Ok(WeekdayTotal {
                day: WEEKDAYS[d],
                count: row.get(1)?,
                avg_amount: round2(row.get(2)?),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(SeasonalTrends {
        monthly,
        quarterly,
        weekdays,
    })
}

// ---------------------------------------------------------------------------
// Client risk
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ClientRiskProfile {
    pub client_id: i64,
    pub client_name: String,
    pub risk_level: RiskLevel,
    pub risk_score: f64,
    pub bounce_rate: f64,
    pub total_cheques: i64,
    pub total_amount: f64,
    pub avg_processing_days: f64,
    pub last_bounce: Option<String>,
}

/// Risk profile of every active client with at least one cheque, largest
/// total first.
pub fn client_risk_profiles(conn: &Connection, now: NaiveDateTime) -> Result<Vec<ClientRiskProfile>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT cl.id, cl.name, COUNT(c.id), COALESCE(SUM(c.amount), 0), \
                SUM(CASE WHEN c.status IN {BOUNCE_STATUSES} THEN 1 ELSE 0 END), \
                AVG(julianday(c.updated_at) - julianday(c.created_at)), \
                MAX(CASE WHEN c.status IN {BOUNCE_STATUSES} THEN c.updated_at END) \
         FROM clients cl JOIN cheques c ON cl.id = c.client_id \
         WHERE cl.active = 1 \
         GROUP BY cl.id, cl.name \
         ORDER BY SUM(c.amount) DESC"
    ))?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, f64>(3)?,
            row.get::<_, i64>(4)?,
            row.get::<_, Option<f64>>(5)?,
            row.get::<_, Option<String>>(6)?,
        ))
    })?;

    let mut profiles = Vec::new();
    for row in rows {
        let (client_id, client_name, total, amount, bounced, processing, last_bounce) = row?;
        let bounce_rate = if total > 0 { bounced as f64 / total as f64 * 100.0 } else { 0.0 };
        let factors = RiskFactors {
            bounce_rate_pct: bounce_rate,
            total_cheques: total,
            total_amount: amount,
            avg_processing_days: processing.unwrap_or(0.0),
            last_bounce: last_bounce
                .as_deref()
                .and_then(|s| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").ok()),
        };
        let score = scoring::profile_risk_score(&factors, now);
        profiles.push(ClientRiskProfile {
            client_id,
            client_name,
            risk_level: RiskLevel::from_score(score),
            risk_score: round2(score),
            bounce_rate: round2(bounce_rate),
            total_cheques: total,
            total_amount: amount,
            avg_processing_days: round2(factors.avg_processing_days),
            last_bounce: last_bounce.map(|s| s.chars().take(10).collect()),
        });
    }
    Ok(profiles)
}

/// Gather the heuristic features of one client's cheque history.
pub fn heuristic_features(conn: &Connection, client_id: i64, now: NaiveDateTime) -> Result<HeuristicFeatures> {
    let row = conn
        .query_row(
            &format!(
                "SELECT COUNT(*), COALESCE(AVG(amount), 0), \
                        COALESCE(SUM(CASE WHEN status IN {BOUNCE_STATUSES} THEN 1 ELSE 0 END), 0), \
                        AVG(julianday(updated_at) - julianday(created_at)), \
                        MAX(created_at), COUNT(DISTINCT branch_id) \
                 FROM cheques WHERE client_id = ?1"
            ),
            [client_id],
            |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, f64>(1)?,
                    r.get::<_, i64>(2)?,
                    r.get::<_, Option<f64>>(3)?,
                    r.get::<_, Option<String>>(4)?,
                    r.get::<_, i64>(5)?,
                ))
            },
        )
        .optional()?;
    let (total, avg, bounced, processing, last, branches) = row.unwrap_or((0, 0.0, 0, None, None, 0));
    let days_since_last = last
        .as_deref()
        .and_then(|s| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").ok())
        .map(|d| (now - d).num_days());
    Ok(HeuristicFeatures {
        total_cheques: total,
        avg_amount: avg,
        bounced,
        avg_processing_days: processing,
        days_since_last_cheque: days_since_last,
        branches_used: branches,
    })
}

// ---------------------------------------------------------------------------
// Performance
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct OverallMetrics {
    pub total_cheques: i64,
    pub total_amount: f64,
    pub avg_amount: f64,
    /// Cleared over processed, in percent.
    pub success_rate: f64,
    pub avg_processing_days: f64,
    pub unique_clients: i64,
    pub unique_branches: i64,
}

#[derive(Debug, Serialize)]
pub struct BankPerformance {
    pub bank: String,
    pub count: i64,
    pub total_amount: f64,
    pub avg_processing_days: Option<f64>,
    pub success_rate: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct MonthTrend {
    pub month: String,
    pub count: i64,
    pub total_amount: f64,
    pub avg_amount: f64,
    pub success_rate: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct PerformanceMetrics {
    pub overall: OverallMetrics,
    pub banks: Vec<BankPerformance>,
    pub monthly: Vec<MonthTrend>,
}

pub fn performance_metrics(conn: &Connection, from: Option<&str>, to: Option<&str>) -> Result<PerformanceMetrics> {
    let (clause, params) = created_range("c.", from, to);
    let p = as_sql(&params);

    let overall = conn.query_row(
        &format!(
            "SELECT COUNT(*), COALESCE(SUM(amount), 0), COALESCE(AVG(amount), 0), \
                    COALESCE(SUM(CASE WHEN status = 'cleared' THEN 1 ELSE 0 END), 0), \
                    COALESCE(SUM(CASE WHEN status IN {BOUNCE_STATUSES} THEN 1 ELSE 0 END), 0), \
                    AVG(CASE WHEN status IN {PROCESSED_STATUSES} THEN julianday(updated_at) - julianday(created_at) END), \
                    COUNT(DISTINCT client_id), COUNT(DISTINCT branch_id) \
             FROM cheques c WHERE {clause}"
        ),
        p.as_slice(),
        |r| {
            let cleared: i64 = r.get(3)?;
            let failed: i64 = r.get(4)?;
            let processed = cleared + failed;
            Ok(OverallMetrics {
                total_cheques: r.get(0)?,
                total_amount: r.get(1)?,
                avg_amount: round2(r.get(2)?),
                success_rate: if processed > 0 { round2(cleared as f64 / processed as f64 * 100.0) } else { 0.0 },
                avg_processing_days: round2(r.get::<_, Option<f64>>(5)?.unwrap_or(0.0)),
                unique_clients: r.get(6)?,
                unique_branches: r.get(7)?,
            })
        },
    )?;

    let success_expr = format!(
        "SUM(CASE WHEN c.status = 'cleared' THEN 1 ELSE 0 END) * 100.0 / \
         NULLIF(SUM(CASE WHEN c.status IN {PROCESSED_STATUSES} THEN 1 ELSE 0 END), 0)"
    );

    let mut stmt = conn.prepare(&format!(
        "SELECT bk.name, COUNT(c.id), SUM(c.amount), \
                AVG(CASE WHEN c.status IN {PROCESSED_STATUSES} THEN julianday(c.updated_at) - julianday(c.created_at) END), \
                {success_expr} \
         FROM cheques c JOIN branches b ON c.branch_id = b.id JOIN banks bk ON b.bank_id = bk.id \
         WHERE {clause} GROUP BY bk.id, bk.name ORDER BY SUM(c.amount) DESC"
    ))?;
    let banks = stmt
        .query_map(p.as_slice(), |row| {
            Ok(BankPerformance {
                bank: row.get(0)?,
                count: row.get(1)?,
                total_amount: row.get(2)?,
                avg_processing_days: row.get::<_, Option<f64>>(3)?.map(round2),
                success_rate: row.get::<_, Option<f64>>(4)?.map(round2),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(&format!(
        "SELECT strftime('%Y-%m', c.created_at) AS m, COUNT(*), SUM(c.amount), AVG(c.amount), {success_expr} \
         FROM cheques c WHERE {clause} GROUP BY m ORDER BY m DESC LIMIT 12"
    ))?;
    let monthly = stmt
        .query_map(p.as_slice(), |row| {
            Ok(MonthTrend {
                month: row.get(0)?,
                count: row.get(1)?,
                total_amount: row.get(2)?,
                avg_amount: round2(row.get(3)?),
                success_rate: row.get::<_, Option<f64>>(4)?.map(round2),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(PerformanceMetrics { overall, banks, monthly })
}

// ---------------------------------------------------------------------------
// Cash flow
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct CashFlowDay {
    pub date: String,
    pub pending_amount: f64,
    pub expected_amount: f64,
    pub cheque_count: i64,
    pub cumulative_amount: f64,
}

#[derive(Debug, Serialize)]
pub struct CashFlowProjection {
    pub days: Vec<CashFlowDay>,
    pub total_expected: f64,
    pub total_pending: f64,
    /// Historical success rate applied, in percent.
    pub success_rate: f64,
    pub days_analyzed: i64,
}

/// Expected receipts from open cheques due in the next `days_ahead` days,
/// discounted by the cleared ratio of the past year's processed cheques.
pub fn cash_flow_projection(conn: &Connection, today: NaiveDate, days_ahead: i64) -> Result<CashFlowProjection> {
    let end = today + chrono::Duration::days(days_ahead);
    let mut stmt = conn.prepare(&format!(
        "SELECT due_date, SUM(amount), COUNT(*) FROM cheques \
         WHERE status IN {OPEN_STATUSES} AND due_date BETWEEN ?1 AND ?2 \
         GROUP BY due_date ORDER BY due_date"
    ))?;
    let open = stmt
        .query_map([ymd(today), ymd(end)], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?, row.get::<_, i64>(2)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let year_ago = ymd(today - chrono::Duration::days(365));
    let historical: Option<f64> = conn.query_row(
        &format!(
            "SELECT AVG(CASE WHEN status = 'cleared' THEN 1.0 ELSE 0.0 END) FROM cheques \
             WHERE status IN {PROCESSED_STATUSES} AND created_at >= ?1"
        ),
        [year_ago],
        |r| r.get(0),
    )?;
    let rate = historical.unwrap_or(DEFAULT_SUCCESS_RATE);

    let mut days = Vec::with_capacity(open.len());
    let mut cumulative = 0.0;
    let mut total_pending = 0.0;
    for (date, amount, count) in open {
        let expected = amount * rate;
        cumulative += expected;
        total_pending += amount;
        days.push(CashFlowDay {
            date,
            pending_amount: amount,
            expected_amount: round2(expected),
            cheque_count: count,
            cumulative_amount: round2(cumulative),
        });
    }

    Ok(CashFlowProjection {
        days,
        total_expected: round2(cumulative),
        total_pending,
        success_rate: (rate * 1000.0).round() / 10.0,
        days_analyzed: days_ahead,
    })
}

// ---------------------------------------------------------------------------
// Report breakdowns
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct MonthSummary {
    pub month: String,
    pub count: i64,
    pub total: f64,
    pub cleared: f64,
    pub bounced: f64,
    pub open: f64,
}

/// Per-month totals for `year` by due date.
pub fn monthly_summary(conn: &Connection, year: i32) -> Result<Vec<MonthSummary>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT strftime('%Y-%m', due_date) AS m, COUNT(*), SUM(amount), \
                SUM(CASE WHEN status = 'cleared' THEN amount ELSE 0 END), \
                SUM(CASE WHEN status IN {BOUNCE_STATUSES} THEN amount ELSE 0 END), \
                SUM(CASE WHEN status IN {OPEN_STATUSES} THEN amount ELSE 0 END) \
         FROM cheques WHERE strftime('%Y', due_date) = ?1 GROUP BY m ORDER BY m"
    ))?;
    let rows = stmt.query_map([year.to_string()], |row| {
        Ok(MonthSummary {
            month: row.get(0)?,
            count: row.get(1)?,
            total: row.get(2)?,
            cleared: row.get(3)?,
            bounced: row.get(4)?,
            open: row.get(5)?,
        })
    })?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

#[derive(Debug, Serialize)]
pub struct BankStatusSummary {
    pub bank: String,
    pub count: i64,
    pub total: f64,
    pub cleared: i64,
    pub bounced: i64,
    pub open: i64,
}

pub fn status_by_bank(conn: &Connection) -> Result<Vec<BankStatusSummary>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT bk.name, COUNT(c.id), COALESCE(SUM(c.amount), 0), \
                SUM(CASE WHEN c.status = 'cleared' THEN 1 ELSE 0 END), \
                SUM(CASE WHEN c.status IN {BOUNCE_STATUSES} THEN 1 ELSE 0 END), \
                SUM(CASE WHEN c.status IN {OPEN_STATUSES} THEN 1 ELSE 0 END) \
         FROM cheques c JOIN branches b ON c.branch_id = b.id JOIN banks bk ON b.bank_id = bk.id \
         GROUP BY bk.id, bk.name ORDER BY SUM(c.amount) DESC"
    ))?;
    let rows = stmt.query_map([], |row| {
        Ok(BankStatusSummary {
            bank: row.get(0)?,
            count: row.get(1)?,
            total: row.get(2)?,
            cleared: row.get(3)?,
            bounced: row.get(4)?,
            open: row.get(5)?,
        })
    })?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

#[derive(Debug, Serialize)]
pub struct ClientTotal {
    pub client_id: i64,
    pub name: String,
    pub count: i64,
    pub total: f64,
    pub bounced: i64,
}

pub fn top_clients(conn: &Connection, limit: usize) -> Result<Vec<ClientTotal>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT cl.id, cl.name, COUNT(c.id), SUM(c.amount), \
                SUM(CASE WHEN c.status IN {BOUNCE_STATUSES} THEN 1 ELSE 0 END) \
         FROM cheques c JOIN clients cl ON c.client_id = cl.id \
         GROUP BY cl.id, cl.name ORDER BY SUM(c.amount) DESC LIMIT {limit}"
    ))?;
    let rows = stmt.query_map([], |row| {
        Ok(ClientTotal {
            client_id: row.get(0)?,
            name: row.get(1)?,
            count: row.get(2)?,
            total: row.get(3)?,
            bounced: row.get(4)?,
        })
    })?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}
