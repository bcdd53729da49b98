use crate::prelude::*;

use std::ops::Range;

use chrono::{Datelike, NaiveTime};

use super::store::CaseStore;
use crate::persistence::{CaseGrouping, GroupTotals};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub total: u64,
    pub total_expenses: f64,
    pub total_fees_paid: f64,
    pub total_fees_remaining: f64,
    pub net_profit: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ByStatus {
    pub pending: u64,
    pub approved: u64,
}

/// Cases created within one calendar period.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PeriodStats {
    pub total: u64,
    pub approved: u64,
    pub pending: u64,
    /// Fees paid on those cases.
    pub revenue: f64,
    pub expenses: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseTypeStats {
    pub case_type: Option<String>,
    pub count: u64,
    pub total_fees_paid: f64,
    pub total_expenses: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Financial {
    pub total_revenue: f64,
    pub total_expenses: f64,
    pub net_profit: f64,
    /// Net profit as a percentage of revenue; 0 without revenue.
    pub profit_margin: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    pub current_month: u32,
    pub current_year: i32,
}

/// Office-wide totals: the whole store, the current month and year, and per case type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseStats {
    pub overview: Overview,
    pub by_status: ByStatus,
    pub monthly: PeriodStats,
    pub yearly: PeriodStats,
    pub by_case_type: Vec<CaseTypeStats>,
    pub financial: Financial,
    /// Reported next to the stats rather than inside them.
    #[serde(skip)]
    pub period: Period,
}

fn status_count(groups: &[GroupTotals], status: &str) -> u64 {
    groups
        .iter()
        .filter(|g| g.key.as_deref() == Some(status))
        .map(|g| g.count)
        .sum()
}

fn period_stats(groups: &[GroupTotals]) -> PeriodStats {
    PeriodStats {
        total: groups.iter().map(|g| g.count).sum(),
        approved: status_count(groups, "approved"),
        pending: status_count(groups, "pending"),
        revenue: groups.iter().map(|g| g.paid).sum(),
        expenses: groups.iter().map(|g| g.expenses).sum(),
    }
}

fn month_start(year: i32, month: u32) -> Result<DateTime<Utc>> {
    let (year, month) = if month > 12 { (year + 1, 1) } else { (year, month) };
    let day = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| anyhow!("no calendar month {year}-{month}"))?;
    Ok(day.and_time(NaiveTime::MIN).and_utc())
}

fn current_windows(at: DateTime<Utc>) -> Result<(Range<DateTime<Utc>>, Range<DateTime<Utc>>)> {
    let (year, month) = (at.year(), at.month());
    let this_month = month_start(year, month)?..month_start(year, month + 1)?;
    let this_year = month_start(year, 1)?..month_start(year + 1, 1)?;
    Ok((this_month, this_year))
}

impl CaseStore {
    /// Totals as of `at`; months and years are UTC calendar periods.
    pub async fn stats(&self, at: DateTime<Utc>) -> Result<CaseStats> {
        let (this_month, this_year) = current_windows(at)?;
        let records = self.records();
        let (all, monthly, yearly, by_type) = futures::try_join!(
            records.sum_cases(CaseGrouping::ApprovalStatus, None),
            records.sum_cases(CaseGrouping::ApprovalStatus, Some(this_month)),
            records.sum_cases(CaseGrouping::ApprovalStatus, Some(this_year)),
            records.sum_cases(CaseGrouping::CaseType, None),
        )?;

        let overall = period_stats(&all);
        let remaining: f64 = all.iter().map(|g| g.remaining).sum();
        let net_profit = overall.revenue - overall.expenses;
        let profit_margin = if overall.revenue > 0.0 {
            net_profit / overall.revenue * 100.0
        } else {
            0.0
        };

        Ok(CaseStats {
            overview: Overview {
                total: overall.total,
                total_expenses: overall.expenses,
                total_fees_paid: overall.revenue,
                total_fees_remaining: remaining,
                net_profit,
            },
            by_status: ByStatus {
                pending: overall.pending,
                approved: overall.approved,
            },
            monthly: period_stats(&monthly),
            yearly: period_stats(&yearly),
            by_case_type: by_type
                .into_iter()
                .map(|g| CaseTypeStats {
                    case_type: g.key,
                    count: g.count,
                    total_fees_paid: g.paid,
                    total_expenses: g.expenses,
                })
                .collect(),
            financial: Financial {
                total_revenue: overall.revenue,
                total_expenses: overall.expenses,
                net_profit,
                profit_margin,
            },
            period: Period {
                current_month: at.month(),
                current_year: at.year(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{Actor, ApprovalStatus, Case, Role};
    use crate::persistence::RecordStore;
    use crate::persistence::memory::MemoryRecordStore;
    use chrono::TimeZone;

    fn case(created: DateTime<Utc>, status: ApprovalStatus, case_type: Option<&str>) -> Case {
        Case {
            id: Uuid::new_v4(),
            case_number: None,
            year: created.year(),
            case_type: case_type.map(str::to_string),
            jurisdiction: None,
            client_name: None,
            opponent_name: None,
            previous_session: None,
            current_session: None,
            postponed_to: None,
            session_date: None,
            decision: None,
            request: None,
            notes: None,
            admin: None,
            expenses: Some(200.0),
            paid: 1000.0,
            remaining: 500.0,
            created_by: Uuid::nil(),
            approval_status: status,
            images: vec![],
            version: 1,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn test_windows_roll_over_december() {
        let at = Utc.with_ymd_and_hms(2024, 12, 31, 23, 0, 0).unwrap();
        let (month, year) = current_windows(at).unwrap();
        assert_eq!(month.start, Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap());
        assert_eq!(month.end, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(year.start, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(year.end, month.end);
    }

    #[tokio::test]
    async fn test_stats_totals_and_periods() {
        let records = Arc::new(MemoryRecordStore::new());
        let at = Utc.with_ymd_and_hms(2024, 5, 20, 12, 0, 0).unwrap();
        let this_month = Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap();
        let this_year = Utc.with_ymd_and_hms(2024, 2, 2, 8, 0, 0).unwrap();
        let last_year = Utc.with_ymd_and_hms(2023, 11, 2, 8, 0, 0).unwrap();
        for c in [
            case(this_month, ApprovalStatus::Approved, Some("civil")),
            case(this_month, ApprovalStatus::Pending, Some("civil")),
            case(this_year, ApprovalStatus::Approved, Some("criminal")),
            case(last_year, ApprovalStatus::Approved, None),
        ] {
            records.insert_case(&c).await.unwrap();
        }
        let stats = CaseStore::new(records).stats(at).await.unwrap();

        assert_eq!(stats.overview.total, 4);
        assert_eq!(stats.overview.total_fees_paid, 4000.0);
        assert_eq!(stats.overview.total_fees_remaining, 2000.0);
        assert_eq!(stats.overview.net_profit, 3200.0);
        assert_eq!(stats.by_status, ByStatus { pending: 1, approved: 3 });
        assert_eq!(stats.monthly.total, 2);
        assert_eq!((stats.monthly.approved, stats.monthly.pending), (1, 1));
        assert_eq!(stats.monthly.revenue, 2000.0);
        assert_eq!(stats.yearly.total, 3);
        assert_eq!(stats.yearly.expenses, 600.0);
        assert_eq!(stats.financial.profit_margin, 80.0);
        assert_eq!(stats.by_case_type[0].case_type.as_deref(), Some("civil"));
        assert_eq!(stats.by_case_type[0].count, 2);
        assert_eq!(stats.by_case_type.len(), 3);
        assert_eq!(
            stats.period,
            Period {
                current_month: 5,
                current_year: 2024
            }
        );
    }

    #[tokio::test]
    async fn test_empty_store_has_zero_margin() {
        let store = CaseStore::new(Arc::new(MemoryRecordStore::new()));
        let lawyer = Actor::new(Uuid::new_v4(), Role::Lawyer);
        let stats = store.stats(Utc::now()).await.unwrap();
        assert_eq!(stats.overview, Overview::default());
        assert_eq!(stats.financial.profit_margin, 0.0);
        assert!(stats.by_case_type.is_empty());

        store
            .create(Default::default(), vec![], &lawyer)
            .await
            .unwrap();
        let stats = store.stats(Utc::now()).await.unwrap();
        assert_eq!(stats.monthly.pending, 1);
        assert_eq!(stats.by_case_type[0].case_type, None);
    }
}
