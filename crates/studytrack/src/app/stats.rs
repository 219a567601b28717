//! Statistics rollups: daily, weekly, and monthly overviews, productivity
//! trends, and period comparisons.

use std::sync::Arc;

use serde::Serialize;
use time::{Date, Month};

use crate::app::AppServices;
use crate::db::{Database, DailyRollupRow, PeriodTotalsRow};
use crate::domain::dates::{add_days, format_date, month_length, today_utc, week_start};
use crate::domain::stats::{TrendDirection, classify_trend, percentage_change, round1};
use crate::{Error, Result};

/// Days covered by the default productivity trend window.
pub const DEFAULT_TREND_DAYS: i64 = 7;

/// Aggregated figures for one calendar day.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DailyStats {
    pub date: String,
    pub sessions_count: i64,
    pub total_minutes: i64,
    pub total_break_minutes: i64,
    /// Mean productivity over the day's scored sessions, `0.0` when none.
    pub avg_productivity: f64,
    pub subjects: Vec<String>,
}

/// Activity recorded on one day of a weekly overview. Days without sessions
/// appear with zeroes.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct DayActivity {
    pub date: String,
    pub sessions: i64,
    pub total_minutes: i64,
}

/// A Monday-to-Sunday summary around a given day.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WeeklyOverview {
    pub week_start: String,
    pub week_end: String,
    pub total_sessions: i64,
    pub total_minutes: i64,
    /// Minutes averaged over all seven days, studied or not.
    pub average_per_day: f64,
    /// Earliest day with the highest nonzero minute total.
    pub most_productive_day: Option<String>,
    pub days: Vec<DayActivity>,
}

/// A calendar-month summary.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MonthlyOverview {
    /// The month in `YYYY-MM` form.
    pub month: String,
    pub active_days: i64,
    pub days_in_month: i64,
    /// Share of the month's days with at least one session, in percent.
    pub consistency_percentage: f64,
    pub total_sessions: i64,
    pub total_minutes: i64,
    pub average_per_active_day: f64,
    pub avg_productivity: f64,
}

/// One day inside a productivity trend window.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrendPoint {
    pub date: String,
    pub avg_productivity: f64,
    pub sessions: i64,
    pub total_minutes: i64,
}

/// A classified productivity trend over a trailing window.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProductivityTrend {
    pub direction: TrendDirection,
    pub days: Vec<TrendPoint>,
}

/// Which trailing window a period comparison covers.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonPeriod {
    Week,
    Month,
}

/// Totals for one side of a period comparison.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PeriodTotals {
    pub total_sessions: i64,
    pub total_minutes: i64,
    pub avg_productivity: f64,
}

/// The current period measured against the one before it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PeriodComparison {
    pub period: ComparisonPeriod,
    pub current: PeriodTotals,
    pub previous: PeriodTotals,
    pub sessions_change: f64,
    pub minutes_change: f64,
    pub productivity_change: f64,
}

/// Implements the statistics rollups on top of the database layer.
pub struct StatsManager {
    services: Arc<AppServices>,
}

impl StatsManager {
    /// Creates a manager over the shared services.
    pub fn new(services: Arc<AppServices>) -> Self {
        Self { services }
    }

    fn db(&self) -> &Database {
        self.services.db()
    }

    /// Aggregates today's sessions.
    ///
    /// # Errors
    /// Returns an error if the aggregate query fails.
    pub async fn daily_stats_today(&self, user_id: i64) -> Result<DailyStats> {
        self.daily_stats(user_id, today_utc()).await
    }

    /// Aggregates the sessions of one calendar day.
    ///
    /// # Errors
    /// Returns an error if the aggregate query fails.
    pub async fn daily_stats(&self, user_id: i64, date: Date) -> Result<DailyStats> {
        let formatted = format_date(date);
        let aggregate = self.db().daily_aggregate(user_id, &formatted).await?;

        Ok(DailyStats {
            date: formatted,
            sessions_count: aggregate.session_count,
            total_minutes: aggregate.total_minutes,
            total_break_minutes: aggregate.total_break_minutes,
            avg_productivity: round1(aggregate.avg_productivity.unwrap_or(0.0)),
            subjects: aggregate.subject_names,
        })
    }

    /// Summarizes the Monday-to-Sunday week containing today.
    ///
    /// # Errors
    /// Returns an error if the rollup query fails.
    pub async fn weekly_overview_now(&self, user_id: i64) -> Result<WeeklyOverview> {
        self.weekly_overview(user_id, today_utc()).await
    }

    /// Summarizes the Monday-to-Sunday week containing an explicit day.
    ///
    /// Every one of the seven days appears in `days`, zeroed when nothing was
    /// studied.
    ///
    /// # Errors
    /// Returns an error if the rollup query fails.
    #[allow(clippy::cast_precision_loss)]
    pub async fn weekly_overview(&self, user_id: i64, today: Date) -> Result<WeeklyOverview> {
        let start = week_start(today);
        let end = add_days(start, 7);
        let rollups = self
            .db()
            .daily_rollups(user_id, &format_date(start), &format_date(end))
            .await?;

        let mut days = Vec::with_capacity(7);
        for offset in 0..7 {
            let date = format_date(add_days(start, offset));
            let rollup = rollups.iter().find(|rollup| rollup.date == date);
            days.push(DayActivity {
                date,
                sessions: rollup.map_or(0, |rollup| rollup.session_count),
                total_minutes: rollup.map_or(0, |rollup| rollup.total_minutes),
            });
        }

        let total_sessions: i64 = days.iter().map(|day| day.sessions).sum();
        let total_minutes: i64 = days.iter().map(|day| day.total_minutes).sum();
        // Ties go to the earliest day.
        let mut most_productive_day: Option<&DayActivity> = None;
        for day in days.iter().filter(|day| day.total_minutes > 0) {
            if most_productive_day.is_none_or(|best| day.total_minutes > best.total_minutes) {
                most_productive_day = Some(day);
            }
        }
        let most_productive_day = most_productive_day.map(|day| day.date.clone());

        Ok(WeeklyOverview {
            week_start: format_date(start),
            week_end: format_date(add_days(start, 6)),
            total_sessions,
            total_minutes,
            average_per_day: round1(total_minutes as f64 / 7.0),
            most_productive_day,
            days,
        })
    }

    /// Summarizes the calendar month containing today.
    ///
    /// # Errors
    /// Returns an error if the rollup query fails.
    pub async fn monthly_overview_now(&self, user_id: i64) -> Result<MonthlyOverview> {
        let today = today_utc();

        self.monthly_overview(user_id, today.year(), today.month())
            .await
    }

    /// Summarizes one calendar month. Consistency is the share of the month's
    /// days with at least one session.
    ///
    /// # Errors
    /// Returns an error if the rollup query fails.
    #[allow(clippy::cast_precision_loss)]
    pub async fn monthly_overview(
        &self,
        user_id: i64,
        year: i32,
        month: Month,
    ) -> Result<MonthlyOverview> {
        let first = first_of_month(year, month)?;
        let (next_year, next_month) = match month {
            Month::December => (year + 1, Month::January),
            _ => (year, month.next()),
        };
        let next_first = first_of_month(next_year, next_month)?;

        let rollups = self
            .db()
            .daily_rollups(user_id, &format_date(first), &format_date(next_first))
            .await?;
        let totals = self
            .db()
            .period_totals(user_id, &format_date(first), &format_date(next_first))
            .await?;

        let active_days = i64::try_from(rollups.len()).unwrap_or(0);
        let days_in_month = i64::from(month_length(year, month));
        let average_per_active_day = if active_days == 0 {
            0.0
        } else {
            round1(totals.total_minutes as f64 / active_days as f64)
        };

        Ok(MonthlyOverview {
            month: format!("{year:04}-{:02}", u8::from(month)),
            active_days,
            days_in_month,
            consistency_percentage: round1(active_days as f64 / days_in_month as f64 * 100.0),
            total_sessions: totals.total_sessions,
            total_minutes: totals.total_minutes,
            average_per_active_day,
            avg_productivity: round1(totals.avg_productivity.unwrap_or(0.0)),
        })
    }

    /// Classifies the productivity trend over the default trailing window
    /// ending today.
    ///
    /// # Errors
    /// Returns an error if the rollup query fails.
    pub async fn productivity_trend_now(&self, user_id: i64) -> Result<ProductivityTrend> {
        self.productivity_trend(user_id, DEFAULT_TREND_DAYS, today_utc())
            .await
    }

    /// Classifies the productivity trend over a trailing window ending on an
    /// explicit day. Days without sessions do not contribute a point.
    ///
    /// # Errors
    /// Returns an error if the window is shorter than two days or the rollup
    /// query fails.
    pub async fn productivity_trend(
        &self,
        user_id: i64,
        days: i64,
        today: Date,
    ) -> Result<ProductivityTrend> {
        if days < 2 {
            return Err(Error::Validation(
                "trend window must cover at least 2 days".to_string(),
            ));
        }

        let start = add_days(today, -(days - 1));
        let end = add_days(today, 1);
        let rollups = self
            .db()
            .daily_rollups(user_id, &format_date(start), &format_date(end))
            .await?;

        let points: Vec<TrendPoint> = rollups.iter().map(trend_point).collect();
        let values: Vec<f64> = points.iter().map(|point| point.avg_productivity).collect();

        Ok(ProductivityTrend {
            direction: classify_trend(&values),
            days: points,
        })
    }

    /// Compares the current week or month with the one before it, as of
    /// today.
    ///
    /// # Errors
    /// Returns an error if the aggregate queries fail.
    pub async fn period_comparison_now(
        &self,
        user_id: i64,
        period: ComparisonPeriod,
    ) -> Result<PeriodComparison> {
        self.period_comparison(user_id, period, today_utc()).await
    }

    /// Compares the period containing an explicit day with the one before it.
    ///
    /// # Errors
    /// Returns an error if the aggregate queries fail.
    #[allow(clippy::cast_precision_loss)]
    pub async fn period_comparison(
        &self,
        user_id: i64,
        period: ComparisonPeriod,
        today: Date,
    ) -> Result<PeriodComparison> {
        let (current_start, current_end, previous_start) = match period {
            ComparisonPeriod::Week => {
                let start = week_start(today);
                (start, add_days(start, 7), add_days(start, -7))
            }
            ComparisonPeriod::Month => {
                let start = first_of_month(today.year(), today.month())?;
                let (previous_year, previous_month) = match today.month() {
                    Month::January => (today.year() - 1, Month::December),
                    month => (today.year(), month.previous()),
                };

                (
                    start,
                    add_days(start, i64::from(month_length(today.year(), today.month()))),
                    first_of_month(previous_year, previous_month)?,
                )
            }
        };

        let current = self
            .db()
            .period_totals(user_id, &format_date(current_start), &format_date(current_end))
            .await?;
        let previous = self
            .db()
            .period_totals(user_id, &format_date(previous_start), &format_date(current_start))
            .await?;

        let sessions_change = percentage_change(
            previous.total_sessions as f64,
            current.total_sessions as f64,
        );
        let minutes_change =
            percentage_change(previous.total_minutes as f64, current.total_minutes as f64);
        // Measured over the 1 dp averages the payload reports.
        let productivity_change = percentage_change(
            round1(previous.avg_productivity.unwrap_or(0.0)),
            round1(current.avg_productivity.unwrap_or(0.0)),
        );

        Ok(PeriodComparison {
            period,
            current: period_totals(&current),
            previous: period_totals(&previous),
            sessions_change,
            minutes_change,
            productivity_change,
        })
    }
}

fn first_of_month(year: i32, month: Month) -> Result<Date> {
    Date::from_calendar_date(year, month, 1)
        .map_err(|err| Error::Validation(format!("invalid month: {err}")))
}

fn period_totals(row: &PeriodTotalsRow) -> PeriodTotals {
    PeriodTotals {
        total_sessions: row.total_sessions,
        total_minutes: row.total_minutes,
        avg_productivity: round1(row.avg_productivity.unwrap_or(0.0)),
    }
}

fn trend_point(rollup: &DailyRollupRow) -> TrendPoint {
    TrendPoint {
        date: rollup.date.clone(),
        avg_productivity: round1(rollup.avg_productivity.unwrap_or(0.0)),
        sessions: rollup.session_count,
        total_minutes: rollup.total_minutes,
    }
}
