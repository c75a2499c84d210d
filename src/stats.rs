use crate::models::{CalorieLog, HealthLog};
use chrono::{
    DateTime, Datelike, Days, Local, Months, NaiveDate, NaiveDateTime, TimeZone, Weekday,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    Daily,
    #[default]
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Bn,
    En,
}

impl Locale {
    /// First day of the week under the locale's calendar convention.
    pub fn week_start(self) -> Weekday {
        match self {
            Locale::Bn | Locale::En => Weekday::Sun,
        }
    }
}

impl std::str::FromStr for Locale {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "bn" => Ok(Locale::Bn),
            "en" => Ok(Locale::En),
            other => Err(format!("unsupported locale {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartQuery {
    pub mode: ViewMode,
    pub anchor: NaiveDate,
    pub week_start: Weekday,
}

/// One chart bucket. `start_date` is the first day the bucket covers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub label: String,
    pub start_date: String,
    pub calories: u64,
    pub steps: u64,
    pub water: u64,
    pub workout: u64,
    pub sleep: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct DayTotals {
    calories: f64,
    steps: f64,
    water: f64,
    workout: f64,
    sleep: f64,
}

impl DayTotals {
    fn has_data(&self) -> bool {
        self.calories > 0.0
            || self.steps > 0.0
            || self.water > 0.0
            || self.workout > 0.0
            || self.sleep > 0.0
    }

    fn add(&mut self, other: &DayTotals) {
        self.calories += other.calories;
        self.steps += other.steps;
        self.water += other.water;
        self.workout += other.workout;
        self.sleep += other.sleep;
    }

    fn divided_by(&self, days: u32) -> DayTotals {
        if days == 0 {
            return DayTotals::default();
        }
        let days = f64::from(days);
        DayTotals {
            calories: self.calories / days,
            steps: self.steps / days,
            water: self.water / days,
            workout: self.workout / days,
            sleep: self.sleep / days,
        }
    }

    fn into_point(self, label: String, start: NaiveDate) -> ChartPoint {
        ChartPoint {
            label,
            start_date: date_key(start),
            calories: whole(self.calories),
            steps: whole(self.steps),
            water: whole(self.water),
            workout: whole(self.workout),
            sleep: (self.sleep * 10.0).round() / 10.0,
        }
    }
}

fn whole(value: f64) -> u64 {
    value.max(0.0).round() as u64
}

pub fn build_chart(
    calorie_logs: &[CalorieLog],
    health_logs: &[HealthLog],
    query: &ChartQuery,
) -> Vec<ChartPoint> {
    build_chart_in(calorie_logs, health_logs, query, &Local)
}

/// Buckets logs for charting. Days are calendar days in `tz`.
///
/// Daily mode returns every day of the anchor's week. Weekly mode covers the
/// anchor's month and monthly mode the anchor's month plus the five before
/// it; both return only buckets that have logs, with each metric averaged
/// over the bucket's days that recorded anything.
pub fn build_chart_in<Tz: TimeZone>(
    calorie_logs: &[CalorieLog],
    health_logs: &[HealthLog],
    query: &ChartQuery,
    tz: &Tz,
) -> Vec<ChartPoint> {
    let days = bucket_by_day(calorie_logs, health_logs, tz);
    let anchor = query.anchor;

    match query.mode {
        ViewMode::Daily => {
            // Days of the week that fall outside chrono's range are left out.
            let back = days_into_week(anchor, query.week_start);
            (0..7)
                .filter_map(|offset| {
                    if offset < back {
                        anchor.checked_sub_days(Days::new(back - offset))
                    } else {
                        anchor.checked_add_days(Days::new(offset - back))
                    }
                })
                .map(|date| {
                    let totals = days.get(&date).copied().unwrap_or_default();
                    totals.into_point(date.format("%a").to_string(), date)
                })
                .collect()
        }
        ViewMode::Weekly => averaged_buckets(
            &days,
            month_start(anchor),
            month_end(anchor),
            |date| week_start(date, query.week_start),
            |start| start.format("%b %-d").to_string(),
        ),
        ViewMode::Monthly => {
            let start = month_start(anchor)
                .checked_sub_months(Months::new(5))
                .unwrap_or(NaiveDate::MIN);
            averaged_buckets(
                &days,
                start,
                month_end(anchor),
                month_start,
                |start| start.format("%b %y").to_string(),
            )
        }
    }
}

fn bucket_by_day<Tz: TimeZone>(
    calorie_logs: &[CalorieLog],
    health_logs: &[HealthLog],
    tz: &Tz,
) -> BTreeMap<NaiveDate, DayTotals> {
    let mut days: BTreeMap<NaiveDate, DayTotals> = BTreeMap::new();

    for log in calorie_logs {
        let Some(date) = parse_log_date(&log.date, tz) else {
            debug!(log_id = %log.id, date = %log.date, "skipping calorie log with invalid date");
            continue;
        };
        days.entry(date).or_default().calories += log.total_calories;
    }

    for log in health_logs {
        let Some(date) = parse_log_date(&log.date, tz) else {
            debug!(date = %log.date, "skipping health log with invalid date");
            continue;
        };
        let entry = days.entry(date).or_default();
        overwrite_nonzero(&mut entry.steps, f64::from(log.steps));
        overwrite_nonzero(&mut entry.water, f64::from(log.water));
        overwrite_nonzero(&mut entry.workout, f64::from(log.workout_minutes));
        overwrite_nonzero(&mut entry.sleep, log.sleep_hours);
    }

    days
}

fn overwrite_nonzero(slot: &mut f64, value: f64) {
    if value > 0.0 {
        *slot = value;
    }
}

fn averaged_buckets(
    days: &BTreeMap<NaiveDate, DayTotals>,
    start: NaiveDate,
    end: NaiveDate,
    bucket_of: impl Fn(NaiveDate) -> NaiveDate,
    label_of: impl Fn(NaiveDate) -> String,
) -> Vec<ChartPoint> {
    let mut buckets: BTreeMap<NaiveDate, (DayTotals, u32)> = BTreeMap::new();
    for (date, totals) in days.range(start..=end) {
        let (sum, active_days) = buckets.entry(bucket_of(*date)).or_default();
        sum.add(totals);
        if totals.has_data() {
            *active_days += 1;
        }
    }

    buckets
        .into_iter()
        .map(|(bucket_start, (sum, active_days))| {
            sum.divided_by(active_days)
                .into_point(label_of(bucket_start), bucket_start)
        })
        .collect()
}

/// Calendar day of a log entry in `tz`. Accepts `YYYY-MM-DD`, RFC 3339
/// timestamps and naive `YYYY-MM-DDTHH:MM:SS` timestamps.
pub fn parse_log_date<Tz: TimeZone>(raw: &str, tz: &Tz) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(timestamp.with_timezone(tz).date_naive());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|timestamp| timestamp.date())
}

/// Calorie logs filed on `date`, newest first.
pub fn calorie_logs_on<'a, Tz: TimeZone>(
    logs: &'a [CalorieLog],
    date: NaiveDate,
    tz: &Tz,
) -> Vec<&'a CalorieLog> {
    let mut matching: Vec<&CalorieLog> = logs
        .iter()
        .filter(|log| parse_log_date(&log.date, tz) == Some(date))
        .collect();
    matching.sort_by(|a, b| {
        let a = DateTime::parse_from_rfc3339(&a.date).ok();
        let b = DateTime::parse_from_rfc3339(&b.date).ok();
        b.cmp(&a)
    });
    matching
}

pub fn calories_on<Tz: TimeZone>(logs: &[CalorieLog], date: NaiveDate, tz: &Tz) -> f64 {
    calorie_logs_on(logs, date, tz)
        .iter()
        .map(|log| log.total_calories)
        .sum()
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// First day of the week containing `date`, clamped to `NaiveDate::MIN`.
pub fn week_start(date: NaiveDate, first_day: Weekday) -> NaiveDate {
    date.checked_sub_days(Days::new(days_into_week(date, first_day)))
        .unwrap_or(NaiveDate::MIN)
}

fn days_into_week(date: NaiveDate, first_day: Weekday) -> u64 {
    u64::from(
        (7 + date.weekday().num_days_from_sunday() - first_day.num_days_from_sunday()) % 7,
    )
}

fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn month_end(date: NaiveDate) -> NaiveDate {
    month_start(date)
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(date)
}
