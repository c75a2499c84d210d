use crate::models::{BmiStatus, HealthLog, UserProfile};
use crate::stats::{calories_on, parse_log_date};
use chrono::{Local, NaiveDate, TimeZone};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub date: String,
    pub today_calories: f64,
    pub yesterday_calories: f64,
    /// Change against yesterday in percent.
    pub trend_percentage: f64,
    pub recent_health_log: Option<HealthLog>,
    pub bmi: Option<f64>,
    pub bmi_status: Option<BmiStatus>,
}

pub fn build_dashboard(profile: &UserProfile) -> DashboardSummary {
    build_dashboard_at(profile, Local::now().date_naive(), &Local)
}

pub fn build_dashboard_at<Tz: TimeZone>(
    profile: &UserProfile,
    today: NaiveDate,
    tz: &Tz,
) -> DashboardSummary {
    let yesterday = today.pred_opt().unwrap_or(today);
    let today_calories = calories_on(&profile.calorie_logs, today, tz);
    let yesterday_calories = calories_on(&profile.calorie_logs, yesterday, tz);

    DashboardSummary {
        date: today.to_string(),
        today_calories,
        yesterday_calories,
        trend_percentage: trend_percentage(today_calories, yesterday_calories),
        recent_health_log: recent_health_log(&profile.health_logs, today, tz).cloned(),
        bmi: profile.bmi().map(|bmi| (bmi * 10.0).round() / 10.0),
        bmi_status: profile.bmi_status(),
    }
}

fn trend_percentage(today: f64, yesterday: f64) -> f64 {
    if yesterday > 0.0 {
        (today - yesterday) / yesterday * 100.0
    } else if today > 0.0 {
        100.0
    } else {
        0.0
    }
}

/// The newest health log dated today or yesterday.
pub fn recent_health_log<'a, Tz: TimeZone>(
    logs: &'a [HealthLog],
    today: NaiveDate,
    tz: &Tz,
) -> Option<&'a HealthLog> {
    let yesterday = today.pred_opt()?;
    logs.iter()
        .filter_map(|log| parse_log_date(&log.date, tz).map(|date| (date, log)))
        .filter(|(date, _)| *date == today || *date == yesterday)
        .max_by_key(|(date, _)| *date)
        .map(|(_, log)| log)
}
