use crate::dashboard::{DashboardSummary, build_dashboard, recent_health_log};
use crate::errors::AppError;
use crate::models::{
    AddProfileRequest, BmiStatus, CalorieLog, ChecklistRequest, DayQuery, ExerciseSuggestion,
    FoodCheck, FoodCheckRequest, FoodSuggestions, HealthLog, LocalizedHealthTip,
    LogCaloriesRequest, ProfileDetails, ProfilePatch, ProfilesResponse, RefreshQuery,
    UpdateProfileResponse, UserProfile,
};
use crate::state::AppState;
use crate::stats::{ChartPoint, ChartQuery, Locale, ViewMode, build_chart, calorie_logs_on};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const MIN_FOOD_TEXT_LEN: usize = 3;
const MAX_SLEEP_HOURS: f64 = 24.0;

pub async fn list_profiles(State(state): State<AppState>) -> Json<ProfilesResponse> {
    let mut store = state.profiles.lock().await;
    store.sync();
    Json(ProfilesResponse {
        profiles: store.profiles().to_vec(),
        active_profile_id: store.active_profile_id().map(str::to_string),
    })
}

pub async fn add_profile(
    State(state): State<AppState>,
    Json(payload): Json<AddProfileRequest>,
) -> Result<(StatusCode, Json<UserProfile>), AppError> {
    validate_details(&payload.details)?;
    let mut store = state.profiles.lock().await;
    let profile = store.add_profile(payload.details);
    if payload.activate {
        store.switch_profile(&profile.id);
    }
    Ok((StatusCode::CREATED, Json(profile)))
}

pub async fn switch_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UserProfile>, AppError> {
    let mut store = state.profiles.lock().await;
    if !store.switch_profile(&id) {
        return Err(AppError::not_found(format!("profile {id} not found")));
    }
    store
        .active_profile()
        .cloned()
        .map(Json)
        .ok_or_else(AppError::no_active_profile)
}

pub async fn delete_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let mut store = state.profiles.lock().await;
    if !store.delete_profile(&id) {
        return Err(AppError::not_found(format!("profile {id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_active_profile(
    State(state): State<AppState>,
) -> Result<Json<UserProfile>, AppError> {
    Ok(Json(active_snapshot(&state).await?))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Json(details): Json<ProfileDetails>,
) -> Result<Json<UpdateProfileResponse>, AppError> {
    validate_details(&details)?;
    let mut store = state.profiles.lock().await;
    store.sync();
    if store.active_profile().is_none() {
        return Err(AppError::no_active_profile());
    }
    let ai_outputs_cleared = store.update_profile(details);
    let profile = store
        .active_profile()
        .cloned()
        .ok_or_else(AppError::no_active_profile)?;
    Ok(Json(UpdateProfileResponse {
        profile,
        ai_outputs_cleared,
    }))
}

pub async fn patch_profile(
    State(state): State<AppState>,
    Json(patch): Json<ProfilePatch>,
) -> Result<Json<UserProfile>, AppError> {
    let mut store = state.profiles.lock().await;
    if !store.update_active_profile_data(patch) {
        return Err(AppError::no_active_profile());
    }
    store
        .active_profile()
        .cloned()
        .map(Json)
        .ok_or_else(AppError::no_active_profile)
}

pub async fn get_calorie_logs(
    State(state): State<AppState>,
    Query(query): Query<DayQuery>,
) -> Result<Json<Vec<CalorieLog>>, AppError> {
    let profile = active_snapshot(&state).await?;
    let date = query.date.unwrap_or_else(today);
    let logs = calorie_logs_on(&profile.calorie_logs, date, &Local)
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(logs))
}

pub async fn log_calories(
    State(state): State<AppState>,
    Json(payload): Json<LogCaloriesRequest>,
) -> Result<(StatusCode, Json<CalorieLog>), AppError> {
    let food_text = payload.food_text.trim();
    if food_text.chars().count() < MIN_FOOD_TEXT_LEN {
        return Err(AppError::bad_request(format!(
            "food_text must be at least {MIN_FOOD_TEXT_LEN} characters"
        )));
    }
    let profile = active_snapshot(&state).await?;

    let estimate = state.ai.estimate_calories(food_text).await?;

    let mut store = state.profiles.lock().await;
    store.sync();
    if store.active_profile_id() != Some(profile.id.as_str()) {
        warn!(profile_id = %profile.id, "active profile changed during calorie estimate");
        return Err(AppError::conflict("active profile changed, log not saved"));
    }
    let at = payload.date.map_or_else(Utc::now, timestamp_on);
    let log = store
        .log_calories(food_text, estimate, at)
        .ok_or_else(AppError::no_active_profile)?;
    info!(profile_id = %profile.id, calories = log.total_calories, "calorie log added");
    Ok((StatusCode::CREATED, Json(log)))
}

pub async fn get_health_log(
    State(state): State<AppState>,
    Path(date): Path<NaiveDate>,
) -> Result<Json<HealthLog>, AppError> {
    let profile = active_snapshot(&state).await?;
    let date = date.to_string();
    let log = profile.health_log_on(&date).cloned().unwrap_or(HealthLog {
        date,
        ..HealthLog::default()
    });
    Ok(Json(log))
}

pub async fn put_health_log(
    State(state): State<AppState>,
    Json(log): Json<HealthLog>,
) -> Result<Json<HealthLog>, AppError> {
    if NaiveDate::parse_from_str(&log.date, "%Y-%m-%d").is_err() {
        return Err(AppError::bad_request("date must be YYYY-MM-DD"));
    }
    if !(0.0..=MAX_SLEEP_HOURS).contains(&log.sleep_hours) {
        return Err(AppError::bad_request("sleepHours must be between 0 and 24"));
    }
    let mut store = state.profiles.lock().await;
    if !store.record_health_log(log.clone()) {
        return Err(AppError::no_active_profile());
    }
    Ok(Json(log))
}

#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    #[serde(default)]
    pub mode: ViewMode,
    #[serde(default)]
    pub anchor: Option<NaiveDate>,
    #[serde(default)]
    pub locale: Option<Locale>,
}

pub async fn get_analytics(
    State(state): State<AppState>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<Vec<ChartPoint>>, AppError> {
    let profile = active_snapshot(&state).await?;
    let chart_query = ChartQuery {
        mode: query.mode,
        anchor: query.anchor.unwrap_or_else(today),
        week_start: query.locale.unwrap_or(state.locale).week_start(),
    };
    Ok(Json(build_chart(
        &profile.calorie_logs,
        &profile.health_logs,
        &chart_query,
    )))
}

pub async fn get_dashboard(
    State(state): State<AppState>,
) -> Result<Json<DashboardSummary>, AppError> {
    let profile = active_snapshot(&state).await?;
    Ok(Json(build_dashboard(&profile)))
}

pub async fn check_food(
    State(state): State<AppState>,
    Json(payload): Json<FoodCheckRequest>,
) -> Result<Json<FoodCheck>, AppError> {
    let food_name = payload.food_name.trim();
    if food_name.is_empty() {
        return Err(AppError::bad_request("food_name must not be empty"));
    }
    let profile = active_snapshot(&state).await?;
    Ok(Json(state.ai.check_food(&profile, food_name).await?))
}

pub async fn food_suggestions(
    State(state): State<AppState>,
    Query(query): Query<RefreshQuery>,
) -> Result<Json<FoodSuggestions>, AppError> {
    let profile = active_snapshot(&state).await?;
    if let Some(cached) = profile.food_suggestions.clone().filter(|_| !query.refresh) {
        return Ok(Json(cached));
    }

    let suggestions = state.ai.food_suggestions(&profile).await?;
    cache_for(
        &state,
        &profile,
        ProfilePatch {
            food_suggestions: Some(Some(suggestions.clone())),
            ..ProfilePatch::default()
        },
    )
    .await;
    Ok(Json(suggestions))
}

pub async fn exercise_suggestion(
    State(state): State<AppState>,
    Query(query): Query<RefreshQuery>,
) -> Result<Json<ExerciseSuggestion>, AppError> {
    let profile = active_snapshot(&state).await?;
    if let Some(cached) = profile.exercise_suggestion.clone().filter(|_| !query.refresh) {
        return Ok(Json(cached));
    }

    let suggestion = state.ai.exercise_suggestion(&profile).await?;
    cache_for(
        &state,
        &profile,
        ProfilePatch {
            exercise_suggestion: Some(Some(suggestion.clone())),
            exercise_checklist: Some(Vec::new()),
            ..ProfilePatch::default()
        },
    )
    .await;
    Ok(Json(suggestion))
}

#[derive(Debug, Serialize)]
pub struct ExerciseStatus {
    pub suggestion: Option<ExerciseSuggestion>,
    pub checklist: Vec<String>,
    pub all_done: bool,
    pub bmi: Option<f64>,
    pub bmi_status: Option<BmiStatus>,
    pub needs_to_lose_weight: bool,
}

impl From<&UserProfile> for ExerciseStatus {
    fn from(profile: &UserProfile) -> Self {
        let all_done = profile.exercise_suggestion.as_ref().is_some_and(|plan| {
            plan.exercises
                .iter()
                .all(|exercise| profile.exercise_checklist.contains(&exercise.name.en))
        });
        Self {
            suggestion: profile.exercise_suggestion.clone(),
            checklist: profile.exercise_checklist.clone(),
            all_done,
            bmi: profile.bmi(),
            bmi_status: profile.bmi_status(),
            needs_to_lose_weight: profile.needs_to_lose_weight(),
        }
    }
}

pub async fn get_exercise_status(
    State(state): State<AppState>,
) -> Result<Json<ExerciseStatus>, AppError> {
    let mut store = state.profiles.lock().await;
    store.sync();
    store.refresh_exercise_checklist(today());
    let profile = store
        .active_profile()
        .ok_or_else(AppError::no_active_profile)?;
    Ok(Json(ExerciseStatus::from(profile)))
}

pub async fn update_checklist(
    State(state): State<AppState>,
    Json(payload): Json<ChecklistRequest>,
) -> Result<Json<ExerciseStatus>, AppError> {
    let mut store = state.profiles.lock().await;
    store.refresh_exercise_checklist(today());
    if !store.set_exercise_done(payload.exercise.trim(), payload.done) {
        return Err(AppError::no_active_profile());
    }
    let profile = store
        .active_profile()
        .ok_or_else(AppError::no_active_profile)?;
    Ok(Json(ExerciseStatus::from(profile)))
}

pub async fn health_tip(
    State(state): State<AppState>,
    Query(query): Query<RefreshQuery>,
) -> Result<Json<LocalizedHealthTip>, AppError> {
    let profile = active_snapshot(&state).await?;
    if let Some(cached) = profile.health_tip.clone().filter(|_| !query.refresh) {
        return Ok(Json(cached));
    }

    let recent = recent_health_log(&profile.health_logs, today(), &Local);
    let tip = state.ai.health_tip(&profile, recent).await?;
    cache_for(
        &state,
        &profile,
        ProfilePatch {
            health_tip: Some(Some(tip.clone())),
            ..ProfilePatch::default()
        },
    )
    .await;
    Ok(Json(tip))
}

async fn active_snapshot(state: &AppState) -> Result<UserProfile, AppError> {
    let mut store = state.profiles.lock().await;
    store.sync();
    store
        .active_profile()
        .cloned()
        .ok_or_else(AppError::no_active_profile)
}

// AI calls run without the lock. The result is only stored if the same
// profile is still active with the details the request was built from.
async fn cache_for(state: &AppState, requested_for: &UserProfile, patch: ProfilePatch) {
    let profile_id = requested_for.id.as_str();
    let mut store = state.profiles.lock().await;
    store.sync();
    let Some(active) = store.active_profile().filter(|active| active.id == profile_id) else {
        warn!(profile_id, "active profile changed during AI call, result not cached");
        return;
    };
    if active.details() != requested_for.details() {
        warn!(profile_id, "profile details changed during AI call, result not cached");
        return;
    }
    store.update_active_profile_data(patch);
}

fn validate_details(details: &ProfileDetails) -> Result<(), AppError> {
    if details.name.trim().is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }
    if details.age == 0 {
        return Err(AppError::bad_request("age must be positive"));
    }
    if details.height <= 0.0 || details.weight <= 0.0 {
        return Err(AppError::bad_request("height and weight must be positive"));
    }
    Ok(())
}

// A log filed for another day keeps the current time of day.
fn timestamp_on(date: NaiveDate) -> DateTime<Utc> {
    let local = date.and_time(Local::now().time());
    Local
        .from_local_datetime(&local)
        .earliest()
        .map(|at| at.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}
