use crate::handlers;
use crate::state::AppState;
use axum::{
    Router,
    routing::{delete, get, post, put},
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/profiles",
            get(handlers::list_profiles).post(handlers::add_profile),
        )
        .route("/api/profiles/:id", delete(handlers::delete_profile))
        .route("/api/profiles/:id/activate", post(handlers::switch_profile))
        .route(
            "/api/profile",
            get(handlers::get_active_profile)
                .put(handlers::update_profile)
                .patch(handlers::patch_profile),
        )
        .route(
            "/api/calories",
            get(handlers::get_calorie_logs).post(handlers::log_calories),
        )
        .route("/api/health-logs", put(handlers::put_health_log))
        .route("/api/health-logs/:date", get(handlers::get_health_log))
        .route("/api/analytics", get(handlers::get_analytics))
        .route("/api/dashboard", get(handlers::get_dashboard))
        .route("/api/food-check", post(handlers::check_food))
        .route("/api/suggestions/food", post(handlers::food_suggestions))
        .route("/api/suggestions/exercise", post(handlers::exercise_suggestion))
        .route("/api/exercise", get(handlers::get_exercise_status))
        .route("/api/exercise/checklist", put(handlers::update_checklist))
        .route("/api/health-tip", post(handlers::health_tip))
        .with_state(state)
}
