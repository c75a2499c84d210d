//! Client for the generative-AI flow server.
//!
//! Each flow is exposed as `POST <base_url>/<flowName>` taking
//! `{"data": <input>}` and answering `{"result": <output>}`. Failed or
//! malformed answers are returned as [`AiError`]; nothing is retried.

use crate::models::{
    CalorieEstimate, ExerciseSuggestion, FoodCheck, FoodSuggestions, HealthLog,
    LocalizedHealthTip, UserProfile,
};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("AI request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("AI service returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("AI response did not match the expected shape: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Profile fields sent along with most flows.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileSummary {
    pub name: String,
    pub age: u32,
    pub height: f64,
    pub weight: f64,
    pub health_info: String,
}

impl From<&UserProfile> for ProfileSummary {
    fn from(profile: &UserProfile) -> Self {
        Self {
            name: profile.name.clone(),
            age: profile.age,
            height: profile.height,
            weight: profile.weight,
            health_info: profile.health_info.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct EstimateCaloriesInput<'a> {
    food: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckFoodInput<'a> {
    profile: ProfileSummary,
    food_name: &'a str,
}

#[derive(Debug, Serialize)]
struct FoodSuggestionsInput {
    #[serde(flatten)]
    profile: ProfileSummary,
    #[serde(rename = "dislikedFoods")]
    disliked_foods: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExerciseSuggestionInput {
    profile: ProfileSummary,
    needs_to_lose_weight: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecentLog {
    water: u32,
    steps: u32,
    sleep_hours: f64,
}

#[derive(Debug, Serialize)]
struct HealthTipInput {
    name: String,
    health_info: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    recent_log: Option<RecentLog>,
}

#[derive(Serialize)]
struct FlowRequest<'a, T> {
    data: &'a T,
}

#[derive(Deserialize)]
struct FlowResponse<T> {
    result: T,
}

#[derive(Clone)]
pub struct AiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl AiClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AiError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub async fn estimate_calories(&self, food: &str) -> Result<CalorieEstimate, AiError> {
        self.run_flow("estimateCaloriesFlow", &EstimateCaloriesInput { food })
            .await
    }

    pub async fn check_food(
        &self,
        profile: &UserProfile,
        food_name: &str,
    ) -> Result<FoodCheck, AiError> {
        let input = CheckFoodInput {
            profile: profile.into(),
            food_name,
        };
        self.run_flow("checkFoodFlow", &input).await
    }

    pub async fn food_suggestions(&self, profile: &UserProfile) -> Result<FoodSuggestions, AiError> {
        let input = FoodSuggestionsInput {
            profile: profile.into(),
            disliked_foods: profile.disliked_foods.clone(),
        };
        self.run_flow("foodSuggestionsFlow", &input).await
    }

    pub async fn exercise_suggestion(
        &self,
        profile: &UserProfile,
    ) -> Result<ExerciseSuggestion, AiError> {
        let input = ExerciseSuggestionInput {
            profile: profile.into(),
            needs_to_lose_weight: profile.needs_to_lose_weight(),
        };
        self.run_flow("generateExerciseSuggestionFlow", &input)
            .await
    }

    /// `recent_log` is the latest health log from today or yesterday, if any.
    pub async fn health_tip(
        &self,
        profile: &UserProfile,
        recent_log: Option<&HealthLog>,
    ) -> Result<LocalizedHealthTip, AiError> {
        let input = HealthTipInput {
            name: profile.name.clone(),
            health_info: profile.health_info.clone(),
            recent_log: recent_log.map(|log| RecentLog {
                water: log.water,
                steps: log.steps,
                sleep_hours: log.sleep_hours,
            }),
        };
        self.run_flow("generateHealthTipFlow", &input).await
    }

    async fn run_flow<I, O>(&self, flow: &str, input: &I) -> Result<O, AiError>
    where
        I: Serialize,
        O: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, flow);
        debug!(flow, "calling AI flow");

        let mut request = self.http.post(&url).json(&FlowRequest { data: input });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.inspect_err(|err| {
            warn!(flow, error = %err, "AI flow request failed");
        })?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            warn!(flow, %status, "AI flow returned an error");
            return Err(AiError::Status { status, body });
        }

        let parsed: FlowResponse<O> = serde_json::from_str(&body).inspect_err(|err| {
            warn!(flow, error = %err, "AI flow returned an unexpected body");
        })?;
        Ok(parsed.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LocalizedText, ProfileDetails};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn profile() -> UserProfile {
        UserProfile::from_details(
            "p1".to_string(),
            ProfileDetails {
                name: "Nusrat".to_string(),
                age: 28,
                height: 160.0,
                weight: 70.0,
                health_info: "allergic to peanuts".to_string(),
                disliked_foods: "bitter gourd".to_string(),
            },
        )
    }

    fn client(server: &MockServer, api_key: Option<&str>) -> AiClient {
        AiClient::new(
            format!("{}/", server.uri()),
            api_key.map(str::to_string),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn estimate_calories_unwraps_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/estimateCaloriesFlow"))
            .and(body_json(json!({ "data": { "food": "2 ruti, dal" } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {
                    "items": [
                        { "name": "রুটি", "calories": 240 },
                        { "name": { "bn": "ডাল", "en": "Lentils" }, "calories": 150 }
                    ],
                    "total_calories": 390
                }
            })))
            .mount(&server)
            .await;

        let estimate = client(&server, None)
            .estimate_calories("2 ruti, dal")
            .await
            .unwrap();

        assert_eq!(estimate.total_calories, 390.0);
        assert_eq!(estimate.items[0].name, LocalizedText::new("রুটি", "রুটি"));
        assert_eq!(estimate.items[1].name.en, "Lentils");
    }

    #[tokio::test]
    async fn check_food_sends_profile_and_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/checkFoodFlow"))
            .and(header("authorization", "Bearer secret"))
            .and(body_json(json!({
                "data": {
                    "profile": {
                        "name": "Nusrat",
                        "age": 28,
                        "height": 160.0,
                        "weight": 70.0,
                        "health_info": "allergic to peanuts"
                    },
                    "foodName": "Peanut butter"
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {
                    "isAllowed": false,
                    "recommendation": { "bn": "না", "en": "No" },
                    "reason": { "bn": "অ্যালার্জি", "en": "Allergy" }
                }
            })))
            .mount(&server)
            .await;

        let check = client(&server, Some("secret"))
            .check_food(&profile(), "Peanut butter")
            .await
            .unwrap();

        assert!(!check.is_allowed);
        assert_eq!(check.reason.en, "Allergy");
    }

    #[tokio::test]
    async fn exercise_suggestion_reports_weight_goal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generateExerciseSuggestionFlow"))
            .and(body_json(json!({
                "data": {
                    "profile": {
                        "name": "Nusrat",
                        "age": 28,
                        "height": 160.0,
                        "weight": 70.0,
                        "health_info": "allergic to peanuts"
                    },
                    "needsToLoseWeight": true
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {
                    "summary": "শুরু করুন",
                    "exercises": [{ "name": "হাঁটা", "duration_minutes": 15 }]
                }
            })))
            .mount(&server)
            .await;

        let plan = client(&server, None)
            .exercise_suggestion(&profile())
            .await
            .unwrap();
        assert_eq!(plan.exercises.len(), 1);
        assert_eq!(plan.exercises[0].duration_minutes, 15);
    }

    #[tokio::test]
    async fn health_tip_omits_missing_recent_log() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generateHealthTipFlow"))
            .and(body_json(json!({
                "data": { "name": "Nusrat", "health_info": "allergic to peanuts" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {
                    "bn": { "suggestion": "পানি পান করুন", "explanation": "ভালো" },
                    "en": { "suggestion": "Drink water", "explanation": "Good", "context": "Based on your water log" }
                }
            })))
            .mount(&server)
            .await;

        let tip = client(&server, None)
            .health_tip(&profile(), None)
            .await
            .unwrap();
        assert_eq!(tip.en.suggestion, "Drink water");
        assert_eq!(tip.en.context.as_deref(), Some("Based on your water log"));
        assert!(tip.bn.context.is_none());
    }

    #[tokio::test]
    async fn error_status_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/foodSuggestionsFlow"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model overloaded"))
            .mount(&server)
            .await;

        let err = client(&server, None)
            .food_suggestions(&profile())
            .await
            .unwrap_err();

        match err {
            AiError::Status { status, body } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body, "model overloaded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_required_field_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/checkFoodFlow"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": { "recommendation": { "bn": "হ্যাঁ", "en": "Yes" } }
            })))
            .mount(&server)
            .await;

        let err = client(&server, None)
            .check_food(&profile(), "Mango")
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::Malformed(_)));
    }

    #[tokio::test]
    async fn unreachable_server_is_http_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client =
            AiClient::new(format!("http://127.0.0.1:{port}"), None, Duration::from_secs(2)).unwrap();
        let err = client.estimate_calories("rice").await.unwrap_err();
        assert!(matches!(err, AiError::Http(_)));
    }
}
