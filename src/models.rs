use serde::{Deserialize, Deserializer, Serialize};

/// Text carried in both supported languages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(from = "LocalizedTextRepr")]
pub struct LocalizedText {
    pub bn: String,
    pub en: String,
}

impl LocalizedText {
    pub fn new(bn: impl Into<String>, en: impl Into<String>) -> Self {
        Self {
            bn: bn.into(),
            en: en.into(),
        }
    }
}

// The flow server sometimes answers with a single Bengali string where a pair
// is expected.
#[derive(Deserialize)]
#[serde(untagged)]
enum LocalizedTextRepr {
    Pair { bn: String, en: String },
    Plain(String),
}

impl From<LocalizedTextRepr> for LocalizedText {
    fn from(repr: LocalizedTextRepr) -> Self {
        match repr {
            LocalizedTextRepr::Pair { bn, en } => Self { bn, en },
            LocalizedTextRepr::Plain(text) => Self {
                bn: text.clone(),
                en: text,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealPlan {
    pub breakfast: LocalizedText,
    pub lunch: LocalizedText,
    pub dinner: LocalizedText,
    pub snacks: LocalizedText,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodSuggestions {
    pub recommended_foods: Vec<LocalizedText>,
    pub budget_friendly_foods: Vec<LocalizedText>,
    pub foods_to_avoid: Vec<LocalizedText>,
    pub daily_meal_plan: MealPlan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    pub name: LocalizedText,
    pub duration_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseSuggestion {
    pub summary: LocalizedText,
    pub exercises: Vec<Exercise>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthTip {
    pub suggestion: String,
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalizedHealthTip {
    pub bn: HealthTip,
    pub en: HealthTip,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalorieLogItem {
    pub name: LocalizedText,
    pub calories: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalorieLog {
    pub id: String,
    pub food_text: String,
    pub items: Vec<CalorieLogItem>,
    pub total_calories: f64,
    /// RFC 3339 timestamp of the meal.
    pub date: String,
}

/// One day of tracked metrics. Keyed by `date` (`YYYY-MM-DD`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct HealthLog {
    pub date: String,
    #[serde(default)]
    pub water: u32,
    #[serde(default)]
    pub steps: u32,
    #[serde(default)]
    pub workout_minutes: u32,
    #[serde(default)]
    pub sleep_hours: f64,
}

/// Insert `log`, replacing any existing entry for the same date.
pub fn upsert_health_log(logs: &mut Vec<HealthLog>, log: HealthLog) {
    match logs.iter_mut().find(|existing| existing.date == log.date) {
        Some(existing) => *existing = log,
        None => logs.push(log),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub age: u32,
    pub height: f64,
    pub weight: f64,
    #[serde(rename = "health_info")]
    pub health_info: String,
    #[serde(default)]
    pub disliked_foods: String,
    #[serde(default)]
    pub calorie_logs: Vec<CalorieLog>,
    #[serde(default)]
    pub health_logs: Vec<HealthLog>,
    #[serde(default)]
    pub food_suggestions: Option<FoodSuggestions>,
    #[serde(default)]
    pub exercise_suggestion: Option<ExerciseSuggestion>,
    #[serde(default)]
    pub health_tip: Option<LocalizedHealthTip>,
    #[serde(default)]
    pub exercise_checklist: Vec<String>,
    #[serde(default)]
    pub last_exercise_check_date: String,
}

/// The demographic and health fields a user fills in at onboarding and edits
/// in settings. AI outputs are derived from these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDetails {
    pub name: String,
    pub age: u32,
    pub height: f64,
    pub weight: f64,
    #[serde(rename = "health_info")]
    pub health_info: String,
    #[serde(default)]
    pub disliked_foods: String,
}

pub type NewProfile = ProfileDetails;

impl UserProfile {
    pub fn from_details(id: String, details: ProfileDetails) -> Self {
        Self {
            id,
            name: details.name,
            age: details.age,
            height: details.height,
            weight: details.weight,
            health_info: details.health_info,
            disliked_foods: details.disliked_foods,
            calorie_logs: Vec::new(),
            health_logs: Vec::new(),
            food_suggestions: None,
            exercise_suggestion: None,
            health_tip: None,
            exercise_checklist: Vec::new(),
            last_exercise_check_date: String::new(),
        }
    }

    pub fn details(&self) -> ProfileDetails {
        ProfileDetails {
            name: self.name.clone(),
            age: self.age,
            height: self.height,
            weight: self.weight,
            health_info: self.health_info.clone(),
            disliked_foods: self.disliked_foods.clone(),
        }
    }

    pub fn clear_ai_outputs(&mut self) {
        self.food_suggestions = None;
        self.exercise_suggestion = None;
        self.health_tip = None;
    }

    /// Body mass index, or `None` while height or weight is unset.
    pub fn bmi(&self) -> Option<f64> {
        if self.height <= 0.0 || self.weight <= 0.0 {
            return None;
        }
        let meters = self.height / 100.0;
        Some(self.weight / (meters * meters))
    }

    pub fn bmi_status(&self) -> Option<BmiStatus> {
        self.bmi().map(BmiStatus::from_bmi)
    }

    pub fn needs_to_lose_weight(&self) -> bool {
        self.bmi().is_some_and(|bmi| bmi >= 25.0)
    }

    pub fn health_log_on(&self, date: &str) -> Option<&HealthLog> {
        self.health_logs.iter().find(|log| log.date == date)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BmiStatus {
    Underweight,
    Normal,
    Overweight,
    Obese,
}

impl BmiStatus {
    pub fn from_bmi(bmi: f64) -> Self {
        if bmi < 18.5 {
            Self::Underweight
        } else if bmi < 25.0 {
            Self::Normal
        } else if bmi < 30.0 {
            Self::Overweight
        } else {
            Self::Obese
        }
    }
}

/// Fields pages write directly after computing fresh data. Only fields that
/// are present are merged; AI outputs may be set or explicitly cleared with
/// `null`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    #[serde(default)]
    pub calorie_logs: Option<Vec<CalorieLog>>,
    #[serde(default)]
    pub health_logs: Option<Vec<HealthLog>>,
    #[serde(default, deserialize_with = "present")]
    pub food_suggestions: Option<Option<FoodSuggestions>>,
    #[serde(default, deserialize_with = "present")]
    pub exercise_suggestion: Option<Option<ExerciseSuggestion>>,
    #[serde(default, deserialize_with = "present")]
    pub health_tip: Option<Option<LocalizedHealthTip>>,
    #[serde(default)]
    pub exercise_checklist: Option<Vec<String>>,
    #[serde(default)]
    pub last_exercise_check_date: Option<String>,
}

impl ProfilePatch {
    pub fn apply(self, profile: &mut UserProfile) {
        if let Some(logs) = self.calorie_logs {
            profile.calorie_logs = logs;
        }
        if let Some(logs) = self.health_logs {
            profile.health_logs = logs;
        }
        if let Some(suggestions) = self.food_suggestions {
            profile.food_suggestions = suggestions;
        }
        if let Some(suggestion) = self.exercise_suggestion {
            profile.exercise_suggestion = suggestion;
        }
        if let Some(tip) = self.health_tip {
            profile.health_tip = tip;
        }
        if let Some(checklist) = self.exercise_checklist {
            profile.exercise_checklist = checklist;
        }
        if let Some(date) = self.last_exercise_check_date {
            profile.last_exercise_check_date = date;
        }
    }
}

// Distinguishes a missing field (outer `None`) from an explicit `null`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalorieEstimate {
    pub items: Vec<CalorieLogItem>,
    pub total_calories: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodCheck {
    pub is_allowed: bool,
    pub recommendation: LocalizedText,
    pub reason: LocalizedText,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilesResponse {
    pub profiles: Vec<UserProfile>,
    pub active_profile_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddProfileRequest {
    #[serde(flatten)]
    pub details: ProfileDetails,
    #[serde(default)]
    pub activate: bool,
}

#[derive(Debug, Serialize)]
pub struct UpdateProfileResponse {
    pub profile: UserProfile,
    pub ai_outputs_cleared: bool,
}

#[derive(Debug, Deserialize)]
pub struct LogCaloriesRequest {
    pub food_text: String,
    /// Day to file the entry under; defaults to now.
    #[serde(default)]
    pub date: Option<chrono::NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct DayQuery {
    #[serde(default)]
    pub date: Option<chrono::NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshQuery {
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Debug, Deserialize)]
pub struct FoodCheckRequest {
    pub food_name: String,
}

#[derive(Debug, Deserialize)]
pub struct ChecklistRequest {
    /// English name of the exercise.
    pub exercise: String,
    pub done: bool,
}
