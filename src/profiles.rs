//! The profile collection and the active-profile pointer.
//!
//! Every change is written back through the [`KvStore`], so other handles on
//! the same store pick it up on their next [`ProfileStore::sync`].

use crate::models::{
    CalorieEstimate, CalorieLog, HealthLog, NewProfile, ProfileDetails, ProfilePatch, UserProfile,
    upsert_health_log,
};
use crate::storage::{KvStore, StoredValue};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use tracing::{debug, info};
use uuid::Uuid;

pub const PROFILES_KEY: &str = "profiles";
pub const ACTIVE_PROFILE_KEY: &str = "activeProfileId";

pub struct ProfileStore {
    store: KvStore,
    profiles: StoredValue<Vec<UserProfile>>,
    active_id: StoredValue<Option<String>>,
}

impl ProfileStore {
    pub fn open(store: KvStore) -> Self {
        let profiles = StoredValue::load(&store, PROFILES_KEY, Vec::new());
        let active_id = StoredValue::load(&store, ACTIVE_PROFILE_KEY, None);
        let mut profile_store = Self {
            store,
            profiles,
            active_id,
        };
        profile_store.ensure_active();
        profile_store
    }

    pub fn profiles(&self) -> &[UserProfile] {
        self.profiles.get()
    }

    pub fn active_profile_id(&self) -> Option<&str> {
        self.active_id.get().as_deref()
    }

    pub fn active_profile(&self) -> Option<&UserProfile> {
        let id = self.active_profile_id()?;
        self.profiles().iter().find(|profile| profile.id == id)
    }

    /// Picks up changes written by other handles on the same store.
    /// A resync that leaves profiles without an active one activates the
    /// first profile.
    pub fn sync(&mut self) -> bool {
        let changed = self.pull();
        if changed {
            self.ensure_active();
        }
        changed
    }

    fn pull(&mut self) -> bool {
        let profiles_changed = self.profiles.sync(&self.store);
        let active_changed = self.active_id.sync(&self.store);
        if profiles_changed || active_changed {
            debug!("profile store resynchronized");
        }
        profiles_changed || active_changed
    }

    /// Creates a profile with empty logs and no cached AI output. The new
    /// profile is not made active.
    pub fn add_profile(&mut self, details: NewProfile) -> UserProfile {
        self.pull();
        let profile = UserProfile::from_details(Uuid::new_v4().to_string(), details);
        let mut profiles = self.profiles.get().clone();
        profiles.push(profile.clone());
        self.profiles.set(&self.store, profiles);
        info!(profile_id = %profile.id, "profile added");
        profile
    }

    /// Makes `id` the active profile. Unknown ids are ignored.
    pub fn switch_profile(&mut self, id: &str) -> bool {
        self.pull();
        if !self.profiles().iter().any(|profile| profile.id == id) {
            debug!(profile_id = id, "switch to unknown profile ignored");
            return false;
        }
        self.active_id.set(&self.store, Some(id.to_string()));
        true
    }

    /// Replaces the active profile's details. When any field differs from
    /// the stored one the cached AI outputs are cleared; logs and the
    /// checklist are kept. Returns whether the cache was cleared.
    pub fn update_profile(&mut self, details: ProfileDetails) -> bool {
        let mut invalidated = false;
        self.mutate_active(|profile| {
            invalidated = profile.details() != details;
            profile.name = details.name;
            profile.age = details.age;
            profile.height = details.height;
            profile.weight = details.weight;
            profile.health_info = details.health_info;
            profile.disliked_foods = details.disliked_foods;
            if invalidated {
                profile.clear_ai_outputs();
            }
        });
        if invalidated {
            info!("profile details changed, cached AI output cleared");
        }
        invalidated
    }

    /// Merges `patch` into the active profile without touching the cache.
    pub fn update_active_profile_data(&mut self, patch: ProfilePatch) -> bool {
        self.mutate_active(|profile| patch.apply(profile))
    }

    /// Removes a profile. When it was active the first remaining profile
    /// takes over, or none.
    pub fn delete_profile(&mut self, id: &str) -> bool {
        self.pull();
        let mut profiles = self.profiles.get().clone();
        let before = profiles.len();
        profiles.retain(|profile| profile.id != id);
        if profiles.len() == before {
            return false;
        }

        let next_active = profiles.first().map(|profile| profile.id.clone());
        self.profiles.set(&self.store, profiles);
        if self.active_profile_id() == Some(id) {
            self.active_id.set(&self.store, next_active);
        }
        info!(profile_id = id, "profile deleted");
        true
    }

    /// Files a new calorie log at the front of the active profile's list.
    pub fn log_calories(
        &mut self,
        food_text: &str,
        estimate: CalorieEstimate,
        at: DateTime<Utc>,
    ) -> Option<CalorieLog> {
        self.pull();
        let mut logs = self.active_profile()?.calorie_logs.clone();
        let log = CalorieLog {
            id: Uuid::new_v4().to_string(),
            food_text: food_text.to_string(),
            items: estimate.items,
            total_calories: estimate.total_calories,
            date: at.to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        logs.insert(0, log.clone());
        self.update_active_profile_data(ProfilePatch {
            calorie_logs: Some(logs),
            ..ProfilePatch::default()
        });
        Some(log)
    }

    /// Inserts or replaces the active profile's health log for `log.date`.
    pub fn record_health_log(&mut self, log: HealthLog) -> bool {
        self.pull();
        let Some(profile) = self.active_profile() else {
            return false;
        };
        let mut logs = profile.health_logs.clone();
        upsert_health_log(&mut logs, log);
        self.update_active_profile_data(ProfilePatch {
            health_logs: Some(logs),
            ..ProfilePatch::default()
        })
    }

    /// Starts a fresh checklist when the last tick happened on another day.
    pub fn refresh_exercise_checklist(&mut self, today: NaiveDate) -> bool {
        self.pull();
        let today = today.to_string();
        match self.active_profile() {
            Some(profile) if profile.last_exercise_check_date != today => {}
            _ => return false,
        }
        self.update_active_profile_data(ProfilePatch {
            exercise_checklist: Some(Vec::new()),
            last_exercise_check_date: Some(today),
            ..ProfilePatch::default()
        })
    }

    pub fn set_exercise_done(&mut self, exercise: &str, done: bool) -> bool {
        self.pull();
        let Some(profile) = self.active_profile() else {
            return false;
        };
        let mut checklist = profile.exercise_checklist.clone();
        checklist.retain(|name| name != exercise);
        if done {
            checklist.push(exercise.to_string());
        }
        self.update_active_profile_data(ProfilePatch {
            exercise_checklist: Some(checklist),
            ..ProfilePatch::default()
        })
    }

    fn mutate_active(&mut self, apply: impl FnOnce(&mut UserProfile)) -> bool {
        self.pull();
        let Some(id) = self.active_profile_id().map(str::to_string) else {
            return false;
        };
        let mut profiles = self.profiles.get().clone();
        let Some(profile) = profiles.iter_mut().find(|profile| profile.id == id) else {
            return false;
        };
        apply(profile);
        self.profiles.set(&self.store, profiles);
        true
    }

    fn ensure_active(&mut self) {
        if self.active_id.get().is_some() {
            return;
        }
        if let Some(first) = self.profiles().first().map(|profile| profile.id.clone()) {
            self.active_id.set(&self.store, Some(first));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CalorieLogItem, ExerciseSuggestion, FoodSuggestions, HealthTip, LocalizedHealthTip,
        LocalizedText, MealPlan,
    };
    use crate::storage::{StorageBackend, StorageError};
    use chrono::TimeZone;

    fn details(name: &str) -> ProfileDetails {
        ProfileDetails {
            name: name.to_string(),
            age: 30,
            height: 165.0,
            weight: 60.0,
            health_info: "lose weight".to_string(),
            disliked_foods: "okra".to_string(),
        }
    }

    fn text(value: &str) -> LocalizedText {
        LocalizedText::new(value, value)
    }

    fn tip() -> LocalizedHealthTip {
        let tip = HealthTip {
            suggestion: "Drink water".to_string(),
            explanation: "Hydration helps".to_string(),
            context: None,
        };
        LocalizedHealthTip {
            bn: tip.clone(),
            en: tip,
        }
    }

    fn cached_outputs() -> ProfilePatch {
        ProfilePatch {
            food_suggestions: Some(Some(FoodSuggestions {
                recommended_foods: vec![text("dal")],
                budget_friendly_foods: vec![text("egg")],
                foods_to_avoid: vec![text("sugar")],
                daily_meal_plan: MealPlan {
                    breakfast: text("ruti"),
                    lunch: text("rice"),
                    dinner: text("fish"),
                    snacks: text("fruit"),
                },
            })),
            exercise_suggestion: Some(Some(ExerciseSuggestion {
                summary: text("walk"),
                exercises: Vec::new(),
            })),
            health_tip: Some(Some(tip())),
            ..ProfilePatch::default()
        }
    }

    fn estimate(total: f64) -> CalorieEstimate {
        CalorieEstimate {
            items: vec![CalorieLogItem {
                name: text("rice"),
                calories: total,
            }],
            total_calories: total,
        }
    }

    fn store_with_active() -> ProfileStore {
        let mut store = ProfileStore::open(KvStore::in_memory());
        let profile = store.add_profile(details("Ayesha"));
        store.switch_profile(&profile.id);
        store
    }

    #[test]
    fn empty_store_has_no_active_profile() {
        let store = ProfileStore::open(KvStore::in_memory());
        assert!(store.profiles().is_empty());
        assert!(store.active_profile().is_none());
    }

    #[test]
    fn add_profile_starts_empty_and_inactive() {
        let mut store = ProfileStore::open(KvStore::in_memory());
        let first = store.add_profile(details("Ayesha"));
        let second = store.add_profile(details("Karim"));

        assert_ne!(first.id, second.id);
        assert!(second.calorie_logs.is_empty());
        assert!(second.health_logs.is_empty());
        assert!(second.food_suggestions.is_none());
        assert!(second.exercise_checklist.is_empty());
        assert_eq!(store.profiles().len(), 2);
        assert!(store.active_profile_id().is_none());
    }

    #[test]
    fn switch_profile_tracks_latest_switch() {
        let mut store = ProfileStore::open(KvStore::in_memory());
        let ids: Vec<String> = ["a", "b", "c"]
            .iter()
            .map(|name| store.add_profile(details(name)).id)
            .collect();

        for id in [&ids[1], &ids[0], &ids[2]] {
            assert!(store.switch_profile(id));
            assert_eq!(store.active_profile().map(|p| p.id.as_str()), Some(id.as_str()));
        }

        assert!(!store.switch_profile("missing"));
        assert_eq!(store.active_profile_id(), Some(ids[2].as_str()));
    }

    #[test]
    fn deleting_active_profile_reassigns_to_first_remaining() {
        let mut store = ProfileStore::open(KvStore::in_memory());
        let first = store.add_profile(details("a"));
        let second = store.add_profile(details("b"));
        store.switch_profile(&second.id);

        assert!(store.delete_profile(&second.id));
        assert_eq!(store.active_profile_id(), Some(first.id.as_str()));

        assert!(store.delete_profile(&first.id));
        assert!(store.active_profile().is_none());
        assert!(store.active_profile_id().is_none());
        assert!(!store.delete_profile(&first.id));
    }

    #[test]
    fn deleting_inactive_profile_keeps_active() {
        let mut store = ProfileStore::open(KvStore::in_memory());
        let first = store.add_profile(details("a"));
        let second = store.add_profile(details("b"));
        store.switch_profile(&first.id);

        store.delete_profile(&second.id);
        assert_eq!(store.active_profile_id(), Some(first.id.as_str()));
    }

    #[test]
    fn changed_details_clear_cached_outputs() {
        let mut store = store_with_active();
        store.update_active_profile_data(cached_outputs());
        store.record_health_log(HealthLog {
            date: "2024-01-01".to_string(),
            steps: 100,
            ..HealthLog::default()
        });
        store.set_exercise_done("Walking", true);

        let mut changed = details("Ayesha");
        changed.weight = 58.5;
        assert!(store.update_profile(changed));

        let profile = store.active_profile().unwrap();
        assert_eq!(profile.weight, 58.5);
        assert!(profile.food_suggestions.is_none());
        assert!(profile.exercise_suggestion.is_none());
        assert!(profile.health_tip.is_none());
        assert_eq!(profile.health_logs.len(), 1);
        assert_eq!(profile.exercise_checklist, vec!["Walking".to_string()]);
    }

    #[test]
    fn unchanged_details_keep_cached_outputs() {
        let mut store = store_with_active();
        store.update_active_profile_data(cached_outputs());

        assert!(!store.update_profile(details("Ayesha")));

        let profile = store.active_profile().unwrap();
        assert!(profile.food_suggestions.is_some());
        assert!(profile.exercise_suggestion.is_some());
        assert!(profile.health_tip.is_some());
    }

    #[test]
    fn patching_health_tip_leaves_logs_alone() {
        let mut store = store_with_active();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        store.log_calories("rice", estimate(500.0), at);
        store.record_health_log(HealthLog {
            date: "2024-01-01".to_string(),
            water: 2000,
            ..HealthLog::default()
        });
        let before = store.active_profile().unwrap().clone();

        store.update_active_profile_data(ProfilePatch {
            health_tip: Some(Some(tip())),
            ..ProfilePatch::default()
        });

        let after = store.active_profile().unwrap();
        assert_eq!(after.health_tip, Some(tip()));
        assert_eq!(after.calorie_logs, before.calorie_logs);
        assert_eq!(after.health_logs, before.health_logs);
    }

    #[test]
    fn mutations_without_active_profile_are_noops() {
        let mut store = ProfileStore::open(KvStore::in_memory());
        assert!(!store.update_profile(details("x")));
        assert!(!store.update_active_profile_data(cached_outputs()));
        assert!(!store.record_health_log(HealthLog::default()));
        assert!(store.log_calories("rice", estimate(1.0), Utc::now()).is_none());
        assert!(store.profiles().is_empty());
    }

    #[test]
    fn calorie_logs_are_prepended() {
        let mut store = store_with_active();
        let morning = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        let evening = Utc.with_ymd_and_hms(2024, 1, 1, 20, 0, 0).unwrap();
        store.log_calories("ruti", estimate(300.0), morning);
        let latest = store.log_calories("rice", estimate(600.0), evening).unwrap();

        let logs = &store.active_profile().unwrap().calorie_logs;
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].id, latest.id);
        assert_eq!(logs[0].date, "2024-01-01T20:00:00.000Z");
        assert_eq!(logs[1].food_text, "ruti");
    }

    #[test]
    fn health_log_upserts_by_date() {
        let mut store = store_with_active();
        for steps in [1000, 2500] {
            store.record_health_log(HealthLog {
                date: "2024-02-10".to_string(),
                steps,
                ..HealthLog::default()
            });
        }
        let profile = store.active_profile().unwrap();
        assert_eq!(profile.health_logs.len(), 1);
        assert_eq!(profile.health_log_on("2024-02-10").unwrap().steps, 2500);
    }

    #[test]
    fn checklist_resets_on_a_new_day() {
        let mut store = store_with_active();
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert!(store.refresh_exercise_checklist(day));
        store.set_exercise_done("Walking", true);
        store.set_exercise_done("Walking", true);
        store.set_exercise_done("Squats", true);
        assert_eq!(store.active_profile().unwrap().exercise_checklist.len(), 2);

        assert!(!store.refresh_exercise_checklist(day));
        store.set_exercise_done("Squats", false);
        assert_eq!(
            store.active_profile().unwrap().exercise_checklist,
            vec!["Walking".to_string()]
        );

        assert!(store.refresh_exercise_checklist(day.succ_opt().unwrap()));
        let profile = store.active_profile().unwrap();
        assert!(profile.exercise_checklist.is_empty());
        assert_eq!(profile.last_exercise_check_date, "2024-03-02");
    }

    #[test]
    fn profiles_round_trip_through_storage() {
        let kv = KvStore::in_memory();
        let mut store = ProfileStore::open(kv.clone());
        store.add_profile(details("a"));
        store.add_profile(details("b"));
        store.update_active_profile_data(cached_outputs());

        let reopened = ProfileStore::open(kv.clone());
        assert_eq!(reopened.profiles(), store.profiles());
        assert_eq!(
            kv.read::<Vec<UserProfile>>(PROFILES_KEY, Vec::new()),
            store.profiles().to_vec()
        );
    }

    #[test]
    fn first_profile_becomes_active_when_pointer_missing() {
        let kv = KvStore::in_memory();
        let mut store = ProfileStore::open(kv.clone());
        let first = store.add_profile(details("a"));
        kv.remove(ACTIVE_PROFILE_KEY);

        let reopened = ProfileStore::open(kv);
        assert_eq!(reopened.active_profile_id(), Some(first.id.as_str()));
    }

    #[test]
    fn other_handles_see_changes_after_sync() {
        let kv = KvStore::in_memory();
        let mut tab_a = ProfileStore::open(kv.clone());
        let mut tab_b = ProfileStore::open(kv);

        let profile = tab_a.add_profile(details("a"));
        tab_a.switch_profile(&profile.id);
        assert!(tab_b.profiles().is_empty());

        assert!(tab_b.sync());
        assert_eq!(tab_b.profiles().len(), 1);
        assert_eq!(tab_b.active_profile_id(), Some(profile.id.as_str()));
    }

    struct FailingBackend;

    impl StorageBackend for FailingBackend {
        fn get(&self, _key: &str) -> Option<String> {
            None
        }

        fn set(&self, _key: &str, _value: String) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("quota exceeded".to_string()))
        }

        fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("quota exceeded".to_string()))
        }
    }

    #[test]
    fn storage_failures_keep_in_memory_state() {
        let mut store = ProfileStore::open(KvStore::new(FailingBackend));
        let profile = store.add_profile(details("a"));
        assert!(store.switch_profile(&profile.id));
        assert_eq!(store.active_profile().unwrap().name, "a");
    }
}
