// Data-access services: the only place that decides cache key shape,
// staleness policy and invalidation scope. Every public operation returns
// an ApiResult; transport failures never escape as errors.

pub mod slots;
pub mod users;

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use crate::cache::CacheConfig;
use crate::config::ClientConfig;
use crate::error::{ApiError, ApiResult, ClientError};
use crate::http::{ApiRequest, HttpClient, Transport};
use crate::models::HealthStatus;
use crate::store::DataStore;

pub use slots::SlotsService;
pub use users::UsersService;

// Parses a backend body into its model at the edge
pub(crate) fn parse<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(ApiError::from)
}

pub struct SchedulinkApi {
    transport: Arc<dyn Transport>,
    store: Arc<DataStore>,
    users: UsersService,
    slots: SlotsService,
}

impl SchedulinkApi {
    // Talks to the backend over HTTP with a fresh store
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let transport: Arc<dyn Transport> = Arc::new(HttpClient::new(&config)?);
        let store = Arc::new(DataStore::new(CacheConfig::default()));
        Ok(Self::with_transport(&config, transport, store))
    }

    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn with_transport(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
        store: Arc<DataStore>,
    ) -> Self {
        Self {
            users: UsersService::new(Arc::clone(&transport), Arc::clone(&store), config.users_cache),
            slots: SlotsService::new(Arc::clone(&transport), Arc::clone(&store), config.slots_cache),
            transport,
            store,
        }
    }

    pub fn users(&self) -> &UsersService {
        &self.users
    }

    pub fn slots(&self) -> &SlotsService {
        &self.slots
    }

    pub fn store(&self) -> &DataStore {
        &self.store
    }

    // Never cached; any failure reads as the backend being down
    pub async fn health(&self) -> ApiResult<HealthStatus> {
        let result = self
            .transport
            .execute(ApiRequest::get("/health"))
            .await
            .and_then(parse::<HealthStatus>);

        match result {
            Ok(status) => ApiResult::Success(status),
            Err(err) => {
                tracing::warn!(error = %err, "health check failed");
                ApiResult::Failure("Backend service unavailable".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::mock_backend::MockBackend;
    use chrono::NaiveDate;
    use crate::models::{SlotFilters, SlotUpdate};

    fn api_with(backend: Arc<MockBackend>) -> SchedulinkApi {
        SchedulinkApi::with_transport(
            &ClientConfig::default(),
            backend,
            Arc::new(DataStore::default()),
        )
    }

    fn jan_15() -> SlotFilters {
        SlotFilters::on(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_default_policy_is_independent_of_resource_policies() {
        let config = ClientConfig::default()
            .with_users_cache(crate::cache::CachePolicy::UntilInvalidated)
            .with_slots_cache(crate::cache::CachePolicy::UntilInvalidated);
        let api = SchedulinkApi::new(config).unwrap();

        // Untagged writes use the cache's own 30 s default
        api.store().cache().set("adhoc", serde_json::json!(1));
        tokio::time::advance(std::time::Duration::from_secs(31)).await;
        assert_eq!(api.store().cache().get("adhoc"), None);
    }

    #[tokio::test]
    async fn test_health() {
        let backend = Arc::new(MockBackend::new());
        let api = api_with(Arc::clone(&backend));

        let health = api.health().await;
        assert_eq!(health.data().and_then(|h| h.status.as_deref()), Some("healthy"));

        backend.fail_next_requests(1);
        let health = api.health().await;
        assert_eq!(health.error(), Some("Backend service unavailable"));
    }

    #[tokio::test]
    async fn test_end_to_end_booking_is_visible_in_next_listing() {
        let backend = Arc::new(
            MockBackend::new()
                .with_user(3, "Grace")
                .with_slot(7, "2024-01-15", "09:00:00", "09:30:00")
                .with_slot(8, "2024-01-15", "10:00:00", "10:30:00")
                .with_slot(9, "2024-01-16", "09:00:00", "09:30:00"),
        );
        let api = api_with(Arc::clone(&backend));

        let listed = api.slots().list_all(&jan_15()).await;
        let slots = listed.data().unwrap();
        assert_eq!(slots.len(), 2);
        assert!(slots.iter().all(|s| !s.is_booked));

        let booked = api.slots().book(7, 3).await;
        let slot = booked.data().unwrap();
        assert_eq!(slot.id, 7);
        assert!(slot.is_booked);
        assert_eq!(slot.booked_by, Some(3));

        let relisted = api.slots().list_all(&jan_15()).await;
        let slot_7 = relisted
            .data()
            .unwrap()
            .iter()
            .find(|s| s.id == 7)
            .cloned()
            .unwrap();
        assert!(slot_7.is_booked);
        assert_eq!(slot_7.booked_by, Some(3));
        assert_eq!(backend.count_of("GET /slots"), 2);

        let json = serde_json::to_value(&booked).unwrap();
        assert_eq!(json["success"], serde_json::json!(true));
        assert_eq!(json["data"]["booked_by"], serde_json::json!(3));
    }

    #[tokio::test]
    async fn test_every_mutation_forces_refetch() {
        let backend = Arc::new(
            MockBackend::new()
                .with_user(3, "Grace")
                .with_slot(7, "2024-01-15", "09:00:00", "09:30:00")
                .with_slot(8, "2024-01-15", "10:00:00", "10:30:00"),
        );
        let api = api_with(Arc::clone(&backend));
        let filters = jan_15();

        let mut expected_fetches = 0;
        let mut assert_refetched = |label: &str, backend: &MockBackend| {
            expected_fetches += 1;
            assert_eq!(backend.count_of("GET /slots"), expected_fetches, "after {}", label);
        };

        api.slots().list_all(&filters).await;
        api.slots().list_all(&filters).await;
        assert_refetched("warm up", &backend);

        assert!(api.slots().book(7, 3).await.is_success());
        api.slots().list_all(&filters).await;
        assert_refetched("book", &backend);

        assert!(api.slots().cancel(7).await.is_success());
        api.slots().list_all(&filters).await;
        assert_refetched("cancel", &backend);

        let update = SlotUpdate {
            title: Some("Consultation".into()),
            ..Default::default()
        };
        assert!(api.slots().update(8, update).await.is_success());
        api.slots().list_all(&filters).await;
        assert_refetched("update", &backend);

        assert!(api.slots().delete(8).await.is_success());
        let remaining = api.slots().list_all(&filters).await;
        assert_refetched("delete", &backend);
        assert_eq!(remaining.data().unwrap().len(), 1);

        let new_slot = crate::models::NewSlot {
            title: "Follow-up".into(),
            description: None,
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            start_time: chrono::NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
            end_time: chrono::NaiveTime::from_hms_opt(11, 30, 0).unwrap(),
            user_id: Some(3),
        };
        assert!(api.slots().create(new_slot).await.is_success());
        let with_new = api.slots().list_all(&filters).await;
        assert_refetched("slot create", &backend);
        assert_eq!(with_new.data().unwrap().len(), 2);

        let new_user = crate::models::NewUser {
            name: "Ada".into(),
            email: "ada@example.com".into(),
            phone: None,
        };
        assert!(api.users().create(new_user).await.is_success());
        api.slots().list_all(&filters).await;
        assert_refetched("user create", &backend);
    }
}
