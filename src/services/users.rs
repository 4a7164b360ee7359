use std::sync::Arc;

use crate::cache::{cache_key, CachePolicy};
use crate::error::{ApiError, ApiResult};
use crate::http::{ApiRequest, Transport};
use crate::models::{NewUser, Slot, User};
use crate::services::parse;
use crate::store::DataStore;

pub const USERS_RESOURCE: &str = "users";

pub struct UsersService {
    transport: Arc<dyn Transport>,
    store: Arc<DataStore>,
    policy: CachePolicy,
}

impl UsersService {
    pub fn new(transport: Arc<dyn Transport>, store: Arc<DataStore>, policy: CachePolicy) -> Self {
        Self {
            transport,
            store,
            policy,
        }
    }

    pub async fn list_all(&self) -> ApiResult<Vec<User>> {
        let key = cache_key(USERS_RESOURCE, &());
        let transport = Arc::clone(&self.transport);

        let result = self
            .store
            .read_through(&key, self.policy, move || async move {
                transport.execute(ApiRequest::get("/users")).await
            })
            .await
            .and_then(parse);

        ApiResult::from_result(result, "Failed to fetch users")
    }

    pub async fn create(&self, user: NewUser) -> ApiResult<User> {
        ApiResult::from_result(self.try_create(user).await, "Failed to create user")
    }

    async fn try_create(&self, user: NewUser) -> Result<User, ApiError> {
        let request = ApiRequest::post("/users").with_json(&user)?;
        let created = self
            .store
            .mutate("create user", self.transport.execute(request))
            .await?;
        parse(created)
    }

    pub async fn get_by_id(&self, user_id: i64) -> ApiResult<User> {
        let result = self
            .transport
            .execute(ApiRequest::get(format!("/users/{}", user_id)))
            .await
            .and_then(parse);
        ApiResult::from_result(result, "Failed to fetch user")
    }

    // Slots published by the user
    pub async fn slots(&self, user_id: i64) -> ApiResult<Vec<Slot>> {
        let result = self
            .transport
            .execute(ApiRequest::get(format!("/users/{}/slots", user_id)))
            .await
            .and_then(parse);
        ApiResult::from_result(result, "Failed to fetch user slots")
    }

    // Slots the user has booked
    pub async fn bookings(&self, user_id: i64) -> ApiResult<Vec<Slot>> {
        let result = self
            .transport
            .execute(ApiRequest::get(format!("/users/{}/bookings", user_id)))
            .await
            .and_then(parse);
        ApiResult::from_result(result, "Failed to fetch user bookings")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::mock_backend::MockBackend;

    fn service(backend: &Arc<MockBackend>, policy: CachePolicy) -> UsersService {
        UsersService::new(backend.clone(), Arc::new(DataStore::default()), policy)
    }

    #[tokio::test]
    async fn test_list_all_is_cached_until_create() {
        let backend = Arc::new(MockBackend::new().with_user(1, "Ada"));
        let users = service(&backend, CachePolicy::UntilInvalidated);

        assert_eq!(users.list_all().await.data().unwrap().len(), 1);
        assert_eq!(users.list_all().await.data().unwrap().len(), 1);
        assert_eq!(backend.count_of("GET /users"), 1);

        let created = users
            .create(NewUser {
                name: "Grace".into(),
                email: "grace@example.com".into(),
                phone: Some("555-0100".into()),
            })
            .await;
        assert_eq!(created.data().unwrap().name, "Grace");

        assert_eq!(users.list_all().await.data().unwrap().len(), 2);
        assert_eq!(backend.count_of("GET /users"), 2);
    }

    #[tokio::test]
    async fn test_concurrent_list_all_issues_one_request() {
        let backend = Arc::new(MockBackend::new().with_user(1, "Ada"));
        backend.set_delay(20);
        let users = service(&backend, CachePolicy::UntilInvalidated);

        let (a, b) = tokio::join!(users.list_all(), users.list_all());
        assert_eq!(a, b);
        assert!(a.is_success());
        assert_eq!(backend.request_count(), 1);
    }

    #[tokio::test]
    async fn test_failures_surface_as_messages() {
        let backend = Arc::new(MockBackend::new().with_user(1, "Ada"));
        let users = service(&backend, CachePolicy::UntilInvalidated);

        let missing = users.get_by_id(42).await;
        assert_eq!(missing.error(), Some("User not found"));

        let invalid = users
            .create(NewUser {
                name: "Nobody".into(),
                email: String::new(),
                phone: None,
            })
            .await;
        assert_eq!(invalid.error(), Some("email: field required"));

        backend.fail_next_requests(1);
        let failed = users.list_all().await;
        assert_eq!(failed.error(), Some("Internal Server Error"));
    }

    #[tokio::test]
    async fn test_user_slots_and_bookings() {
        let backend = Arc::new(
            MockBackend::new()
                .with_user(1, "Ada")
                .with_slot(7, "2024-01-15", "09:00:00", "09:30:00")
                .with_slot(8, "2024-01-15", "10:00:00", "10:30:00"),
        );
        let users = service(&backend, CachePolicy::UntilInvalidated);

        assert_eq!(users.slots(1).await.data().unwrap().len(), 2);
        assert!(users.bookings(3).await.data().unwrap().is_empty());
        assert_eq!(users.get_by_id(1).await.data().unwrap().email, "ada@example.com");
    }
}
