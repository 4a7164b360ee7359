use std::sync::Arc;

use crate::cache::{cache_key, CachePolicy};
use crate::error::{ApiError, ApiResult};
use crate::http::{ApiRequest, Transport};
use crate::models::{BookSlot, NewSlot, Slot, SlotFilters, SlotUpdate};
use crate::services::parse;
use crate::store::DataStore;

pub const SLOTS_RESOURCE: &str = "slots";

pub struct SlotsService {
    transport: Arc<dyn Transport>,
    store: Arc<DataStore>,
    policy: CachePolicy,
}

impl SlotsService {
    pub fn new(transport: Arc<dyn Transport>, store: Arc<DataStore>, policy: CachePolicy) -> Self {
        Self {
            transport,
            store,
            policy,
        }
    }

    pub fn cache_key(filters: &SlotFilters) -> String {
        cache_key(SLOTS_RESOURCE, filters)
    }

    pub async fn list_all(&self, filters: &SlotFilters) -> ApiResult<Vec<Slot>> {
        let key = Self::cache_key(filters);
        let transport = Arc::clone(&self.transport);
        let request = ApiRequest::get("/slots").with_query(filters.to_query());

        let result = self
            .store
            .read_through(&key, self.policy, move || async move {
                transport.execute(request).await
            })
            .await
            .and_then(parse);

        ApiResult::from_result(result, "Failed to fetch slots")
    }

    // User-triggered reload of one listing; failures are never retried automatically
    pub async fn refresh(&self, filters: &SlotFilters) -> ApiResult<Vec<Slot>> {
        self.store.invalidate(&Self::cache_key(filters));
        self.list_all(filters).await
    }

    pub async fn get_by_id(&self, slot_id: i64) -> ApiResult<Slot> {
        let result = self
            .transport
            .execute(ApiRequest::get(format!("/slots/{}", slot_id)))
            .await
            .and_then(parse);
        ApiResult::from_result(result, "Failed to fetch slot")
    }

    pub async fn create(&self, slot: NewSlot) -> ApiResult<Slot> {
        let result = match ApiRequest::post("/slots").with_json(&slot) {
            Ok(request) => self.mutate("create slot", request).await,
            Err(err) => Err(err),
        };
        ApiResult::from_result(result, "Failed to create slot")
    }

    pub async fn book(&self, slot_id: i64, user_id: i64) -> ApiResult<Slot> {
        let result = match ApiRequest::patch(format!("/slots/{}/book", slot_id))
            .with_json(&BookSlot { user_id })
        {
            Ok(request) => self.mutate("book slot", request).await,
            Err(err) => Err(err),
        };
        ApiResult::from_result(result, "Failed to book slot")
    }

    pub async fn cancel(&self, slot_id: i64) -> ApiResult<Slot> {
        let request = ApiRequest::patch(format!("/slots/{}/cancel", slot_id));
        ApiResult::from_result(
            self.mutate("cancel booking", request).await,
            "Failed to cancel booking",
        )
    }

    pub async fn update(&self, slot_id: i64, update: SlotUpdate) -> ApiResult<Slot> {
        let result = match ApiRequest::put(format!("/slots/{}", slot_id)).with_json(&update) {
            Ok(request) => self.mutate("update slot", request).await,
            Err(err) => Err(err),
        };
        ApiResult::from_result(result, "Failed to update slot")
    }

    pub async fn delete(&self, slot_id: i64) -> ApiResult<()> {
        let request = ApiRequest::delete(format!("/slots/{}", slot_id));
        let result = self
            .store
            .mutate("delete slot", self.transport.execute(request))
            .await
            .map(|_| ());
        ApiResult::from_result(result, "Failed to delete slot")
    }

    async fn mutate(&self, operation: &str, request: ApiRequest) -> Result<Slot, ApiError> {
        let value = self
            .store
            .mutate(operation, self.transport.execute(request))
            .await?;
        parse(value)
    }
}
