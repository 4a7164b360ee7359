// Main library file for the Schedulink client data-access layer

pub mod cache;
pub mod config;
pub mod dedup;
pub mod error;
pub mod http;
pub mod models;
pub mod services;
pub mod store;

// Re-export key types for convenience
pub use cache::{cache_key, CacheConfig, CachePolicy, CacheStatsReport, ResponseCache};
pub use config::ClientConfig;
pub use dedup::{DedupStats, RequestDeduplicator};
pub use error::{ApiError, ApiResult, ClientError};
pub use http::{ApiRequest, ClientStats, HttpClient, Transport};
pub use models::{BookSlot, HealthStatus, NewSlot, NewUser, Slot, SlotFilters, SlotUpdate, User};
pub use services::{SchedulinkApi, SlotsService, UsersService};
pub use store::DataStore;
