mod aggregation_service;

pub use aggregation_service::{AggregationService, GenerationRetryConfig};
