pub mod analysis;
pub mod config;
pub mod data;
pub mod domain;
pub mod errors;
pub mod events;
pub mod pipeline;
pub mod recommend;
pub mod segmentation;

pub use analysis::{analyze_sales, RevenueEntry, SalesInsights};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use data::{
    filter_purchases, generate_dataset, load_purchases, write_dataset, IngestError, LoadSummary,
    LoadedPurchases, PurchaseFilter, SyntheticDataSpec,
};
pub use domain::customer::CustomerId;
pub use domain::product::{Product, ProductId};
pub use domain::purchase::Purchase;
pub use errors::{ApplicationError, DomainError};
pub use events::{EventSink, InMemoryEventSink, PipelineEvent, TracingEventSink};
pub use pipeline::{run_pipeline, PipelineOutcome};
pub use recommend::{explain, Recommendation, RecommendationEngine, TrainingReport};
pub use segmentation::{segment_customers, ClusterSummary, CustomerSegment, Segmentation};
