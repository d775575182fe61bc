mod adaptive_aggregator;
mod aggregation_strategy;
mod downsample;
mod series_service;

pub use adaptive_aggregator::*;
pub use aggregation_strategy::*;
pub use downsample::*;
pub use series_service::*;
