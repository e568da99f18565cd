pub mod classifier;
pub mod ensemble;
pub mod evaluation;
pub mod features;
pub mod history;
pub mod numerology;
pub mod parlay;
pub mod service;
pub mod weather;

pub use classifier::ClassifierRegistry;
pub use ensemble::{EnsemblePredictor, FailurePolicy};
pub use features::FeatureEngineer;
pub use service::PredictionService;
pub use weather::WeatherCache;
