//! Recommendation engine: feature computation, scenario matching, scoring,
//! diversification, explanations and run orchestration.

pub mod engine;
pub mod error;
pub mod explain;
pub mod features;
pub mod scenarios;
pub mod scorer;
pub mod store;

pub use engine::{RecommendationEngine, RecommendationItem, RecommendationResult, SkipReason};
pub use error::{EngineError, Result};
pub use explain::{Explanation, ExplanationGenerator};
pub use features::{CustomerFeatures, FeatureComputer};
pub use scenarios::{MatcherConfig, ScenarioMatcher};
pub use scorer::{diversify, rank, RecoScore, Scorer};
pub use store::{
    NewRecoItem, OrderStats, PostgresRecoStore, ProductFilter, ProductView, RecoStore,
};
