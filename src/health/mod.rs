pub mod report;
pub mod scorer;
pub mod snapshot;

pub use report::{ReportGenerator, RiskReport};
pub use scorer::{RiskClassification, RiskScorer, ScoreBreakdown, ScoringWeights, Tier};
pub use snapshot::{BmiCategory, Comorbidities, HealthSnapshot, Lifestyle, VitalSigns};
