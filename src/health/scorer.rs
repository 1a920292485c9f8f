use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::snapshot::HealthSnapshot;
use crate::error::EngineError;

/// Lowest score classified as [`Tier::Medium`]
pub const MEDIUM_THRESHOLD: u32 = 4;
/// Lowest score classified as [`Tier::High`]
pub const HIGH_THRESHOLD: u32 = 8;

/// Ordered risk category
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Low,
    Medium,
    High,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Low, Tier::Medium, Tier::High];

    /// 0-3 low, 4-7 medium, 8 and above high
    pub fn from_score(score: u32) -> Self {
        if score >= HIGH_THRESHOLD {
            Tier::High
        } else if score >= MEDIUM_THRESHOLD {
            Tier::Medium
        } else {
            Tier::Low
        }
    }

    /// Heat-map weight; reproducible from the tier alone
    pub fn weight(self) -> u32 {
        match self {
            Tier::Low => 1,
            Tier::Medium => 2,
            Tier::High => 4,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Tier::Low => "low",
            Tier::Medium => "medium",
            Tier::High => "high",
        }
    }

    /// Marker colour used by the map front end
    pub fn color(self) -> &'static str {
        match self {
            Tier::Low => "#28a745",
            Tier::Medium => "#ffc107",
            Tier::High => "#dc3545",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Tier {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Tier::Low),
            "medium" => Ok(Tier::Medium),
            "high" => Ok(Tier::High),
            _ => Err(EngineError::UnknownTier(s.to_string())),
        }
    }
}

/// Points awarded per present comorbidity. Each weight must stay within 1..=3.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScoringWeights {
    pub hypertension: u32,
    pub diabetes: u32,
    pub cardiac_disease: u32,
    pub renal_disease: u32,
    pub asthma: u32,
    pub depression: u32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            hypertension: 1,
            diabetes: 2,
            cardiac_disease: 3,
            renal_disease: 3,
            asthma: 1,
            depression: 1,
        }
    }
}

impl ScoringWeights {
    /// Every condition must add between one and three points
    pub fn is_valid(&self) -> bool {
        [
            self.hypertension,
            self.diabetes,
            self.cardiac_disease,
            self.renal_disease,
            self.asthma,
            self.depression,
        ]
        .iter()
        .all(|weight| (1..=3).contains(weight))
    }
}

/// Per-factor points; the sum is the total score
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoreBreakdown {
    pub age: u32,
    pub comorbidities: u32,
    pub blood_pressure: u32,
    pub heart_rate: u32,
    pub bmi: u32,
    pub pain: u32,
    pub lifestyle: u32,
}

impl ScoreBreakdown {
    pub fn total(&self) -> u32 {
        self.age
            + self.comorbidities
            + self.blood_pressure
            + self.heart_rate
            + self.bmi
            + self.pain
            + self.lifestyle
    }
}

/// Derived, recomputable classification of one snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskClassification {
    pub snapshot_id: Uuid,
    pub score: u32,
    pub tier: Tier,
    pub breakdown: ScoreBreakdown,
    pub computed_at: DateTime<Utc>,
}

/// Additive point-table scorer.
///
/// Pure and deterministic: holds only immutable weights, so a single
/// instance can be shared by any number of callers.
#[derive(Debug, Clone, Default)]
pub struct RiskScorer {
    weights: ScoringWeights,
}

impl RiskScorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Score and tier for a snapshot. Missing optional fields contribute zero.
    pub fn score(&self, snapshot: &HealthSnapshot) -> (u32, Tier) {
        let score = self.breakdown(snapshot).total();
        (score, Tier::from_score(score))
    }

    pub fn classify(&self, snapshot: &HealthSnapshot) -> RiskClassification {
        let breakdown = self.breakdown(snapshot);
        let score = breakdown.total();
        RiskClassification {
            snapshot_id: snapshot.id,
            score,
            tier: Tier::from_score(score),
            breakdown,
            computed_at: Utc::now(),
        }
    }

    pub fn breakdown(&self, snapshot: &HealthSnapshot) -> ScoreBreakdown {
        ScoreBreakdown {
            age: age_points(snapshot.age),
            comorbidities: self.comorbidity_points(snapshot),
            blood_pressure: blood_pressure_points(
                snapshot.vitals.systolic,
                snapshot.vitals.diastolic,
            ),
            heart_rate: heart_rate_points(snapshot.vitals.heart_rate),
            bmi: snapshot.body_mass_index().map_or(0, bmi_points),
            pain: pain_points(snapshot.pain_level),
            lifestyle: u32::from(snapshot.lifestyle.smoker)
                + u32::from(snapshot.lifestyle.heavy_alcohol_use),
        }
    }

    fn comorbidity_points(&self, snapshot: &HealthSnapshot) -> u32 {
        let c = &snapshot.comorbidities;
        let w = &self.weights;
        [
            (c.hypertension, w.hypertension),
            (c.diabetes, w.diabetes),
            (c.cardiac_disease, w.cardiac_disease),
            (c.renal_disease, w.renal_disease),
            (c.asthma, w.asthma),
            (c.depression, w.depression),
        ]
        .iter()
        .filter(|(present, _)| *present)
        .map(|(_, weight)| weight)
        .sum()
    }
}

fn age_points(age: u32) -> u32 {
    match age {
        75.. => 4,
        60..=74 => 3,
        45..=59 => 2,
        _ => 0,
    }
}

fn blood_pressure_points(systolic: Option<u16>, diastolic: Option<u16>) -> u32 {
    let systolic = systolic.unwrap_or(0);
    let diastolic = diastolic.unwrap_or(0);
    if systolic >= 160 || diastolic >= 100 {
        3
    } else if systolic >= 140 || diastolic >= 90 {
        2
    } else {
        0
    }
}

fn heart_rate_points(heart_rate: Option<u16>) -> u32 {
    match heart_rate {
        Some(bpm) if !(60..=100).contains(&bpm) => 1,
        _ => 0,
    }
}

fn bmi_points(bmi: f64) -> u32 {
    if bmi >= 35.0 || bmi < 16.0 {
        2
    } else if bmi >= 30.0 || bmi < 18.5 {
        1
    } else {
        0
    }
}

fn pain_points(pain_level: u8) -> u32 {
    match pain_level {
        7.. => 2,
        4..=6 => 1,
        _ => 0,
    }
}
