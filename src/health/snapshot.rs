use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};

/// Chronic conditions recorded for the subject
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Comorbidities {
    pub hypertension: bool,
    pub diabetes: bool,
    pub cardiac_disease: bool,
    pub renal_disease: bool,
    pub asthma: bool,
    pub depression: bool,
}

impl Comorbidities {
    /// Human readable names of the conditions that are present, in a fixed order
    pub fn present(&self) -> Vec<&'static str> {
        [
            (self.hypertension, "hypertension"),
            (self.diabetes, "diabetes"),
            (self.cardiac_disease, "cardiac disease"),
            (self.renal_disease, "renal disease"),
            (self.asthma, "asthma"),
            (self.depression, "depression"),
        ]
        .into_iter()
        .filter_map(|(present, name)| present.then_some(name))
        .collect()
    }
}

/// Lifestyle risk flags
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Lifestyle {
    pub smoker: bool,
    pub heavy_alcohol_use: bool,
}

/// Vital signs; every field is optional and absent readings score zero
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VitalSigns {
    pub systolic: Option<u16>,
    pub diastolic: Option<u16>,
    pub heart_rate: Option<u16>,
}

/// WHO-style body-mass index bands
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BmiCategory {
    Underweight,
    Normal,
    Overweight,
    Obese,
}

impl BmiCategory {
    pub fn from_bmi(bmi: f64) -> Self {
        if bmi < 18.5 {
            BmiCategory::Underweight
        } else if bmi < 25.0 {
            BmiCategory::Normal
        } else if bmi < 30.0 {
            BmiCategory::Overweight
        } else {
            BmiCategory::Obese
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BmiCategory::Underweight => "underweight",
            BmiCategory::Normal => "normal",
            BmiCategory::Overweight => "overweight",
            BmiCategory::Obese => "obese",
        }
    }
}

impl std::fmt::Display for BmiCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One measurement event for a subject.
///
/// Snapshots are immutable once built: the builder-style `with_*` methods
/// consume and return the value, and nothing in the engine mutates a
/// snapshot after ingestion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthSnapshot {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub subject_id: String,
    #[serde(default = "Utc::now")]
    pub recorded_at: DateTime<Utc>,
    pub age: u32,
    #[serde(default)]
    pub weight_kg: Option<f64>,
    #[serde(default)]
    pub height_m: Option<f64>,
    /// Supplied BMI; takes precedence over the weight/height derivation
    #[serde(default)]
    pub bmi: Option<f64>,
    #[serde(default)]
    pub vitals: VitalSigns,
    #[serde(default)]
    pub pain_level: u8,
    #[serde(default)]
    pub comorbidities: Comorbidities,
    #[serde(default)]
    pub lifestyle: Lifestyle,
}

impl HealthSnapshot {
    /// Create a snapshot with every optional reading absent
    pub fn new(subject_id: impl Into<String>, age: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject_id: subject_id.into(),
            recorded_at: Utc::now(),
            age,
            weight_kg: None,
            height_m: None,
            bmi: None,
            vitals: VitalSigns::default(),
            pain_level: 0,
            comorbidities: Comorbidities::default(),
            lifestyle: Lifestyle::default(),
        }
    }

    pub fn with_weight(mut self, weight_kg: f64) -> Self {
        self.weight_kg = Some(weight_kg);
        self
    }

    pub fn with_height(mut self, height_m: f64) -> Self {
        self.height_m = Some(height_m);
        self
    }

    pub fn with_bmi(mut self, bmi: f64) -> Self {
        self.bmi = Some(bmi);
        self
    }

    pub fn with_blood_pressure(mut self, systolic: u16, diastolic: u16) -> Self {
        self.vitals.systolic = Some(systolic);
        self.vitals.diastolic = Some(diastolic);
        self
    }

    pub fn with_systolic(mut self, systolic: u16) -> Self {
        self.vitals.systolic = Some(systolic);
        self
    }

    pub fn with_heart_rate(mut self, bpm: u16) -> Self {
        self.vitals.heart_rate = Some(bpm);
        self
    }

    pub fn with_pain_level(mut self, pain_level: u8) -> Self {
        self.pain_level = pain_level;
        self
    }

    pub fn with_comorbidities(mut self, comorbidities: Comorbidities) -> Self {
        self.comorbidities = comorbidities;
        self
    }

    pub fn with_lifestyle(mut self, lifestyle: Lifestyle) -> Self {
        self.lifestyle = lifestyle;
        self
    }

    pub fn recorded_at(mut self, recorded_at: DateTime<Utc>) -> Self {
        self.recorded_at = recorded_at;
        self
    }

    /// Effective BMI: the supplied value, else weight / height², else none
    pub fn body_mass_index(&self) -> Option<f64> {
        if self.bmi.is_some() {
            return self.bmi;
        }
        match (self.weight_kg, self.height_m) {
            (Some(weight), Some(height)) if height > 0.0 => Some(weight / (height * height)),
            _ => None,
        }
    }

    pub fn bmi_category(&self) -> Option<BmiCategory> {
        self.body_mass_index().map(BmiCategory::from_bmi)
    }

    /// Reject values the type system cannot rule out.
    ///
    /// Absent readings are never an error here; only present but
    /// malformed ones are.
    pub fn validate(&self) -> EngineResult<()> {
        if self.subject_id.trim().is_empty() {
            return Err(EngineError::InvalidSubject);
        }
        if self.pain_level > 10 {
            return Err(EngineError::InvalidSnapshot(format!(
                "pain level {} outside 0-10",
                self.pain_level
            )));
        }
        for (name, value) in [
            ("weight_kg", self.weight_kg),
            ("height_m", self.height_m),
            ("bmi", self.bmi),
        ] {
            if let Some(value) = value {
                if !value.is_finite() || value <= 0.0 {
                    return Err(EngineError::InvalidSnapshot(format!(
                        "{name} must be a positive number, got {value}"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bmi_derived_from_weight_and_height() {
        let snapshot = HealthSnapshot::new("s-1", 40)
            .with_weight(80.0)
            .with_height(2.0);
        assert_eq!(snapshot.body_mass_index(), Some(20.0));
        assert_eq!(snapshot.bmi_category(), Some(BmiCategory::Normal));
    }

    #[test]
    fn test_supplied_bmi_wins() {
        let snapshot = HealthSnapshot::new("s-1", 40)
            .with_weight(80.0)
            .with_height(2.0)
            .with_bmi(31.0);
        assert_eq!(snapshot.body_mass_index(), Some(31.0));
        assert_eq!(snapshot.bmi_category(), Some(BmiCategory::Obese));
    }

    #[test]
    fn test_bmi_absent_without_height() {
        let snapshot = HealthSnapshot::new("s-1", 40).with_weight(80.0);
        assert_eq!(snapshot.body_mass_index(), None);
    }

    #[test]
    fn test_validate() {
        assert!(HealthSnapshot::new("s-1", 30).validate().is_ok());
        assert!(matches!(
            HealthSnapshot::new("  ", 30).validate(),
            Err(EngineError::InvalidSubject)
        ));
        assert!(matches!(
            HealthSnapshot::new("s-1", 30).with_pain_level(11).validate(),
            Err(EngineError::InvalidSnapshot(_))
        ));
        assert!(matches!(
            HealthSnapshot::new("s-1", 30).with_weight(0.0).validate(),
            Err(EngineError::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn test_deserialize_minimal_json() {
        let snapshot: HealthSnapshot =
            serde_json::from_str(r#"{"subject_id": "s-9", "age": 52}"#).unwrap();
        assert_eq!(snapshot.subject_id, "s-9");
        assert_eq!(snapshot.vitals, VitalSigns::default());
        assert_eq!(snapshot.pain_level, 0);
        assert!(snapshot.comorbidities.present().is_empty());
    }

    #[test]
    fn test_present_comorbidities_order() {
        let comorbidities = Comorbidities {
            depression: true,
            hypertension: true,
            ..Default::default()
        };
        assert_eq!(comorbidities.present(), vec!["hypertension", "depression"]);
    }
}
