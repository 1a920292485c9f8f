use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::scorer::Tier;
use super::snapshot::HealthSnapshot;
use crate::error::EngineResult;

/// Recommendation document for one subject's current tier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskReport {
    pub subject_id: String,
    pub tier: Tier,
    pub headline: String,
    /// Clinical summary lines; empty when the report was built from a tier alone
    #[serde(default)]
    pub summary: Vec<String>,
    /// Order is significant
    pub recommendations: Vec<String>,
    /// Days until the subject should be seen again
    pub follow_up_days: u32,
    pub generated_at: DateTime<Utc>,
}

const LOW_RECOMMENDATIONS: &[&str] = &[
    "Routine medical appointment",
    "Reassess in six months",
    "Maintain preventive care and vaccination schedule",
];

const MEDIUM_RECOMMENDATIONS: &[&str] = &[
    "Medical appointment within 7 days",
    "Monthly follow-up by the community health agent",
    "Review control of chronic conditions",
];

const HIGH_RECOMMENDATIONS: &[&str] = &[
    "Medical appointment within 24 hours",
    "Reassess vital signs within 48 hours",
    "Notify the responsible care team",
    "Prioritise home visit in the next agent round",
];

const SMOKING_RECOMMENDATION: &str = "Smoking cessation counselling";
const ALCOHOL_RECOMMENDATION: &str = "Counselling on alcohol consumption";

/// Builds reports from fixed per-tier templates.
///
/// Never touches the location registry: callers pass the tier in.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportGenerator;

impl ReportGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Fixed template list for a tier
    pub fn recommendations(tier: Tier) -> &'static [&'static str] {
        match tier {
            Tier::Low => LOW_RECOMMENDATIONS,
            Tier::Medium => MEDIUM_RECOMMENDATIONS,
            Tier::High => HIGH_RECOMMENDATIONS,
        }
    }

    fn headline(tier: Tier) -> &'static str {
        match tier {
            Tier::Low => "Preventive follow-up",
            Tier::Medium => "Regular follow-up",
            Tier::High => "Priority follow-up",
        }
    }

    fn follow_up_days(tier: Tier) -> u32 {
        match tier {
            Tier::Low => 180,
            Tier::Medium => 30,
            Tier::High => 2,
        }
    }

    pub fn generate(&self, subject_id: &str, tier: Tier) -> RiskReport {
        RiskReport {
            subject_id: subject_id.to_string(),
            tier,
            headline: Self::headline(tier).to_string(),
            summary: Vec::new(),
            recommendations: Self::recommendations(tier)
                .iter()
                .map(|line| line.to_string())
                .collect(),
            follow_up_days: Self::follow_up_days(tier),
            generated_at: Utc::now(),
        }
    }

    /// Label-based entry point; fails with `UnknownTier` for anything other
    /// than `low`, `medium` or `high`
    pub fn generate_from_label(&self, subject_id: &str, tier: &str) -> EngineResult<RiskReport> {
        Ok(self.generate(subject_id, tier.parse()?))
    }

    /// Tier template followed by lifestyle advice taken from the snapshot,
    /// plus a clinical summary of the readings behind it
    pub fn generate_for_snapshot(&self, tier: Tier, snapshot: &HealthSnapshot) -> RiskReport {
        let mut report = self.generate(&snapshot.subject_id, tier);
        report.summary = Self::clinical_summary(snapshot);
        if snapshot.lifestyle.smoker {
            report.recommendations.push(SMOKING_RECOMMENDATION.to_string());
        }
        if snapshot.lifestyle.heavy_alcohol_use {
            report.recommendations.push(ALCOHOL_RECOMMENDATION.to_string());
        }
        report
    }

    /// One line per reading group; absent readings are left out
    pub fn clinical_summary(snapshot: &HealthSnapshot) -> Vec<String> {
        let mut lines = vec![format!("Age: {} years", snapshot.age)];

        let conditions = snapshot.comorbidities.present();
        if conditions.is_empty() {
            lines.push("No known comorbidities".to_string());
        } else {
            lines.push(format!("Comorbidities: {}", conditions.join(", ")));
        }

        let vitals = &snapshot.vitals;
        let mut readings = Vec::new();
        match (vitals.systolic, vitals.diastolic) {
            (Some(systolic), Some(diastolic)) => {
                readings.push(format!("BP {systolic}x{diastolic} mmHg"))
            }
            (Some(systolic), None) => readings.push(format!("systolic {systolic} mmHg")),
            (None, Some(diastolic)) => readings.push(format!("diastolic {diastolic} mmHg")),
            (None, None) => {}
        }
        if let Some(bpm) = vitals.heart_rate {
            readings.push(format!("HR {bpm} bpm"));
        }
        if !readings.is_empty() {
            lines.push(format!("Vital signs: {}", readings.join(", ")));
        }

        if let (Some(bmi), Some(category)) = (snapshot.body_mass_index(), snapshot.bmi_category()) {
            lines.push(format!("BMI: {bmi:.1} ({category})"));
        }

        lines.push(format!("Pain level: {}/10", snapshot.pain_level));
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::health::snapshot::{Comorbidities, Lifestyle};

    #[test]
    fn test_high_tier_recommendation_order() {
        let report = ReportGenerator::new().generate("s-1", Tier::High);
        assert_eq!(
            report.recommendations,
            vec![
                "Medical appointment within 24 hours",
                "Reassess vital signs within 48 hours",
                "Notify the responsible care team",
                "Prioritise home visit in the next agent round",
            ]
        );
        assert_eq!(report.follow_up_days, 2);
        assert_eq!(report.headline, "Priority follow-up");
    }

    #[test]
    fn test_each_tier_has_distinct_templates() {
        let generator = ReportGenerator::new();
        let low = generator.generate("s", Tier::Low);
        let medium = generator.generate("s", Tier::Medium);
        assert_eq!(low.recommendations[0], "Routine medical appointment");
        assert_eq!(medium.recommendations[0], "Medical appointment within 7 days");
        assert_ne!(low.recommendations, medium.recommendations);
    }

    #[test]
    fn test_generate_from_label() {
        let generator = ReportGenerator::new();
        let report = generator.generate_from_label("s-2", "medium").unwrap();
        assert_eq!(report.tier, Tier::Medium);
        assert!(matches!(
            generator.generate_from_label("s-2", "critical"),
            Err(EngineError::UnknownTier(_))
        ));
    }

    #[test]
    fn test_lifestyle_advice_is_appended_after_template() {
        let snapshot = HealthSnapshot::new("s-3", 50).with_lifestyle(Lifestyle {
            smoker: true,
            heavy_alcohol_use: true,
        });
        let report = ReportGenerator::new().generate_for_snapshot(Tier::Low, &snapshot);
        let n = LOW_RECOMMENDATIONS.len();
        assert_eq!(report.recommendations.len(), n + 2);
        assert_eq!(report.recommendations[n], SMOKING_RECOMMENDATION);
        assert_eq!(report.recommendations[n + 1], ALCOHOL_RECOMMENDATION);
        assert_eq!(report.subject_id, "s-3");
    }

    #[test]
    fn test_plain_report_has_no_summary() {
        let report = ReportGenerator::new().generate("s-4", Tier::Medium);
        assert!(report.summary.is_empty());
    }

    #[test]
    fn test_snapshot_report_summary() {
        let snapshot = HealthSnapshot::new("s-5", 70)
            .with_blood_pressure(150, 95)
            .with_heart_rate(88)
            .with_weight(90.0)
            .with_height(1.70)
            .with_pain_level(8)
            .with_comorbidities(Comorbidities {
                hypertension: true,
                diabetes: true,
                ..Default::default()
            });
        let report = ReportGenerator::new().generate_for_snapshot(Tier::High, &snapshot);
        assert_eq!(
            report.summary,
            vec![
                "Age: 70 years",
                "Comorbidities: hypertension, diabetes",
                "Vital signs: BP 150x95 mmHg, HR 88 bpm",
                "BMI: 31.1 (obese)",
                "Pain level: 8/10",
            ]
        );
    }

    #[test]
    fn test_summary_skips_absent_readings() {
        let summary = ReportGenerator::clinical_summary(&HealthSnapshot::new("s-6", 30));
        assert_eq!(
            summary,
            vec!["Age: 30 years", "No known comorbidities", "Pain level: 0/10"]
        );
    }
}
