use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{EngineError, EngineResult};
use crate::health::Tier;

/// One subject's current presence on the map
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub subject_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub tier: Tier,
    pub updated_at: DateTime<Utc>,
}

impl GeoPoint {
    pub fn weight(&self) -> u32 {
        self.tier.weight()
    }
}

/// Reject anything outside WGS84 ranges, including NaN
pub fn validate_coordinates(latitude: f64, longitude: f64) -> EngineResult<()> {
    if (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude) {
        Ok(())
    } else {
        Err(EngineError::InvalidCoordinate {
            latitude,
            longitude,
        })
    }
}

/// Holds exactly one point per subject.
///
/// Each upsert is a single write-locked step; input is validated before the
/// lock is taken, so a rejected upsert leaves the registry untouched.
#[derive(Debug, Default)]
pub struct LocationRegistry {
    points: RwLock<HashMap<String, GeoPoint>>,
}

impl LocationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or fully replace the subject's point; last write wins
    pub fn upsert(
        &self,
        subject_id: &str,
        latitude: f64,
        longitude: f64,
        tier: Tier,
    ) -> EngineResult<GeoPoint> {
        self.upsert_at(subject_id, latitude, longitude, tier, Utc::now())
    }

    /// Same as `upsert` with an explicit last-updated time, used when
    /// replaying logged snapshots
    pub fn upsert_at(
        &self,
        subject_id: &str,
        latitude: f64,
        longitude: f64,
        tier: Tier,
        updated_at: DateTime<Utc>,
    ) -> EngineResult<GeoPoint> {
        if subject_id.trim().is_empty() {
            tracing::warn!("拒绝空主体标识的位置更新");
            return Err(EngineError::InvalidSubject);
        }
        if let Err(e) = validate_coordinates(latitude, longitude) {
            tracing::warn!("拒绝主体 {} 的无效坐标: {}", subject_id, e);
            return Err(e);
        }

        let point = GeoPoint {
            subject_id: subject_id.to_string(),
            latitude,
            longitude,
            tier,
            updated_at,
        };

        let previous = self
            .points
            .write()
            .insert(subject_id.to_string(), point.clone());

        match previous {
            Some(old) if old.tier != point.tier => {
                tracing::debug!("主体 {} 风险等级变化: {} -> {}", subject_id, old.tier, point.tier);
            }
            Some(_) => tracing::trace!("主体 {} 位置已更新", subject_id),
            None => tracing::debug!("新增主体 {} ({})", subject_id, point.tier),
        }

        Ok(point)
    }

    pub fn get(&self, subject_id: &str) -> EngineResult<GeoPoint> {
        self.points
            .read()
            .get(subject_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(subject_id.to_string()))
    }

    /// Point-in-time copy of every point; iterate it as often as needed
    pub fn all(&self) -> Vec<GeoPoint> {
        self.points.read().values().cloned().collect()
    }

    pub fn remove(&self, subject_id: &str) -> Option<GeoPoint> {
        self.points.write().remove(subject_id)
    }

    pub fn len(&self) -> usize {
        self.points.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_replaces_previous_point() {
        let registry = LocationRegistry::new();
        registry.upsert("s-1", 10.0, 20.0, Tier::Low).unwrap();
        let second = registry.upsert("s-1", -23.55, -46.63, Tier::High).unwrap();

        assert_eq!(registry.len(), 1);
        let stored = registry.get("s-1").unwrap();
        assert_eq!(stored, second);
        assert_eq!(stored.tier, Tier::High);
        assert_eq!(stored.latitude, -23.55);
    }

    #[test]
    fn test_invalid_coordinate_leaves_registry_unchanged() {
        let registry = LocationRegistry::new();
        registry.upsert("s-1", 0.0, 0.0, Tier::Low).unwrap();

        let result = registry.upsert("s-2", 200.0, 0.0, Tier::High);
        assert!(matches!(result, Err(EngineError::InvalidCoordinate { .. })));
        assert!(matches!(
            registry.upsert("s-1", 0.0, -180.5, Tier::High),
            Err(EngineError::InvalidCoordinate { .. })
        ));
        assert!(matches!(
            registry.upsert("s-1", f64::NAN, 0.0, Tier::High),
            Err(EngineError::InvalidCoordinate { .. })
        ));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("s-1").unwrap().tier, Tier::Low);
    }

    #[test]
    fn test_empty_subject_rejected() {
        let registry = LocationRegistry::new();
        assert!(matches!(
            registry.upsert("", 0.0, 0.0, Tier::Low),
            Err(EngineError::InvalidSubject)
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_boundary_coordinates_accepted() {
        let registry = LocationRegistry::new();
        registry.upsert("north", 90.0, 180.0, Tier::Low).unwrap();
        registry.upsert("south", -90.0, -180.0, Tier::Low).unwrap();
        assert_eq!(registry.all().len(), 2);
    }

    #[test]
    fn test_get_unknown_subject() {
        let registry = LocationRegistry::new();
        assert!(matches!(registry.get("nobody"), Err(EngineError::NotFound(_))));
    }

    #[test]
    fn test_concurrent_upserts_keep_one_point_per_subject() {
        use std::sync::Arc;

        let registry = Arc::new(LocationRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let subject = format!("s-{}", i % 25);
                        let tier = Tier::ALL[(t + i) % 3];
                        registry.upsert(&subject, 1.0, 1.0, tier).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 25);
    }
}
