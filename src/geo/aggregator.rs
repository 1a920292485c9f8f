use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::registry::{GeoPoint, LocationRegistry};
use crate::health::Tier;

/// Number of points per tier
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TierCounts {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

impl TierCounts {
    pub fn add(&mut self, tier: Tier) {
        match tier {
            Tier::Low => self.low += 1,
            Tier::Medium => self.medium += 1,
            Tier::High => self.high += 1,
        }
    }

    pub fn get(&self, tier: Tier) -> usize {
        match tier {
            Tier::Low => self.low,
            Tier::Medium => self.medium,
            Tier::High => self.high,
        }
    }

    pub fn total(&self) -> usize {
        self.low + self.medium + self.high
    }
}

/// A geographic bounding box in WGS84 coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingBox {
    pub const fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// A box with `west > east` crosses the antimeridian
    pub fn crosses_antimeridian(&self) -> bool {
        self.west > self.east
    }

    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        if !(self.south..=self.north).contains(&latitude) {
            return false;
        }
        if self.crosses_antimeridian() {
            longitude >= self.west || longitude <= self.east
        } else {
            (self.west..=self.east).contains(&longitude)
        }
    }
}

/// Upper bound on points served to the map front end
pub const DEFAULT_POINT_LIMIT: usize = 1000;

/// Point filter applied to a built snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapFilter {
    pub tier: Option<Tier>,
    pub bbox: Option<BoundingBox>,
    /// Inclusive lower bound on `GeoPoint::updated_at`
    pub updated_since: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `GeoPoint::updated_at`
    pub updated_until: Option<DateTime<Utc>>,
    /// Maximum number of points returned
    pub limit: Option<usize>,
}

impl MapFilter {
    pub fn tier(tier: Tier) -> Self {
        Self {
            tier: Some(tier),
            ..Self::default()
        }
    }

    pub fn matches(&self, point: &GeoPoint) -> bool {
        self.tier.map_or(true, |tier| point.tier == tier)
            && self
                .bbox
                .map_or(true, |bbox| bbox.contains(point.latitude, point.longitude))
            && self.updated_since.map_or(true, |since| point.updated_at >= since)
            && self.updated_until.map_or(true, |until| point.updated_at <= until)
    }

    fn apply<'a>(&'a self, points: &'a [GeoPoint]) -> impl Iterator<Item = &'a GeoPoint> + 'a {
        points
            .iter()
            .filter(move |point| self.matches(point))
            .take(self.limit.unwrap_or(usize::MAX))
    }
}

/// Immutable output of one refresh cycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MapSnapshot {
    pub points: Vec<GeoPoint>,
    pub counts: TierCounts,
    pub generated_at: DateTime<Utc>,
}

impl MapSnapshot {
    pub fn empty() -> Self {
        Self::build(Vec::new())
    }

    pub fn build(points: Vec<GeoPoint>) -> Self {
        let mut counts = TierCounts::default();
        for point in &points {
            counts.add(point.tier);
        }
        Self {
            points,
            counts,
            generated_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// JSON-facing view; counts always describe the whole snapshot
    pub fn view(&self, filter: &MapFilter) -> MapView {
        MapView {
            points: filter.apply(&self.points).map(MapPoint::from).collect(),
            counts: self.counts,
            generated_at: self.generated_at,
        }
    }
}

/// Point as served to the map front end
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MapPoint {
    pub subject_id: String,
    pub lat: f64,
    pub lon: f64,
    pub tier: Tier,
    pub weight: u32,
}

impl From<&GeoPoint> for MapPoint {
    fn from(point: &GeoPoint) -> Self {
        Self {
            subject_id: point.subject_id.clone(),
            lat: point.latitude,
            lon: point.longitude,
            tier: point.tier,
            weight: point.weight(),
        }
    }
}

/// `{ points, counts, generatedAt }`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MapView {
    pub points: Vec<MapPoint>,
    pub counts: TierCounts,
    pub generated_at: DateTime<Utc>,
}

/// Builds and publishes map snapshots.
///
/// `current()` hands out the published `Arc`, so a reader keeps a consistent
/// snapshot no matter how many refreshes happen while it iterates.
pub struct MapAggregator {
    registry: Arc<LocationRegistry>,
    current: RwLock<Arc<MapSnapshot>>,
    /// 串行化 refresh，避免较慢的构建覆盖较新的快照
    refresh_lock: Mutex<()>,
}

impl MapAggregator {
    pub fn new(registry: Arc<LocationRegistry>) -> Self {
        Self {
            registry,
            current: RwLock::new(Arc::new(MapSnapshot::empty())),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Rebuild from the registry and swap the result in
    pub fn refresh(&self) -> Arc<MapSnapshot> {
        let _guard = self.refresh_lock.lock();

        let snapshot = Arc::new(MapSnapshot::build(self.registry.all()));
        *self.current.write() = snapshot.clone();

        tracing::debug!(
            "地图快照已刷新: total={}, low={}, medium={}, high={}",
            snapshot.counts.total(),
            snapshot.counts.low,
            snapshot.counts.medium,
            snapshot.counts.high
        );
        snapshot
    }

    /// Last built snapshot; never blocks on a refresh in progress
    pub fn current(&self) -> Arc<MapSnapshot> {
        self.current.read().clone()
    }

    pub fn filtered(&self, tier: Option<Tier>) -> Vec<GeoPoint> {
        self.query(&MapFilter {
            tier,
            ..MapFilter::default()
        })
    }

    pub fn query(&self, filter: &MapFilter) -> Vec<GeoPoint> {
        filter.apply(&self.current().points).cloned().collect()
    }

    pub fn registry(&self) -> &Arc<LocationRegistry> {
        &self.registry
    }
}
