pub mod aggregator;
pub mod registry;

pub use aggregator::{
    BoundingBox, MapAggregator, MapFilter, MapPoint, MapSnapshot, MapView, TierCounts,
    DEFAULT_POINT_LIMIT,
};
pub use registry::{validate_coordinates, GeoPoint, LocationRegistry};
