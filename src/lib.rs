//! Risk Map Engine - 健康风险分级与地理聚合引擎
//!
//! 社区健康地图的核心：快照评分、主体地图点、地图快照与风险报告

pub mod config;
pub mod engine;
pub mod error;
pub mod geo;
pub mod health;
pub mod scheduler;
pub mod service;
pub mod storage;

pub use engine::{EngineOptions, RiskMapEngine};
pub use error::{EngineError, EngineResult};
