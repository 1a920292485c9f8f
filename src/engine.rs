//! 引擎门面
//!
//! 把评分、注册表、聚合和报告串成三个边界：快照摄取、地图数据、报告

use std::sync::Arc;

use crate::error::EngineResult;
use crate::geo::{GeoPoint, LocationRegistry, MapAggregator, MapFilter, MapSnapshot, MapView};
use crate::health::{
    HealthSnapshot, ReportGenerator, RiskClassification, RiskReport, RiskScorer, ScoringWeights,
};

/// 引擎构造参数
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// 评分权重
    pub weights: ScoringWeights,
    /// 每次成功摄取后立即刷新地图
    pub refresh_on_write: bool,
}

/// 风险地图引擎
pub struct RiskMapEngine {
    scorer: RiskScorer,
    registry: Arc<LocationRegistry>,
    aggregator: Arc<MapAggregator>,
    reports: ReportGenerator,
    refresh_on_write: bool,
}

impl RiskMapEngine {
    pub fn new(options: EngineOptions) -> Self {
        let registry = Arc::new(LocationRegistry::new());
        let aggregator = Arc::new(MapAggregator::new(registry.clone()));
        Self {
            scorer: RiskScorer::new(options.weights),
            registry,
            aggregator,
            reports: ReportGenerator::new(),
            refresh_on_write: options.refresh_on_write,
        }
    }

    /// 快照摄取：评分后更新主体的地图点，返回分级结果供界面显示
    pub fn ingest(
        &self,
        snapshot: &HealthSnapshot,
        latitude: f64,
        longitude: f64,
    ) -> EngineResult<RiskClassification> {
        snapshot.validate()?;

        let classification = self.scorer.classify(snapshot);
        self.registry.upsert(
            &snapshot.subject_id,
            latitude,
            longitude,
            classification.tier,
        )?;

        tracing::info!(
            "主体 {} 评分 {} -> {}",
            snapshot.subject_id,
            classification.score,
            classification.tier
        );

        if self.refresh_on_write {
            self.aggregator.refresh();
        }

        Ok(classification)
    }

    /// 从日志重放每个主体最新的快照；重复执行结果相同
    ///
    /// 地图点的更新时间取快照的记录时间，而不是重放时间
    pub fn rebuild<I>(&self, entries: I) -> EngineResult<usize>
    where
        I: IntoIterator<Item = (HealthSnapshot, f64, f64)>,
    {
        let mut applied = 0;
        for (snapshot, latitude, longitude) in entries {
            snapshot.validate()?;
            let (_, tier) = self.scorer.score(&snapshot);
            self.registry.upsert_at(
                &snapshot.subject_id,
                latitude,
                longitude,
                tier,
                snapshot.recorded_at,
            )?;
            applied += 1;
        }
        self.aggregator.refresh();
        tracing::info!("已从日志重建 {} 个主体的风险点", applied);
        Ok(applied)
    }

    pub fn refresh(&self) -> Arc<MapSnapshot> {
        self.aggregator.refresh()
    }

    /// 地图数据：当前快照的视图，可按等级或范围过滤
    pub fn map(&self, filter: &MapFilter) -> MapView {
        self.aggregator.current().view(filter)
    }

    pub fn map_json(&self, filter: &MapFilter) -> EngineResult<String> {
        Ok(serde_json::to_string(&self.map(filter))?)
    }

    /// 报告：按注册表中主体当前的等级生成
    pub fn report(&self, subject_id: &str) -> EngineResult<RiskReport> {
        let point = self.registry.get(subject_id)?;
        Ok(self.reports.generate(subject_id, point.tier))
    }

    /// 报告，附加快照中的生活方式建议
    pub fn report_for_snapshot(&self, snapshot: &HealthSnapshot) -> EngineResult<RiskReport> {
        let point = self.registry.get(&snapshot.subject_id)?;
        Ok(self.reports.generate_for_snapshot(point.tier, snapshot))
    }

    pub fn point(&self, subject_id: &str) -> EngineResult<GeoPoint> {
        self.registry.get(subject_id)
    }

    pub fn scorer(&self) -> &RiskScorer {
        &self.scorer
    }

    pub fn registry(&self) -> &Arc<LocationRegistry> {
        &self.registry
    }

    pub fn aggregator(&self) -> &Arc<MapAggregator> {
        &self.aggregator
    }
}

impl Default for RiskMapEngine {
    fn default() -> Self {
        Self::new(EngineOptions::default())
    }
}
