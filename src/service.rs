//! 服务模块
//!
//! 组合快照日志、引擎和刷新调度，负责所有 I/O

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::Config;
use crate::engine::RiskMapEngine;
use crate::geo::validate_coordinates;
use crate::health::{HealthSnapshot, RiskClassification, RiskReport};
use crate::scheduler::create_refresh_scheduler;
use crate::storage::SnapshotLog;

/// 一次采集提交：快照加上主体当前坐标
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Submission {
    pub snapshot: HealthSnapshot,
    pub latitude: f64,
    pub longitude: f64,
}

pub struct RiskMapService {
    config: Config,
    engine: Arc<RiskMapEngine>,
    log: Arc<SnapshotLog>,
}

impl RiskMapService {
    /// 打开快照日志并从中重建注册表
    pub async fn new(config: Config) -> Result<Self> {
        tracing::info!("正在初始化风险地图服务...");

        let log = Arc::new(
            SnapshotLog::new(&config.database.url, config.database.max_connections).await?,
        );
        let engine = Arc::new(RiskMapEngine::new(config.engine_options()));

        let latest = log.latest_per_subject().await?;
        let applied = engine.rebuild(
            latest
                .into_iter()
                .map(|entry| (entry.snapshot, entry.latitude, entry.longitude)),
        )?;

        tracing::info!("风险地图服务初始化完成，{} 个主体", applied);
        Ok(Self {
            config,
            engine,
            log,
        })
    }

    /// 校验、写入日志、评分并更新地图点
    ///
    /// 校验在写日志之前完成，被拒绝的提交不会留下任何记录
    pub async fn submit(&self, submission: &Submission) -> Result<RiskClassification> {
        submission.snapshot.validate()?;
        validate_coordinates(submission.latitude, submission.longitude)?;

        self.log
            .append(
                &submission.snapshot,
                submission.latitude,
                submission.longitude,
            )
            .await?;

        let classification = self.engine.ingest(
            &submission.snapshot,
            submission.latitude,
            submission.longitude,
        )?;
        Ok(classification)
    }

    /// 主体报告，附带最新快照中的生活方式建议
    pub async fn report(&self, subject_id: &str) -> Result<RiskReport> {
        match self.log.latest(subject_id).await? {
            Some(entry) => Ok(self.engine.report_for_snapshot(&entry.snapshot)?),
            None => Ok(self.engine.report(subject_id)?),
        }
    }

    pub fn engine(&self) -> &Arc<RiskMapEngine> {
        &self.engine
    }

    pub fn log(&self) -> &Arc<SnapshotLog> {
        &self.log
    }

    /// 运行定时刷新直到收到关闭信号
    pub async fn run(self) -> Result<()> {
        tracing::info!("启动刷新调度...");

        let (handle, scheduler) = create_refresh_scheduler(
            self.engine.aggregator().clone(),
            self.config.refresh.interval(),
        );
        let scheduler_task = tokio::spawn(scheduler.run());

        // 等待关闭信号
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("收到 Ctrl+C 信号，正在关闭...");
            }
            _ = Self::wait_for_term_signal() => {
                tracing::info!("收到 TERM 信号，正在关闭...");
            }
        }

        handle.shutdown().await?;

        match tokio::time::timeout(std::time::Duration::from_secs(5), scheduler_task).await {
            Ok(Ok(refreshes)) => tracing::info!("刷新调度已正常关闭（{} 次刷新）", refreshes),
            Ok(Err(e)) => return Err(anyhow!("刷新调度任务失败: {}", e)),
            Err(_) => tracing::warn!("刷新调度关闭超时，强制终止"),
        }

        tracing::info!("风险地图服务已关闭");
        Ok(())
    }

    /// 等待 TERM 信号
    async fn wait_for_term_signal() {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    term.recv().await;
                }
                Err(e) => {
                    tracing::warn!("无法注册 TERM 信号: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        }

        #[cfg(not(unix))]
        {
            // Windows 不支持 SIGTERM，使用 Ctrl+C 替代
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}
