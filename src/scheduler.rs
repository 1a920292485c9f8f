//! 刷新调度
//!
//! 引擎本身不调度，这里是外部的刷新触发器，分为两部分：
//! - RefreshHandle: 可克隆的关闭端
//! - RefreshScheduler: 独占的运行端，定时调用 `MapAggregator::refresh`
//!
//! 按需刷新直接调用 `RiskMapEngine::refresh`，或开启 refresh_on_write

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::geo::MapAggregator;

/// 刷新句柄 - 可克隆
#[derive(Clone)]
pub struct RefreshHandle {
    shutdown_tx: mpsc::Sender<()>,
}

/// 刷新调度器 - 独占接收端
pub struct RefreshScheduler {
    aggregator: Arc<MapAggregator>,
    interval: Duration,
    shutdown_rx: mpsc::Receiver<()>,
}

/// 创建刷新调度系统
pub fn create_refresh_scheduler(
    aggregator: Arc<MapAggregator>,
    interval: Duration,
) -> (RefreshHandle, RefreshScheduler) {
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

    let handle = RefreshHandle { shutdown_tx };

    let scheduler = RefreshScheduler {
        aggregator,
        interval,
        shutdown_rx,
    };

    (handle, scheduler)
}

impl RefreshHandle {
    /// 发送关闭信号
    pub async fn shutdown(&self) -> Result<()> {
        let _ = self.shutdown_tx.send(()).await;
        Ok(())
    }
}

impl RefreshScheduler {
    /// 运行刷新循环（消耗 self），返回执行的刷新次数
    pub async fn run(mut self) -> u64 {
        tracing::info!("刷新调度器开始运行，间隔 {:?}", self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut refreshes = 0u64;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let snapshot = self.aggregator.refresh();
                    refreshes += 1;
                    tracing::debug!("定时刷新完成，当前 {} 个点", snapshot.len());
                }
                _ = self.shutdown_rx.recv() => {
                    tracing::info!("收到关闭信号，停止刷新调度");
                    break;
                }
            }
        }

        tracing::info!("刷新调度器已停止，共刷新 {} 次", refreshes);
        refreshes
    }
}
