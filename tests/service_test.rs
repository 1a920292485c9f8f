//! 服务集成测试
//!
//! 覆盖快照日志、重建、地图和报告边界

use anyhow::Result;
use risk_map_engine::config::{Config, DatabaseConfig};
use risk_map_engine::geo::MapFilter;
use risk_map_engine::health::{Comorbidities, HealthSnapshot, Lifestyle, Tier};
use risk_map_engine::service::{RiskMapService, Submission};
use risk_map_engine::EngineError;
use std::sync::Arc;
use tempfile::TempDir;
use tracing_test::traced_test;

/// 创建测试配置
fn create_test_config(temp_dir: &TempDir) -> Config {
    let db_path = temp_dir.path().join("risk-map.db");
    Config {
        database: DatabaseConfig {
            url: format!("sqlite:{}", db_path.display()),
            max_connections: 2,
        },
        ..Config::default()
    }
}

fn submission(snapshot: HealthSnapshot, latitude: f64, longitude: f64) -> Submission {
    Submission {
        snapshot,
        latitude,
        longitude,
    }
}

#[tokio::test]
async fn test_submit_updates_map_and_log() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let service = RiskMapService::new(create_test_config(&temp_dir)).await?;

    let snapshot = HealthSnapshot::new("ana", 62).with_blood_pressure(165, 95);
    let classification = service.submit(&submission(snapshot, -23.55, -46.63)).await?;
    assert_eq!(classification.score, 6);
    assert_eq!(classification.tier, Tier::Medium);

    // refresh_on_write 默认开启
    let view = service.engine().map(&MapFilter::default());
    assert_eq!(view.counts.medium, 1);
    assert_eq!(view.points[0].weight, 2);
    assert_eq!(service.log().count().await?, 1);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submissions() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let service = Arc::new(RiskMapService::new(create_test_config(&temp_dir)).await?);

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let service = service.clone();
            tokio::spawn(async move {
                let snapshot = HealthSnapshot::new(format!("subject-{i}"), 40 + i);
                service
                    .submit(&submission(snapshot, -23.0 - i as f64 * 0.1, -46.0))
                    .await
            })
        })
        .collect();

    for task in tasks {
        task.await??;
    }

    assert_eq!(service.log().count().await?, 8);
    assert_eq!(service.engine().registry().len(), 8);
    assert_eq!(service.engine().refresh().counts.total(), 8);
    Ok(())
}

#[tokio::test]
async fn test_rejected_submission_leaves_no_trace() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let service = RiskMapService::new(create_test_config(&temp_dir)).await?;

    service
        .submit(&submission(HealthSnapshot::new("ana", 30), 1.0, 1.0))
        .await?;

    let err = service
        .submit(&submission(HealthSnapshot::new("bia", 30), 200.0, 1.0))
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::InvalidCoordinate { .. })
    ));

    let err = service
        .submit(&submission(HealthSnapshot::new("", 30), 1.0, 1.0))
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::InvalidSubject)
    ));

    assert_eq!(service.log().count().await?, 1);
    assert_eq!(service.engine().registry().len(), 1);
    assert_eq!(service.engine().refresh().counts.total(), 1);

    Ok(())
}

#[tokio::test]
async fn test_restart_rebuilds_from_latest_snapshots() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = create_test_config(&temp_dir);

    {
        let service = RiskMapService::new(config.clone()).await?;
        let sick = HealthSnapshot::new("carla", 80).with_comorbidities(Comorbidities {
            cardiac_disease: true,
            renal_disease: true,
            ..Default::default()
        });
        service.submit(&submission(sick, 1.0, 1.0)).await?;
        // 同一主体的新快照覆盖旧等级
        service
            .submit(&submission(HealthSnapshot::new("carla", 80), 1.5, 1.0))
            .await?;
        service
            .submit(&submission(HealthSnapshot::new("davi", 20), 2.0, 2.0))
            .await?;
    }

    let service = RiskMapService::new(config).await?;
    let snapshot = service.engine().aggregator().current();
    assert_eq!(snapshot.counts.total(), 2);

    let carla = service.engine().point("carla")?;
    assert_eq!(carla.tier, Tier::Medium);
    assert_eq!(carla.latitude, 1.5);

    let moves = service.log().location_history("carla").await?;
    assert_eq!(moves.len(), 1);
    assert_eq!(service.log().history("carla").await?.len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_report_includes_lifestyle_advice() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let service = RiskMapService::new(create_test_config(&temp_dir)).await?;

    let snapshot = HealthSnapshot::new("edu", 50).with_lifestyle(Lifestyle {
        smoker: true,
        heavy_alcohol_use: false,
    });
    service.submit(&submission(snapshot, 0.0, 0.0)).await?;

    let report = service.report("edu").await?;
    assert_eq!(report.tier, Tier::Low);
    assert_eq!(report.recommendations[0], "Routine medical appointment");
    assert_eq!(report.summary.first().map(String::as_str), Some("Age: 50 years"));
    assert_eq!(
        report.recommendations.last().map(String::as_str),
        Some("Smoking cessation counselling")
    );

    let missing = service.report("nobody").await.unwrap_err();
    assert!(matches!(
        missing.downcast_ref::<EngineError>(),
        Some(EngineError::NotFound(_))
    ));

    Ok(())
}

#[tokio::test]
async fn test_map_json_tier_filter() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let service = RiskMapService::new(create_test_config(&temp_dir)).await?;

    service
        .submit(&submission(HealthSnapshot::new("low", 20), 0.0, 0.0))
        .await?;
    service
        .submit(&submission(
            HealthSnapshot::new("high", 90).with_blood_pressure(170, 105).with_pain_level(9),
            0.0,
            0.0,
        ))
        .await?;

    let json: serde_json::Value =
        serde_json::from_str(&service.engine().map_json(&MapFilter::tier(Tier::High))?)?;
    let points = json["points"].as_array().expect("points array");
    assert_eq!(points.len(), 1);
    assert_eq!(points[0]["subjectId"], "high");
    assert_eq!(json["counts"]["low"], 1);
    assert_eq!(json["counts"]["high"], 1);

    Ok(())
}

#[tokio::test]
#[traced_test]
async fn test_ingest_is_logged() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let service = RiskMapService::new(create_test_config(&temp_dir)).await?;

    service
        .submit(&submission(HealthSnapshot::new("fabio", 30), 0.0, 0.0))
        .await?;

    assert!(logs_contain("fabio"));
    Ok(())
}
