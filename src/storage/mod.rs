//! 存储模块
//!
//! 基于 SQLite 的健康快照审计日志。引擎本身不做 I/O，
//! 由调用方在摄取前写入日志，在启动时从日志重建注册表。

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::EngineResult;
use crate::health::HealthSnapshot;

/// 快照日志行
#[derive(Debug, sqlx::FromRow)]
struct SnapshotRow {
    latitude: f64,
    longitude: f64,
    payload: String,
}

impl SnapshotRow {
    fn into_logged(self) -> EngineResult<LoggedSnapshot> {
        Ok(LoggedSnapshot {
            snapshot: serde_json::from_str(&self.payload)?,
            latitude: self.latitude,
            longitude: self.longitude,
        })
    }
}

/// 带提交坐标的快照
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedSnapshot {
    pub snapshot: HealthSnapshot,
    pub latitude: f64,
    pub longitude: f64,
}

/// 位置变更记录
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct LocationChange {
    pub subject_id: String,
    pub previous_latitude: f64,
    pub previous_longitude: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub changed_at: DateTime<Utc>,
}

/// 数据库文件所在目录；内存数据库和当前目录下的文件返回 None
fn database_directory(options: &SqliteConnectOptions) -> Option<PathBuf> {
    options
        .get_filename()
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

/// 快照日志
pub struct SnapshotLog {
    pool: SqlitePool,
}

impl SnapshotLog {
    /// 打开（必要时创建）快照日志并运行迁移
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        tracing::info!("正在初始化快照日志...");

        let in_memory = database_url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(SqliteSynchronous::Normal)
            .pragma("temp_store", "MEMORY");
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // 确保数据库目录存在
        if let Some(parent) = database_directory(&options) {
            if !parent.exists() {
                tracing::debug!("创建数据库目录: {:?}", parent);
                std::fs::create_dir_all(&parent)?;
            }
        }

        // 内存数据库每个连接都是独立的库，只能用单连接
        let max_connections = if in_memory {
            1
        } else {
            max_connections.max(1)
        };

        tracing::info!("正在连接数据库: {}", database_url);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .min_connections(1)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect_with(options)
            .await
            .map_err(|e| anyhow::anyhow!("无法连接到数据库: {}", e))?;

        tracing::info!("正在运行数据库迁移...");

        let migrate_result = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            sqlx::migrate!("./migrations").run(&pool),
        )
        .await;

        match migrate_result {
            Ok(Ok(_)) => tracing::info!("数据库迁移完成"),
            Ok(Err(e)) => return Err(anyhow::anyhow!("数据库迁移失败: {}", e)),
            Err(_) => return Err(anyhow::anyhow!("数据库迁移超时（10秒）")),
        }

        Ok(Self { pool })
    }

    /// 追加快照；坐标与上一次不同时记录位置变更
    pub async fn append(
        &self,
        snapshot: &HealthSnapshot,
        latitude: f64,
        longitude: f64,
    ) -> EngineResult<()> {
        let payload = serde_json::to_string(snapshot)?;
        // 先读后写：必须一开始就拿写锁，否则并发事务升级锁时直接 SQLITE_BUSY
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        let previous: Option<(f64, f64)> = sqlx::query_as(
            r#"
            SELECT latitude, longitude FROM health_snapshots
            WHERE subject_id = ?1
            ORDER BY seq DESC
            LIMIT 1
        "#,
        )
        .bind(&snapshot.subject_id)
        .fetch_optional(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO health_snapshots
                (snapshot_id, subject_id, latitude, longitude, payload, recorded_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        )
        .bind(snapshot.id.to_string())
        .bind(&snapshot.subject_id)
        .bind(latitude)
        .bind(longitude)
        .bind(payload)
        .bind(snapshot.recorded_at)
        .execute(&mut *tx)
        .await?;

        if let Some((previous_latitude, previous_longitude)) = previous {
            if previous_latitude != latitude || previous_longitude != longitude {
                tracing::debug!("主体 {} 位置变更", snapshot.subject_id);
                sqlx::query(
                    r#"
                    INSERT INTO location_history
                        (subject_id, previous_latitude, previous_longitude, latitude, longitude, changed_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                )
                .bind(&snapshot.subject_id)
                .bind(previous_latitude)
                .bind(previous_longitude)
                .bind(latitude)
                .bind(longitude)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// 每个主体最新的一条快照，按提交顺序
    pub async fn latest_per_subject(&self) -> EngineResult<Vec<LoggedSnapshot>> {
        let query = r#"
            SELECT s.latitude, s.longitude, s.payload
            FROM health_snapshots s
            WHERE s.seq = (
                SELECT MAX(seq) FROM health_snapshots WHERE subject_id = s.subject_id
            )
            ORDER BY s.seq
        "#;

        let rows = sqlx::query_as::<_, SnapshotRow>(query)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(SnapshotRow::into_logged).collect()
    }

    /// 主体的全部快照，从旧到新
    pub async fn history(&self, subject_id: &str) -> EngineResult<Vec<LoggedSnapshot>> {
        let query = r#"
            SELECT latitude, longitude, payload
            FROM health_snapshots
            WHERE subject_id = ?1
            ORDER BY seq
        "#;

        let rows = sqlx::query_as::<_, SnapshotRow>(query)
            .bind(subject_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(SnapshotRow::into_logged).collect()
    }

    /// 主体最新的一条快照
    pub async fn latest(&self, subject_id: &str) -> EngineResult<Option<LoggedSnapshot>> {
        let query = r#"
            SELECT latitude, longitude, payload
            FROM health_snapshots
            WHERE subject_id = ?1
            ORDER BY seq DESC
            LIMIT 1
        "#;

        let row = sqlx::query_as::<_, SnapshotRow>(query)
            .bind(subject_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(SnapshotRow::into_logged).transpose()
    }

    /// 主体的位置变更历史，从旧到新
    pub async fn location_history(&self, subject_id: &str) -> EngineResult<Vec<LocationChange>> {
        let query = r#"
            SELECT subject_id, previous_latitude, previous_longitude, latitude, longitude, changed_at
            FROM location_history
            WHERE subject_id = ?1
            ORDER BY id
        "#;

        let changes = sqlx::query_as::<_, LocationChange>(query)
            .bind(subject_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(changes)
    }

    /// 快照总数
    pub async fn count(&self) -> EngineResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM health_snapshots")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// 获取数据库连接池（用于高级操作）
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
