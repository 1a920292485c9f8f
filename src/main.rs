use anyhow::{anyhow, Result};
use clap::Parser;
use risk_map_engine::config::{Cli, Commands, Config};
use risk_map_engine::geo::MapFilter;
use risk_map_engine::health::{HealthSnapshot, RiskScorer};
use risk_map_engine::service::{RiskMapService, Submission};

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let cli = Cli::parse();

    // 加载配置
    let config = Config::load_with_cli(cli.clone())?;

    // 初始化日志系统
    let _log_guard = config.init_logging()?;

    tracing::info!("Risk Map Engine Starting...");

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let service = RiskMapService::new(config).await?;
            service.run().await?;
        }
        Commands::Ingest { file } => {
            let content = std::fs::read_to_string(&file)
                .map_err(|e| anyhow!("无法读取 {}: {}", file.display(), e))?;
            let submissions: Vec<Submission> = serde_json::from_str(&content)?;

            let service = RiskMapService::new(config).await?;
            let mut rejected = 0;
            for submission in &submissions {
                let subject = &submission.snapshot.subject_id;
                match service.submit(submission).await {
                    Ok(classification) => println!(
                        "{subject}\t{}\t{}",
                        classification.score, classification.tier
                    ),
                    Err(e) => {
                        rejected += 1;
                        tracing::warn!("提交被拒绝 {}: {}", subject, e);
                        println!("{subject}\trejected\t{e}");
                    }
                }
            }
            tracing::info!("已摄取 {} 条，拒绝 {} 条", submissions.len() - rejected, rejected);
        }
        Commands::Map {
            tier,
            since,
            until,
            limit,
        } => {
            let service = RiskMapService::new(config).await?;
            let filter = MapFilter {
                tier,
                bbox: None,
                updated_since: since,
                updated_until: until,
                limit: Some(limit),
            };
            println!("{}", service.engine().map_json(&filter)?);
        }
        Commands::Report { subject } => {
            let service = RiskMapService::new(config).await?;
            let report = service.report(&subject).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Score { file } => {
            let content = std::fs::read_to_string(&file)
                .map_err(|e| anyhow!("无法读取 {}: {}", file.display(), e))?;
            let snapshot: HealthSnapshot = serde_json::from_str(&content)?;
            snapshot.validate()?;
            let classification = RiskScorer::new(config.scoring.clone()).classify(&snapshot);
            println!("{}", serde_json::to_string_pretty(&classification)?);
        }
        Commands::ResetConfig => {
            let default_config = Config::default();
            if let Some(config_path) = Config::get_user_config_path() {
                default_config.save_to_file(&config_path)?;
                println!("配置已重置到: {}", config_path.display());
            } else {
                println!("无法确定配置文件路径");
            }
        }
    }

    Ok(())
}
