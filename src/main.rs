// ==========================================
// 仓库波次排程引擎 - 命令行入口
// ==========================================
// 用法:
//   wave-scheduler init    [db_path]
//   wave-scheduler build   <warehouse_id> [wave_start] [db_path]
//   wave-scheduler replan  <wave_id> [wave_start] [db_path]
//   wave-scheduler release <wave_id> [db_path]
//   wave-scheduler complete <wave_id> [db_path]
//   wave-scheduler show    <wave_id> [db_path]
//   wave-scheduler waves   <warehouse_id> [db_path]
//   wave-scheduler config  <warehouse_id> [db_path]
//
// db_path 缺省时读取 WAVE_SCHEDULER_DB_PATH，再回退到用户数据目录。
// wave_start 格式: 2026-10-16T08:00:00 或 "2026-10-16 08:00"，缺省为当前时间。
// ==========================================

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Local, NaiveDateTime};
use std::path::PathBuf;
use std::sync::Arc;
use wave_scheduler::config::{ConfigManager, WaveConfigReader};
use wave_scheduler::db::DEFAULT_BUSY_TIMEOUT_MS;
use wave_scheduler::engine::{AssignmentStore, WaveBuildOrchestrator, WaveBuildRequest};
use wave_scheduler::repository::SqliteAssignmentStore;
use wave_scheduler::{logging, APP_NAME, VERSION};

const USAGE: &str = "用法: wave-scheduler <init|build|replan|release|complete|show|waves|config> ...";

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    tracing::info!(version = VERSION, "{}", APP_NAME);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).ok_or_else(|| anyhow!(USAGE))?;

    match command {
        "init" => {
            let db_path = resolve_db_path(args.get(1));
            SqliteAssignmentStore::open(&db_path, DEFAULT_BUSY_TIMEOUT_MS)
                .with_context(|| format!("无法初始化数据库: {}", db_path))?;
            println!("{}", db_path);
        }
        "build" => {
            let warehouse_id: i64 = required(&args, 1, "warehouse_id")?
                .parse()
                .context("warehouse_id 必须为整数")?;
            let wave_start = parse_start(args.get(2))?;
            let orchestrator = open_orchestrator(&resolve_db_path(args.get(3)))?;
            apply_warehouse_timeout(&orchestrator, warehouse_id).await?;

            let report = orchestrator
                .build_waves(warehouse_id, WaveBuildRequest::starting_at(wave_start))
                .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        "replan" => {
            let wave_id = required(&args, 1, "wave_id")?;
            let wave_start = parse_start(args.get(2))?;
            let orchestrator = open_orchestrator(&resolve_db_path(args.get(3)))?;

            let report = orchestrator.replan_wave(wave_id, wave_start).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        "release" | "complete" => {
            let wave_id = required(&args, 1, "wave_id")?;
            let orchestrator = open_orchestrator(&resolve_db_path(args.get(2)))?;

            if command == "release" {
                orchestrator.release_wave(wave_id)?;
            } else {
                orchestrator.complete_wave(wave_id)?;
            }
            println!("{} {}", command, wave_id);
        }
        "show" => {
            let wave_id = required(&args, 1, "wave_id")?;
            let orchestrator = open_orchestrator(&resolve_db_path(args.get(2)))?;
            let store = orchestrator.store();

            let wave = store
                .fetch_wave(wave_id)?
                .ok_or_else(|| anyhow!("波次不存在: {}", wave_id))?;
            let assignments = store.fetch_wave_assignments(wave_id)?;
            let output = serde_json::json!({ "wave": wave, "assignments": assignments });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        "waves" => {
            let warehouse_id: i64 = required(&args, 1, "warehouse_id")?
                .parse()
                .context("warehouse_id 必须为整数")?;
            let store = SqliteAssignmentStore::open(&resolve_db_path(args.get(2)), DEFAULT_BUSY_TIMEOUT_MS)?;
            let waves = store.waves().find_by_warehouse(warehouse_id)?;
            println!("{}", serde_json::to_string_pretty(&waves)?);
        }
        "config" => {
            let warehouse_id: i64 = required(&args, 1, "warehouse_id")?
                .parse()
                .context("warehouse_id 必须为整数")?;
            let store = SqliteAssignmentStore::open(&resolve_db_path(args.get(2)), DEFAULT_BUSY_TIMEOUT_MS)?;
            let config = ConfigManager::from_connection(store.connection());
            println!("{}", config.get_config_snapshot(warehouse_id)?);
        }
        other => bail!("未知命令 '{}'\n{}", other, USAGE),
    }

    Ok(())
}

fn open_orchestrator(db_path: &str) -> Result<WaveBuildOrchestrator<SqliteAssignmentStore, ConfigManager>> {
    let store = SqliteAssignmentStore::open(db_path, DEFAULT_BUSY_TIMEOUT_MS)
        .with_context(|| format!("无法打开数据库: {}", db_path))?;
    let config = ConfigManager::from_connection(store.connection());
    Ok(WaveBuildOrchestrator::new(Arc::new(store), Arc::new(config)))
}

/// 按仓库生效配置设置存储忙等待超时
async fn apply_warehouse_timeout(
    orchestrator: &WaveBuildOrchestrator<SqliteAssignmentStore, ConfigManager>,
    warehouse_id: i64,
) -> Result<()> {
    let store = orchestrator.store();
    let config = ConfigManager::from_connection(store.connection())
        .load_engine_config(warehouse_id)
        .await?;
    store.apply_busy_timeout(config.store.busy_timeout_ms)?;
    Ok(())
}

fn required<'a>(args: &'a [String], idx: usize, name: &str) -> Result<&'a str> {
    args.get(idx)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("缺少参数 {}\n{}", name, USAGE))
}

fn parse_start(raw: Option<&String>) -> Result<NaiveDateTime> {
    let Some(raw) = raw.map(|s| s.trim()).filter(|s| !s.is_empty()) else {
        return Ok(Local::now().naive_local());
    };
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| anyhow!("无法解析开始时间: '{}'", raw))
}

/// 默认数据库路径
fn resolve_db_path(arg: Option<&String>) -> String {
    if let Some(path) = arg.map(|s| s.trim()).filter(|s| !s.is_empty()) {
        return path.to_string();
    }
    if let Ok(path) = std::env::var("WAVE_SCHEDULER_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./wave_scheduler.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("wave-scheduler");
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("wave_scheduler.db");
        }
    }
    path.to_string_lossy().to_string()
}
