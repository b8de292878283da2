//! 配置检查与批量评估工具
//!
//! - `lint`：校验一批配置，有错误时以非零状态退出
//! - `screen`：用过滤器筛查一批记录，输出命中的 记录ID/过滤器ID
//! - `report`：用模板把一批记录转换为制表符分隔的报表行

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use rule_engine::{ConfigurationBundle, ConfigurationStore, JsonRecord, RuleExecutor};
use screening_shared::config::AppConfig;
use screening_shared::observability::{self, ObservabilityGuard};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};

const SERVICE_NAME: &str = "rule-lint";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// 结束前输出 Prometheus 指标快照
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 校验配置文件（包含 filters / templates 的 JSON 对象）
    Lint {
        file: PathBuf,
    },
    /// 用配置文件中的过滤器筛查记录（JSON 数组）
    Screen {
        filters: PathBuf,
        records: PathBuf,
        /// 输出逐条件评估追踪
        #[arg(long)]
        explain: bool,
    },
    /// 用配置文件中的模板构建报表行
    Report {
        templates: PathBuf,
        records: PathBuf,
        /// 模板 ID，缺省时使用 ID 最小的模板
        #[arg(long)]
        template: Option<String>,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(SERVICE_NAME).unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });
    if cli.metrics {
        config.observability.metrics_enabled = true;
    }

    let guard = observability::init(&config.service_name, &config.observability)?;

    info!(environment = %config.environment, "Starting {}", SERVICE_NAME);

    let code = match cli.command {
        Command::Lint { file } => lint(&file)?,
        Command::Screen {
            filters,
            records,
            explain,
        } => screen(
            &filters,
            &records,
            explain || config.engine.trace_evaluations,
        )?,
        Command::Report {
            templates,
            records,
            template,
        } => report(&templates, &records, template.as_deref())?,
    };

    print_metrics(&guard);
    Ok(code)
}

fn lint(file: &Path) -> Result<ExitCode> {
    let bundle = read_bundle(file)?;
    let total = bundle.filters.len() + bundle.templates.len();

    let mut invalid = 0;
    for filter in &bundle.filters {
        if let Err(e) = filter.check() {
            invalid += 1;
            println!("filter {}: {}", filter.id, e);
        }
    }
    for template in &bundle.templates {
        if let Err(e) = template.check() {
            invalid += 1;
            println!("template {}: {}", template.id, e);
        }
    }

    println!("{} configurations checked, {} invalid", total, invalid);

    Ok(if invalid == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn screen(filters: &Path, records: &Path, explain: bool) -> Result<ExitCode> {
    let store = load_store(filters)?;
    let records = read_records(records)?;

    let executor = if explain {
        RuleExecutor::new().with_trace()
    } else {
        RuleExecutor::new()
    };

    let mut hits = 0;
    for record in &records {
        for result in store.screen(record, &executor) {
            if result.matched {
                hits += 1;
                println!("{}\t{}", result.record_id, result.config_id);
            }
            if explain {
                for line in &result.evaluation_trace {
                    println!("  [{} / {}] {}", result.record_id, result.config_id, line);
                }
            }
        }
    }

    info!(
        records = records.len(),
        filters = store.filter_count(),
        hits = hits,
        "Screening complete"
    );
    Ok(ExitCode::SUCCESS)
}

fn report(templates: &Path, records: &Path, template_id: Option<&str>) -> Result<ExitCode> {
    let store = load_store(templates)?;
    let records = read_records(records)?;

    let template_id = match template_id {
        Some(id) => id.to_string(),
        None => store
            .template_ids()
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("no valid template in {}", templates.display()))?,
    };
    let template = store
        .template(&template_id)
        .ok_or_else(|| anyhow!("template '{}' not found", template_id))?;

    let header = template.header();
    if !header.is_empty() {
        println!("{}", header.join("\t"));
    }

    for record in &records {
        let row = template.build_row(record);
        let cells: Vec<&str> = row.iter().map(|(_, value)| value.as_str()).collect();
        println!("{}", cells.join("\t"));
    }

    Ok(ExitCode::SUCCESS)
}

fn read_bundle(path: &Path) -> Result<ConfigurationBundle> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

/// 加载配置，无效配置跳过并记录警告
fn load_store(path: &Path) -> Result<ConfigurationStore> {
    let store = ConfigurationStore::new();
    for (id, error) in store.load_bundle(read_bundle(path)?) {
        warn!(config_id = %id, reason = %error, "Skipping invalid configuration");
    }
    Ok(store)
}

fn read_records(path: &Path) -> Result<Vec<JsonRecord>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let values: Vec<Value> = serde_json::from_str(&text)
        .with_context(|| format!("{} must be a JSON array of records", path.display()))?;
    Ok(values.into_iter().map(JsonRecord::new).collect())
}

fn print_metrics(guard: &ObservabilityGuard) {
    if let Some(snapshot) = guard.render_metrics() {
        println!("{}", snapshot);
    }
}
