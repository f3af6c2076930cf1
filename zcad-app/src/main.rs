use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, bail};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};
use zcad_config::{AppConfig, ConfigError, SnapConfig};
use zcad_engine::command::{CommandBus, CommandContext};
use zcad_engine::scene::Scene;
use zcad_engine::snap::{SnapKind, SnapMask, SnapSettings};

mod report;

/// 未提供脚本与命令时执行的演示。
const DEMO_SCRIPT: &str = r#"
# 三个给定圆及其外包相切圆
add_layer GEOM color=#ff0000
set_layer GEOM
circle 0,0 1
circle 4,0 1
circle 2,4 2
tan_circle @0 @1 @2 1 1 1
line 0,-3 4,-3
text 0,-5 0.5 "ZCAD demo" layer=0
select area=-1,-4,5,-2
copy 0,-1
undo
redo
snap 0.2,0.1
"#;

#[derive(Debug, Parser)]
#[command(name = "zcad", version, about = "ZCAD 几何内核命令行")]
struct Cli {
    /// 配置文件路径，缺省时自动发现。
    #[arg(long)]
    config: Option<PathBuf>,
    /// 覆盖配置中的日志等级或过滤表达式。
    #[arg(long)]
    log_level: Option<String>,
    /// 逐行执行的命令脚本。
    #[arg(long)]
    script: Option<PathBuf>,
    /// 追加执行的单条命令，可重复。
    #[arg(short = 'c', long = "command")]
    commands: Vec<String>,
    /// 结束后输出 JSON 文档快照。
    #[arg(long)]
    snapshot: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("错误: {err}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(cli.log_level.as_deref().unwrap_or(&config.logging.level));
    info!("启动 ZCAD 几何内核");

    match run(&cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "执行失败");
            eprintln!("错误: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// 显式指定的配置必须可用；自动发现失败时退回内建默认值。
fn load_configuration(override_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    match override_path {
        Some(path) => AppConfig::from_file(path),
        None => Ok(AppConfig::discover().unwrap_or_else(|err| {
            match &err {
                ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
                    eprintln!("加载默认配置 {} 失败，使用内建默认值: {err}", path.display());
                }
                ConfigError::Context { .. } | ConfigError::Invalid { .. } => {
                    eprintln!("加载默认配置失败，使用内建默认值: {err}");
                }
            }
            AppConfig::default()
        })),
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}

fn snap_settings(config: &SnapConfig) -> anyhow::Result<SnapSettings> {
    let mask = match &config.kinds {
        Some(names) => {
            let mut mask = SnapMask::NONE;
            for name in names {
                let Some(kind) = SnapKind::from_name(name) else {
                    bail!("未知的捕捉类型 `{name}`");
                };
                mask.set(kind, true);
            }
            mask
        }
        None => SnapMask::default(),
    };
    Ok(SnapSettings {
        enabled: config.enabled,
        threshold: config.threshold,
        grid_spacing: config.grid_spacing,
        mask,
    })
}

fn collect_script(cli: &Cli) -> anyhow::Result<Vec<String>> {
    let mut lines = Vec::new();
    if let Some(path) = &cli.script {
        let content = fs::read_to_string(path)
            .with_context(|| format!("读取脚本 {} 失败", path.display()))?;
        lines.extend(content.lines().map(str::to_string));
    }
    lines.extend(cli.commands.iter().cloned());
    if lines.is_empty() {
        info!("未提供命令，执行内建演示");
        lines.extend(DEMO_SCRIPT.lines().map(str::to_string));
    }
    Ok(lines)
}

fn run(cli: &Cli, config: &AppConfig) -> anyhow::Result<()> {
    let mut scene = Scene::new();
    scene.configure(
        config.geometry.tolerance,
        snap_settings(&config.snap)?,
        config.history.limit(),
    );

    let bus = CommandBus::new();
    let mut context = CommandContext { scene: &mut scene };
    for (number, line) in collect_script(cli)?.iter().enumerate() {
        let response = bus
            .run_line(line, &mut context)
            .with_context(|| format!("第 {} 行 `{}` 执行失败", number + 1, line.trim()))?;
        if let Some(response) = response {
            println!("> {}", line.trim());
            println!("  {}", response.message);
        }
    }

    print!("{}", report::summary(&scene));
    if cli.snapshot {
        let snapshot = serde_json::to_string_pretty(&scene.document().snapshot())
            .context("序列化文档快照失败")?;
        println!("{snapshot}");
    } else if scene.document().is_empty() {
        warn!("文档为空");
    }
    Ok(())
}
