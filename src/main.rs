//! Media Rescan CLI
//!
//! Incremental rescan of a media directory against a SQLite media index.

use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;

use media_rescan::config::ScanConfigBuilder;
use media_rescan::{
    LogObserver, LocalIndexer, MediaIndex, ProgressReporter, ScanConfig, ScanCoordinator,
    ScanDatabase, ScanObserver, ScanSummary,
};

const DEFAULT_DB_PATH: &str = "media_rescan.db";

const ABOUT: &str = r#"
Media Rescan - 媒体索引增量重扫工具

使用示例:
  media_rescan scan -r /sdcard                      重扫目录并更新索引
  media_rescan scan -r /sdcard -d index.db          指定数据库文件
  media_rescan scan -r /sdcard --alias-root /mnt    跳过别名根目录
  media_rescan scan -r /sdcard --json               JSON格式输出进度和结果
  media_rescan stats -d index.db                    查看索引统计
"#;

/// Incremental media index rescan
#[derive(Parser)]
#[command(name = "media_rescan")]
#[command(author, version, about = ABOUT, long_about = None)]
#[command(help_template = "\
{before-help}{name} {version}
{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// 显示帮助信息
    #[arg(short = 'h', long = "help", action = clap::ArgAction::Help, global = true)]
    help: Option<bool>,
}

#[derive(Subcommand)]
enum Commands {
    /// 重扫目录并更新媒体索引
    #[command(about = "重扫目录并更新媒体索引")]
    Scan {
        /// 扫描的根目录
        #[arg(short = 'r', long, help = "扫描的根目录（可在配置文件中指定）")]
        root: Option<PathBuf>,

        /// 数据库文件路径
        #[arg(short = 'd', long, help = "SQLite数据库文件路径")]
        db: Option<PathBuf>,

        /// 配置文件路径
        #[arg(short = 'c', long, help = "JSON配置文件路径")]
        config: Option<PathBuf>,

        /// 排除标记文件名
        #[arg(long, help = "包含此文件的目录不会被扫描（默认 .nomedia）")]
        marker: Option<String>,

        /// 别名根目录
        #[arg(long = "alias-root", help = "永不进入的别名根目录，可多次指定")]
        alias_roots: Vec<PathBuf>,

        /// 并行线程数（0 = 自动检测）
        #[arg(short = 't', long, help = "索引线程数，0表示自动检测")]
        threads: Option<usize>,

        /// 跳过文件哈希计算
        #[arg(long, help = "不计算文件哈希值（加快扫描速度）")]
        no_hash: bool,

        /// 输出工作列表
        #[arg(long, help = "在诊断日志中列出所有待索引路径")]
        list_work: bool,

        /// 以 JSON 格式输出结果
        #[arg(long, help = "以JSON行格式输出进度和结果")]
        json: bool,
    },

    /// 查看索引统计
    #[command(about = "查看索引统计")]
    Stats {
        /// 数据库文件路径
        #[arg(short = 'd', long, help = "SQLite数据库文件路径")]
        db: Option<PathBuf>,
    },
}

fn main() {
    // Initialize logger
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Scan {
            root,
            db,
            config,
            marker,
            alias_roots,
            threads,
            no_hash,
            list_work,
            json,
        }) => {
            let base = match config {
                Some(path) => match ScanConfig::load(&path) {
                    Ok(config) => config,
                    Err(e) => {
                        error!("Failed to load config: {}", e);
                        std::process::exit(1);
                    }
                },
                None => ScanConfig::default(),
            };

            let mut builder = ScanConfigBuilder::from_config(base);
            if let Some(root) = root {
                builder = builder.root(root);
            }
            if let Some(db) = db {
                builder = builder.db_path(db);
            }
            if let Some(marker) = marker {
                builder = builder.exclusion_marker(marker);
            }
            for alias in alias_roots {
                builder = builder.add_alias_root(alias);
            }
            if let Some(threads) = threads {
                builder = builder.num_threads(threads);
            }
            if no_hash {
                builder = builder.compute_hash(false);
            }
            if list_work {
                builder = builder.log_work_list(true);
            }
            let config = builder.build();

            let summary = run_scan(config, json);
            if json {
                match serde_json::to_string_pretty(&summary) {
                    Ok(text) => println!("{}", text),
                    Err(e) => error!("Failed to serialize summary: {}", e),
                }
            } else {
                print_summary(&summary);
            }

            if !summary.is_success() {
                std::process::exit(1);
            }
        }
        Some(Commands::Stats { db }) => {
            let db_path = db.unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));
            let db = match ScanDatabase::open_read_only(&db_path) {
                Ok(db) => db,
                Err(e) => {
                    error!("Failed to open {}: {}", db_path.display(), e);
                    std::process::exit(1);
                }
            };
            let total = db.entry_count().unwrap_or(0);
            let mut counts: Vec<(String, u64)> =
                db.media_type_counts().unwrap_or_default().into_iter().collect();
            counts.sort();

            println!("Index: {}", db_path.display());
            println!("  Total entries: {}", total);
            for (media_type, count) in counts {
                println!("  {}: {}", media_type, count);
            }
        }
        None => {
            // 没有子命令时显示帮助
            println!("{}", ABOUT);
            println!("使用 'media_rescan scan -h' 查看重扫命令的详细帮助");
            println!("使用 'media_rescan --help' 查看完整帮助信息");
        }
    }
}

fn run_scan(config: ScanConfig, json: bool) -> ScanSummary {
    let Some(root) = config.root.clone() else {
        error!("No scan root given (use --root or a config file)");
        std::process::exit(1);
    };
    let db_path = config
        .db_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));

    info!("Starting media rescan...");
    info!("Root: {}", root.display());
    info!("Index: {}", db_path.display());
    info!(
        "Threads: {}",
        if config.num_threads == 0 {
            "auto".to_string()
        } else {
            config.num_threads.to_string()
        }
    );

    let indexer = match LocalIndexer::new(&config, &db_path) {
        Ok(indexer) => indexer,
        Err(e) => {
            error!("Failed to start indexer: {}", e);
            std::process::exit(1);
        }
    };

    let observer: Box<dyn ScanObserver> = if json {
        let mut reporter = ProgressReporter::new(true, config.progress_interval_ms);
        reporter.report_start(&root);
        Box::new(reporter)
    } else {
        Box::new(LogObserver::new())
    };

    let mut coordinator = ScanCoordinator::new(
        config,
        Arc::new(MediaIndex::new(&db_path)),
        Box::new(indexer),
    )
    .with_observer(observer);

    if let Err(e) = coordinator.start_scan(&root) {
        error!("Scan not started: {}", e);
        return coordinator.summary();
    }
    coordinator.run_until_terminal()
}

fn print_summary(summary: &ScanSummary) {
    println!("Rescan finished:");
    if let Some(root) = &summary.root {
        println!("  Root: {}", root.display());
    }
    println!("  Phase: {}", summary.phase.label());
    println!("  Work items: {}", summary.work_items);
    println!("  Confirmed: {}", summary.confirmed);
    println!("  Diagnostics: {}", summary.diagnostics);
    println!("  Duration: {}ms", summary.duration_ms);
}
