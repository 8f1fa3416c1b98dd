use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hdrscan_core::{
    extract_sections, inspect_prefix, probe_lines, render, render_sections, scan_headers, OutputTarget, ReportFormat,
    RuleSet, ScanOptions, TextEncoding, DEFAULT_ENCODINGS, DEFAULT_PREFIX_LEN,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// 默认规则文件（存在时使用，否则退回内置的对焦参数规则）
const DEFAULT_RULES_PATH: &str = "./rules/default.toml";

/// 命令行入口（基于 clap）
#[derive(Parser, Debug)]
#[command(name = "hdrscan", version, about = "Scan C headers for API parameter names and struct tags")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 扫描目录中的头文件，输出命中行
    Scan {
        /// 输入目录（只扫描第一层）或单个文件
        #[arg(long)]
        input: PathBuf,

        /// 规则文件路径（TOML），默认 ./rules/default.toml
        #[arg(long)]
        rules: Option<PathBuf>,

        /// 额外排除的文件名（可重复）
        #[arg(long, value_name = "NAME")]
        exclude: Vec<String>,

        /// 候选编码，按顺序尝试（可重复；覆盖规则文件）
        #[arg(long = "encoding", value_name = "LABEL")]
        encodings: Vec<TextEncoding>,

        /// 输出文件（覆盖写入）；缺省输出到控制台
        #[arg(long)]
        output: Option<PathBuf>,

        /// 输出格式：text 或 json
        #[arg(long, default_value = "text")]
        format: ReportFormat,

        /// 最大扫描文件大小（字节）
        #[arg(long)]
        max_file_size: Option<u64>,
    },

    /// 从单个头文件按节提取命中行
    Extract {
        /// 输入头文件
        #[arg(long)]
        input: PathBuf,

        /// 含 [[sections]] 的规则文件
        #[arg(long, default_value = "./rules/camera_apis.toml")]
        rules: PathBuf,

        /// 输出文件（覆盖写入）；缺省输出到控制台
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// 按候选编码依次尝试读取文件，打印包含关键字的行
    Probe {
        #[arg(long)]
        input: PathBuf,

        /// 候选编码（可重复），默认 utf-16, utf-8, windows-1252
        #[arg(long = "encoding", value_name = "LABEL")]
        encodings: Vec<TextEncoding>,

        /// 只打印包含该子串的行
        #[arg(long)]
        grep: Option<String>,
    },

    /// 打印文件前缀字节及两种解码结果（诊断用）
    Inspect {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// 读取的前缀字节数
        #[arg(long, default_value_t = DEFAULT_PREFIX_LEN)]
        bytes: usize,
    },
}

fn main() -> Result<()> {
    // 初始化日志（支持通过 RUST_LOG 控制等级，例如 info、debug）
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan { input, rules, exclude, encodings, output, format, max_file_size } => {
            info!(?input, ?output, "starting scan");
            let rule_set = load_rules(rules.as_deref())?;

            let opts = ScanOptions {
                extra_exclude: exclude,
                encodings: (!encodings.is_empty()).then_some(encodings),
                max_file_size,
            };

            // 先扫描，成功后才打开（截断）输出文件，致命错误不会清空上一次的报告
            let (result, stats) = scan_headers(&input, &rule_set, &opts).context("scan failed")?;
            let target = OutputTarget::from_option(output);
            let mut out = target.open().context("open output")?;
            render(&result, format, &mut out).context("write report")?;
            out.flush().context("write report")?;
            drop(out);

            if let Some(path) = target.path() {
                info!(path = %path.display(), "results written");
            }
            info!(
                files_scanned = stats.files_scanned,
                files_matched = stats.files_matched,
                files_failed = stats.files_failed,
                "scan finished"
            );
        }
        Commands::Extract { input, rules, output } => {
            let rule_set = RuleSet::load(&rules).with_context(|| format!("load rules {}", rules.display()))?;
            let target = OutputTarget::from_option(output);
            let mut out = target.open().context("open output")?;

            match extract_sections(&input, &rule_set.sections, &rule_set.encodings) {
                Ok(report) => render_sections(&report, &mut out)?,
                Err(e) => {
                    // 单文件失败：把错误写进报告，不作为致命错误
                    warn!(error = %e, "extraction failed");
                    write!(out, "Error: {e}")?;
                }
            }
            out.flush()?;
            drop(out);

            if let Some(path) = target.path() {
                info!(path = %path.display(), "sections written");
            }
        }
        Commands::Probe { input, encodings, grep } => {
            let candidates = if encodings.is_empty() { DEFAULT_ENCODINGS.to_vec() } else { encodings };
            let outcome = probe_lines(&input, &candidates);
            match outcome.encoding {
                Some(enc) => println!("Successfully read with {enc}"),
                None => println!("Failed to read file with tested encodings"),
            }
            for line in &outcome.lines {
                if grep.as_deref().map_or(true, |g| line.contains(g)) {
                    println!("{}", line.trim());
                }
            }
        }
        Commands::Inspect { files, bytes } => {
            for path in files {
                if !path.exists() {
                    println!("File not found: {}", path.display());
                    continue;
                }
                match inspect_prefix(&path, bytes) {
                    Ok(dump) => println!("{dump}"),
                    Err(e) => println!("Error reading file: {e}"),
                }
            }
        }
    }

    Ok(())
}

/// 规则来源：显式路径 → 默认文件（若存在）→ 内置规则
fn load_rules(explicit: Option<&Path>) -> Result<RuleSet> {
    if let Some(path) = explicit {
        return RuleSet::load(path).with_context(|| format!("load rules {}", path.display()));
    }
    let default = Path::new(DEFAULT_RULES_PATH);
    if default.is_file() {
        return RuleSet::load(default).with_context(|| format!("load rules {}", default.display()));
    }
    info!("no rule file found, using built-in focus position rules");
    Ok(RuleSet::focus_position())
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    // 日志写 stderr，避免与控制台报告混在一起
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(env_filter).with_writer(std::io::stderr).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
