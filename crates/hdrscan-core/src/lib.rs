//! 头文件扫描核心库
//!
//! 设计要点：
//! - 一张声明式规则表（TOML）驱动一个通用扫描函数，取代按需复制的检索脚本。
//! - 规则只做大小写敏感的子串匹配：行规则（全部/任一子串）与块规则（起始标记 + 最多 15 行）。
//! - 编码按候选顺序严格探测（UTF-16 → UTF-8 → Windows-1252），最终兜底为有损解码。
//! - 单文件失败记为错误项继续扫描；输入目录缺失等为致命错误。
//! - 输出按文件名排序，文本/JSON 两种格式，控制台与文件共用同一渲染逻辑。

mod encoding;
mod error;
mod matcher;
mod options;
mod report;
mod rules;
mod scan;
mod sections;
mod types;

pub use encoding::{
    decode_best_effort, inspect_prefix, probe_lines, PrefixDump, ProbeOutcome, TextEncoding, UnknownEncoding,
    DEFAULT_ENCODINGS, DEFAULT_PREFIX_LEN,
};
pub use error::ScanError;
pub use options::{ScanOptions, ScanStats};
pub use report::{render, render_json, render_text, OutputTarget, ReportFormat};
pub use rules::{BlockRule, LinePredicate, MatchRule, RuleSet, SectionRule, DEFAULT_BLOCK_CLOSE, DEFAULT_BLOCK_MAX_LINES};
pub use scan::{collect_headers, scan_and_report, scan_headers};
pub use sections::{extract_sections, render_sections, Section, SectionReport};
pub use types::{Capture, FileMatches, FileReport, ScanResult};
