//! 报告输出：同一套格式，控制台与文件两种目标
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ScanError;
use crate::types::{FileReport, ScanResult};

/// 输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    /// 人类可读：空行、`<文件名>:`、两空格缩进的命中行
    #[default]
    Text,
    /// JSON 对象：文件名 -> {label: 行 | [块内各行]}
    Json,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown report format: {other}")),
        }
    }
}

/// 输出目标：控制台或文件（文件每次覆盖写入）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Console,
    File(PathBuf),
}

impl OutputTarget {
    pub fn from_option(path: Option<PathBuf>) -> Self {
        match path {
            Some(p) => Self::File(p),
            None => Self::Console,
        }
    }

    /// 打开带缓冲的写入端；文件目标会被截断重建
    pub fn open(&self) -> Result<Box<dyn Write>, ScanError> {
        match self {
            Self::Console => Ok(Box::new(BufWriter::new(io::stdout().lock()))),
            Self::File(path) => {
                let file = File::create(path).map_err(|e| ScanError::io(path, e))?;
                Ok(Box::new(BufWriter::new(file)))
            }
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Console => None,
            Self::File(p) => Some(p),
        }
    }
}

/// 按格式渲染扫描结果
pub fn render(result: &ScanResult, format: ReportFormat, out: &mut dyn Write) -> Result<(), ScanError> {
    match format {
        ReportFormat::Text => render_text(result, out)?,
        ReportFormat::Json => render_json(result, out)?,
    }
    Ok(())
}

/// 文本格式：文件按名称排序，块内各行依次输出；错误项输出错误信息
pub fn render_text(result: &ScanResult, out: &mut dyn Write) -> io::Result<()> {
    for (file, report) in &result.files {
        write!(out, "\n{file}:\n")?;
        match report {
            FileReport::Matches(matches) => {
                for (_, capture) in matches.iter() {
                    for line in capture.lines() {
                        writeln!(out, "  {line}")?;
                    }
                }
            }
            FileReport::Error(msg) => writeln!(out, "  {msg}")?,
        }
    }
    Ok(())
}

pub fn render_json(result: &ScanResult, out: &mut dyn Write) -> Result<(), ScanError> {
    serde_json::to_writer_pretty(&mut *out, result)?;
    writeln!(out)?;
    Ok(())
}
