//! 单文件分节提取：每节收集全部命中行（不去重、不覆盖）
use std::io::{self, Write};
use std::path::Path;

use crate::encoding::{decode_best_effort, split_lines, TextEncoding};
use crate::error::ScanError;
use crate::rules::SectionRule;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub title: String,
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionReport {
    pub sections: Vec<Section>,
}

/// 读取文件并按节收集命中行（保持文件内顺序，已去除首尾空白）
pub fn extract_sections(
    path: &Path,
    sections: &[SectionRule],
    encodings: &[TextEncoding],
) -> Result<SectionReport, ScanError> {
    let bytes = std::fs::read(path).map_err(|e| ScanError::io(path, e))?;
    let (text, _, _) = decode_best_effort(&bytes, encodings);
    Ok(collect_sections(&split_lines(&text), sections))
}

pub(crate) fn collect_sections(lines: &[String], sections: &[SectionRule]) -> SectionReport {
    let sections = sections
        .iter()
        .map(|rule| Section {
            title: rule.title.clone(),
            lines: lines
                .iter()
                .filter(|l| rule.predicate.matches(l))
                .map(|l| l.trim().to_string())
                .collect(),
        })
        .collect();
    SectionReport { sections }
}

/// `=== 标题 ===` 后接命中行；节与节之间空一行
pub fn render_sections(report: &SectionReport, out: &mut dyn Write) -> io::Result<()> {
    for (i, section) in report.sections.iter().enumerate() {
        if i > 0 {
            writeln!(out)?;
        }
        writeln!(out, "=== {} ===", section.title)?;
        for line in &section.lines {
            writeln!(out, "{line}")?;
        }
    }
    Ok(())
}
