//! 规则文件加载（TOML）与规则表
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;

use crate::encoding::{TextEncoding, DEFAULT_ENCODINGS};
use crate::error::ScanError;

/// 块捕获默认最大行数（含起始行）
pub const DEFAULT_BLOCK_MAX_LINES: usize = 15;
/// 块结束标记
pub const DEFAULT_BLOCK_CLOSE: &str = "}";

/// 行谓词：`all` 全部出现，且 `any` 为空或至少出现一个（大小写敏感的子串匹配）
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LinePredicate {
    pub all: Vec<String>,
    pub any: Vec<String>,
}

impl LinePredicate {
    pub fn all_of<I, S>(needles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { all: needles.into_iter().map(Into::into).collect(), any: Vec::new() }
    }

    pub fn any_of<I, S>(needles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { all: Vec::new(), any: needles.into_iter().map(Into::into).collect() }
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty() && self.any.is_empty()
    }

    /// 直接在单行上求值（不经自动机，供逐行少量判断使用）
    pub fn matches(&self, line: &str) -> bool {
        !self.is_empty()
            && self.all.iter().all(|n| line.contains(n.as_str()))
            && (self.any.is_empty() || self.any.iter().any(|n| line.contains(n.as_str())))
    }

    pub(crate) fn needles(&self) -> impl Iterator<Item = &str> {
        self.all.iter().chain(self.any.iter()).map(String::as_str)
    }
}

/// 单行匹配规则：命中时 label -> 去除首尾空白后的行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRule {
    pub label: String,
    pub predicate: LinePredicate,
}

/// 块规则：行包含 `start` 时，从该行起捕获至多 `max_lines` 行，遇到含 `close` 的行即止
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRule {
    pub label: String,
    pub start: String,
    pub max_lines: usize,
    pub close: String,
}

/// 分节提取规则（单文件多节报告）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionRule {
    pub title: String,
    pub predicate: LinePredicate,
}

/// 规则表：一次扫描所需的全部声明
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSet {
    pub rules: Vec<MatchRule>,
    pub blocks: Vec<BlockRule>,
    pub sections: Vec<SectionRule>,
    /// 排除的文件名（大小写敏感）
    pub exclude: BTreeSet<String>,
    /// 头文件扩展名（比较时忽略大小写，不含点）
    pub extensions: Vec<String>,
    pub encodings: Vec<TextEncoding>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            blocks: Vec::new(),
            sections: Vec::new(),
            exclude: BTreeSet::new(),
            extensions: vec!["h".to_string()],
            encodings: DEFAULT_ENCODINGS.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RuleEntry {
    label: String,
    #[serde(default)]
    contains: Vec<String>,
    #[serde(default)]
    any: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct BlockEntry {
    label: String,
    start: String,
    #[serde(default)]
    max_lines: Option<usize>,
    #[serde(default)]
    close: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SectionEntry {
    title: String,
    #[serde(default)]
    contains: Vec<String>,
    #[serde(default)]
    any: Vec<String>,
}

/// 顶层规则文件结构
#[derive(Debug, Clone, Deserialize)]
struct RuleFile {
    #[serde(default)]
    exclude: Vec<String>,
    #[serde(default)]
    extensions: Option<Vec<String>>,
    #[serde(default)]
    encodings: Option<Vec<TextEncoding>>,
    #[serde(default)]
    rules: Vec<RuleEntry>,
    #[serde(default)]
    blocks: Vec<BlockEntry>,
    #[serde(default)]
    sections: Vec<SectionEntry>,
}

impl RuleSet {
    /// 从 TOML 规则文件加载并校验
    pub fn load(path: &Path) -> Result<Self, ScanError> {
        let txt = std::fs::read_to_string(path).map_err(|e| ScanError::io(path, e))?;
        Self::from_toml_str(&txt, path)
    }

    /// 解析 TOML 文本；`origin` 仅用于错误信息
    pub fn from_toml_str(txt: &str, origin: &Path) -> Result<Self, ScanError> {
        let parsed: RuleFile = toml::from_str(txt)?;
        let mut set = RuleSet { exclude: parsed.exclude.into_iter().collect(), ..RuleSet::default() };

        if let Some(exts) = parsed.extensions {
            set.extensions = exts
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_string())
                .filter(|e| !e.is_empty())
                .collect();
            if set.extensions.is_empty() {
                return Err(ScanError::rules(origin, "extensions must not be empty"));
            }
        }
        if let Some(encs) = parsed.encodings {
            if encs.is_empty() {
                return Err(ScanError::rules(origin, "encodings must not be empty"));
            }
            set.encodings = encs;
        }

        for e in parsed.rules {
            let predicate = LinePredicate { all: e.contains, any: e.any };
            check_label(origin, &e.label, &predicate)?;
            set.rules.push(MatchRule { label: e.label, predicate });
        }

        for b in parsed.blocks {
            if b.label.trim().is_empty() || b.start.is_empty() {
                return Err(ScanError::rules(origin, "block needs a label and a start marker"));
            }
            let max_lines = b.max_lines.unwrap_or(DEFAULT_BLOCK_MAX_LINES);
            if max_lines == 0 {
                return Err(ScanError::rules(origin, format!("block `{}`: max_lines must be > 0", b.label)));
            }
            let close = b.close.unwrap_or_else(|| DEFAULT_BLOCK_CLOSE.to_string());
            if close.is_empty() {
                return Err(ScanError::rules(origin, format!("block `{}`: close marker must not be empty", b.label)));
            }
            set.blocks.push(BlockRule { label: b.label, start: b.start, max_lines, close });
        }

        for s in parsed.sections {
            let predicate = LinePredicate { all: s.contains, any: s.any };
            check_label(origin, &s.title, &predicate)?;
            set.sections.push(SectionRule { title: s.title, predicate });
        }

        Ok(set)
    }

    /// 内置规则：对焦位置参数（CapFocusPos/SetFocusPos/GetFocusPos）
    /// 总 SDK 头文件不含机型参数，默认排除
    pub fn focus_position() -> Self {
        let rules = ["CapFocusPos", "SetFocusPos", "GetFocusPos"]
            .into_iter()
            .map(|name| MatchRule {
                label: name.to_string(),
                predicate: LinePredicate::all_of([format!("API_PARAM_{name}"), "=".to_string()]),
            })
            .collect();
        let exclude = ["XAPI.h", "XAPIOpt.h", "XAPI_MOV.H", "XAPIOpt_MOV.H"]
            .into_iter()
            .map(str::to_string)
            .collect();
        RuleSet { rules, exclude, ..RuleSet::default() }
    }

    /// 扩展名是否属于头文件（忽略大小写）
    pub fn is_header_name(&self, file_name: &str) -> bool {
        match Path::new(file_name).extension().and_then(|e| e.to_str()) {
            Some(ext) => self.extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)),
            None => false,
        }
    }
}

fn check_label(origin: &Path, label: &str, predicate: &LinePredicate) -> Result<(), ScanError> {
    if label.trim().is_empty() {
        return Err(ScanError::rules(origin, "rule label must not be empty"));
    }
    if predicate.is_empty() || predicate.needles().any(str::is_empty) {
        return Err(ScanError::rules(origin, format!("`{label}`: needs at least one non-empty substring")));
    }
    Ok(())
}
