//! 扫描选项与统计信息（模块）
use crate::encoding::TextEncoding;
use crate::rules::RuleSet;

/// 扫描选项（运行期参数，叠加在规则文件之上）
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// 额外排除的文件名（与规则文件中的 exclude 合并）
    pub extra_exclude: Vec<String>,
    /// 覆盖规则文件中的候选编码顺序
    pub encodings: Option<Vec<TextEncoding>>,
    /// 最大文件大小（字节）；超过则跳过
    pub max_file_size: Option<u64>,
}

impl ScanOptions {
    pub(crate) fn encodings<'a>(&'a self, rules: &'a RuleSet) -> &'a [TextEncoding] {
        match &self.encodings {
            Some(encs) if !encs.is_empty() => encs,
            _ => &rules.encodings,
        }
    }

    pub(crate) fn is_excluded(&self, rules: &RuleSet, file_name: &str) -> bool {
        rules.exclude.contains(file_name) || self.extra_exclude.iter().any(|n| n == file_name)
    }
}

/// 扫描统计信息（便于 CLI 打印）
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanStats {
    /// 实际读取的文件数（含失败）
    pub files_scanned: usize,
    /// 至少一条规则命中的文件数
    pub files_matched: usize,
    /// 读取失败、记为错误项的文件数
    pub files_failed: usize,
    /// 因体积超限跳过的文件数
    pub files_skipped: usize,
}
