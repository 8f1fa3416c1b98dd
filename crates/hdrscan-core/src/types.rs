//! 公共类型（对外暴露）
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::BTreeMap;

/// 单个标签的捕获内容：单行或块
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(untagged)]
pub enum Capture {
    Line(String),
    Block(Vec<String>),
}

impl Capture {
    /// 以输出行的形式展开
    pub fn lines(&self) -> &[String] {
        match self {
            Capture::Line(l) => std::slice::from_ref(l),
            Capture::Block(ls) => ls,
        }
    }
}

/// 单文件命中：按首次出现顺序保存 label -> Capture
/// 同一 label 再次命中时原位覆盖（后者生效）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileMatches {
    entries: Vec<(String, Capture)>,
}

impl FileMatches {
    pub fn insert(&mut self, label: &str, capture: Capture) {
        match self.entries.iter_mut().find(|(l, _)| l == label) {
            Some(slot) => slot.1 = capture,
            None => self.entries.push((label.to_string(), capture)),
        }
    }

    pub fn get(&self, label: &str) -> Option<&Capture> {
        self.entries.iter().find(|(l, _)| l == label).map(|(_, c)| c)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Capture)> {
        self.entries.iter().map(|(l, c)| (l.as_str(), c))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for FileMatches {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (label, capture) in &self.entries {
            map.serialize_entry(label, capture)?;
        }
        map.end()
    }
}

/// 单文件报告：命中集合，或读取失败时的错误标记（序列化为 `{"error": msg}`）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileReport {
    Matches(FileMatches),
    Error(String),
}

impl Serialize for FileReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FileReport::Matches(m) => m.serialize(serializer),
            FileReport::Error(msg) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("error", msg)?;
                map.end()
            }
        }
    }
}

/// 扫描结果：文件名 -> 报告；BTreeMap 保证按文件名有序输出
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(transparent)]
pub struct ScanResult {
    pub files: BTreeMap<String, FileReport>,
}

impl ScanResult {
    pub fn get(&self, file_name: &str) -> Option<&FileReport> {
        self.files.get(file_name)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
