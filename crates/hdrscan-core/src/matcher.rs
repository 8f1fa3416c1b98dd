//! 行匹配器（Aho-Corasick 一次扫描收集全部子串）
//!
//! 思路：
//! - 收集所有规则用到的子串（去重），构建一个全局 AC 自动机。
//! - 每行跑一遍重叠匹配，得到“本行出现了哪些子串”的标记表。
//! - 各规则只检查自己引用的子串 id 是否出现，避免逐规则逐子串调用 `contains`。

use std::collections::HashMap;

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};

use crate::rules::{BlockRule, LinePredicate, MatchRule};

/// 编译后的谓词：子串 id 列表
#[derive(Debug, Clone)]
struct CompiledPredicate {
    all: Vec<usize>,
    any: Vec<usize>,
}

impl CompiledPredicate {
    /// 与 `LinePredicate::matches` 一致：没有任何子串的谓词永不命中
    fn fires(&self, present: &[bool]) -> bool {
        if self.all.is_empty() && self.any.is_empty() {
            return false;
        }
        self.all.iter().all(|&i| present[i]) && (self.any.is_empty() || self.any.iter().any(|&i| present[i]))
    }
}

/// 子串去重表
#[derive(Default)]
struct Needles {
    list: Vec<String>,
    index: HashMap<String, usize>,
}

impl Needles {
    fn intern(&mut self, s: &str) -> usize {
        if let Some(&id) = self.index.get(s) {
            return id;
        }
        let id = self.list.len();
        self.list.push(s.to_string());
        self.index.insert(s.to_string(), id);
        id
    }

    fn compile(&mut self, p: &LinePredicate) -> CompiledPredicate {
        CompiledPredicate {
            all: p.all.iter().map(|s| self.intern(s)).collect(),
            any: p.any.iter().map(|s| self.intern(s)).collect(),
        }
    }
}

/// 单行求值结果：命中的行规则与块规则下标（按声明顺序）
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct LineHits {
    pub(crate) rules: Vec<usize>,
    pub(crate) blocks: Vec<usize>,
}

/// 规则集对应的匹配器（只读，可复用于多个文件）
pub(crate) struct LineMatcher {
    ac: Option<AhoCorasick>,
    needles: Vec<String>,
    rules: Vec<CompiledPredicate>,
    blocks: Vec<usize>,
}

impl LineMatcher {
    pub(crate) fn new(rules: &[MatchRule], blocks: &[BlockRule]) -> Self {
        let mut needles = Needles::default();
        let compiled: Vec<CompiledPredicate> = rules.iter().map(|r| needles.compile(&r.predicate)).collect();
        let block_ids: Vec<usize> = blocks.iter().map(|b| needles.intern(&b.start)).collect();
        let needles = needles.list;

        let ac = if needles.is_empty() {
            None
        } else {
            // 需要重叠匹配才能找出全部子串，故用 Standard 语义
            match AhoCorasickBuilder::new().match_kind(MatchKind::Standard).build(&needles) {
                Ok(ac) => Some(ac),
                Err(e) => {
                    tracing::warn!(error = %e, "aho-corasick build failed, using plain substring search");
                    None
                }
            }
        };

        Self { ac, needles, rules: compiled, blocks: block_ids }
    }

    /// 标记本行出现的子串
    fn present(&self, line: &str) -> Vec<bool> {
        let mut present = vec![false; self.needles.len()];
        match &self.ac {
            Some(ac) => {
                for m in ac.find_overlapping_iter(line) {
                    present[m.pattern().as_usize()] = true;
                }
            }
            None => {
                for (i, n) in self.needles.iter().enumerate() {
                    present[i] = line.contains(n.as_str());
                }
            }
        }
        present
    }

    /// 对单行求值，返回命中的规则下标
    pub(crate) fn eval(&self, line: &str) -> LineHits {
        if self.needles.is_empty() {
            return LineHits::default();
        }
        let present = self.present(line);
        LineHits {
            rules: self
                .rules
                .iter()
                .enumerate()
                .filter(|(_, p)| p.fires(&present))
                .map(|(i, _)| i)
                .collect(),
            blocks: self
                .blocks
                .iter()
                .enumerate()
                .filter(|&(_, &id)| present[id])
                .map(|(i, _)| i)
                .collect(),
        }
    }
}
