//! 扫描主流程（单线程、逐文件）
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::encoding::{decode_best_effort, split_lines, TextEncoding};
use crate::error::ScanError;
use crate::matcher::LineMatcher;
use crate::options::{ScanOptions, ScanStats};
use crate::report::{render, ReportFormat};
use crate::rules::RuleSet;
use crate::types::{Capture, FileMatches, FileReport, ScanResult};

/// 扫描目录（或单个文件）并返回结果与统计
/// 稳定性保证：
/// - 文件级：候选文件按文件名排序，结果以 BTreeMap 存放，与目录枚举顺序无关
/// - 文件内：label 按首次命中顺序，重复命中以后者为准
/// - 单文件读取失败记为 `{"error": ...}`，不会中断整个扫描
pub fn scan_headers(input: &Path, rules: &RuleSet, opts: &ScanOptions) -> Result<(ScanResult, ScanStats), ScanError> {
    let files = collect_headers(input, rules, opts)?;
    let matcher = LineMatcher::new(&rules.rules, &rules.blocks);
    let encodings = opts.encodings(rules);

    let mut result = ScanResult::default();
    let mut stats = ScanStats::default();

    for path in files {
        let file_name = display_name(&path);
        if let Some(max) = opts.max_file_size {
            if let Ok(md) = std::fs::metadata(&path) {
                if md.len() > max {
                    tracing::debug!(file = %file_name, size = md.len(), max, "skipping oversized file");
                    stats.files_skipped += 1;
                    continue;
                }
            }
        }

        stats.files_scanned += 1;
        match scan_file(&path, rules, &matcher, encodings) {
            Ok(matches) if matches.is_empty() => {
                tracing::debug!(file = %file_name, "no matches");
            }
            Ok(matches) => {
                tracing::debug!(file = %file_name, labels = matches.len(), "matched");
                stats.files_matched += 1;
                result.files.insert(file_name, FileReport::Matches(matches));
            }
            Err(e) => {
                tracing::warn!(file = %file_name, error = %e, "failed to read header");
                stats.files_failed += 1;
                result.files.insert(file_name, FileReport::Error(e.to_string()));
            }
        }
    }

    tracing::debug!(files = result.len(), skipped = stats.files_skipped, "scan complete");
    Ok((result, stats))
}

/// 扫描并按指定格式写入 `out`
pub fn scan_and_report(
    input: &Path,
    rules: &RuleSet,
    opts: &ScanOptions,
    format: ReportFormat,
    out: &mut dyn Write,
) -> Result<ScanStats, ScanError> {
    let (result, stats) = scan_headers(input, rules, opts)?;
    render(&result, format, out)?;
    out.flush()?;
    Ok(stats)
}

/// 收集待扫描文件
/// - 输入为文件：仅扫描该文件（不做扩展名与排除过滤）
/// - 输入为目录：只看第一层，按扩展名（忽略大小写）与排除表（大小写敏感）过滤，再按文件名排序
pub fn collect_headers(input: &Path, rules: &RuleSet, opts: &ScanOptions) -> Result<Vec<PathBuf>, ScanError> {
    let md = match std::fs::metadata(input) {
        Ok(md) => md,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ScanError::InputNotFound(input.to_path_buf()))
        }
        Err(e) => return Err(ScanError::io(input, e)),
    };
    if md.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }

    // 目录本身不可读属于致命错误，先探一次
    std::fs::read_dir(input).map_err(|e| ScanError::io(input, e))?;

    let mut files: Vec<PathBuf> = vec![];
    for entry in WalkDir::new(input).min_depth(1).max_depth(1) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        // 符号链接也纳入，读取失败时按单文件错误处理
        let ft = entry.file_type();
        if !(ft.is_file() || ft.is_symlink()) {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !rules.is_header_name(&name) || opts.is_excluded(rules, &name) {
            continue;
        }
        files.push(entry.into_path());
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// 扫描单个文件：读取 → 尽力解码 → 逐行求值
fn scan_file(
    path: &Path,
    rules: &RuleSet,
    matcher: &LineMatcher,
    encodings: &[TextEncoding],
) -> std::io::Result<FileMatches> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;

    let (text, encoding, lossy) = decode_best_effort(&buf, encodings);
    if lossy {
        tracing::debug!(path = %path.display(), %encoding, "decoded with replacement characters");
    }
    Ok(match_lines(&split_lines(&text), rules, matcher))
}

/// 对行序列应用规则
/// 块捕获是向后看：从起始行起最多 `max_lines` 行，含结束标记的行收入后停止；
/// 块内的行仍按普通行继续求值
pub(crate) fn match_lines(lines: &[String], rules: &RuleSet, matcher: &LineMatcher) -> FileMatches {
    let mut matches = FileMatches::default();
    for (idx, line) in lines.iter().enumerate() {
        let hits = matcher.eval(line);
        for ri in hits.rules {
            matches.insert(&rules.rules[ri].label, Capture::Line(line.trim().to_string()));
        }
        for bi in hits.blocks {
            let block = &rules.blocks[bi];
            let mut captured = Vec::new();
            for l in lines[idx..].iter().take(block.max_lines) {
                captured.push(l.trim().to_string());
                if l.contains(block.close.as_str()) {
                    break;
                }
            }
            matches.insert(&block.label, Capture::Block(captured));
        }
    }
    matches
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{BlockRule, LinePredicate, MatchRule};
    use std::fs;

    fn focus_rules() -> RuleSet {
        RuleSet { exclude: Default::default(), ..RuleSet::focus_position() }
    }

    fn lines(src: &str) -> Vec<String> {
        src.lines().map(str::to_string).collect()
    }

    fn block_rules(max_lines: usize) -> RuleSet {
        RuleSet {
            blocks: vec![BlockRule {
                label: "cap".into(),
                start: "typedef struct _SDK_FOCUS_POS_CAP".into(),
                max_lines,
                close: "}".into(),
            }],
            ..RuleSet::default()
        }
    }

    #[test]
    fn concrete_scenario_a_and_b() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("A.h"), "// header\n  #define API_PARAM_SetFocusPos = 0x1234  \n").unwrap();
        fs::write(dir.path().join("B.H"), "#define API_PARAM_Other = 1\n").unwrap();

        let (result, stats) = scan_headers(dir.path(), &focus_rules(), &ScanOptions::default()).unwrap();

        assert_eq!(result.len(), 1);
        let mut expected = FileMatches::default();
        expected.insert("SetFocusPos", Capture::Line("#define API_PARAM_SetFocusPos = 0x1234".into()));
        assert_eq!(result.get("A.h"), Some(&FileReport::Matches(expected)));
        assert!(result.get("B.H").is_none());
        assert_eq!(stats.files_scanned, 2);
        assert_eq!(stats.files_matched, 1);
    }

    #[test]
    fn selection_filters_extension_and_exclusions() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["z.h", "A.H", "XAPI.h", "xapi.h", "notes.txt", "c.hpp"] {
            fs::write(dir.path().join(name), "x").unwrap();
        }
        fs::create_dir(dir.path().join("sub.h")).unwrap();

        let rules = RuleSet::focus_position();
        let files = collect_headers(dir.path(), &rules, &ScanOptions::default()).unwrap();
        let names: Vec<String> = files.iter().map(|p| display_name(p)).collect();
        // XAPI.h 精确排除；xapi.h 大小写不同，保留
        assert_eq!(names, vec!["A.H", "xapi.h", "z.h"]);

        let opts = ScanOptions { extra_exclude: vec!["z.h".into()], ..Default::default() };
        let files = collect_headers(dir.path(), &rules, &opts).unwrap();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn scan_and_report_renders_what_it_scanned() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("A.h"), "#define API_PARAM_SetFocusPos = 0x1234\n").unwrap();

        let mut out = Vec::new();
        let stats = scan_and_report(dir.path(), &focus_rules(), &ScanOptions::default(), ReportFormat::Text, &mut out)
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "\nA.h:\n  #define API_PARAM_SetFocusPos = 0x1234\n");
        assert_eq!(stats.files_matched, 1);

        let mut out = Vec::new();
        let err = scan_and_report(&dir.path().join("nope"), &focus_rules(), &ScanOptions::default(), ReportFormat::Json, &mut out)
            .unwrap_err();
        assert!(matches!(err, ScanError::InputNotFound(_)));
        assert!(out.is_empty());
    }

    #[test]
    fn missing_input_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = scan_headers(&dir.path().join("gone"), &focus_rules(), &ScanOptions::default()).unwrap_err();
        assert!(matches!(err, ScanError::InputNotFound(_)));
    }

    #[test]
    fn single_file_input_skips_filters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("XAPI.h");
        fs::write(&path, "#define API_PARAM_GetFocusPos = 7\n").unwrap();

        let (result, _) = scan_headers(&path, &RuleSet::focus_position(), &ScanOptions::default()).unwrap();
        assert!(result.get("XAPI.h").is_some());
    }

    #[test]
    fn last_match_wins() {
        let rules = focus_rules();
        let matcher = LineMatcher::new(&rules.rules, &rules.blocks);
        let m = match_lines(
            &lines("API_PARAM_GetFocusPos = 1\nAPI_PARAM_SetFocusPos = 2\n\tAPI_PARAM_GetFocusPos = 3 \n"),
            &rules,
            &matcher,
        );
        assert_eq!(m.get("GetFocusPos"), Some(&Capture::Line("API_PARAM_GetFocusPos = 3".into())));
        let labels: Vec<&str> = m.iter().map(|(l, _)| l).collect();
        assert_eq!(labels, vec!["GetFocusPos", "SetFocusPos"]);
    }

    #[test]
    fn trimming_keeps_internal_whitespace() {
        let rules = RuleSet {
            rules: vec![MatchRule { label: "x".into(), predicate: LinePredicate::all_of(["X"]) }],
            ..RuleSet::default()
        };
        let matcher = LineMatcher::new(&rules.rules, &rules.blocks);
        let m = match_lines(&lines(" \t X  =   1\t "), &rules, &matcher);
        assert_eq!(m.get("x"), Some(&Capture::Line("X  =   1".into())));
    }

    #[test]
    fn block_stops_at_closing_brace() {
        let rules = block_rules(15);
        let matcher = LineMatcher::new(&rules.rules, &rules.blocks);
        let src = "int a;\ntypedef struct _SDK_FOCUS_POS_CAP {\n    long lMin;\n    long lMax;\n} SDK_FOCUS_POS_CAP;\nint after;\n";
        let m = match_lines(&lines(src), &rules, &matcher);
        assert_eq!(
            m.get("cap"),
            Some(&Capture::Block(vec![
                "typedef struct _SDK_FOCUS_POS_CAP {".into(),
                "long lMin;".into(),
                "long lMax;".into(),
                "} SDK_FOCUS_POS_CAP;".into(),
            ]))
        );
    }

    #[test]
    fn block_stops_at_max_lines_or_end_of_file() {
        let mut src = String::from("typedef struct _SDK_FOCUS_POS_CAP\n");
        for i in 0..20 {
            src.push_str(&format!("  field{i};\n"));
        }
        let rules = block_rules(15);
        let matcher = LineMatcher::new(&rules.rules, &rules.blocks);
        let m = match_lines(&lines(&src), &rules, &matcher);
        match m.get("cap") {
            Some(Capture::Block(b)) => {
                assert_eq!(b.len(), 15);
                assert_eq!(b[14], "field13;");
            }
            other => panic!("unexpected capture: {other:?}"),
        }

        let m = match_lines(&lines("typedef struct _SDK_FOCUS_POS_CAP\nint a;"), &rules, &matcher);
        assert_eq!(m.get("cap").map(|c| c.lines().len()), Some(2));
    }

    #[test]
    fn files_without_hits_are_absent() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("empty.h"), "").unwrap();
        fs::write(dir.path().join("other.h"), "#define FOO 1\n").unwrap();

        let (result, stats) = scan_headers(dir.path(), &focus_rules(), &ScanOptions::default()).unwrap();
        assert!(result.is_empty());
        assert_eq!(stats.files_scanned, 2);
    }

    #[test]
    fn utf16_headers_are_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "#define API_PARAM_CapFocusPos = 0x10\r\n".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        fs::write(dir.path().join("X-T5.h"), bytes).unwrap();

        let (result, _) = scan_headers(dir.path(), &focus_rules(), &ScanOptions::default()).unwrap();
        match result.get("X-T5.h") {
            Some(FileReport::Matches(m)) => {
                assert_eq!(m.get("CapFocusPos"), Some(&Capture::Line("#define API_PARAM_CapFocusPos = 0x10".into())))
            }
            other => panic!("unexpected report: {other:?}"),
        }
    }

    #[test]
    fn damaged_utf16_header_keeps_its_matches() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "#define API_PARAM_SetFocusPos = 0x1234\r\n".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        // 奇数长度：严格 UTF-16 解码失败
        bytes.push(0x00);
        fs::write(dir.path().join("X-H2.h"), bytes).unwrap();

        let (result, stats) = scan_headers(dir.path(), &focus_rules(), &ScanOptions::default()).unwrap();
        match result.get("X-H2.h") {
            Some(FileReport::Matches(m)) => assert_eq!(
                m.get("SetFocusPos"),
                Some(&Capture::Line("#define API_PARAM_SetFocusPos = 0x1234".into()))
            ),
            other => panic!("unexpected report: {other:?}"),
        }
        assert_eq!(stats.files_failed, 0);
    }

    #[test]
    fn oversized_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("big.h"), "#define API_PARAM_SetFocusPos = 1\n").unwrap();

        let opts = ScanOptions { max_file_size: Some(4), ..Default::default() };
        let (result, stats) = scan_headers(dir.path(), &focus_rules(), &opts).unwrap();
        assert!(result.is_empty());
        assert_eq!(stats.files_skipped, 1);
        assert_eq!(stats.files_scanned, 0);
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_file_is_recorded_and_scan_continues() {
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(dir.path().join("missing-target"), dir.path().join("broken.h")).unwrap();
        fs::write(dir.path().join("good.h"), "API_PARAM_SetFocusPos = 5\n").unwrap();

        let (result, stats) = scan_headers(dir.path(), &focus_rules(), &ScanOptions::default()).unwrap();
        assert!(matches!(result.get("broken.h"), Some(FileReport::Error(msg)) if !msg.is_empty()));
        assert!(matches!(result.get("good.h"), Some(FileReport::Matches(_))));
        assert_eq!(stats.files_failed, 1);
    }

    #[cfg(unix)]
    #[test]
    fn permission_denied_is_recorded_and_scan_continues() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let locked = dir.path().join("locked.h");
        fs::write(&locked, "API_PARAM_SetFocusPos = 1\n").unwrap();
        fs::write(dir.path().join("good.h"), "API_PARAM_SetFocusPos = 5\n").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // root 无视权限位，此时无法构造读取失败
        if File::open(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();
            return;
        }

        let scanned = scan_headers(dir.path(), &focus_rules(), &ScanOptions::default());
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();

        let (result, stats) = scanned.unwrap();
        match result.get("locked.h") {
            Some(FileReport::Error(msg)) => assert!(msg.to_lowercase().contains("permission denied"), "{msg}"),
            other => panic!("unexpected report: {other:?}"),
        }
        assert!(matches!(result.get("good.h"), Some(FileReport::Matches(_))));
        assert_eq!(stats.files_failed, 1);
        assert_eq!(stats.files_matched, 1);

        let json = serde_json::to_value(&result).unwrap();
        assert!(json["locked.h"]["error"].is_string());
    }
}
