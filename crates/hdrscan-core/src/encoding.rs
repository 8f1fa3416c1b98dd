//! 编码探测：按候选顺序严格解码，全部失败时退回有损解码
//!
//! 头文件可能是 UTF-16（带 BOM）、UTF-8 或 Windows 代码页，脚本默认编码常常不对。
//! - `decode_strict`：任何非法序列都视为失败，供探测链使用。
//! - `probe_lines`：返回首个成功的编码及行序列；全部失败返回空，不抛错。
//! - `decode_best_effort`：扫描器使用，保证总能得到文本（非法字节替换为 U+FFFD）。
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8, WINDOWS_1252};
use serde::Deserialize;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

/// 诊断时默认读取的前缀字节数
pub const DEFAULT_PREFIX_LEN: usize = 100;

/// 支持的文本编码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum TextEncoding {
    /// 依据 BOM 判定字节序；无 BOM 时视为失败
    Utf16,
    Utf16Le,
    Utf16Be,
    Utf8,
    Windows1252,
    Latin1,
}

/// 默认候选顺序：宽字符优先，再退到 8 位编码
pub const DEFAULT_ENCODINGS: [TextEncoding; 3] =
    [TextEncoding::Utf16, TextEncoding::Utf8, TextEncoding::Windows1252];

#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown encoding label: {0}")]
pub struct UnknownEncoding(pub String);

impl FromStr for TextEncoding {
    type Err = UnknownEncoding;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim().to_ascii_lowercase().replace('_', "-");
        match label.as_str() {
            "utf-16" | "utf16" => Ok(Self::Utf16),
            "utf-16le" | "utf16le" => Ok(Self::Utf16Le),
            "utf-16be" | "utf16be" => Ok(Self::Utf16Be),
            "utf-8" | "utf8" => Ok(Self::Utf8),
            "cp1252" | "windows-1252" => Ok(Self::Windows1252),
            "latin-1" | "latin1" | "iso-8859-1" => Ok(Self::Latin1),
            _ => Err(UnknownEncoding(s.to_string())),
        }
    }
}

impl TryFrom<String> for TextEncoding {
    type Error = UnknownEncoding;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TextEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Utf16 => "utf-16",
            Self::Utf16Le => "utf-16le",
            Self::Utf16Be => "utf-16be",
            Self::Utf8 => "utf-8",
            Self::Windows1252 => "windows-1252",
            Self::Latin1 => "latin-1",
        }
    }

    /// 单字节编码（可作为有损兜底）
    pub fn is_single_byte(&self) -> bool {
        matches!(self, Self::Windows1252 | Self::Latin1)
    }

    /// 严格解码：出现任何非法序列即返回 None
    pub fn decode_strict(&self, bytes: &[u8]) -> Option<String> {
        match self {
            Self::Utf16 => {
                let (enc, bom_len) = utf16_bom(bytes)?;
                strict(enc, &bytes[bom_len..])
            }
            Self::Utf16Le => strict(UTF_16LE, strip_bom(bytes, UTF_16LE)),
            Self::Utf16Be => strict(UTF_16BE, strip_bom(bytes, UTF_16BE)),
            Self::Utf8 => strict(UTF_8, strip_bom(bytes, UTF_8)),
            Self::Windows1252 => strict(WINDOWS_1252, bytes),
            Self::Latin1 => Some(bytes.iter().map(|&b| b as char).collect()),
        }
    }

    /// 有损解码：非法序列替换为 U+FFFD；返回 (文本, 是否发生替换)
    pub fn decode_lossy(&self, bytes: &[u8]) -> (String, bool) {
        if let Some(text) = self.decode_strict(bytes) {
            return (text, false);
        }
        let (enc, body) = match self {
            Self::Utf16 => match utf16_bom(bytes) {
                Some((enc, n)) => (enc, &bytes[n..]),
                None => (UTF_16LE, bytes),
            },
            Self::Utf16Le => (UTF_16LE, strip_bom(bytes, UTF_16LE)),
            Self::Utf16Be => (UTF_16BE, strip_bom(bytes, UTF_16BE)),
            Self::Utf8 => (UTF_8, strip_bom(bytes, UTF_8)),
            Self::Windows1252 | Self::Latin1 => (WINDOWS_1252, bytes),
        };
        let (text, had_errors) = enc.decode_without_bom_handling(body);
        (text.into_owned(), had_errors)
    }
}

fn strict(enc: &'static Encoding, bytes: &[u8]) -> Option<String> {
    enc.decode_without_bom_handling_and_without_replacement(bytes)
        .map(|cow| cow.into_owned())
}

fn utf16_bom(bytes: &[u8]) -> Option<(&'static Encoding, usize)> {
    match Encoding::for_bom(bytes) {
        Some((enc, n)) if enc == UTF_16LE || enc == UTF_16BE => Some((enc, n)),
        _ => None,
    }
}

fn strip_bom<'a>(bytes: &'a [u8], expected: &'static Encoding) -> &'a [u8] {
    match Encoding::for_bom(bytes) {
        Some((enc, n)) if enc == expected => &bytes[n..],
        _ => bytes,
    }
}

/// 将文本拆分为行（兼容 \r\n；不含换行符）
pub(crate) fn split_lines(text: &str) -> Vec<String> {
    text.lines().map(str::to_string).collect()
}

/// 探测结果：`encoding` 为 None 表示所有候选均失败（此时 `lines` 为空）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub encoding: Option<TextEncoding>,
    pub lines: Vec<String>,
}

/// 依次尝试候选编码读取文件，返回首个成功者；读取失败或全部失败均不报错
pub fn probe_lines(path: &Path, candidates: &[TextEncoding]) -> ProbeOutcome {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "probe read failed");
            return ProbeOutcome::default();
        }
    };
    for enc in candidates {
        if let Some(text) = enc.decode_strict(&bytes) {
            return ProbeOutcome { encoding: Some(*enc), lines: split_lines(&text) };
        }
        tracing::debug!(path = %path.display(), encoding = %enc, "decode failed, trying next");
    }
    ProbeOutcome::default()
}

/// 尽力解码：严格探测失败后，带 UTF-16 BOM 的按其字节序有损解码，
/// 否则用最后一个单字节候选（没有则 UTF-8）做有损解码
/// 返回 (文本, 实际使用的编码, 是否有损)
pub fn decode_best_effort(bytes: &[u8], candidates: &[TextEncoding]) -> (String, TextEncoding, bool) {
    for enc in candidates {
        if let Some(text) = enc.decode_strict(bytes) {
            return (text, *enc, false);
        }
    }
    // 单字节编码不会失败，须先于它们处理损坏的 UTF-16，否则得到夹杂 NUL 的乱码
    if utf16_bom(bytes).is_some() {
        let (text, _) = TextEncoding::Utf16.decode_lossy(bytes);
        return (text, TextEncoding::Utf16, true);
    }
    let fallback = candidates
        .iter()
        .rev()
        .find(|e| e.is_single_byte())
        .copied()
        .unwrap_or(TextEncoding::Utf8);
    let (text, _) = fallback.decode_lossy(bytes);
    (text, fallback, true)
}

/// 文件前缀诊断信息（仅供人工查看）
#[derive(Debug, Clone)]
pub struct PrefixDump {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl PrefixDump {
    pub fn as_utf16(&self) -> String {
        TextEncoding::Utf16.decode_lossy(&self.bytes).0
    }

    pub fn as_utf8(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

impl fmt::Display for PrefixDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "First {} bytes of {}: b'{}'", self.bytes.len(), self.name, self.bytes.escape_ascii())?;
        writeln!(f, "Decoded (utf-16): {}", self.as_utf16())?;
        write!(f, "Decoded (utf-8): {}", self.as_utf8())
    }
}

/// 读取文件前 `len` 个字节用于诊断
pub fn inspect_prefix(path: &Path, len: usize) -> std::io::Result<PrefixDump> {
    let file = File::open(path)?;
    let mut bytes = Vec::with_capacity(len);
    file.take(len as u64).read_to_end(&mut bytes)?;
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(PrefixDump { name, bytes })
}
