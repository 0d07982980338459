//! Character encoding detection and conversion
//!
//! Handles file contents stored in legacy character sets as well as UTF-8/UTF-16.

use crate::{FsError, Result};
use chardetng::EncodingDetector;
use encoding_rs::Encoding;

/// Hint for encoding detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingHint {
    /// Prefer Japanese encodings (Shift_JIS)
    Japanese,
    /// Prefer Chinese Simplified (GBK/GB18030)
    ChineseSimplified,
    /// Prefer Chinese Traditional (Big5)
    ChineseTraditional,
    /// Prefer Korean (EUC-KR)
    Korean,
    /// No preference
    None,
}

impl EncodingHint {
    fn tld(self) -> Option<&'static [u8]> {
        match self {
            EncodingHint::Japanese => Some(b"jp"),
            EncodingHint::ChineseSimplified => Some(b"cn"),
            EncodingHint::ChineseTraditional => Some(b"tw"),
            EncodingHint::Korean => Some(b"kr"),
            EncodingHint::None => None,
        }
    }

    fn fallback(self) -> Option<&'static Encoding> {
        match self {
            EncodingHint::Japanese => Some(encoding_rs::SHIFT_JIS),
            EncodingHint::ChineseSimplified => Some(encoding_rs::GBK),
            EncodingHint::ChineseTraditional => Some(encoding_rs::BIG5),
            EncodingHint::Korean => Some(encoding_rs::EUC_KR),
            EncodingHint::None => None,
        }
    }
}

/// Look up an encoding by WHATWG label (`utf-8`, `utf8`, `latin1`, `sjis`, ...)
pub fn resolve_encoding(label: &str) -> Result<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| FsError::UnsupportedEncoding(label.to_string()))
}

/// Detect the most likely encoding of file contents
///
/// A byte order mark always wins. Valid UTF-8 resolves to `default`,
/// anything else is guessed statistically.
pub fn detect_encoding(
    bytes: &[u8],
    default: &'static Encoding,
    hint: EncodingHint,
) -> &'static Encoding {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return encoding;
    }

    if std::str::from_utf8(bytes).is_ok() {
        return default;
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);

    let detected = detector.guess(hint.tld(), true);
    match hint.fallback() {
        Some(fallback) if detected == encoding_rs::WINDOWS_1252 => fallback,
        _ => detected,
    }
}

/// Decode bytes to UTF-8 string, stripping a BOM if present
///
/// Returns the decoded string and a flag indicating if there were errors
pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> (String, bool) {
    let (result, actual, had_errors) = encoding.decode(bytes);

    if had_errors {
        tracing::warn!("Decoding errors occurred with encoding {}", actual.name());
    }

    (result.into_owned(), had_errors)
}

/// Encode a UTF-8 string for storage
pub fn encode_text(text: &str, encoding: &'static Encoding) -> Vec<u8> {
    // encoding_rs only decodes UTF-16; its encoder falls back to UTF-8
    if encoding == encoding_rs::UTF_16LE {
        return text.encode_utf16().flat_map(|unit| unit.to_le_bytes()).collect();
    }
    if encoding == encoding_rs::UTF_16BE {
        return text.encode_utf16().flat_map(|unit| unit.to_be_bytes()).collect();
    }

    let (result, _, had_errors) = encoding.encode(text);

    if had_errors {
        tracing::warn!(
            "Some characters are not representable in {}, replaced with numeric references",
            encoding.name()
        );
    }

    result.into_owned()
}

/// Get the system default encoding hint based on locale
pub fn system_encoding_hint() -> EncodingHint {
    ["LC_ALL", "LC_CTYPE", "LANG"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
        .map(|lang| {
            let lang = lang.to_lowercase();
            if lang.starts_with("ja") {
                EncodingHint::Japanese
            } else if lang.starts_with("zh_cn") || lang.starts_with("zh-cn") {
                EncodingHint::ChineseSimplified
            } else if lang.starts_with("zh_tw") || lang.starts_with("zh-tw") {
                EncodingHint::ChineseTraditional
            } else if lang.starts_with("ko") {
                EncodingHint::Korean
            } else {
                EncodingHint::None
            }
        })
        .unwrap_or(EncodingHint::None)
}
