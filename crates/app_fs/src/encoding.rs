//! Entry-name decoding strategies for archives without reliable UTF-8 names
//!
//! Zip archives written by legacy tools store names in the writer's local
//! code page. Which decoder applies is a configuration decision, so the
//! extractor only ever talks to an [`EntryNameDecoder`].

use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

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

    fn fallback(self) -> &'static Encoding {
        match self {
            EncodingHint::Japanese => encoding_rs::SHIFT_JIS,
            EncodingHint::ChineseSimplified => encoding_rs::GBK,
            EncodingHint::ChineseTraditional => encoding_rs::BIG5,
            EncodingHint::Korean => encoding_rs::EUC_KR,
            EncodingHint::None => encoding_rs::WINDOWS_1252,
        }
    }
}

/// Detect the most likely encoding of a byte sequence
pub fn detect_encoding(bytes: &[u8], hint: EncodingHint) -> &'static Encoding {
    if std::str::from_utf8(bytes).is_ok() {
        return encoding_rs::UTF_8;
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);

    let detected = detector.guess(hint.tld(), true);
    if detected == encoding_rs::WINDOWS_1252 {
        hint.fallback()
    } else {
        detected
    }
}

/// Decode bytes to a UTF-8 string
///
/// Returns the decoded string and a flag indicating if there were errors
pub fn decode_bytes(bytes: &[u8], hint: EncodingHint) -> (String, bool) {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return (s.to_string(), false);
    }

    let encoding = detect_encoding(bytes, hint);
    let (result, _, had_errors) = encoding.decode(bytes);
    (result.into_owned(), had_errors)
}

/// Turns a raw archive entry name into a display string
pub trait EntryNameDecoder: Send + Sync {
    /// `raw` is the name as stored; `format_default` is the archive
    /// library's own decoding of it
    fn decode(&self, raw: &[u8], format_default: &str) -> String;
}

/// Trust the archive library's decoding
#[derive(Debug, Default, Clone, Copy)]
pub struct FormatDefaultDecoder;

impl EntryNameDecoder for FormatDefaultDecoder {
    fn decode(&self, _raw: &[u8], format_default: &str) -> String {
        format_default.to_string()
    }
}

/// Decode non-UTF-8 names with a fixed legacy double-byte code page
#[derive(Debug, Clone, Copy)]
pub struct LegacyCodepageDecoder {
    encoding: &'static Encoding,
}

impl LegacyCodepageDecoder {
    pub fn new(encoding: &'static Encoding) -> Self {
        Self { encoding }
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }
}

impl EntryNameDecoder for LegacyCodepageDecoder {
    fn decode(&self, raw: &[u8], _format_default: &str) -> String {
        if let Ok(s) = std::str::from_utf8(raw) {
            return s.to_string();
        }
        let (result, _, had_errors) = self.encoding.decode(raw);
        if had_errors {
            tracing::warn!("Lossy {} decoding of entry name", self.encoding.name());
        }
        result.into_owned()
    }
}

/// Guess the code page per name with chardetng
#[derive(Debug, Clone, Copy)]
pub struct DetectingDecoder {
    hint: EncodingHint,
}

impl DetectingDecoder {
    pub fn new(hint: EncodingHint) -> Self {
        Self { hint }
    }
}

impl EntryNameDecoder for DetectingDecoder {
    fn decode(&self, raw: &[u8], _format_default: &str) -> String {
        decode_bytes(raw, self.hint).0
    }
}

/// Configured zip name decoding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NameEncoding {
    /// Legacy code page only when the host locale calls for it
    #[default]
    Locale,
    /// Whatever the zip library decodes
    Utf8,
    /// Guess per entry
    Detect,
    /// A fixed WHATWG encoding label, e.g. "shift_jis"
    Label(String),
}

impl NameEncoding {
    /// Build the decoder for this setting
    pub fn decoder(&self) -> Arc<dyn EntryNameDecoder> {
        match self {
            NameEncoding::Locale => decoder_for_locale(system_encoding_hint()),
            NameEncoding::Utf8 => Arc::new(FormatDefaultDecoder),
            NameEncoding::Detect => Arc::new(DetectingDecoder::new(system_encoding_hint())),
            NameEncoding::Label(label) => match Encoding::for_label(label.as_bytes()) {
                Some(encoding) => Arc::new(LegacyCodepageDecoder::new(encoding)),
                None => {
                    tracing::warn!("Unknown encoding label {:?}, using format default", label);
                    Arc::new(FormatDefaultDecoder)
                }
            },
        }
    }
}

/// Only a Japanese host locale switches zip names to Shift_JIS
pub fn decoder_for_locale(hint: EncodingHint) -> Arc<dyn EntryNameDecoder> {
    match hint {
        EncodingHint::Japanese => Arc::new(LegacyCodepageDecoder::new(encoding_rs::SHIFT_JIS)),
        _ => Arc::new(FormatDefaultDecoder),
    }
}

/// Get the system default encoding hint based on locale
#[cfg(windows)]
pub fn system_encoding_hint() -> EncodingHint {
    use windows::Win32::Globalization::GetUserDefaultLCID;

    let lcid = unsafe { GetUserDefaultLCID() };

    match lcid & 0x3FF {
        0x11 => EncodingHint::Japanese,
        0x04 => EncodingHint::ChineseSimplified,
        0x12 => EncodingHint::Korean,
        _ => EncodingHint::None,
    }
}

#[cfg(not(windows))]
pub fn system_encoding_hint() -> EncodingHint {
    ["LC_ALL", "LC_CTYPE", "LANG"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
        .map(|lang| hint_from_locale_name(&lang))
        .unwrap_or(EncodingHint::None)
}

/// Map a POSIX/BCP-47 locale name onto a hint
pub fn hint_from_locale_name(lang: &str) -> EncodingHint {
    let lang = lang.to_lowercase().replace('-', "_");
    if lang.starts_with("ja") {
        EncodingHint::Japanese
    } else if lang.starts_with("zh_cn") || lang.starts_with("zh_sg") {
        EncodingHint::ChineseSimplified
    } else if lang.starts_with("zh_tw") || lang.starts_with("zh_hk") {
        EncodingHint::ChineseTraditional
    } else if lang.starts_with("ko") {
        EncodingHint::Korean
    } else {
        EncodingHint::None
    }
}
