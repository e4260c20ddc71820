/// Ordered text decoding for source files of unknown encoding.
///
/// Legacy code bases mix UTF-8 files with Korean code-page files, so each
/// file is tried against a fixed list of encodings and the first one that
/// decodes without malformed sequences wins.
use encoding_rs::Encoding;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unknown encoding label: {0}")]
    UnknownLabel(String),

    #[error("no configured encoding could decode the input (tried {0})")]
    Undecodable(String),
}

/// A resolved, ordered list of encodings.
#[derive(Debug, Clone)]
pub struct Decoder {
    encodings: Vec<&'static Encoding>,
}

impl Decoder {
    /// Resolve WHATWG labels such as `utf-8`, `euc-kr` or `cp949`.
    ///
    /// `cp949`/`windows-949` and `euc-kr` resolve to the same decoder; the
    /// duplicate is kept only once.
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Result<Self, DecodeError> {
        let mut encodings: Vec<&'static Encoding> = Vec::with_capacity(labels.len());
        for label in labels {
            let label = label.as_ref();
            let encoding = Encoding::for_label(label.trim().as_bytes())
                .or_else(|| match label.trim().to_ascii_lowercase().as_str() {
                    "cp949" | "uhc" => Some(encoding_rs::EUC_KR),
                    _ => None,
                })
                .ok_or_else(|| DecodeError::UnknownLabel(label.to_string()))?;
            if !encodings.contains(&encoding) {
                encodings.push(encoding);
            }
        }
        Ok(Self { encodings })
    }

    /// Decode `bytes` with the first encoding that reports no errors.
    pub fn decode(&self, bytes: &[u8]) -> Result<String, DecodeError> {
        for encoding in &self.encodings {
            let (text, had_errors) = encoding.decode_with_bom_removal(bytes);
            if !had_errors {
                return Ok(text.into_owned());
            }
        }
        Err(DecodeError::Undecodable(self.names()))
    }

    fn names(&self) -> String {
        self.encodings
            .iter()
            .map(|e| e.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Default for Decoder {
    fn default() -> Self {
        // UTF-8 must come first: EUC-KR accepts most UTF-8 Hangul byte
        // sequences and would decode them as mojibake. Invalid UTF-8 is
        // rejected outright, so legacy files still fall through to EUC-KR.
        Self {
            encodings: vec![encoding_rs::UTF_8, encoding_rs::EUC_KR],
        }
    }
}
