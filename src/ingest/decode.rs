//! Primary/fallback text decoding

use encoding_rs::Encoding;

use crate::error::IngestionError;

/// Decodes bytes with a primary encoding, falling back to exactly one other.
#[derive(Debug, Clone, Copy)]
pub struct TextDecoder {
    primary: &'static Encoding,
    fallback: &'static Encoding,
}

impl TextDecoder {
    /// Resolve both encodings from WHATWG labels (`utf-8`, `gbk`, `latin1`, ...).
    pub fn from_labels(primary: &str, fallback: &str) -> Result<Self, IngestionError> {
        Ok(Self {
            primary: resolve(primary)?,
            fallback: resolve(fallback)?,
        })
    }

    pub fn primary_name(&self) -> &'static str {
        self.primary.name()
    }

    pub fn fallback_name(&self) -> &'static str {
        self.fallback.name()
    }

    /// Strict decode: malformed input fails instead of being replaced.
    ///
    /// Returns the text and the name of the encoding that succeeded.
    pub fn decode(&self, bytes: &[u8]) -> Option<(String, &'static str)> {
        [self.primary, self.fallback].into_iter().find_map(|encoding| {
            encoding
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(|text| (text.into_owned(), encoding.name()))
        })
    }
}

fn resolve(label: &str) -> Result<&'static Encoding, IngestionError> {
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| IngestionError::UnknownEncoding(label.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf8_gbk() -> TextDecoder {
        TextDecoder::from_labels("utf-8", "gbk").expect("known labels")
    }

    #[test]
    fn test_utf8_is_tried_first() {
        let (text, used) = utf8_gbk().decode("仓库问答".as_bytes()).expect("utf-8 decodes");
        assert_eq!(text, "仓库问答");
        assert_eq!(used, "UTF-8");
    }

    #[test]
    fn test_gbk_fallback() {
        let (bytes, _, had_errors) = encoding_rs::GBK.encode("仓库问答");
        assert!(!had_errors);
        assert!(std::str::from_utf8(&bytes).is_err(), "GBK bytes must not be valid UTF-8");

        let (text, used) = utf8_gbk().decode(&bytes).expect("gbk decodes");
        assert_eq!(text, "仓库问答");
        assert_eq!(used, "GBK");
    }

    #[test]
    fn test_both_fail() {
        let decoder = TextDecoder::from_labels("utf-8", "utf-8").expect("known labels");
        assert!(decoder.decode(&[0xff, 0xfe, 0xfd]).is_none());
    }

    #[test]
    fn test_unknown_label() {
        let err = TextDecoder::from_labels("utf-8", "not-an-encoding").unwrap_err();
        assert!(matches!(err, IngestionError::UnknownEncoding(label) if label == "not-an-encoding"));
    }
}
