//! Boundary-safe term encoding.
//!
//! Terms and corpus texts are reduced to their identifier tokens, upper-cased,
//! joined by NUL and wrapped by NUL. Since NUL never occurs inside a token, an
//! encoded key can only occur in an encoded text on whole-token boundaries.

use std::sync::LazyLock;

use regex::Regex;

use crate::errors::{AuditError, AuditResult};
use crate::models::SearchTerms;

pub const KEY_DELIMITER: char = '\0';

/// Prefix of the physical table behind a record.
pub const PHYSICAL_TABLE_PREFIX: &str = "PS_";

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9_#$@]+").unwrap());

fn encode_tokens(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push(KEY_DELIMITER);
    for token in TOKEN_RE.find_iter(value) {
        out.push_str(&token.as_str().to_uppercase());
        out.push(KEY_DELIMITER);
    }
    out
}

/// A search term reduced to its delimited token sequence.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EncodedKey(String);

impl EncodedKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A corpus text reduced to its delimited token sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedText(String);

impl EncodedText {
    pub fn contains(&self, key: &EncodedKey) -> bool {
        self.0.contains(key.0.as_str())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Encode one term. Fails when the term carries no identifier characters.
pub fn encode(term: &str) -> AuditResult<EncodedKey> {
    if term.trim().is_empty() {
        return Err(AuditError::invalid_term(term, "empty term"));
    }
    let encoded = encode_tokens(term);
    if encoded.len() <= 1 {
        return Err(AuditError::invalid_term(term, "no identifier characters"));
    }
    Ok(EncodedKey(encoded))
}

/// Encode a corpus text, refusing texts longer than `max_bytes`.
pub fn encode_text(artifact: &str, text: &str, max_bytes: usize) -> AuditResult<EncodedText> {
    if text.len() > max_bytes {
        return Err(AuditError::corpus_access(
            artifact,
            format!(
                "text of {} bytes exceeds the {} byte encoding limit",
                text.len(),
                max_bytes
            ),
        ));
    }
    Ok(EncodedText(encode_tokens(text)))
}

/// Keys a record is known by: its name and its physical table name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordKeys {
    pub bare: EncodedKey,
    pub physical: EncodedKey,
}

impl RecordKeys {
    pub fn new(record: &str) -> AuditResult<Self> {
        let bare = encode(record)?;
        let physical = encode(&format!("{PHYSICAL_TABLE_PREFIX}{}", record.trim()))?;
        Ok(Self { bare, physical })
    }

    pub fn found_in(&self, text: &EncodedText) -> bool {
        text.contains(&self.bare) || text.contains(&self.physical)
    }
}

/// Encoded record and optional field keys for one search request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TermKeys {
    pub record: RecordKeys,
    pub field: Option<EncodedKey>,
}

impl TermKeys {
    pub fn new(record: &str, field: Option<&str>) -> AuditResult<Self> {
        Ok(Self {
            record: RecordKeys::new(record)?,
            field: field.map(encode).transpose()?,
        })
    }

    pub fn from_terms(terms: &SearchTerms) -> AuditResult<Self> {
        Self::new(&terms.record, terms.field.as_deref())
    }

    /// The record must occur; the field too, when one is present.
    pub fn matches(&self, text: &EncodedText) -> bool {
        self.record.found_in(text)
            && self.field.as_ref().map_or(true, |field| text.contains(field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(value: &str) -> EncodedText {
        encode_text("t", value, 1 << 20).unwrap()
    }

    #[test]
    fn test_encode_is_deterministic_and_case_insensitive() {
        assert_eq!(encode("job").unwrap(), encode("JOB").unwrap());
        assert_eq!(encode("JOB").unwrap().as_str(), "\0JOB\0");
        assert_eq!(encode("A.B").unwrap().as_str(), "\0A\0B\0");
    }

    #[test]
    fn test_empty_terms_are_invalid() {
        for term in ["", "   ", ".-+"] {
            let err = encode(term).unwrap_err();
            assert!(matches!(err, AuditError::InvalidTerm { .. }));
        }
    }

    #[test]
    fn test_longer_identifier_never_matches() {
        let key = encode("JOB").unwrap();
        assert!(!text("select * from JOB_CODE_TBL").contains(&key));
        assert!(!text("select * from PS_JOBCODE").contains(&key));
        assert!(!text("MYJOB").contains(&key));
        assert!(text("select emplid from job where x = 1").contains(&key));
    }

    #[test]
    fn test_record_keys_include_physical_table() {
        let keys = RecordKeys::new("JOB").unwrap();
        assert!(keys.found_in(&text("SELECT 1 FROM PS_JOB A")));
        assert!(keys.found_in(&text("%SelectAll(:JOB)")));
        assert!(!keys.found_in(&text("FROM PS_JOB_DATA")));
    }

    #[test]
    fn test_field_term_is_required_when_present() {
        let keys = TermKeys::new("JOB", Some("DEPTID")).unwrap();
        assert!(keys.matches(&text("SELECT DEPTID FROM PS_JOB")));
        assert!(!keys.matches(&text("SELECT DEPTID_X FROM PS_JOB")));
        assert!(!keys.matches(&text("SELECT DEPTID FROM PS_DEPT")));
    }

    #[test]
    fn test_oversized_text_is_corpus_access_error() {
        let err = encode_text("BIG - Other", &"x".repeat(2048), 1024).unwrap_err();
        assert!(matches!(err, AuditError::CorpusAccess { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_blank_field_term_is_invalid() {
        assert!(TermKeys::new("JOB", Some(" ")).is_err());
        assert!(TermKeys::new("JOB", None).is_ok());
    }
}
