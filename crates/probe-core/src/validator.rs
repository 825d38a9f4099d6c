//! Format grammars for model answers.
//!
//! An [`ActionValidator`] turns raw model text into a structured action or a
//! [`FormatError`]. Validators are total and deterministic: any input yields
//! one of the two, never a panic.

use std::sync::LazyLock;

use regex::Regex;

use crate::domain::error::FormatError;
use crate::oracle::Coordinates;

/// Parses raw model output into an action.
pub trait ActionValidator: Send + Sync {
    type Action;

    fn validate(&self, raw: &str) -> Result<Self::Action, FormatError>;
}

// ---------------------------------------------------------------------------
// Free text
// ---------------------------------------------------------------------------

/// Any non-empty answer, trailing newlines stripped.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonEmptyValidator;

impl ActionValidator for NonEmptyValidator {
    type Action = String;

    fn validate(&self, raw: &str) -> Result<String, FormatError> {
        let text = raw.trim_end_matches(['\n', '\r']);
        if text.trim().is_empty() {
            return Err(FormatError::new("empty answer"));
        }
        Ok(text.to_string())
    }
}

/// A single integer or float.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumericValidator;

impl ActionValidator for NumericValidator {
    type Action = f64;

    fn validate(&self, raw: &str) -> Result<f64, FormatError> {
        let text = raw.trim();
        text.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| FormatError::new(format!("not a number: {text:?}")))
    }
}

/// Every character drawn from an allowed class.
#[derive(Debug, Clone, Copy)]
pub struct CharsetValidator {
    pub digits: bool,
    pub space: bool,
    pub comma: bool,
}

impl CharsetValidator {
    /// ASCII letters only.
    pub fn letters() -> Self {
        Self {
            digits: false,
            space: false,
            comma: false,
        }
    }

    /// Letters, digits, space and comma: the encryption alphabet.
    pub fn cipher_text() -> Self {
        Self {
            digits: true,
            space: true,
            comma: true,
        }
    }

    fn allows(&self, c: char) -> bool {
        c.is_ascii_alphabetic()
            || (self.digits && c.is_ascii_digit())
            || (self.space && c == ' ')
            || (self.comma && c == ',')
    }
}

impl ActionValidator for CharsetValidator {
    type Action = String;

    fn validate(&self, raw: &str) -> Result<String, FormatError> {
        let text = raw.trim_end_matches(['\n', '\r']);
        if text.is_empty() {
            return Err(FormatError::new("empty answer"));
        }
        match text.chars().find(|c| !self.allows(*c)) {
            Some(c) => Err(FormatError::new(format!("character {c:?} is not allowed"))),
            None => Ok(text.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Bit vectors
// ---------------------------------------------------------------------------

static BRACKETED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\[\]]*)\]").expect("valid regex"));
static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s,\[\]]+").expect("valid regex"));
static BIT_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[01]+\b").expect("valid regex"));

/// Exactly `width` bits, tolerant of brackets, commas and whitespace.
///
/// Tried in order: the first bracketed list, the whole text as a token
/// stream, then a contiguous run of `width` binary digits.
#[derive(Debug, Clone, Copy)]
pub struct BitVectorValidator {
    pub width: usize,
}

impl BitVectorValidator {
    pub fn new(width: usize) -> Self {
        Self { width }
    }

    /// Parse a separated token stream. `None` means "not a token stream",
    /// so the next layer is tried. With `strict`, a non-bit token is a
    /// format error instead.
    fn from_tokens(&self, body: &str, strict: bool) -> Option<Result<Vec<u8>, FormatError>> {
        let tokens: Vec<&str> = SEPARATORS.split(body).filter(|t| !t.is_empty()).collect();
        if tokens.is_empty() {
            return None;
        }
        // A single token is a digit run, not a list.
        if tokens.len() == 1 && tokens[0].len() > 1 {
            return None;
        }
        let mut bits = Vec::with_capacity(tokens.len());
        for token in &tokens {
            match *token {
                "0" => bits.push(0),
                "1" => bits.push(1),
                other if strict => {
                    return Some(Err(FormatError::new(format!("{other:?} is not a bit"))))
                }
                _ => return None,
            }
        }
        Some(self.check_width(bits))
    }

    fn check_width(&self, bits: Vec<u8>) -> Result<Vec<u8>, FormatError> {
        if bits.len() == self.width {
            Ok(bits)
        } else {
            Err(FormatError::new(format!(
                "expected {} bits, found {}",
                self.width,
                bits.len()
            )))
        }
    }
}

impl ActionValidator for BitVectorValidator {
    type Action = Vec<u8>;

    fn validate(&self, raw: &str) -> Result<Vec<u8>, FormatError> {
        let text = raw.trim();

        if let Some(caps) = BRACKETED.captures(text) {
            if let Some(result) = self.from_tokens(&caps[1], true) {
                return result;
            }
        }

        if let Some(result) = self.from_tokens(text, false) {
            return result;
        }

        for run in BIT_RUN.find_iter(text) {
            if run.as_str().len() == self.width {
                return Ok(run.as_str().bytes().map(|b| b - b'0').collect());
            }
        }

        Err(FormatError::new(format!(
            "no list of {} bits found",
            self.width
        )))
    }
}

// ---------------------------------------------------------------------------
// Coordinate dicts
// ---------------------------------------------------------------------------

const NUMBER: &str = r"[-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?";

static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json|python)?\s*\n(.*?)```").expect("valid regex"));
static DICT_BODY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^\{(.*)\}$").expect("valid regex"));
static ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r#"['"]([^'"]+)['"]\s*:\s*[\(\[]\s*({NUMBER})\s*,\s*({NUMBER})\s*,\s*({NUMBER})\s*,?\s*[\)\]]"#
    ))
    .expect("valid regex")
});
static ENTRY_GAP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*,?\s*$").expect("valid regex"));

/// A literal mapping `{"name": (x, y, z), ...}`, optionally inside a code
/// fence. Tuples or lists are accepted.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoordinateValidator;

impl ActionValidator for CoordinateValidator {
    type Action = Coordinates;

    fn validate(&self, raw: &str) -> Result<Coordinates, FormatError> {
        let text = match FENCE.captures(raw) {
            Some(caps) => caps[1].trim().to_string(),
            None => raw.trim().to_string(),
        };

        let body = DICT_BODY
            .captures(&text)
            .map(|c| c[1].to_string())
            .ok_or_else(|| FormatError::new("answer is not a dict literal"))?;

        let mut coords = Coordinates::new();
        let mut cursor = 0;
        for caps in ENTRY.captures_iter(&body) {
            let whole = caps.get(0).ok_or_else(|| FormatError::new("bad entry"))?;
            if !ENTRY_GAP.is_match(&body[cursor..whole.start()]) {
                return Err(FormatError::new("malformed dict literal"));
            }
            cursor = whole.end();

            let mut position = [0.0; 3];
            for (slot, group) in position.iter_mut().zip(2..=4) {
                *slot = caps[group]
                    .parse::<f64>()
                    .map_err(|_| FormatError::new(format!("bad number {:?}", &caps[group])))?;
            }
            coords.insert(&caps[1], position);
        }

        if !ENTRY_GAP.is_match(&body[cursor..]) {
            return Err(FormatError::new("malformed dict literal"));
        }
        if coords.is_empty() {
            return Err(FormatError::new("dict has no objects"));
        }
        Ok(coords)
    }
}

// ---------------------------------------------------------------------------
// Oracle-supplied predicates
// ---------------------------------------------------------------------------

/// Delegates the shape check to a task-supplied predicate.
pub struct PredicateValidator<F> {
    predicate: F,
}

impl<F> PredicateValidator<F>
where
    F: Fn(&str) -> bool + Send + Sync,
{
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<F> ActionValidator for PredicateValidator<F>
where
    F: Fn(&str) -> bool + Send + Sync,
{
    type Action = String;

    fn validate(&self, raw: &str) -> Result<String, FormatError> {
        let text = raw.trim();
        if (self.predicate)(text) {
            Ok(text.to_string())
        } else {
            Err(FormatError::new("answer rejected by the puzzle's format rules"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric() {
        assert_eq!(NumericValidator.validate(" 42\n").unwrap(), 42.0);
        assert_eq!(NumericValidator.validate("-0.5").unwrap(), -0.5);
        assert!(NumericValidator.validate("forty").is_err());
        assert!(NumericValidator.validate("NaN").is_err());
    }

    #[test]
    fn test_charset_cipher_text() {
        let v = CharsetValidator::cipher_text();
        assert_eq!(v.validate("pmttw\n").unwrap(), "pmttw");
        assert!(v.validate("hello, world 2").is_ok());
        assert!(v.validate("").is_err());
        assert!(v.validate("The answer is: pmttw").is_err());
    }

    #[test]
    fn test_charset_letters_rejects_space() {
        assert!(CharsetValidator::letters().validate("ab cd").is_err());
    }

    #[test]
    fn test_bit_vector_separator_variants() {
        let v = BitVectorValidator::new(4);
        assert_eq!(v.validate("Output: [1, 0, 0, 1]").unwrap(), vec![1, 0, 0, 1]);
        assert_eq!(v.validate("[ 1 0 0 1 ]").unwrap(), vec![1, 0, 0, 1]);
        assert_eq!(v.validate("the gates read 1001").unwrap(), vec![1, 0, 0, 1]);
    }

    #[test]
    fn test_bit_vector_accepted_spellings_agree() {
        let v = BitVectorValidator::new(4);
        for raw in ["[0,1,1,0]", "0 1 1 0", "0,1,1,0", "0110"] {
            assert_eq!(v.validate(raw).unwrap(), vec![0, 1, 1, 0], "{raw}");
        }
    }

    #[test]
    fn test_bit_vector_rejects_bad_symbol_and_short_run() {
        let v = BitVectorValidator::new(4);
        let err = v.validate("[0,1,2,0]").unwrap_err();
        assert!(err.reason.contains("is not a bit"));
        assert!(v.validate("01").is_err());
    }

    #[test]
    fn test_bit_vector_rejects_wrong_width_list() {
        let v = BitVectorValidator::new(4);
        let err = v.validate("[1, 0, 1]").unwrap_err();
        assert!(err.reason.contains("expected 4 bits"));
    }

    #[test]
    fn test_coordinates_tuple_and_list_forms() {
        let c = CoordinateValidator
            .validate(r#"{"object1": (1.0, 2, -3.5), 'object2': [0, 0, 0]}"#)
            .unwrap();
        assert_eq!(c.len(), 2);
        assert_eq!(c.get("object1"), Some([1.0, 2.0, -3.5]));
    }

    #[test]
    fn test_coordinates_inside_json_fence() {
        let raw = "Here you go\n```json\n{\"object1\": [1, 2, 3]}\n```";
        let c = CoordinateValidator.validate(raw).unwrap();
        assert_eq!(c.get("object1"), Some([1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_coordinates_malformed_is_format_error() {
        assert!(CoordinateValidator.validate("{\"object1\": (1, 2)}").is_err());
        assert!(CoordinateValidator.validate("object1 is at 1,2,3").is_err());
        assert!(CoordinateValidator
            .validate("{\"object1\": (1, 2, 3) junk}")
            .is_err());
        assert!(CoordinateValidator.validate("{}").is_err());
    }

    #[test]
    fn test_predicate_validator() {
        let v = PredicateValidator::new(|s: &str| s.len() == 3);
        assert_eq!(v.validate(" abc ").unwrap(), "abc");
        assert!(v.validate("abcd").is_err());
    }
}
