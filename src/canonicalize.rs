//! Canonical JSON text for hashing
//!
//! Produces the RFC 8785 style form used everywhere a byte-stable
//! representation is hashed: trace identities, audit chain links and the
//! classifier's rendering of free-form signal values. The same logical value
//! always yields the same string. Keys are sorted and no insignificant
//! whitespace is emitted.
//!
//! Where this form knowingly departs from strict JCS:
//!
//! - keys sort by UTF-8 bytes, not UTF-16 code units (identical for ASCII);
//! - `-0.0` is written as `0`;
//! - a float with no fractional part below 1e15 in magnitude is written as
//!   an integer, so `5.0` and `5` hash alike;
//! - other floats use Rust's shortest round-trip rendering, never exponent
//!   notation;
//! - NaN and infinities are rejected rather than mapped to `null`;
//! - every Unicode control character, DEL and C1 included, is `\u`-escaped.

use crate::errors::{GateError, GateResult};
use serde::Serialize;
use serde_json::{Map, Number, Value};

/// Floats below this magnitude with no fraction are written as integers
const INTEGRAL_FLOAT_LIMIT: f64 = 1e15;

/// Canonicalize a JSON value
pub fn canonicalize_json(value: &Value) -> GateResult<String> {
    let mut writer = CanonicalWriter::default();
    writer.value(value)?;
    Ok(writer.out)
}

/// Serialize any value through serde and canonicalize the result
pub fn canonicalize_serializable<T: Serialize + ?Sized>(value: &T) -> GateResult<String> {
    let value = serde_json::to_value(value)
        .map_err(|e| GateError::serialization("canonical form", e))?;
    canonicalize_json(&value)
}

#[derive(Default)]
struct CanonicalWriter {
    out: String,
}

impl CanonicalWriter {
    fn value(&mut self, value: &Value) -> GateResult<()> {
        match value {
            Value::Null => self.out.push_str("null"),
            Value::Bool(true) => self.out.push_str("true"),
            Value::Bool(false) => self.out.push_str("false"),
            Value::Number(number) => self.out.push_str(&canonical_number(number)?),
            Value::String(text) => self.string(text),
            Value::Array(items) => self.delimited('[', ']', items, |w, item| w.value(item))?,
            Value::Object(map) => self.object(map)?,
        }
        Ok(())
    }

    fn object(&mut self, map: &Map<String, Value>) -> GateResult<()> {
        let mut members: Vec<(&String, &Value)> = map.iter().collect();
        members.sort_unstable_by(|a, b| a.0.cmp(b.0));
        self.delimited('{', '}', members, |w, (key, value)| {
            w.string(key);
            w.out.push(':');
            w.value(value)
        })
    }

    /// Comma-separated items between `open` and `close`
    fn delimited<I>(
        &mut self,
        open: char,
        close: char,
        items: I,
        mut write_item: impl FnMut(&mut Self, I::Item) -> GateResult<()>,
    ) -> GateResult<()>
    where
        I: IntoIterator,
    {
        self.out.push(open);
        let mut first = true;
        for item in items {
            if !first {
                self.out.push(',');
            }
            first = false;
            write_item(self, item)?;
        }
        self.out.push(close);
        Ok(())
    }

    fn string(&mut self, text: &str) {
        self.out.reserve(text.len() + 2);
        self.out.push('"');
        for ch in text.chars() {
            match short_escape(ch) {
                Some(escape) => self.out.push_str(escape),
                None if ch.is_control() => self.out.push_str(&format!("\\u{:04x}", ch as u32)),
                None => self.out.push(ch),
            }
        }
        self.out.push('"');
    }
}

fn short_escape(ch: char) -> Option<&'static str> {
    Some(match ch {
        '"' => "\\\"",
        '\\' => "\\\\",
        '\u{08}' => "\\b",
        '\u{0C}' => "\\f",
        '\n' => "\\n",
        '\r' => "\\r",
        '\t' => "\\t",
        _ => return None,
    })
}

fn canonical_number(number: &Number) -> GateResult<String> {
    if let Some(int) = number.as_i64() {
        return Ok(int.to_string());
    }
    if let Some(uint) = number.as_u64() {
        return Ok(uint.to_string());
    }
    let float = number
        .as_f64()
        .ok_or_else(|| GateError::canonicalization("invalid number format"))?;
    match float {
        f if !f.is_finite() => Err(GateError::canonicalization(
            "non-finite numbers are not allowed in JSON",
        )),
        f if f == 0.0 => Ok("0".to_string()),
        f if f.fract() == 0.0 && f.abs() < INTEGRAL_FLOAT_LIMIT => Ok((f as i64).to_string()),
        f => Ok(f.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_key_sorting() {
        let input = json!({ "platform": "INSTAGRAM", "age_gate": "adult", "karma": 1 });
        let canonical = canonicalize_json(&input).unwrap();
        assert_eq!(canonical, r#"{"age_gate":"adult","karma":1,"platform":"INSTAGRAM"}"#);
    }

    #[test]
    fn test_nested_objects_and_arrays() {
        let input = json!({
            "signals": { "tone": "warm", "dependency_score": 0.25 },
            "risk_flags": ["self_harm", "distress"],
            "intent": "hello"
        });

        let canonical = canonicalize_json(&input).unwrap();
        assert_eq!(
            canonical,
            r#"{"intent":"hello","risk_flags":["self_harm","distress"],"signals":{"dependency_score":0.25,"tone":"warm"}}"#
        );
    }

    #[test]
    fn test_number_canonicalization() {
        let input = json!({ "int": 42, "float": 0.3, "zero": 0.0, "whole": 5.0, "negative_zero": -0.0 });
        let canonical = canonicalize_json(&input).unwrap();
        assert_eq!(
            canonical,
            r#"{"float":0.3,"int":42,"negative_zero":0,"whole":5,"zero":0}"#
        );
    }

    #[test]
    fn test_string_escaping() {
        let input = json!({ "quote": "say \"hi\"", "newline": "a\nb", "bell": "\u{07}" });
        let canonical = canonicalize_json(&input).unwrap();
        assert_eq!(
            canonical,
            r#"{"bell":"\u0007","newline":"a\nb","quote":"say \"hi\""}"#
        );
    }

    #[test]
    fn large_and_fractional_floats_avoid_exponents() {
        let input = json!([1e21, 123456.5, 0.000001, -2.0]);
        assert_eq!(
            canonicalize_json(&input).unwrap(),
            "[1000000000000000000000,123456.5,0.000001,-2]"
        );
    }

    #[test]
    fn delete_and_c1_controls_are_escaped() {
        let input = json!(["\u{7f}", "\u{85}", "caf\u{e9}"]);
        assert_eq!(
            canonicalize_json(&input).unwrap(),
            r#"["\u007f","\u0085","café"]"#
        );
    }

    #[test]
    fn test_serializable_matches_value_form() {
        #[derive(Serialize)]
        struct Material {
            zeta: u8,
            alpha: &'static str,
        }

        let canonical = canonicalize_serializable(&Material { zeta: 1, alpha: "a" }).unwrap();
        assert_eq!(canonical, r#"{"alpha":"a","zeta":1}"#);
    }

    #[test]
    fn test_deterministic_output() {
        let input = json!({ "z": { "b": 2, "a": 1 }, "a": [3, 1, 2], "m": "test" });
        let first = canonicalize_json(&input).unwrap();
        let second = canonicalize_json(&input).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, r#"{"a":[3,1,2],"m":"test","z":{"a":1,"b":2}}"#);
    }
}
