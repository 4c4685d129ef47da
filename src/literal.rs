// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Literal decoding for the constant evaluator: radix-prefixed integers,
//! floats, and quoted string/character literals with escape sequences.
//! Failures are `None`, never panics; the evaluator turns them into the
//! "no value" sentinel.

use crate::value::Value;
use std::str::Chars;

/// Parse an unsigned integer literal: decimal, `0x`/`0o`/`0b` prefixes,
/// legacy leading-zero octal, digit separators.
pub(crate) fn parse_int(text: &str) -> Option<Value> {
    let t: String = text.trim().chars().filter(|c| *c != '_').collect();
    let (digits, radix) = if let Some(rest) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X"))
    {
        (rest, 16)
    } else if let Some(rest) = t.strip_prefix("0o").or_else(|| t.strip_prefix("0O")) {
        (rest, 8)
    } else if let Some(rest) = t.strip_prefix("0b").or_else(|| t.strip_prefix("0B")) {
        (rest, 2)
    } else if t.len() > 1 && t.starts_with('0') && t.bytes().all(|b| b.is_ascii_digit()) {
        (&t[1..], 8)
    } else {
        (t.as_str(), 10)
    };
    if digits.is_empty() {
        return None;
    }
    let v = u128::from_str_radix(digits, radix).ok()?;
    if v <= i64::MAX as u128 {
        Some(Value::Int(v as i64))
    } else if v <= u64::MAX as u128 {
        Some(Value::Uint(v as u64))
    } else {
        None
    }
}

pub(crate) fn parse_float(text: &str) -> Option<f64> {
    let t: String = text.trim().chars().filter(|c| *c != '_').collect();
    if t.is_empty() {
        return None;
    }
    t.parse::<f64>().ok()
}

/// Decode a string literal. Accepts interpreted (`"..."`), raw (`` `...` ``),
/// and bare (already unquoted) forms.
pub(crate) fn unquote_string(text: &str) -> Option<String> {
    let t = text.trim();
    if t.len() >= 2 && t.starts_with('"') && t.ends_with('"') {
        return decode_escapes(&t[1..t.len() - 1]);
    }
    if t.len() >= 2 && t.starts_with('`') && t.ends_with('`') {
        return Some(t[1..t.len() - 1].to_string());
    }
    decode_escapes(t)
}

/// Decode a character literal to its unicode scalar value.
pub(crate) fn unquote_char(text: &str) -> Option<char> {
    let t = text.trim();
    let inner = if t.len() >= 2 && t.starts_with('\'') && t.ends_with('\'') {
        &t[1..t.len() - 1]
    } else {
        t
    };
    let decoded = decode_escapes(inner)?;
    let mut chars = decoded.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

fn decode_escapes(s: &str) -> Option<String> {
    let mut out = String::with_capacity(s.len());
    let mut it = s.chars();
    while let Some(c) = it.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match it.next()? {
            'a' => out.push('\u{07}'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0c}'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'v' => out.push('\u{0b}'),
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'x' => out.push(char::from_u32(hex_digits(&mut it, 2)?)?),
            'u' => out.push(char::from_u32(hex_digits(&mut it, 4)?)?),
            'U' => out.push(char::from_u32(hex_digits(&mut it, 8)?)?),
            d @ '0'..='7' => {
                let mut v = d.to_digit(8)?;
                for _ in 0..2 {
                    v = v * 8 + it.next()?.to_digit(8)?;
                }
                out.push(char::from_u32(v)?);
            }
            _ => return None,
        }
    }
    Some(out)
}

fn hex_digits(it: &mut Chars<'_>, count: usize) -> Option<u32> {
    let mut v = 0u32;
    for _ in 0..count {
        v = v * 16 + it.next()?.to_digit(16)?;
    }
    Some(v)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn int_radixes() {
        assert_eq!(parse_int("42"), Some(Value::Int(42)));
        assert_eq!(parse_int("0x1F"), Some(Value::Int(31)));
        assert_eq!(parse_int("0o17"), Some(Value::Int(15)));
        assert_eq!(parse_int("017"), Some(Value::Int(15)));
        assert_eq!(parse_int("0b101"), Some(Value::Int(5)));
        assert_eq!(parse_int("1_000_000"), Some(Value::Int(1_000_000)));
        assert_eq!(parse_int("0"), Some(Value::Int(0)));
    }

    #[test]
    fn int_width_selection() {
        assert_eq!(
            parse_int("9223372036854775807"),
            Some(Value::Int(i64::MAX))
        );
        assert_eq!(
            parse_int("9223372036854775808"),
            Some(Value::Uint(9223372036854775808))
        );
        assert_eq!(
            parse_int("18446744073709551615"),
            Some(Value::Uint(u64::MAX))
        );
        assert_eq!(parse_int("18446744073709551616"), None);
    }

    #[test]
    fn int_rejects_garbage() {
        assert_eq!(parse_int(""), None);
        assert_eq!(parse_int("0x"), None);
        assert_eq!(parse_int("12ab"), None);
    }

    #[test]
    fn floats() {
        assert_eq!(parse_float("1.5"), Some(1.5));
        assert_eq!(parse_float("1e3"), Some(1000.0));
        assert_eq!(parse_float("nope"), None);
    }

    #[test]
    fn string_escapes() {
        assert_eq!(unquote_string(r#""hello\n""#).unwrap(), "hello\n");
        assert_eq!(unquote_string(r#""tab\there""#).unwrap(), "tab\there");
        assert_eq!(unquote_string(r#""\x41é""#).unwrap(), "Aé");
        assert_eq!(unquote_string("`raw\\n`").unwrap(), "raw\\n");
        assert_eq!(unquote_string("bare").unwrap(), "bare");
        assert!(unquote_string(r#""\q""#).is_none());
    }

    #[test]
    fn char_literals() {
        assert_eq!(unquote_char("'a'"), Some('a'));
        assert_eq!(unquote_char(r"'\n'"), Some('\n'));
        assert_eq!(unquote_char(r"'\101'"), Some('A'));
        assert_eq!(unquote_char("'ab'"), None);
        assert_eq!(unquote_char("''"), None);
    }
}
