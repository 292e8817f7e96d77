//! Conversions between command-line text and argument values.

use std::fmt::Write as _;
use std::fs::File;
use std::os::fd::{AsRawFd, OwnedFd};

use bytes::Bytes;
use serde_json::{json, Value};
use wlwire_frame::{Arg, ArgType, Fixed, NewId, Signature};

use crate::exit::{io_error, CliError, CliResult};

/// Parse one value per signature entry.
///
/// Scalars are plain text; `fd` takes a path opened read-only; `array` takes
/// hex; `new_id` takes `interface:version`; sequences take a JSON array.
pub fn parse_args(signature: &Signature, values: &[String]) -> CliResult<Vec<Arg>> {
    if signature.len() != values.len() {
        return Err(CliError::usage(format!(
            "signature {signature} expects {} arguments, got {}",
            signature.len(),
            values.len()
        )));
    }
    signature
        .types()
        .iter()
        .zip(values)
        .map(|(ty, text)| parse_value(ty, text))
        .collect()
}

pub fn parse_value(ty: &ArgType, text: &str) -> CliResult<Arg> {
    let invalid = |detail: &dyn std::fmt::Display| {
        CliError::usage(format!("invalid {ty} argument {text:?}: {detail}"))
    };
    match ty {
        ArgType::Int => text.parse().map(Arg::Int).map_err(|e| invalid(&e)),
        ArgType::Uint => text.parse().map(Arg::Uint).map_err(|e| invalid(&e)),
        ArgType::Fixed => text
            .parse::<f64>()
            .map(|x| Arg::Fixed(Fixed::from_f64(x)))
            .map_err(|e| invalid(&e)),
        ArgType::String => Ok(Arg::String(text.to_string())),
        ArgType::Array => decode_hex(text).map(|b| Arg::Array(Bytes::from(b))),
        ArgType::NewId => {
            let (interface, version) = text
                .rsplit_once(':')
                .ok_or_else(|| invalid(&"expected interface:version"))?;
            let version = version.parse().map_err(|e| invalid(&e))?;
            Ok(Arg::NewId(NewId::new(interface, version)))
        }
        ArgType::Fd => File::open(text)
            .map(|file| Arg::Fd(OwnedFd::from(file)))
            .map_err(|err| io_error(&format!("failed opening {text}"), err)),
        ArgType::Sequence(_) => {
            let value: Value = serde_json::from_str(text).map_err(|e| invalid(&e))?;
            from_json(ty, value)
        }
    }
}

fn from_json(ty: &ArgType, value: Value) -> CliResult<Arg> {
    match (ty, value) {
        (ArgType::Sequence(element), Value::Array(items)) => items
            .into_iter()
            .map(|item| from_json(element, item))
            .collect::<CliResult<Vec<_>>>()
            .map(Arg::Sequence),
        (ArgType::Sequence(_), other) => Err(CliError::usage(format!(
            "expected a JSON array for {ty}, got {other}"
        ))),
        (_, Value::String(text)) => parse_value(ty, &text),
        (_, Value::Number(number)) => parse_value(ty, &number.to_string()),
        (_, other) => Err(CliError::usage(format!(
            "cannot use {other} as {ty} argument"
        ))),
    }
}

/// Render a decoded argument for output.
pub fn to_json(arg: &Arg) -> Value {
    match arg {
        Arg::Int(v) => json!(v),
        Arg::Uint(v) => json!(v),
        Arg::Fixed(v) => json!(v.to_f64()),
        Arg::String(v) => json!(v),
        Arg::Array(v) => json!(encode_hex(v)),
        Arg::NewId(v) => json!({ "interface": v.interface, "version": v.version }),
        Arg::Fd(fd) => json!({ "fd": fd.as_raw_fd() }),
        Arg::Sequence(items) => Value::Array(items.iter().map(to_json).collect()),
    }
}

/// Decode hex text. Whitespace is ignored; an optional `0x` prefix is allowed.
pub fn decode_hex(text: &str) -> CliResult<Vec<u8>> {
    let text = text.trim();
    let text = text.strip_prefix("0x").unwrap_or(text);
    let digits: Vec<u8> = text.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err(CliError::usage("hex input has an odd number of digits"));
    }
    digits
        .chunks(2)
        .map(|pair| {
            let high = hex_digit(pair[0])?;
            let low = hex_digit(pair[1])?;
            Ok((high << 4) | low)
        })
        .collect()
}

fn hex_digit(b: u8) -> CliResult<u8> {
    match b {
        b'0'..=b'9' => Ok(b - b'0'),
        b'a'..=b'f' => Ok(b - b'a' + 10),
        b'A'..=b'F' => Ok(b - b'A' + 10),
        other => Err(CliError::usage(format!(
            "invalid hex digit {:?}",
            other as char
        ))),
    }
}

pub fn encode_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(text: &str) -> Signature {
        text.parse().unwrap()
    }

    #[test]
    fn parses_scalars_in_signature_order() {
        let args = parse_args(
            &sig("iufsn"),
            &[
                "-4".into(),
                "7".into(),
                "1.5".into(),
                "hello".into(),
                "wl_surface:4".into(),
            ],
        )
        .unwrap();
        assert_eq!(
            args,
            vec![
                Arg::Int(-4),
                Arg::Uint(7),
                Arg::Fixed(Fixed::from_f64(1.5)),
                Arg::String("hello".into()),
                Arg::NewId(NewId::new("wl_surface", 4)),
            ]
        );
    }

    #[test]
    fn sequences_come_from_json() {
        let args = parse_args(&sig("[[u]]"), &["[[1, 2], [], [\"3\"]]".into()]).unwrap();
        assert_eq!(
            args,
            vec![Arg::Sequence(vec![
                Arg::Sequence(vec![Arg::Uint(1), Arg::Uint(2)]),
                Arg::Sequence(vec![]),
                Arg::Sequence(vec![Arg::Uint(3)]),
            ])]
        );
    }

    #[test]
    fn fd_argument_opens_path() {
        let args = parse_args(&sig("h"), &["/dev/null".into()]).unwrap();
        assert!(matches!(&args[0], Arg::Fd(_)));
    }

    #[test]
    fn argument_count_must_match() {
        let err = parse_args(&sig("ii"), &["1".into()]).unwrap_err();
        assert_eq!(err.code, crate::exit::USAGE);
    }

    #[test]
    fn rejects_out_of_range_and_malformed_values() {
        assert!(parse_value(&ArgType::Uint, "-1").is_err());
        assert!(parse_value(&ArgType::Int, "2147483648").is_err());
        assert!(parse_value(&ArgType::NewId, "wl_surface").is_err());
        assert!(parse_value(&ArgType::Array, "abc").is_err());
        assert!(parse_value(&ArgType::sequence_of(ArgType::Int), "{}").is_err());
    }

    #[test]
    fn hex_round_trip_ignores_spacing() {
        let bytes = decode_hex("0x01 00 00 00\n0c 00 00 00").unwrap();
        assert_eq!(bytes, vec![1, 0, 0, 0, 12, 0, 0, 0]);
        assert_eq!(encode_hex(&bytes), "010000000c000000");
    }

    #[test]
    fn renders_nested_values() {
        let arg = Arg::Sequence(vec![
            Arg::Fixed(Fixed::from_integer(2)),
            Arg::Fixed(Fixed::from_bits(0x180)),
        ]);
        assert_eq!(to_json(&arg), json!([2.0, 1.5]));
        assert_eq!(
            to_json(&Arg::NewId(NewId::new("wl_buffer", 1))),
            json!({ "interface": "wl_buffer", "version": 1 })
        );
    }
}
