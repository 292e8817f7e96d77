//! Compact argument signatures.
//!
//! One character per wire type, brackets for sequences:
//!
//! | code | type                 |
//! |------|----------------------|
//! | `i`  | signed 32-bit        |
//! | `u`  | unsigned 32-bit      |
//! | `f`  | 24.8 fixed           |
//! | `s`  | string               |
//! | `a`  | opaque byte array    |
//! | `n`  | new id (name + ver.) |
//! | `h`  | file descriptor      |
//! | `[T]`| sequence of `T`      |

use std::fmt;
use std::str::FromStr;

use crate::arg::ArgType;
use crate::error::SignatureError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Signature(Vec<ArgType>);

impl Signature {
    pub fn new(types: Vec<ArgType>) -> Self {
        Self(types)
    }

    pub fn types(&self) -> &[ArgType] {
        &self.0
    }

    pub fn into_types(self) -> Vec<ArgType> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of descriptor arguments, counting only top-level `h`.
    pub fn fd_count(&self) -> usize {
        self.0.iter().filter(|ty| **ty == ArgType::Fd).count()
    }
}

impl FromStr for Signature {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let chars: Vec<char> = s.chars().collect();
        let mut pos = 0usize;
        let mut types = Vec::new();
        while pos < chars.len() {
            types.push(parse_type(&chars, &mut pos)?);
        }
        Ok(Self(types))
    }
}

fn parse_type(chars: &[char], pos: &mut usize) -> Result<ArgType, SignatureError> {
    let start = *pos;
    let ch = chars[start];
    *pos += 1;

    match ch {
        '[' => {
            match chars.get(*pos) {
                None => return Err(SignatureError::Unbalanced { position: start }),
                Some(']') => return Err(SignatureError::EmptySequence { position: start }),
                Some(_) => {}
            }
            let element = parse_type(chars, pos)?;
            match chars.get(*pos) {
                Some(']') => {
                    *pos += 1;
                    Ok(ArgType::sequence_of(element))
                }
                _ => Err(SignatureError::Unbalanced { position: start }),
            }
        }
        ']' => Err(SignatureError::Unbalanced { position: start }),
        other => ArgType::from_code(other).ok_or(SignatureError::UnknownType {
            ch: other,
            position: start,
        }),
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for ty in &self.0 {
            write!(f, "{ty}")?;
        }
        Ok(())
    }
}

impl From<Vec<ArgType>> for Signature {
    fn from(types: Vec<ArgType>) -> Self {
        Self(types)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scalars() {
        let sig: Signature = "iufsanh".parse().unwrap();
        assert_eq!(
            sig.types(),
            &[
                ArgType::Int,
                ArgType::Uint,
                ArgType::Fixed,
                ArgType::String,
                ArgType::Array,
                ArgType::NewId,
                ArgType::Fd,
            ]
        );
        assert_eq!(sig.fd_count(), 1);
    }

    #[test]
    fn parses_nested_sequences() {
        let sig: Signature = "u[[s]]h".parse().unwrap();
        assert_eq!(
            sig.types()[1],
            ArgType::sequence_of(ArgType::sequence_of(ArgType::String))
        );
        assert_eq!(sig.len(), 3);
    }

    #[test]
    fn display_round_trips() {
        for text in ["", "i", "[h]", "sn[[u]]f"] {
            let sig: Signature = text.parse().unwrap();
            assert_eq!(sig.to_string(), text);
        }
    }

    #[test]
    fn rejects_unknown_type() {
        assert_eq!(
            "ux".parse::<Signature>(),
            Err(SignatureError::UnknownType { ch: 'x', position: 1 })
        );
    }

    #[test]
    fn rejects_unbalanced_brackets() {
        assert!(matches!(
            "[u".parse::<Signature>(),
            Err(SignatureError::Unbalanced { position: 0 })
        ));
        assert!(matches!(
            "u]".parse::<Signature>(),
            Err(SignatureError::Unbalanced { position: 1 })
        ));
        assert!(matches!(
            "[".parse::<Signature>(),
            Err(SignatureError::Unbalanced { position: 0 })
        ));
    }

    #[test]
    fn rejects_empty_sequence() {
        assert_eq!(
            "u[]".parse::<Signature>(),
            Err(SignatureError::EmptySequence { position: 1 })
        );
    }
}
