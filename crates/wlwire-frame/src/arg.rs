//! Wire argument types and the type-directed codec.
//!
//! Two ways in:
//! - [`WireArg`] picks the rule at compile time from the Rust type
//!   (`msg.decode::<String>()`), for code that knows its schema.
//! - [`ArgType`] / [`Arg`] pick it at run time from a tag, for generic tools
//!   driven by a [`Signature`](crate::Signature).
//!
//! Both paths share the primitives on [`Message`] and [`MessageBuilder`], so
//! padding and byte order are identical.

use std::fmt;
use std::os::fd::{AsRawFd, OwnedFd};

use bytes::Bytes;
use tracing::error;

use crate::builder::MessageBuilder;
use crate::error::CodecError;
use crate::fixed::Fixed;
use crate::message::Message;

/// Interface name and version naming a newly created object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NewId {
    pub interface: String,
    pub version: u32,
}

impl NewId {
    pub fn new(interface: impl Into<String>, version: u32) -> Self {
        Self {
            interface: interface.into(),
            version,
        }
    }
}

/// The closed set of wire types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArgType {
    Int,
    Uint,
    Fixed,
    String,
    Array,
    NewId,
    Fd,
    Sequence(Box<ArgType>),
}

impl ArgType {
    pub fn sequence_of(element: ArgType) -> Self {
        ArgType::Sequence(Box::new(element))
    }

    /// Signature character, or `None` for sequences (which use brackets).
    pub fn code(&self) -> Option<char> {
        match self {
            ArgType::Int => Some('i'),
            ArgType::Uint => Some('u'),
            ArgType::Fixed => Some('f'),
            ArgType::String => Some('s'),
            ArgType::Array => Some('a'),
            ArgType::NewId => Some('n'),
            ArgType::Fd => Some('h'),
            ArgType::Sequence(_) => None,
        }
    }

    pub fn from_code(ch: char) -> Option<Self> {
        match ch {
            'i' => Some(ArgType::Int),
            'u' => Some(ArgType::Uint),
            'f' => Some(ArgType::Fixed),
            's' => Some(ArgType::String),
            'a' => Some(ArgType::Array),
            'n' => Some(ArgType::NewId),
            'h' => Some(ArgType::Fd),
            _ => None,
        }
    }
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgType::Sequence(element) => write!(f, "[{element}]"),
            other => match other.code() {
                Some(code) => write!(f, "{code}"),
                None => Ok(()),
            },
        }
    }
}

/// A decoded argument, or one waiting to be encoded.
#[derive(Debug)]
pub enum Arg {
    Int(i32),
    Uint(u32),
    Fixed(Fixed),
    String(String),
    Array(Bytes),
    NewId(NewId),
    Fd(OwnedFd),
    Sequence(Vec<Arg>),
}

impl Arg {
    /// Short name of the variant, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Arg::Int(_) => "int",
            Arg::Uint(_) => "uint",
            Arg::Fixed(_) => "fixed",
            Arg::String(_) => "string",
            Arg::Array(_) => "array",
            Arg::NewId(_) => "new_id",
            Arg::Fd(_) => "fd",
            Arg::Sequence(_) => "sequence",
        }
    }

    /// Whether this value can be encoded as `ty`. An empty sequence conforms
    /// to every sequence type.
    pub fn conforms_to(&self, ty: &ArgType) -> bool {
        match (self, ty) {
            (Arg::Int(_), ArgType::Int)
            | (Arg::Uint(_), ArgType::Uint)
            | (Arg::Fixed(_), ArgType::Fixed)
            | (Arg::String(_), ArgType::String)
            | (Arg::Array(_), ArgType::Array)
            | (Arg::NewId(_), ArgType::NewId)
            | (Arg::Fd(_), ArgType::Fd) => true,
            (Arg::Sequence(items), ArgType::Sequence(element)) => {
                items.iter().all(|item| item.conforms_to(element))
            }
            _ => false,
        }
    }

    /// Decode one argument of type `ty` from `msg`.
    pub fn decode(msg: &mut Message, ty: &ArgType) -> Result<Arg, CodecError> {
        Ok(match ty {
            ArgType::Int => Arg::Int(msg.read_i32()?),
            ArgType::Uint => Arg::Uint(msg.read_u32()?),
            ArgType::Fixed => Arg::Fixed(msg.read_fixed()?),
            ArgType::String => Arg::String(msg.read_string()?),
            ArgType::Array => Arg::Array(msg.read_array()?),
            ArgType::NewId => Arg::NewId(NewId::decode(msg)?),
            ArgType::Fd => Arg::Fd(msg.take_fd()?),
            ArgType::Sequence(element) => {
                let count = msg.read_u32()? as usize;
                let mut items = Vec::with_capacity(count.min(msg.remaining() + msg.remaining_fds()));
                for _ in 0..count {
                    items.push(Arg::decode(msg, element)?);
                }
                Arg::Sequence(items)
            }
        })
    }

    /// Encode this argument into `out`.
    ///
    /// Sequences must be homogeneous at every depth; a mixed sequence is a
    /// type-contract violation and is rejected before anything is written.
    pub fn encode(self, out: &mut MessageBuilder) -> Result<(), CodecError> {
        if let Arg::Sequence(_) = self {
            Shape::of(&self)?;
        }
        self.write(out)
    }

    fn write(self, out: &mut MessageBuilder) -> Result<(), CodecError> {
        match self {
            Arg::Int(v) => out.put_i32(v),
            Arg::Uint(v) => out.put_u32(v),
            Arg::Fixed(v) => out.put_fixed(v),
            Arg::String(v) => out.put_string(&v)?,
            Arg::Array(v) => out.put_array(&v)?,
            Arg::NewId(v) => v.encode(out)?,
            Arg::Fd(fd) => out.push_fd(fd),
            Arg::Sequence(items) => {
                out.put_count(items.len())?;
                for item in items {
                    item.write(out)?;
                }
            }
        }
        Ok(())
    }

    /// Encode as the declared type, rejecting values that do not conform.
    pub fn encode_as(self, ty: &ArgType, out: &mut MessageBuilder) -> Result<(), CodecError> {
        if !self.conforms_to(ty) {
            return Err(type_contract(ty, &self));
        }
        self.write(out)
    }
}

impl PartialEq for Arg {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Arg::Int(a), Arg::Int(b)) => a == b,
            (Arg::Uint(a), Arg::Uint(b)) => a == b,
            (Arg::Fixed(a), Arg::Fixed(b)) => a == b,
            (Arg::String(a), Arg::String(b)) => a == b,
            (Arg::Array(a), Arg::Array(b)) => a == b,
            (Arg::NewId(a), Arg::NewId(b)) => a == b,
            (Arg::Fd(a), Arg::Fd(b)) => a.as_raw_fd() == b.as_raw_fd(),
            (Arg::Sequence(a), Arg::Sequence(b)) => a == b,
            _ => false,
        }
    }
}

/// The type a value tree pins down. Only empty sequences leave their element
/// open (`Sequence(None)`), and an open element unifies with anything.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Shape {
    Scalar(&'static str),
    Sequence(Option<Box<Shape>>),
}

impl Shape {
    fn of(arg: &Arg) -> Result<Shape, CodecError> {
        let Arg::Sequence(items) = arg else {
            return Ok(Shape::Scalar(arg.kind_name()));
        };
        let mut element: Option<Shape> = None;
        for item in items {
            let shape = Shape::of(item)?;
            element = Some(match element {
                None => shape,
                Some(known) => match known.clone().unify(shape) {
                    Some(merged) => merged,
                    None => return Err(type_contract(known, item)),
                },
            });
        }
        Ok(Shape::Sequence(element.map(Box::new)))
    }

    fn unify(self, other: Shape) -> Option<Shape> {
        match (self, other) {
            (Shape::Scalar(a), Shape::Scalar(b)) => (a == b).then_some(Shape::Scalar(a)),
            (Shape::Sequence(None), open @ Shape::Sequence(_))
            | (open @ Shape::Sequence(_), Shape::Sequence(None)) => Some(open),
            (Shape::Sequence(Some(a)), Shape::Sequence(Some(b))) => {
                a.unify(*b).map(|merged| Shape::Sequence(Some(Box::new(merged))))
            }
            _ => None,
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Scalar(kind) => f.write_str(kind),
            Shape::Sequence(Some(element)) => write!(f, "[{element}]"),
            Shape::Sequence(None) => f.write_str("[]"),
        }
    }
}

pub(crate) fn type_contract(expected: impl fmt::Display, found: &Arg) -> CodecError {
    let expected = expected.to_string();
    error!(%expected, found = found.kind_name(), "argument type contract violated");
    CodecError::TypeContract {
        expected,
        found: found.kind_name().to_string(),
    }
}

/// A Rust type with a fixed wire representation.
pub trait WireArg: Sized {
    /// The runtime tag this type encodes as.
    fn wire_type() -> ArgType;

    fn decode(msg: &mut Message) -> Result<Self, CodecError>;

    fn encode(self, out: &mut MessageBuilder) -> Result<(), CodecError>;
}

impl WireArg for i32 {
    fn wire_type() -> ArgType {
        ArgType::Int
    }

    fn decode(msg: &mut Message) -> Result<Self, CodecError> {
        msg.read_i32()
    }

    fn encode(self, out: &mut MessageBuilder) -> Result<(), CodecError> {
        out.put_i32(self);
        Ok(())
    }
}

impl WireArg for u32 {
    fn wire_type() -> ArgType {
        ArgType::Uint
    }

    fn decode(msg: &mut Message) -> Result<Self, CodecError> {
        msg.read_u32()
    }

    fn encode(self, out: &mut MessageBuilder) -> Result<(), CodecError> {
        out.put_u32(self);
        Ok(())
    }
}

impl WireArg for Fixed {
    fn wire_type() -> ArgType {
        ArgType::Fixed
    }

    fn decode(msg: &mut Message) -> Result<Self, CodecError> {
        msg.read_fixed()
    }

    fn encode(self, out: &mut MessageBuilder) -> Result<(), CodecError> {
        out.put_fixed(self);
        Ok(())
    }
}

impl WireArg for String {
    fn wire_type() -> ArgType {
        ArgType::String
    }

    fn decode(msg: &mut Message) -> Result<Self, CodecError> {
        msg.read_string()
    }

    fn encode(self, out: &mut MessageBuilder) -> Result<(), CodecError> {
        out.put_string(&self)
    }
}

impl WireArg for Bytes {
    fn wire_type() -> ArgType {
        ArgType::Array
    }

    fn decode(msg: &mut Message) -> Result<Self, CodecError> {
        msg.read_array()
    }

    fn encode(self, out: &mut MessageBuilder) -> Result<(), CodecError> {
        out.put_array(&self)
    }
}

impl WireArg for NewId {
    fn wire_type() -> ArgType {
        ArgType::NewId
    }

    fn decode(msg: &mut Message) -> Result<Self, CodecError> {
        let interface = msg.read_string()?;
        let version = msg.read_u32()?;
        Ok(Self { interface, version })
    }

    fn encode(self, out: &mut MessageBuilder) -> Result<(), CodecError> {
        out.put_string(&self.interface)?;
        out.put_u32(self.version);
        Ok(())
    }
}

impl WireArg for OwnedFd {
    fn wire_type() -> ArgType {
        ArgType::Fd
    }

    fn decode(msg: &mut Message) -> Result<Self, CodecError> {
        msg.take_fd()
    }

    fn encode(self, out: &mut MessageBuilder) -> Result<(), CodecError> {
        out.push_fd(self);
        Ok(())
    }
}

impl<T: WireArg> WireArg for Vec<T> {
    fn wire_type() -> ArgType {
        ArgType::sequence_of(T::wire_type())
    }

    fn decode(msg: &mut Message) -> Result<Self, CodecError> {
        let count = msg.read_u32()? as usize;
        let mut items = Vec::with_capacity(count.min(msg.remaining() + msg.remaining_fds()));
        for _ in 0..count {
            items.push(T::decode(msg)?);
        }
        Ok(items)
    }

    fn encode(self, out: &mut MessageBuilder) -> Result<(), CodecError> {
        out.put_count(self.len())?;
        for item in self {
            item.encode(out)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;

    use super::*;
    use crate::order::ByteOrder;
    use crate::signature::Signature;

    fn null_fd() -> OwnedFd {
        File::open("/dev/null").unwrap().into()
    }

    fn round_trip<T: WireArg>(value: T, order: ByteOrder) -> T {
        let mut builder = MessageBuilder::with_order(1, 0, order);
        builder.put(value).unwrap();
        let mut msg = builder.finish().unwrap().into_message();
        let decoded = msg.decode::<T>().unwrap();
        msg.finish().unwrap();
        decoded
    }

    #[test]
    fn typed_values_round_trip_in_both_orders() {
        for order in [ByteOrder::Little, ByteOrder::Big] {
            assert_eq!(round_trip(-123_456i32, order), -123_456);
            assert_eq!(round_trip(u32::MAX, order), u32::MAX);
            assert_eq!(round_trip(Fixed::from_f64(12.75), order), Fixed::from_f64(12.75));
            assert_eq!(round_trip(String::new(), order), "");
            assert_eq!(round_trip("wl_surface".to_string(), order), "wl_surface");
            assert_eq!(round_trip("héllo ✓".to_string(), order), "héllo ✓");
            assert_eq!(
                round_trip(Bytes::from_static(&[1, 2, 3, 4, 5]), order).as_ref(),
                &[1, 2, 3, 4, 5]
            );
            assert_eq!(
                round_trip(NewId::new("wl_seat", 7), order),
                NewId::new("wl_seat", 7)
            );
            assert_eq!(
                round_trip(vec![vec![1u32, 2], vec![], vec![3]], order),
                vec![vec![1, 2], vec![], vec![3]]
            );
        }
    }

    #[test]
    fn new_id_has_no_padding_between_fields() {
        let mut builder = MessageBuilder::with_order(1, 0, ByteOrder::Little);
        builder.put(NewId::new("abc", 2)).unwrap();
        let msg = builder.finish().unwrap();
        assert_eq!(msg.payload(), &[4, 0, 0, 0, b'a', b'b', b'c', 0, 2, 0, 0, 0]);
    }

    #[test]
    fn empty_sequence_consumes_four_bytes() {
        let mut builder = MessageBuilder::with_order(1, 0, ByteOrder::Little);
        builder.put(Vec::<String>::new()).unwrap();
        builder.put(77u32).unwrap();
        let mut msg = builder.finish().unwrap().into_message();

        let before = msg.remaining();
        let items = msg.decode_arg(&ArgType::sequence_of(ArgType::String)).unwrap();
        assert_eq!(items, Arg::Sequence(Vec::new()));
        assert_eq!(before - msg.remaining(), 4);
        assert_eq!(msg.decode::<u32>().unwrap(), 77);
    }

    #[test]
    fn descriptor_arguments_follow_declared_order() {
        let first = null_fd();
        let second = null_fd();
        let (a, b) = (first.as_raw_fd(), second.as_raw_fd());

        let mut builder = MessageBuilder::new(1, 0);
        builder.put(first).unwrap().put(second).unwrap();
        let mut msg = builder.finish().unwrap().into_message();
        assert_eq!(msg.remaining(), 0);

        assert_eq!(msg.decode::<OwnedFd>().unwrap().as_raw_fd(), a);
        assert_eq!(msg.decode::<OwnedFd>().unwrap().as_raw_fd(), b);
        assert_eq!(
            msg.decode::<OwnedFd>().unwrap_err(),
            CodecError::DescriptorUnderflow { index: 2 }
        );
    }

    #[test]
    fn sequence_of_descriptors() {
        let mut builder = MessageBuilder::new(1, 0);
        builder.put(vec![null_fd(), null_fd(), null_fd()]).unwrap();
        let mut msg = builder.finish().unwrap().into_message();

        let fds = msg.decode::<Vec<OwnedFd>>().unwrap();
        assert_eq!(fds.len(), 3);
        assert_eq!(msg.remaining_fds(), 0);
    }

    #[test]
    fn sequence_count_beyond_descriptors_underflows() {
        let mut builder = MessageBuilder::new(1, 0);
        builder.put_count(1_000_000).unwrap();
        builder.push_fd(null_fd());
        let mut msg = builder.finish().unwrap().into_message();

        assert!(matches!(
            msg.decode::<Vec<OwnedFd>>(),
            Err(CodecError::DescriptorUnderflow { index: 1 })
        ));
    }

    #[test]
    fn sequence_count_beyond_payload_is_truncated() {
        let mut builder = MessageBuilder::new(1, 0);
        builder.put_count(1_000_000).unwrap();
        let mut msg = builder.finish().unwrap().into_message();

        assert!(matches!(
            msg.decode::<Vec<u32>>(),
            Err(CodecError::Truncated { .. })
        ));
    }

    fn sample_args() -> Vec<Arg> {
        vec![
            Arg::Int(-1),
            Arg::Uint(2),
            Arg::Fixed(Fixed::from_integer(3)),
            Arg::String("four".into()),
            Arg::Array(Bytes::from_static(b"\x05\x05")),
            Arg::NewId(NewId::new("wl_output", 4)),
            Arg::Sequence(vec![Arg::String("a".into()), Arg::String("bb".into())]),
            Arg::Sequence(vec![
                Arg::Sequence(vec![Arg::Int(1)]),
                Arg::Sequence(Vec::new()),
            ]),
        ]
    }

    #[test]
    fn runtime_args_round_trip_by_signature() {
        let signature: Signature = "iufsan[s][[i]]".parse().unwrap();

        for order in [ByteOrder::Little, ByteOrder::Big] {
            let mut builder = MessageBuilder::with_order(9, 1, order);
            builder.put_args(&signature, sample_args()).unwrap();
            let mut msg = builder.finish().unwrap().into_message();

            assert_eq!(msg.decode_args(&signature).unwrap(), sample_args());
            msg.finish().unwrap();
        }
    }

    #[test]
    fn runtime_fd_argument_round_trips() {
        let fd = null_fd();
        let raw = fd.as_raw_fd();
        let signature: Signature = "uh".parse().unwrap();

        let mut builder = MessageBuilder::new(1, 0);
        builder
            .put_args(&signature, vec![Arg::Uint(5), Arg::Fd(fd)])
            .unwrap();
        let mut msg = builder.finish().unwrap().into_message();

        let decoded = msg.decode_args(&signature).unwrap();
        assert_eq!(decoded[0], Arg::Uint(5));
        assert!(matches!(&decoded[1], Arg::Fd(fd) if fd.as_raw_fd() == raw));
    }

    #[test]
    fn mismatched_argument_is_a_type_contract_violation() {
        let signature: Signature = "u".parse().unwrap();
        let mut builder = MessageBuilder::new(1, 0);
        let err = builder
            .put_args(&signature, vec![Arg::String("nope".into())])
            .unwrap_err();
        assert!(err.is_type_contract());
        assert_eq!(builder.payload_len(), 0);
    }

    #[test]
    fn argument_count_mismatch_is_a_type_contract_violation() {
        let signature: Signature = "uu".parse().unwrap();
        let mut builder = MessageBuilder::new(1, 0);
        let err = builder.put_args(&signature, vec![Arg::Uint(1)]).unwrap_err();
        assert!(err.is_type_contract());
    }

    #[test]
    fn heterogeneous_sequence_is_rejected() {
        let mut builder = MessageBuilder::new(1, 0);
        let err = builder
            .put_arg(Arg::Sequence(vec![Arg::Int(1), Arg::String("x".into())]))
            .unwrap_err();
        assert!(err.is_type_contract());

        let err = builder
            .put_arg(Arg::Sequence(vec![
                Arg::Sequence(vec![Arg::Int(1)]),
                Arg::Sequence(vec![Arg::Uint(1)]),
            ]))
            .unwrap_err();
        assert!(err.is_type_contract());
    }

    #[test]
    fn empty_inner_sequence_does_not_hide_mixed_siblings() {
        let mut builder = MessageBuilder::new(1, 0);
        let err = builder
            .put_arg(Arg::Sequence(vec![
                Arg::Sequence(Vec::new()),
                Arg::Sequence(vec![Arg::Int(1)]),
                Arg::Sequence(vec![Arg::String("x".into())]),
            ]))
            .unwrap_err();
        assert!(err.is_type_contract());
        assert_eq!(builder.payload_len(), 0);

        builder
            .put_arg(Arg::Sequence(vec![
                Arg::Sequence(Vec::new()),
                Arg::Sequence(vec![Arg::Int(1)]),
                Arg::Sequence(vec![Arg::Int(2), Arg::Int(3)]),
            ]))
            .unwrap();
        let mut msg = builder.finish().unwrap().into_message();
        let decoded = msg.decode::<Vec<Vec<i32>>>().unwrap();
        assert_eq!(decoded, vec![vec![], vec![1], vec![2, 3]]);
    }

    #[test]
    fn mixed_inner_sequence_leaves_builder_untouched() {
        let mut builder = MessageBuilder::new(1, 0);
        builder.put(7u32).unwrap();
        let err = builder
            .put_arg(Arg::Sequence(vec![Arg::Sequence(vec![
                Arg::Int(1),
                Arg::String("x".into()),
            ])]))
            .unwrap_err();
        assert!(err.is_type_contract());
        assert_eq!(builder.payload_len(), 4);
    }

    #[test]
    fn later_mismatched_argument_writes_nothing() {
        let signature: Signature = "uuh".parse().unwrap();
        let mut builder = MessageBuilder::new(1, 0);
        let err = builder
            .put_args(&signature, vec![Arg::Uint(1), Arg::Int(2), Arg::Fd(null_fd())])
            .unwrap_err();
        assert!(err.is_type_contract());
        assert_eq!(builder.payload_len(), 0);

        let message = builder.finish().unwrap();
        assert_eq!(message.fds().len(), 0);
    }

    #[test]
    fn rejected_sequence_queues_no_descriptors() {
        let mut builder = MessageBuilder::new(1, 0);
        let err = builder
            .put_arg(Arg::Sequence(vec![
                Arg::Sequence(vec![Arg::Fd(null_fd())]),
                Arg::Sequence(vec![Arg::Uint(1)]),
            ]))
            .unwrap_err();
        assert!(err.is_type_contract());
        assert_eq!(builder.payload_len(), 0);
        assert_eq!(builder.finish().unwrap().fds().len(), 0);
    }

    #[test]
    fn conformance_rules() {
        let seq = ArgType::sequence_of(ArgType::Int);
        assert!(Arg::Sequence(Vec::new()).conforms_to(&seq));
        assert!(Arg::Sequence(vec![Arg::Int(1)]).conforms_to(&seq));
        assert!(!Arg::Sequence(vec![Arg::Uint(1)]).conforms_to(&seq));
        assert!(!Arg::Int(1).conforms_to(&ArgType::Uint));
    }

    #[test]
    fn wire_types_of_rust_types() {
        assert_eq!(<Vec<Vec<String>>>::wire_type().to_string(), "[[s]]");
        assert_eq!(OwnedFd::wire_type(), ArgType::Fd);
        assert_eq!(Bytes::wire_type(), ArgType::Array);
    }
}
