use std::io::Read;

use bytes::BytesMut;
use wlwire_frame::{decode_message, FrameError};

use crate::cmd::{parse_signature, Context, DecodeArgs};
use crate::exit::{frame_error, io_error, CliResult, SUCCESS};
use crate::output::{print_report, report, MessageReport};
use crate::values::decode_hex;

pub fn run(args: DecodeArgs, ctx: Context) -> CliResult<i32> {
    let signature = parse_signature(args.signature.as_deref())?;
    let text = match args.hex {
        Some(text) => text,
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .map_err(|err| io_error("failed reading stdin", err))?;
            text
        }
    };

    let reports = decode_all(&decode_hex(&text)?, ctx, signature.as_ref())?;
    for report in &reports {
        print_report(report, ctx.format);
    }
    Ok(SUCCESS)
}

fn decode_all(
    bytes: &[u8],
    ctx: Context,
    signature: Option<&wlwire_frame::Signature>,
) -> CliResult<Vec<MessageReport>> {
    let mut buf = BytesMut::from(bytes);
    let mut reports = Vec::new();
    while !buf.is_empty() {
        let available = buf.len();
        let message = decode_message(&mut buf, ctx.byte_order)
            .map_err(|err| frame_error("decode failed", err))?
            .ok_or_else(|| {
                frame_error(
                    "decode failed",
                    FrameError::Truncated {
                        expected: declared_size(&buf, ctx),
                        received: available,
                    },
                )
            })?;
        reports.push(report(message, signature)?);
    }
    Ok(reports)
}

fn declared_size(buf: &[u8], ctx: Context) -> usize {
    match buf.get(4..8) {
        Some(word) => {
            let word = ctx
                .byte_order
                .u32_from_bytes([word[0], word[1], word[2], word[3]]);
            wlwire_frame::unpack_header_word(word).0 as usize
        }
        None => wlwire_frame::HEADER_SIZE,
    }
}

#[cfg(test)]
mod tests {
    use wlwire_frame::{ByteOrder, Signature};

    use super::*;
    use crate::exit::DATA_INVALID;
    use crate::output::OutputFormat;

    fn ctx(order: ByteOrder) -> Context {
        Context {
            format: OutputFormat::Json,
            byte_order: order,
        }
    }

    #[test]
    fn decodes_back_to_back_messages() {
        let hex = "01000000 00000c00 05000000 02000000 01000800";
        let bytes = decode_hex(hex).unwrap();
        let signature: Signature = "u".parse().unwrap();

        let err = decode_all(&bytes, ctx(ByteOrder::Little), Some(&signature)).unwrap_err();
        assert_eq!(err.code, DATA_INVALID);

        let reports = decode_all(&bytes, ctx(ByteOrder::Little), None).unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!((reports[0].sender, reports[0].size), (1, 12));
        assert_eq!((reports[1].sender, reports[1].opcode), (2, 1));
    }

    #[test]
    fn incomplete_input_is_truncated() {
        let bytes = decode_hex("01000000 00001000 05000000").unwrap();
        let err = decode_all(&bytes, ctx(ByteOrder::Little), None).unwrap_err();
        assert_eq!(err.code, DATA_INVALID);
        assert!(err.message.contains("12 of 16"));
    }

    #[test]
    fn big_endian_input() {
        let bytes = decode_hex("00000007 000c0003 ffffffff").unwrap();
        let signature: Signature = "i".parse().unwrap();
        let reports = decode_all(&bytes, ctx(ByteOrder::Big), Some(&signature)).unwrap();
        assert_eq!((reports[0].sender, reports[0].opcode), (7, 3));
        assert_eq!(reports[0].args.as_ref().unwrap()[0].value, serde_json::json!(-1));
    }
}
