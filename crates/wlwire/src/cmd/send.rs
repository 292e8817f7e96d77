use tracing::debug;
use wlwire_frame::{MessageWriter, Signature};
use wlwire_transport::WireListener;

use crate::cmd::{socket_path, Context, SendArgs};
use crate::exit::{codec_error, frame_error, signature_error, transport_error, CliResult, SUCCESS};
use crate::values::parse_args;

pub fn run(args: SendArgs, ctx: Context) -> CliResult<i32> {
    let signature: Signature = args.signature.parse().map_err(signature_error)?;
    let values = parse_args(&signature, &args.values)?;

    let path = socket_path(&args.path);
    let stream =
        WireListener::connect(&path).map_err(|err| transport_error("connect failed", err))?;
    let mut writer = MessageWriter::with_config_stream(stream, ctx.frame_config())
        .map_err(|err| frame_error("connect failed", err))?;

    let mut builder = writer.builder(args.sender, args.opcode);
    builder
        .put_args(&signature, values)
        .map_err(|err| codec_error("encode failed", err))?;
    let message = builder
        .finish()
        .map_err(|err| codec_error("encode failed", err))?;
    debug!(
        size = message.size(),
        fds = message.fds().len(),
        "sending message"
    );

    writer
        .send(message)
        .map_err(|err| frame_error("send failed", err))?;
    Ok(SUCCESS)
}
