use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};
use wlwire_frame::{FrameError, MessageReader};
use wlwire_transport::WireListener;

use crate::cmd::{parse_signature, socket_path, Context, ListenArgs};
use crate::exit::{frame_error, transport_error, CliError, CliResult, SUCCESS};
use crate::output::{print_report, report};

pub fn run(args: ListenArgs, ctx: Context) -> CliResult<i32> {
    let signature = parse_signature(args.signature.as_deref())?;
    let path = socket_path(&args.path);
    let listener =
        WireListener::bind(&path).map_err(|err| transport_error("bind failed", err))?;
    info!(path = %listener.path().display(), "listening");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        let stream = listener
            .accept()
            .map_err(|err| transport_error("accept failed", err))?;
        let mut reader = MessageReader::with_config_stream(stream, ctx.frame_config())
            .map_err(|err| frame_error("accept failed", err))?;

        while running.load(Ordering::SeqCst) {
            let message = match reader.read_message() {
                Ok(message) => message,
                Err(FrameError::ConnectionClosed) => break,
                Err(err) => return Err(frame_error("receive failed", err)),
            };

            match report(message, signature.as_ref()) {
                Ok(report) => print_report(&report, ctx.format),
                Err(err) => {
                    warn!(%err, "message skipped");
                    continue;
                }
            }
            printed = printed.saturating_add(1);

            if let Some(count) = args.count {
                if printed >= count {
                    return Ok(SUCCESS);
                }
            }
        }
    }

    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
