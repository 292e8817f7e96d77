use clap::{Args, Subcommand};
use std::path::PathBuf;

use wlwire_frame::{ByteOrder, FrameConfig, Signature};

use crate::exit::{signature_error, CliResult};
use crate::output::OutputFormat;

pub mod decode;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Bind a socket and print every message received.
    Listen(ListenArgs),
    /// Encode and send a single message.
    Send(SendArgs),
    /// Decode hex-encoded messages without a socket.
    Decode(DecodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

/// Settings shared by every subcommand.
#[derive(Debug, Clone, Copy)]
pub struct Context {
    pub format: OutputFormat,
    pub byte_order: ByteOrder,
}

impl Context {
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig::with_byte_order(self.byte_order)
    }
}

pub fn run(command: Command, ctx: Context) -> CliResult<i32> {
    match command {
        Command::Listen(args) => listen::run(args, ctx),
        Command::Send(args) => send::run(args, ctx),
        Command::Decode(args) => decode::run(args, ctx),
        Command::Version(args) => version::run(args),
    }
}

pub(crate) fn parse_signature(text: Option<&str>) -> CliResult<Option<Signature>> {
    text.map(|s| s.parse().map_err(signature_error)).transpose()
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Socket path to bind. A bare name is placed in $XDG_RUNTIME_DIR.
    pub path: PathBuf,
    /// Argument signature used to decode every message (e.g. "ush[u]").
    #[arg(long, short = 's')]
    pub signature: Option<String>,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Socket path to connect to. A bare name is looked up in $XDG_RUNTIME_DIR.
    pub path: PathBuf,
    /// Object id of the sender.
    #[arg(long)]
    pub sender: u32,
    /// Request or event number.
    #[arg(long, default_value = "0")]
    pub opcode: u16,
    /// Argument signature (e.g. "usn"). Default: no arguments.
    #[arg(long, short = 's', default_value = "")]
    pub signature: String,
    /// One value per signature entry.
    #[arg(allow_hyphen_values = true, allow_negative_numbers = true)]
    pub values: Vec<String>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Hex-encoded messages, header included. Read from stdin when omitted.
    pub hex: Option<String>,
    /// Argument signature used to decode every message.
    #[arg(long, short = 's')]
    pub signature: Option<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Resolve a socket argument the way Wayland clients resolve a display name.
pub(crate) fn socket_path(path: &std::path::Path) -> PathBuf {
    if path.is_absolute() || path.components().count() > 1 {
        return path.to_path_buf();
    }
    match std::env::var_os("XDG_RUNTIME_DIR") {
        Some(dir) => wlwire_transport::resolve_socket_path(path, dir),
        None => path.to_path_buf(),
    }
}
