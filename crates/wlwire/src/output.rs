use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::Value;
use wlwire_frame::{Message, Signature};

use crate::exit::{codec_error, CliResult};
use crate::values::{encode_hex, to_json};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize, Debug)]
pub struct MessageReport {
    pub sender: u32,
    pub opcode: u16,
    pub size: u16,
    pub byte_order: String,
    pub fds: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<ArgReport>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct ArgReport {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: Value,
}

/// Decode a message for display. Without a signature the payload is shown
/// as hex and any descriptors are closed unread.
pub fn report(mut message: Message, signature: Option<&Signature>) -> CliResult<MessageReport> {
    let mut report = MessageReport {
        sender: message.sender(),
        opcode: message.opcode(),
        size: message.size(),
        byte_order: message.byte_order().to_string(),
        fds: message.remaining_fds(),
        signature: signature.map(ToString::to_string),
        args: None,
        payload: None,
    };

    let Some(signature) = signature else {
        report.payload = Some(encode_hex(message.remaining_bytes()));
        drop(message.take_remaining_fds());
        return Ok(report);
    };

    let args = message
        .decode_args(signature)
        .map_err(|err| codec_error("decode failed", err))?;
    message
        .finish()
        .map_err(|err| codec_error("decode failed", err))?;
    report.args = Some(
        signature
            .types()
            .iter()
            .zip(&args)
            .map(|(ty, arg)| ArgReport {
                kind: ty.to_string(),
                value: to_json(arg),
            })
            .collect(),
    );
    Ok(report)
}

pub fn print_report(report: &MessageReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SENDER", "OPCODE", "SIZE", "FDS", "CONTENTS"])
                .add_row(vec![
                    report.sender.to_string(),
                    report.opcode.to_string(),
                    report.size.to_string(),
                    report.fds.to_string(),
                    contents(report, "\n"),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "sender={} opcode={} size={} fds={} {}",
                report.sender,
                report.opcode,
                report.size,
                report.fds,
                contents(report, " ")
            );
        }
    }
}

fn contents(report: &MessageReport, separator: &str) -> String {
    match (&report.args, &report.payload) {
        (Some(args), _) => args
            .iter()
            .map(|arg| format!("{}={}", arg.kind, arg.value))
            .collect::<Vec<_>>()
            .join(separator),
        (None, Some(payload)) if !payload.is_empty() => format!("payload={payload}"),
        _ => "<empty>".to_string(),
    }
}
