use std::fs;

use framelink_conn::uds;
use framelink_frame::Message;
use framelink_transport::{Context, Transport};

use crate::cmd::SendArgs;
use crate::exit::{conn_error, io_error, transport_error, CliError, CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = resolve_payload(&args)?;

    let conn = uds::connect_with_config(&args.path, args.conn.config())
        .map_err(|err| conn_error("connect failed", err))?;
    let transport =
        Transport::new(conn).map_err(|err| transport_error("connection setup failed", err))?;

    transport
        .send(&Context::background(), &args.msg_type, &payload)
        .map_err(|err| transport_error("send failed", err))?;
    tracing::debug!(msg_type = %args.msg_type, size = payload.len(), "message sent");

    let reply = if args.wait {
        Some(await_reply(&transport, &args)?)
    } else {
        None
    };

    if let Err(err) = transport.close() {
        tracing::debug!(error = %err, "close failed");
    }

    if let Some(reply) = reply {
        print_message(&reply, 1, format);
    }
    Ok(SUCCESS)
}

fn await_reply(transport: &Transport, args: &SendArgs) -> CliResult<Message> {
    transport
        .receive(&Context::with_timeout(args.wait_timeout))
        .map_err(|err| transport_error("receive failed", err))
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::usage(format!("--json is not valid JSON: {err}")))?;
        return Ok(json.as_bytes().to_vec());
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}
