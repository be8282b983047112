use std::sync::Arc;

use framelink_frame::Message;
use framelink_transport::{Context, Transport, TransportError};

use crate::cmd::{bind, ListenArgs, Shutdown};
use crate::exit::{conn_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let listener = bind(&args.path, &args.conn)?;
    let shutdown = Shutdown::install(&args.path)?;

    let mut printed = 0usize;
    let mut connection = 0u64;

    while !shutdown.requested() {
        let conn = listener
            .accept()
            .map_err(|err| conn_error("accept failed", err))?;
        if shutdown.requested() {
            break;
        }
        connection += 1;
        tracing::info!(connection, "connection accepted");

        let transport = Arc::new(
            Transport::new(conn).map_err(|err| transport_error("connection setup failed", err))?,
        );
        if !shutdown.track(Arc::clone(&transport)) {
            break;
        }

        loop {
            let message = match transport.receive(&Context::background()) {
                Ok(message) => message,
                Err(TransportError::Frame(err)) => {
                    tracing::warn!(connection, error = %err, "dropping undecodable message");
                    continue;
                }
                Err(err) => {
                    log_end_of_connection(connection, &err);
                    break;
                }
            };

            if !wanted(&args, &message) {
                continue;
            }

            print_message(&message, connection, format);
            printed = printed.saturating_add(1);

            if args.count.is_some_and(|count| printed >= count) {
                shutdown.untrack();
                let _ = transport.close();
                return Ok(SUCCESS);
            }
        }

        shutdown.untrack();
        let _ = transport.close();
    }

    Ok(SUCCESS)
}

fn wanted(args: &ListenArgs, message: &Message) -> bool {
    args.types
        .as_ref()
        .is_none_or(|types| types.iter().any(|t| *t == message.msg_type))
}

pub(crate) fn log_end_of_connection(connection: u64, err: &TransportError) {
    if err.is_closed() {
        tracing::info!(connection, reason = %err, "connection closed");
    } else {
        tracing::warn!(connection, error = %err, "connection failed");
    }
}
