use std::sync::Arc;

use framelink_transport::{Context, Transport, TransportError};

use crate::cmd::listen::log_end_of_connection;
use crate::cmd::{bind, EchoArgs, Shutdown};
use crate::exit::{conn_error, transport_error, CliResult, SUCCESS};
use crate::output::OutputFormat;

/// What the echo loop does after a failed receive.
#[derive(Debug, PartialEq, Eq)]
enum RecvDisposition {
    /// One bad message; keep serving the connection.
    Skip,
    /// The connection is done; move on to the next one.
    EndConnection,
}

fn classify_recv_error(err: &TransportError) -> RecvDisposition {
    match err {
        TransportError::Frame(_) => RecvDisposition::Skip,
        TransportError::Closed(_) | TransportError::Connection(_) => RecvDisposition::EndConnection,
    }
}

pub fn run(args: EchoArgs, _format: OutputFormat) -> CliResult<i32> {
    let listener = bind(&args.path, &args.conn)?;
    let shutdown = Shutdown::install(&args.path)?;
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
        serve(&transport, connection);
        shutdown.untrack();
        let _ = transport.close();

        if args.once {
            break;
        }
    }

    Ok(SUCCESS)
}

fn serve(transport: &Transport, connection: u64) {
    let cx = Context::background();
    loop {
        let message = match transport.receive(&cx) {
            Ok(message) => message,
            Err(err) => match classify_recv_error(&err) {
                RecvDisposition::Skip => {
                    tracing::warn!(connection, error = %err, "dropping undecodable message");
                    continue;
                }
                RecvDisposition::EndConnection => {
                    log_end_of_connection(connection, &err);
                    return;
                }
            },
        };

        tracing::info!(
            connection,
            msg_type = %message.msg_type,
            size = message.payload.len(),
            "echoing message"
        );

        if let Err(err) = transport.send(&cx, &message.msg_type, &message.payload) {
            log_end_of_connection(connection, &err);
            return;
        }
    }
}
