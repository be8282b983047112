//! Minimal echo server: accepts one connection and echoes messages back.
//!
//! Run with:
//!   cargo run --example echo-server
//!
//! In another terminal:
//!   cargo run --features cli -- send <printed socket path> \
//!     --type greeting --json '{"hello":"world"}' --wait --wait-timeout 3s

use std::fs;

use framelink::conn::UdsListener;
use framelink::transport::{Context, Transport};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sock_dir = std::env::temp_dir().join(format!("framelink-echo-{}", std::process::id()));
    fs::create_dir_all(&sock_dir)?;
    let sock_path = sock_dir.join("echo.sock");

    let listener = UdsListener::bind(&sock_path)?;
    eprintln!("Listening on {}", sock_path.display());

    let transport = Transport::new(listener.accept()?)?;
    eprintln!("Client connected");

    let cx = Context::background();
    loop {
        match transport.receive(&cx) {
            Ok(message) => {
                eprintln!(
                    "Received {} bytes of type {:?}",
                    message.payload.len(),
                    message.msg_type
                );
                transport.send(&cx, &message.msg_type, &message.payload)?;
            }
            Err(err) if err.is_closed() => {
                eprintln!("Client closed: {err}");
                break;
            }
            Err(err) => {
                eprintln!("Connection ended: {err}");
                break;
            }
        }
    }

    drop(listener);
    let _ = fs::remove_dir_all(&sock_dir);
    Ok(())
}
