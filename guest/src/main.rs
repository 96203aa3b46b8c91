//! In-guest announce helper.
//!
//! Run every minute by cron inside an instrumented guest. Connects to the
//! host listener and sends the instance UUID so the host learns the
//! guest's address from the connection's peer.

use clap::Parser;
use guestprep_shared::GuestprepResult;
use std::io::Write;
use std::net::{IpAddr, SocketAddr, TcpStream};
use std::time::Duration;
use uuid::Uuid;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "guestprep-announce", about = "Announce this guest to its host")]
struct Cli {
    host: IpAddr,
    port: u16,
    uuid: Uuid,
}

fn announce(addr: SocketAddr, uuid: &Uuid) -> GuestprepResult<()> {
    let mut stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)?;
    stream.set_write_timeout(Some(CONNECT_TIMEOUT))?;
    stream.write_all(announcement(uuid).as_bytes())?;
    stream.flush()?;
    Ok(())
}

fn announcement(uuid: &Uuid) -> String {
    format!("{}\n", uuid.hyphenated())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let addr = SocketAddr::new(cli.host, cli.port);

    if let Err(e) = announce(addr, &cli.uuid) {
        tracing::warn!(addr = %addr, uuid = %cli.uuid, error = %e, "Announce failed");
        std::process::exit(1);
    }
    tracing::debug!(addr = %addr, uuid = %cli.uuid, "Announced");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;

    #[test]
    fn test_announce_sends_uuid_line() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let uuid = Uuid::new_v4();

        announce(addr, &uuid).unwrap();

        let (stream, _) = listener.accept().unwrap();
        let mut line = String::new();
        BufReader::new(stream).read_line(&mut line).unwrap();
        assert_eq!(line, format!("{}\n", uuid));
    }

    #[test]
    fn test_announce_to_closed_port_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        assert!(announce(addr, &Uuid::nil()).is_err());
    }
}
