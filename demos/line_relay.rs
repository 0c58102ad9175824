//! Relay server with a line-based handshake
//!
//! Run with: cargo run --example line_relay [BIND_ADDR]
//!
//! Examples:
//!   cargo run --example line_relay                    # binds to 0.0.0.0:554
//!   cargo run --example line_relay 127.0.0.1:8554     # binds to 127.0.0.1:8554
//!
//! ## Publishing
//!
//!   (echo "PUBLISH /live/cam1"; cat /dev/urandom) | nc localhost 8554
//!
//! ## Playing
//!
//!   echo "PLAY /live/cam1" | nc localhost 8554 | pv > /dev/null
//!
//! The first line of every connection names the role and path. The server
//! answers `OK` or `ERR <code> <reason>`; after `OK` the connection carries raw
//! bytes in one direction.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use rtsp_relay::{
    Error, PublishSink, Refusal, Result, Role, RtspServer, ServerConfig, SessionContext,
    SessionHandler, ViewerFeed,
};

const MAX_LINE: usize = 1024;

struct LineHandler;

async fn read_line(stream: &mut TcpStream) -> Result<String> {
    let mut line = Vec::new();
    loop {
        let byte = stream.read_u8().await?;
        if byte == b'\n' {
            break;
        }
        if line.len() >= MAX_LINE {
            return Err(Error::Handshake("line too long".into()));
        }
        line.push(byte);
    }
    String::from_utf8(line).map_err(|_| Error::Handshake("line is not UTF-8".into()))
}

impl SessionHandler for LineHandler {
    async fn handshake(&self, ctx: &SessionContext, stream: &mut TcpStream) -> Result<Role> {
        let line = read_line(stream).await?;
        let mut parts = line.trim().splitn(2, ' ');

        let role = match (parts.next(), parts.next()) {
            (Some("PUBLISH"), Some(path)) => Role::Publish { path: path.into() },
            (Some("PLAY"), Some(path)) => Role::Play { path: path.into() },
            _ => {
                stream.write_all(b"ERR 400 bad request\n").await?;
                return Err(Error::Handshake(format!("unexpected line: {line}")));
            }
        };

        println!("[{}] {} -> {:?}", ctx.session_id, ctx.peer_addr, role);
        Ok(role)
    }

    async fn publish(
        &self,
        ctx: &SessionContext,
        stream: &mut TcpStream,
        sink: PublishSink,
    ) -> Result<()> {
        stream.write_all(b"OK\n").await?;

        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                println!("[{}] Publisher for {} hung up", ctx.session_id, sink.path());
                return Ok(());
            }
            sink.send(Bytes::copy_from_slice(&buf[..n])).await?;
        }
    }

    async fn play(
        &self,
        ctx: &SessionContext,
        stream: &mut TcpStream,
        mut feed: ViewerFeed,
    ) -> Result<()> {
        stream.write_all(b"OK\n").await?;

        while let Some(packet) = feed.recv().await {
            stream.write_all(&packet).await?;
        }

        println!("[{}] Stream ended", ctx.session_id);
        Ok(())
    }

    async fn refuse(
        &self,
        _ctx: &SessionContext,
        stream: &mut TcpStream,
        refusal: Refusal,
    ) -> Result<()> {
        let reply: &[u8] = match refusal {
            Refusal::PathInUse => b"ERR 409 path in use\n",
            Refusal::NotFound => b"ERR 404 not found\n",
            Refusal::Rejected => b"ERR 503 unavailable\n",
        };
        stream.write_all(reply).await?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rtsp_relay=info".parse().unwrap()),
        )
        .init();

    let addr: SocketAddr = match std::env::args().nth(1) {
        Some(arg) => arg.parse().unwrap_or_else(|_| {
            eprintln!("Invalid bind address: {arg}");
            std::process::exit(2);
        }),
        None => "0.0.0.0:554".parse().unwrap(),
    };

    let config = ServerConfig::with_addr(addr).shutdown_timeout(Duration::from_secs(3));
    let server = Arc::new(RtspServer::new(config, LineHandler));

    let listener = server.bind().await?;
    println!("Relay listening on {}", listener.local_addr()?);

    let serving = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.serve(listener).await })
    };

    let reporter = {
        let server = Arc::clone(&server);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(10));
            loop {
                ticker.tick().await;
                let stats = server.stats().await;
                println!(
                    "Stats: connections={} active={} pushers={}",
                    stats.total_connections, stats.active_connections, stats.active_pushers
                );
                for (path, pusher) in server.registry().get_pushers().await {
                    let p = pusher.stats();
                    println!(
                        "  {path}: viewers={} in={}B relayed={} dropped={} bitrate={}bps",
                        p.viewers, p.bytes_in, p.packets_relayed, p.packets_dropped, p.bitrate()
                    );
                }
            }
        })
    };

    tokio::signal::ctrl_c().await?;
    println!("Shutting down");

    reporter.abort();
    server.stop().await;
    if let Ok(Err(e)) = serving.await {
        eprintln!("Accept loop failed: {e}");
    }

    Ok(())
}
