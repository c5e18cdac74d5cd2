//! Timeout-bounded connection sessions.
//!
//! Every connection-based probe (TCP, banner, TLS, WHOIS) runs through
//! [`bounded_session`]: one connection attempt, one deadline, first event wins.

use std::future::Future;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use log::trace;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Byte stream a [`Dialer`] hands out.
pub trait ByteStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ByteStream for T {}

pub type BoxedStream = Box<dyn ByteStream>;

/// Opens raw byte streams to `host:port`.
///
/// Production code uses [`TcpDialer`]; tests substitute in-memory peers.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, host: &str, port: u16) -> io::Result<BoxedStream>;
}

/// Plain TCP via tokio. Hostnames go through the system resolver.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, host: &str, port: u16) -> io::Result<BoxedStream> {
        trace!("[Socket] Dialing {host}:{port}");
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }
}

/// Terminal outcome of a [`bounded_session`].
#[derive(Debug)]
pub enum SessionOutcome<T> {
    /// Connect and exchange both finished before the deadline.
    Completed(T),
    /// Connect or exchange failed first.
    Failed(io::Error),
    /// The deadline fired first. `connected` is set when it fired during the
    /// exchange rather than while connecting.
    TimedOut { connected: bool },
}

/// Run `connect`, then `exchange` on the resulting connection, under a single
/// deadline covering both phases.
///
/// Exactly one outcome is produced. The connection is moved into the exchange
/// future, so it is dropped (closed) exactly once whichever event wins; losing
/// futures are dropped, which cancels them.
pub async fn bounded_session<C, T, Fc, X, Fx>(
    deadline: Duration,
    connect: Fc,
    exchange: X,
) -> SessionOutcome<T>
where
    Fc: Future<Output = io::Result<C>>,
    X: FnOnce(C) -> Fx,
    Fx: Future<Output = io::Result<T>>,
{
    let timer = tokio::time::sleep(deadline);
    tokio::pin!(timer);

    let conn = tokio::select! {
        biased;
        result = connect => match result {
            Ok(conn) => conn,
            Err(e) => return SessionOutcome::Failed(e),
        },
        () = &mut timer => return SessionOutcome::TimedOut { connected: false },
    };

    tokio::select! {
        biased;
        result = exchange(conn) => match result {
            Ok(value) => SessionOutcome::Completed(value),
            Err(e) => SessionOutcome::Failed(e),
        },
        () = &mut timer => SessionOutcome::TimedOut { connected: true },
    }
}
