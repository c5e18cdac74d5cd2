//! In-memory stand-ins for the network seams, shared by probe unit tests.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::io::DuplexStream;

use super::resolver::{LookupError, Resolver};
use super::socket::{BoxedStream, Dialer};
use crate::types::{DnsQueryType, DnsRecord};

type LookupAnswer = Result<Vec<DnsRecord>, LookupError>;

/// Resolver answering from a fixed table. Unknown names are NXDOMAIN.
#[derive(Default)]
pub struct FakeResolver {
    answers: HashMap<(String, DnsQueryType), LookupAnswer>,
    ptrs: HashMap<IpAddr, Vec<String>>,
    delays: HashMap<String, Duration>,
    stalled: bool,
    calls: AtomicUsize,
}

impl FakeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(
        mut self,
        name: &str,
        record_type: DnsQueryType,
        records: Vec<DnsRecord>,
    ) -> Self {
        self.answers
            .insert((name.to_string(), record_type), Ok(records));
        self
    }

    pub fn fail(mut self, name: &str, record_type: DnsQueryType, error: LookupError) -> Self {
        self.answers.insert((name.to_string(), record_type), Err(error));
        self
    }

    pub fn ptr(mut self, ip: IpAddr, hostnames: Vec<&str>) -> Self {
        self.ptrs
            .insert(ip, hostnames.into_iter().map(String::from).collect());
        self
    }

    /// Delay answers for `name`.
    pub fn delay(mut self, name: &str, delay: Duration) -> Self {
        self.delays.insert(name.to_string(), delay);
        self
    }

    /// Never answer anything.
    pub fn stalled(mut self) -> Self {
        self.stalled = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn wait(&self, name: &str) {
        if self.stalled {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.delays.get(name) {
            tokio::time::sleep(*delay).await;
        }
    }
}

#[async_trait]
impl Resolver for FakeResolver {
    async fn lookup(&self, name: &str, record_type: DnsQueryType) -> LookupAnswer {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.wait(name).await;
        self.answers
            .get(&(name.to_string(), record_type))
            .cloned()
            .unwrap_or_else(|| Err(LookupError::NotFound(format!("NXDOMAIN: {name}"))))
    }

    async fn reverse(&self, ip: IpAddr) -> Result<Vec<String>, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.wait(&ip.to_string()).await;
        self.ptrs
            .get(&ip)
            .cloned()
            .ok_or_else(|| LookupError::NotFound(format!("NXDOMAIN: {ip}")))
    }
}

/// Dialer whose connect never completes.
pub struct StalledDialer;

#[async_trait]
impl Dialer for StalledDialer {
    async fn dial(&self, _host: &str, _port: u16) -> io::Result<BoxedStream> {
        std::future::pending().await
    }
}

/// Dialer that is always refused.
pub struct RefusingDialer;

#[async_trait]
impl Dialer for RefusingDialer {
    async fn dial(&self, _host: &str, _port: u16) -> io::Result<BoxedStream> {
        Err(io::Error::from(io::ErrorKind::ConnectionRefused))
    }
}

type PeerScript = Box<dyn Fn(DuplexStream) -> BoxFuture<'static, ()> + Send + Sync>;

/// Dialer connecting to an in-memory peer that runs `script` on its end.
pub struct ScriptedDialer {
    script: PeerScript,
    dialed: Mutex<Vec<(String, u16)>>,
}

impl ScriptedDialer {
    pub fn new<F, Fut>(script: F) -> Self
    where
        F: Fn(DuplexStream) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            script: Box::new(move |stream| script(stream).boxed()),
            dialed: Mutex::new(Vec::new()),
        }
    }

    /// `(host, port)` of every dial so far.
    pub fn dialed(&self) -> Vec<(String, u16)> {
        self.dialed.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Dialer for ScriptedDialer {
    async fn dial(&self, host: &str, port: u16) -> io::Result<BoxedStream> {
        if let Ok(mut dialed) = self.dialed.lock() {
            dialed.push((host.to_string(), port));
        }
        let (client, server) = tokio::io::duplex(64 * 1024);
        tokio::spawn((self.script)(server));
        Ok(Box::new(client))
    }
}
