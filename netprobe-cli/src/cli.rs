use std::path::PathBuf;

use clap::{ArgAction, Parser};
use netprobe_engine::ProbeOptions;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Run one network diagnostic probe and print the result envelope",
    long_about = None
)]
pub struct Cli {
    /// Probe kind: dns, reverse-dns, tcp-port, banner, ssl-cert, http-headers,
    /// security-headers, redirect-trace, blacklist, whois (aliases accepted)
    #[arg(value_name = "KIND")]
    pub kind: String,

    /// Domain, IP address, host[:port] or URL, depending on the probe
    #[arg(value_name = "TARGET")]
    pub target: String,

    /// Engine configuration file (TOML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// DNS record type for the dns probe
    #[arg(short = 't', long = "record-type", value_name = "TYPE")]
    pub record_type: Option<String>,

    /// Subdomain prefix for TXT lookups (e.g. _dmarc)
    #[arg(long = "prefix", value_name = "PREFIX")]
    pub prefix: Option<String>,

    /// Port for connection probes, overriding any port in TARGET
    #[arg(short = 'p', long = "port", value_name = "PORT")]
    pub port: Option<u16>,

    /// Pretty-print the JSON envelope
    #[arg(long = "pretty", action = ArgAction::SetTrue)]
    pub pretty: bool,
}

impl Cli {
    pub fn probe_options(&self) -> ProbeOptions {
        ProbeOptions {
            record_type: self.record_type.clone(),
            prefix: self.prefix.clone(),
            port: self.port,
        }
    }
}
