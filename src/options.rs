use clap::Parser;

/// Prometheus exporter for Dimplex NWPM heat pump controllers
#[derive(Debug, Parser)]
#[clap(author, version)]
pub struct Options {
    /// Config file to read
    #[clap(short = 'c', long = "config")]
    pub config_file: Option<String>,

    /// Device address (host or host:port), overrides the config file
    #[clap(short = 'a', long = "address")]
    pub address: Option<String>,

    /// HTTP listen address, overrides the config file
    #[clap(short = 'l', long = "listen")]
    pub listen: Option<String>,
}

impl Options {
    pub fn new() -> Self {
        Self::parse()
    }
}
