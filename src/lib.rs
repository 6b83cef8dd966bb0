pub mod collector;  // register map, poll cycle, decoding
pub mod config;     // configuration management
pub mod error;      // protocol error types
pub mod exposition; // Prometheus text format rendering
pub mod modbus;     // Modbus TCP protocol implementation
pub mod options;    // command line options parsing
pub mod prelude;    // common imports and types
pub mod server;     // HTTP metrics endpoint

const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

use crate::prelude::*;

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::collector::Collector;
use crate::modbus::{ModbusClient, RegisterRead};
use crate::server::HttpServer;

pub fn init_logging(loglevel: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(loglevel))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.module_path().unwrap_or(""),
                record.args()
            )
        })
        .write_style(env_logger::WriteStyle::Never)
        .init();
}

/// Connect to the device and serve scrapes until shutdown.
///
/// A connect failure is fatal: there is no point serving a metrics endpoint
/// that can never answer with data.
pub async fn app(shutdown_rx: broadcast::Receiver<()>, config: Config) -> Result<()> {
    info!("starting dimplex-exporter {}", CARGO_PKG_VERSION);

    let mut client = ModbusClient::new(&config.device);
    client
        .connect()
        .await
        .map_err(|e| anyhow!("failed to connect to modbus device: {}", e))?;

    // one probe read before serving scrapes, like a connection handshake
    let value = client
        .read_pseudo_float16(6)
        .await
        .map_err(|e| anyhow!("probe read of register 6 failed: {}", e))?;
    debug!("probe read of register 6: {}", value);

    let collector = Arc::new(Collector::new(client));
    let server = HttpServer::new(collector, config.listen().to_string());

    server.run(shutdown_rx).await
}

/// Application entry point: installs the ctrl-c handler and runs the app.
pub async fn run(config: Config) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl+c: {}", e);
        }
        let _ = shutdown_tx_clone.send(());
    });

    app(shutdown_rx, config).await
}
