use anyhow::Result;

use dimplex_exporter::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    let options = Options::new();

    let config = Config::new(&options).unwrap_or_else(|err| {
        eprintln!("failed to load config: {:?}", err);
        std::process::exit(255);
    });

    dimplex_exporter::init_logging(&config.loglevel());

    dimplex_exporter::run(config).await
}
