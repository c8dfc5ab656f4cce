use clap::Parser;

use std::error::Error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let cli = cropscan_inference::cli::Cli::parse();
    cli.config.validate()?;
    tracer::init_tracing(cli.config.tracing_options())?;

    let outcome = cli.run().await;
    tracer::shutdown_tracing();

    let output = outcome?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
