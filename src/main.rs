use clap::Parser;
use pgferry_lib::config::ServiceConfig;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServiceConfig::parse();
    pgferry_lib::run(config).await
}
