use {
    anyhow::Result,
    clap::Parser,
    server::start_server,
    std::io::IsTerminal,
    tracing_subscriber::{
        filter::LevelFilter,
        layer::SubscriberExt,
        util::SubscriberInitExt,
        Layer,
    },
};

mod api;
mod auction;
mod auth;
mod config;
mod kernel;
mod lock;
mod metrics;
mod models;
mod server;
mod user;

#[tokio::main]
async fn main() -> Result<()> {
    // Compact logs on a terminal, JSON when piped to a collector.
    let log_layer = tracing_subscriber::fmt::layer()
        .with_file(false)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(true)
        .with_ansi(std::io::stderr().is_terminal());

    let registry = tracing_subscriber::registry();
    if std::io::stderr().is_terminal() {
        registry
            .with(log_layer.compact().with_filter(LevelFilter::INFO))
            .init();
    } else {
        registry
            .with(log_layer.json().with_filter(LevelFilter::INFO))
            .init();
    }

    match config::Options::parse() {
        config::Options::Run(opts) => start_server(opts).await,
    }
}
