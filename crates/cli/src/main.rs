use std::process;

use clap::Parser;
use durable_stream::types::ServerOptions;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Durable streams server - append-only log streams over HTTP", long_about = None)]
struct Opts {
    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on (0 for auto-assign)
    #[arg(long, short = 'p', default_value_t = 4437)]
    port: u16,

    /// Long-poll timeout in milliseconds
    #[arg(long = "timeout", default_value_t = 30_000)]
    timeout_ms: u64,

    /// Disable gzip/deflate response compression
    #[arg(long = "no-compression", default_value_t = false)]
    no_compression: bool,
}

#[tokio::main]
async fn main() {
    let opts: Opts = match Opts::try_parse() {
        Ok(opts) => opts,
        Err(e) => {
            let _ = e.print();
            process::exit(e.exit_code());
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let options = ServerOptions {
        host: opts.host,
        port: opts.port,
        long_poll_timeout_ms: opts.timeout_ms,
        compression: !opts.no_compression,
        ..Default::default()
    };

    if let Err(e) = durable_stream::server::start_server(options).await {
        tracing::error!(error = %e, "Server exited with error");
        process::exit(1);
    }
}
