use clap::Parser;
use diagnose_relay::app;
use diagnose_relay::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match app::run(cli).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("❌ {err}");
            1
        }
    };
    // Exit without waiting on the blocking stdin reader.
    std::process::exit(code);
}
