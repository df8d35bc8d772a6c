use clap::Parser;
use pi_parallel::cli;

#[tokio::main]
async fn main() {
    let args = cli::Cli::parse();

    if let Err(e) = cli::run(args).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
