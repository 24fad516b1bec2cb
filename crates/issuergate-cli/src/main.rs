#[tokio::main]
async fn main() {
    if let Err(e) = issuergate_cli::run().await {
        eprintln!("Error: {e}");
        std::process::exit(e.exit_code());
    }
}
