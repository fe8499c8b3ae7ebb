use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (for development convenience)
    // Silently ignore if not found - production uses system env vars
    let _ = dotenvy::dotenv();

    match dialect_alert::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("dialect-alert: {err}");
            ExitCode::FAILURE
        }
    }
}
