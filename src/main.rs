use clap::Parser;
use serde_json::Value;
use sheet_mirror::cli;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli_args = cli::Cli::parse();
    let compact = cli_args.compact;

    match cli::run_command(cli_args).await {
        Ok(payload) => {
            if let Err(error) = cli::output::emit_value(&payload, compact) {
                emit_error_and_exit(error, compact);
            }
            if payload.get("ok").and_then(Value::as_bool) == Some(false) {
                std::process::exit(1);
            }
        }
        Err(error) => emit_error_and_exit(error, compact),
    }
}

fn emit_error_and_exit(error: anyhow::Error, compact: bool) -> ! {
    let envelope = cli::errors::envelope_for(&error);
    if cli::output::emit_value(&envelope, compact).is_err() {
        eprintln!("{{\"ok\":false,\"code\":\"COMMAND_FAILED\",\"message\":\"{}\"}}", error);
    }
    std::process::exit(1)
}
