use clap::Parser;
use nestegg::api::{Cli, Command, run_http_server, run_project_command, run_simulate_command};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Serve(args) => run_http_server(args.into())
            .await
            .map(|()| None)
            .map_err(|e| format!("Server error: {e}")),
        Command::Project(args) => run_project_command(&args).map(Some),
        Command::Simulate(args) => run_simulate_command(&args).map(Some),
    };

    match outcome {
        Ok(Some(json)) => println!("{json}"),
        Ok(None) => {}
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
