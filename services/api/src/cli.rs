use crate::server;
use crate::simulate::{run_simulation, SimulateArgs};
use clap::{Args, Parser, Subcommand};
use secret_guest::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Secret Guest Assignment",
    about = "Run the secret guest admission API and draw scheduler",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service and draw scheduler (default command)
    Serve(ServeArgs),
    /// Close a synthetic offer and compare draw frequencies with rating shares
    Simulate(SimulateArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Seed this many offers and a small applicant pool into the in-memory store
    #[arg(long, default_value_t = 0)]
    pub(crate) demo_offers: usize,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Simulate(args) => run_simulation(args).await,
    }
}
