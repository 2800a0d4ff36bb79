use crate::demo::{run_audit, run_demo, AuditArgs, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use gradegate::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "gradegate",
    about = "Run the result approval and publication-lock service from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Walk a session from draft results through publication and a controlled reopen
    Demo(DemoArgs),
    /// Print a session's lock log and audit trail from a snapshot file
    Audit(AuditArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args),
        Command::Audit(args) => run_audit(args),
    }
}
