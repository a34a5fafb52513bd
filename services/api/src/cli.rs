use crate::demo::{run_demo, run_submit, run_suggest, DemoArgs, SubmitArgs, SuggestArgs};
use crate::server;
use benefit_requests::error::AppError;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "Benefit Requests",
    about = "Run the benefit request service or exercise its workflow from the command line",
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
    /// Print the advisory reimbursement for a monthly salary
    Suggest(SuggestArgs),
    /// Submit a request with invoice files from disk against in-memory backends
    Submit(SubmitArgs),
    /// Run the successful and the failing submission scenarios end to end
    Demo(DemoArgs),
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
        Command::Suggest(args) => run_suggest(args),
        Command::Submit(args) => run_submit(args).await,
        Command::Demo(args) => run_demo(args).await,
    }
}
