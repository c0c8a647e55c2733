use crate::demo::{
    run_calibrate, run_demo, run_evaluate, run_validate, CalibrateArgs, DemoArgs, EvaluateArgs,
    ValidateArgs,
};
use crate::server;
use clap::{Args, Parser, Subcommand};
use soc_assist::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "SOC Assist",
    about = "Score, explain and calibrate security event severity from the command line",
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
    /// Score one answer set and print its explanation report
    Evaluate(EvaluateArgs),
    /// Propose calibrated weights from an exported incident history
    Calibrate(CalibrateArgs),
    /// Check an engine configuration document without starting the service
    Validate(ValidateArgs),
    /// Walk through scoring, outcome intake, calibration and version activation
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
        Command::Evaluate(args) => run_evaluate(args),
        Command::Calibrate(args) => run_calibrate(args),
        Command::Validate(args) => run_validate(args),
        Command::Demo(args) => run_demo(args).await,
    }
}
