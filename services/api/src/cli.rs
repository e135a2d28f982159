use crate::commands::{run_apply, run_ledger_list, ApplyArgs, LedgerListArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use intern_apply::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Internship Application Desk",
    about = "Serve the internship application API or drive the automation worker from the command line",
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
    /// Run the automation worker once and print its outcome
    Apply(ApplyArgs),
    /// Inspect the submitted-applications ledger
    Ledger {
        #[command(subcommand)]
        command: LedgerCommand,
    },
}

#[derive(Subcommand, Debug)]
enum LedgerCommand {
    /// Print every recorded application
    List(LedgerListArgs),
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
        Command::Apply(args) => run_apply(args).await,
        Command::Ledger {
            command: LedgerCommand::List(args),
        } => run_ledger_list(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["intern-apply-api"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn apply_rejects_both_cover_sources() {
        let parsed = Cli::try_parse_from([
            "intern-apply-api",
            "apply",
            "--profile",
            "Web Development",
            "--cover",
            "Dear team",
            "--cover-file",
            "cover.txt",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn ledger_list_parses_json_flag() {
        let cli = Cli::try_parse_from(["intern-apply-api", "ledger", "list", "--json"])
            .expect("parses");
        match cli.command {
            Some(Command::Ledger {
                command: LedgerCommand::List(args),
            }) => assert!(args.json),
            other => panic!("unexpected command {other:?}"),
        }
    }
}
