pub mod args;
pub mod commands;

pub use args::{RunArgs, ServeArgs, ValidateArgs};
use clap::{Parser, Subcommand};

const HELP_TEMPLATE: &str = "\
{name} {version}\n\
{about-with-newline}\n\
USAGE:\n    {usage}\n\
\nOPTIONS:\n{options}\n\
COMMANDS:\n{subcommands}\n";

#[derive(Parser)]
#[command(name = "rulebot")]
#[command(version = crate::VERSION)]
#[command(about = "Rule-driven automation for issue and pull request webhooks")]
#[command(help_template = HELP_TEMPLATE)]
#[command(
    after_long_help = "Typical flow: validate a rules file, dry-run payloads against it with `run`, then `serve`."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[command(
        about = "Start the webhook listener",
        long_about = "Serve verifies signed deliveries, loads .github/rulebot.yml from the target repository and applies the matching action-set.",
        after_help = "Example:\n    rulebot serve --config rulebot.toml --dry-run"
    )]
    Serve(ServeArgs),
    #[command(
        about = "Evaluate one payload offline",
        long_about = "Run feeds a saved webhook payload through a local rules file against an in-memory repository and prints the recorded mutations.",
        after_help = "Example:\n    rulebot run --event issues --payload opened.json --rules .github/rulebot.yml"
    )]
    Run(RunArgs),
    #[command(
        about = "Check a rules file",
        long_about = "Validate parses the rules file, compiles every action-set and predefined sequence, and reports each problem.",
        after_help = "Example:\n    rulebot validate .github/rulebot.yml"
    )]
    Validate(ValidateArgs),
}

pub async fn run(args: Args) -> crate::Result<()> {
    match args.command {
        Command::Serve(serve_args) => commands::serve(serve_args).await,
        Command::Run(run_args) => commands::run(run_args).await,
        Command::Validate(validate_args) => commands::validate(validate_args).await,
    }
}
