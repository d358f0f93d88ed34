use clap::Parser;
use rulebot::cli::{self, Args};
use rulebot::logging;

#[tokio::main]
async fn main() -> rulebot::Result<()> {
    let args = Args::parse();
    let _logging = logging::init(&args.command)?;
    cli::run(args).await
}
