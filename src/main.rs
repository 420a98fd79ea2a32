use clap::Parser;

use rezip::actions::run;
use rezip::cli::Cli;
use rezip::config::Config;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::try_from(cli)?;

    let summary = run(&config)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if summary.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
