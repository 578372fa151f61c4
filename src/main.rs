use anyhow::{Context, Result};
use foundation_foods::cli::{parse_args, Command};
use foundation_foods::config::Config;
use foundation_foods::logging;
use foundation_foods::pipeline;
use foundation_foods::search::{foundation_foods, load_foundation_foods};
use tracing::info;

fn main() -> Result<()> {
    dotenv::dotenv().ok(); // Paths may come from a .env file

    let cli = parse_args();
    logging::init(cli.verbose);
    let config = cli.command.config(Config::from_env());

    match &cli.command {
        Command::Build { .. } => {
            let aggregation = pipeline::build(&config)?;
            let stats = aggregation.stats;
            info!(
                measurements = stats.measurements,
                unknown_food = stats.unknown_food,
                unknown_nutrient = stats.unknown_nutrient,
                invalid_amount = stats.invalid_amount,
                "measurement summary"
            );
        }
        Command::Columns { .. } => {
            pipeline::columns(&config, std::io::stdout().lock())?;
        }
        Command::Search { query, .. } => {
            load_foundation_foods(&config.index_csv).with_context(|| {
                format!("Failed to initialize foundation foods from '{}'", config.index_csv.display())
            })?;
            let query = query.join(" ");
            let matches = foundation_foods(&query);
            info!(query = %query, matches = matches.len(), "search finished");
            println!("{}", serde_json::to_string_pretty(&matches)?);
        }
    }
    Ok(())
}
