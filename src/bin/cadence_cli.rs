use std::{env, fs, path::Path, process};

use cadence::{
    app::App,
    domain::{DateWindow, LedgerEntry, Obligation},
    errors::AppError,
    init,
    services::{
        Affordability, ForecastService, HorizonSearch, LedgerProjector, RecurrenceExpander,
        WishlistTarget,
    },
    utils::build_info,
};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde_json::json;

fn main() {
    init();

    if let Err(err) = run() {
        eprintln!("Error: {err}");
        process::exit(1);
    }
}

fn run() -> Result<(), AppError> {
    let args: Vec<String> = env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        print_usage();
        process::exit(1);
    };

    match (command.as_str(), rest) {
        ("expand", [path, from, to]) => {
            let obligation: Obligation = read_json(path)?;
            let window = DateWindow::new(parse_date(from)?, parse_date(to)?)
                .map_err(|err| AppError::Input(err.to_string()))?;
            let occurrences = RecurrenceExpander::expand_all(&[obligation], window)?;
            println!("{}", serde_json::to_string_pretty(&occurrences)?);
        }
        ("project", [path, balance]) => {
            let entries: Vec<LedgerEntry> = read_json(path)?;
            let opening = parse_amount(balance)?;
            let projected = LedgerProjector::project(opening, entries)?;
            let summary = LedgerProjector::summarize(opening, &projected);
            let report = json!({
                "entries": projected,
                "summary": {
                    "openingBalance": summary.opening_balance,
                    "inflow": summary.inflow,
                    "outflow": summary.outflow,
                    "net": summary.net,
                    "closingBalance": summary.closing_balance,
                },
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        ("horizon", [path, balance, from, to, amounts @ ..]) if !amounts.is_empty() => {
            let obligations: Vec<Obligation> = read_json(path)?;
            let targets = amounts
                .iter()
                .enumerate()
                .map(|(index, amount)| {
                    parse_amount(amount)
                        .map(|amount| WishlistTarget::new(format!("target-{}", index + 1), amount))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let config = App::load_config()?;
            let search = HorizonSearch::new(config.horizon_max_years);
            let pipeline = ForecastService::day_pipeline(&obligations);
            let results = search.search(
                &pipeline,
                parse_date(from)?,
                parse_date(to)?,
                parse_amount(balance)?,
                &targets,
            )?;
            for result in results {
                let when = match result.affordability {
                    Affordability::On(date) => date.to_string(),
                    Affordability::NoDateFound => "no date found".to_string(),
                };
                println!("{}\t{:.2}\t{}", result.target_id, result.amount, when);
            }
        }
        ("jobs", []) => {
            let config = App::load_config()?;
            let registry = App::registry_for(&config).load()?;
            if registry.is_empty() {
                println!("No jobs scheduled.");
            }
            for job in registry.jobs() {
                println!("{}\t{}\t{}", job.name, job.cron, job.script_path.display());
            }
        }
        ("version", []) => {
            let meta = build_info::current();
            println!("Cadence {}", meta.version);
            println!("  CLI version  : {}", build_info::CLI_VERSION);
            println!("  Build hash   : {} ({})", meta.git_hash, meta.git_status);
            println!("  Built at     : {}", meta.timestamp);
            println!("  Target       : {}", meta.target);
            println!("  Profile      : {}", meta.profile);
            println!("  Rustc        : {}", meta.rustc);
        }
        _ => {
            print_usage();
            process::exit(1);
        }
    }

    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &str) -> Result<T, AppError> {
    let data = fs::read_to_string(Path::new(path))?;
    Ok(serde_json::from_str(&data)?)
}

fn parse_date(raw: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|err| AppError::Input(format!("`{raw}` is not a YYYY-MM-DD date: {err}")))
}

fn parse_amount(raw: &str) -> Result<f64, AppError> {
    raw.parse::<f64>()
        .ok()
        .filter(|amount| amount.is_finite())
        .ok_or_else(|| AppError::Input(format!("`{raw}` is not a finite amount")))
}

fn print_usage() {
    eprintln!(
        "Usage: cadence_cli <command>\n\
         Commands:\n  \
         expand <obligation.json> <from> <to>\n  \
         project <entries.json> <starting-balance>\n  \
         horizon <obligations.json> <starting-balance> <from> <to> <amount>...\n  \
         jobs\n  \
         version"
    );
}
