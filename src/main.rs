//! CLI wrapper around the allocation/scheduling engine. A thin `clap` front end over [`rapst_engine::driver::Driver`];
//! all domain logic lives in the library crate.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use rapst_engine::cp::CpConfig;
use rapst_engine::driver::{AllocationStrategy, Driver};
use rapst_engine::error::Error;
use rapst_engine::loader::{build_instances, load_process_fixture, load_release_times, load_resource_catalog};
use rapst_engine::logger;

#[derive(Parser, Debug)]
#[command(name = "rapst_engine", version, about = "Allocation and scheduling engine for Resource-Augmented Process Structure Trees")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Allocates and schedules a release-time-ordered workload.
    Run {
        /// Process template (flat JSON stand-in for the out-of-scope
        /// process XML).
        process_xml: PathBuf,
        /// Resource catalog (flat JSON stand-in for the out-of-scope
        /// resources XML).
        resources_xml: PathBuf,
        /// One of HEURISTIC, SINGLE_INSTANCE_CP, SINGLE_INSTANCE_CP_WARM,
        /// ALL_INSTANCE_CP, ALL_INSTANCE_CP_WARM.
        strategy: String,
        /// CSV of `instance_id,release_time` rows.
        release_times_csv: PathBuf,

        #[arg(long = "time-limit", default_value_t = 100)]
        time_limit: u64,

        #[arg(long, default_value_t = 0)]
        sigma: i64,

        #[arg(long = "out", default_value = "out/schedule.json")]
        out: PathBuf,

        /// Upper bound any interval's end may not exceed (bounds the CP
        /// backend's search space).
        #[arg(long, default_value_t = 100_000)]
        horizon: i64,

        /// Enables the alpha-weighted symmetry-breaking penalty term in
        /// scheduling-only solves.
        #[arg(long = "break-symmetries", default_value_t = false)]
        break_symmetries: bool,

        /// Weight of the symmetry-breaking penalty term; experimental,
        /// inactive at its default of 0.0.
        #[arg(long, default_value_t = 0.0)]
        alpha: f64,
    },
}

fn main() -> ExitCode {
    logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run { process_xml, resources_xml, strategy, release_times_csv, time_limit, sigma, out, horizon, break_symmetries, alpha } => {
            run(&process_xml, &resources_xml, &strategy, &release_times_csv, time_limit, sigma, &out, horizon, break_symmetries, alpha)
        }
    };

    match result {
        Ok(()) => ExitCode::from(0),
        Err(err @ Error::Infeasible) => {
            log::error!("{err}");
            ExitCode::from(2)
        }
        Err(err @ Error::SolverTimeoutNoIncumbent) => {
            log::error!("{err}");
            ExitCode::from(3)
        }
        Err(err @ Error::MixedStrategyUnsupported) => {
            log::error!("{err}");
            ExitCode::from(4)
        }
        Err(err) => {
            log::error!("{err}");
            ExitCode::from(1)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run(
    process_xml: &PathBuf,
    resources_xml: &PathBuf,
    strategy: &str,
    release_times_csv: &PathBuf,
    time_limit: u64,
    sigma: i64,
    out: &PathBuf,
    horizon: i64,
    break_symmetries: bool,
    alpha: f64,
) -> Result<(), Error> {
    let strategy: AllocationStrategy = strategy.parse()?;

    let fixture = load_process_fixture(&process_xml.to_string_lossy())?;
    let catalog = load_resource_catalog(&resources_xml.to_string_lossy())?;
    let rows = load_release_times(&release_times_csv.to_string_lossy())?;
    let instances = build_instances(&fixture, &catalog, &rows)?;

    log::info!("Loaded {} instance(s); running strategy {}", instances.len(), strategy);

    let cfg = CpConfig { time_limit_secs: time_limit, sigma, horizon, break_symmetries, alpha };
    let mut driver = Driver::new(out, cfg);
    for instance in instances {
        driver.add_instance(instance, strategy);
    }

    let schedule = driver.run()?;
    log::info!("Schedule written to '{}'; objective = {}", out.display(), schedule.objective);
    Ok(())
}
