use std::process::ExitCode;

use clap::Parser;
use log::{error, info, LevelFilter};
use simple_logger::SimpleLogger;

use snsweep::config::Problem;
use snsweep::solver::{Simulation, Strategy};

#[derive(Debug, Parser)]
#[command(version, about = "Discrete-ordinates transport sweep mini-app")]
struct Opts {
    /// Path to the JSON problem definition.
    problem: String,

    #[arg(short = 't', long, default_value_t = 1)]
    num_threads: usize,

    /// serial|pool|rayon
    #[arg(short = 's', long, default_value = "serial")]
    strategy: String,

    /// Override the problem file's inner iteration cap.
    #[arg(long)]
    max_inner: Option<usize>,

    /// Override the problem file's outer iteration cap.
    #[arg(long)]
    max_outer: Option<usize>,

    /// Write the final scalar flux of every group as CBOR.
    #[arg(short = 'o', long)]
    output: Option<String>,

    #[arg(long, default_value_t = false)]
    verbose: bool,
}

fn main() -> ExitCode {
    let opts = Opts::parse();
    init_logging(opts.verbose);
    info!("{:?}", opts);

    if opts.strategy == "serial" && opts.num_threads != 1 {
        eprintln!("Error: serial strategy requires --num-threads=1");
        return ExitCode::FAILURE;
    }
    let strategy = match opts.strategy.as_str() {
        "serial" => Strategy::Serial,
        "pool" => Strategy::Pool(opts.num_threads),
        "rayon" => {
            if let Err(err) = rayon::ThreadPoolBuilder::new()
                .num_threads(opts.num_threads.max(2))
                .build_global()
            {
                error!("failed to build the Rayon pool: {}", err);
                return ExitCode::FAILURE;
            }
            Strategy::Rayon
        }
        other => {
            eprintln!("Error: unknown strategy '{}', expected serial|pool|rayon", other);
            return ExitCode::FAILURE;
        }
    };

    let text = match std::fs::read_to_string(&opts.problem) {
        Ok(text) => text,
        Err(err) => {
            error!("could not read {}: {}", opts.problem, err);
            return ExitCode::FAILURE;
        }
    };
    let mut problem: Problem = match serde_json::from_str(&text) {
        Ok(problem) => problem,
        Err(err) => {
            error!("could not parse {}: {}", opts.problem, err);
            return ExitCode::FAILURE;
        }
    };
    if let Some(cap) = opts.max_inner {
        problem.max_inner_iters = cap;
    }
    if let Some(cap) = opts.max_outer {
        problem.max_outer_iters = cap;
    }

    let mut sim = match Simulation::new(problem, strategy) {
        Ok(sim) => sim,
        Err(err) => {
            error!("invalid problem: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let start = std::time::Instant::now();
    let report = sim.run();
    let elapsed = start.elapsed().as_secs_f64();

    let cells = sim.problem().nx * sim.problem().ny * sim.problem().nz;
    info!(
        "swept {} cells x {} groups in {:.3}s ({} outer iterations in the final step)",
        cells,
        sim.problem().num_groups,
        elapsed,
        report.outer_iterations
    );
    if let Some(mms) = report.mms_error {
        info!(
            "manufactured-solution error: max={:.3e} min={:.3e} mean={:.3e}",
            mms[0],
            mms[1],
            mms[2] / (cells * sim.problem().num_groups) as f64
        );
    }

    if let Some(path) = &opts.output {
        let flux: Vec<_> = (0..sim.problem().num_groups)
            .map(|g| sim.fields().flux[g].snapshot())
            .collect();
        match std::fs::File::create(path) {
            Ok(file) => {
                let mut buffer = std::io::BufWriter::new(file);
                if let Err(err) = ciborium::ser::into_writer(&flux, &mut buffer) {
                    error!("could not serialize flux to {}: {}", path, err);
                    return ExitCode::FAILURE;
                }
            }
            Err(err) => {
                error!("could not create {}: {}", path, err);
                return ExitCode::FAILURE;
            }
        }
    }

    if report.converged {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    SimpleLogger::new().with_level(level).init().unwrap();
}
