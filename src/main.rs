#[macro_use]
extern crate clap;

use {
    anyhow::{bail, Result},
    incr_postproc::{comm::ThreadComm, config::Config, orchestrator, storage::FileBackend},
    log::{error, info},
    simplelog::{Config as LogConfig, LevelFilter, TermLogger, TerminalMode},
    std::thread,
};

#[quit::main]
fn main() {
    let matches = clap_app!(incr_postproc =>
        (version: crate_version!())
        (@arg CONFIG: -c --config +takes_value +required "Path to the YAML configuration driving the post-processing.")
        (@arg WORKERS: -w --workers +takes_value "Number of SPMD workers to spawn (default 2).")
    )
    .get_matches();

    TermLogger::init(
        LevelFilter::Debug,
        LogConfig::default(),
        TerminalMode::Mixed,
    )
    .expect("Failed to initialize logger");

    let config = {
        // Should never panic as clap should return an error if the argument was not supplied
        let path = matches
            .value_of("CONFIG")
            .expect("Path to configuration file not supplied");

        let config = Config::from_path(path).unwrap_or_else(|e| {
            error!("Failed to load {}: \"{}\"", path, e);
            quit::with_code(1);
        });

        info!("Successfully loaded configuration from \"{}\"", path);

        config
    };

    let workers = match matches.value_of("WORKERS") {
        Some(w) => w.parse().unwrap_or_else(|e| {
            error!("Invalid worker count \"{}\": \"{}\"", w, e);
            quit::with_code(1);
        }),
        None => 2,
    };

    let result = run_workers(config, workers).unwrap_or_else(|e| {
        error!("Error: \"{}\"", e);
        quit::with_code(1);
    });

    if result != 0 {
        quit::with_code(result);
    }
}

/// Spawns the SPMD worker group; every worker runs the identical pipeline.
/// The process status is the coordinator's accumulated rename status.
fn run_workers(config: Config, workers: usize) -> Result<i32> {
    if workers == 0 {
        bail!("at least one worker is required");
    }

    info!("Starting increment post-processing on {} workers", workers);

    let mut handles = Vec::with_capacity(workers);
    for comm in ThreadComm::split(workers) {
        let config = config.clone();
        handles.push(thread::spawn(move || {
            orchestrator::run(&config, &comm, &FileBackend)
        }));
    }

    let mut result = 0;
    for (rank, handle) in handles.into_iter().enumerate() {
        let status = handle.join().expect("worker panicked")?;
        if rank == 0 {
            result = status;
        }
    }

    info!("Finished increment post-processing");
    Ok(result)
}
