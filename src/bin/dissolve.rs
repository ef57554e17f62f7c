use clap::Parser;
use dissolve::driver::Dissolve;
use dissolve::messenger::Messenger;
use dissolve::messenger::OutputMode;
use dissolve::pool::ProcessPool;
use std::path::PathBuf;
use std::process::ExitCode;

/// Dissolve - refine atomistic models of disordered materials against
/// scattering data.
#[derive(Parser, Debug)]
#[command(name = "dissolve", version, about)]
struct Args {
    /// input file describing the system to simulate
    input: Option<PathBuf>,

    /// check input and set-up only; run no main-loop iterations
    #[arg(short = 'c', long = "check")]
    check: bool,

    /// number of main-loop iterations to perform
    #[arg(short = 'n', long = "iterations", value_name = "LOOPS", default_value_t = 5)]
    iterations: u64,

    /// perform a single main-loop iteration and quit
    #[arg(short = 's', long = "single")]
    single: bool,

    /// restart file frequency (0 disables writing)
    #[arg(short = 'r', long = "restart", value_name = "FREQUENCY")]
    restart_frequency: Option<u64>,

    /// load restart data from this file instead of the default
    #[arg(short = 't', long = "initial-restart-file", value_name = "RESTART_FILE")]
    restart_data: Option<PathBuf>,

    /// ignore any restart file
    #[arg(short = 'i', long = "ignore")]
    ignore_restart: bool,

    /// write the canonicalised input to this file and quit
    #[arg(short = 'w', long = "write", value_name = "OUTPUT_FILE")]
    write_input: Option<PathBuf>,

    /// write no restart or heartbeat files (restart is still read)
    #[arg(short = 'x', long = "no-write")]
    no_write: bool,

    /// redirect each rank's output to FILE.<rank>
    #[arg(short = 'f', long = "output-file", value_name = "OUTPUT_FILE")]
    redirect: Option<PathBuf>,

    /// restrict output to the master process
    #[arg(short = 'm', long = "master")]
    master_only: bool,

    /// print no output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    /// be a little more descriptive throughout
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn run(args: Args, pool: &ProcessPool) -> anyhow::Result<()> {
    Messenger::banner("Parse Input File");
    let Some(input) = &args.input else {
        anyhow::bail!("no input file provided; nothing more to do");
    };
    let mut dissolve = Dissolve::load_input(input)?;

    if let Some(path) = &args.write_input {
        log::info!("saving canonical input to '{}'", path.display());
        let saved = match pool.is_master() {
            true => match dissolve.save_input(path) {
                Ok(()) => pool.decide_true(),
                Err(e) => {
                    log::error!("{:#}", e);
                    pool.decide_false()
                }
            },
            false => pool.decision(),
        };
        match saved {
            true => return Ok(()),
            false => anyhow::bail!("failed to save input file to '{}'", path.display()),
        }
    }

    Messenger::banner("Parse Restart File");
    if args.ignore_restart {
        log::info!("restart file (if it exists) will be ignored");
    } else {
        let restart = args
            .restart_data
            .clone()
            .unwrap_or_else(|| input.with_extension("restart"));
        if restart.exists() {
            log::info!("restart file '{}' exists and will be loaded", restart.display());
            dissolve.load_restart(&restart)?;
        } else {
            log::info!("restart file '{}' does not exist", restart.display());
        }
    }

    if let Some(frequency) = args.restart_frequency {
        dissolve.restart_frequency = frequency;
        match frequency {
            0 => log::info!("restart file will not be written"),
            f => log::info!("restart file will be written every {} iterations", f),
        }
    }
    if args.no_write {
        dissolve.write_restart_and_heartbeat = false;
        log::info!("no restart or heartbeat files will be written");
    }

    let iterations = match (args.check, args.single) {
        (true, _) => {
            log::info!("system input and set-up will be checked, then dissolve will exit");
            0
        }
        (_, true) => 1,
        _ => args.iterations,
    };

    Messenger::banner("Set Up");
    dissolve.prepare(pool)?;

    Messenger::banner("Main Loop");
    dissolve.iterate(iterations, pool)?;
    if dissolve.write_restart_and_heartbeat && dissolve.restart_frequency > 0 {
        dissolve.save_restart()?;
    }

    log::info!("dissolve is done.");
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    let mode = match (args.quiet, args.verbose, args.master_only) {
        (true, _, _) => OutputMode::Quiet,
        (_, true, _) => OutputMode::Verbose,
        (_, _, true) => OutputMode::MasterOnly,
        _ => OutputMode::Normal,
    };
    let pool = ProcessPool::serial();
    if let Err(e) = Messenger::init(mode, args.redirect.as_deref(), pool.world_rank()) {
        eprintln!("failed to initialise output: {:#}", e);
        return ExitCode::FAILURE;
    }
    match run(args, &pool) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            log::error!("dissolve is done, but with errors.");
            ExitCode::FAILURE
        }
    }
}
