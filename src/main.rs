/*!
 * mirrorcast - command line harness
 *
 * Runs a named backup profile through the worker pool, rendering the
 * observer channel as a progress bar. Queries (`--list`,
 * `--listerrortypes`) print and exit.
 */

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgGroup, Command};
use crossbeam_channel::RecvTimeoutError;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, warn};

use mirrorcast::{
    prune_orphans, BackupDriver, BackupEvent, BackupProfile, Config, CopyError,
    EventPublisher, LogLevel, SourceMap, WorkerPool,
};

fn main() -> Result<()> {
    let matches = Command::new("mirrorcast")
        .version(mirrorcast::VERSION)
        .about("Profile-driven directory backups: mirror every source into every destination, then prune")
        .arg(
            Arg::new("profile")
                .short('p')
                .long("profile")
                .value_name("NAME")
                .help("Run the named backup profile"),
        )
        .arg(
            Arg::new("list")
                .short('l')
                .long("list")
                .action(ArgAction::SetTrue)
                .help("List the available profile names and exit"),
        )
        .arg(
            Arg::new("listerrortypes")
                .long("listerrortypes")
                .action(ArgAction::SetTrue)
                .help("List the error type names usable in ignorederrors and exit"),
        )
        .arg(
            Arg::new("loglevel")
                .long("loglevel")
                .value_name("LEVEL")
                .help("Override the configured log level (critical, error, warning, info, debug)"),
        )
        .group(
            ArgGroup::new("mode")
                .args(["profile", "list", "listerrortypes"])
                .multiple(false),
        )
        .try_get_matches();

    // inconsistent arguments exit 1; --help and --version exit 0
    let matches = match matches {
        Ok(matches) => matches,
        Err(err) => {
            let _ = err.print();
            std::process::exit(if err.use_stderr() { 1 } else { 0 });
        }
    };

    let mut config = Config::load_or_create().context("loading configuration")?;

    if let Some(level) = matches.get_one::<String>("loglevel") {
        match LogLevel::parse(level) {
            Some(level) => config.log_level = level,
            None => {
                eprintln!("unknown log level: {level}");
                std::process::exit(1);
            }
        }
    }
    mirrorcast::logging::init_logging(config.log_level)?;

    if matches.get_flag("listerrortypes") {
        println!("Error types:");
        for name in CopyError::VARIANT_NAMES {
            println!("\t{name}");
        }
        return Ok(());
    }

    let mut profiles =
        BackupProfile::read_json(&config.profile_path).context("loading profiles")?;
    BackupProfile::reassign_all_ids(&mut profiles);

    if matches.get_flag("list") {
        println!("Backup profiles available:");
        for profile in &profiles {
            println!("\t{}", profile.name);
        }
        return Ok(());
    }

    let Some(name) = matches.get_one::<String>("profile") else {
        eprintln!("nothing to do; pass --profile, --list or --listerrortypes");
        std::process::exit(1);
    };
    let Some(profile) = BackupProfile::by_name(&profiles, name) else {
        eprintln!("no profile named \"{name}\"");
        std::process::exit(1);
    };

    run_profile(profile, &config)
}

fn run_profile(profile: &BackupProfile, config: &Config) -> Result<()> {
    let destinations: Vec<PathBuf> = profile
        .destinations
        .iter()
        .filter(|d| d.is_dir())
        .cloned()
        .collect();
    if destinations.is_empty() {
        error!("no destinations could be found, aborting");
        eprintln!("No destinations are accessible. Aborting.");
        std::process::exit(1);
    }
    if destinations.len() < profile.destinations.len() {
        warn!(
            "not all destination folders could be found, continuing with {:?}",
            destinations
        );
    }

    let sources: Vec<PathBuf> = profile
        .sources
        .iter()
        .filter(|s| s.is_dir())
        .cloned()
        .collect();
    if sources.is_empty() {
        error!("no sources could be found, aborting");
        eprintln!("Sources don't exist or could not be found. Aborting.");
        std::process::exit(1);
    }
    if sources.len() < profile.sources.len() {
        warn!("could not find all the sources, continuing with {:?}", sources);
    }

    for destination in &destinations {
        println!("DESTINATION: {}", destination.display());
    }

    let map = SourceMap::for_profile(profile, &config.sourcemap_name);

    let (publisher, subscriber) = EventPublisher::channel();
    let pool = WorkerPool::new(config.thread_count);
    for source in &sources {
        let driver = BackupDriver::new(
            source.clone(),
            destinations.clone(),
            map.get(source).map(str::to_string),
            config.ignored_errors.clone(),
            publisher.clone(),
        );
        pool.submit(move || driver.execute());
    }

    let bar = ProgressBar::new((sources.len() as u64) * 100);
    bar.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut errors: Vec<CopyError> = Vec::new();
    let mut finished = 0usize;
    while finished < sources.len() {
        match subscriber.receiver().recv_timeout(Duration::from_millis(100)) {
            Ok(BackupEvent::Progress(status)) => {
                bar.set_position((finished as u64) * 100 + status.percent as u64);
                bar.set_message(status.message);
            }
            Ok(BackupEvent::Error(err)) => errors.push(err),
            Ok(BackupEvent::Finished) => {
                finished += 1;
                bar.set_position((finished as u64) * 100);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    bar.finish_with_message("copy and prune complete");
    pool.shutdown();

    // reclaim folders whose source was removed from the profile
    prune_orphans(profile, &map, &EventPublisher::noop());

    if !errors.is_empty() {
        println!();
        println!("There were {} errors during the backup:", errors.len());
        for err in &errors {
            println!("  {err}");
        }
        println!();
    }

    println!("{} COMPLETED", profile.name);
    Ok(())
}
