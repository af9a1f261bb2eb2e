use std::{collections::HashSet, path::PathBuf};

use clap::{AppSettings, ArgGroup, Args, Parser, Subcommand};
use log::{info, warn};
use marlu::RADec;

use gleam_x::{
    apparent::CacheUpdate,
    beam::{beam_power_at_radec, FeeBeam},
    connect, make_db,
    metadata::{import_observation, ImportOutcome, MetadataClient},
    metafits::MetafitsContext,
    obsids::{read_obsids_file, write_obsids_file},
    pool::{progress_bar, run_pool},
    setup_logging,
    sources::bright_sources,
    track::parse_obs_status,
    DbConfig, GleamXError, ObsId,
};

#[derive(Parser)]
#[clap(version, about)]
#[clap(global_setting(AppSettings::DeriveDisplayOrder))]
#[clap(disable_help_subcommand = true)]
#[clap(infer_long_args = true)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// A TOML file describing the database to use. If not given, GXDBCONFIG
    /// or the GXDB* variables are used.
    #[clap(long, global = true)]
    db_config: Option<PathBuf>,

    /// The verbosity of the program. Increase by specifying multiple times
    /// (e.g. -vv). The default is to print only high-level information.
    #[clap(short, long, parse(from_occurrences), global = true)]
    verbosity: u8,

    /// Disable progress bars.
    #[clap(long, global = true)]
    no_progress_bars: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Create the GLEAM-X tables.
    MakeDb {
        /// Drop the existing database (MySQL) or tables (SQLite) first.
        #[clap(long)]
        drop: bool,
    },

    /// Add the bright calibrator sources to the sources table.
    PopulateSources,

    /// Add observations to the registry from the MWA metadata web service.
    ImportObs {
        /// A file of obsids, one per line.
        #[clap(long)]
        obsids: PathBuf,

        /// Drop obsids already in the registry before querying anything.
        #[clap(short, long)]
        skip_existing: bool,
    },

    /// Add observations to the registry from metafits files.
    ImportMetafits {
        #[clap(required = true)]
        metafits: Vec<PathBuf>,
    },

    /// Fill the apparent-flux cache for observations.
    ApparentFlux(ApparentFluxArgs),

    /// Write the obsids in the registry to a file, one per line.
    ExportObsids {
        /// The file to write.
        #[clap(long)]
        output: PathBuf,

        /// Only write observations with this status.
        #[clap(long)]
        status: Option<String>,

        /// Overwrite the output file if it already exists.
        #[clap(long)]
        clobber: bool,
    },

    /// Print "true" if an observation has apparent fluxes, "false" otherwise.
    CheckObsid { obs_id: ObsId },

    /// Print the XX and YY primary-beam power towards a direction for the
    /// middle of an observation.
    BeamValue {
        /// Right ascension [degrees].
        #[clap(long, allow_hyphen_values = true)]
        ra: f64,

        /// Declination [degrees].
        #[clap(long, allow_hyphen_values = true)]
        dec: f64,

        /// The observation's metafits file.
        #[clap(long)]
        metafits: PathBuf,

        /// The FEE beam HDF5 file. If not given, MWA_BEAM_FILE is used.
        #[clap(long)]
        beam_file: Option<PathBuf>,
    },
}

#[derive(Args)]
#[clap(group(ArgGroup::new("which").required(true).args(&["obs-id", "obsids", "all"])))]
struct ApparentFluxArgs {
    /// Observations to process.
    #[clap(long, multiple_values(true))]
    obs_id: Vec<ObsId>,

    /// A file of obsids to process, one per line.
    #[clap(long)]
    obsids: Option<PathBuf>,

    /// Process every observation in the registry.
    #[clap(long)]
    all: bool,

    /// Recompute apparent fluxes even if they're already cached.
    #[clap(long)]
    force: bool,

    /// The number of observations to process at once. The default is the
    /// number of CPU cores.
    #[clap(short, long)]
    workers: Option<usize>,

    /// The FEE beam HDF5 file. If not given, MWA_BEAM_FILE is used.
    #[clap(long)]
    beam_file: Option<PathBuf>,
}

fn main() {
    if let Err(e) = try_main() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<(), GleamXError> {
    let cli = Cli::parse();
    setup_logging(cli.verbosity);

    // Everything but beam-value needs the registry.
    let db_config = cli.db_config.clone();
    let resolve_config = || -> Result<DbConfig, GleamXError> {
        let config = DbConfig::resolve(db_config.as_deref())?;
        info!("Using {}", config.describe());
        Ok(config)
    };

    match cli.command {
        Command::MakeDb { drop } => {
            make_db(&resolve_config()?, drop)?;
            info!("Created the GLEAM-X tables");
        }

        Command::PopulateSources => {
            let mut registry = connect(&resolve_config()?)?;
            registry.insert_sources(&bright_sources()?)?;
        }

        Command::ImportObs {
            obsids,
            skip_existing,
        } => {
            let mut registry = connect(&resolve_config()?)?;
            let mut ids = read_obsids_file(&obsids)?;
            if skip_existing {
                let existing: HashSet<ObsId> = registry.observation_ids()?.into_iter().collect();
                ids.retain(|id| !existing.contains(id));
            }
            info!("{} obs_ids to download...", ids.len());

            let client = MetadataClient::new()?;
            let mut failed = 0;
            for (count, &obs_id) in ids.iter().enumerate() {
                info!("{count}) {obs_id}");
                match import_observation(&mut registry, &client, obs_id) {
                    Ok(ImportOutcome::Imported | ImportOutcome::AlreadyImported) => (),
                    Err(e) => {
                        warn!("Couldn't import {obs_id}: {e}");
                        failed += 1;
                    }
                }
            }
            if failed > 0 {
                return Err(GleamXError::PartialFailure {
                    failed,
                    total: ids.len(),
                });
            }
        }

        Command::ImportMetafits { metafits } => {
            let mut registry = connect(&resolve_config()?)?;
            for file in metafits {
                let context = MetafitsContext::read(&file)?;
                if registry.observation_exists(context.obs_id)? {
                    info!("Obsid `{}` is already imported.", context.obs_id);
                    continue;
                }
                registry.insert_observation(&context.to_observation())?;
                info!("Imported {} from {}", context.obs_id, file.display());
            }
        }

        Command::ApparentFlux(args) => {
            apparent_flux(&resolve_config()?, args, cli.no_progress_bars)?
        }

        Command::ExportObsids {
            output,
            status,
            clobber,
        } => {
            let mut registry = connect(&resolve_config()?)?;
            let ids = match status {
                Some(s) => registry.observation_ids_with_status(parse_obs_status(&s)?)?,
                None => registry.observation_ids()?,
            };
            write_obsids_file(&ids, &output, clobber)?;
        }

        Command::CheckObsid { obs_id } => {
            let mut registry = connect(&resolve_config()?)?;
            println!("{}", registry.check_for_obsid(obs_id)?);
        }

        Command::BeamValue {
            ra,
            dec,
            metafits,
            beam_file,
        } => {
            let context = MetafitsContext::read(metafits)?;
            let beam = FeeBeam::from_file_or_env(beam_file.as_deref())?;
            let [xx, yy] = beam_power_at_radec(
                &beam,
                RADec::from_degrees(ra, dec),
                context.midpoint(),
                context.centre_freq_hz(),
                &context.delays,
            )?;
            println!("{xx} {yy}");
        }
    }

    Ok(())
}

fn apparent_flux(
    config: &DbConfig,
    args: ApparentFluxArgs,
    no_progress_bars: bool,
) -> Result<(), GleamXError> {
    let obs_ids = if args.all {
        connect(config)?.observation_ids()?
    } else if let Some(file) = &args.obsids {
        read_obsids_file(file)?
    } else {
        args.obs_id
    };
    if obs_ids.is_empty() {
        warn!("No observations to process");
        return Ok(());
    }

    let beam = FeeBeam::from_file_or_env(args.beam_file.as_deref())?;
    let force = args.force;
    let summary = run_pool(
        &obs_ids,
        args.workers,
        progress_bar(obs_ids.len(), "Apparent fluxes", no_progress_bars),
        |&obs_id| -> Result<CacheUpdate, GleamXError> {
            // Each worker gets its own connection.
            let mut registry = connect(config)?;
            Ok(registry.insert_sources_for_obsid(obs_id, &beam, force)?)
        },
    )?;

    info!(
        "{} of {} observations succeeded",
        summary.succeeded.len(),
        summary.total()
    );
    for (obs_id, reason) in &summary.failed {
        eprintln!("{obs_id}: {reason}");
    }
    if summary.all_succeeded() {
        Ok(())
    } else {
        Err(GleamXError::PartialFailure {
            failed: summary.failed.len(),
            total: summary.total(),
        })
    }
}
