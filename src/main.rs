use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::info;

use ncc_resolve::config::{CleanParams, IndexParams, PipelineConfig, ResolveParams, PRIMARY_LIMIT, SEP_THRESHOLD};
use ncc_resolve::pipeline::score_contacts;
use ncc_resolve::{remove_isolated_unambig, resolve_contacts, run_pipeline, CancelToken, PassReport};

/// Resolve ambiguous single-cell Hi-C contacts in NCC files.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log verbosity level
    #[arg(long, global = true, default_value = "info")]
    log_level: LogLevel,
    /// Write log output to a file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    /// Abort the run after this many seconds; no partial output is left behind
    #[arg(long, global = true)]
    max_runtime: Option<u64>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Args, Debug)]
struct IndexArgs {
    /// Bin size and local-neighbourhood distance, in bp
    #[arg(long, default_value_t = SEP_THRESHOLD)]
    sep_threshold: i64,
    /// Maximum number of active contacts accepted from one file
    #[arg(long, default_value_t = 5_000_000)]
    max_contacts: usize,
    /// Accept any number of contacts
    #[arg(long, conflicts_with = "max_contacts")]
    no_contact_limit: bool,
}

impl IndexArgs {
    fn params(&self) -> IndexParams {
        IndexParams {
            sep_threshold: self.sep_threshold,
            max_contacts: (!self.no_contact_limit).then_some(self.max_contacts),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Drop dense inter-homologue contacts and isolated unambiguous contacts
    Clean {
        input: PathBuf,
        output: PathBuf,
        /// Network score below which an unambiguous contact is isolated
        #[arg(long, default_value_t = 0.01)]
        threshold: f64,
        /// Percentile of same-chromosome bin occupancy used as density ceiling
        #[arg(long, default_value_t = 90.0)]
        homo_trans_dens_quant: f64,
        #[command(flatten)]
        index: IndexArgs,
    },
    /// Run one resolution pass over ambiguity groups
    Resolve {
        input: PathBuf,
        output: PathBuf,
        /// Ratio by which the best candidate must beat the next one
        #[arg(long, default_value_t = 2.0)]
        score_threshold: f64,
        /// Minimum trans closeness for a chromosome pair to stay a candidate
        #[arg(long, default_value_t = 5.0)]
        min_trans_relay: f64,
        /// Remove groups without network support on any candidate
        #[arg(long)]
        remove_isolated: bool,
        /// Remove every positionally ambiguous group
        #[arg(long)]
        remove_pos_ambig: bool,
        #[command(flatten)]
        index: IndexArgs,
    },
    /// Clean, then run the iterated resolution passes
    Pipeline {
        input: PathBuf,
        /// Directory for pass outputs [default: next to the input]
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
        /// JSON pipeline configuration; unnamed values keep their defaults
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Also remove positionally ambiguous groups in the final pass
        #[arg(long)]
        remove_pos_ambig: bool,
    },
    /// Print the network score of every active contact
    Score {
        input: PathBuf,
        /// Secondary (relay) search limit; 0 disables the relay search
        #[arg(long, default_value_t = 0.0)]
        secondary_limit: f64,
        #[arg(long, default_value_t = PRIMARY_LIMIT)]
        primary_limit: f64,
        #[command(flatten)]
        index: IndexArgs,
    },
}

fn init_logging(cli: &Cli) -> Result<()> {
    let mut log_builder = env_logger::Builder::from_default_env();
    log_builder
        .filter_level(cli.log_level.to_level_filter())
        .format_module_path(false);
    if let Some(ref path) = cli.log_file {
        let file = std::fs::File::create(path).with_context(|| format!("Could not open log file '{}'", path.display()))?;
        log_builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    log_builder.init();
    Ok(())
}

fn report_pass(report: &PassReport) {
    info!(
        "Resolved {} groups, removed {}; rewrote {} of {} lines",
        report.resolved, report.removed, report.rewrite.lines_rewritten, report.rewrite.lines_written
    );
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;
    let cancel = CancelToken::new();
    if let Some(secs) = cli.max_runtime {
        info!("Run will be cancelled after {} s", secs);
        cancel.cancel_after(Duration::from_secs(secs));
    }

    match &cli.command {
        Commands::Clean {
            input,
            output,
            threshold,
            homo_trans_dens_quant,
            index,
        } => {
            let params = CleanParams {
                threshold: *threshold,
                homo_trans_dens_quant: *homo_trans_dens_quant,
            };
            let report = remove_isolated_unambig(input, output, &index.params(), &params, &cancel)
                .with_context(|| format!("Cleaning {} failed", input.display()))?;
            report_pass(&report);
        }
        Commands::Resolve {
            input,
            output,
            score_threshold,
            min_trans_relay,
            remove_isolated,
            remove_pos_ambig,
            index,
        } => {
            let params = ResolveParams {
                score_threshold: *score_threshold,
                min_trans_relay: *min_trans_relay,
                remove_isolated: *remove_isolated,
                remove_pos_ambig: *remove_pos_ambig,
            };
            let report = resolve_contacts(input, output, &index.params(), &params, &cancel)
                .with_context(|| format!("Resolving {} failed", input.display()))?;
            report_pass(&report);
        }
        Commands::Pipeline {
            input,
            out_dir,
            config,
            remove_pos_ambig,
        } => {
            let mut pipeline_config = match config {
                Some(path) => PipelineConfig::load(path)
                    .with_context(|| format!("Error loading pipeline config {}", path.display()))?,
                None => PipelineConfig::default(),
            };
            if *remove_pos_ambig {
                if let Some(last) = pipeline_config.passes.last_mut() {
                    last.remove_pos_ambig = true;
                }
            }

            let report = run_pipeline(input, out_dir.as_deref(), &pipeline_config, &cancel)
                .with_context(|| format!("Pipeline on {} failed", input.display()))?;
            report_pass(&report.clean);
            for pass in &report.passes {
                report_pass(pass);
            }
            if let Some(path) = report.final_output() {
                println!("{}", path.display());
            }
        }
        Commands::Score {
            input,
            secondary_limit,
            primary_limit,
            index,
        } => {
            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            let secondary = (*secondary_limit != 0.0).then_some(*secondary_limit);
            let n_scored = score_contacts(input, &index.params(), *primary_limit, secondary, &mut out)
                .with_context(|| format!("Scoring {} failed", input.display()))?;
            out.flush()?;
            info!("Scored {} contacts", n_scored);
        }
    }

    Ok(())
}
