#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use log::info;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process;

use genomic_neuralnet::analysis::data::{available_traits, load_dataset, load_markers};
use genomic_neuralnet::analysis::experiment::ExperimentConfig;
use genomic_neuralnet::analysis::runner::{
    NamedPredictor, optimize, parse_predictor, ridge_grid, split_by_model,
};
use genomic_neuralnet::analysis::shelf::{Shelf, ShelfKey};
use genomic_neuralnet::analysis::summary::{
    aggregate, render_report_chart, report_rows, write_report,
};
use genomic_neuralnet::config::RunSettings;
use genomic_neuralnet::prediction::predict_with_network;

/// Network hyperparameters that override the experiment file.
#[derive(Args)]
pub struct NetworkArgs {
    /// Hidden-layer widths, input side first (e.g. `8,4`)
    #[arg(long, value_delimiter = ',', value_name = "WIDTHS")]
    pub hidden: Option<Vec<usize>>,

    /// Full-training epoch budget
    #[arg(long)]
    pub epochs: Option<usize>,

    /// Weight penalty coefficient on every dense kernel
    #[arg(long)]
    pub weight_decay: Option<f64>,

    /// Probability of dropping a hidden unit during training
    #[arg(long)]
    pub dropout: Option<f64>,

    /// Initial Nadam learning rate
    #[arg(long)]
    pub learning_rate: Option<f64>,
}

#[derive(Args)]
pub struct PredictArgs {
    /// Training marker table (sample_id + one column per marker)
    pub markers: PathBuf,

    /// Phenotype table (sample_id + one column per trait)
    pub phenotypes: PathBuf,

    /// Marker table of the samples to predict
    #[arg(long, value_name = "PATH")]
    pub test_markers: PathBuf,

    /// Trait column to train on
    #[arg(long = "trait", value_name = "NAME")]
    pub trait_name: String,

    /// Optional TOML experiment file
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub network: NetworkArgs,

    /// Seed for candidate initialization, shuffling and dropout
    #[arg(long, default_value = "0")]
    pub seed: u64,

    /// Train for the fixed timing budget and report the fitting time
    #[arg(long)]
    pub time_stats: bool,

    /// Render the training loss curve
    #[arg(long)]
    pub plot: bool,

    /// Where to write the predictions
    #[arg(long, default_value = "predictions.tsv")]
    pub output: PathBuf,
}

#[derive(Args)]
pub struct OptimizeArgs {
    /// Marker table (sample_id + one column per marker)
    pub markers: PathBuf,

    /// Phenotype table (sample_id + one column per trait)
    pub phenotypes: PathBuf,

    /// Trait to evaluate. Every trait in the phenotype table when omitted
    #[arg(long = "trait", value_name = "NAME")]
    pub trait_name: Option<String>,

    /// Optional TOML experiment file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Predictor to evaluate, repeatable (e.g. `rr_alpha=101`, `nn_hidden=5`)
    #[arg(long = "predictor", value_name = "SPEC")]
    pub predictors: Vec<String>,

    #[command(flatten)]
    pub network: NetworkArgs,

    #[arg(long)]
    pub folds: Option<usize>,

    #[arg(long)]
    pub runs: Option<usize>,

    /// Seed for fold shuffling and stochastic models
    #[arg(long)]
    pub seed: Option<u64>,

    /// Species name recorded in the shelf
    #[arg(long)]
    pub species: Option<String>,

    /// Accelerator name recorded in the shelf
    #[arg(long)]
    pub accelerator: Option<String>,

    /// Shelf directory to store the results in
    #[arg(long, value_name = "DIR")]
    pub shelf: Option<PathBuf>,
}

#[derive(Args)]
pub struct CompareArgs {
    /// Shelf directory holding optimization results
    #[arg(long, value_name = "DIR")]
    pub shelf: PathBuf,

    /// Only report models whose name starts with this prefix (e.g. `N`)
    #[arg(long)]
    pub model_prefix: Option<String>,

    /// Where to write the summary table
    #[arg(long, default_value = "accuracy_summary.tsv")]
    pub output: PathBuf,

    /// Height of the terminal bar chart
    #[arg(long, default_value = "20")]
    pub chart_height: u16,
}

#[derive(Parser)]
#[command(
    name = "genomic-neuralnet",
    about = "Genomic prediction with best-of-N neural networks and linear baselines",
    long_about = "Fits neural networks and regularized linear models that predict trait values \
    from genetic markers, evaluates them by cross-validated correlation and compares the \
    stored results."
)]
pub struct Cli {
    /// Log at debug level, including per-epoch training losses
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a network on one trait and predict new samples
    #[command(about = "Train a network and predict new samples (outputs: predictions.tsv)")]
    Predict(PredictArgs),

    /// Evaluate predictors by repeated K-fold cross-validation
    #[command(about = "Cross-validate predictors and report mean and sd accuracy")]
    Optimize(OptimizeArgs),

    /// Summarize stored results into a report
    #[command(about = "Compare shelved results (outputs: accuracy_summary.tsv)")]
    Compare(CompareArgs),

    /// Display version and build information
    #[command(about = "Display version and build information")]
    Version,
}

fn main() {
    let cli = Cli::parse();
    let Cli { verbose, command } = cli;

    let log_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    let result = match command {
        Some(Commands::Predict(args)) => predict(args, verbose),
        Some(Commands::Optimize(args)) => run_optimize(args),
        Some(Commands::Compare(args)) => compare(args),
        Some(Commands::Version) => {
            print_version_info();
            Ok(())
        }
        None => {
            if let Err(e) = Cli::command().print_help() {
                eprintln!("Error: {e}");
            }
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn apply_network_args(experiment: &mut ExperimentConfig, args: &NetworkArgs) {
    let network = &mut experiment.network;
    if let Some(hidden) = &args.hidden {
        network.hidden_layers = hidden.clone();
    }
    if let Some(epochs) = args.epochs {
        network.epochs = epochs;
    }
    if let Some(weight_decay) = args.weight_decay {
        network.weight_decay = weight_decay;
    }
    if let Some(dropout) = args.dropout {
        network.dropout_prob = dropout;
    }
    if args.learning_rate.is_some() {
        network.learning_rate = args.learning_rate;
    }
}

#[derive(Serialize)]
struct PredictionRow<'a> {
    sample_id: &'a str,
    prediction: f64,
}

fn write_predictions(
    path: &Path,
    sample_ids: &[String],
    predictions: &[f64],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(BufWriter::new(File::create(path)?));
    for (sample_id, &prediction) in sample_ids.iter().zip(predictions) {
        writer.serialize(PredictionRow {
            sample_id,
            prediction,
        })?;
    }
    writer.flush()?;
    Ok(())
}

fn predict(args: PredictArgs, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut experiment = ExperimentConfig::load_or_default(args.config.as_deref())?;
    apply_network_args(&mut experiment, &args.network);
    let config = experiment
        .network
        .with_plot(args.plot)
        .with_verbose(verbose);

    let dataset = load_dataset(&args.markers, &args.phenotypes, &args.trait_name)?;
    let test = load_markers(&args.test_markers)?;
    let test_x = test.aligned_to(&dataset.marker_names)?;

    let settings = RunSettings {
        collect_time_stats: args.time_stats,
        seed: args.seed,
    };
    let run = predict_with_network(
        dataset.markers.view(),
        dataset.phenotype.view(),
        test_x.view(),
        &config,
        settings,
    )?;
    if let Some(loss) = run.history.last() {
        info!("Final training loss on the scaled targets: {loss:.6}");
    }

    write_predictions(&args.output, &test.sample_ids, &run.predictions.to_vec())?;
    println!(
        "Predictions for {} samples written to {}",
        test.sample_ids.len(),
        args.output.display()
    );
    Ok(())
}

fn resolve_predictors(
    experiment: &ExperimentConfig,
    cli_predictors: &[String],
) -> Result<Vec<NamedPredictor>, Box<dyn std::error::Error>> {
    let names = if cli_predictors.is_empty() {
        &experiment.predictors
    } else {
        cli_predictors
    };
    if names.is_empty() {
        return Ok(ridge_grid());
    }
    let predictors = names
        .iter()
        .map(|name| parse_predictor(name, &experiment.network, &experiment.backprop))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(predictors)
}

fn run_optimize(args: OptimizeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut experiment = ExperimentConfig::load_or_default(args.config.as_deref())?;
    apply_network_args(&mut experiment, &args.network);
    let cv = &mut experiment.cross_validation;
    if let Some(folds) = args.folds {
        cv.folds = folds;
    }
    if let Some(runs) = args.runs {
        cv.runs = runs;
    }
    if let Some(seed) = args.seed {
        cv.seed = seed;
    }
    if let Some(species) = args.species {
        experiment.species = species;
    }
    if let Some(accelerator) = args.accelerator {
        experiment.accelerator = accelerator;
    }

    let predictors = resolve_predictors(&experiment, &args.predictors)?;
    let traits = match args.trait_name {
        Some(name) => vec![name],
        None => available_traits(&args.phenotypes)?,
    };
    let shelf = args.shelf.map(Shelf::open);

    for trait_name in traits {
        let dataset = load_dataset(&args.markers, &args.phenotypes, &trait_name)?;
        let result = optimize(&dataset, &predictors, &experiment.cross_validation)?;

        println!("Trait: {trait_name}");
        for row in &result.rows {
            println!(
                "{} accuracy: mean {:.4} sd {:.4}",
                row.label, row.mean, row.std_dev
            );
        }
        if let Some(best) = result.best() {
            println!("Best: {} ({:.4})", best.label, best.mean);
        }

        if let Some(shelf) = &shelf {
            let key = ShelfKey::new(&experiment.species, &trait_name, &experiment.accelerator);
            for (model, model_result) in split_by_model(&predictors, &result) {
                shelf.store(model, &key, model_result)?;
            }
            println!(
                "Results for '{}' stored in {}",
                key.encode(),
                shelf.root().display()
            );
        }
    }
    Ok(())
}

fn compare(args: CompareArgs) -> Result<(), Box<dyn std::error::Error>> {
    let shelf = Shelf::open(&args.shelf);
    let records = aggregate(&shelf.load_all()?, args.model_prefix.as_deref())?;
    if records.is_empty() {
        return Err(Box::new(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("No stored results found in {}", args.shelf.display()),
        )));
    }

    write_report(
        &report_rows(&records),
        BufWriter::new(File::create(&args.output)?),
    )?;
    println!("{}", render_report_chart(&records, args.chart_height));
    println!(
        "Summary of {} records written to {}",
        records.len(),
        args.output.display()
    );
    Ok(())
}

/// Format seconds into a human-readable duration like "2.4 hours ago"
fn format_duration_ago(seconds: u64) -> String {
    const MINUTE: u64 = 60;
    const HOUR: u64 = 60 * MINUTE;
    const DAY: u64 = 24 * HOUR;

    if seconds < MINUTE {
        format!("{seconds} seconds ago")
    } else if seconds < HOUR {
        format!("{:.1} minutes ago", seconds as f64 / MINUTE as f64)
    } else if seconds < DAY {
        format!("{:.1} hours ago", seconds as f64 / HOUR as f64)
    } else {
        format!("{:.1} days ago", seconds as f64 / DAY as f64)
    }
}

fn print_version_info() {
    let version = env!("CARGO_PKG_VERSION");
    let build_timestamp: u64 = env!("GENOMIC_NEURALNET_BUILD_TIMESTAMP")
        .parse()
        .unwrap_or(0);

    println!("genomic-neuralnet {version}");

    if build_timestamp > 0 {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        println!("Built: {}", format_duration_ago(now.saturating_sub(build_timestamp)));
    }
}
