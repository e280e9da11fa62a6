use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pfgap_forest::{
    Dataset, ForestConfig, ImputationLoop, ImputeConfig, InitialImputerKind, KernelRegistry,
    Label, ProximityConfig, ProximityForest, PurityMeasure, Task, TestResult, Voting,
    outlier_scores, task_seed,
};
use pfgap_io::{
    DatasetReader, ExperimentName, LabelColumn, ReadOptions, RepeatSummary, ResultWriter,
    RunSummary,
};

#[derive(Parser)]
#[command(name = "pfgap")]
#[command(about = "Proximity Forest classification, forest proximities and imputation for series data")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// RNG seed for reproducibility [default: 42, or the config file's seed]
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Number of threads for parallel computation (defaults to all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,
}

/// Layout of the input files.
#[derive(Args, Debug, Clone)]
struct ReadArgs {
    /// Field delimiter (entry separator for 2-D rows)
    #[arg(long)]
    delimiter: Option<char>,

    /// Channel separator of 2-D rows
    #[arg(long)]
    array_separator: Option<char>,

    /// Skip a header row
    #[arg(long)]
    header: bool,

    /// Where each row keeps its label
    #[arg(long, value_enum)]
    label_column: Option<LabelColumnArg>,

    /// Rows hold several channels
    #[arg(long)]
    two_d: bool,

    /// Keep non-numeric tokens as categorical values
    #[arg(long)]
    categorical: bool,

    /// Tokens read as missing values (replaces the defaults)
    #[arg(long, value_delimiter = ',')]
    missing_tokens: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LabelColumnArg {
    First,
    Last,
    None,
}

/// Forest hyper-parameters.
#[derive(Args, Debug, Clone)]
struct ForestArgs {
    /// JSON run config; flags given on the command line override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of trees
    #[arg(long)]
    trees: Option<usize>,

    /// Candidate splits evaluated per node
    #[arg(long)]
    candidates: Option<usize>,

    /// Treat labels as real-valued regression targets
    #[arg(long)]
    regression: bool,

    /// Purity measure: gini, entropy or variance
    #[arg(long)]
    purity: Option<String>,

    /// Impurity at or below which a node becomes a leaf
    #[arg(long)]
    purity_threshold: Option<f64>,

    /// Maximum tree depth (0 = unbounded)
    #[arg(long)]
    max_depth: Option<usize>,

    /// Comma-separated distance measures
    #[arg(long, value_delimiter = ',')]
    measures: Option<Vec<String>>,

    /// Regression voting: mean or median
    #[arg(long)]
    voting: Option<String>,

    /// Draw one measure per tree instead of per node
    #[arg(long)]
    measure_per_tree: bool,

    /// Break ties by first candidate instead of at random
    #[arg(long)]
    no_random_tie_break: bool,

    /// Disable parallel training, prediction and proximities
    #[arg(long)]
    sequential: bool,

    /// Write dense proximity matrices instead of sparse triples
    #[arg(long)]
    dense: bool,
}

/// Everything a run can be configured with, loadable from `--config`.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
struct RunConfig {
    read: ReadOptions,
    forest: ForestConfig,
    proximity: ProximityConfig,
    impute: ImputeConfig,
    num_repeats: Option<usize>,
}

#[derive(Subcommand)]
enum Command {
    /// Train (and optionally test) a Proximity Forest
    Train {
        /// Path to the training file
        #[arg(long)]
        train: PathBuf,

        /// Path to the test file
        #[arg(long)]
        test: Option<PathBuf>,

        /// Experiment name for output files (must match [a-zA-Z0-9_-]+)
        #[arg(long)]
        experiment: String,

        /// Output directory for result files
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// Independent train/test repetitions
        #[arg(long)]
        repeats: Option<usize>,

        /// Write train (and test) proximities of the first repetition
        #[arg(long)]
        proximities: bool,

        /// Write within-class outlier scores of the training set
        #[arg(long)]
        outliers: bool,

        /// Symmetrize proximities before scoring outliers
        #[arg(long)]
        symmetrize: bool,

        /// Save the model of the first repetition
        #[arg(long)]
        save_model: bool,

        #[command(flatten)]
        read: ReadArgs,

        #[command(flatten)]
        forest: ForestArgs,
    },

    /// Predict a dataset with a saved model
    Predict {
        /// Path to the saved model
        #[arg(long)]
        model: PathBuf,

        /// Path to the dataset to predict
        #[arg(long)]
        data: PathBuf,

        /// Experiment name for output files
        #[arg(long)]
        experiment: String,

        /// Output directory for result files
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// Write test/train proximities
        #[arg(long)]
        proximities: bool,

        /// Also write the model's train proximities
        #[arg(long)]
        train_proximities: bool,

        /// Write dense proximity matrices instead of sparse triples
        #[arg(long)]
        dense: bool,

        #[command(flatten)]
        read: ReadArgs,
    },

    /// Fill missing values with forest-proximity imputation
    Impute {
        /// Path to the training file
        #[arg(long)]
        train: PathBuf,

        /// Path to a test file imputed against the final training forest
        #[arg(long)]
        test: Option<PathBuf>,

        /// Experiment name for output files
        #[arg(long)]
        experiment: String,

        /// Output directory for result files
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// Rounds of forest re-imputation
        #[arg(long)]
        rounds: Option<usize>,

        /// Initial imputer: mean, median, mode, linear, global-mean, global-median, global-mode
        #[arg(long)]
        initial: Option<String>,

        /// Follow DTW warping paths to neighbour positions (1-D numeric data)
        #[arg(long)]
        dtw_aware: bool,

        #[command(flatten)]
        read: ReadArgs,

        #[command(flatten)]
        forest: ForestArgs,
    },
}

// --- JSON stdout output structs ---

#[derive(Serialize)]
struct TrainOutput {
    experiment: String,
    n_train: usize,
    n_test: usize,
    n_trees: usize,
    task: String,
    mean_score: Option<f64>,
    scores: Vec<Option<f64>>,
}

#[derive(Serialize)]
struct PredictOutput {
    experiment: String,
    n_instances: usize,
    model_n_trees: usize,
    model_n_train: usize,
    score: Option<f64>,
}

#[derive(Serialize)]
struct ImputeOutput {
    experiment: String,
    n_train: usize,
    n_missing: usize,
    rounds: usize,
    max_change: Vec<f64>,
    n_test_missing: Option<usize>,
}

fn load_run_config(path: Option<&Path>) -> Result<RunConfig> {
    let Some(path) = path else {
        return Ok(RunConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
}

fn apply_read_args(mut opts: ReadOptions, args: &ReadArgs) -> ReadOptions {
    if let Some(d) = args.delimiter {
        opts = opts.with_delimiter(d);
    }
    if let Some(s) = args.array_separator {
        opts = opts.with_array_separator(s);
    }
    if args.header {
        opts = opts.with_header(true);
    }
    if let Some(column) = args.label_column {
        opts = opts.with_label_column(match column {
            LabelColumnArg::First => LabelColumn::First,
            LabelColumnArg::Last => LabelColumn::Last,
            LabelColumnArg::None => LabelColumn::None,
        });
    }
    if args.two_d {
        opts = opts.with_two_d(true);
    }
    if args.categorical {
        opts = opts.with_numeric(false);
    }
    if let Some(tokens) = &args.missing_tokens {
        opts = opts.with_missing_tokens(tokens);
    }
    opts
}

fn apply_forest_args(
    mut config: ForestConfig,
    args: &ForestArgs,
    seed: Option<u64>,
) -> Result<ForestConfig> {
    if let Some(trees) = args.trees {
        config = config.with_num_trees(trees);
    }
    if let Some(c) = args.candidates {
        config = config.with_candidates_per_split(c);
    }
    if args.regression {
        config = config.with_task(Task::Regression);
    }
    if let Some(p) = &args.purity {
        config = config.with_purity(p.parse::<PurityMeasure>()?);
    }
    if let Some(t) = args.purity_threshold {
        config = config.with_purity_threshold(t);
    }
    if let Some(d) = args.max_depth {
        config = config.with_max_depth(d);
    }
    if let Some(m) = &args.measures {
        config = config.with_measures(m.iter().map(|s| s.trim().to_owned()));
    }
    if let Some(v) = &args.voting {
        config = config.with_voting(v.parse::<Voting>()?);
    }
    if args.measure_per_tree {
        config = config.with_random_dm_per_node(false);
    }
    if args.no_random_tie_break {
        config = config.with_random_tie_break(false);
    }
    if args.sequential {
        config = config.with_parallel_trees(false).with_parallel_predict(false);
    }
    if let Some(seed) = seed {
        config = config.with_seed(seed);
    }
    config.validate()?;
    Ok(config)
}

fn apply_proximity_args(config: ProximityConfig, dense: bool, sequential: bool) -> ProximityConfig {
    let mut config = config;
    if dense {
        config = config.with_sparse(false);
    }
    if sequential {
        config = config.with_parallel(false);
    }
    config
}

fn read_dataset(path: &Path, opts: &ReadOptions) -> Result<Dataset> {
    let data = DatasetReader::new(path)
        .with_options(opts.clone())
        .read()
        .with_context(|| format!("failed to read {}", path.display()))?;
    info!(path = %path.display(), n = data.len(), "dataset loaded");
    Ok(data)
}

/// Original labels of `data`, decoded through the forest's mapping.
fn original_labels(forest: &ProximityForest, data: &Dataset) -> Result<Vec<Option<Label>>> {
    data.labels()
        .iter()
        .map(|l| l.as_ref().map(|l| forest.decode(l)).transpose())
        .collect::<Result<_, _>>()
        .context("failed to decode labels")
}

/// Run the imputation loop on whichever sets still hold NaN or missing cells.
///
/// The loop trains with the run's forest and proximity settings. A gappy
/// test set is imputed against a forest fit on the imputed training set.
fn impute_before_training(
    impute: ImputeConfig,
    forest_config: &ForestConfig,
    prox_config: ProximityConfig,
    mut train_data: Dataset,
    mut test_data: Option<Dataset>,
) -> Result<(Dataset, Option<Dataset>)> {
    let test_gappy = test_data.as_ref().is_some_and(Dataset::has_unfilled);
    if !train_data.has_unfilled() && !test_gappy {
        return Ok((train_data, test_data));
    }
    let imputation = ImputationLoop::new(
        impute
            .with_forest(forest_config.clone())
            .with_proximity(prox_config),
    )?;
    let report = imputation
        .impute_train(&mut train_data)
        .context("training-set imputation failed")?;
    info!(n_missing = report.n_missing, rounds = report.rounds, "training set imputed");

    if let Some(t) = test_data.as_mut().filter(|t| t.has_unfilled()) {
        let forest = forest_config
            .fit(&train_data)
            .context("forest for test-set imputation failed")?;
        let report = imputation
            .impute_test(t, &forest, &train_data)
            .context("test-set imputation failed")?;
        info!(n_missing = report.n_missing, rounds = report.rounds, "test set imputed");
    }
    Ok((train_data, test_data))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (_, 0) => "info",
        (_, 1) => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Configure Rayon thread pool
    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure thread pool")?;
        info!(threads, "thread pool configured");
    }

    match cli.command {
        Command::Train {
            train,
            test,
            experiment,
            output_dir,
            repeats,
            proximities,
            outliers,
            symmetrize,
            save_model,
            read,
            forest,
        } => {
            let experiment_name = ExperimentName::new(experiment.clone())?;
            let run = load_run_config(forest.config.as_deref())?;
            let opts = apply_read_args(run.read, &read);
            let config = apply_forest_args(run.forest, &forest, cli.seed)?;
            let prox_config = apply_proximity_args(run.proximity, forest.dense, forest.sequential);
            let num_repeats = repeats.or(run.num_repeats).unwrap_or(1);
            if num_repeats == 0 {
                bail!("--repeats must be at least 1");
            }

            // 1. Read data; classification shares one label mapping
            let train_data = read_dataset(&train, &opts)?;
            let test_data = test.as_deref().map(|p| read_dataset(p, &opts)).transpose()?;
            let (train_data, test_data) = if config.task() == Task::Classification {
                let (train_data, mapping) = train_data.reorder_labels(None);
                let test_data = test_data.map(|t| t.reorder_labels(Some(&mapping)).0);
                (train_data, test_data)
            } else {
                (train_data, test_data)
            };

            // 2. Fill missing values before any forest sees the data
            let (train_data, test_data) =
                impute_before_training(run.impute, &config, prox_config, train_data, test_data)?;

            // 3. Repetitions
            let mut repeat_summaries = Vec::with_capacity(num_repeats);
            let mut first: Option<(ProximityForest, Option<TestResult>)> = None;
            for repeat in 0..num_repeats {
                let seed = if repeat == 0 {
                    config.seed()
                } else {
                    task_seed(config.seed(), repeat as u64)
                };
                let forest = config
                    .clone()
                    .with_seed(seed)
                    .fit(&train_data)
                    .with_context(|| format!("training failed in repetition {repeat}"))?;
                let result = test_data
                    .as_ref()
                    .map(|t| forest.test(t))
                    .transpose()
                    .with_context(|| format!("testing failed in repetition {repeat}"))?;
                info!(
                    repeat,
                    seed,
                    score = result.as_ref().and_then(TestResult::score).map(|s| s.value()),
                    "repetition finished"
                );
                repeat_summaries.push(RepeatSummary {
                    repeat,
                    seed,
                    train_ms: forest.metadata().train_time.as_millis() as u64,
                    test_ms: result.as_ref().map_or(0, |r| r.test_time().as_millis() as u64),
                    n_leaves: forest.metadata().n_leaves,
                    score: result.as_ref().and_then(TestResult::score).map(|s| s.value()),
                });
                if first.is_none() {
                    first = Some((forest, result));
                }
            }
            let Some((forest, result)) = first else {
                bail!("no repetition ran");
            };

            // 4. Proximities and outlier scores, computed before anything is written
            let train_prox = if proximities || outliers {
                Some(forest.train_proximities(&prox_config).context("train proximities failed")?)
            } else {
                None
            };
            let test_prox = match (&test_data, proximities) {
                (Some(t), true) => Some(
                    forest
                        .test_proximities(t, &prox_config)
                        .context("test proximities failed")?,
                ),
                _ => None,
            };
            let train_labels = original_labels(&forest, &train_data)?;
            let scores = match (&train_prox, outliers) {
                (Some(p), true) => Some(
                    outlier_scores(p, train_data.labels(), symmetrize)
                        .context("outlier scoring failed")?,
                ),
                _ => None,
            };

            // 5. Write artifacts
            let writer = ResultWriter::new(&output_dir, experiment_name)?;
            if let (Some(t), Some(r)) = (&test_data, &result) {
                let truth = original_labels(&forest, t)?;
                writer.write_predictions(r.predictions(), Some(&truth), r.score())?;
            }
            if proximities {
                if let Some(p) = &train_prox {
                    writer.write_proximities("train", p)?;
                }
                if let Some(p) = &test_prox {
                    writer.write_proximities("test", p)?;
                }
            }
            if let Some(s) = &scores {
                writer.write_outlier_scores(s, &train_labels)?;
            }
            if save_model {
                forest
                    .save(writer.model_path())
                    .context("failed to save model")?;
                info!(path = %writer.model_path().display(), "model saved");
            }

            let summary = RunSummary {
                train_file: train.display().to_string(),
                test_file: test.as_ref().map(|p| p.display().to_string()),
                n_train: train_data.len(),
                n_test: test_data.as_ref().map_or(0, Dataset::len),
                n_trees: config.num_trees(),
                task: config.task().to_string(),
                measures: forest.kernel_names().to_vec(),
                repeats: repeat_summaries,
            };
            writer.write_summary(&summary)?;

            // 6. Print summary
            let output = TrainOutput {
                experiment,
                n_train: summary.n_train,
                n_test: summary.n_test,
                n_trees: summary.n_trees,
                task: summary.task.clone(),
                mean_score: summary.mean_score(),
                scores: summary.repeats.iter().map(|r| r.score).collect(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Predict {
            model,
            data,
            experiment,
            output_dir,
            proximities,
            train_proximities,
            dense,
            read,
        } => {
            let experiment_name = ExperimentName::new(experiment.clone())?;
            if cli.seed.is_some() {
                warn!("--seed has no effect on a saved model");
            }

            // 1. Load model
            let forest = ProximityForest::load(&model, &KernelRegistry::with_builtins())
                .context("failed to load model")?;
            info!(
                n_trees = forest.n_trees(),
                n_train = forest.n_train(),
                measures = ?forest.kernel_names(),
                "model loaded"
            );

            // 2. Read and encode with the model's mapping
            let opts = apply_read_args(ReadOptions::new(), &read);
            let dataset = read_dataset(&data, &opts)?;
            let dataset = match (forest.config().task(), forest.mapping()) {
                (Task::Classification, Some(mapping)) => dataset.reorder_labels(Some(mapping)).0,
                _ => dataset,
            };

            // 3. Predict
            let result = forest.test(&dataset).context("prediction failed")?;
            let prox_config = apply_proximity_args(ProximityConfig::new(), dense, false);
            let test_prox = if proximities {
                Some(forest.test_proximities(&dataset, &prox_config).context("test proximities failed")?)
            } else {
                None
            };
            let train_prox = if train_proximities {
                Some(forest.train_proximities(&prox_config).context("train proximities failed")?)
            } else {
                None
            };

            // 4. Write artifacts
            let writer = ResultWriter::new(&output_dir, experiment_name)?;
            let truth = original_labels(&forest, &dataset)?;
            writer.write_predictions(result.predictions(), Some(&truth), result.score())?;
            if let Some(p) = &test_prox {
                writer.write_proximities("test", p)?;
            }
            if let Some(p) = &train_prox {
                writer.write_proximities("train", p)?;
            }

            // 5. Print summary
            let output = PredictOutput {
                experiment,
                n_instances: dataset.len(),
                model_n_trees: forest.n_trees(),
                model_n_train: forest.n_train(),
                score: result.score().map(|s| s.value()),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Impute {
            train,
            test,
            experiment,
            output_dir,
            rounds,
            initial,
            dtw_aware,
            read,
            forest,
        } => {
            let experiment_name = ExperimentName::new(experiment.clone())?;
            let run = load_run_config(forest.config.as_deref())?;
            let opts = apply_read_args(run.read, &read);

            let mut impute = run.impute;
            if let Some(r) = rounds {
                impute = ImputeConfig::new(r)?
                    .with_initial(impute.initial())
                    .with_dtw_aware(impute.dtw_aware())
                    .with_forest(impute.forest().clone())
                    .with_proximity(*impute.proximity());
            }
            if let Some(name) = &initial {
                impute = impute.with_initial(name.parse::<InitialImputerKind>()?);
            }
            if dtw_aware {
                impute = impute.with_dtw_aware(true);
            }
            let forest_config = apply_forest_args(impute.forest().clone(), &forest, cli.seed)?;
            let prox_config = apply_proximity_args(*impute.proximity(), forest.dense, forest.sequential);
            let impute = impute.with_forest(forest_config).with_proximity(prox_config);
            let imputation = ImputationLoop::new(impute.clone())?;

            // 1. Impute the training set
            let mut train_data = read_dataset(&train, &opts)?;
            let report = imputation
                .impute_train(&mut train_data)
                .context("training-set imputation failed")?;

            // 2. Optionally impute the test set against a forest on the imputed training set
            let mut test_data = test.as_deref().map(|p| read_dataset(p, &opts)).transpose()?;
            let test_report = match &mut test_data {
                Some(t) => {
                    let final_forest = impute
                        .forest()
                        .fit(&train_data)
                        .context("final forest training failed")?;
                    Some(
                        imputation
                            .impute_test(t, &final_forest, &train_data)
                            .context("test-set imputation failed")?,
                    )
                }
                None => None,
            };

            // 3. Write imputed data
            let writer = ResultWriter::new(&output_dir, experiment_name)?;
            writer.write_imputed("train", &train_data, &opts)?;
            if let Some(t) = &test_data {
                writer.write_imputed("test", t, &opts)?;
            }

            // 4. Print summary
            let output = ImputeOutput {
                experiment,
                n_train: train_data.len(),
                n_missing: report.n_missing,
                rounds: report.rounds,
                max_change: report.max_change,
                n_test_missing: test_report.map(|r| r.n_missing),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
