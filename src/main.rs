use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use canopy_data::{AfmReader, read_id_list};
use canopy_forest::{
    Balance, Boosting, CandidateCount, Evaluation, FeatureFilter, ForestFileWriter, ForestWriter,
    GrowConfig, LeafSize, MissingPolicy, Objective, SampleSize, parse_category_map,
    write_case_oob, write_importance,
};

#[derive(Parser)]
#[command(name = "canopy")]
#[command(about = "Random forest and boosted forest growth over tabular data with missing values")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// RNG seed for reproducibility
    #[arg(long, default_value_t = 42, global = true)]
    seed: u64,

    /// Enable verbose (debug-level) logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Number of threads for parallel evaluation (defaults to all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,
}

/// Impurity and boosting options.
#[derive(Args, Debug, Clone)]
struct ObjectiveArgs {
    /// JSON map of category to misclassification cost
    #[arg(long)]
    cost: Option<String>,

    /// JSON map of category to class weight
    #[arg(long)]
    rfweights: Option<String>,

    /// Use entropy impurity (categorical targets)
    #[arg(long, default_value_t = false)]
    entropy: bool,

    /// Use mean absolute deviation (numeric targets)
    #[arg(long, default_value_t = false)]
    l1: bool,

    /// Use mode-based ordinal regression (numeric targets)
    #[arg(long, default_value_t = false)]
    ordinal: bool,

    /// Grow density estimation trees over the candidate features
    #[arg(long, default_value_t = false)]
    density: bool,

    /// Use adaptive boosting
    #[arg(long, default_value_t = false)]
    adaboost: bool,

    /// Use gradient boosting with this learning rate (0 = off)
    #[arg(long, default_value_t = 0.0)]
    gbt: f64,

    /// Allow boosting on more than one core
    #[arg(long, default_value_t = false)]
    multiboost: bool,
}

/// Feature selection options.
#[derive(Args, Debug, Clone)]
struct FilterArgs {
    /// File of feature names to exclude, one per line
    #[arg(long)]
    blacklist: Option<PathBuf>,

    /// Regex; matching features are excluded
    #[arg(long)]
    block: Option<String>,

    /// Regex; only matching features are used
    #[arg(long)]
    include: Option<String>,

    /// Regex; matching features are shuffled before growth
    #[arg(long)]
    shuffle: Option<String>,

    /// Number of random shuffled contrast features to add
    #[arg(long, default_value_t = 0)]
    contrasts: usize,

    /// Add a shuffled contrast of every feature
    #[arg(long, default_value_t = false)]
    contrast_all: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Grow a forest predicting one feature of a training matrix
    Grow {
        /// Path to the training AFM (tab-separated feature matrix)
        #[arg(long)]
        train: PathBuf,

        /// Name of the feature to predict, e.g. "C:class" or "N:yield"
        #[arg(long)]
        target: String,

        /// Output path for the grown forest
        #[arg(long)]
        forest: Option<PathBuf>,

        /// Output path for the feature importance report
        #[arg(long)]
        importance: Option<PathBuf>,

        /// Output path for per-case out-of-bag predictions
        #[arg(long)]
        oob_preds: Option<PathBuf>,

        /// Path to a held-out AFM to evaluate the finished forest on
        #[arg(long)]
        test: Option<PathBuf>,

        /// Number of trees to grow
        #[arg(long, default_value_t = 100)]
        trees: usize,

        /// Number of worker threads growing trees
        #[arg(long, default_value_t = 1)]
        cores: usize,

        /// Cases per tree: count, fraction, or 0 for all non-missing
        #[arg(long, default_value = "0")]
        samples: SampleSize,

        /// Candidate features per split: count, fraction, or 0 for sqrt
        #[arg(long, default_value = "0")]
        mtry: CandidateCount,

        /// Minimum leaf size: count, fraction, or 0 to infer from the task
        #[arg(long, default_value = "0")]
        leaf_size: LeafSize,

        /// Impute missing values to the feature mean or mode
        #[arg(long, default_value_t = false, conflicts_with = "split_missing")]
        impute: bool,

        /// Send missing values down a third branch
        #[arg(long, default_value_t = false)]
        split_missing: bool,

        /// Report out-of-bag error
        #[arg(long, default_value_t = false)]
        oob: bool,

        /// Log out-of-bag error after every tree
        #[arg(long, default_value_t = false)]
        progress: bool,

        /// Keep drawing candidate features until a split is found
        #[arg(long, default_value_t = false)]
        force: bool,

        /// Penalize splits by their decrease on a permuted target
        #[arg(long, default_value_t = false)]
        vet: bool,

        /// Score splits on out-of-bag cases
        #[arg(long, default_value_t = false)]
        eval_oob: bool,

        /// Train every tree on the non-missing cases without bagging
        #[arg(long, default_value_t = false)]
        no_bag: bool,

        /// Draw equal numbers of cases per target category
        #[arg(long, default_value_t = false)]
        balance: bool,

        /// Also balance over the categories of this feature
        #[arg(long)]
        balance_by: Option<String>,

        /// Shuffle the target first, for a significance baseline
        #[arg(long, default_value_t = false)]
        permute: bool,

        /// Evaluate the finished forest on the training data
        #[arg(long, default_value_t = false)]
        self_test: bool,

        #[command(flatten)]
        objective: ObjectiveArgs,

        #[command(flatten)]
        filter: FilterArgs,
    },
}

#[derive(Serialize)]
struct GrowOutput {
    target: String,
    trees_requested: usize,
    trees_collected: usize,
    converged: bool,
    train_cores: usize,
    m_try: usize,
    leaf_size: usize,
    sample_size: usize,
    n_candidates: usize,
    oob_error: Option<f64>,
    evaluation: Option<Evaluation>,
    elapsed_secs: f64,
}

fn resolve_objective(args: &ObjectiveArgs) -> Result<Objective> {
    let chosen: Vec<Objective> = [
        (args.entropy, Objective::Entropy),
        (args.l1, Objective::L1),
        (args.ordinal, Objective::Ordinal),
        (args.density, Objective::Density),
    ]
    .into_iter()
    .filter_map(|(on, objective)| on.then_some(objective))
    .collect();
    match chosen.as_slice() {
        [] => Ok(Objective::Default),
        [one] => Ok(*one),
        _ => bail!("--entropy, --l1, --ordinal and --density are mutually exclusive"),
    }
}

fn resolve_boosting(args: &ObjectiveArgs) -> Result<Boosting> {
    match (args.adaboost, args.gbt) {
        (true, gbt) if gbt > 0.0 => bail!("--adaboost and --gbt are mutually exclusive"),
        (true, _) => Ok(Boosting::Adaptive),
        (false, gbt) if gbt > 0.0 => Ok(Boosting::Gradient { learning_rate: gbt }),
        _ => Ok(Boosting::None),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match (cli.verbose, cli.quiet) {
        (true, _) => "debug",
        (_, true) => "error",
        _ => "info",
    };

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
        Command::Grow {
            train,
            target,
            forest,
            importance,
            oob_preds,
            test,
            trees,
            cores,
            samples,
            mtry,
            leaf_size,
            impute,
            split_missing,
            oob,
            progress,
            force,
            vet,
            eval_oob,
            no_bag,
            balance,
            balance_by,
            permute,
            self_test,
            objective,
            filter,
        } => {
            // 1. Read data
            let train_matrix = AfmReader::new(&train)
                .read()
                .context("failed to read training matrix")?;
            info!(
                n_features = train_matrix.n_features(),
                n_cases = train_matrix.n_cases(),
                "training matrix loaded"
            );
            let test_matrix = test
                .as_deref()
                .map(|path| AfmReader::new(path).read())
                .transpose()
                .context("failed to read test matrix")?;

            // 2. Build config
            let blacklist = filter
                .blacklist
                .as_deref()
                .map(read_id_list)
                .transpose()
                .context("failed to read blacklist")?
                .unwrap_or_default();
            let costs = objective
                .cost
                .as_deref()
                .map(parse_category_map)
                .transpose()
                .context("failed to parse --cost")?;
            let class_weights = objective
                .rfweights
                .as_deref()
                .map(parse_category_map)
                .transpose()
                .context("failed to parse --rfweights")?;
            let missing = match (impute, split_missing) {
                (true, _) => MissingPolicy::Impute,
                (_, true) => MissingPolicy::SplitMissing,
                _ => MissingPolicy::Ignore,
            };
            let balance = match (balance_by, balance) {
                (Some(secondary), _) => Balance::BySecondary(secondary),
                (None, true) => Balance::ByTarget,
                (None, false) => Balance::None,
            };

            let config = GrowConfig::new(target.clone(), trees)?
                .with_train_cores(cores)
                .with_sample_size(samples)
                .with_m_try(mtry)
                .with_leaf_size(leaf_size)
                .with_missing(missing)
                .with_boosting(resolve_boosting(&objective)?)
                .with_multiboost(objective.multiboost)
                .with_balance(balance)
                .with_no_bag(no_bag)
                .with_objective(resolve_objective(&objective)?)
                .with_costs(costs)
                .with_class_weights(class_weights)
                .with_filter(FeatureFilter {
                    blacklist,
                    block: filter.block,
                    include: filter.include,
                    shuffle: filter.shuffle,
                })
                .with_contrasts(filter.contrasts)
                .with_contrast_all(filter.contrast_all)
                .with_permute_target(permute)
                .with_force(force)
                .with_vet(vet)
                .with_eval_oob(eval_oob)
                .with_oob(oob)
                .with_case_oob(oob_preds.is_some())
                .with_importance(importance.is_some())
                .with_progress(progress)
                .with_self_test(self_test)
                .with_seed(cli.seed);

            // 3. Grow, streaming trees to the forest file
            let mut forest_writer = forest
                .as_deref()
                .map(|path| ForestFileWriter::create(path, &target, trees))
                .transpose()
                .context("failed to create forest file")?;
            let report = config
                .grow(
                    train_matrix,
                    test_matrix.as_ref(),
                    forest_writer.as_mut().map(|w| w as &mut dyn ForestWriter),
                )
                .context("forest growth failed")?;
            if let Some(writer) = forest_writer {
                writer.finish().context("failed to finish forest file")?;
            }

            // 4. Write reports
            if let Some(path) = &importance {
                write_importance(path, report.importance())
                    .context("failed to write importance report")?;
                info!(path = %path.display(), "importance written");
            }
            if let Some(path) = &oob_preds {
                write_case_oob(path, report.case_oob())
                    .context("failed to write out-of-bag predictions")?;
                info!(path = %path.display(), "out-of-bag predictions written");
            }

            // 5. Print summary
            let metadata = report.metadata();
            let output = GrowOutput {
                target,
                trees_requested: trees,
                trees_collected: report.trees_collected(),
                converged: report.converged(),
                train_cores: metadata.train_cores,
                m_try: metadata.m_try,
                leaf_size: metadata.leaf_size,
                sample_size: metadata.sample_size,
                n_candidates: metadata.n_candidates,
                oob_error: report.oob_error(),
                evaluation: report.evaluation().cloned(),
                elapsed_secs: report.elapsed().as_secs_f64(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
