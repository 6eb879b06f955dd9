//! Concurrent forest growth.
//!
//! Workers each own a tree buffer and a scratch set. A worker samples its
//! cases, grows the tree into a split log, applies the boosting update under
//! the shared boost lock and hands the tree, its log and its out-of-bag
//! cases to the coordinator over a capacity-one channel. Only the
//! coordinator touches the importance, depth and vote totals, and only for
//! trees it collects: a tree finished after the quota is met, or one that
//! converged, leaves no trace. The coordinator hands a buffer back: the same
//! one, or one with a fresh tree when the tree is retained for evaluation.
//! Dropping the coordinator's channel ends releases every worker once the
//! quota is met.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;

use canopy_data::{Feature, FeatureMatrix};
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use crate::bagger::{
    Bagger, BalancedSampler, BootstrapSampler, NoBagSampler, SecondaryBalancedSampler,
    non_missing_cases,
};
use crate::config::{Balance, Boosting, GrowConfig, MissingPolicy, Objective};
use crate::error::GrowError;
use crate::evaluate::evaluate;
use crate::importance::importance_rows;
use crate::result::{CaseOob, GrowMetadata, GrowReport};
use crate::running_mean::{RunningMean, running_means};
use crate::split::{InducerParams, SplitScratch};
use crate::tally::{Aggregation, CatBallotBox, NumBallotBox, VoteTally};
use crate::target::{
    AdaBoostTarget, CatTarget, DensityTarget, EntropyTarget, GradBoostTarget, L1Target,
    NumAdaBoostTarget, NumTarget, OrdinalTarget, RegretTarget, Target, WrfTarget,
};
use crate::tree::{SplitLog, Tree};
use crate::writer::ForestWriter;

/// A worker's per-tree buffers.
#[derive(Debug)]
struct Grown {
    tree: Tree,
    splits: SplitLog,
    oob: Vec<usize>,
}

impl Grown {
    fn new(target: &str) -> Self {
        Self {
            tree: Tree::new(target),
            splits: SplitLog::default(),
            oob: Vec::new(),
        }
    }
}

/// Message from a worker to the coordinator.
#[derive(Debug)]
enum Handoff {
    Tree(Grown),
    /// A boosting round fit the data perfectly; no more trees are needed.
    Converged,
}

/// Run state shared by the workers and the coordinator. The tally and the
/// accumulators are written by the coordinator alone.
struct Shared<'a> {
    matrix: &'a FeatureMatrix,
    target: &'a dyn Target,
    bagger: &'a dyn Bagger,
    tally: Option<&'a dyn VoteTally>,
    importance: Option<&'a [RunningMean]>,
    min_depth: &'a [RunningMean],
    candidates: &'a [usize],
    non_missing: &'a [usize],
    params: InducerParams,
    sample_size: usize,
    track_oob: bool,
    halted: AtomicBool,
    boost_lock: Mutex<()>,
}

#[derive(Debug, Default)]
struct Collected {
    trees_collected: usize,
    converged: bool,
    retained: Vec<Tree>,
}

fn compile(pattern: Option<&str>) -> Result<Option<Regex>, GrowError> {
    pattern
        .map(|p| {
            Regex::new(p).map_err(|source| GrowError::InvalidPattern {
                pattern: p.to_string(),
                source,
            })
        })
        .transpose()
}

/// Column indices eligible for splitting: everything except the target,
/// block matches, include misses and blacklisted names.
pub(crate) fn candidate_features(
    config: &GrowConfig,
    matrix: &FeatureMatrix,
    target_index: usize,
) -> Result<Vec<usize>, GrowError> {
    let block = compile(config.filter.block.as_deref())?;
    let include = compile(config.filter.include.as_deref())?;

    let mut excluded = vec![false; matrix.n_features()];
    excluded[target_index] = true;
    for (i, feature) in matrix.features().iter().enumerate() {
        let name = feature.name();
        if block.as_ref().is_some_and(|re| re.is_match(name))
            || include.as_ref().is_some_and(|re| !re.is_match(name))
        {
            excluded[i] = true;
        }
    }
    for id in &config.filter.blacklist {
        match matrix.feature_index(id) {
            Some(i) => excluded[i] = true,
            None => warn!(feature = %id, "blacklisted feature not found in data"),
        }
    }

    let candidates: Vec<usize> = (0..matrix.n_features()).filter(|&i| !excluded[i]).collect();
    if candidates.is_empty() {
        return Err(GrowError::NoCandidateFeatures);
    }
    Ok(candidates)
}

fn incompatible(reason: &str) -> GrowError {
    GrowError::IncompatibleOptions {
        reason: reason.to_string(),
    }
}

/// Pick the impurity objective for the configured task. `n_samples` is
/// the number of cases each tree is grown on.
pub(crate) fn build_target(
    config: &GrowConfig,
    matrix: &FeatureMatrix,
    target_index: usize,
    candidates: &[usize],
    n_samples: usize,
) -> Result<Box<dyn Target>, GrowError> {
    let feature = matrix.feature(target_index);
    let name = feature.name().to_string();

    if config.objective == Objective::Density {
        if config.boosting != Boosting::None {
            return Err(incompatible("density estimation cannot be boosted"));
        }
        let features = candidates.iter().map(|&i| matrix.feature(i).clone()).collect();
        return Ok(Box::new(DensityTarget::new(
            feature.clone(),
            features,
            n_samples,
        )));
    }

    match feature {
        Feature::Categorical(cat) => {
            let purpose = match (config.objective, config.boosting) {
                (Objective::L1, _) => Some("L1 impurity"),
                (Objective::Ordinal, _) => Some("ordinal regression"),
                (_, Boosting::Gradient { .. }) => Some("gradient boosting"),
                _ => None,
            };
            if let Some(purpose) = purpose {
                return Err(GrowError::NotNumeric { name, purpose });
            }

            let entropy = config.objective == Objective::Entropy;
            let n_reweights = usize::from(config.costs.is_some())
                + usize::from(config.class_weights.is_some())
                + usize::from(entropy);
            if n_reweights > 1 {
                return Err(incompatible(
                    "costs, class weights and entropy are mutually exclusive",
                ));
            }

            let base = CatTarget::new(cat.clone());
            if config.boosting == Boosting::Adaptive {
                if n_reweights > 0 {
                    return Err(incompatible(
                        "adaptive boosting cannot use costs, class weights or entropy",
                    ));
                }
                return Ok(Box::new(AdaBoostTarget::new(base)));
            }
            if let Some(costs) = &config.costs {
                return Ok(Box::new(RegretTarget::new(base, costs)?));
            }
            if let Some(weights) = &config.class_weights {
                return Ok(Box::new(WrfTarget::new(base, weights)?));
            }
            if entropy {
                return Ok(Box::new(EntropyTarget::new(base)));
            }
            Ok(Box::new(base))
        }
        Feature::Numeric(num) => {
            let purpose = if config.costs.is_some() {
                Some("misclassification costs")
            } else if config.class_weights.is_some() {
                Some("class weights")
            } else if config.objective == Objective::Entropy {
                Some("entropy impurity")
            } else {
                None
            };
            if let Some(purpose) = purpose {
                return Err(GrowError::NotCategorical { name, purpose });
            }

            let base = NumTarget::new(num.clone());
            let base: Box<dyn Target> = match config.objective {
                Objective::L1 => Box::new(L1Target::new(base)),
                Objective::Ordinal => Box::new(OrdinalTarget::new(base)),
                _ => Box::new(base),
            };
            let target: Box<dyn Target> = match config.boosting {
                Boosting::Gradient { learning_rate } => {
                    Box::new(GradBoostTarget::new(base, learning_rate)?)
                }
                Boosting::Adaptive => Box::new(NumAdaBoostTarget::new(base)?),
                Boosting::None => base,
            };
            Ok(target)
        }
    }
}

fn build_bagger(
    config: &GrowConfig,
    matrix: &FeatureMatrix,
    target: &Feature,
) -> Result<Box<dyn Bagger>, GrowError> {
    if config.no_bag {
        return Ok(Box::new(NoBagSampler::new(target)));
    }
    let by_target = |purpose| {
        target.as_categorical().ok_or_else(|| GrowError::NotCategorical {
            name: target.name().to_string(),
            purpose,
        })
    };
    Ok(match &config.balance {
        Balance::None => Box::new(BootstrapSampler::new(target)),
        Balance::ByTarget => Box::new(BalancedSampler::new(by_target("balanced bagging")?)),
        Balance::BySecondary(secondary) => {
            let primary = by_target("balanced bagging")?;
            let index = matrix
                .feature_index(secondary)
                .ok_or_else(|| GrowError::FeatureNotFound {
                    name: secondary.clone(),
                })?;
            let secondary =
                matrix
                    .feature(index)
                    .as_categorical()
                    .ok_or_else(|| GrowError::NotCategorical {
                        name: secondary.clone(),
                        purpose: "secondary balancing",
                    })?;
            Box::new(SecondaryBalancedSampler::new(primary, secondary))
        }
    })
}

/// Default leaf size when none is configured.
fn inferred_leaf_size(boosting: Boosting, target: &Feature, n_non_missing: usize) -> usize {
    if boosting != Boosting::None {
        (n_non_missing / 3).max(1)
    } else if target.as_numeric().is_some() {
        4
    } else {
        1
    }
}

fn run_worker(
    shared: &Shared<'_>,
    seed: u64,
    mut grown: Grown,
    trees_tx: Sender<Handoff>,
    buffers_rx: Receiver<Grown>,
) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut scratch = SplitScratch::default();
    let mut cases = Vec::with_capacity(shared.sample_size);
    let mut in_bag = vec![false; shared.matrix.n_cases()];

    loop {
        if shared.halted.load(Ordering::Acquire) {
            break;
        }

        cases.clear();
        shared.bagger.sample(&mut cases, shared.sample_size, &mut rng);
        grown.oob.clear();
        if shared.track_oob {
            in_bag.fill(false);
            for &c in &cases {
                in_bag[c] = true;
            }
            grown
                .oob
                .extend(shared.non_missing.iter().copied().filter(|&c| !in_bag[c]));
        }

        let Grown { tree, splits, oob } = &mut grown;
        tree.grow(
            shared.matrix,
            shared.target,
            &cases,
            oob,
            shared.candidates,
            &shared.params,
            shared.importance.is_some().then_some(splits),
            &mut scratch,
            &mut rng,
        );

        if let Some(booster) = shared.target.as_boosting() {
            let leaves = grown.tree.partition(shared.matrix);
            let weight = {
                let _guard = shared.boost_lock.lock();
                if shared.halted.load(Ordering::Acquire) {
                    break;
                }
                booster.boost(&leaves)
            };
            if weight == f64::INFINITY {
                shared.halted.store(true, Ordering::Release);
                debug!("boosting converged");
                if trees_tx.send(Handoff::Converged).is_err() {
                    debug!("coordinator finished before convergence was reported");
                }
                break;
            }
            grown.tree.set_weight(weight);
        }

        if trees_tx.send(Handoff::Tree(grown)).is_err() {
            break;
        }
        match buffers_rx.recv() {
            Ok(buffer) => grown = buffer,
            Err(_) => break,
        }
    }
}

/// Fold a collected tree into the run totals: its split decreases and
/// smallest depths into the accumulators, its weighted vote into the
/// out-of-bag tally.
fn commit(shared: &Shared<'_>, grown: &mut Grown) {
    if let Some(importance) = shared.importance {
        grown.splits.commit(importance, shared.min_depth);
    }
    if let Some(tally) = shared.tally
        && grown.tree.weight() != 0.0
    {
        grown.tree.vote_cases(shared.matrix, tally, &grown.oob);
    }
}

/// Receive trees until the quota is met or boosting converges.
fn coordinate(
    config: &GrowConfig,
    shared: &Shared<'_>,
    target: &Feature,
    trees_rx: Receiver<Handoff>,
    buffers_tx: Sender<Grown>,
    mut writer: Option<&mut dyn ForestWriter>,
    retain: bool,
) -> Result<Collected, GrowError> {
    let mut out = Collected::default();
    while out.trees_collected < config.tree_count {
        let Ok(handoff) = trees_rx.recv() else {
            break;
        };
        let mut grown = match handoff {
            Handoff::Tree(grown) => grown,
            Handoff::Converged => {
                out.converged = true;
                break;
            }
        };

        let index = out.trees_collected;
        if let Some(w) = &mut writer {
            w.write_tree(&grown.tree, index)?;
        }
        commit(shared, &mut grown);
        out.trees_collected += 1;

        match shared.tally {
            Some(tally) if config.progress => info!(
                tree = out.trees_collected,
                oob_error = tally.tally_error(target),
                "tree collected"
            ),
            _ => debug!(
                tree = out.trees_collected,
                n_nodes = grown.tree.n_nodes(),
                weight = grown.tree.weight(),
                "tree collected"
            ),
        }

        if retain {
            let tree = std::mem::replace(&mut grown.tree, Tree::new(target.name()));
            out.retained.push(tree);
        }
        if out.trees_collected < config.tree_count && buffers_tx.send(grown).is_err() {
            break;
        }
    }
    Ok(out)
}

/// Grow a forest as configured. See [`GrowConfig::grow`].
#[instrument(skip_all, fields(target = %config.target, tree_count = config.tree_count))]
pub(crate) fn grow(
    config: &GrowConfig,
    mut train: FeatureMatrix,
    test: Option<&FeatureMatrix>,
    writer: Option<&mut dyn ForestWriter>,
) -> Result<GrowReport, GrowError> {
    let start = Instant::now();

    // --- Validate config ---
    if config.train_cores == 0 {
        return Err(GrowError::InvalidCoreCount {
            train_cores: config.train_cores,
        });
    }
    if let Boosting::Gradient { learning_rate } = config.boosting
        && !(learning_rate > 0.0 && learning_rate <= 1.0)
    {
        return Err(GrowError::InvalidLearningRate { learning_rate });
    }
    if let Some(test) = test
        && test.feature_index(&config.target).is_none()
    {
        return Err(GrowError::TargetNotFoundInTest {
            name: config.target.clone(),
        });
    }

    let mut master = ChaCha8Rng::seed_from_u64(config.seed);

    // --- Prepare data ---
    if config.n_contrasts > 0 {
        train.add_contrasts(config.n_contrasts, &mut master);
    }
    if config.contrast_all {
        train.contrast_all(&mut master);
    }
    let target_index =
        train
            .feature_index(&config.target)
            .ok_or_else(|| GrowError::TargetNotFound {
                name: config.target.clone(),
            })?;
    let candidates = candidate_features(config, &train, target_index)?;
    let m_try = config
        .m_try
        .resolve(candidates.len())
        .unwrap_or_else(|| (candidates.len() as f64).sqrt().ceil() as usize)
        .clamp(1, candidates.len());

    if config.missing == MissingPolicy::Impute {
        train.impute_missing();
    }
    if config.permute_target {
        train.feature_mut(target_index).shuffle(&mut master);
    }
    if let Some(shuffle) = compile(config.filter.shuffle.as_deref())? {
        for i in 0..train.n_features() {
            if i != target_index && shuffle.is_match(train.feature(i).name()) {
                train.feature_mut(i).shuffle(&mut master);
            }
        }
    }
    let train = train;
    let target_feature = train.feature(target_index);

    // --- Resolve growth settings ---
    let non_missing = non_missing_cases(target_feature);
    if non_missing.is_empty() {
        return Err(GrowError::NoNonMissingCases {
            name: config.target.clone(),
        });
    }
    let sample_size = config
        .sample_size
        .resolve(non_missing.len())
        .unwrap_or(non_missing.len())
        .clamp(1, non_missing.len());
    let target = build_target(config, &train, target_index, &candidates, sample_size)?;
    let leaf_size = config
        .leaf_size
        .resolve(non_missing.len())
        .unwrap_or_else(|| inferred_leaf_size(config.boosting, target_feature, non_missing.len()))
        .max(1);
    let bagger = build_bagger(config, &train, target_feature)?;

    let boosting = config.boosting != Boosting::None;
    let mut n_cores = config.train_cores;
    if boosting && !config.multiboost && n_cores > 1 {
        warn!(
            requested = n_cores,
            "boosting is sequential; growing on one core"
        );
        n_cores = 1;
    }

    let aggregation = match config.boosting {
        Boosting::Gradient { .. } => Aggregation::Sum {
            offset: target_feature
                .as_numeric()
                .and_then(|num| num.mean(&non_missing))
                .unwrap_or(0.0),
        },
        _ => Aggregation::Mean,
    };
    let tally: Option<Box<dyn VoteTally>> = (config.oob || config.case_oob || config.progress)
        .then(|| -> Box<dyn VoteTally> {
            match target_feature {
                Feature::Categorical(_) => Box::new(CatBallotBox::new(train.n_cases())),
                Feature::Numeric(_) => Box::new(NumBallotBox::new(train.n_cases(), aggregation)),
            }
        });
    let decrease = running_means(train.n_features());
    let min_depth = running_means(train.n_features());
    let retain = config.self_test || test.is_some();

    let params = InducerParams {
        m_try,
        leaf_size,
        split_missing: config.missing == MissingPolicy::SplitMissing,
        force: config.force,
        vet: config.vet,
        eval_oob: config.eval_oob,
    };
    let metadata = GrowMetadata {
        target: config.target.clone(),
        tree_count: config.tree_count,
        train_cores: n_cores,
        m_try,
        leaf_size,
        sample_size,
        n_candidates: candidates.len(),
        n_non_missing: non_missing.len(),
    };
    info!(
        n_cases = train.n_cases(),
        n_features = train.n_features(),
        n_candidates = candidates.len(),
        m_try,
        leaf_size,
        sample_size,
        n_cores,
        "growing forest"
    );

    // --- Grow ---
    let shared = Shared {
        matrix: &train,
        target: target.as_ref(),
        bagger: bagger.as_ref(),
        tally: tally.as_deref(),
        importance: config.importance.then_some(decrease.as_slice()),
        min_depth: &min_depth,
        candidates: &candidates,
        non_missing: &non_missing,
        params,
        sample_size,
        track_oob: tally.is_some() || config.eval_oob,
        halted: AtomicBool::new(false),
        boost_lock: Mutex::new(()),
    };
    let seeds: Vec<u64> = (0..n_cores).map(|_| master.r#gen()).collect();
    let (trees_tx, trees_rx) = channel::bounded::<Handoff>(1);
    let (buffers_tx, buffers_rx) = channel::bounded::<Grown>(n_cores);

    let collected = thread::scope(|s| {
        let shared = &shared;
        for seed in seeds {
            let trees_tx = trees_tx.clone();
            let buffers_rx = buffers_rx.clone();
            let buffer = Grown::new(&config.target);
            s.spawn(move || run_worker(shared, seed, buffer, trees_tx, buffers_rx));
        }
        drop(trees_tx);
        drop(buffers_rx);
        let collected = coordinate(
            config,
            shared,
            target_feature,
            trees_rx,
            buffers_tx,
            writer,
            retain,
        );
        shared.halted.store(true, Ordering::Release);
        collected
    })?;

    // --- Summarize ---
    let oob_error = tally.as_ref().map(|t| t.tally_error(target_feature));
    let case_oob = match &tally {
        Some(tally) if config.case_oob => (0..train.n_cases())
            .map(|case| CaseOob {
                case: train
                    .case_labels()
                    .get(case)
                    .cloned()
                    .unwrap_or_else(|| case.to_string()),
                predicted: tally
                    .tally(case)
                    .map_or_else(|| "NA".to_string(), |p| p.to_string()),
                actual: target_feature
                    .label(case)
                    .unwrap_or_else(|| "NA".to_string()),
            })
            .collect(),
        _ => Vec::new(),
    };
    let evaluation = match test {
        Some(test) => Some(evaluate(
            &collected.retained,
            test,
            &config.target,
            aggregation,
            true,
        )?),
        None if config.self_test => Some(evaluate(
            &collected.retained,
            &train,
            &config.target,
            aggregation,
            false,
        )?),
        None => None,
    };
    let importance = if config.importance {
        importance_rows(
            train.features().iter().map(Feature::name),
            &decrease,
            &min_depth,
            collected.trees_collected,
        )
    } else {
        Vec::new()
    };

    let elapsed = start.elapsed();
    info!(
        trees = collected.trees_collected,
        converged = collected.converged,
        oob_error = ?oob_error,
        elapsed_ms = elapsed.as_millis() as u64,
        "forest grown"
    );

    Ok(GrowReport {
        metadata,
        trees_collected: collected.trees_collected,
        converged: collected.converged,
        oob_error,
        evaluation,
        importance,
        case_oob,
        trees: collected.retained,
        elapsed,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use canopy_data::{CatFeature, NumFeature};

    use super::*;
    use crate::config::FeatureFilter;
    use crate::target::Prediction;

    fn matrix() -> FeatureMatrix {
        let features = vec![
            Feature::Numeric(NumFeature::from_values(
                "N:x",
                &[Some(1.0), Some(2.0), Some(3.0), Some(7.0), Some(8.0), Some(9.0)],
            )),
            Feature::Numeric(NumFeature::from_values(
                "N:noise",
                &[Some(0.0), Some(0.0), Some(0.0), Some(0.0), Some(0.0), Some(0.0)],
            )),
            Feature::Categorical(CatFeature::from_labels(
                "C:y",
                &[Some("a"), Some("a"), Some("a"), Some("b"), Some("b"), None],
            )),
            Feature::Numeric(NumFeature::from_values(
                "N:y",
                &[Some(1.0), Some(1.0), Some(1.0), Some(9.0), Some(9.0), Some(9.0)],
            )),
        ];
        let labels = (0..6).map(|i| format!("c{i}")).collect();
        FeatureMatrix::new(features, labels).unwrap()
    }

    #[test]
    fn candidates_exclude_target_and_filters() {
        let m = matrix();
        let config = GrowConfig::new("C:y", 1).unwrap();
        assert_eq!(candidate_features(&config, &m, 2).unwrap(), vec![0, 1, 3]);

        let config = config.with_filter(FeatureFilter {
            blacklist: vec!["N:y".into(), "N:absent".into()],
            block: Some("noise".into()),
            ..FeatureFilter::default()
        });
        assert_eq!(candidate_features(&config, &m, 2).unwrap(), vec![0]);

        let config = GrowConfig::new("C:y", 1).unwrap().with_filter(FeatureFilter {
            include: Some("^N:x$".into()),
            ..FeatureFilter::default()
        });
        assert_eq!(candidate_features(&config, &m, 2).unwrap(), vec![0]);
    }

    #[test]
    fn filters_that_remove_everything_fail() {
        let m = matrix();
        let config = GrowConfig::new("C:y", 1).unwrap().with_filter(FeatureFilter {
            block: Some("^N:".into()),
            ..FeatureFilter::default()
        });
        assert!(matches!(
            candidate_features(&config, &m, 2),
            Err(GrowError::NoCandidateFeatures)
        ));

        let config = GrowConfig::new("C:y", 1).unwrap().with_filter(FeatureFilter {
            block: Some("(".into()),
            ..FeatureFilter::default()
        });
        assert!(matches!(
            candidate_features(&config, &m, 2),
            Err(GrowError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn target_selection_by_options() {
        let m = matrix();
        let cat = GrowConfig::new("C:y", 1).unwrap();
        let num = GrowConfig::new("N:y", 1).unwrap();

        let t = build_target(&cat.clone().with_boosting(Boosting::Adaptive), &m, 2, &[0], 6).unwrap();
        assert!(t.as_boosting().is_some());
        let t = build_target(
            &num.clone().with_boosting(Boosting::Gradient { learning_rate: 0.1 }),
            &m,
            3,
            &[0],
            6,
        )
        .unwrap();
        assert!(t.as_boosting().is_some());
        let t = build_target(&num.clone().with_objective(Objective::L1), &m, 3, &[0], 6).unwrap();
        assert!(t.as_boosting().is_none());

        let costs = HashMap::from([("b".to_string(), 3.0)]);
        let t = build_target(&cat.clone().with_costs(Some(costs.clone())), &m, 2, &[0], 6).unwrap();
        assert_eq!(t.feature().name(), "C:y");

        assert!(matches!(
            build_target(&num.clone().with_costs(Some(costs.clone())), &m, 3, &[0], 6),
            Err(GrowError::NotCategorical { .. })
        ));
        assert!(matches!(
            build_target(&cat.clone().with_objective(Objective::L1), &m, 2, &[0], 6),
            Err(GrowError::NotNumeric { .. })
        ));
        assert!(matches!(
            build_target(
                &cat.with_costs(Some(costs)).with_boosting(Boosting::Adaptive),
                &m,
                2,
                &[0],
                6
            ),
            Err(GrowError::IncompatibleOptions { .. })
        ));
    }

    #[test]
    fn numeric_boosting_wraps_l1_and_ordinal() {
        let m = matrix();
        let num = GrowConfig::new("N:y", 1).unwrap();
        for config in [
            num.clone()
                .with_objective(Objective::L1)
                .with_boosting(Boosting::Gradient { learning_rate: 0.5 }),
            num.clone()
                .with_objective(Objective::Ordinal)
                .with_boosting(Boosting::Adaptive),
        ] {
            let t = build_target(&config, &m, 3, &[0], 6).unwrap();
            assert!(t.as_boosting().is_some());
            assert_eq!(t.feature().name(), "N:y");
        }

        // Ordinal adaptive boosting predicts the modal value.
        let t = build_target(
            &num.with_objective(Objective::Ordinal)
                .with_boosting(Boosting::Adaptive),
            &m,
            3,
            &[0],
            6,
        )
        .unwrap();
        assert_eq!(t.predicted(&[0, 1, 2, 3]), Prediction::Value(1.0));
    }

    #[test]
    fn density_target_uses_the_sample_size() {
        let m = matrix();
        let config = GrowConfig::new("N:x", 1)
            .unwrap()
            .with_objective(Objective::Density);
        let t = build_target(&config, &m, 0, &[0], 3).unwrap();
        // Cases 0..3 of N:x span 2: 3 / (3 * 2).
        assert_eq!(t.predicted(&[0, 1, 2]), Prediction::Value(0.5));
    }

    #[test]
    fn leaf_size_inference() {
        let m = matrix();
        assert_eq!(inferred_leaf_size(Boosting::None, m.feature(2), 5), 1);
        assert_eq!(inferred_leaf_size(Boosting::None, m.feature(3), 6), 4);
        assert_eq!(inferred_leaf_size(Boosting::Adaptive, m.feature(2), 5), 1);
        assert_eq!(inferred_leaf_size(Boosting::Adaptive, m.feature(2), 30), 10);
    }

    #[test]
    fn balance_by_target_needs_categorical() {
        let m = matrix();
        let config = GrowConfig::new("N:y", 1)
            .unwrap()
            .with_balance(Balance::ByTarget);
        assert!(matches!(
            build_bagger(&config, &m, m.feature(3)),
            Err(GrowError::NotCategorical { .. })
        ));
        let config = GrowConfig::new("C:y", 1)
            .unwrap()
            .with_balance(Balance::BySecondary("C:absent".into()));
        assert!(matches!(
            build_bagger(&config, &m, m.feature(2)),
            Err(GrowError::FeatureNotFound { .. })
        ));
    }

    #[test]
    fn only_collected_trees_reach_the_totals() {
        let m = matrix();
        let target = CatTarget::new(m.feature(2).as_categorical().unwrap().clone());
        let bagger = NoBagSampler::new(m.feature(2));
        let tally = CatBallotBox::new(m.n_cases());
        let decrease = running_means(m.n_features());
        let min_depth = running_means(m.n_features());
        let candidates = [0, 1];
        let non_missing = non_missing_cases(m.feature(2));
        let shared = Shared {
            matrix: &m,
            target: &target,
            bagger: &bagger,
            tally: Some(&tally),
            importance: Some(&decrease),
            min_depth: &min_depth,
            candidates: &candidates,
            non_missing: &non_missing,
            params: InducerParams {
                m_try: 2,
                leaf_size: 1,
                split_missing: false,
                force: false,
                vet: false,
                eval_oob: false,
            },
            sample_size: 5,
            track_oob: true,
            halted: AtomicBool::new(false),
            boost_lock: Mutex::new(()),
        };

        // Three finished trees race for a quota of two; the third arrives
        // after the quota is met.
        let (trees_tx, trees_rx) = channel::unbounded();
        let (buffers_tx, _buffers_rx) = channel::unbounded();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut scratch = SplitScratch::default();
        for _ in 0..3 {
            let mut grown = Grown::new("C:y");
            grown.oob = vec![0, 3];
            grown.tree.grow(
                &m,
                &target,
                &[0, 1, 2, 3, 4],
                &[],
                &candidates,
                &shared.params,
                Some(&mut grown.splits),
                &mut scratch,
                &mut rng,
            );
            trees_tx.send(Handoff::Tree(grown)).unwrap();
        }
        drop(trees_tx);

        let config = GrowConfig::new("C:y", 2).unwrap();
        let collected =
            coordinate(&config, &shared, m.feature(2), trees_rx, buffers_tx, None, false).unwrap();
        assert_eq!(collected.trees_collected, 2);

        // Each tree splits once on N:x at the root.
        assert_eq!(decrease[0].read().1, 2);
        assert_eq!(min_depth[0].read(), (1.0, 2));
        assert_eq!(decrease[1].read().1, 0);
        assert_eq!(tally.tally(0), Some(Prediction::Category("a".into())));
        assert_eq!(tally.tally(1), None);
    }

    #[test]
    fn single_core_collects_every_tree() {
        let config = GrowConfig::new("C:y", 5)
            .unwrap()
            .with_oob(true)
            .with_importance(true);
        let mut trees: Vec<Tree> = Vec::new();
        let report = config.grow(matrix(), None, Some(&mut trees)).unwrap();
        assert_eq!(report.trees_collected(), 5);
        assert_eq!(trees.len(), 5);
        assert!(!report.converged());
        assert_eq!(report.importance().len(), 4);
        assert_eq!(report.importance()[2].count, 0);
    }

    #[test]
    fn missing_target_rejected() {
        let config = GrowConfig::new("C:absent", 1).unwrap();
        assert!(matches!(
            config.grow(matrix(), None, None),
            Err(GrowError::TargetNotFound { .. })
        ));
        let config = GrowConfig::new("C:y", 1).unwrap().with_train_cores(0);
        assert!(matches!(
            config.grow(matrix(), None, None),
            Err(GrowError::InvalidCoreCount { .. })
        ));
    }
}
