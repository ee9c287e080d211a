//! End-to-end analysis run
//!
//! load → cluster → split → fit every family on the shared partition →
//! evaluate → compare. A family that fails is reported with its error kind
//! and the rest still run; only schema problems and an unsplittable table
//! abort the whole run.

use crate::clustering::{cluster_positions, PositionClustering};
use crate::config::AnalysisConfig;
use crate::data::{LoadSummary, PlayerLoader, PlayerRecord, PlayerTable, N_POSITIONS};
use crate::error::{ErrorKind, Result};
use crate::evaluation::Evaluation;
use crate::preprocessing::{stratified_split, ClassSplit, Partition, CLUSTER_METRICS};
use crate::training::{fit_family, ModelDiagnostics, ModelFamily, TrainedModel};
use crate::utils::{StageTiming, Timer};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// A model of one family fitted on a training partition. Can be evaluated
/// against any number of test sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedModel {
    pub family: ModelFamily,
    pub feature_names: Vec<String>,
    pub model: TrainedModel,
    pub diagnostics: ModelDiagnostics,
}

impl FittedModel {
    /// Class index per player
    pub fn predict(&self, players: &[&PlayerRecord]) -> Result<Vec<usize>> {
        let x = self.family.feature_set().extract(players)?;
        self.model.predict(&x)
    }

    pub fn evaluate(&self, players: &[&PlayerRecord]) -> Result<Evaluation> {
        let predicted = self.predict(players)?;
        Evaluation::evaluate(&predicted, players)
    }
}

/// What happened to one family in a run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModelOutcome {
    Evaluated {
        family: ModelFamily,
        evaluation: Evaluation,
        diagnostics: ModelDiagnostics,
    },
    Failed {
        family: ModelFamily,
        kind: ErrorKind,
        message: String,
    },
}

impl ModelOutcome {
    pub fn family(&self) -> ModelFamily {
        match self {
            ModelOutcome::Evaluated { family, .. } | ModelOutcome::Failed { family, .. } => *family,
        }
    }

    pub fn evaluation(&self) -> Option<&Evaluation> {
        match self {
            ModelOutcome::Evaluated { evaluation, .. } => Some(evaluation),
            ModelOutcome::Failed { .. } => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ModelOutcome::Failed { .. })
    }
}

/// One line of the model comparison table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub family: ModelFamily,
    pub model: String,
    pub accuracy: f64,
    pub kappa: f64,
    pub total_accuracy: f64,
}

/// Train/test sizes of the shared partition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionSummary {
    pub seed: u64,
    pub train_fraction: f64,
    pub n_train: usize,
    pub n_test: usize,
    pub classes: Vec<ClassSplit>,
}

/// Everything a run produces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub config: AnalysisConfig,
    pub load: LoadSummary,
    pub partition: PartitionSummary,
    pub clustering: Option<PositionClustering>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clustering_error: Option<String>,
    /// In the order of `config.families`
    pub outcomes: Vec<ModelOutcome>,
    /// Evaluated families, best accuracy first
    pub comparison: Vec<ComparisonRow>,
    pub timings: Vec<StageTiming>,
}

impl AnalysisReport {
    pub fn outcome(&self, family: ModelFamily) -> Option<&ModelOutcome> {
        self.outcomes.iter().find(|o| o.family() == family)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ModelOutcome> {
        self.outcomes.iter().filter(|o| o.is_failure())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// Runs the analysis with one configuration
pub struct Analysis {
    config: AnalysisConfig,
}

impl Analysis {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Load `path` and run everything
    pub fn run_file(&self, path: &Path) -> Result<AnalysisReport> {
        let (table, summary) = PlayerLoader::new().load_csv(path)?;
        self.run(&table, summary)
    }

    /// Run on an already-cleaned table
    pub fn run(&self, table: &PlayerTable, load: LoadSummary) -> Result<AnalysisReport> {
        self.config.validate()?;
        let mut timer = Timer::start("Analysis");

        let (clustering, clustering_error) = match self.cluster(table) {
            Ok(c) => (Some(c), None),
            Err(e) => {
                warn!(error = %e, "Position clustering failed");
                (None, Some(e.to_string()))
            }
        };
        timer.checkpoint("cluster");

        let labels = table.labels();
        let partition = stratified_split(&labels, self.config.train_fraction, self.config.seed)?;
        info!(
            train = partition.train.len(),
            test = partition.test.len(),
            seed = partition.seed,
            "Built stratified partition"
        );
        timer.checkpoint("split");

        let outcomes = self.fit_all(table, &partition);
        timer.checkpoint("models");

        let comparison = comparison_rows(&outcomes);
        let failed = outcomes.iter().filter(|o| o.is_failure()).count();
        info!(evaluated = comparison.len(), failed, "Model comparison ready");

        let partition_summary = PartitionSummary {
            seed: partition.seed,
            train_fraction: partition.train_fraction,
            n_train: partition.train.len(),
            n_test: partition.test.len(),
            classes: partition.class_summary(&labels),
        };

        Ok(AnalysisReport {
            config: self.config.clone(),
            load,
            partition: partition_summary,
            clustering,
            clustering_error,
            outcomes,
            comparison,
            timings: timer.stop_with_report(),
        })
    }

    /// Dendrogram over the position profiles
    pub fn cluster(&self, table: &PlayerTable) -> Result<PositionClustering> {
        cluster_positions(
            table,
            &CLUSTER_METRICS,
            &self.config.cluster_exclude,
            self.config.cluster_min_group_size,
            self.config.linkage,
        )
    }

    /// Fit one family on `train`
    pub fn fit(&self, family: ModelFamily, train: &[&PlayerRecord]) -> Result<FittedModel> {
        let timer = Timer::start(format!("Fitting {}", family));
        let feature_set = family.feature_set();
        let x = feature_set.extract(train)?;
        let y: Vec<usize> = train.iter().map(|p| p.main_position.index()).collect();

        let model = fit_family(
            family,
            &x,
            &y,
            N_POSITIONS,
            &self.config.models,
            self.config.min_class_examples,
            self.config.seed,
        )?;

        let feature_names = feature_set.names();
        let mut diagnostics = model.diagnostics(&feature_names);
        diagnostics.n_train = train.len();
        diagnostics.fit_seconds = timer.stop().as_secs_f64();

        Ok(FittedModel { family, feature_names, model, diagnostics })
    }

    /// Fit and evaluate every configured family on the same partition
    pub fn fit_all(&self, table: &PlayerTable, partition: &Partition) -> Vec<ModelOutcome> {
        let train = table.select(&partition.train);
        let test = table.select(&partition.test);

        let run_one = |&family: &ModelFamily| self.fit_and_evaluate(family, &train, &test);
        if self.config.parallel {
            self.config.families.par_iter().map(run_one).collect()
        } else {
            self.config.families.iter().map(run_one).collect()
        }
    }

    fn fit_and_evaluate(&self, family: ModelFamily, train: &[&PlayerRecord], test: &[&PlayerRecord]) -> ModelOutcome {
        let result = self
            .fit(family, train)
            .and_then(|fitted| fitted.evaluate(test).map(|evaluation| (fitted, evaluation)));

        match result {
            Ok((fitted, evaluation)) => {
                info!(
                    model = %family,
                    accuracy = evaluation.accuracy,
                    kappa = evaluation.kappa,
                    total_accuracy = evaluation.total_accuracy,
                    "Evaluated model"
                );
                ModelOutcome::Evaluated { family, evaluation, diagnostics: fitted.diagnostics }
            }
            Err(e) => {
                warn!(model = %family, kind = ?e.kind(), error = %e, "Model failed");
                ModelOutcome::Failed { family, kind: e.kind(), message: e.to_string() }
            }
        }
    }
}

/// Comparison rows for the evaluated outcomes, best accuracy first. Equal
/// accuracies keep configuration order.
pub fn comparison_rows(outcomes: &[ModelOutcome]) -> Vec<ComparisonRow> {
    let mut rows: Vec<ComparisonRow> = outcomes
        .iter()
        .filter_map(|o| match o {
            ModelOutcome::Evaluated { family, evaluation, .. } => Some(ComparisonRow {
                family: *family,
                model: family.label().to_string(),
                accuracy: evaluation.accuracy,
                kappa: evaluation.kappa,
                total_accuracy: evaluation.total_accuracy,
            }),
            ModelOutcome::Failed { .. } => None,
        })
        .collect();
    rows.sort_by(|a, b| b.accuracy.total_cmp(&a.accuracy));
    rows
}
