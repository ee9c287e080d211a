//! pl-positions CLI Module
//!
//! Command-line interface for the full analysis, the position dendrogram
//! and a quick look at an input file.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::clustering::{Dendrogram, Linkage};
use crate::config::AnalysisConfig;
use crate::data::{LoadSummary, PlayerLoader, PlayerTable, Position};
use crate::evaluation::Evaluation;
use crate::pipeline::{Analysis, AnalysisReport, ModelOutcome};
use crate::training::ModelFamily;

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn pct(v: f64) -> String {
    format!("{:.1}%", v * 100.0)
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "pl-positions")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Positional-flexibility analysis of Premier League players")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full analysis end to end
    Run {
        /// Processed player statistics (CSV)
        #[arg(short, long)]
        data: PathBuf,

        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the configured seed
        #[arg(short, long)]
        seed: Option<u64>,

        /// Fit only these families, e.g. `svm_radial,lda`
        #[arg(short, long, value_delimiter = ',', value_parser = parse_family)]
        families: Vec<ModelFamily>,

        /// Write the full report as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Cluster positions by their mean output
    Cluster {
        /// Processed player statistics (CSV)
        #[arg(short, long)]
        data: PathBuf,

        #[arg(short, long, value_enum, default_value_t = Linkage::Complete)]
        linkage: Linkage,
    },

    /// Show what the loader makes of a file
    Info {
        /// Processed player statistics (CSV)
        #[arg(short, long)]
        data: PathBuf,
    },
}

fn parse_family(s: &str) -> Result<ModelFamily, String> {
    s.parse::<ModelFamily>().map_err(|e| e.to_string())
}

// ─── Data loading ──────────────────────────────────────────────────────────────

fn load_table(path: &Path) -> anyhow::Result<(PlayerTable, LoadSummary)> {
    step_run("Loading players");
    let start = Instant::now();
    let (table, summary) = PlayerLoader::new().load_csv(path)?;
    step_done(&format!("{} players in {:?}", table.len(), start.elapsed()));
    Ok((table, summary))
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_run(
    data_path: &Path,
    config_path: Option<&Path>,
    seed: Option<u64>,
    families: Vec<ModelFamily>,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    section("Run");

    let mut config = match config_path {
        Some(path) => AnalysisConfig::load(path)?,
        None => AnalysisConfig::default(),
    };
    if let Some(seed) = seed {
        config = config.with_seed(seed);
    }
    if !families.is_empty() {
        config = config.with_families(families);
    }

    let (table, summary) = load_table(data_path)?;

    step_run(&format!("Fitting {} models", config.families.len()));
    let start = Instant::now();
    let report = Analysis::new(config).run(&table, summary)?;
    step_done(&format!("{:?}", start.elapsed()));

    print_partition(&report);
    if let Some(clustering) = &report.clustering {
        print_dendrogram(&clustering.dendrogram);
    } else if let Some(err) = &report.clustering_error {
        println!("  {} {}", "clustering skipped:".yellow(), err);
    }
    print_comparison(&report);

    if let Some(best) = report.comparison.first() {
        if let Some(evaluation) = report.outcome(best.family).and_then(ModelOutcome::evaluation) {
            print_per_class(best.model.as_str(), evaluation);
        }
    }

    if let Some(path) = output {
        step_run(&format!("Saving → {}", path.display()));
        report.save(path)?;
        step_done("");
    }

    println!();
    Ok(())
}

pub fn cmd_cluster(data_path: &Path, linkage: Linkage) -> anyhow::Result<()> {
    section("Cluster");

    let (table, _) = load_table(data_path)?;
    let clustering = Analysis::new(AnalysisConfig::default().with_linkage(linkage)).cluster(&table)?;

    println!();
    println!("  {:<8} {:>8}", muted("Position"), muted("Players"));
    for (position, count) in clustering.profiles.positions.iter().zip(&clustering.profiles.counts) {
        println!("  {:<8} {:>8}", position.code(), count);
    }

    print_dendrogram(&clustering.dendrogram);
    println!();
    Ok(())
}

pub fn cmd_info(data_path: &Path) -> anyhow::Result<()> {
    section("Data Info");

    let (table, summary) = load_table(data_path)?;

    println!();
    println!("  {:<20} {}", muted("File"), data_path.display());
    println!("  {:<20} {}", muted("Raw rows"), summary.raw_rows);
    println!("  {:<20} {}", muted("Null main position"), summary.dropped_null_main);
    println!("  {:<20} {}", muted("Duplicates removed"), summary.duplicates_removed);
    println!("  {:<20} {}", muted("Labels relabelled"), summary.relabelled);
    println!("  {:<20} {}", muted("Per-90 derived"), summary.derived_per90_cells);
    println!("  {:<20} {}", muted("Players"), summary.players);
    println!();

    println!("  {:<8} {:<20} {:>8}", muted("Code"), muted("Position"), muted("Players"));
    println!("  {}", dim(&"─".repeat(38)));
    let counts = table.class_counts();
    for position in Position::ALL {
        let n = counts[position.index()];
        let line = format!("  {:<8} {:<20} {:>8}", position.code(), position.name(), n);
        if n < 2 {
            println!("{}", line.yellow());
        } else {
            println!("{}", line);
        }
    }

    println!();
    Ok(())
}

// ─── Rendering ─────────────────────────────────────────────────────────────────

fn print_partition(report: &AnalysisReport) {
    section("Partition");
    let p = &report.partition;
    println!(
        "  {} train / {} test  {}",
        p.n_train,
        p.n_test,
        dim(&format!("seed {} · {:.0}% train", p.seed, p.train_fraction * 100.0))
    );
    println!();
    println!("  {:<8} {:>6} {:>6}", muted("Class"), muted("Train"), muted("Test"));
    for class in &p.classes {
        println!("  {:<8} {:>6} {:>6}", class.position.code(), class.train, class.test);
    }
}

fn print_dendrogram(dendrogram: &Dendrogram) {
    section(&format!("Dendrogram ({:?} linkage)", dendrogram.linkage));
    let n = dendrogram.n_leaves();
    let node = |id: usize| -> String {
        if id < n {
            dendrogram.labels.get(id).cloned().unwrap_or_else(|| id.to_string())
        } else {
            format!("#{}", id - n + 1)
        }
    };
    for (i, merge) in dendrogram.merges.iter().enumerate() {
        println!(
            "  {:>3}  {:<6} + {:<6} {:>8.3}  {}",
            format!("#{}", i + 1),
            node(merge.left),
            node(merge.right),
            merge.height,
            dim(&format!("{} positions", merge.size))
        );
    }
    let order: Vec<String> = dendrogram.order().into_iter().map(node).collect();
    println!();
    println!("  {} {}", muted("Leaf order"), order.join(" "));
}

fn print_comparison(report: &AnalysisReport) {
    section("Model comparison");
    println!(
        "  {:<20} {:>10} {:>8} {:>10}",
        muted("Model"),
        muted("Accuracy"),
        muted("Kappa"),
        muted("Total acc")
    );
    println!("  {}", dim(&"─".repeat(51)));
    for row in &report.comparison {
        println!(
            "  {:<20} {:>10} {:>8.3} {:>10}",
            row.model,
            pct(row.accuracy),
            row.kappa,
            pct(row.total_accuracy)
        );
    }
    for failure in report.failures() {
        if let ModelOutcome::Failed { family, kind, message } = failure {
            println!(
                "  {:<20} {}",
                family.label(),
                format!("{:?}: {}", kind, message).red()
            );
        }
    }
    println!("  {}", dim(&"─".repeat(51)));

    if let Some(best) = report.comparison.first() {
        println!();
        println!("  {} {} {} {}", ok("best"), best.model.white().bold(), muted("accuracy:"), pct(best.accuracy));
    }
}

fn print_per_class(model: &str, evaluation: &Evaluation) {
    section(&format!("Per-class recall · {}", model));
    for class in &evaluation.per_class {
        let recall = match class.recall {
            Some(r) => pct(r),
            None => "N/A".to_string(),
        };
        println!("  {:<8} {:>8} {}", class.position.code(), recall, dim(&format!("n={}", class.support)));
    }

    let labels: Vec<&str> = Position::ALL.iter().map(|p| p.code()).collect();
    section("Confusion matrix (rows predicted, columns actual)");
    for line in evaluation.confusion.render(&labels).lines() {
        println!("  {}", line);
    }

    let matched = evaluation.misclassified.iter().filter(|m| m.matched_listed).count();
    println!();
    println!(
        "  {} misclassified, {} of them named another listed position",
        evaluation.misclassified.len(),
        matched
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_linkage_values() {
        let cli = Cli::try_parse_from(["pl-positions", "cluster", "-d", "players.csv", "-l", "ward"]).unwrap();
        assert!(matches!(cli.command, Commands::Cluster { linkage: Linkage::Ward, .. }));

        let cli = Cli::try_parse_from(["pl-positions", "cluster", "-d", "players.csv"]).unwrap();
        assert!(matches!(cli.command, Commands::Cluster { linkage: Linkage::Complete, .. }));

        assert!(Cli::try_parse_from(["pl-positions", "cluster", "-d", "players.csv", "-l", "centroid"]).is_err());
    }

    #[test]
    fn test_run_family_selection() {
        let cli = Cli::try_parse_from(["pl-positions", "run", "-d", "players.csv", "-f", "svm-radial,LDA"]).unwrap();
        match cli.command {
            Commands::Run { families, .. } => assert_eq!(families, vec![ModelFamily::SvmRadial, ModelFamily::Lda]),
            _ => panic!("expected run"),
        }

        let cli = Cli::try_parse_from(["pl-positions", "run", "-d", "players.csv"]).unwrap();
        assert!(matches!(cli.command, Commands::Run { ref families, .. } if families.is_empty()));

        assert!(Cli::try_parse_from(["pl-positions", "run", "-d", "players.csv", "-f", "xgboost"]).is_err());
    }
}
