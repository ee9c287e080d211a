//! Loading and normalising the processed player table

use super::player::{Foot, Metric, PlayerRecord, PlayerTable};
use super::positions::{canonicalize, parse_position_list};
use crate::error::{AnalysisError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

/// Text columns the loader requires
pub const TEXT_COLUMNS: [&str; 5] = ["player", "nation", "positions", "main_position", "preferred_foot"];

/// Counters describing what the normaliser did
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadSummary {
    pub raw_rows: usize,
    pub dropped_null_main: usize,
    pub duplicates_removed: usize,
    pub relabelled: usize,
    pub derived_per90_cells: usize,
    pub players: usize,
}

/// Rows scanned for CSV schema inference
const INFER_SCHEMA_ROWS: usize = 1000;

/// Loader for the processed per-player statistics file
#[derive(Debug, Default)]
pub struct PlayerLoader;

impl PlayerLoader {
    pub fn new() -> Self {
        Self
    }

    /// Read a CSV file into a raw frame
    pub fn read_csv(&self, path: &Path) -> Result<DataFrame> {
        let file = File::open(path)
            .map_err(|e| AnalysisError::DataError(format!("{}: {}", path.display(), e)))?;

        let reader = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(INFER_SCHEMA_ROWS))
            .into_reader_with_file_handle(file);

        reader.finish()
            .map_err(|e| AnalysisError::DataError(e.to_string()))
    }

    /// Read and normalise a CSV file
    pub fn load_csv(&self, path: &Path) -> Result<(PlayerTable, LoadSummary)> {
        let df = self.read_csv(path)?;
        info!(path = %path.display(), rows = df.height(), cols = df.width(), "Loaded player table");
        self.from_dataframe(&df)
    }

    /// Normalise an already-loaded frame: relabel, drop null main
    /// positions and collapse duplicate players.
    pub fn from_dataframe(&self, df: &DataFrame) -> Result<(PlayerTable, LoadSummary)> {
        validate_schema(df)?;

        let mut summary = LoadSummary {
            raw_rows: df.height(),
            ..Default::default()
        };

        let names = text_column(df, "player")?;
        let nations = text_column(df, "nation")?;
        let position_lists = text_column(df, "positions")?;
        let mains = text_column(df, "main_position")?;
        let feet = text_column(df, "preferred_foot")?;

        let numeric: Vec<Vec<Option<f64>>> = Metric::ALL
            .iter()
            .map(|m| numeric_column(df, m.column()))
            .collect::<Result<Vec<_>>>()?;

        let mut players = Vec::with_capacity(df.height());
        for row in 0..df.height() {
            let main_raw = match mains[row].as_deref().map(str::trim) {
                Some(s) if !s.is_empty() => s,
                _ => {
                    summary.dropped_null_main += 1;
                    continue;
                }
            };

            let name = names[row]
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| AnalysisError::DataError(format!("row {}: missing player identifier", row + 1)))?
                .to_string();

            let resolved = canonicalize(main_raw)
                .map_err(|e| AnalysisError::DataError(format!("row {} ({}): {}", row + 1, name, e)))?;
            if resolved.relabelled {
                summary.relabelled += 1;
            }

            let mut positions = match position_lists[row].as_deref() {
                Some(raw) => parse_position_list(raw)
                    .map_err(|e| AnalysisError::DataError(format!("row {} ({}): {}", row + 1, name, e)))?,
                None => Vec::new(),
            };
            if positions.is_empty() {
                positions.push(resolved.position);
            }

            let mut record = PlayerRecord::new(name, resolved.position).with_positions(positions);
            record.nation = nations[row].clone();
            if let Some(foot) = feet[row].as_deref().and_then(Foot::parse) {
                record = record.with_foot(foot);
            }
            for (metric, values) in Metric::ALL.iter().zip(numeric.iter()) {
                record.set_value(*metric, values[row]);
            }
            summary.derived_per90_cells += derive_missing_per90(&mut record);

            players.push(record);
        }

        let (players, removed) = dedup_players(players);
        summary.duplicates_removed = removed;
        summary.players = players.len();

        info!(
            players = summary.players,
            dropped = summary.dropped_null_main,
            duplicates = summary.duplicates_removed,
            relabelled = summary.relabelled,
            "Normalised player table"
        );

        Ok((PlayerTable::new(players), summary))
    }
}

/// Fail with every missing column named at once
pub fn validate_schema(df: &DataFrame) -> Result<()> {
    let present: HashSet<String> = df
        .get_column_names()
        .into_iter()
        .map(|name| name.as_str().to_string())
        .collect();

    let missing: Vec<&str> = TEXT_COLUMNS
        .iter()
        .copied()
        .chain(Metric::ALL.iter().map(|m| m.column()))
        .filter(|col| !present.contains(*col))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(AnalysisError::SchemaError(format!("missing columns: {}", missing.join(", "))))
    }
}

/// Collapse players sharing an identifier to their first occurrence.
///
/// Returns the kept rows and how many were removed.
pub fn dedup_players(players: Vec<PlayerRecord>) -> (Vec<PlayerRecord>, usize) {
    let before = players.len();
    let mut seen: HashSet<String> = HashSet::with_capacity(before);
    let kept: Vec<PlayerRecord> = players
        .into_iter()
        .filter(|p| seen.insert(p.player.clone()))
        .collect();
    let removed = before - kept.len();
    if removed > 0 {
        debug!(removed, "Removed duplicate players");
    }
    (kept, removed)
}

/// Fill a null per-90 cell from its raw count; returns cells derived.
fn derive_missing_per90(record: &mut PlayerRecord) -> usize {
    let nineties = match record.value(Metric::Nineties) {
        Some(n) if n > 0.0 => n,
        _ => return 0,
    };
    let mut derived = 0;
    for metric in Metric::ALL {
        if let Some(source) = metric.per90_source() {
            if record.value(metric).is_none() {
                if let Some(raw) = record.value(source) {
                    record.set_value(metric, Some(raw / nineties));
                    derived += 1;
                }
            }
        }
    }
    derived
}

fn text_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let column = df
        .column(name)
        .map_err(|_| AnalysisError::SchemaError(format!("missing column '{}'", name)))?;
    let casted = column
        .cast(&DataType::String)
        .map_err(|e| AnalysisError::SchemaError(format!("column '{}': {}", name, e)))?;
    let values = casted
        .as_materialized_series()
        .str()
        .map_err(|e| AnalysisError::SchemaError(format!("column '{}': {}", name, e)))?
        .into_iter()
        .map(|v| v.map(|s| s.to_string()))
        .collect();
    Ok(values)
}

fn numeric_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df
        .column(name)
        .map_err(|_| AnalysisError::SchemaError(format!("missing column '{}'", name)))?;
    let casted = column
        .cast(&DataType::Float64)
        .map_err(|e| AnalysisError::SchemaError(format!("column '{}' is not numeric: {}", name, e)))?;
    let values = casted
        .as_materialized_series()
        .f64()
        .map_err(|e| AnalysisError::SchemaError(format!("column '{}' is not numeric: {}", name, e)))?
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect();
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::positions::Position;

    #[test]
    fn test_dedup_is_idempotent() {
        let players = vec![
            PlayerRecord::new("A", Position::ST),
            PlayerRecord::new("B", Position::CB),
            PlayerRecord::new("A", Position::LW),
        ];
        let (once, removed) = dedup_players(players);
        assert_eq!(removed, 1);
        assert_eq!(once[0].main_position, Position::ST);
        let n = once.len();
        let (twice, removed_again) = dedup_players(once);
        assert_eq!(twice.len(), n);
        assert_eq!(removed_again, 0);
    }

    #[test]
    fn test_derive_missing_per90() {
        let mut p = PlayerRecord::new("A", Position::ST)
            .with_metric(Metric::Nineties, 20.0)
            .with_metric(Metric::Goals, 10.0)
            .with_metric(Metric::Assists90, 0.3);
        let derived = derive_missing_per90(&mut p);
        assert_eq!(derived, 1);
        assert!((p.value(Metric::Goals90).unwrap() - 0.5).abs() < 1e-12);
        assert_eq!(p.value(Metric::Assists90), Some(0.3));
    }

    #[test]
    fn test_schema_error_lists_missing_columns() {
        let df = df!(
            "player" => &["A"],
            "main_position" => &["ST"]
        )
        .unwrap();
        let err = validate_schema(&df).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("xg_90"));
        assert!(msg.contains("positions"));
        assert!(!msg.contains("main_position,"));
    }
}
