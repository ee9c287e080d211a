//! Canonical position taxonomy and the raw-label mapping table

use crate::error::{AnalysisError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of canonical positions
pub const N_POSITIONS: usize = 12;

/// Version of [`LABEL_MAPPING`]. Bump whenever an entry changes.
pub const LABEL_MAPPING_VERSION: u32 = 1;

/// Raw labels folded into a canonical position at load time.
///
/// This table is the only place where equivalent roles are merged.
pub const LABEL_MAPPING: &[(&str, Position)] = &[
    ("CF", Position::ST),
    ("RWB", Position::RB),
    ("LWB", Position::LB),
];

/// Canonical playing position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Position {
    GK,
    CB,
    LB,
    RB,
    CDM,
    CM,
    CAM,
    LM,
    RM,
    LW,
    RW,
    ST,
}

impl Position {
    /// All positions in class-index order
    pub const ALL: [Position; N_POSITIONS] = [
        Position::GK,
        Position::CB,
        Position::LB,
        Position::RB,
        Position::CDM,
        Position::CM,
        Position::CAM,
        Position::LM,
        Position::RM,
        Position::LW,
        Position::RW,
        Position::ST,
    ];

    /// Dense class index used by the models
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(idx: usize) -> Option<Position> {
        Self::ALL.get(idx).copied()
    }

    pub fn code(self) -> &'static str {
        match self {
            Position::GK => "GK",
            Position::CB => "CB",
            Position::LB => "LB",
            Position::RB => "RB",
            Position::CDM => "CDM",
            Position::CM => "CM",
            Position::CAM => "CAM",
            Position::LM => "LM",
            Position::RM => "RM",
            Position::LW => "LW",
            Position::RW => "RW",
            Position::ST => "ST",
        }
    }

    /// Human-readable name
    pub fn name(self) -> &'static str {
        match self {
            Position::GK => "Goalkeeper",
            Position::CB => "Center Back",
            Position::LB => "Left Back",
            Position::RB => "Right Back",
            Position::CDM => "Defensive Midfield",
            Position::CM => "Center Midfield",
            Position::CAM => "Attacking Midfield",
            Position::LM => "Left Midfield",
            Position::RM => "Right Midfield",
            Position::LW => "Left Wing",
            Position::RW => "Right Wing",
            Position::ST => "Striker",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Position {
    type Err = AnalysisError;

    /// Parses a canonical code only; raw labels go through [`canonicalize`].
    fn from_str(s: &str) -> Result<Self> {
        let code = s.trim().to_ascii_uppercase();
        Position::ALL
            .iter()
            .copied()
            .find(|p| p.code() == code)
            .ok_or_else(|| AnalysisError::DataError(format!("unknown position label '{}'", s.trim())))
    }
}

/// Outcome of resolving a raw label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub position: Position,
    /// True when the mapping table changed the label
    pub relabelled: bool,
}

/// Resolve a raw position label to its canonical position.
pub fn canonicalize(raw: &str) -> Result<Resolved> {
    let code = raw.trim().to_ascii_uppercase();
    if let Some((_, position)) = LABEL_MAPPING.iter().find(|(from, _)| *from == code) {
        return Ok(Resolved { position: *position, relabelled: true });
    }
    code.parse::<Position>()
        .map(|position| Resolved { position, relabelled: false })
}

/// Parse a comma-separated eligible-positions list, primary first.
///
/// Entries are canonicalised and duplicates (e.g. "ST, CF") collapse to the
/// first occurrence. Empty entries are skipped.
pub fn parse_position_list(raw: &str) -> Result<Vec<Position>> {
    let mut out: Vec<Position> = Vec::new();
    for entry in raw.split(',') {
        if entry.trim().is_empty() {
            continue;
        }
        let resolved = canonicalize(entry)?;
        if !out.contains(&resolved.position) {
            out.push(resolved.position);
        }
    }
    Ok(out)
}
