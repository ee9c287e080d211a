//! Player records and the cleaned player table

use super::positions::{Position, N_POSITIONS};
use serde::{Deserialize, Serialize};

/// Numeric columns of the processed player table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    Age,
    HeightCm,
    WeightKg,
    WeakFoot,
    MatchesPlayed,
    Starts,
    Minutes,
    Nineties,
    Goals,
    Assists,
    Xg,
    Xag,
    ProgCarries,
    ProgPasses,
    ProgReceives,
    Goals90,
    Assists90,
    Xg90,
    Xag90,
    YellowCards,
    RedCards,
    PenaltiesScored,
    PenaltiesAttempted,
}

impl Metric {
    pub const COUNT: usize = 23;

    /// Every numeric column, in table order
    pub const ALL: [Metric; Metric::COUNT] = [
        Metric::Age,
        Metric::HeightCm,
        Metric::WeightKg,
        Metric::WeakFoot,
        Metric::MatchesPlayed,
        Metric::Starts,
        Metric::Minutes,
        Metric::Nineties,
        Metric::Goals,
        Metric::Assists,
        Metric::Xg,
        Metric::Xag,
        Metric::ProgCarries,
        Metric::ProgPasses,
        Metric::ProgReceives,
        Metric::Goals90,
        Metric::Assists90,
        Metric::Xg90,
        Metric::Xag90,
        Metric::YellowCards,
        Metric::RedCards,
        Metric::PenaltiesScored,
        Metric::PenaltiesAttempted,
    ];

    /// Header name in the input file
    pub fn column(self) -> &'static str {
        match self {
            Metric::Age => "age",
            Metric::HeightCm => "height_cm",
            Metric::WeightKg => "weight_kg",
            Metric::WeakFoot => "weak_foot",
            Metric::MatchesPlayed => "mp",
            Metric::Starts => "starts",
            Metric::Minutes => "min",
            Metric::Nineties => "90s",
            Metric::Goals => "gls",
            Metric::Assists => "ast",
            Metric::Xg => "xg",
            Metric::Xag => "xag",
            Metric::ProgCarries => "prgc",
            Metric::ProgPasses => "prgp",
            Metric::ProgReceives => "prgr",
            Metric::Goals90 => "gls_90",
            Metric::Assists90 => "ast_90",
            Metric::Xg90 => "xg_90",
            Metric::Xag90 => "xag_90",
            Metric::YellowCards => "crdy",
            Metric::RedCards => "crdr",
            Metric::PenaltiesScored => "pk",
            Metric::PenaltiesAttempted => "pkatt",
        }
    }

    /// Raw counting column a per-90 metric is derived from
    pub fn per90_source(self) -> Option<Metric> {
        match self {
            Metric::Goals90 => Some(Metric::Goals),
            Metric::Assists90 => Some(Metric::Assists),
            Metric::Xg90 => Some(Metric::Xg),
            Metric::Xag90 => Some(Metric::Xag),
            _ => None,
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

/// Preferred kicking foot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Foot {
    Left,
    Right,
}

impl Foot {
    pub fn parse(raw: &str) -> Option<Foot> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "left" | "l" => Some(Foot::Left),
            "right" | "r" => Some(Foot::Right),
            _ => None,
        }
    }
}

/// One player after cleaning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub player: String,
    pub nation: Option<String>,
    /// Eligible positions, primary first, already canonical
    pub positions: Vec<Position>,
    pub main_position: Position,
    pub preferred_foot: Option<Foot>,
    metrics: [Option<f64>; Metric::COUNT],
}

impl PlayerRecord {
    pub fn new(player: impl Into<String>, main_position: Position) -> Self {
        Self {
            player: player.into(),
            nation: None,
            positions: vec![main_position],
            main_position,
            preferred_foot: None,
            metrics: [None; Metric::COUNT],
        }
    }

    pub fn with_positions(mut self, positions: Vec<Position>) -> Self {
        self.positions = positions;
        self
    }

    pub fn with_foot(mut self, foot: Foot) -> Self {
        self.preferred_foot = Some(foot);
        self
    }

    pub fn with_metric(mut self, metric: Metric, value: f64) -> Self {
        self.metrics[metric.slot()] = Some(value);
        self
    }

    pub fn value(&self, metric: Metric) -> Option<f64> {
        self.metrics[metric.slot()]
    }

    pub fn set_value(&mut self, metric: Metric, value: Option<f64>) {
        self.metrics[metric.slot()] = value;
    }

    /// Positions that earn credit under the total-accuracy rule: the main
    /// position plus the first three listed positions.
    pub fn credited_positions(&self) -> Vec<Position> {
        let mut out = vec![self.main_position];
        for p in self.positions.iter().take(3) {
            if !out.contains(p) {
                out.push(*p);
            }
        }
        out
    }
}

/// The cleaned player table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerTable {
    players: Vec<PlayerRecord>,
}

impl PlayerTable {
    pub fn new(players: Vec<PlayerRecord>) -> Self {
        Self { players }
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn players(&self) -> &[PlayerRecord] {
        &self.players
    }

    pub fn get(&self, idx: usize) -> Option<&PlayerRecord> {
        self.players.get(idx)
    }

    /// Class index of every player's main position
    pub fn labels(&self) -> Vec<usize> {
        self.players.iter().map(|p| p.main_position.index()).collect()
    }

    /// Number of players per canonical position
    pub fn class_counts(&self) -> [usize; N_POSITIONS] {
        let mut counts = [0usize; N_POSITIONS];
        for p in &self.players {
            counts[p.main_position.index()] += 1;
        }
        counts
    }

    /// Rows at `indices`, in the given order
    pub fn select(&self, indices: &[usize]) -> Vec<&PlayerRecord> {
        indices.iter().filter_map(|&i| self.players.get(i)).collect()
    }
}
