//! Player data: canonical positions, records and the table loader

pub mod loader;
pub mod player;
pub mod positions;

pub use loader::{dedup_players, validate_schema, LoadSummary, PlayerLoader};
pub use player::{Foot, Metric, PlayerRecord, PlayerTable};
pub use positions::{
    canonicalize, parse_position_list, Position, LABEL_MAPPING, LABEL_MAPPING_VERSION, N_POSITIONS,
};
