//! Integration test: loading and normalising the player file

use pl_positions::data::{dedup_players, Metric, PlayerLoader, Position, N_POSITIONS};
use pl_positions::error::{AnalysisError, ErrorKind};
use std::io::Write;
use tempfile::NamedTempFile;

const HEADER: &str = "player,nation,positions,main_position,age,height_cm,weight_kg,preferred_foot,weak_foot,\
mp,starts,min,90s,gls,ast,xg,xag,prgc,prgp,prgr,gls_90,ast_90,xg_90,xag_90,crdy,crdr,pk,pkatt";

fn row(name: &str, positions: &str, main: &str, gls_90: &str) -> String {
    format!(
        "{},ENG,\"{}\",{},25,180,75,Right,3,30,28,2500,27.8,10,4,9.1,3.2,40,60,90,{},0.14,0.33,0.12,3,0,1,1",
        name, positions, main, gls_90
    )
}

fn write_csv(rows: &[String]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{}", HEADER).unwrap();
    for r in rows {
        writeln!(file, "{}", r).unwrap();
    }
    file.flush().unwrap();
    file
}

#[test]
fn test_relabels_minor_positions() {
    let file = write_csv(&[
        row("Alan", "CF, ST", "CF", "0.40"),
        row("Bert", "RWB, RM", "RWB", "0.05"),
        row("Carl", "LWB", "LWB", "0.02"),
        row("Dean", "CB", "CB", "0.01"),
    ]);
    let (table, summary) = PlayerLoader::new().load_csv(file.path()).unwrap();

    assert_eq!(table.len(), 4);
    assert_eq!(summary.relabelled, 3);
    let mains: Vec<Position> = table.players().iter().map(|p| p.main_position).collect();
    assert_eq!(mains, vec![Position::ST, Position::RB, Position::LB, Position::CB]);
    assert_eq!(table.players()[0].positions, vec![Position::ST]);
    assert_eq!(table.players()[1].positions, vec![Position::RB, Position::RM]);
    for p in table.players() {
        assert!(p.main_position.index() < N_POSITIONS);
    }
}

#[test]
fn test_drops_null_main_and_duplicates() {
    let file = write_csv(&[
        row("Alan", "ST", "ST", "0.40"),
        row("Bert", "CM", "", "0.10"),
        row("Alan", "LW", "LW", "0.30"),
        row("Carl", "GK", "GK", "0.00"),
    ]);
    let (table, summary) = PlayerLoader::new().load_csv(file.path()).unwrap();

    assert_eq!(summary.raw_rows, 4);
    assert_eq!(summary.dropped_null_main, 1);
    assert_eq!(summary.duplicates_removed, 1);
    assert_eq!(summary.players, 2);
    assert_eq!(table.players()[0].main_position, Position::ST);

    let (again, removed) = dedup_players(table.players().to_vec());
    assert_eq!(removed, 0);
    assert_eq!(again.len(), table.len());
}

#[test]
fn test_missing_per90_is_derived() {
    let file = write_csv(&[row("Alan", "ST", "ST", "")]);
    let (table, summary) = PlayerLoader::new().load_csv(file.path()).unwrap();

    assert_eq!(summary.derived_per90_cells, 1);
    let g90 = table.players()[0].value(Metric::Goals90).unwrap();
    assert!((g90 - 10.0 / 27.8).abs() < 1e-9);
}

#[test]
fn test_missing_columns_are_schema_error() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "player,nation,main_position").unwrap();
    writeln!(file, "Alan,ENG,ST").unwrap();
    file.flush().unwrap();

    let err = PlayerLoader::new().load_csv(file.path()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Schema);
    match err {
        AnalysisError::SchemaError(msg) => {
            assert!(msg.contains("positions"));
            assert!(msg.contains("xg_90"));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_unknown_position_names_the_row() {
    let file = write_csv(&[row("Alan", "ST", "ST", "0.4"), row("Bert", "SW", "SW", "0.0")]);
    let err = PlayerLoader::new().load_csv(file.path()).unwrap_err();
    assert!(err.to_string().contains("Bert"));
}
