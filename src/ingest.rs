//! File readers and writers for schedules, rosters and history
//!
//! Game files are headerless CSV, one result per line:
//! `YYYYMMDD,Home Team,HS,Away Team,AS`. Name lists (rosters, hiatus and
//! disbanded flags) take the first field of each line. Published history
//! travels as a JSON array of snapshots. Raw schedule exports with
//! slashed dates and duplicate rows are normalized by the schedule
//! cleaner before they ever reach a game file.

use std::collections::HashSet;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::Context;
use tracing::{debug, info};

use crate::error::{RankingError, Result};
use crate::rating::carry_forward::{RankingHistory, Snapshot};
use crate::types::Game;
use crate::utils::parse_compact_date;

/// Parse one `YYYYMMDD,home,HS,away,AS` line
pub fn parse_game_line(line: &str, line_number: usize) -> Result<Game> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 5 {
        return Err(RankingError::MalformedRecord {
            line: line_number,
            reason: format!("expected 5 fields, found {}", fields.len()),
        }
        .into());
    }

    let date = parse_compact_date(fields[0]).map_err(|error| RankingError::MalformedRecord {
        line: line_number,
        reason: error.to_string(),
    })?;
    if fields[1].is_empty() || fields[3].is_empty() {
        return Err(RankingError::MalformedRecord {
            line: line_number,
            reason: "empty team name".to_string(),
        }
        .into());
    }
    let home_score: u32 = fields[2].parse().map_err(|_| RankingError::MalformedRecord {
        line: line_number,
        reason: format!("home score {:?} is not a number", fields[2]),
    })?;
    let away_score: u32 = fields[4].parse().map_err(|_| RankingError::MalformedRecord {
        line: line_number,
        reason: format!("away score {:?} is not a number", fields[4]),
    })?;

    Game::new(date, fields[1], home_score, fields[3], away_score)
        .with_context(|| format!("schedule line {}", line_number))
}

/// Read a game file, skipping blank lines
pub fn read_games(path: impl AsRef<Path>) -> Result<Vec<Game>> {
    let path = path.as_ref();
    let file = fs::File::open(path)
        .with_context(|| format!("cannot open game file {}", path.display()))?;

    let mut games = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        games.push(parse_game_line(&line, index + 1)?);
    }
    info!("read {} games from {}", games.len(), path.display());
    Ok(games)
}

/// Read a name list; only the first field of each line counts
pub fn read_name_list(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let file = fs::File::open(path)
        .with_context(|| format!("cannot open name list {}", path.display()))?;

    let mut names = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        let name = line.split(',').next().unwrap_or("").trim();
        if !name.is_empty() {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

/// Load published history from a JSON file
pub fn load_history(path: impl AsRef<Path>) -> Result<RankingHistory> {
    let path = path.as_ref();
    let data = fs::read_to_string(path)
        .with_context(|| format!("cannot read history file {}", path.display()))?;
    let snapshots: Vec<Snapshot> = serde_json::from_str(&data)
        .with_context(|| format!("history file {} is not valid JSON", path.display()))?;

    // ordering and duplicate boundaries are re-checked no matter how the
    // file was produced
    let history = RankingHistory::from_snapshots(snapshots)?;
    info!(
        "loaded {} snapshots from {}",
        history.len(),
        path.display()
    );
    Ok(history)
}

/// Write published history as pretty JSON
pub fn save_history(path: impl AsRef<Path>, history: &RankingHistory) -> Result<()> {
    let path = path.as_ref();
    let data = serde_json::to_string_pretty(history)?;
    fs::write(path, data)
        .with_context(|| format!("cannot write history file {}", path.display()))?;
    info!("wrote {} snapshots to {}", history.len(), path.display());
    Ok(())
}

/// Column order of slashed dates in a raw schedule export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateOrder {
    DayFirst,
    MonthFirst,
}

/// Turn a raw schedule export into clean game lines
///
/// Raw rows look like `D/M/YYYY,Event,Home,HS,Away,AS` (or month-first,
/// per `order`). Rows with an empty date are skipped, two-digit years are
/// taken as 20xx, and a result that repeats an earlier row, with the
/// sides either way around, is dropped.
pub fn normalize_schedule(input: &str, order: DateOrder) -> Result<Vec<String>> {
    let mut seen: HashSet<[String; 5]> = HashSet::new();
    let mut out = Vec::new();

    for (index, line) in input.lines().enumerate() {
        let line_number = index + 1;
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields[0].is_empty() {
            debug!("line {} has no date, skipped", line_number);
            continue;
        }
        if fields.len() < 6 {
            return Err(RankingError::MalformedRecord {
                line: line_number,
                reason: format!("expected at least 6 fields, found {}", fields.len()),
            }
            .into());
        }

        let date = normalize_slashed_date(fields[0], order, line_number)?;
        let row = [
            date,
            fields[2].to_string(),
            fields[3].to_string(),
            fields[4].to_string(),
            fields[5].to_string(),
        ];
        let swapped = [
            row[0].clone(),
            row[3].clone(),
            row[4].clone(),
            row[1].clone(),
            row[2].clone(),
        ];
        if seen.contains(&row) || seen.contains(&swapped) {
            debug!("line {} repeats an earlier result, dropped", line_number);
            continue;
        }

        out.push(row.join(","));
        seen.insert(row);
    }
    Ok(out)
}

/// Write clean game lines produced by the schedule cleaner
pub fn write_schedule(path: impl AsRef<Path>, lines: &[String]) -> Result<()> {
    let path = path.as_ref();
    let mut data = lines.join("\n");
    if !data.is_empty() {
        data.push('\n');
    }
    fs::write(path, data)
        .with_context(|| format!("cannot write schedule {}", path.display()))?;
    Ok(())
}

fn normalize_slashed_date(raw: &str, order: DateOrder, line_number: usize) -> Result<String> {
    let parts: Vec<&str> = raw.split('/').collect();
    if parts.len() != 3 {
        return Err(RankingError::MalformedRecord {
            line: line_number,
            reason: format!("date {:?} is not three slashed fields", raw),
        }
        .into());
    }

    let (day, month) = match order {
        DateOrder::DayFirst => (parts[0], parts[1]),
        DateOrder::MonthFirst => (parts[1], parts[0]),
    };
    let year = if parts[2].len() == 4 {
        parts[2].to_string()
    } else {
        format!("20{}", parts[2])
    };

    let compact = format!("{}{:0>2}{:0>2}", year, month, day);
    // round-trip to catch impossible dates before they reach a game file
    parse_compact_date(&compact).map_err(|error| RankingError::MalformedRecord {
        line: line_number,
        reason: error.to_string(),
    })?;
    Ok(compact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_game_line() {
        let game = parse_game_line("20180307,Reds,3,Blues,1", 1).unwrap();
        assert_eq!(game.date(), date(2018, 3, 7));
        assert_eq!(game.home_team(), "Reds");
        assert_eq!(game.home_score(), 3);
        assert_eq!(game.away_team(), "Blues");
        assert_eq!(game.away_score(), 1);
    }

    #[test]
    fn test_parse_game_line_errors_carry_line_numbers() {
        let err = parse_game_line("20180307,Reds,3,Blues", 7).unwrap_err();
        match err.downcast_ref::<RankingError>() {
            Some(RankingError::MalformedRecord { line, .. }) => assert_eq!(*line, 7),
            other => panic!("unexpected error {:?}", other),
        }

        assert!(parse_game_line("2018037,Reds,3,Blues,1", 1).is_err());
        assert!(parse_game_line("20180307,Reds,three,Blues,1", 1).is_err());
        assert!(parse_game_line("20180307,,3,Blues,1", 1).is_err());
        // draws are rejected at game construction
        assert!(parse_game_line("20180307,Reds,2,Blues,2", 1).is_err());
    }

    #[test]
    fn test_read_games_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("games.csv");
        fs::write(
            &path,
            "20180307,Reds,3,Blues,1\n\n20180308,Greens,2,Golds,1\n",
        )
        .unwrap();

        let games = read_games(&path).unwrap();
        assert_eq!(games.len(), 2);
        assert_eq!(games[1].home_team(), "Greens");
    }

    #[test]
    fn test_read_games_reports_offending_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("games.csv");
        fs::write(&path, "20180307,Reds,3,Blues,1\n\nnot a game\n").unwrap();

        let err = read_games(&path).unwrap_err();
        match err.downcast_ref::<RankingError>() {
            Some(RankingError::MalformedRecord { line, .. }) => assert_eq!(*line, 3),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_read_name_list_takes_first_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hiatus.csv");
        fs::write(&path, "Reds\nBlues,returning next season\n\n").unwrap();

        let names = read_name_list(&path).unwrap();
        assert_eq!(names, vec!["Reds".to_string(), "Blues".to_string()]);
    }

    #[test]
    fn test_history_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let mut first = Snapshot::new(date(2017, 4, 26));
        first.record("Reds", 1000.0, Some(1));
        let mut second = Snapshot::new(date(2018, 4, 25));
        second.record("Reds", 1010.0, Some(1));
        second.record("Blues", 950.0, Some(2));
        let history = RankingHistory::from_snapshots(vec![first, second]).unwrap();

        save_history(&path, &history).unwrap();
        let loaded = load_history(&path).unwrap();

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.latest_boundary(), Some(date(2018, 4, 25)));
        assert_eq!(loaded.latest_power("Blues"), Some(950.0));
    }

    #[test]
    fn test_load_history_rejects_duplicate_boundaries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let snapshots = vec![Snapshot::new(date(2018, 4, 25)), Snapshot::new(date(2018, 4, 25))];
        fs::write(&path, serde_json::to_string(&snapshots).unwrap()).unwrap();

        assert!(load_history(&path).is_err());
    }

    #[test]
    fn test_load_history_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "not json").unwrap();
        assert!(load_history(&path).is_err());
    }

    #[test]
    fn test_normalize_schedule_day_first() {
        let raw = "7/3/2018,Spring Open,Reds,3,Blues,1\n4/11/18,Autumn Cup,Greens,2,Golds,1\n";
        let lines = normalize_schedule(raw, DateOrder::DayFirst).unwrap();
        assert_eq!(
            lines,
            vec![
                "20180307,Reds,3,Blues,1".to_string(),
                "20181104,Greens,2,Golds,1".to_string(),
            ]
        );
    }

    #[test]
    fn test_normalize_schedule_month_first() {
        let raw = "3/7/2018,Spring Open,Reds,3,Blues,1\n";
        let lines = normalize_schedule(raw, DateOrder::MonthFirst).unwrap();
        assert_eq!(lines, vec!["20180307,Reds,3,Blues,1".to_string()]);
    }

    #[test]
    fn test_normalize_drops_exact_and_swapped_duplicates() {
        let raw = "\
7/3/2018,Spring Open,Reds,3,Blues,1
7/3/2018,Spring Open,Reds,3,Blues,1
7/3/2018,Spring Open,Blues,1,Reds,3
8/3/2018,Spring Open,Reds,3,Blues,1
";
        let lines = normalize_schedule(raw, DateOrder::DayFirst).unwrap();
        assert_eq!(
            lines,
            vec![
                "20180307,Reds,3,Blues,1".to_string(),
                "20180308,Reds,3,Blues,1".to_string(),
            ]
        );
    }

    #[test]
    fn test_normalize_skips_rows_without_dates() {
        let raw = ",header row,Home,HS,Away,AS\n7/3/2018,Spring Open,Reds,3,Blues,1\n";
        let lines = normalize_schedule(raw, DateOrder::DayFirst).unwrap();
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn test_normalize_rejects_short_rows() {
        let err = normalize_schedule("7/3/2018,Spring Open,Reds,3\n", DateOrder::DayFirst)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RankingError>(),
            Some(RankingError::MalformedRecord { line: 1, .. })
        ));
    }

    #[test]
    fn test_normalize_rejects_impossible_dates() {
        let raw = "31/2/2018,Spring Open,Reds,3,Blues,1\n";
        assert!(normalize_schedule(raw, DateOrder::DayFirst).is_err());
    }

    #[test]
    fn test_write_schedule_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clean.csv");
        let lines = vec!["20180307,Reds,3,Blues,1".to_string()];

        write_schedule(&path, &lines).unwrap();
        let games = read_games(&path).unwrap();
        assert_eq!(games.len(), 1);
        assert_eq!(games[0].winner(), "Reds");
    }
}
