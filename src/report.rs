//! Plain-text report rendering
//!
//! Everything the engine publishes goes through here: the ranking table
//! with its classification sections, the week-by-week game listing, team
//! logs, the region standings shown during anchoring, period-over-period
//! comparisons and matchup forecasts. Builders return plain strings so
//! callers decide where the text goes.

use chrono::NaiveDate;

use crate::error::Result;
use crate::rating::anchor::RegionStanding;
use crate::session::{ComparisonRow, EngineKind, MatchupForecast, RankingPeriod, SolveSummary};

/// The ranking table with its classification sections
pub fn ranking_table(period: &RankingPeriod, only_active: bool) -> String {
    let classification = period.classify();
    let mut out = String::new();

    out.push_str(&format!(
        "\nRankings for period {} to {}\n",
        period.start(),
        period.end()
    ));
    if let Some(notes) = period.notes() {
        out.push_str(&format!("{}\n", notes));
    }
    if only_active {
        out.push_str("Only teams active this period are shown\n");
    }
    out.push_str("Rank   Power  Games   Team\n");
    for row in period.standings(only_active) {
        let marker = if row.is_new { "  (new)" } else { "" };
        out.push_str(&format!(
            "{:>3}   {:>6.1}    {:>2}    {}{}\n",
            row.rank, row.power, row.games_played, row.name, marker
        ));
    }

    if !classification.unrated.is_empty() {
        out.push_str("\nThe following teams are not ranked because no power has been assigned:\n");
        for name in &classification.unrated {
            out.push_str(&format!("{}\n", name));
        }
    }
    if only_active {
        if !classification.inactive.is_empty() {
            out.push_str(
                "\nThe following teams played games, but did not meet minimum activity requirements:\n",
            );
            for name in &classification.inactive {
                out.push_str(&format!("{}\n", name));
            }
        }
        if !classification.no_games.is_empty() {
            out.push_str("\nThe following teams played no games in the given period:\n");
            for name in &classification.no_games {
                out.push_str(&format!("{}\n", name));
            }
        }
    }
    if !classification.hiatus.is_empty() {
        out.push_str("\nThe following teams are not ranked because they are on hiatus:\n");
        for name in &classification.hiatus {
            out.push_str(&format!("{}\n", name));
        }
    }
    if !classification.disbanded.is_empty() {
        out.push_str(
            "\nThe following teams have disbanded, but their game results are used where required:\n",
        );
        for name in &classification.disbanded {
            out.push_str(&format!("{}\n", name));
        }
    }
    out
}

/// Week-by-week game listing; empty weeks are left out
pub fn games_by_week(period: &RankingPeriod) -> String {
    let mut out = String::new();
    for week in period.weeks() {
        if week.game_ids.is_empty() {
            continue;
        }
        out.push_str(&format!("\nWeek {} - {}\n", week.start, week.end));
        out.push_str(&"- ".repeat(48));
        out.push('\n');
        for &game_id in &week.game_ids {
            if let Some(game) = period.games().get(game_id) {
                out.push_str(&format!("{}\n", game));
            }
        }
    }
    out
}

/// One team's period at a glance
pub fn team_log(period: &RankingPeriod, name: &str) -> Result<String> {
    let team = period.registry().require(name)?;
    let games = period.games_of(name)?;

    let mut out = String::new();
    let rule = "=".repeat(name.len());
    out.push_str(&format!("{}\n{}\n{}\n", rule, name, rule));
    if let Some(power) = team.power {
        out.push_str(&format!("Power: {:.1}\n", power));
    }
    out.push_str(&format!(
        "Record: {} wins in {} games\n",
        team.wins, team.games_played
    ));
    out.push_str(&format!("Unique opponents: {}\n", team.opponents.join(", ")));
    out.push_str("Games:\n");
    for game in games {
        out.push_str(&format!("{}\n", game));
    }
    Ok(out)
}

/// Region standings shown to the operator before pinning
pub fn region_standings_table(standings: &[RegionStanding]) -> String {
    let mut out = String::new();
    for standing in standings {
        out.push_str(&format!("\nRegion {}\n========\n", standing.index + 1));
        if !standing.is_reference {
            out.push_str(
                "These powers only order the region internally. They do not reflect global power.\n",
            );
            out.push_str("An anchor rating for this region is required.\n");
        }
        for (name, power, games) in &standing.members {
            out.push_str(&format!("{:>7.1}    {:>2}    {}\n", power, games, name));
        }
    }
    out
}

/// Period-over-period comparison table
pub fn comparison_table(rows: &[ComparisonRow], current: NaiveDate, previous: NaiveDate) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "\nChanges in ranking between {} and {}\n",
        previous, current
    ));
    out.push_str("\nchg | rank | chg | power |games| team\n");
    for row in rows {
        out.push_str(&format!(
            "{} {:>4}  {}  {:>6.1}    {:>2}    {}\n",
            rank_change_cell(row.rank_change),
            row.rank,
            power_change_cell(row.power_change),
            row.power,
            row.games_played,
            row.name
        ));
    }
    out
}

fn rank_change_cell(change: Option<i64>) -> String {
    match change {
        Some(0) => "  -".to_string(),
        Some(change) => format!("{:>+3}", change),
        None => "new".to_string(),
    }
}

fn power_change_cell(change: Option<f64>) -> String {
    match change {
        Some(change) => format!("{:>6.1}", change),
        None => "     -".to_string(),
    }
}

/// Narrated matchup forecast
pub fn forecast_narrative(forecast: &MatchupForecast) -> String {
    let mut out = String::new();

    if forecast.gap() == 0.0 {
        out.push_str(&format!(
            "{} and {} are predicted to be dead even\n",
            forecast.home, forecast.away
        ));
    } else {
        let loser = if forecast.favored() == forecast.home {
            &forecast.away
        } else {
            &forecast.home
        };
        // score_ratio is the losing share, so the winning factor inverts it
        let factor = 1.0 / forecast.score_ratio();
        out.push_str(&format!(
            "{} is predicted to beat {} by a factor of {:.1} with a DOS of {:.3}\n",
            forecast.favored(),
            loser,
            factor,
            forecast.expected_dos.abs()
        ));
    }

    if forecast.is_close() {
        out.push_str("The data says this should be a close game!\n");
    }
    if forecast.is_lopsided() {
        out.push_str("The data says this might be a bit lop-sided...\n");
    }
    out
}

/// One-paragraph solve summary for the console
pub fn period_summary(period: &RankingPeriod, summary: &SolveSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Period {} to {}: {} games, {} teams, {} weeks\n",
        period.start(),
        period.end(),
        period.games().len(),
        period.registry().len(),
        period.weeks().len()
    ));
    let unit = match summary.engine {
        EngineKind::Regression => "iterations",
        EngineKind::Iterative => "sweeps",
    };
    out.push_str(&format!(
        "{} engine solved {} teams in {} {} (residual {:.3e})\n",
        summary.engine, summary.teams_solved, summary.iterations, unit, summary.residual
    ));
    if !summary.seeded.is_empty() {
        out.push_str(&format!(
            "Fitted starting powers for: {}\n",
            summary.seeded.join(", ")
        ));
    }
    out
}
