//! Referee arithmetic: trial, game and match decisions.
//!
//! Pure functions over flag positions and score histories. The referee calls
//! them with snapshots taken from the monitors, so nothing here ever holds a
//! lock.

use crate::config::MatchRules;
use crate::state::{GameScore, MatchOutcome, Strength, TeamId, TrialScore};

/// Flag step for one trial. Team 1 pulls the flag toward negative positions,
/// team 2 toward positive ones; equal strength leaves it in place.
pub fn flag_step(team1_strength: Strength, team2_strength: Strength) -> i32 {
    match team1_strength.cmp(&team2_strength) {
        std::cmp::Ordering::Greater => -1,
        std::cmp::Ordering::Less => 1,
        std::cmp::Ordering::Equal => 0,
    }
}

/// Trial outcome from the flag movement `current − last`
pub fn decide_trial(last_flag: i32, flag: i32) -> TrialScore {
    match (flag - last_flag).signum() {
        -1 => TrialScore::Team1,
        1 => TrialScore::Team2,
        _ => TrialScore::Draw,
    }
}

pub fn is_knockout(flag: i32, rules: &MatchRules) -> bool {
    flag.abs() >= rules.knockout_margin
}

/// A game ends on a knockout or when its trials run out
pub fn is_game_end(flag: i32, remaining_trials: usize, rules: &MatchRules) -> bool {
    is_knockout(flag, rules) || remaining_trials == 0
}

/// Game outcome: knockout by flag sign, otherwise majority of trial points
pub fn decide_game(flag: i32, trials: &[TrialScore], rules: &MatchRules) -> GameScore {
    if is_knockout(flag, rules) {
        return if flag < 0 {
            GameScore::Team1ByKnockout
        } else {
            GameScore::Team2ByKnockout
        };
    }

    let team1 = trials.iter().filter(|t| **t == TrialScore::Team1).count();
    let team2 = trials.iter().filter(|t| **t == TrialScore::Team2).count();

    match team1.cmp(&team2) {
        std::cmp::Ordering::Greater => GameScore::Team1ByPoints,
        std::cmp::Ordering::Less => GameScore::Team2ByPoints,
        std::cmp::Ordering::Equal => GameScore::Draw,
    }
}

/// Games won by each team; drawn games count for nobody
pub fn game_wins(games: &[GameScore]) -> (u32, u32) {
    games.iter().fold((0, 0), |(t1, t2), game| match game.winner() {
        Some(TeamId::ONE) => (t1 + 1, t2),
        Some(_) => (t1, t2 + 1),
        None => (t1, t2),
    })
}

/// A match ends once a team holds a majority of the games or no games remain
pub fn is_match_end(games: &[GameScore], rules: &MatchRules) -> bool {
    let (team1, team2) = game_wins(games);
    let to_win = rules.games_to_win() as u32;
    team1 >= to_win || team2 >= to_win || games.len() >= rules.games_per_match
}

pub fn decide_match(games: &[GameScore]) -> MatchOutcome {
    let (team1_games, team2_games) = game_wins(games);
    match team1_games.cmp(&team2_games) {
        std::cmp::Ordering::Greater => MatchOutcome::Winner {
            team: TeamId::ONE,
            team1_games,
            team2_games,
        },
        std::cmp::Ordering::Less => MatchOutcome::Winner {
            team: TeamId::TWO,
            team1_games,
            team2_games,
        },
        std::cmp::Ordering::Equal => MatchOutcome::Draw {
            team1_games,
            team2_games,
        },
    }
}
