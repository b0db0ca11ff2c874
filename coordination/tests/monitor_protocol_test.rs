//! Monitor protocol tests
//!
//! Drives the shared monitors by hand from test threads, without the entity
//! state machines:
//! 1. Four trials won by the stronger team end the game by knockout
//! 2. A coach is held at the placement barrier until its whole team stands
//! 3. Aborting the site releases every blocked thread with an abort error

use rope_coordination::entities::{SelectionStrategy, StrongestSelection};
use rope_coordination::{
    rules, CoachState, CoachView, ContestantId, ContestantState, ContestantView, EventBus,
    GameScore, InformationRepository, KernelError, KernelResult, MatchConfig, MatchRules,
    MatchSite, Strength, TeamId, TrialScore,
};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

fn site() -> Arc<MatchSite> {
    let config = MatchConfig {
        seed: Some(0),
        ..MatchConfig::default()
    };
    let repository = Arc::new(InformationRepository::new(config.rules));
    Arc::new(MatchSite::new(&config, repository, EventBus::new().shared()))
}

fn view(team: TeamId, number: u8, strength: Strength) -> ContestantView {
    ContestantView {
        team,
        id: ContestantId(number),
        state: ContestantState::SeatAtTheBench,
        strength,
    }
}

/// Sit, get picked, stand, pull, repeat until the bench lets go unpicked.
/// Returns the number of trials pulled in.
fn spawn_contestant(site: &Arc<MatchSite>, mut me: ContestantView) -> JoinHandle<KernelResult<usize>> {
    let site = Arc::clone(site);
    thread::spawn(move || {
        let mut pulled = 0;
        loop {
            let seating = site.bench(me.team).add_contestant(me)?;
            if !seating.selected {
                return Ok(pulled);
            }
            me.strength = seating.strength;
            assert!(site.bench(me.team).get_contestant(me.id)?);
            me.state = site.playground.add_contestant(me)?;
            me.state = site.playground.pull_rope(me, Duration::ZERO)?;
            assert!(site.playground.get_contestant(me.team, me.id)?);
            pulled += 1;
        }
    })
}

/// Pick the strongest three for `trials` trials, without reviewing strengths
fn spawn_coach(site: &Arc<MatchSite>, team: TeamId, trials: usize) -> JoinHandle<KernelResult<()>> {
    let site = Arc::clone(site);
    thread::spawn(move || {
        let mut strategy = StrongestSelection;
        let rules = MatchRules::default();
        let mut coach = CoachView {
            team,
            state: CoachState::WaitForRefereeCommand,
        };
        for _ in 0..trials {
            let seated = site.bench(team).get_bench()?;
            assert_eq!(seated.len(), rules.team_size);
            let pick = strategy.pick(&seated, rules.pullers_per_team);
            site.bench(team).set_selected_contestants(&pick)?;

            let placement = site.playground.check_team_placement(coach)?;
            coach.state = placement.state;
            site.score_board.inform_referee()?;
            coach.state = site.playground.watch_trial(coach, placement.ticket)?;
        }
        Ok(())
    })
}

#[test]
fn test_stronger_team_wins_by_knockout() {
    let site = site();
    let rules = MatchRules::default();

    // Team 1 fields 300, team 2 fields 250
    let strengths: [[Strength; 5]; 2] = [[100, 100, 100, 1, 1], [90, 80, 80, 10, 10]];
    let mut contestants = Vec::new();
    for team in TeamId::all() {
        for (i, strength) in strengths[team.index()].iter().enumerate() {
            contestants.push(spawn_contestant(&site, view(team, i as u8 + 1, *strength)));
        }
    }
    let coaches: Vec<_> = TeamId::all()
        .into_iter()
        .map(|team| spawn_coach(&site, team, 4))
        .collect();

    let mut trials = Vec::new();
    for trial in 1..=4 {
        site.score_board.both_teams_ready().unwrap();
        site.playground.start_pulling().unwrap();

        let flag = site.playground.get_flag_position().unwrap();
        let last = site.playground.get_last_flag_position().unwrap();
        assert_eq!(flag, -trial);
        let score = rules::decide_trial(last, flag);
        assert_eq!(score, TrialScore::Team1);
        site.score_board.add_trial_point(score).unwrap();
        trials.push(score);
        site.playground.result_asserted().unwrap();
    }

    let flag = site.playground.get_flag_position().unwrap();
    let remaining = site.score_board.remaining_trials().unwrap();
    assert!(rules::is_game_end(flag, remaining, &rules));
    let game = rules::decide_game(flag, &trials, &rules);
    assert_eq!(game, GameScore::Team1ByKnockout);
    site.score_board.add_game_point(game).unwrap();

    site.score_board.set_match_ended(true).unwrap();
    for team in TeamId::all() {
        site.bench(team).interrupt().unwrap();
    }

    for coach in coaches {
        coach.join().unwrap().unwrap();
    }
    let pulled: Vec<usize> = contestants
        .into_iter()
        .map(|c| c.join().unwrap().unwrap())
        .collect();
    // The three strongest of each team pulled every time, the rest never did
    assert_eq!(pulled, vec![4, 4, 4, 0, 0, 4, 4, 4, 0, 0]);

    // Nobody reviewed strengths, so the records are untouched
    let team2 = site.bench(TeamId::TWO).strengths().unwrap();
    assert_eq!(team2.values().copied().collect::<Vec<_>>(), vec![90, 80, 80, 10, 10]);
    assert_eq!(site.score_board.game_points().unwrap(), vec![game]);
}

#[test]
fn test_coach_waits_for_the_whole_team_in_position() {
    let site = site();
    let team = TeamId::ONE;

    let (tx, rx) = mpsc::channel();
    let coach = {
        let site = Arc::clone(&site);
        thread::spawn(move || {
            let placement = site.playground.check_team_placement(CoachView {
                team,
                state: CoachState::WaitForRefereeCommand,
            });
            tx.send(placement.map(|p| p.ticket.0)).unwrap();
        })
    };

    let stand = |number: u8| {
        let site = Arc::clone(&site);
        thread::spawn(move || site.playground.add_contestant(view(team, number, 10)))
    };

    let first_two = vec![stand(1), stand(2)];
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    let third = stand(3);
    let ticket = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
    assert_eq!(ticket, 1);
    coach.join().unwrap();
    assert_eq!(site.playground.teams().unwrap()[team.index()].len(), 3);

    // Nobody starts the trial; release the contestants
    site.abort();
    for handle in first_two.into_iter().chain([third]) {
        assert!(handle.join().unwrap().unwrap_err().is_aborted());
    }
}

#[test]
fn test_abort_releases_every_waiter() {
    let site = site();

    let mut waiters: Vec<JoinHandle<KernelResult<()>>> = Vec::new();
    for number in 1..=2 {
        let site = Arc::clone(&site);
        waiters.push(thread::spawn(move || {
            site.bench(TeamId::TWO)
                .add_contestant(view(TeamId::TWO, number, 10))
                .map(|_| ())
        }));
    }
    {
        let site = Arc::clone(&site);
        waiters.push(thread::spawn(move || {
            site.bench(TeamId::ONE)
                .wait_for_next_trial(CoachView {
                    team: TeamId::ONE,
                    state: CoachState::WaitForRefereeCommand,
                })
                .map(|_| ())
        }));
    }
    {
        let site = Arc::clone(&site);
        waiters.push(thread::spawn(move || site.bench(TeamId::TWO).get_bench().map(|_| ())));
    }
    {
        let site = Arc::clone(&site);
        waiters.push(thread::spawn(move || {
            site.score_board.both_teams_ready().map(|_| ())
        }));
    }
    {
        let site = Arc::clone(&site);
        waiters.push(thread::spawn(move || site.playground.start_pulling().map(|_| ())));
    }

    thread::sleep(Duration::from_millis(50));
    site.abort();

    for waiter in waiters {
        let err = waiter.join().unwrap().unwrap_err();
        assert!(matches!(err, KernelError::Aborted { .. }), "unexpected {err:?}");
    }
    assert!(site.score_board.is_match_ended().unwrap());
}
