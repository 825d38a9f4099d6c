//! Game family: unscored practice matches against a fixed strategy, then
//! scored matches of which the best counts.

use std::sync::Arc;

use crate::domain::error::{ProbeError, Result};
use crate::domain::sample::{GameSample, SampleSet};
use crate::obs;
use crate::oracle::{GameMatch, GameOracle};
use crate::score::ScoreAggregator;
use crate::session::{Session, TurnResult, OK_REPLY};

#[derive(Clone)]
pub struct GameTask {
    pub oracle: Arc<dyn GameOracle>,
    pub samples: SampleSet<GameSample>,
}

impl GameTask {
    pub fn new(oracle: Arc<dyn GameOracle>, samples: SampleSet<GameSample>) -> Self {
        Self { oracle, samples }
    }
}

fn exploration_announcement(matches: u32) -> String {
    format!(
        "********Exploration Phase Starts, We wll Play the Game for {matches} Times. Your Actions Will Not Be Recorded, and Your Score Does Not Matter.**********\n"
    )
}

fn practice_header(round: u32, total: u32) -> (String, String) {
    (
        format!("***Exploration Round <{round}/{total}> Start***\n"),
        format!("Ok. I'm ready to play the game. This is round {round} of the exploration phase."),
    )
}

fn evaluation_header(attempts: u32, current: u32) -> String {
    format!(
        "********Evaluation Phase Starts, We Will Play the Game for {attempts} Time. Now is the {current} time. The highest score Will Be Recorded.**********\n"
    )
}

/// Per-sample credit: the best score normalised by the maximum, floored at 0.
pub fn credit(best: f64, max_score: f64) -> f64 {
    (best / max_score).max(0.0)
}

#[derive(Debug, Default)]
struct Played {
    score: f64,
    format_failures: u32,
}

/// Play one match to the end. Returns `None` if the session was aborted
/// before the match finished.
async fn play(session: &mut Session, game: &mut dyn GameMatch) -> Result<Option<Played>> {
    let cap = session.config().format_retry_cap;
    let mut format_failures = 0;

    while !game.is_finished() {
        if session.is_aborted() {
            return Ok(None);
        }
        let reply = session.ask(game.prompt()).await?;
        let mut action = game.parse_action(&reply);
        let mut reminders = 0;
        while let Err(reminder) = &action {
            if reminders >= cap || session.is_aborted() {
                break;
            }
            reminders += 1;
            format_failures += 1;
            obs::emit_format_rejected("invalid move", reminders);
            let retry = session.remind(reminder.clone()).await?;
            action = game.parse_action(&retry);
        }
        if action.is_err() {
            format_failures += 1;
        }
        game.apply(action.ok().as_deref());
    }

    session.inject(game.summary(), OK_REPLY);
    Ok(Some(Played {
        score: game.score(),
        format_failures,
    }))
}

pub(super) async fn run(
    task: &GameTask,
    session: &mut Session,
    scores: &mut ScoreAggregator,
) -> Result<()> {
    let max_turns = session.config().max_turns;
    let attempts = session.config().answer_attempts();

    let mut maxima = Vec::with_capacity(task.samples.len());
    for (i, sample) in task.samples.iter().enumerate() {
        let max_score = task.oracle.max_score(&sample.settings);
        if !(max_score.is_finite() && max_score > 0.0) {
            return Err(ProbeError::config(format!(
                "game {i}: max score must be positive, got {max_score}"
            )));
        }
        maxima.push(max_score);
    }

    session.ask(exploration_announcement(max_turns)).await?;
    session.confirm();
    let start = session.mark();

    for (i, (sample, max_score)) in task.samples.iter().zip(maxima).enumerate() {
        if session.is_aborted() {
            break;
        }
        session.rewind(start)?;

        for round in 1..=max_turns {
            let (user, assistant) = practice_header(round, max_turns);
            session.inject(user, assistant);
            let mut practice = task.oracle.new_match(&sample.settings);
            if play(session, practice.as_mut()).await?.is_none() {
                break;
            }
        }

        let mut best: Option<f64> = None;
        let mut played = 0;
        let mut format_failures = 0;
        for current in 1..=attempts {
            if session.is_aborted() {
                break;
            }
            session.ask(evaluation_header(attempts, current)).await?;
            let mut scored = task.oracle.new_match(&sample.settings);
            let Some(result) = play(session, scored.as_mut()).await? else {
                break;
            };
            played += 1;
            format_failures += result.format_failures;
            obs::emit_answer_judged(played, result.score >= max_score);
            best = Some(best.map_or(result.score, |b| b.max(result.score)));
        }
        session.confirm();

        let Some(best) = best else {
            break;
        };
        let credit = credit(best, max_score);
        scores.record(TurnResult {
            label: format!("game {i}"),
            is_correct: credit >= 1.0,
            credit,
            observation: format!("best score {best} of {max_score}"),
            attempts_used: played,
            format_failures,
        });
    }
    Ok(())
}
