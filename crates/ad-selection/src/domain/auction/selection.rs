use crate::domain::scoring::ScoredOutcome;

/// Positions of the winner and of the best other scored outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ranking {
    pub winner: usize,
    /// Highest scoring outcome besides the winner, if any scored above zero.
    pub runner_up: Option<usize>,
}

/// Picks the outcome with the highest positive score. Of equal scores the
/// earliest outcome wins. `None` when nothing scored above zero.
pub fn rank(scored: &[ScoredOutcome]) -> Option<Ranking> {
    let winner = best(scored, None)?;
    Some(Ranking {
        winner,
        runner_up: best(scored, Some(winner)),
    })
}

fn best(scored: &[ScoredOutcome], skip: Option<usize>) -> Option<usize> {
    scored
        .iter()
        .enumerate()
        .filter(|(i, outcome)| Some(*i) != skip && outcome.score > 0.0)
        .fold(None, |best: Option<(usize, f64)>, (i, outcome)| match best {
            Some((_, score)) if score >= outcome.score => best,
            _ => Some((i, outcome.score)),
        })
        .map(|(i, _)| i)
}
