use serde::Serialize;

use crate::config::EngineConfig;
use crate::markets::{GoalLine, Market, Pick};
use crate::team_form::{HeadToHeadSummary, TeamFormSummary};

const W_FORM: f64 = 0.45;
const W_H2H: f64 = 0.35;
const W_BASELINE: f64 = 0.20;

const TOTALS_MIN: f64 = 0.01;
const TOTALS_MAX: f64 = 0.99;

/// Open interval a model probability must fall in to become a pick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbBounds {
    pub min: f64,
    pub max: f64,
}

impl Default for ProbBounds {
    fn default() -> Self {
        Self {
            min: 0.01,
            max: 0.999,
        }
    }
}

impl ProbBounds {
    pub fn new(min: f64, max: f64) -> Option<Self> {
        if min.is_finite() && max.is_finite() && 0.0 <= min && min < max && max <= 1.0 {
            Some(Self { min, max })
        } else {
            None
        }
    }

    pub fn contains(&self, p: f64) -> bool {
        p.is_finite() && p > self.min && p < self.max
    }
}

#[derive(Debug, Clone, Default)]
pub struct EstimatorInput {
    pub home_form: Option<TeamFormSummary>,
    pub away_form: Option<TeamFormSummary>,
    pub h2h: Option<HeadToHeadSummary>,
    pub lambda_home: f64,
    pub lambda_away: f64,
}

impl EstimatorInput {
    pub fn lambda_total(&self) -> f64 {
        self.lambda_home.max(0.0) + self.lambda_away.max(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutcomeProbs {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

impl OutcomeProbs {
    pub fn uniform() -> Self {
        Self {
            home: 1.0 / 3.0,
            draw: 1.0 / 3.0,
            away: 1.0 / 3.0,
        }
    }

    pub fn home_or_draw(&self) -> f64 {
        self.home + self.draw
    }

    pub fn home_or_away(&self) -> f64 {
        self.home + self.away
    }

    pub fn draw_or_away(&self) -> f64 {
        self.draw + self.away
    }

    /// Probability of a match-winner or double-chance pick.
    pub fn pick_prob(&self, pick: Pick) -> Option<f64> {
        match pick {
            Pick::Home => Some(self.home),
            Pick::Draw => Some(self.draw),
            Pick::Away => Some(self.away),
            Pick::HomeOrDraw => Some(self.home_or_draw()),
            Pick::HomeOrAway => Some(self.home_or_away()),
            Pick::DrawOrAway => Some(self.draw_or_away()),
            _ => None,
        }
    }
}

/// Model price for one pick. `fair_odd` keeps full precision; round only for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FairPrice {
    #[serde(skip)]
    pub pick: Pick,
    pub market: Market,
    pub selection: String,
    pub label: String,
    pub prob: f64,
    pub fair_odd: f64,
}

impl FairPrice {
    pub fn new(pick: Pick, prob: f64) -> Self {
        Self {
            pick,
            market: pick.market(),
            selection: pick.selection(),
            label: pick.label(),
            prob,
            fair_odd: 1.0 / prob,
        }
    }

    pub fn display_odd(&self) -> f64 {
        round2(self.fair_odd)
    }
}

/// Expected total goals from form, head-to-head and the baseline rates.
pub fn blend_total_goals(input: &EstimatorInput) -> f64 {
    let baseline = input.lambda_total();

    let form_total = match (&input.home_form, &input.away_form) {
        (Some(h), Some(a)) => Some((h.total_goals_avg + a.total_goals_avg) / 2.0),
        (Some(f), None) | (None, Some(f)) => Some(f.total_goals_avg),
        (None, None) => None,
    }
    .filter(|v| v.is_finite());
    let h2h_total = input
        .h2h
        .as_ref()
        .map(|h| h.total_goals_avg)
        .filter(|v| v.is_finite());

    if form_total.is_none() && h2h_total.is_none() {
        return baseline;
    }

    let mut sum = W_BASELINE * baseline;
    let mut weight = W_BASELINE;
    if let Some(v) = form_total {
        sum += W_FORM * v;
        weight += W_FORM;
    }
    if let Some(v) = h2h_total {
        sum += W_H2H * v;
        weight += W_H2H;
    }
    sum / weight
}

/// Home/draw/away from independent Poisson goal counts, summed up to `max_goals` per side.
pub fn outcome_probs(lambda_home: f64, lambda_away: f64, max_goals: u32) -> OutcomeProbs {
    let pmf_h = poisson_pmf(lambda_home, max_goals);
    let pmf_a = poisson_pmf(lambda_away, max_goals);

    let mut p_home = 0.0;
    let mut p_draw = 0.0;
    let mut p_away = 0.0;

    for (i, p_i) in pmf_h.iter().enumerate() {
        for (j, p_j) in pmf_a.iter().enumerate() {
            let p = p_i * p_j;
            if i > j {
                p_home += p;
            } else if i < j {
                p_away += p;
            } else {
                p_draw += p;
            }
        }
    }

    // Guard against tiny float drift.
    let sum = p_home + p_draw + p_away;
    if sum > 0.0 {
        OutcomeProbs {
            home: p_home / sum,
            draw: p_draw / sum,
            away: p_away / sum,
        }
    } else {
        OutcomeProbs::uniform()
    }
}

/// P(total goals <= floor(line)) for a Poisson total with the given rate. Unclamped.
pub fn under_prob(line: GoalLine, expected_total: f64) -> f64 {
    let lambda = expected_total.max(0.0);
    let mut term = (-lambda).exp();
    let mut sum = term;
    for k in 1..=line.floor_goals() {
        term *= lambda / f64::from(k);
        sum += term;
    }
    sum.min(1.0)
}

/// (over, under) for one line, each clamped away from 0 and 1.
pub fn totals_probs(line: GoalLine, expected_total: f64) -> (f64, f64) {
    let under = under_prob(line, expected_total);
    let over = 1.0 - under;
    (
        over.clamp(TOTALS_MIN, TOTALS_MAX),
        under.clamp(TOTALS_MIN, TOTALS_MAX),
    )
}

/// P(at least one side blanks). Observed head-to-head rate wins over the Poisson estimate.
pub fn btts_no_prob(lambda_home: f64, lambda_away: f64, h2h: Option<&HeadToHeadSummary>) -> f64 {
    if let Some(h) = h2h.filter(|h| h.meetings > 0 && h.btts_rate.is_finite()) {
        return (1.0 - h.btts_rate).clamp(0.0, 1.0);
    }
    let zh = (-lambda_home.max(0.0)).exp();
    let za = (-lambda_away.max(0.0)).exp();
    zh + za - zh * za
}

/// Fair prices for the full catalog, in catalog order. Picks outside the configured
/// probability bounds are dropped.
pub fn estimate(input: &EstimatorInput, cfg: &EngineConfig) -> Vec<FairPrice> {
    let lh = input.lambda_home.max(0.0);
    let la = input.lambda_away.max(0.0);
    let outcomes = outcome_probs(lh, la, cfg.score_cutoff);
    let expected_total = blend_total_goals(input);
    let btts_no = btts_no_prob(lh, la, input.h2h.as_ref());

    let mut raw: Vec<(Pick, f64)> = vec![
        (Pick::Home, outcomes.home),
        (Pick::Draw, outcomes.draw),
        (Pick::Away, outcomes.away),
        (Pick::HomeOrDraw, outcomes.home_or_draw()),
        (Pick::HomeOrAway, outcomes.home_or_away()),
        (Pick::DrawOrAway, outcomes.draw_or_away()),
    ];
    for line in &cfg.goal_lines {
        let (over, under) = totals_probs(*line, expected_total);
        raw.push((Pick::Over(*line), over));
        raw.push((Pick::Under(*line), under));
    }
    raw.push((Pick::BttsYes, 1.0 - btts_no));
    raw.push((Pick::BttsNo, btts_no));

    raw.into_iter()
        .filter(|(_, p)| cfg.prob_bounds.contains(*p))
        .map(|(pick, p)| FairPrice::new(pick, p))
        .collect()
}

fn poisson_pmf(lambda: f64, max_k: u32) -> Vec<f64> {
    let max_k = max_k as usize;
    let mut out = vec![0.0; max_k + 1];
    let lambda = lambda.max(0.0);

    out[0] = (-lambda).exp();
    for k in 1..=max_k {
        out[k] = out[k - 1] * lambda / k as f64;
    }

    // Fold the tail into the last bucket.
    let sum: f64 = out.iter().sum();
    if sum < 1.0 {
        out[max_k] += 1.0 - sum;
    }
    out
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
