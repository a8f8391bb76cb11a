use std::cmp::Ordering;

use serde::Serialize;

use crate::fair_prob::{FairPrice, OutcomeProbs, ProbBounds};
use crate::markets::{Market, Pick};
use crate::odds_normalize::MarketMap;
use crate::parlay::Leg;
use crate::slate::Fixture;

/// A model pick merged with the market price, if any.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub fixture_id: String,
    pub market: Market,
    #[serde(skip)]
    pub pick: Pick,
    pub selection: String,
    pub label: String,
    pub prob: f64,
    pub fair_odd: f64,
    pub market_odd: Option<f64>,
    pub used_odd: f64,
    /// market / fair - 1, only when a market price exists.
    pub value_edge: Option<f64>,
}

impl Candidate {
    /// `None` when the probability falls outside the bounds.
    pub fn new(
        fixture_id: &str,
        fair: &FairPrice,
        market_odd: Option<f64>,
        bounds: &ProbBounds,
    ) -> Option<Self> {
        if !bounds.contains(fair.prob) {
            return None;
        }
        let market_odd = market_odd.filter(|p| p.is_finite() && *p > 0.0);
        Some(Self {
            fixture_id: fixture_id.to_string(),
            market: fair.market,
            pick: fair.pick,
            selection: fair.selection.clone(),
            label: fair.label.clone(),
            prob: fair.prob,
            fair_odd: fair.fair_odd,
            market_odd,
            used_odd: market_odd.unwrap_or(fair.fair_odd),
            value_edge: market_odd.map(|m| m / fair.fair_odd - 1.0),
        })
    }

    pub fn to_leg(&self, fixture: &Fixture) -> Leg {
        Leg {
            fixture_id: fixture.id.clone(),
            home: fixture.home.clone(),
            away: fixture.away.clone(),
            pick: self.pick,
            price: self.used_odd,
            start_time: fixture.kickoff,
            prob: Some(self.prob),
        }
    }
}

/// Highest probability first; cheaper price breaks ties.
pub fn candidate_cmp(a: &Candidate, b: &Candidate) -> Ordering {
    b.prob
        .total_cmp(&a.prob)
        .then_with(|| a.used_odd.total_cmp(&b.used_odd))
        .then_with(|| a.pick.cmp(&b.pick))
        .then_with(|| a.fixture_id.cmp(&b.fixture_id))
}

pub fn rank_fixture(
    fixture_id: &str,
    fair: &[FairPrice],
    markets: &MarketMap,
    bounds: &ProbBounds,
) -> Vec<Candidate> {
    let mut out: Vec<Candidate> = fair
        .iter()
        .filter_map(|f| Candidate::new(fixture_id, f, markets.price(f.pick), bounds))
        .collect();
    out.sort_by(candidate_cmp);
    out
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RankOptions {
    /// Keep only priced candidates whose edge reaches this value.
    pub min_value_edge: Option<f64>,
    pub top: Option<usize>,
}

/// Merge per-fixture rankings into one slate-wide ordering.
pub fn rank_slate(per_fixture: Vec<Vec<Candidate>>, opts: RankOptions) -> Vec<Candidate> {
    let mut all: Vec<Candidate> = per_fixture
        .into_iter()
        .flatten()
        .filter(|c| match opts.min_value_edge {
            Some(min) => c.value_edge.is_some_and(|e| e >= min),
            None => true,
        })
        .collect();
    all.sort_by(candidate_cmp);
    if let Some(top) = opts.top {
        all.truncate(top);
    }
    all
}

/// Margin-free 1X2 probabilities implied by the market, when all three prices exist.
pub fn implied_probs(markets: &MarketMap) -> Option<OutcomeProbs> {
    let home = markets.price(Pick::Home)?;
    let draw = markets.price(Pick::Draw)?;
    let away = markets.price(Pick::Away)?;
    if home <= 1.0 || draw <= 1.0 || away <= 1.0 {
        return None;
    }
    let ih = 1.0 / home;
    let id = 1.0 / draw;
    let ia = 1.0 / away;
    let sum = ih + id + ia;
    Some(OutcomeProbs {
        home: ih / sum,
        draw: id / sum,
        away: ia / sum,
    })
}
