use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, TimeDelta, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::RequestError;
use crate::fair_prob::round2;
use crate::markets::Pick;

pub const MIN_LEG_PRICE: f64 = 1.01;

// Two combinations whose relative misses differ by less than this are tied on distance.
const DIFF_EPS: f64 = 1e-9;
const DEADLINE_CHECK_EVERY: u64 = 1024;

/// One priced selection in one fixture.
#[derive(Debug, Clone, PartialEq)]
pub struct Leg {
    pub fixture_id: String,
    pub home: String,
    pub away: String,
    pub pick: Pick,
    pub price: f64,
    pub start_time: Option<DateTime<Utc>>,
    /// Model probability, when the leg came from the ranker.
    pub prob: Option<f64>,
}

impl Leg {
    /// Market key and selection, as written in the response legs.
    pub fn selection_text(&self) -> String {
        format!("{} {}", self.pick.market(), self.pick.selection())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ParlayRequest {
    #[serde(default)]
    pub bookmaker: Option<String>,
    pub target: f64,
    #[serde(alias = "tol")]
    pub tolerance: f64,
    #[serde(alias = "minLegs")]
    pub min_legs: usize,
    #[serde(alias = "maxLegs")]
    pub max_legs: usize,
    #[serde(default, alias = "minPrice")]
    pub min_price: Option<f64>,
    #[serde(default, alias = "maxPrice")]
    pub max_price: Option<f64>,
    #[serde(default, alias = "kickoffFrom")]
    pub kickoff_from: Option<DateTime<Utc>>,
    #[serde(default, alias = "kickoffUntil")]
    pub kickoff_until: Option<DateTime<Utc>>,
}

impl ParlayRequest {
    pub fn new(target: f64, tolerance: f64, min_legs: usize, max_legs: usize) -> Self {
        Self {
            bookmaker: None,
            target,
            tolerance,
            min_legs,
            max_legs,
            min_price: None,
            max_price: None,
            kickoff_from: None,
            kickoff_until: None,
        }
    }

    /// Limit kickoffs to `[now, now + hours]`.
    pub fn set_horizon(&mut self, now: DateTime<Utc>, hours: f64) -> Result<(), RequestError> {
        let secs = hours * 3600.0;
        if !secs.is_finite() || secs < 0.0 || secs >= i64::MAX as f64 {
            return Err(RequestError::InvalidHorizon);
        }
        let until = TimeDelta::try_seconds(secs as i64)
            .and_then(|span| now.checked_add_signed(span))
            .ok_or(RequestError::InvalidHorizon)?;
        self.kickoff_from = Some(now);
        self.kickoff_until = Some(until);
        Ok(())
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        if !self.target.is_finite() || self.target <= 1.0 {
            return Err(RequestError::TargetTooLow {
                target: self.target,
            });
        }
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 || self.tolerance >= 1.0 {
            return Err(RequestError::ToleranceOutOfRange {
                tolerance: self.tolerance,
            });
        }
        if self.min_legs == 0 {
            return Err(RequestError::ZeroMinLegs);
        }
        if self.max_legs < self.min_legs {
            return Err(RequestError::LegBoundsInverted {
                min_legs: self.min_legs,
                max_legs: self.max_legs,
            });
        }
        let bad_bound = |v: Option<f64>| v.is_some_and(|p| !p.is_finite() || p <= 0.0);
        let inverted = matches!((self.min_price, self.max_price), (Some(lo), Some(hi)) if lo > hi);
        if bad_bound(self.min_price) || bad_bound(self.max_price) || inverted {
            return Err(RequestError::InvalidPriceRange {
                min: self.min_price,
                max: self.max_price,
            });
        }
        if let (Some(from), Some(until)) = (self.kickoff_from, self.kickoff_until)
            && until < from
        {
            return Err(RequestError::InvalidHorizon);
        }
        Ok(())
    }

    fn admits(&self, leg: &Leg) -> bool {
        if !leg.price.is_finite() || leg.price < MIN_LEG_PRICE {
            return false;
        }
        if self.min_price.is_some_and(|lo| leg.price < lo) {
            return false;
        }
        if self.max_price.is_some_and(|hi| leg.price > hi) {
            return false;
        }
        if self.kickoff_from.is_none() && self.kickoff_until.is_none() {
            return true;
        }
        // A horizon can only be checked against a known kickoff.
        let Some(start) = leg.start_time else {
            return false;
        };
        self.kickoff_from.is_none_or(|from| start >= from)
            && self.kickoff_until.is_none_or(|until| start <= until)
    }
}

/// Eligible legs, at most one per fixture, sorted by ascending price.
#[derive(Debug, Clone, Default)]
pub struct LegPool {
    legs: Vec<Leg>,
}

impl LegPool {
    pub fn build(legs: impl IntoIterator<Item = Leg>, request: &ParlayRequest) -> Self {
        let mut per_fixture: HashMap<String, Leg> = HashMap::new();
        for leg in legs.into_iter().filter(|l| request.admits(l)) {
            match per_fixture.get(&leg.fixture_id) {
                Some(kept) if preference_cmp(kept, &leg) != Ordering::Greater => {}
                _ => {
                    per_fixture.insert(leg.fixture_id.clone(), leg);
                }
            }
        }
        let mut legs: Vec<Leg> = per_fixture.into_values().collect();
        legs.sort_by(|a, b| {
            a.price
                .total_cmp(&b.price)
                .then_with(|| a.fixture_id.cmp(&b.fixture_id))
                .then_with(|| a.pick.cmp(&b.pick))
        });
        Self { legs }
    }

    pub fn legs(&self) -> &[Leg] {
        &self.legs
    }

    pub fn len(&self) -> usize {
        self.legs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }
}

// Less = preferred when two legs compete for the same fixture.
fn preference_cmp(a: &Leg, b: &Leg) -> Ordering {
    let pa = a.prob.unwrap_or(f64::NEG_INFINITY);
    let pb = b.prob.unwrap_or(f64::NEG_INFINITY);
    pb.total_cmp(&pa)
        .then_with(|| a.price.total_cmp(&b.price))
        .then_with(|| a.pick.cmp(&b.pick))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SearchOptions {
    /// Search each leg count on its own rayon task.
    pub parallel: bool,
    /// Node budget per search task.
    pub max_nodes: Option<u64>,
    pub deadline: Option<Instant>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParlayResult {
    pub found: bool,
    pub target: f64,
    pub product: Option<f64>,
    /// (product / target - 1) * 100, two decimals.
    pub diff_percent: Option<f64>,
    pub legs: Vec<Leg>,
    pub nodes: u64,
    pub truncated: bool,
}

impl ParlayResult {
    fn empty(target: f64) -> Self {
        Self {
            found: false,
            target,
            product: None,
            diff_percent: None,
            legs: Vec::new(),
            nodes: 0,
            truncated: false,
        }
    }

    pub fn response(&self) -> ParlayResponse {
        let result = match (self.product, self.diff_percent) {
            (Some(product), Some(diff_percent)) if !self.legs.is_empty() => Some(ParlayBody {
                product,
                diff_percent,
                legs: self.legs.iter().map(LegRow::from).collect(),
            }),
            _ => None,
        };
        ParlayResponse {
            found: self.found,
            target: self.target,
            result,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ParlayResponse {
    pub found: bool,
    pub target: f64,
    pub result: Option<ParlayBody>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParlayBody {
    pub product: f64,
    pub diff_percent: f64,
    pub legs: Vec<LegRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LegRow {
    pub match_id: String,
    pub home: String,
    pub away: String,
    pub market: String,
    pub selection: String,
    pub price: f64,
    pub start_time: Option<String>,
}

impl From<&Leg> for LegRow {
    fn from(leg: &Leg) -> Self {
        Self {
            match_id: leg.fixture_id.clone(),
            home: leg.home.clone(),
            away: leg.away.clone(),
            market: leg.pick.market().key(),
            selection: leg.pick.selection(),
            price: leg.price,
            start_time: leg.start_time.map(|t| t.to_rfc3339()),
        }
    }
}

/// Find the leg subset whose price product lands closest to the target.
///
/// Ordering among candidates: smallest |product/target - 1|, then fewer legs, then higher
/// mean leg probability, then earliest pool positions. When nothing lands inside the
/// tolerance band the closest combination is still returned with `found = false`.
pub fn compose(
    pool: &LegPool,
    request: &ParlayRequest,
    options: &SearchOptions,
) -> Result<ParlayResult, RequestError> {
    request.validate()?;

    if pool.len() < request.min_legs {
        debug!(
            pool = pool.len(),
            min_legs = request.min_legs,
            "leg pool too small for request"
        );
        return Ok(ParlayResult::empty(request.target));
    }

    let prices: Vec<f64> = pool.legs.iter().map(|l| l.price).collect();
    let probs: Vec<f64> = pool.legs.iter().map(|l| l.prob.unwrap_or(0.0)).collect();
    let max_legs = request.max_legs.min(pool.len());
    let min_legs = request.min_legs;

    let outcomes: Vec<BandOutcome> = if options.parallel && max_legs > min_legs {
        (min_legs..=max_legs)
            .into_par_iter()
            .map(|k| Search::new(&prices, &probs, request.target, k, k, options).run())
            .collect()
    } else {
        vec![Search::new(&prices, &probs, request.target, min_legs, max_legs, options).run()]
    };

    let nodes = outcomes.iter().map(|o| o.nodes).sum();
    let truncated = outcomes.iter().any(|o| o.truncated);
    let best = outcomes
        .into_iter()
        .filter_map(|o| o.best)
        .min_by(rank_cmp);

    if truncated {
        warn!(nodes, "parlay search truncated, returning best so far");
    }

    let Some(best) = best else {
        return Ok(ParlayResult {
            nodes,
            truncated,
            ..ParlayResult::empty(request.target)
        });
    };

    let found = best.abs_diff <= request.tolerance + DIFF_EPS;
    debug!(
        nodes,
        found,
        legs = best.indices.len(),
        product = best.product,
        "parlay search finished"
    );

    Ok(ParlayResult {
        found,
        target: request.target,
        product: Some(best.product),
        diff_percent: Some(round2((best.product / request.target - 1.0) * 100.0)),
        legs: best.indices.iter().map(|i| pool.legs[*i].clone()).collect(),
        nodes,
        truncated,
    })
}

#[derive(Debug, Clone)]
struct Combo {
    indices: Vec<usize>,
    product: f64,
    abs_diff: f64,
    prob_mean: f64,
}

fn rank_cmp(a: &Combo, b: &Combo) -> Ordering {
    let by_diff = if (a.abs_diff - b.abs_diff).abs() <= DIFF_EPS {
        Ordering::Equal
    } else {
        a.abs_diff.total_cmp(&b.abs_diff)
    };
    by_diff
        .then_with(|| a.indices.len().cmp(&b.indices.len()))
        .then_with(|| b.prob_mean.total_cmp(&a.prob_mean))
        .then_with(|| a.indices.cmp(&b.indices))
}

struct BandOutcome {
    best: Option<Combo>,
    nodes: u64,
    truncated: bool,
}

struct Search<'a> {
    prices: &'a [f64],
    probs: &'a [f64],
    target: f64,
    min_legs: usize,
    max_legs: usize,
    max_nodes: Option<u64>,
    deadline: Option<Instant>,
    nodes: u64,
    truncated: bool,
    stack: Vec<usize>,
    best: Option<Combo>,
}

impl<'a> Search<'a> {
    fn new(
        prices: &'a [f64],
        probs: &'a [f64],
        target: f64,
        min_legs: usize,
        max_legs: usize,
        options: &SearchOptions,
    ) -> Self {
        Self {
            prices,
            probs,
            target,
            min_legs,
            max_legs,
            max_nodes: options.max_nodes,
            deadline: options.deadline,
            nodes: 0,
            truncated: false,
            stack: Vec::with_capacity(max_legs),
            best: None,
        }
    }

    fn run(mut self) -> BandOutcome {
        self.descend(0, 1.0);
        BandOutcome {
            best: self.best,
            nodes: self.nodes,
            truncated: self.truncated,
        }
    }

    fn out_of_budget(&mut self) -> bool {
        if self.truncated {
            return true;
        }
        self.nodes += 1;
        if self.max_nodes.is_some_and(|m| self.nodes > m) {
            self.truncated = true;
        } else if self.nodes % DEADLINE_CHECK_EVERY == 0
            && self.deadline.is_some_and(|d| Instant::now() >= d)
        {
            self.truncated = true;
        }
        self.truncated
    }

    fn descend(&mut self, start: usize, product: f64) {
        if self.out_of_budget() {
            return;
        }

        let picked = self.stack.len();
        if picked >= self.min_legs {
            self.offer(product);
        }
        if picked == self.max_legs {
            return;
        }

        let n = self.prices.len();
        let need = self.min_legs.saturating_sub(picked).max(1);
        let room = self.max_legs - picked;
        if n - start < need || self.cannot_improve(start, picked, product, need, room) {
            return;
        }

        for j in start..n {
            if n - j < need {
                break;
            }
            // Prices ascend, so once the cheapest completion from `j` overshoots past the
            // best miss, every later `j` overshoots further.
            let cheapest = product * self.prices[j..j + need].iter().product::<f64>();
            if cheapest > self.target && self.overshoot_is_hopeless(cheapest, picked + need) {
                break;
            }
            self.stack.push(j);
            self.descend(j + 1, product * self.prices[j]);
            self.stack.pop();
            if self.truncated {
                return;
            }
        }
    }

    fn offer(&mut self, product: f64) {
        if self.stack.is_empty() {
            return;
        }
        let abs_diff = (product / self.target - 1.0).abs();
        if let Some(best) = &self.best
            && abs_diff > best.abs_diff + DIFF_EPS
        {
            return;
        }
        let prob_mean =
            self.stack.iter().map(|i| self.probs[*i]).sum::<f64>() / self.stack.len() as f64;
        let combo = Combo {
            indices: self.stack.clone(),
            product,
            abs_diff,
            prob_mean,
        };
        if self
            .best
            .as_ref()
            .is_none_or(|best| rank_cmp(&combo, best) == Ordering::Less)
        {
            self.best = Some(combo);
        }
    }

    /// True when no completion of the current prefix can beat the best combination.
    fn cannot_improve(
        &self,
        start: usize,
        picked: usize,
        product: f64,
        need: usize,
        room: usize,
    ) -> bool {
        let Some(best) = &self.best else {
            return false;
        };
        let n = self.prices.len();
        let lo = product * self.prices[start..start + need].iter().product::<f64>();
        let take = room.min(n - start);
        let hi = product * self.prices[n - take..].iter().product::<f64>();

        let bound = if lo > self.target {
            lo / self.target - 1.0
        } else if hi < self.target {
            1.0 - hi / self.target
        } else {
            0.0
        };
        if bound > best.abs_diff + DIFF_EPS {
            return true;
        }
        // Every completion is at best tied on distance and uses more legs.
        bound >= best.abs_diff - DIFF_EPS && picked + need > best.indices.len()
    }

    fn overshoot_is_hopeless(&self, cheapest: f64, legs: usize) -> bool {
        let Some(best) = &self.best else {
            return false;
        };
        let miss = cheapest / self.target - 1.0;
        miss > best.abs_diff + DIFF_EPS
            || (miss >= best.abs_diff - DIFF_EPS && legs > best.indices.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leg(id: &str, price: f64) -> Leg {
        Leg {
            fixture_id: id.to_string(),
            home: format!("{id}-H"),
            away: format!("{id}-A"),
            pick: Pick::Home,
            price,
            start_time: None,
            prob: None,
        }
    }

    fn pool_of(prices: &[f64]) -> LegPool {
        let legs = prices
            .iter()
            .enumerate()
            .map(|(i, p)| leg(&format!("F{i}"), *p));
        LegPool::build(legs, &ParlayRequest::new(2.0, 0.1, 1, 1))
    }

    #[test]
    fn validation_rejects_bad_bounds() {
        assert!(matches!(
            ParlayRequest::new(1.0, 0.1, 1, 2).validate(),
            Err(RequestError::TargetTooLow { .. })
        ));
        assert!(matches!(
            ParlayRequest::new(5.0, 0.0, 1, 2).validate(),
            Err(RequestError::ToleranceOutOfRange { .. })
        ));
        assert_eq!(
            ParlayRequest::new(5.0, 0.1, 0, 2).validate(),
            Err(RequestError::ZeroMinLegs)
        );
        assert_eq!(
            ParlayRequest::new(5.0, 0.1, 3, 2).validate(),
            Err(RequestError::LegBoundsInverted {
                min_legs: 3,
                max_legs: 2
            })
        );
        let mut r = ParlayRequest::new(5.0, 0.1, 1, 2);
        r.min_price = Some(3.0);
        r.max_price = Some(2.0);
        assert!(matches!(
            r.validate(),
            Err(RequestError::InvalidPriceRange { .. })
        ));
    }

    #[test]
    fn validation_rejects_open_ended_and_degenerate_inputs() {
        for target in [f64::NAN, f64::INFINITY] {
            assert!(matches!(
                ParlayRequest::new(target, 0.1, 1, 2).validate(),
                Err(RequestError::TargetTooLow { .. })
            ));
        }
        for tolerance in [1.0, 1.5] {
            assert!(matches!(
                ParlayRequest::new(5.0, tolerance, 1, 2).validate(),
                Err(RequestError::ToleranceOutOfRange { .. })
            ));
        }
        for min_price in [0.0, -1.5] {
            let mut r = ParlayRequest::new(5.0, 0.1, 1, 2);
            r.min_price = Some(min_price);
            assert!(matches!(
                r.validate(),
                Err(RequestError::InvalidPriceRange { .. })
            ));
        }

        let now = Utc::now();
        let mut r = ParlayRequest::new(5.0, 0.1, 1, 2);
        r.kickoff_from = Some(now);
        r.kickoff_until = Some(now - TimeDelta::hours(1));
        assert_eq!(r.validate(), Err(RequestError::InvalidHorizon));
    }

    #[test]
    fn horizon_out_of_range_is_an_error() {
        let now = Utc::now();
        let mut r = ParlayRequest::new(5.0, 0.1, 1, 2);
        for hours in [1e15, f64::INFINITY, f64::NAN, -2.0] {
            assert_eq!(r.set_horizon(now, hours), Err(RequestError::InvalidHorizon), "{hours}");
        }
        // Fits in i64 seconds but lands past the last representable date.
        assert_eq!(r.set_horizon(now, 1e12), Err(RequestError::InvalidHorizon));
        assert!(r.kickoff_from.is_none());

        r.set_horizon(now, 36.0).unwrap();
        assert_eq!(r.kickoff_from, Some(now));
        assert_eq!(r.kickoff_until, Some(now + TimeDelta::hours(36)));
        assert!(r.validate().is_ok());
    }

    #[test]
    fn leg_text_matches_response_row() {
        let mut l = leg("A", 1.9);
        l.pick = Pick::HomeOrDraw;
        let row = LegRow::from(&l);
        assert_eq!(l.selection_text(), format!("{} {}", row.market, row.selection));
        assert_eq!(l.selection_text(), "double_chance 1X");
    }

    #[test]
    fn pool_keeps_one_leg_per_fixture() {
        let mut a = leg("A", 1.8);
        a.prob = Some(0.55);
        let mut a2 = leg("A", 1.5);
        a2.pick = Pick::HomeOrDraw;
        a2.prob = Some(0.70);
        let cheap = leg("B", 1.0);
        let pool = LegPool::build(vec![a, a2, cheap], &ParlayRequest::new(2.0, 0.1, 1, 2));
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.legs()[0].pick, Pick::HomeOrDraw);
    }

    #[test]
    fn exact_hit_uses_all_four_legs() {
        let pool = pool_of(&[2.0, 2.0, 2.0, 2.0]);
        let req = ParlayRequest::new(16.0, 0.05, 2, 4);
        let out = compose(&pool, &req, &SearchOptions::default()).unwrap();
        assert!(out.found);
        assert_eq!(out.legs.len(), 4);
        assert_eq!(out.product, Some(16.0));
        assert_eq!(out.diff_percent, Some(0.0));
    }

    #[test]
    fn miss_returns_closest_alternative() {
        let pool = pool_of(&[2.0, 2.0, 2.0, 2.0]);
        let req = ParlayRequest::new(10.0, 0.10, 2, 3);
        let out = compose(&pool, &req, &SearchOptions::default()).unwrap();
        assert!(!out.found);
        assert_eq!(out.legs.len(), 3);
        assert_eq!(out.product, Some(8.0));
        assert_eq!(out.diff_percent, Some(-20.0));
    }

    #[test]
    fn fewer_legs_win_on_equal_distance() {
        let pool = pool_of(&[2.0, 2.0, 4.0]);
        let req = ParlayRequest::new(4.0, 0.2, 1, 3);
        let out = compose(&pool, &req, &SearchOptions::default()).unwrap();
        assert!(out.found);
        assert_eq!(out.legs.len(), 1);
        assert_eq!(out.legs[0].price, 4.0);
    }

    #[test]
    fn higher_confidence_breaks_full_ties() {
        let mut a = leg("A", 2.0);
        a.prob = Some(0.40);
        let mut b = leg("B", 2.0);
        b.prob = Some(0.48);
        let pool = LegPool::build(vec![a, b], &ParlayRequest::new(2.0, 0.1, 1, 1));
        let out = compose(&pool, &ParlayRequest::new(2.0, 0.1, 1, 1), &SearchOptions::default())
            .unwrap();
        assert_eq!(out.legs[0].fixture_id, "B");
    }

    #[test]
    fn small_pool_is_not_found() {
        let pool = pool_of(&[2.0]);
        let out = compose(&pool, &ParlayRequest::new(4.0, 0.1, 2, 3), &SearchOptions::default())
            .unwrap();
        assert!(!out.found);
        assert!(out.legs.is_empty());
        assert!(out.product.is_none());
        assert!(out.response().result.is_none());
    }

    #[test]
    fn node_budget_truncates_without_error() {
        let prices: Vec<f64> = (0..24).map(|i| 1.1 + i as f64 * 0.07).collect();
        let pool = pool_of(&prices);
        let opts = SearchOptions {
            max_nodes: Some(50),
            ..SearchOptions::default()
        };
        let out = compose(&pool, &ParlayRequest::new(1000.0, 0.01, 3, 12), &opts).unwrap();
        assert!(out.truncated);
        assert!(!out.legs.is_empty());
    }
}
