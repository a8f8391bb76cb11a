use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::EngineConfig;
use crate::fair_prob::{self, EstimatorInput, FairPrice, OutcomeProbs};
use crate::odds_normalize::{self, MarketMap, MarketQuote};
use crate::parlay::Leg;
use crate::pick_rankings::{self, Candidate};
use crate::team_form::{BaselineModel, HeadToHeadSummary, Meeting, RecentMatch, TeamFormSummary};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(deserialize_with = "id_text")]
    pub id: String,
    pub home: String,
    pub away: String,
    #[serde(default, deserialize_with = "lenient_kickoff")]
    pub kickoff: Option<DateTime<Utc>>,
    #[serde(default)]
    pub league: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselineRates {
    pub lambda_home: f64,
    pub lambda_away: f64,
}

/// Everything known about one fixture for a single request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureSnapshot {
    pub fixture: Fixture,
    #[serde(default)]
    pub home_recent: Vec<RecentMatch>,
    #[serde(default)]
    pub away_recent: Vec<RecentMatch>,
    #[serde(default)]
    pub h2h: Vec<Meeting>,
    #[serde(default)]
    pub baseline: Option<BaselineRates>,
    /// Raw provider listing; read leniently.
    #[serde(default)]
    pub bookmakers: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Slate {
    #[serde(default)]
    pub baseline_model: Option<BaselineModel>,
    /// Finished league results used to fit the baseline when no model is given.
    #[serde(default)]
    pub league_results: Vec<Meeting>,
    #[serde(default)]
    pub fixtures: Vec<FixtureSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FixtureReport {
    pub fixture: Fixture,
    pub lambda_home: f64,
    pub lambda_away: f64,
    pub expected_total: f64,
    pub markets: MarketMap,
    /// Margin-free 1X2 probabilities from the market quotes.
    #[serde(skip)]
    pub implied: Option<OutcomeProbs>,
    pub fair: Vec<FairPrice>,
    pub candidates: Vec<Candidate>,
}

impl FixtureReport {
    pub fn top_candidate(&self, require_price: bool) -> Option<&Candidate> {
        self.candidates
            .iter()
            .find(|c| !require_price || c.market_odd.is_some())
    }
}

pub fn parse_slate_json(raw: &str) -> Result<Slate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Slate::default());
    }
    serde_json::from_str(trimmed).context("invalid slate json")
}

pub fn load_slate(path: &Path) -> Result<Slate> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed reading slate {}", path.display()))?;
    parse_slate_json(&raw).with_context(|| format!("failed parsing slate {}", path.display()))
}

impl Slate {
    pub fn model(&self) -> BaselineModel {
        match self.baseline_model {
            Some(m) => m,
            None => BaselineModel::fit(&self.league_results),
        }
    }

    pub fn evaluate(&self, cfg: &EngineConfig, bookmaker: Option<&str>) -> Vec<FixtureReport> {
        let model = self.model();
        self.fixtures
            .iter()
            .map(|snap| evaluate_fixture(snap, &model, cfg, bookmaker))
            .collect()
    }
}

pub fn evaluate_fixture(
    snap: &FixtureSnapshot,
    model: &BaselineModel,
    cfg: &EngineConfig,
    bookmaker: Option<&str>,
) -> FixtureReport {
    let fixture = &snap.fixture;
    let home_form = TeamFormSummary::from_recent(&snap.home_recent, cfg.form_window);
    let away_form = TeamFormSummary::from_recent(&snap.away_recent, cfg.form_window);
    let h2h = HeadToHeadSummary::from_meetings(&snap.h2h);

    let (lambda_home, lambda_away) = snap
        .baseline
        .filter(|b| valid_rate(b.lambda_home) && valid_rate(b.lambda_away))
        .map(|b| (b.lambda_home, b.lambda_away))
        .unwrap_or_else(|| model.lambdas(home_form.as_ref(), away_form.as_ref()));

    let input = EstimatorInput {
        home_form,
        away_form,
        h2h,
        lambda_home,
        lambda_away,
    };
    let fair = fair_prob::estimate(&input, cfg);

    let books = odds_normalize::extract_bookmakers(&snap.bookmakers);
    let markets = odds_normalize::normalize_markets(
        &books,
        &fixture.home,
        &fixture.away,
        cfg.quote_policy,
        bookmaker,
    );
    let candidates = pick_rankings::rank_fixture(&fixture.id, &fair, &markets, &cfg.prob_bounds);

    debug!(
        fixture = %fixture.id,
        lambda_home,
        lambda_away,
        priced = markets.len(),
        candidates = candidates.len(),
        "fixture evaluated"
    );

    FixtureReport {
        fixture: fixture.clone(),
        lambda_home,
        lambda_away,
        expected_total: fair_prob::blend_total_goals(&input),
        implied: pick_rankings::implied_probs(&markets),
        markets,
        fair,
        candidates,
    }
}

/// Each fixture's best-ranked candidate as a parlay leg.
pub fn top_pick_legs(reports: &[FixtureReport], require_price: bool) -> Vec<Leg> {
    reports
        .iter()
        .filter_map(|r| r.top_candidate(require_price).map(|c| c.to_leg(&r.fixture)))
        .collect()
}

/// Every market quote as a leg. Legs carry the model probability when the pick survived ranking.
pub fn quote_legs(reports: &[FixtureReport]) -> Vec<Leg> {
    let mut out = Vec::new();
    for r in reports {
        for quote in r.markets.quotes(&r.fixture.id) {
            let prob = r
                .candidates
                .iter()
                .find(|c| c.pick == quote.pick)
                .map(|c| c.prob);
            out.push(quote_leg(&r.fixture, &quote, prob));
        }
    }
    out
}

fn quote_leg(fixture: &Fixture, quote: &MarketQuote, prob: Option<f64>) -> Leg {
    Leg {
        fixture_id: quote.fixture_id.clone(),
        home: fixture.home.clone(),
        away: fixture.away.clone(),
        pick: quote.pick,
        price: quote.price,
        start_time: fixture.kickoff,
        prob,
    }
}

fn valid_rate(v: f64) -> bool {
    v.is_finite() && v >= 0.0
}

pub fn parse_kickoff(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(ts) = trimmed.parse::<i64>() {
        return DateTime::from_timestamp(ts, 0);
    }
    None
}

fn lenient_kickoff<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
    let raw = Value::deserialize(d)?;
    Ok(match raw {
        Value::String(s) => parse_kickoff(&s),
        Value::Number(n) => n.as_i64().and_then(|ts| DateTime::from_timestamp(ts, 0)),
        _ => None,
    })
}

fn id_text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match Value::deserialize(d)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "fixture id must be a string or number, got {other}"
        ))),
    }
}
