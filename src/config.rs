use std::env;
use std::time::{Duration, Instant};

use crate::fair_prob::ProbBounds;
use crate::markets::GoalLine;
use crate::odds_normalize::QuotePolicy;
use crate::parlay::SearchOptions;

const DEFAULT_FORM_WINDOW: usize = 8;
const DEFAULT_SCORE_CUTOFF: u32 = 10;
const DEFAULT_GOAL_LINES: &[u8] = &[15, 25, 35];
const DEFAULT_MAX_NODES: u64 = 2_000_000;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub prob_bounds: ProbBounds,
    pub min_value_edge: Option<f64>,
    pub quote_policy: QuotePolicy,
    pub form_window: usize,
    pub score_cutoff: u32,
    pub goal_lines: Vec<GoalLine>,
    pub parlay_parallel: bool,
    pub parlay_max_nodes: Option<u64>,
    pub parlay_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            prob_bounds: ProbBounds::default(),
            min_value_edge: None,
            quote_policy: QuotePolicy::FirstUsable,
            form_window: DEFAULT_FORM_WINDOW,
            score_cutoff: DEFAULT_SCORE_CUTOFF,
            goal_lines: default_goal_lines(),
            parlay_parallel: false,
            parlay_max_nodes: Some(DEFAULT_MAX_NODES),
            parlay_timeout: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let min_prob = env_f64("PICKS_MIN_PROB")
            .unwrap_or(defaults.prob_bounds.min)
            .clamp(0.0, 0.5);
        let max_prob = env_f64("PICKS_MAX_PROB")
            .unwrap_or(defaults.prob_bounds.max)
            .clamp(0.5, 1.0);

        let quote_policy = env::var("MARKET_POLICY")
            .ok()
            .and_then(|v| QuotePolicy::parse(&v))
            .unwrap_or(defaults.quote_policy);

        let goal_lines = env::var("GOAL_LINES")
            .ok()
            .map(|raw| parse_goal_lines(&raw))
            .filter(|lines| !lines.is_empty())
            .unwrap_or(defaults.goal_lines);

        let parlay_max_nodes = match env::var("PARLAY_MAX_NODES").ok() {
            Some(raw) => raw.trim().parse::<u64>().ok().filter(|n| *n > 0),
            None => defaults.parlay_max_nodes,
        };

        Self {
            prob_bounds: ProbBounds::new(min_prob, max_prob).unwrap_or_default(),
            min_value_edge: env_f64("PICKS_MIN_EDGE"),
            quote_policy,
            form_window: env::var("FORM_WINDOW")
                .ok()
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(DEFAULT_FORM_WINDOW)
                .clamp(1, 20),
            score_cutoff: env::var("SCORE_CUTOFF")
                .ok()
                .and_then(|v| v.trim().parse::<u32>().ok())
                .unwrap_or(DEFAULT_SCORE_CUTOFF)
                .clamp(6, 20),
            goal_lines,
            parlay_parallel: env_bool("PARLAY_PARALLEL", false),
            parlay_max_nodes,
            parlay_timeout: env::var("PARLAY_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
        }
    }

    /// Search options for one request; the deadline starts now.
    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            parallel: self.parlay_parallel,
            max_nodes: self.parlay_max_nodes,
            deadline: self.parlay_timeout.map(|t| Instant::now() + t),
        }
    }
}

fn default_goal_lines() -> Vec<GoalLine> {
    DEFAULT_GOAL_LINES
        .iter()
        .filter_map(|t| GoalLine::from_tenths(*t))
        .collect()
}

pub fn parse_goal_lines(raw: &str) -> Vec<GoalLine> {
    let mut lines: Vec<GoalLine> = raw.split(',').filter_map(GoalLine::parse).collect();
    lines.sort();
    lines.dedup();
    lines
}

fn env_f64(key: &str) -> Option<f64> {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| {
            let t = v.trim().to_ascii_lowercase();
            !(t.is_empty() || t == "0" || t == "false" || t == "off" || t == "no")
        })
        .unwrap_or(default)
}
