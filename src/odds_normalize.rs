use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use crate::markets::{self, Market, Pick};

/// How quotes from several bookmakers are folded into one market map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuotePolicy {
    /// The first bookmaker that yields any usable market wins; later ones are ignored.
    #[default]
    FirstUsable,
    /// Highest price per pick across bookmakers.
    BestPrice,
    /// Mean price per pick across the bookmakers that quote it.
    Consensus,
}

impl QuotePolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "first" | "first_usable" | "first-match" | "first_match" => Some(Self::FirstUsable),
            "best" | "best_price" | "best-price" => Some(Self::BestPrice),
            "consensus" | "average" | "mean" => Some(Self::Consensus),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawBookmaker {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub bets: Vec<RawBet>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawBet {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub values: Vec<RawValue>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawValue {
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub odd: Value,
}

impl RawBookmaker {
    fn matches_filter(&self, wanted: &str) -> bool {
        let wanted = wanted.trim();
        if wanted.is_empty() {
            return true;
        }
        if self.name.trim().eq_ignore_ascii_case(wanted) {
            return true;
        }
        match &self.id {
            Some(Value::Number(n)) => n.to_string() == wanted,
            Some(Value::String(s)) => s.trim().eq_ignore_ascii_case(wanted),
            _ => false,
        }
    }
}

/// A single priced outcome from one bookmaker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketQuote {
    pub fixture_id: String,
    pub market: Market,
    pub pick: Pick,
    pub price: f64,
}

impl MarketQuote {
    pub fn new(fixture_id: &str, pick: Pick, price: f64) -> Option<Self> {
        if !price.is_finite() || price <= 0.0 {
            return None;
        }
        Some(Self {
            fixture_id: fixture_id.to_string(),
            market: pick.market(),
            pick,
            price,
        })
    }
}

/// Canonical `{pick -> price}` map for one fixture.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketMap {
    prices: BTreeMap<Pick, f64>,
}

impl MarketMap {
    pub fn price(&self, pick: Pick) -> Option<f64> {
        self.prices.get(&pick).copied()
    }

    pub fn insert(&mut self, pick: Pick, price: f64) -> bool {
        if !price.is_finite() || price <= 0.0 {
            return false;
        }
        self.prices.insert(pick, price);
        true
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Pick, f64)> + '_ {
        self.prices.iter().map(|(p, v)| (*p, *v))
    }

    pub fn quotes(&self, fixture_id: &str) -> Vec<MarketQuote> {
        self.iter()
            .filter_map(|(pick, price)| MarketQuote::new(fixture_id, pick, price))
            .collect()
    }
}

/// Pull bookmaker entries out of a provider payload. Accepts a bare bookmaker array,
/// `{ "bookmakers": [...] }`, or `{ "response": [{ "bookmakers": [...] }] }`.
pub fn extract_bookmakers(payload: &Value) -> Vec<RawBookmaker> {
    let list = match payload {
        Value::Array(items) if items.iter().any(|i| i.get("bets").is_some()) => Some(items),
        Value::Array(items) => items.first().and_then(|i| i.get("bookmakers")?.as_array()),
        Value::Object(_) => payload
            .get("bookmakers")
            .and_then(|b| b.as_array())
            .or_else(|| {
                payload
                    .get("response")?
                    .as_array()?
                    .first()?
                    .get("bookmakers")?
                    .as_array()
            }),
        _ => None,
    };
    let Some(list) = list else {
        return Vec::new();
    };
    list.iter()
        .filter_map(|item| serde_json::from_value::<RawBookmaker>(item.clone()).ok())
        .collect()
}

pub fn parse_bookmakers_json(raw: &str) -> Vec<RawBookmaker> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Vec::new();
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(v) => extract_bookmakers(&v),
        Err(err) => {
            debug!(%err, "malformed bookmaker payload, treating as empty");
            Vec::new()
        }
    }
}

/// Normalize one fixture's bookmaker listing into a market map. Never fails: absent or
/// malformed data just produces an empty map.
pub fn normalize_markets(
    bookmakers: &[RawBookmaker],
    home: &str,
    away: &str,
    policy: QuotePolicy,
    bookmaker_filter: Option<&str>,
) -> MarketMap {
    let per_book = bookmakers
        .iter()
        .filter(|b| bookmaker_filter.is_none_or(|f| b.matches_filter(f)))
        .map(|b| bookmaker_prices(b, home, away))
        .filter(|m| !m.is_empty());

    let mut out = MarketMap::default();
    match policy {
        QuotePolicy::FirstUsable => {
            if let Some(first) = per_book.into_iter().next() {
                out.prices = first;
            }
        }
        QuotePolicy::BestPrice => {
            for book in per_book {
                for (pick, price) in book {
                    let slot = out.prices.entry(pick).or_insert(price);
                    if price > *slot {
                        *slot = price;
                    }
                }
            }
        }
        QuotePolicy::Consensus => {
            let mut sums: BTreeMap<Pick, (f64, usize)> = BTreeMap::new();
            for book in per_book {
                for (pick, price) in book {
                    let e = sums.entry(pick).or_insert((0.0, 0));
                    e.0 += price;
                    e.1 += 1;
                }
            }
            for (pick, (sum, n)) in sums {
                out.insert(pick, sum / n as f64);
            }
        }
    }
    out
}

fn bookmaker_prices(book: &RawBookmaker, home: &str, away: &str) -> BTreeMap<Pick, f64> {
    let mut out = BTreeMap::new();
    for bet in &book.bets {
        let Some(family) = markets::classify_bet(&bet.name) else {
            continue;
        };
        for v in &bet.values {
            let Some(label) = value_text(&v.value) else {
                continue;
            };
            let Some(pick) = markets::classify_value(family, &label, home, away) else {
                continue;
            };
            let Some(price) = parse_price(&v.odd) else {
                trace!(bookmaker = %book.name, bet = %bet.name, %label, "discarding invalid quote");
                continue;
            };
            out.entry(pick).or_insert(price);
        }
    }
    out
}

fn value_text(raw: &Value) -> Option<String> {
    match raw {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Decimal odd from a string or number; non-numeric, non-finite or non-positive -> None.
pub fn parse_price(raw: &Value) -> Option<f64> {
    let v = match raw {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().replace(',', ".").parse::<f64>().ok()?,
        _ => return None,
    };
    if v.is_finite() && v > 0.0 { Some(v) } else { None }
}
