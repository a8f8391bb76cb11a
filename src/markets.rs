use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Half-goal totals line, stored in tenths (2.5 -> 25).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GoalLine(u8);

impl GoalLine {
    pub const MIN_TENTHS: u8 = 5;
    pub const MAX_TENTHS: u8 = 65;

    pub fn from_tenths(tenths: u8) -> Option<Self> {
        if !(Self::MIN_TENTHS..=Self::MAX_TENTHS).contains(&tenths) || tenths % 10 != 5 {
            return None;
        }
        Some(Self(tenths))
    }

    pub fn from_goals(goals: f64) -> Option<Self> {
        if !goals.is_finite() || goals <= 0.0 {
            return None;
        }
        let tenths = (goals * 10.0).round();
        if (tenths / 10.0 - goals).abs() > 1e-9 || tenths > f64::from(u8::MAX) {
            return None;
        }
        Self::from_tenths(tenths as u8)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let s = raw.trim().replace(',', ".");
        s.parse::<f64>().ok().and_then(Self::from_goals)
    }

    pub fn tenths(self) -> u8 {
        self.0
    }

    pub fn goals(self) -> f64 {
        f64::from(self.0) / 10.0
    }

    /// Highest goal count that still settles Under.
    pub fn floor_goals(self) -> u32 {
        u32::from(self.0 / 10)
    }
}

impl fmt::Display for GoalLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0 / 10, self.0 % 10)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Market {
    MatchWinner,
    DoubleChance,
    OverUnder(GoalLine),
    Btts,
}

impl Market {
    pub fn key(self) -> String {
        match self {
            Market::MatchWinner => "match_winner".to_string(),
            Market::DoubleChance => "double_chance".to_string(),
            Market::OverUnder(line) => format!("over_under_{line}"),
            Market::Btts => "btts".to_string(),
        }
    }
}

impl Serialize for Market {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.key())
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// One selection inside one market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Pick {
    Home,
    Draw,
    Away,
    HomeOrDraw,
    HomeOrAway,
    DrawOrAway,
    Over(GoalLine),
    Under(GoalLine),
    BttsYes,
    BttsNo,
}

impl Pick {
    pub fn market(self) -> Market {
        match self {
            Pick::Home | Pick::Draw | Pick::Away => Market::MatchWinner,
            Pick::HomeOrDraw | Pick::HomeOrAway | Pick::DrawOrAway => Market::DoubleChance,
            Pick::Over(line) | Pick::Under(line) => Market::OverUnder(line),
            Pick::BttsYes | Pick::BttsNo => Market::Btts,
        }
    }

    /// Flat key used in market maps and serialized output (`dc1x`, `over25`, ...).
    pub fn key(self) -> String {
        match self {
            Pick::Home => "home".to_string(),
            Pick::Draw => "draw".to_string(),
            Pick::Away => "away".to_string(),
            Pick::HomeOrDraw => "dc1x".to_string(),
            Pick::HomeOrAway => "dc12".to_string(),
            Pick::DrawOrAway => "dcx2".to_string(),
            Pick::Over(line) => format!("over{}", line.tenths()),
            Pick::Under(line) => format!("under{}", line.tenths()),
            Pick::BttsYes => "btts_yes".to_string(),
            Pick::BttsNo => "btts_no".to_string(),
        }
    }

    pub fn from_key(raw: &str) -> Option<Self> {
        let k = raw.trim().to_ascii_lowercase();
        let pick = match k.as_str() {
            "home" => Pick::Home,
            "draw" => Pick::Draw,
            "away" => Pick::Away,
            "dc1x" => Pick::HomeOrDraw,
            "dc12" => Pick::HomeOrAway,
            "dcx2" => Pick::DrawOrAway,
            "btts_yes" => Pick::BttsYes,
            "btts_no" => Pick::BttsNo,
            _ => {
                if let Some(rest) = k.strip_prefix("over") {
                    Pick::Over(GoalLine::from_tenths(rest.parse().ok()?)?)
                } else if let Some(rest) = k.strip_prefix("under") {
                    Pick::Under(GoalLine::from_tenths(rest.parse().ok()?)?)
                } else {
                    return None;
                }
            }
        };
        Some(pick)
    }

    /// Selection name within its market, as shown to users.
    pub fn selection(self) -> String {
        match self {
            Pick::Home => "Home".to_string(),
            Pick::Draw => "Draw".to_string(),
            Pick::Away => "Away".to_string(),
            Pick::HomeOrDraw => "1X".to_string(),
            Pick::HomeOrAway => "12".to_string(),
            Pick::DrawOrAway => "X2".to_string(),
            Pick::Over(line) => format!("Over {line}"),
            Pick::Under(line) => format!("Under {line}"),
            Pick::BttsYes => "Yes".to_string(),
            Pick::BttsNo => "No".to_string(),
        }
    }

    pub fn label(self) -> String {
        match self {
            Pick::Home => "Home win".to_string(),
            Pick::Draw => "Draw".to_string(),
            Pick::Away => "Away win".to_string(),
            Pick::HomeOrDraw => "Home or draw".to_string(),
            Pick::HomeOrAway => "Home or away".to_string(),
            Pick::DrawOrAway => "Draw or away".to_string(),
            Pick::Over(line) => format!("Over {line} goals"),
            Pick::Under(line) => format!("Under {line} goals"),
            Pick::BttsYes => "Both teams to score".to_string(),
            Pick::BttsNo => "Both teams to score: No".to_string(),
        }
    }
}

impl fmt::Display for Pick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl Serialize for Pick {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.key())
    }
}

impl<'de> Deserialize<'de> for Pick {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Pick::from_key(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown pick key {raw:?}")))
    }
}

/// Bookmaker bet families we know how to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BetFamily {
    MatchWinner,
    DoubleChance,
    GoalsOverUnder,
    Btts,
}

pub fn classify_bet(name: &str) -> Option<BetFamily> {
    let s = name.trim().to_lowercase();
    if s.is_empty() {
        return None;
    }
    // Period and team-specific variants settle on different events.
    const EXCLUDES: &[&str] = &[
        "first half",
        "second half",
        "1st half",
        "2nd half",
        "half time",
        "halftime",
        "total - ",
        "home team",
        "away team",
        "exact",
        "asian",
        "corners",
        "cards",
    ];
    if EXCLUDES.iter().any(|e| s.contains(e)) {
        return None;
    }
    if s.contains("double chance") {
        return Some(BetFamily::DoubleChance);
    }
    if s.contains("both teams") || s == "btts" || s.starts_with("btts ") {
        return Some(BetFamily::Btts);
    }
    if s.contains("over/under") || s.contains("over / under") || s == "totals" || s == "total goals"
    {
        return Some(BetFamily::GoalsOverUnder);
    }
    if s == "1x2"
        || s.contains("match winner")
        || s.contains("full time result")
        || s.contains("fulltime result")
        || s == "h2h"
        || s == "match result"
    {
        return Some(BetFamily::MatchWinner);
    }
    None
}

pub fn classify_value(family: BetFamily, label: &str, home: &str, away: &str) -> Option<Pick> {
    let raw = label.trim();
    let s = compact(raw);
    match family {
        BetFamily::MatchWinner => {
            if matches!(s.as_str(), "home" | "1") {
                Some(Pick::Home)
            } else if matches!(s.as_str(), "draw" | "x" | "tie") {
                Some(Pick::Draw)
            } else if matches!(s.as_str(), "away" | "2") {
                Some(Pick::Away)
            } else if !home.trim().is_empty() && s == compact(home) {
                Some(Pick::Home)
            } else if !away.trim().is_empty() && s == compact(away) {
                Some(Pick::Away)
            } else {
                None
            }
        }
        BetFamily::DoubleChance => match s.as_str() {
            "1x" | "home/draw" | "homedraw" | "homeordraw" => Some(Pick::HomeOrDraw),
            "12" | "home/away" | "homeaway" | "homeoraway" => Some(Pick::HomeOrAway),
            "x2" | "draw/away" | "drawaway" | "draworaway" => Some(Pick::DrawOrAway),
            _ => None,
        },
        BetFamily::GoalsOverUnder => {
            let lower = raw.to_lowercase();
            let (is_over, rest) = if let Some(rest) = lower.strip_prefix("over") {
                (true, rest)
            } else if let Some(rest) = lower.strip_prefix("under") {
                (false, rest)
            } else if let Some(rest) = lower.strip_prefix('o') {
                (true, rest)
            } else if let Some(rest) = lower.strip_prefix('u') {
                (false, rest)
            } else {
                return None;
            };
            let line = GoalLine::parse(rest)?;
            Some(if is_over {
                Pick::Over(line)
            } else {
                Pick::Under(line)
            })
        }
        BetFamily::Btts => match s.as_str() {
            "yes" | "y" => Some(Pick::BttsYes),
            "no" | "n" => Some(Pick::BttsNo),
            _ => None,
        },
    }
}

fn compact(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}
