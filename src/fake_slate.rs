use chrono::{Duration as ChronoDuration, Utc};
use rand::Rng;
use serde_json::{Value, json};

use crate::fair_prob;
use crate::markets::{GoalLine, Pick};
use crate::slate::{Fixture, FixtureSnapshot, Slate};
use crate::team_form::{Meeting, RecentMatch};

const TEAMS: &[&str] = &[
    "Arsenal",
    "Aston Villa",
    "Brighton",
    "Chelsea",
    "Everton",
    "Fulham",
    "Liverpool",
    "Man City",
    "Man United",
    "Newcastle",
    "Spurs",
    "West Ham",
    "Wolves",
    "Brentford",
    "Bournemouth",
    "Crystal Palace",
];

const BOOKMAKERS: &[(u32, &str)] = &[(8, "Bet365"), (11, "1xBet"), (6, "Bwin")];

/// A slate of made-up fixtures with form, meetings and quotes around a model price.
pub fn fake_slate(rng: &mut impl Rng, fixtures: usize) -> Slate {
    let fixtures = fixtures.clamp(1, TEAMS.len() / 2);
    let mut names: Vec<&str> = TEAMS.to_vec();
    shuffle(rng, &mut names);

    let now = Utc::now();
    let snapshots = (0..fixtures)
        .map(|i| {
            let home = names[2 * i];
            let away = names[2 * i + 1];
            let attack_h = rng.gen_range(0.8..2.2);
            let attack_a = rng.gen_range(0.6..1.8);
            FixtureSnapshot {
                fixture: Fixture {
                    id: format!("fx{}", 1000 + i),
                    home: home.to_string(),
                    away: away.to_string(),
                    kickoff: Some(now + ChronoDuration::hours(2 + 3 * i as i64)),
                    league: Some("Premier League".to_string()),
                    country: Some("England".to_string()),
                },
                home_recent: recent(rng, attack_h, attack_a),
                away_recent: recent(rng, attack_a, attack_h),
                h2h: (0..rng.gen_range(0..6))
                    .map(|_| Meeting {
                        home_goals: goals(rng, attack_h),
                        away_goals: goals(rng, attack_a),
                    })
                    .collect(),
                baseline: None,
                bookmakers: bookmakers(rng, attack_h, attack_a),
            }
        })
        .collect();

    Slate {
        baseline_model: None,
        league_results: Vec::new(),
        fixtures: snapshots,
    }
}

fn recent(rng: &mut impl Rng, scored: f64, conceded: f64) -> Vec<RecentMatch> {
    (0..rng.gen_range(3..10))
        .map(|_| RecentMatch {
            goals_for: goals(rng, scored),
            goals_against: goals(rng, conceded),
        })
        .collect()
}

// Knuth's method; fine for the small rates used here.
fn goals(rng: &mut impl Rng, lambda: f64) -> u8 {
    let limit = (-lambda).exp();
    let mut k = 0u8;
    let mut p = 1.0;
    loop {
        p *= rng.gen_range(0.0..1.0);
        if p <= limit || k >= 9 {
            return k;
        }
        k += 1;
    }
}

fn bookmakers(rng: &mut impl Rng, lambda_h: f64, lambda_a: f64) -> Value {
    let o = fair_prob::outcome_probs(lambda_h, lambda_a, 10);
    let total = lambda_h + lambda_a;
    let mut books = Vec::new();
    for (id, name) in BOOKMAKERS {
        let margin = rng.gen_range(1.03..1.08);
        let mut quote = |p: f64| -> String {
            let noise = rng.gen_range(0.97..1.03);
            format!("{:.2}", (noise / (p * margin)).max(1.01))
        };
        let mut bets = vec![
            json!({ "id": 1, "name": "Match Winner", "values": [
                { "value": "Home", "odd": quote(o.home) },
                { "value": "Draw", "odd": quote(o.draw) },
                { "value": "Away", "odd": quote(o.away) },
            ]}),
            json!({ "id": 12, "name": "Double Chance", "values": [
                { "value": "Home/Draw", "odd": quote(o.home_or_draw()) },
                { "value": "Home/Away", "odd": quote(o.home_or_away()) },
                { "value": "Draw/Away", "odd": quote(o.draw_or_away()) },
            ]}),
        ];
        let mut totals = Vec::new();
        for tenths in [15u8, 25, 35] {
            let Some(line) = GoalLine::from_tenths(tenths) else {
                continue;
            };
            let under = fair_prob::under_prob(line, total);
            totals.push(json!({ "value": Pick::Over(line).selection(), "odd": quote(1.0 - under) }));
            totals.push(json!({ "value": Pick::Under(line).selection(), "odd": quote(under) }));
        }
        bets.push(json!({ "id": 5, "name": "Goals Over/Under", "values": totals }));
        let btts_no = fair_prob::btts_no_prob(lambda_h, lambda_a, None);
        bets.push(json!({ "id": 8, "name": "Both Teams Score", "values": [
            { "value": "Yes", "odd": quote(1.0 - btts_no) },
            { "value": "No", "odd": quote(btts_no) },
        ]}));
        books.push(json!({ "id": id, "name": name, "bets": bets }));
    }
    Value::Array(books)
}

fn shuffle<T>(rng: &mut impl Rng, items: &mut [T]) {
    for i in (1..items.len()).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
}
