use std::fs;
use std::path::PathBuf;

use chrono::{TimeZone, Utc};

use parlay_terminal::config::EngineConfig;
use parlay_terminal::markets::{GoalLine, Pick};
use parlay_terminal::odds_normalize::{QuotePolicy, normalize_markets, parse_bookmakers_json};
use parlay_terminal::parlay::{LegPool, ParlayRequest, SearchOptions, compose};
use parlay_terminal::pick_rankings::{RankOptions, candidate_cmp, rank_slate};
use parlay_terminal::slate::{parse_slate_json, quote_legs, top_pick_legs};

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

fn line(goals: f64) -> GoalLine {
    GoalLine::from_goals(goals).expect("half-goal line")
}

#[test]
fn first_usable_bookmaker_wins_without_merging() {
    let books = parse_bookmakers_json(&read_fixture("bookmakers_api.json"));
    assert_eq!(books.len(), 2);
    let m = normalize_markets(&books, "Arsenal", "Chelsea", QuotePolicy::FirstUsable, None);
    assert_eq!(m.price(Pick::Home), Some(2.10));
    // Bet365's draw quote is not numeric and the second book is never consulted.
    assert_eq!(m.price(Pick::Draw), None);
    assert_eq!(m.price(Pick::HomeOrDraw), Some(1.30));
    assert_eq!(m.price(Pick::HomeOrAway), Some(1.28));
    assert_eq!(m.price(Pick::Over(line(2.5))), Some(1.85));
    assert_eq!(m.price(Pick::Under(line(1.5))), Some(3.40));
    assert_eq!(m.price(Pick::BttsNo), Some(2.05));
    assert_eq!(m.len(), 11);
}

#[test]
fn best_price_and_consensus_policies() {
    let books = parse_bookmakers_json(&read_fixture("bookmakers_api.json"));

    let best = normalize_markets(&books, "Arsenal", "Chelsea", QuotePolicy::BestPrice, None);
    assert_eq!(best.price(Pick::Home), Some(2.20));
    assert_eq!(best.price(Pick::Draw), Some(3.50));
    assert_eq!(best.price(Pick::Away), Some(3.60));
    assert_eq!(best.price(Pick::Over(line(2.5))), Some(1.90));
    assert_eq!(best.price(Pick::Under(line(2.5))), Some(1.95));

    let mean = normalize_markets(&books, "Arsenal", "Chelsea", QuotePolicy::Consensus, None);
    assert!((mean.price(Pick::Home).unwrap() - 2.15).abs() < 1e-9);
    assert!((mean.price(Pick::Away).unwrap() - 3.50).abs() < 1e-9);
    assert_eq!(mean.price(Pick::Draw), Some(3.50));
    // The zero-priced under from the second book is discarded, not averaged.
    assert_eq!(mean.price(Pick::Under(line(2.5))), Some(1.95));
}

#[test]
fn bookmaker_filter_matches_name_or_id() {
    let books = parse_bookmakers_json(&read_fixture("bookmakers_api.json"));
    let by_name = normalize_markets(
        &books,
        "Arsenal",
        "Chelsea",
        QuotePolicy::FirstUsable,
        Some("1XBET"),
    );
    assert_eq!(by_name.price(Pick::Home), Some(2.20));
    assert_eq!(by_name.price(Pick::HomeOrDraw), None);

    let by_id = normalize_markets(&books, "Arsenal", "Chelsea", QuotePolicy::FirstUsable, Some("8"));
    assert_eq!(by_id.price(Pick::Home), Some(2.10));

    let none = normalize_markets(
        &books,
        "Arsenal",
        "Chelsea",
        QuotePolicy::FirstUsable,
        Some("Pinnacle"),
    );
    assert!(none.is_empty());
}

#[test]
fn malformed_bookmaker_payloads_are_empty() {
    assert!(parse_bookmakers_json("").is_empty());
    assert!(parse_bookmakers_json("null").is_empty());
    assert!(parse_bookmakers_json("{not json").is_empty());
    assert!(parse_bookmakers_json(r#"{"response": []}"#).is_empty());
}

#[test]
fn parses_slate_fixture() {
    let slate = parse_slate_json(&read_fixture("slate_sample.json")).expect("fixture should parse");
    assert_eq!(slate.fixtures.len(), 3);

    let first = &slate.fixtures[0].fixture;
    assert_eq!(first.id, "1035");
    assert_eq!(
        first.kickoff,
        Some(Utc.with_ymd_and_hms(2026, 3, 1, 15, 0, 0).unwrap())
    );
    assert_eq!(
        slate.fixtures[1].fixture.kickoff,
        Some(Utc.with_ymd_and_hms(2026, 3, 1, 18, 0, 0).unwrap())
    );
    assert!(slate.fixtures[2].fixture.kickoff.is_none());
    assert_eq!(slate.model().home_adv_goals, 0.3);
}

#[test]
fn slate_evaluation_merges_model_and_market() {
    let slate = parse_slate_json(&read_fixture("slate_sample.json")).unwrap();
    let reports = slate.evaluate(&EngineConfig::default(), None);
    assert_eq!(reports.len(), 3);

    let arsenal = &reports[0];
    assert_eq!(arsenal.lambda_home, 1.5);
    assert_eq!(arsenal.lambda_away, 1.1);
    assert_eq!(arsenal.markets.len(), 11);

    // Two of four meetings had both sides scoring.
    let btts_no = arsenal
        .candidates
        .iter()
        .find(|c| c.pick == Pick::BttsNo)
        .expect("btts no candidate");
    assert!((btts_no.prob - 0.5).abs() < 1e-12);
    assert_eq!(btts_no.market_odd, Some(2.05));
    assert!((btts_no.value_edge.unwrap() - 0.025).abs() < 1e-9);

    let lyon = &reports[1];
    assert_eq!(lyon.markets.price(Pick::Home), Some(1.95));
    assert_eq!(lyon.markets.price(Pick::Away), Some(4.20));
    assert_eq!(lyon.markets.price(Pick::Draw), Some(3.30));
    assert!(lyon.implied.is_some());

    let bari = &reports[2];
    assert!(bari.markets.is_empty());
    assert!((bari.lambda_home - 1.45).abs() < 1e-12);
    assert!((bari.lambda_away - 1.15).abs() < 1e-12);

    for r in &reports {
        assert!(
            r.candidates
                .windows(2)
                .all(|w| candidate_cmp(&w[0], &w[1]).is_le())
        );
        assert!(r.candidates.iter().all(|c| c.prob > 0.01 && c.prob < 0.999));
    }
}

#[test]
fn slate_legs_compose_into_response_shape() {
    let slate = parse_slate_json(&read_fixture("slate_sample.json")).unwrap();
    let reports = slate.evaluate(&EngineConfig::default(), None);
    let legs = top_pick_legs(&reports, true);
    assert_eq!(legs.len(), 2);

    let request: ParlayRequest =
        serde_json::from_str(r#"{"target": 2.0, "tol": 0.5, "minLegs": 1, "maxLegs": 2}"#)
            .unwrap();
    let pool = LegPool::build(legs, &request);
    let result = compose(&pool, &request, &SearchOptions::default()).unwrap();
    let value = serde_json::to_value(result.response()).unwrap();

    assert_eq!(value["target"], 2.0);
    assert!(value["found"].is_boolean());
    let body = &value["result"];
    assert!(body["product"].is_number());
    assert!(body["diffPercent"].is_number());
    let leg = &body["legs"][0];
    for key in ["match_id", "home", "away", "market", "selection", "price", "start_time"] {
        assert!(leg.get(key).is_some(), "missing {key}");
    }
}

#[test]
fn quote_legs_build_a_pool_from_market_prices() {
    let slate = parse_slate_json(&read_fixture("slate_sample.json")).unwrap();
    let reports = slate.evaluate(&EngineConfig::default(), None);
    let legs = quote_legs(&reports);
    assert_eq!(legs.len(), 11 + 8);
    assert!(legs.iter().all(|l| l.fixture_id != "fx-3"));
    let lyon_draw = legs
        .iter()
        .find(|l| l.fixture_id == "fx-2" && l.pick == Pick::Draw)
        .expect("quoted draw");
    assert_eq!(lyon_draw.price, 3.30);
    assert_eq!(lyon_draw.home, "Lyon");

    let request = ParlayRequest::new(3.0, 0.5, 2, 2);
    let pool = LegPool::build(legs, &request);
    assert_eq!(pool.len(), 2);
    for leg in pool.legs() {
        let report = reports.iter().find(|r| r.fixture.id == leg.fixture_id).unwrap();
        let top = report.top_candidate(true).unwrap();
        assert_eq!(leg.pick, top.pick);
        assert_eq!(leg.prob, Some(top.prob));
    }

    let result = compose(&pool, &request, &SearchOptions::default()).unwrap();
    assert_eq!(result.legs.len(), 2);
    let value = serde_json::to_value(result.response()).unwrap();
    assert_eq!(value["result"]["legs"].as_array().map(Vec::len), Some(2));
}

#[test]
fn ranked_picks_serialize_with_market_and_selection() {
    let slate = parse_slate_json(&read_fixture("slate_sample.json")).unwrap();
    let reports = slate.evaluate(&EngineConfig::default(), None);

    let fair = serde_json::to_value(&reports[0].fair).unwrap();
    let row = &fair[0];
    for key in ["market", "selection", "label", "prob", "fairOdd"] {
        assert!(row.get(key).is_some(), "fair price missing {key}");
    }
    assert!(row.get("pick").is_none());

    let ranked = rank_slate(
        reports.iter().map(|r| r.candidates.clone()).collect(),
        RankOptions {
            min_value_edge: None,
            top: Some(10),
        },
    );
    let value = serde_json::to_value(&ranked).unwrap();
    for row in value.as_array().unwrap() {
        for key in ["market", "selection", "label", "prob", "fairOdd", "marketOdd"] {
            assert!(row.get(key).is_some(), "candidate missing {key}");
        }
    }
    let over = reports[0]
        .candidates
        .iter()
        .find(|c| c.pick == Pick::Over(line(1.5)))
        .expect("over 1.5 candidate");
    let row = serde_json::to_value(over).unwrap();
    assert_eq!(row["market"], "over_under_1.5");
    assert_eq!(row["selection"], "Over 1.5");
    assert_eq!(row["marketOdd"], 1.30);
}

#[test]
fn bookmaker_choice_flows_through_evaluation() {
    let slate = parse_slate_json(&read_fixture("slate_sample.json")).unwrap();
    let reports = slate.evaluate(&EngineConfig::default(), Some("bwin"));
    assert!(reports[0].markets.is_empty());
    assert!(reports[0].implied.is_none());
    assert_eq!(reports[1].markets.len(), 8);
    assert!(reports[1].implied.is_some());
    let legs = top_pick_legs(&reports, true);
    assert_eq!(legs.len(), 1);
    assert_eq!(legs[0].fixture_id, "fx-2");
}
