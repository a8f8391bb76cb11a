use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use parlay_terminal::config::EngineConfig;
use parlay_terminal::fake_slate::fake_slate;
use parlay_terminal::parlay::{self, LegPool, ParlayRequest};
use parlay_terminal::pick_rankings::{self, RankOptions};
use parlay_terminal::slate::{self, FixtureReport, Slate};

const VALUE_FLAGS: &[&str] = &[
    "--target",
    "--tol",
    "--min-legs",
    "--max-legs",
    "--bookmaker",
    "--min-price",
    "--max-price",
    "--horizon-hours",
    "--top",
];

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cfg = EngineConfig::from_env();
    let slate = match slate_path_arg() {
        Some(path) => slate::load_slate(&path)?,
        None => fake_slate(&mut rand::thread_rng(), 8),
    };

    let mut request = ParlayRequest::new(
        parse_f64_arg("--target").unwrap_or(5.0),
        parse_f64_arg("--tol").unwrap_or(0.05),
        parse_usize_arg("--min-legs").unwrap_or(2),
        parse_usize_arg("--max-legs").unwrap_or(4),
    );
    request.bookmaker = parse_str_arg("--bookmaker");
    request.min_price = parse_f64_arg("--min-price");
    request.max_price = parse_f64_arg("--max-price");
    if let Some(hours) = parse_f64_arg("--horizon-hours") {
        request
            .set_horizon(Utc::now(), hours)
            .with_context(|| format!("invalid --horizon-hours {hours}"))?;
    }
    request.validate()?;

    let reports = slate.evaluate(&cfg, request.bookmaker.as_deref());
    let legs = if has_flag("--from-quotes") {
        slate::quote_legs(&reports)
    } else {
        slate::top_pick_legs(&reports, true)
    };
    let pool = LegPool::build(legs, &request);
    let result = parlay::compose(&pool, &request, &cfg.search_options())?;

    let ranked = pick_rankings::rank_slate(
        reports.iter().map(|r| r.candidates.clone()).collect(),
        RankOptions {
            min_value_edge: cfg.min_value_edge,
            top: Some(parse_usize_arg("--top").unwrap_or(15)),
        },
    );

    if has_flag("--json") {
        let out = json!({ "picks": ranked, "parlay": result.response() });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    print_slate(&slate, &reports);
    println!();
    println!("Top picks:");
    for c in &ranked {
        let fixture = reports.iter().find(|r| r.fixture.id == c.fixture_id);
        let teams = fixture
            .map(|r| format!("{} vs {}", r.fixture.home, r.fixture.away))
            .unwrap_or_else(|| c.fixture_id.clone());
        let market = c
            .market_odd
            .map(|m| format!("{m:.2}"))
            .unwrap_or_else(|| "-".to_string());
        let edge = c
            .value_edge
            .map(|e| format!("{:+.1}%", e * 100.0))
            .unwrap_or_default();
        println!(
            "  {:<32} {:<14} {:<10} p={:.3} fair={:.2} mkt={} {}",
            teams, c.market, c.selection, c.prob, c.fair_odd, market, edge
        );
    }

    println!();
    println!(
        "Parlay target {:.2} (tol {:.0}%, {}-{} legs, pool {}):",
        request.target,
        request.tolerance * 100.0,
        request.min_legs,
        request.max_legs,
        pool.len()
    );
    match (result.product, result.diff_percent) {
        (Some(product), Some(diff)) => {
            for leg in &result.legs {
                println!(
                    "  {} vs {}  {} @ {:.2}",
                    leg.home,
                    leg.away,
                    leg.selection_text(),
                    leg.price
                );
            }
            let status = if result.found { "in band" } else { "closest" };
            println!("  product {product:.3} ({diff:+.2}%) {status}");
        }
        _ => println!("  no combination available"),
    }
    if result.truncated {
        println!("  search truncated after {} nodes", result.nodes);
    }

    Ok(())
}

fn print_slate(slate: &Slate, reports: &[FixtureReport]) {
    println!("{} fixtures", slate.fixtures.len());
    for r in reports {
        let kickoff = r
            .fixture
            .kickoff
            .map(|k| k.format("%a %H:%M").to_string())
            .unwrap_or_else(|| "tbd".to_string());
        let implied = r
            .implied
            .map(|p| {
                format!(
                    "  mkt 1X2 {:.0}/{:.0}/{:.0}%",
                    p.home * 100.0,
                    p.draw * 100.0,
                    p.away * 100.0
                )
            })
            .unwrap_or_default();
        println!(
            "  {:<10} {} vs {}  xG {:.2}-{:.2}  quotes {}{}",
            kickoff,
            r.fixture.home,
            r.fixture.away,
            r.lambda_home,
            r.lambda_away,
            r.markets.len(),
            implied
        );
    }
}

fn slate_path_arg() -> Option<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if arg.starts_with("--") {
            continue;
        }
        if idx > 0 && VALUE_FLAGS.contains(&args[idx - 1].as_str()) {
            continue;
        }
        return Some(PathBuf::from(arg));
    }
    None
}

fn parse_str_arg(name: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}="))
            && !raw.trim().is_empty()
        {
            return Some(raw.trim().to_string());
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

fn parse_f64_arg(name: &str) -> Option<f64> {
    parse_str_arg(name).and_then(|v| v.parse::<f64>().ok())
}

fn parse_usize_arg(name: &str) -> Option<usize> {
    parse_str_arg(name).and_then(|v| v.parse::<usize>().ok())
}

fn has_flag(name: &str) -> bool {
    std::env::args().skip(1).any(|arg| arg == name)
}
