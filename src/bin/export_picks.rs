use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing_subscriber::EnvFilter;

use parlay_terminal::config::EngineConfig;
use parlay_terminal::fake_slate::fake_slate;
use parlay_terminal::parlay::{self, LegPool, ParlayRequest};
use parlay_terminal::pick_export;
use parlay_terminal::slate;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = EngineConfig::from_env();
    let slate = match parse_path_arg("--slate") {
        Some(path) => slate::load_slate(&path)?,
        None => fake_slate(&mut rand::thread_rng(), 8),
    };
    let out = parse_path_arg("--out").unwrap_or_else(|| PathBuf::from("picks.xlsx"));

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
    let legs = if std::env::args().skip(1).any(|arg| arg == "--from-quotes") {
        slate::quote_legs(&reports)
    } else {
        slate::top_pick_legs(&reports, true)
    };
    let pool = LegPool::build(legs, &request);
    let result = parlay::compose(&pool, &request, &cfg.search_options())?;

    let report = pick_export::export_picks(&out, &reports, Some(&result))?;
    tracing::info!(
        path = %out.display(),
        fixtures = report.fixtures,
        picks = report.picks,
        parlay_legs = report.parlay_legs,
        "picks exported"
    );
    println!("Wrote {}", out.display());
    Ok(())
}

fn parse_path_arg(name: &str) -> Option<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix(&format!("{name}=")) {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if arg == name {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(PathBuf::from(next));
            }
        }
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
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}="))
            && let Ok(v) = raw.trim().parse::<f64>()
        {
            return Some(v);
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && let Ok(v) = next.trim().parse::<f64>()
        {
            return Some(v);
        }
    }
    None
}

fn parse_usize_arg(name: &str) -> Option<usize> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}="))
            && let Ok(v) = raw.trim().parse::<usize>()
        {
            return Some(v);
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && let Ok(v) = next.trim().parse::<usize>()
        {
            return Some(v);
        }
    }
    None
}
