use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::fair_prob::round2;
use crate::parlay::ParlayResult;
use crate::pick_rankings::Candidate;
use crate::slate::FixtureReport;

pub struct ExportReport {
    pub fixtures: usize,
    pub picks: usize,
    pub parlay_legs: usize,
}

pub fn export_picks(
    path: &Path,
    reports: &[FixtureReport],
    parlay: Option<&ParlayResult>,
) -> Result<ExportReport> {
    let picks_rows = picks_rows(reports);
    let parlay_rows = parlay.map(parlay_rows).unwrap_or_else(|| vec![parlay_header()]);

    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Picks")?;
        write_rows(sheet, &picks_rows)?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Parlay")?;
        write_rows(sheet, &parlay_rows)?;
    }

    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;

    Ok(ExportReport {
        fixtures: reports.len(),
        picks: picks_rows.len().saturating_sub(1),
        parlay_legs: parlay_rows.len().saturating_sub(1),
    })
}

pub fn picks_rows(reports: &[FixtureReport]) -> Vec<Vec<String>> {
    let mut rows = vec![vec![
        "Fixture ID".to_string(),
        "Home".to_string(),
        "Away".to_string(),
        "Kickoff".to_string(),
        "Market".to_string(),
        "Pick".to_string(),
        "Prob".to_string(),
        "Fair Odd".to_string(),
        "Market Odd".to_string(),
        "Mkt Prob".to_string(),
        "Edge %".to_string(),
    ]];
    for report in reports {
        for c in &report.candidates {
            rows.push(pick_row(report, c));
        }
    }
    rows
}

fn pick_row(report: &FixtureReport, c: &Candidate) -> Vec<String> {
    let f = &report.fixture;
    vec![
        f.id.clone(),
        f.home.clone(),
        f.away.clone(),
        opt_to_string(f.kickoff.map(|k| k.format("%Y-%m-%d %H:%M").to_string())),
        c.market.key(),
        c.label.clone(),
        format!("{:.3}", c.prob),
        format!("{:.2}", c.fair_odd),
        opt_to_string(c.market_odd.map(|m| format!("{m:.2}"))),
        opt_to_string(
            report
                .implied
                .and_then(|p| p.pick_prob(c.pick))
                .map(|p| format!("{p:.3}")),
        ),
        opt_to_string(c.value_edge.map(|e| round2(e * 100.0))),
    ]
}

fn parlay_header() -> Vec<String> {
    vec![
        "Fixture ID".to_string(),
        "Home".to_string(),
        "Away".to_string(),
        "Market".to_string(),
        "Selection".to_string(),
        "Price".to_string(),
        "Kickoff".to_string(),
    ]
}

pub fn parlay_rows(result: &ParlayResult) -> Vec<Vec<String>> {
    let mut rows = vec![parlay_header()];
    for leg in &result.legs {
        rows.push(vec![
            leg.fixture_id.clone(),
            leg.home.clone(),
            leg.away.clone(),
            leg.pick.market().key(),
            leg.pick.selection(),
            format!("{:.2}", leg.price),
            opt_to_string(leg.start_time.map(|t| t.to_rfc3339())),
        ]);
    }
    if let (Some(product), Some(diff)) = (result.product, result.diff_percent) {
        rows.push(Vec::new());
        rows.push(vec![
            "Target".to_string(),
            result.target.to_string(),
            "Product".to_string(),
            format!("{product:.4}"),
            "Diff %".to_string(),
            diff.to_string(),
            if result.found { "in band" } else { "closest" }.to_string(),
        ]);
    }
    rows
}

fn opt_to_string<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<String>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            worksheet
                .write_string(row_idx as u32, col_idx as u16, value)
                .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::fake_slate::fake_slate;
    use crate::markets::Market;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn one_row_per_candidate_plus_header() {
        let slate = fake_slate(&mut StdRng::seed_from_u64(3), 4);
        let reports = slate.evaluate(&EngineConfig::default(), None);
        let expected: usize = reports.iter().map(|r| r.candidates.len()).sum();
        let rows = picks_rows(&reports);
        assert_eq!(rows.len(), expected + 1);
        assert_eq!(rows[0][0], "Fixture ID");
        assert!(rows[1..].iter().all(|r| r.len() == rows[0].len()));
    }

    #[test]
    fn market_implied_column_covers_result_picks_only() {
        let slate = fake_slate(&mut StdRng::seed_from_u64(3), 4);
        let reports = slate.evaluate(&EngineConfig::default(), None);
        assert!(reports.iter().all(|r| r.implied.is_some()));
        let rows = picks_rows(&reports);
        let col = rows[0].iter().position(|h| h == "Mkt Prob").unwrap();
        let mut idx = 1;
        for r in &reports {
            for c in &r.candidates {
                let cell = &rows[idx][col];
                match c.market {
                    Market::MatchWinner | Market::DoubleChance => {
                        let p: f64 = cell.parse().unwrap();
                        assert!(p > 0.0 && p < 1.0, "{cell}");
                    }
                    _ => assert!(cell.is_empty(), "{cell}"),
                }
                idx += 1;
            }
        }
        assert_eq!(idx, rows.len());
    }

    #[test]
    fn workbook_is_written() {
        let slate = fake_slate(&mut StdRng::seed_from_u64(5), 3);
        let reports = slate.evaluate(&EngineConfig::default(), None);
        let path = std::env::temp_dir().join(format!("picks_export_{}.xlsx", std::process::id()));
        let report = export_picks(&path, &reports, None).unwrap();
        assert_eq!(report.fixtures, 3);
        assert_eq!(report.parlay_legs, 0);
        assert!(path.exists());
        let _ = std::fs::remove_file(&path);
    }
}
