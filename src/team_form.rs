use serde::{Deserialize, Serialize};

const LAMBDA_MIN: f64 = 0.20;
const LAMBDA_MAX: f64 = 3.80;
// Matches of form needed before it fully replaces the league prior.
const FULL_FORM_SAMPLE: f64 = 6.0;

/// One past match from a single team's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecentMatch {
    pub goals_for: u8,
    pub goals_against: u8,
}

/// One past meeting between the two sides, oriented to the upcoming fixture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Meeting {
    pub home_goals: u8,
    pub away_goals: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TeamFormSummary {
    pub matches: usize,
    pub scored_avg: f64,
    pub conceded_avg: f64,
    pub total_goals_avg: f64,
}

impl TeamFormSummary {
    /// Summarize the most recent `window` matches (newest first).
    pub fn from_recent(recent: &[RecentMatch], window: usize) -> Option<Self> {
        let window = window.max(1);
        let rows = &recent[..recent.len().min(window)];
        if rows.is_empty() {
            return None;
        }
        let n = rows.len() as f64;
        let scored: f64 = rows.iter().map(|m| f64::from(m.goals_for)).sum();
        let conceded: f64 = rows.iter().map(|m| f64::from(m.goals_against)).sum();
        Some(Self {
            matches: rows.len(),
            scored_avg: scored / n,
            conceded_avg: conceded / n,
            total_goals_avg: (scored + conceded) / n,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeadToHeadSummary {
    pub meetings: usize,
    pub total_goals_avg: f64,
    pub btts_rate: f64,
}

impl HeadToHeadSummary {
    pub fn from_meetings(meetings: &[Meeting]) -> Option<Self> {
        if meetings.is_empty() {
            return None;
        }
        let n = meetings.len() as f64;
        let goals: f64 = meetings
            .iter()
            .map(|m| f64::from(m.home_goals) + f64::from(m.away_goals))
            .sum();
        let btts = meetings
            .iter()
            .filter(|m| m.home_goals > 0 && m.away_goals > 0)
            .count() as f64;
        Some(Self {
            meetings: meetings.len(),
            total_goals_avg: goals / n,
            btts_rate: btts / n,
        })
    }
}

/// League-level goal priors used when form is thin or missing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselineModel {
    pub goals_total_base: f64,
    pub home_adv_goals: f64,
}

impl Default for BaselineModel {
    fn default() -> Self {
        Self {
            goals_total_base: 2.60,
            home_adv_goals: 0.25,
        }
    }
}

impl BaselineModel {
    /// Fit the priors from finished league results, shrinking small samples toward defaults.
    pub fn fit(results: &[Meeting]) -> Self {
        let d = Self::default();
        if results.is_empty() {
            return d;
        }
        let n = results.len() as f64;
        let total: f64 = results
            .iter()
            .map(|m| f64::from(m.home_goals) + f64::from(m.away_goals))
            .sum();
        let margin: f64 = results
            .iter()
            .map(|m| f64::from(m.home_goals) - f64::from(m.away_goals))
            .sum();

        const MIN_N: f64 = 200.0;
        let w = (n / MIN_N).clamp(0.0, 1.0);
        Self {
            goals_total_base: (1.0 - w) * d.goals_total_base + w * (total / n),
            home_adv_goals: (1.0 - w) * d.home_adv_goals + w * (margin / n),
        }
    }

    fn prior_lambdas(&self) -> (f64, f64) {
        (
            clamp_lambda(self.goals_total_base / 2.0 + self.home_adv_goals / 2.0),
            clamp_lambda(self.goals_total_base / 2.0 - self.home_adv_goals / 2.0),
        )
    }

    /// Expected goals for (home, away).
    pub fn lambdas(
        &self,
        home_form: Option<&TeamFormSummary>,
        away_form: Option<&TeamFormSummary>,
    ) -> (f64, f64) {
        let (prior_h, prior_a) = self.prior_lambdas();
        let (Some(h), Some(a)) = (home_form, away_form) else {
            return (prior_h, prior_a);
        };

        let form_h = (h.scored_avg + a.conceded_avg) / 2.0 + self.home_adv_goals / 2.0;
        let form_a = (a.scored_avg + h.conceded_avg) / 2.0 - self.home_adv_goals / 2.0;

        let w = (h.matches.min(a.matches) as f64 / FULL_FORM_SAMPLE).clamp(0.0, 1.0);
        (
            clamp_lambda(w * form_h + (1.0 - w) * prior_h),
            clamp_lambda(w * form_a + (1.0 - w) * prior_a),
        )
    }
}

fn clamp_lambda(v: f64) -> f64 {
    v.clamp(LAMBDA_MIN, LAMBDA_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rm(goals_for: u8, goals_against: u8) -> RecentMatch {
        RecentMatch {
            goals_for,
            goals_against,
        }
    }

    #[test]
    fn form_uses_only_the_window() {
        let recent = [rm(3, 0), rm(1, 1), rm(0, 2), rm(5, 5)];
        let f = TeamFormSummary::from_recent(&recent, 3).unwrap();
        assert_eq!(f.matches, 3);
        assert!((f.scored_avg - 4.0 / 3.0).abs() < 1e-12);
        assert!((f.total_goals_avg - 7.0 / 3.0).abs() < 1e-12);
        assert!(TeamFormSummary::from_recent(&[], 5).is_none());
    }

    #[test]
    fn h2h_btts_rate() {
        let meetings = [
            Meeting { home_goals: 1, away_goals: 1 },
            Meeting { home_goals: 2, away_goals: 0 },
            Meeting { home_goals: 3, away_goals: 2 },
            Meeting { home_goals: 0, away_goals: 0 },
        ];
        let h = HeadToHeadSummary::from_meetings(&meetings).unwrap();
        assert!((h.btts_rate - 0.5).abs() < 1e-12);
        assert!((h.total_goals_avg - 2.25).abs() < 1e-12);
    }

    #[test]
    fn lambdas_fall_back_to_prior_without_form() {
        let model = BaselineModel::default();
        let (h, a) = model.lambdas(None, None);
        assert!((h + a - 2.60).abs() < 1e-9);
        assert!(h > a);
    }

    #[test]
    fn strong_home_form_raises_home_rate() {
        let model = BaselineModel::default();
        let home = TeamFormSummary::from_recent(&[rm(3, 0); 8], 8).unwrap();
        let away = TeamFormSummary::from_recent(&[rm(0, 3); 8], 8).unwrap();
        let (h, a) = model.lambdas(Some(&home), Some(&away));
        assert!(h > 2.5);
        assert!(a < 0.5);
    }

    #[test]
    fn small_league_samples_shrink_to_defaults() {
        let fitted = BaselineModel::fit(&[Meeting { home_goals: 6, away_goals: 4 }]);
        assert!(fitted.goals_total_base < 2.70);
        assert!(fitted.goals_total_base > 2.60);
    }
}
