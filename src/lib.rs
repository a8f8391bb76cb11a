pub mod config;
pub mod error;
pub mod fair_prob;
pub mod fake_slate;
pub mod markets;
pub mod odds_normalize;
pub mod parlay;
pub mod pick_export;
pub mod pick_rankings;
pub mod slate;
pub mod team_form;
