//! Canned-answer assistants shown next to the guided flows.
//!
//! - `intents` maps free-text visitor questions to FAQ answers by keyword
//!   score and points at the guided flow that can take it further.
//! - `dashboard` aggregates monthly property reports into portfolio metrics
//!   and answers simple metric questions from them. When a property has no
//!   stored reports, deterministic demo figures are used instead.
//!
//! Nothing here calls a language model. Every answer is picked from fixed
//! text and filled with computed figures.

pub mod dashboard;
pub mod intents;

pub use dashboard::{
    demo_reports, load_metrics, DashboardAnswer, DashboardResponder, MetricTopic, MetricsSource,
    MonthlyPoint, PortfolioMetrics, PropertyMetrics,
};
pub use intents::{Intent, IntentReply, IntentResponder, IntentRule};
