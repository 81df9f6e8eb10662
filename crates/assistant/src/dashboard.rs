use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use leadflow_core::domain::property::PropertyId;
use leadflow_core::domain::report::{Report, ReportId};
use leadflow_core::store::{RecordStore, Selection, SortDirection, StoreError};

use crate::intents::{normalize_text, tokenize};

const DEMO_MONTHS: [&str; 6] = ["2025-07", "2025-08", "2025-09", "2025-10", "2025-11", "2025-12"];
const DEMO_REVENUE_CENTS: [i64; 6] = [420_000, 485_000, 390_000, 310_000, 260_000, 355_000];
const DEMO_OCCUPANCY_TENTHS: [i64; 6] = [825, 910, 765, 640, 555, 710];
const DEMO_RATING_TENTHS: [i64; 6] = [48, 49, 47, 46, 47, 48];
const DEMO_BOOKINGS: [u32; 6] = [14, 17, 12, 10, 8, 11];
const DEMO_MAINTENANCE: [u32; 6] = [1, 0, 2, 1, 0, 1];
// 2025-08-01T00:00:00Z
const DEMO_FIRST_CREATED_AT: i64 = 1_754_006_400;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MonthlyPoint {
    pub month: String,
    pub revenue: Decimal,
    pub occupancy_rate: Decimal,
    pub guest_rating: Decimal,
    pub bookings: u64,
    pub maintenance_issues: u64,
}

/// Aggregate view over a set of monthly reports. Averages are `None` when
/// there are no reports and are rounded to two places otherwise.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PortfolioMetrics {
    pub report_count: usize,
    pub total_revenue: Decimal,
    pub average_occupancy: Option<Decimal>,
    pub average_rating: Option<Decimal>,
    pub total_bookings: u64,
    pub maintenance_issues: u64,
    pub best_month: Option<MonthlyPoint>,
    pub monthly: Vec<MonthlyPoint>,
}

#[derive(Default)]
struct MonthAccumulator {
    reports: usize,
    revenue: Decimal,
    occupancy: Decimal,
    rating: Decimal,
    bookings: u64,
    maintenance_issues: u64,
}

impl PortfolioMetrics {
    pub fn from_reports(reports: &[Report]) -> Self {
        if reports.is_empty() {
            return Self::default();
        }

        let mut by_month: BTreeMap<&str, MonthAccumulator> = BTreeMap::new();
        for report in reports {
            let entry = by_month.entry(report.month.as_str()).or_default();
            entry.reports += 1;
            entry.revenue += report.revenue;
            entry.occupancy += report.occupancy_rate;
            entry.rating += report.guest_rating;
            entry.bookings += u64::from(report.number_of_bookings);
            entry.maintenance_issues += u64::from(report.maintenance_issues);
        }

        let monthly = by_month
            .into_iter()
            .map(|(month, totals)| {
                let count = Decimal::from(totals.reports as u64);
                MonthlyPoint {
                    month: month.to_string(),
                    revenue: totals.revenue,
                    occupancy_rate: (totals.occupancy / count).round_dp(2),
                    guest_rating: (totals.rating / count).round_dp(2),
                    bookings: totals.bookings,
                    maintenance_issues: totals.maintenance_issues,
                }
            })
            .collect::<Vec<_>>();

        // Earliest month wins a revenue tie.
        let mut best_month: Option<&MonthlyPoint> = None;
        for point in &monthly {
            if best_month.map_or(true, |best| point.revenue > best.revenue) {
                best_month = Some(point);
            }
        }
        let best_month = best_month.cloned();

        let count = Decimal::from(reports.len() as u64);
        let occupancy_sum: Decimal = reports.iter().map(|report| report.occupancy_rate).sum();
        let rating_sum: Decimal = reports.iter().map(|report| report.guest_rating).sum();

        Self {
            report_count: reports.len(),
            total_revenue: reports.iter().map(|report| report.revenue).sum(),
            average_occupancy: Some((occupancy_sum / count).round_dp(2)),
            average_rating: Some((rating_sum / count).round_dp(2)),
            total_bookings: reports.iter().map(|report| u64::from(report.number_of_bookings)).sum(),
            maintenance_issues: reports
                .iter()
                .map(|report| u64::from(report.maintenance_issues))
                .sum(),
            best_month,
            monthly,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.report_count == 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricsSource {
    Store,
    Demo,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PropertyMetrics {
    pub property_id: PropertyId,
    pub source: MetricsSource,
    pub metrics: PortfolioMetrics,
}

/// Mocked six months of figures for a property with no stored reports. The
/// same property id always yields the same reports.
pub fn demo_reports(property_id: &PropertyId) -> Vec<Report> {
    (0..DEMO_MONTHS.len())
        .map(|index| {
            let month = DEMO_MONTHS[index];
            let offset_secs = index as i64 * 30 * 86_400;
            let created_at = DateTime::<Utc>::from_timestamp(DEMO_FIRST_CREATED_AT + offset_secs, 0)
                .unwrap_or_default();
            Report {
                id: ReportId(format!("demo-{}-{month}", property_id.0)),
                property_id: property_id.clone(),
                month: month.to_string(),
                revenue: Decimal::new(DEMO_REVENUE_CENTS[index], 2),
                occupancy_rate: Decimal::new(DEMO_OCCUPANCY_TENTHS[index], 1),
                maintenance_issues: DEMO_MAINTENANCE[index],
                guest_rating: Decimal::new(DEMO_RATING_TENTHS[index], 1),
                number_of_bookings: DEMO_BOOKINGS[index],
                created_at,
            }
        })
        .collect()
}

/// Loads the property's reports ordered by month, falling back to the demo
/// figures when the store has none.
pub async fn load_metrics(
    store: &dyn RecordStore,
    property_id: &PropertyId,
) -> Result<PropertyMetrics, StoreError> {
    let selection = Selection::all()
        .filter("property_id", property_id.0.clone())
        .order_by("month", SortDirection::Ascending);
    let reports = store.select_reports(&selection).await?;

    let (source, reports) = if reports.is_empty() {
        (MetricsSource::Demo, demo_reports(property_id))
    } else {
        (MetricsSource::Store, reports)
    };
    debug!(
        event_name = "dashboard.metrics_loaded",
        source = ?source,
        report_count = reports.len(),
        "loaded property metrics"
    );

    Ok(PropertyMetrics {
        property_id: property_id.clone(),
        source,
        metrics: PortfolioMetrics::from_reports(&reports),
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricTopic {
    BestMonth,
    Revenue,
    Occupancy,
    Rating,
    Bookings,
    Maintenance,
    Summary,
    Unknown,
}

impl MetricTopic {
    fn keywords(&self) -> &'static [&'static str] {
        match self {
            Self::BestMonth => &["best", "top", "highest", "strongest"],
            Self::Revenue => &["revenue", "earn", "earned", "earnings", "income", "money", "made"],
            Self::Occupancy => &["occupancy", "occupied", "vacancy", "vacant"],
            Self::Rating => &["rating", "ratings", "review", "reviews", "stars", "score"],
            Self::Bookings => &["booking", "bookings", "reservations", "stays"],
            Self::Maintenance => &["maintenance", "issues", "repairs", "repair", "broken"],
            Self::Summary => &["summary", "overview", "performance", "doing", "overall"],
            Self::Unknown => &[],
        }
    }

    const MATCH_ORDER: [MetricTopic; 7] = [
        Self::BestMonth,
        Self::Revenue,
        Self::Occupancy,
        Self::Rating,
        Self::Bookings,
        Self::Maintenance,
        Self::Summary,
    ];
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DashboardAnswer {
    pub topic: MetricTopic,
    pub answer: String,
}

#[derive(Clone, Debug, Default)]
pub struct DashboardResponder;

impl DashboardResponder {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, text: &str) -> MetricTopic {
        let tokens = tokenize(&normalize_text(text));
        MetricTopic::MATCH_ORDER
            .into_iter()
            .find(|topic| {
                topic.keywords().iter().any(|keyword| tokens.iter().any(|token| token == keyword))
            })
            .unwrap_or(MetricTopic::Unknown)
    }

    pub fn answer(&self, text: &str, metrics: &PortfolioMetrics) -> DashboardAnswer {
        let topic = self.classify(text);
        if metrics.is_empty() {
            return DashboardAnswer {
                topic,
                answer: "There are no reports for this property yet.".to_string(),
            };
        }

        let months = metrics.report_count;
        let answer = match topic {
            MetricTopic::BestMonth => match &metrics.best_month {
                Some(best) => format!(
                    "Your best month was {} with €{:.2} in revenue from {} bookings.",
                    best.month, best.revenue, best.bookings
                ),
                None => "There are no reports for this property yet.".to_string(),
            },
            MetricTopic::Revenue => format!(
                "Your total revenue over the last {months} months was €{:.2}.",
                metrics.total_revenue
            ),
            MetricTopic::Occupancy => format!(
                "Your average occupancy rate is {}%.",
                percent(metrics.average_occupancy)
            ),
            MetricTopic::Rating => format!(
                "Guests rated your property {} out of 5 on average.",
                percent(metrics.average_rating)
            ),
            MetricTopic::Bookings => format!(
                "You received {} bookings over the last {months} months.",
                metrics.total_bookings
            ),
            MetricTopic::Maintenance => format!(
                "{} maintenance issues were reported over the last {months} months.",
                metrics.maintenance_issues
            ),
            MetricTopic::Summary => format!(
                "Over the last {months} months: €{:.2} revenue, {}% average occupancy, \
                 {} bookings, and an average rating of {}.",
                metrics.total_revenue,
                percent(metrics.average_occupancy),
                metrics.total_bookings,
                percent(metrics.average_rating)
            ),
            MetricTopic::Unknown => "I can answer questions about revenue, occupancy, guest \
                ratings, bookings, maintenance, or your best month."
                .to_string(),
        };

        DashboardAnswer { topic, answer }
    }
}

fn percent(value: Option<Decimal>) -> String {
    value.map(|value| format!("{value:.2}")).unwrap_or_else(|| "n/a".to_string())
}
