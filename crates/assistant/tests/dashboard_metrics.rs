use rust_decimal::Decimal;

use leadflow_assistant::{load_metrics, DashboardResponder, MetricTopic, MetricsSource};
use leadflow_core::domain::property::PropertyId;
use leadflow_core::domain::report::NewReport;
use leadflow_core::store::{Collection, RecordStore, Selection};
use leadflow_db::InMemoryRecordStore;

fn report(property: &str, month: &str, revenue: i64) -> NewReport {
    NewReport {
        property_id: PropertyId(property.to_string()),
        month: month.to_string(),
        revenue: Decimal::new(revenue, 0),
        occupancy_rate: Decimal::new(80, 0),
        maintenance_issues: 0,
        guest_rating: Decimal::new(49, 1),
        number_of_bookings: 10,
    }
}

#[tokio::test]
async fn stored_reports_drive_the_metrics() {
    let store = InMemoryRecordStore::new();
    for (property, month, revenue) in [
        ("p-1", "2026-03", 2_000),
        ("p-1", "2026-01", 1_000),
        ("p-2", "2026-02", 9_000),
        ("p-1", "2026-02", 1_500),
    ] {
        store.insert_report(report(property, month, revenue)).await.expect("insert report");
    }

    let loaded = load_metrics(&store, &PropertyId("p-1".to_string())).await.expect("metrics");

    assert_eq!(loaded.source, MetricsSource::Store);
    assert_eq!(loaded.metrics.report_count, 3);
    assert_eq!(loaded.metrics.total_revenue, Decimal::new(4_500, 0));
    let months =
        loaded.metrics.monthly.iter().map(|point| point.month.as_str()).collect::<Vec<_>>();
    assert_eq!(months, vec!["2026-01", "2026-02", "2026-03"]);

    let answer = DashboardResponder::new().answer("best month?", &loaded.metrics);
    assert_eq!(answer.topic, MetricTopic::BestMonth);
    assert!(answer.answer.contains("2026-03"), "{}", answer.answer);
}

#[tokio::test]
async fn unknown_property_falls_back_to_demo_reports() {
    let store = InMemoryRecordStore::new();

    let loaded = load_metrics(&store, &PropertyId("fresh".to_string())).await.expect("metrics");

    assert_eq!(loaded.source, MetricsSource::Demo);
    assert_eq!(loaded.metrics.report_count, 6);
    assert_eq!(loaded.metrics.total_bookings, 72);
    let stored = store.count(Collection::Report, &Selection::all()).await.expect("count");
    assert_eq!(stored, 0);
}
