use std::{collections::BTreeMap, sync::Arc, time::Duration};

use proptest::prelude::*;
use quanta::Clock;
use spectator::{Id, Meter, PercentileDistributionSummary, Registry, RegistryConfig, Statistic};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[test]
fn type_mismatch_returns_detached_meter() {
    init_tracing();

    let registry = Registry::default();
    registry.counter("requests", Vec::<(String, String)>::new()).increment();

    // The timer is usable but never registered.
    let timer = registry.timer("requests", Vec::<(String, String)>::new());
    timer.record(Duration::from_millis(3));
    assert_eq!(timer.count(), 1);

    assert_eq!(registry.len(), 1);
    assert!(matches!(registry.meters()[0], Meter::Counter(_)));
}

#[test]
fn common_tags_from_environment() {
    let lookup = |key: &str| match key {
        "NETFLIX_PROCESS_NAME" => Some(" worker ".to_string()),
        "TITUS_CONTAINER_NAME" => Some(String::new()),
        _ => None,
    };
    let config = RegistryConfig::new().with_common_tag("nf.app", "www").with_env_tags_from(lookup);
    let registry = Registry::new(config);

    let counter = registry.counter("requests", Vec::<(String, String)>::new());
    assert_eq!(counter.id().to_string(), "requests,nf.app=www,nf.process=worker,statistic=count");
}

#[test]
fn timers_use_the_registry_clock() {
    let (clock, mock) = Clock::mock();
    let registry = Registry::new(RegistryConfig::new().with_clock(clock));

    let timer = registry.timer("work", Vec::<(String, String)>::new());
    timer.time(|| mock.increment(Duration::from_millis(250)));
    assert_eq!(timer.total_time(), 250_000_000);
}

#[test]
fn measurements_report_every_statistic() {
    let registry = Registry::default();
    let summary = registry.distribution_summary("sizes", Vec::<(String, String)>::new());
    summary.record(2);
    summary.record(4);

    let values: BTreeMap<_, _> = registry
        .measurements()
        .into_iter()
        .map(|m| (m.statistic().expect("known statistic"), m.value()))
        .map(|(s, v)| (s.as_str(), v))
        .collect();

    assert_eq!(values.get(Statistic::Count.as_str()), Some(&2.0));
    assert_eq!(values.get(Statistic::TotalAmount.as_str()), Some(&6.0));
    assert_eq!(values.get(Statistic::TotalOfSquares.as_str()), Some(&20.0));
    assert_eq!(values.get(Statistic::Max.as_str()), Some(&4.0));

    // Reading resets the summary.
    assert!(registry.measurements().is_empty());
}

proptest! {
    #[test]
    fn id_display_sorts_tags(
        name in "[a-z.]{1,12}",
        tags in proptest::collection::vec(("[a-z]{2,6}", "[a-z0-9]{1,6}"), 0..5),
    ) {
        let id = Id::new(name.clone(), tags.clone());
        let sorted: BTreeMap<_, _> = tags.into_iter().collect();

        let mut expected = name;
        for (k, v) in &sorted {
            expected.push(',');
            expected.push_str(k);
            expected.push('=');
            expected.push_str(v);
        }
        prop_assert_eq!(id.to_string(), expected);
    }

    #[test]
    fn percentile_counters_count_every_record(amounts in proptest::collection::vec(0i64..1_000_000_000, 1..200)) {
        let registry = Arc::new(Registry::default());
        let summary = PercentileDistributionSummary::new(&registry, Id::from_name("p"));
        for amount in &amounts {
            summary.record(*amount);
        }

        let total: u64 = registry
            .meters()
            .iter()
            .filter_map(|m| match m {
                Meter::Counter(c) => Some(c.count()),
                _ => None,
            })
            .sum();
        prop_assert_eq!(total, amounts.len() as u64);
    }
}
