//! ---
//! dnm_section: "11-simulation"
//! dnm_subsection: "module"
//! dnm_type: "source"
//! dnm_scope: "code"
//! dnm_description: "End-to-end generation scenarios for the engine."
//! dnm_version: "v0.1.0"
//! dnm_owner: "tbd"
//! ---
use std::collections::{HashMap, HashSet};

use chrono::Duration;
use dnm_common::{CountRange, GeneratorConfig, ValidationMode};
use dnm_generator::{
    audit, generate, validate_dataset, CheckKind, Dataset, EdgeKind, Generator, GeneratorError,
    Keyed, Located, NodeType, OutageCause,
};
use statrs::distribution::{Binomial, DiscreteCDF};

fn scenario(seed: u64, substations: u32, feeders: u32, transformers: u32, customers: u32) -> GeneratorConfig {
    let mut config = GeneratorConfig::default();
    config.seed = seed;
    config.scale.substations = substations;
    config.scale.feeders_per_substation = CountRange::new(feeders, feeders);
    config.scale.transformers_per_feeder = CountRange::new(transformers, transformers);
    config.scale.customers_per_transformer = CountRange::new(customers, customers);
    config
}

fn one_week(mut config: GeneratorConfig) -> GeneratorConfig {
    config.horizon.end = config.horizon.start + Duration::days(7);
    config
}

#[test]
fn fixed_scale_is_exact_and_reproducible() -> anyhow::Result<()> {
    let config = scenario(42, 2, 3, 50, 5);
    let first = generate(config.clone())?;
    assert_eq!(first.substations().len(), 2);
    assert_eq!(first.feeders().len(), 6);
    assert_eq!(first.transformers().len(), 300);
    assert_eq!(first.customers().len(), 1_500);

    let second = generate(config)?;
    let ids = |d: &Dataset| {
        d.customers()
            .iter()
            .map(|c| (c.id().to_owned(), c.location()))
            .collect::<Vec<_>>()
    };
    assert_eq!(ids(&first), ids(&second));
    assert_eq!(
        serde_json::to_string(first.edges().rows())?,
        serde_json::to_string(second.edges().rows())?
    );
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn different_seeds_diverge() -> anyhow::Result<()> {
    let a = generate(one_week(scenario(1, 1, 2, 10, 3)))?;
    let b = generate(one_week(scenario(2, 1, 2, 10, 3)))?;
    assert_ne!(a.customers().rows(), b.customers().rows());
    Ok(())
}

#[test]
fn solar_adoption_matches_rate_and_location() -> anyhow::Result<()> {
    let mut config = one_week(scenario(7, 2, 5, 50, 20));
    config.der.solar_rate = 0.12;
    let dataset = generate(config)?;
    assert_eq!(dataset.customers().len(), 10_000);

    let count = dataset.solar_installations().len() as u64;
    let binomial = Binomial::new(0.12, 10_000)?;
    assert!(
        binomial.cdf(count) > 0.0005 && binomial.cdf(count.saturating_sub(1)) < 0.9995,
        "solar count {count} is implausible for p = 0.12"
    );
    for solar in dataset.solar_installations() {
        let owner = dataset
            .customers()
            .get(&solar.customer_id)
            .expect("solar owner exists");
        assert_eq!(owner.location(), solar.location());
        assert!(owner.has_solar);
    }
    Ok(())
}

#[test]
fn full_year_weather_is_hourly_and_heatwaves_are_runs() -> anyhow::Result<()> {
    let config = scenario(42, 1, 2, 10, 2);
    let threshold = config.weather.heatwave_threshold_f;
    let window = config.weather.heatwave_window_hours as usize;
    let dataset = generate(config)?;
    let weather = dataset.weather();
    assert_eq!(weather.len(), 8_760);
    for pair in weather.windows(2) {
        assert_eq!(pair[1].timestamp - pair[0].timestamp, Duration::hours(1));
    }

    let mut index = 0;
    while index < weather.len() {
        if !weather[index].is_heatwave {
            index += 1;
            continue;
        }
        let run = weather[index..]
            .iter()
            .take_while(|r| r.is_heatwave)
            .count();
        assert!(run >= window, "heatwave run of {run} hours at {index}");
        assert!(weather[index..index + run]
            .iter()
            .all(|r| r.temperature_f > threshold));
        index += run;
    }
    Ok(())
}

#[test]
fn outages_and_ties_respect_feeder_scope() -> anyhow::Result<()> {
    let dataset = generate(scenario(42, 2, 3, 50, 5))?;
    for outage in dataset.outages() {
        let feeder = dataset
            .feeders()
            .get(&outage.feeder_id)
            .expect("outage feeder exists");
        assert!(outage.customers_affected > 0, "{} affects nobody", outage.outage_id);
        assert!(
            outage.customers_affected <= feeder.customer_count,
            "{} affects {} of {} customers",
            outage.outage_id,
            outage.customers_affected,
            feeder.customer_count
        );
    }

    let mut tie_uses: HashMap<&str, usize> = HashMap::new();
    for edge in dataset.edges().iter().filter(|e| e.edge_kind == EdgeKind::Tie) {
        for end in [&edge.from_node_id, &edge.to_node_id] {
            let node = dataset.nodes().get(end).expect("tie endpoint exists");
            if node.node_type != NodeType::TieSwitch {
                *tie_uses.entry(end.as_str()).or_default() += 1;
            }
        }
    }
    assert!(tie_uses.values().all(|&uses| uses == 1), "{tie_uses:?}");

    let mut feeders_tied = HashSet::new();
    for tie in dataset.tie_switches() {
        assert_ne!(tie.feeder_a_id, tie.feeder_b_id);
        assert!(feeders_tied.insert(tie.feeder_a_id.as_str()));
        assert!(feeders_tied.insert(tie.feeder_b_id.as_str()));
    }
    Ok(())
}

#[test]
fn weather_outages_overlap_a_severe_hour() -> anyhow::Result<()> {
    let mut config = scenario(11, 2, 3, 20, 3);
    config.outages.daily_rate = 0.2;
    let dataset = generate(config)?;
    assert!(!dataset.outages().is_empty());
    for outage in dataset.outages() {
        assert!(outage.end_time >= outage.start_time);
        assert_eq!(outage.weather_related, outage.cause == OutageCause::Weather);
        if outage.weather_related {
            assert!(dataset.weather().iter().any(|r| {
                r.is_severe() && r.timestamp >= outage.start_time && r.timestamp <= outage.end_time
            }));
        }
    }
    Ok(())
}

#[test]
fn every_foreign_key_resolves() -> anyhow::Result<()> {
    let dataset = generate(one_week(scenario(5, 2, 2, 15, 4)))?;
    for transformer in dataset.transformers() {
        assert!(dataset.feeders().contains(&transformer.feeder_id));
    }
    for customer in dataset.customers() {
        assert!(dataset.transformers().contains(&customer.transformer_id));
    }
    for edge in dataset.edges() {
        assert!(dataset.nodes().contains(&edge.from_node_id));
        assert!(dataset.nodes().contains(&edge.to_node_id));
    }
    for row in dataset.load() {
        assert!(dataset.feeders().contains(&row.feeder_id));
    }
    assert!(audit(&dataset).is_empty());
    Ok(())
}

#[test]
fn injected_violations_are_reported() -> anyhow::Result<()> {
    let dataset = Generator::new(one_week(scenario(3, 1, 2, 10, 3)))?.generate()?;
    let (config, mut network, der, mut series) = dataset.into_parts();

    network.edges[0].to_node_id = "NODE-9999999".into();
    if let Some(customer) = network.customers.first_mut() {
        customer.longitude = config.territory.lon_max + 1.0;
    }
    if let Some(outage) = series.outages.first_mut() {
        outage.end_time = outage.start_time - Duration::minutes(5);
    }
    let has_outage = !series.outages.is_empty();
    let broken = Dataset::assemble(config, network, der, series);

    let report = audit(&broken);
    assert!(report.count(CheckKind::ForeignKey) >= 1);
    assert!(report.count(CheckKind::Spatial) >= 1);
    if has_outage {
        assert!(report.count(CheckKind::OutageCausality) >= 1);
    }

    let err = validate_dataset(&broken, ValidationMode::FailFast).unwrap_err();
    assert_eq!(err.violations().len(), 1);
    assert!(matches!(err, GeneratorError::Integrity(_)));
    Ok(())
}
