//! ---
//! dnm_section: "11-simulation"
//! dnm_subsection: "module"
//! dnm_type: "source"
//! dnm_scope: "code"
//! dnm_description: "Fixed-order generation pipeline from configuration to validated dataset."
//! dnm_version: "v0.1.0"
//! dnm_owner: "tbd"
//! ---
use std::time::Instant;

use dnm_common::{run_span, GeneratorConfig, ValidationMode};
use dnm_logging::{dnm_info, log_stage_event, LogContext, StageOutcome};

use crate::der::attach_der;
use crate::errors::Result;
use crate::growth;
use crate::network::build_graph;
use crate::placement::place;
use crate::rng::GeneratorRng;
use crate::table::{Dataset, NetworkTables, SeriesTables};
use crate::ties::pair_feeder_tails;
use crate::timeseries::{
    ev_charging_profiles, solar_profiles, synthesize_ami, synthesize_load, synthesize_outages,
    synthesize_weather, WeatherSeries,
};
use crate::topology::build_hierarchy;
use crate::validator::validate_dataset;

/// Drives one generation run. Stages consume the single seeded stream in a
/// fixed order, so the same configuration always yields the same dataset.
#[derive(Debug, Clone)]
pub struct Generator {
    config: GeneratorConfig,
}

impl Generator {
    /// Validate `config` and prepare a run.
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Override the configured validation mode.
    pub fn with_validation(mut self, mode: ValidationMode) -> Self {
        self.config.validation = mode;
        self
    }

    /// Run every stage and the integrity pass. Nothing partial is returned.
    pub fn generate(&self) -> Result<Dataset> {
        let config = &self.config;
        let _run = run_span(config.seed).entered();
        let started = Instant::now();
        let ctx = LogContext::new().with_stage("pipeline").with_seed(config.seed);
        log_stage_event(
            Some(&ctx),
            "pipeline.start",
            "generation started",
            StageOutcome::Success,
        );

        let mut rng = GeneratorRng::new(config.seed);
        let mut hierarchy = build_hierarchy(config, &mut rng)?;
        let placement = place(config, &mut hierarchy, &mut rng)?;
        let ties = pair_feeder_tails(config, &hierarchy.feeders);
        let graph = build_graph(config, &hierarchy, &ties, &mut rng);
        let der = attach_der(config, &mut hierarchy.customers, &mut rng);
        dnm_info!(
            context = ctx,
            "network ready: {} clamped tails, {} clamped transformers, {} clamped customers",
            placement.clamped_feeder_tails,
            placement.clamped_transformers,
            placement.clamped_customers
        );

        let network = NetworkTables {
            substations: hierarchy.substations,
            feeders: hierarchy.feeders,
            transformers: hierarchy.transformers,
            customers: hierarchy.customers,
            switching_devices: hierarchy.devices,
            tie_switches: ties.switches,
            nodes: graph.nodes,
            edges: graph.edges,
        };

        let weather = synthesize_weather(config, &mut rng);
        let view = WeatherSeries::new(&config.horizon, &weather);
        let load = synthesize_load(config, &network.feeders, &network.customers, view, &rng);
        let outages = synthesize_outages(config, &network, view, &mut rng);
        let ami = synthesize_ami(
            config,
            &network.customers,
            &der.solar,
            &der.ev_chargers,
            view,
            &rng,
        );
        let solar_profiles = solar_profiles(config, &weather);
        let ev_profiles = ev_charging_profiles(&rng);
        let growth = growth::project(&config.growth);

        let series = SeriesTables {
            weather,
            load,
            outages,
            ami,
            solar_profiles,
            ev_profiles,
            growth,
        };
        let dataset = Dataset::assemble(config.clone(), network, der, series);
        validate_dataset(&dataset, config.validation)?;

        log_stage_event(
            Some(&ctx),
            "pipeline.complete",
            &format!(
                "{} customers, {} load rows, {} outages in {:.2?}",
                dataset.customers().len(),
                dataset.load().len(),
                dataset.outages().len(),
                started.elapsed()
            ),
            StageOutcome::Success,
        );
        Ok(dataset)
    }
}

/// Convenience wrapper around [`Generator`].
pub fn generate(config: GeneratorConfig) -> Result<Dataset> {
    Generator::new(config)?.generate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GeneratorError;

    #[test]
    fn invalid_configuration_is_rejected_before_any_stage() {
        let mut config = GeneratorConfig::default();
        config.der.solar_rate = 1.5;
        let err = Generator::new(config).unwrap_err();
        assert!(matches!(err, GeneratorError::Configuration(_)));
    }
}
