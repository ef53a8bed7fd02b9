//! ---
//! dnm_section: "11-simulation"
//! dnm_subsection: "module"
//! dnm_type: "source"
//! dnm_scope: "code"
//! dnm_description: "Top-down construction of the substation/feeder/transformer/customer tree."
//! dnm_version: "v0.1.0"
//! dnm_owner: "tbd"
//! ---
//! Draw order is fixed: substations in id order; within each the feeder
//! count, then per feeder its attributes and transformer count, per
//! transformer its attributes and customer count, per customer its
//! attributes. Coordinates are left at the origin for the placement stage.

use std::ops::Range;

use chrono::Datelike;
use dnm_common::GeneratorConfig;
use dnm_logging::{dnm_debug, log_stage_event, LogContext, StageOutcome};

use crate::catalog;
use crate::errors::Result;
use crate::geo::GeoPoint;
use crate::model::{
    round_to, AssetStatus, Customer, DeviceType, Feeder, IdSequence, Substation, SwitchState,
    SwitchingDevice, Transformer,
};
use crate::rng::GeneratorRng;

const TRANSFORMER_DIVERSITY: f64 = 0.6;
const SUBSTATION_POWER_FACTOR: f64 = 0.95;
const SUBSTATION_RESERVE: f64 = 1.25;
const FUSE_SIZES_A: [f64; 9] = [10.0, 15.0, 25.0, 40.0, 65.0, 100.0, 140.0, 200.0, 300.0];
const SECTIONALIZER_AMPS: f64 = 400.0;

/// Trunk tap point grouping a contiguous run of a feeder's transformers.
#[derive(Debug, Clone, PartialEq)]
pub struct Junction {
    pub feeder: usize,
    /// 1-based position along the trunk.
    pub ordinal: u32,
    pub transformers: Range<usize>,
    pub position_fraction: f64,
    pub location: GeoPoint,
}

/// Entity tables plus the parent/child spans linking them by index.
#[derive(Debug, Clone, Default)]
pub struct Hierarchy {
    pub substations: Vec<Substation>,
    pub feeders: Vec<Feeder>,
    pub transformers: Vec<Transformer>,
    pub customers: Vec<Customer>,
    pub devices: Vec<SwitchingDevice>,
    pub junctions: Vec<Junction>,
    pub feeder_substation: Vec<usize>,
    pub substation_feeders: Vec<Range<usize>>,
    pub feeder_transformers: Vec<Range<usize>>,
    pub feeder_junctions: Vec<Range<usize>>,
    pub feeder_devices: Vec<Range<usize>>,
    pub transformer_customers: Vec<Range<usize>>,
    /// Device index of the fuse protecting each transformer lateral.
    pub transformer_fuse: Vec<usize>,
    /// Junction index each transformer hangs off.
    pub transformer_junction: Vec<usize>,
}

struct Sequences {
    substations: IdSequence,
    feeders: IdSequence,
    transformers: IdSequence,
    customers: IdSequence,
    reclosers: IdSequence,
    sectionalizers: IdSequence,
    fuses: IdSequence,
}

impl Default for Sequences {
    fn default() -> Self {
        Self {
            substations: IdSequence::new("SUB", 3),
            feeders: IdSequence::new("FDR", 4),
            transformers: IdSequence::new("XFMR", 6),
            customers: IdSequence::new("CUST", 7),
            reclosers: IdSequence::new("REC", 5),
            sectionalizers: IdSequence::new("SEC", 5),
            fuses: IdSequence::new("FUSE", 6),
        }
    }
}

/// Build the static hierarchy with every derived aggregate populated.
pub fn build_hierarchy(config: &GeneratorConfig, rng: &mut GeneratorRng) -> Result<Hierarchy> {
    config.validate()?;
    let mut builder = TopologyBuilder {
        config,
        reference_year: config.horizon.start.year(),
        ids: Sequences::default(),
        out: Hierarchy::default(),
    };
    for index in 0..config.scale.substations as usize {
        builder.substation(index, rng);
    }
    let ctx = LogContext::new().with_stage("topology").with_seed(rng.seed());
    log_stage_event(
        Some(&ctx),
        "stage.complete",
        &format!(
            "{} substations, {} feeders, {} transformers, {} customers, {} devices",
            builder.out.substations.len(),
            builder.out.feeders.len(),
            builder.out.transformers.len(),
            builder.out.customers.len(),
            builder.out.devices.len()
        ),
        StageOutcome::Success,
    );
    Ok(builder.out)
}

struct TopologyBuilder<'a> {
    config: &'a GeneratorConfig,
    reference_year: i32,
    ids: Sequences,
    out: Hierarchy,
}

impl TopologyBuilder<'_> {
    fn substation(&mut self, index: usize, rng: &mut GeneratorRng) {
        let base_name = catalog::SUBSTATION_NAMES[index % catalog::SUBSTATION_NAMES.len()];
        let name = match index / catalog::SUBSTATION_NAMES.len() {
            0 => base_name.to_owned(),
            cycle => format!("{base_name} {}", cycle + 1),
        };
        let voltage_high_kv = *rng.pick(&catalog::HIGH_VOLTAGES_KV);
        let voltage_low_kv = *rng.pick(&catalog::FEEDER_VOLTAGES_KV);
        let unit_mva = *rng.pick(&catalog::POWER_TRANSFORMER_MVA);
        let base_units = rng.between(1, 3);
        let age_years = rng.between(5, 60);
        let status = if rng.chance(0.05) {
            AssetStatus::Maintenance
        } else {
            AssetStatus::Active
        };
        let substation_id = self.ids.substations.next_id();
        dnm_debug!(
            context = LogContext::new()
                .with_stage("topology")
                .with_substation(&substation_id),
            "building substation {name}"
        );

        let substation_index = self.out.substations.len();
        self.out.substations.push(Substation {
            substation_id,
            name,
            latitude: 0.0,
            longitude: 0.0,
            voltage_high_kv,
            voltage_low_kv,
            rated_capacity_mva: 0.0,
            peak_load_mva: 0.0,
            power_transformer_count: base_units,
            age_years,
            status,
            feeder_count: 0,
        });

        let range = self.config.scale.feeders_per_substation;
        let feeder_count = rng.between(range.min, range.max);
        let first_feeder = self.out.feeders.len();
        for ordinal in 1..=feeder_count {
            self.feeder(substation_index, ordinal, rng);
        }
        let feeders = first_feeder..self.out.feeders.len();
        self.out.substation_feeders.push(feeders.clone());

        let peak_mw: f64 = self.out.feeders[feeders.clone()]
            .iter()
            .map(|feeder| feeder.peak_load_mw)
            .sum();
        let peak_mva = round_to(peak_mw / SUBSTATION_POWER_FACTOR, 3);
        let needed_units = (peak_mva * SUBSTATION_RESERVE / unit_mva).ceil() as u32;
        let units = base_units.max(needed_units);
        let substation = &mut self.out.substations[substation_index];
        substation.feeder_count = feeders.len() as u32;
        substation.peak_load_mva = peak_mva;
        substation.power_transformer_count = units;
        substation.rated_capacity_mva = f64::from(units) * unit_mva;
    }

    fn feeder(&mut self, substation_index: usize, ordinal: u32, rng: &mut GeneratorRng) {
        let substation = &self.out.substations[substation_index];
        let substation_id = substation.substation_id.clone();
        let name = format!("{} Fdr {ordinal}", substation.name);
        let voltage_kv = substation.voltage_low_kv;
        let conductor_type = (*rng.pick(&catalog::TRUNK_OVERHEAD)).to_owned();
        let range = self.config.scale.transformers_per_feeder;
        let transformer_count = rng.between(range.min, range.max);

        let feeder_index = self.out.feeders.len();
        let feeder_id = self.ids.feeders.next_id();
        self.out.feeder_substation.push(substation_index);
        self.out.feeders.push(Feeder {
            feeder_id,
            substation_id,
            name,
            voltage_kv,
            head_latitude: 0.0,
            head_longitude: 0.0,
            tail_latitude: 0.0,
            tail_longitude: 0.0,
            bearing_deg: 0.0,
            direction: String::new(),
            length_miles: 0.0,
            conductor_type,
            rated_capacity_mw: 0.0,
            peak_load_mw: 0.0,
            transformer_count: 0,
            customer_count: 0,
            design_customer_limit: 0,
            tail_clamped: false,
            status: AssetStatus::Active,
        });

        let first_transformer = self.out.transformers.len();
        for _ in 0..transformer_count {
            self.transformer(feeder_index, rng);
        }
        let transformers = first_transformer..self.out.transformers.len();
        self.out.feeder_transformers.push(transformers.clone());
        self.plan_junctions(feeder_index, transformers.clone());
        self.devices(feeder_index, transformers.clone());

        let customers = self.out.transformer_customers[transformers.start].start
            ..self.out.transformer_customers[transformers.end - 1].end;
        let demand_kw: f64 = self.out.customers[customers.clone()]
            .iter()
            .map(|customer| customer.contracted_demand_kw)
            .sum();
        let network = &self.config.network;
        let peak_mw = round_to(network.diversity_factor * demand_kw / 1_000.0, 3);
        let rating_mw = (peak_mw / network.target_utilization * 10.0).ceil() / 10.0;
        let per_transformer_max = self.config.scale.customers_per_transformer.max;

        let feeder = &mut self.out.feeders[feeder_index];
        feeder.transformer_count = transformers.len() as u32;
        feeder.customer_count = customers.len() as u32;
        feeder.design_customer_limit = transformers.len() as u32 * per_transformer_max;
        feeder.peak_load_mw = peak_mw;
        feeder.rated_capacity_mw = rating_mw.max(network.min_feeder_rating_mw);
    }

    fn transformer(&mut self, feeder_index: usize, rng: &mut GeneratorRng) {
        let feeder = &self.out.feeders[feeder_index];
        let feeder_id = feeder.feeder_id.clone();
        let substation_id = feeder.substation_id.clone();
        let primary_voltage_kv = feeder.voltage_kv;

        let phase = (*rng.pick(&catalog::PHASES)).to_owned();
        let secondary_voltage_v = *rng.pick(&catalog::SECONDARY_VOLTAGES_V);
        let manufacturer = (*rng.pick(&catalog::MANUFACTURERS)).to_owned();
        let age_years = rng.between(1, 45);
        let status = if rng.chance(0.02) {
            AssetStatus::Maintenance
        } else {
            AssetStatus::Active
        };
        let (health_index, condition_score) = if self.config.network.transformer_health {
            let age = f64::from(age_years);
            let health = (5.0 - age / 11.25 + rng.normal(0.0, 0.35)).clamp(1.0, 5.0);
            let condition = (100.0 - 1.7 * age + rng.normal(0.0, 6.0)).clamp(0.0, 100.0);
            (Some(round_to(health, 1)), Some(round_to(condition, 1)))
        } else {
            (None, None)
        };
        let range = self.config.scale.customers_per_transformer;
        let customer_count = rng.between(range.min, range.max);

        let transformer_index = self.out.transformers.len();
        let transformer_id = self.ids.transformers.next_id();
        self.out.transformers.push(Transformer {
            transformer_id,
            feeder_id,
            substation_id,
            latitude: 0.0,
            longitude: 0.0,
            position_fraction: 0.0,
            rated_kva: 0.0,
            phase,
            primary_voltage_kv,
            secondary_voltage_v,
            manufacturer,
            install_year: self.reference_year - age_years as i32,
            age_years,
            health_index,
            condition_score,
            status,
            placement_clamped: false,
            customer_count: 0,
        });

        let first_customer = self.out.customers.len();
        for _ in 0..customer_count {
            self.customer(transformer_index, rng);
        }
        let customers = first_customer..self.out.customers.len();
        let demand_kw: f64 = self.out.customers[customers.clone()]
            .iter()
            .map(|customer| customer.contracted_demand_kw)
            .sum();
        self.out.transformer_customers.push(customers.clone());

        let transformer = &mut self.out.transformers[transformer_index];
        transformer.customer_count = customers.len() as u32;
        transformer.rated_kva =
            catalog::transformer_size(demand_kw * TRANSFORMER_DIVERSITY / SUBSTATION_POWER_FACTOR);
    }

    fn customer(&mut self, transformer_index: usize, rng: &mut GeneratorRng) {
        let transformer = &self.out.transformers[transformer_index];
        let customer_type = *rng.weighted(&catalog::CUSTOMER_MIX);
        let rate_class = rng
            .choose(catalog::rate_classes(customer_type))
            .copied()
            .unwrap_or("GEN")
            .to_owned();
        let (low, high) = catalog::demand_range_kw(customer_type);
        let contracted_demand_kw = round_to(rng.uniform(low, high), 1);
        let customer = Customer {
            customer_id: self.ids.customers.next_id(),
            transformer_id: transformer.transformer_id.clone(),
            feeder_id: transformer.feeder_id.clone(),
            substation_id: transformer.substation_id.clone(),
            customer_type,
            rate_class,
            contracted_demand_kw,
            latitude: 0.0,
            longitude: 0.0,
            has_solar: false,
            has_ev: false,
            has_battery: false,
            placement_clamped: false,
        };
        self.out.customers.push(customer);
    }

    /// Split the feeder's transformers into at most `junctions_per_feeder`
    /// contiguous groups, one junction each.
    fn plan_junctions(&mut self, feeder_index: usize, transformers: Range<usize>) {
        let count = transformers.len();
        let groups = count.min(self.config.network.junctions_per_feeder as usize);
        let first_junction = self.out.junctions.len();
        for group in 0..groups {
            let start = transformers.start + count * group / groups;
            let end = transformers.start + count * (group + 1) / groups;
            let junction_index = self.out.junctions.len();
            self.out.transformer_junction.extend((start..end).map(|_| junction_index));
            self.out.junctions.push(Junction {
                feeder: feeder_index,
                ordinal: group as u32 + 1,
                transformers: start..end,
                position_fraction: 0.0,
                location: GeoPoint::new(0.0, 0.0),
            });
        }
        self.out
            .feeder_junctions
            .push(first_junction..self.out.junctions.len());
    }

    /// Reclosers at the configured trunk fractions, sectionalizers at every
    /// Nth junction, one fuse per transformer lateral.
    fn devices(&mut self, feeder_index: usize, transformers: Range<usize>) {
        let feeder = &self.out.feeders[feeder_index];
        let feeder_id = feeder.feeder_id.clone();
        let substation_id = feeder.substation_id.clone();
        let voltage_kv = feeder.voltage_kv;
        let trunk_amps = catalog::conductor(&feeder.conductor_type)
            .map(|spec| spec.ampacity)
            .unwrap_or(560.0);
        let recloser_amps = if trunk_amps > 600.0 { 800.0 } else { 560.0 };
        let first_device = self.out.devices.len();

        let mut fractions = self.config.network.recloser_fractions.clone();
        fractions.sort_by(f64::total_cmp);
        for fraction in fractions {
            let device = self.device(
                DeviceType::Recloser,
                &feeder_id,
                &substation_id,
                fraction,
                None,
                None,
                recloser_amps,
            );
            self.out.devices.push(device);
        }

        let every = self.config.network.sectionalizer_every;
        let junctions = self.out.feeder_junctions[feeder_index].clone();
        for junction in junctions {
            let ordinal = self.out.junctions[junction].ordinal;
            if ordinal % every == 0 {
                let device = self.device(
                    DeviceType::Sectionalizer,
                    &feeder_id,
                    &substation_id,
                    0.0,
                    None,
                    Some(ordinal),
                    SECTIONALIZER_AMPS,
                );
                self.out.devices.push(device);
            }
        }

        for transformer in transformers {
            let kva = self.out.transformers[transformer].rated_kva;
            let full_load_amps = kva / (voltage_kv * 3f64.sqrt());
            let fuse_amps = FUSE_SIZES_A
                .iter()
                .copied()
                .find(|size| *size >= 1.5 * full_load_amps)
                .unwrap_or(FUSE_SIZES_A[FUSE_SIZES_A.len() - 1]);
            let junction = self.out.transformer_junction[transformer];
            let device = self.device(
                DeviceType::Fuse,
                &feeder_id,
                &substation_id,
                0.0,
                Some(self.out.transformers[transformer].transformer_id.clone()),
                Some(self.out.junctions[junction].ordinal),
                fuse_amps,
            );
            self.out.transformer_fuse.push(self.out.devices.len());
            self.out.devices.push(device);
        }
        self.out
            .feeder_devices
            .push(first_device..self.out.devices.len());
    }

    #[allow(clippy::too_many_arguments)]
    fn device(
        &mut self,
        device_type: DeviceType,
        feeder_id: &str,
        substation_id: &str,
        position_fraction: f64,
        transformer_id: Option<String>,
        junction_index: Option<u32>,
        rated_amps: f64,
    ) -> SwitchingDevice {
        let device_id = match device_type {
            DeviceType::Recloser => self.ids.reclosers.next_id(),
            DeviceType::Sectionalizer => self.ids.sectionalizers.next_id(),
            DeviceType::Fuse => self.ids.fuses.next_id(),
        };
        SwitchingDevice {
            device_id,
            device_type,
            feeder_id: feeder_id.to_owned(),
            substation_id: substation_id.to_owned(),
            latitude: 0.0,
            longitude: 0.0,
            position_fraction,
            transformer_id,
            junction_index,
            rated_amps,
            normal_state: SwitchState::Closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GeneratorError;
    use dnm_common::CountRange;

    fn config(subs: u32, feeders: u32, transformers: u32, customers: u32) -> GeneratorConfig {
        let mut config = GeneratorConfig::default();
        config.scale.substations = subs;
        config.scale.feeders_per_substation = CountRange::exact(feeders);
        config.scale.transformers_per_feeder = CountRange::exact(transformers);
        config.scale.customers_per_transformer = CountRange::exact(customers);
        config
    }

    #[test]
    fn exact_ranges_produce_exact_counts() {
        let config = config(2, 3, 50, 5);
        let hierarchy = build_hierarchy(&config, &mut GeneratorRng::new(42)).unwrap();
        assert_eq!(hierarchy.substations.len(), 2);
        assert_eq!(hierarchy.feeders.len(), 6);
        assert_eq!(hierarchy.transformers.len(), 300);
        assert_eq!(hierarchy.customers.len(), 1_500);
        assert_eq!(hierarchy.transformer_fuse.len(), 300);
    }

    #[test]
    fn zero_transformers_per_feeder_is_rejected() {
        let config = config(1, 2, 0, 3);
        let err = build_hierarchy(&config, &mut GeneratorRng::new(1)).unwrap_err();
        assert!(matches!(err, GeneratorError::Configuration(_)));
    }

    #[test]
    fn derived_aggregates_match_children() {
        let mut config = config(3, 2, 12, 4);
        config.scale.customers_per_transformer = CountRange::new(1, 8);
        let h = build_hierarchy(&config, &mut GeneratorRng::new(7)).unwrap();
        for (index, feeder) in h.feeders.iter().enumerate() {
            let transformers = &h.transformers[h.feeder_transformers[index].clone()];
            let customers: u32 = transformers.iter().map(|t| t.customer_count).sum();
            assert_eq!(feeder.customer_count, customers);
            assert!(feeder.customer_count <= feeder.design_customer_limit);
            assert!(feeder.peak_load_mw <= feeder.rated_capacity_mw);
        }
        for substation in &h.substations {
            assert!(substation.peak_load_mva <= substation.rated_capacity_mva);
            assert_eq!(substation.feeder_count, 2);
        }
    }

    #[test]
    fn junction_groups_cover_every_transformer_once() {
        let config = config(1, 1, 20, 1);
        let h = build_hierarchy(&config, &mut GeneratorRng::new(3)).unwrap();
        let covered: usize = h.junctions.iter().map(|j| j.transformers.len()).sum();
        assert_eq!(covered, 20);
        assert_eq!(h.junctions.len(), 8);
        let sectionalizers = h
            .devices
            .iter()
            .filter(|d| d.device_type == DeviceType::Sectionalizer)
            .count();
        assert_eq!(sectionalizers, 2);
        let reclosers = h
            .devices
            .iter()
            .filter(|d| d.device_type == DeviceType::Recloser)
            .count();
        assert_eq!(reclosers, 2);
    }
}
