//! ---
//! dnm_section: "11-simulation"
//! dnm_subsection: "module"
//! dnm_type: "source"
//! dnm_scope: "code"
//! dnm_description: "Cascading coordinate assignment for the built hierarchy."
//! dnm_version: "v0.1.0"
//! dnm_owner: "tbd"
//! ---
//! Each level reads only already-final parent coordinates:
//! substation → feeder tail → transformer → junction/devices → customer.
//! Draw order per feeder: bearing, tail length, transformer fractions and
//! offsets, then customers transformer by transformer.

use std::f64::consts::{FRAC_PI_2, TAU};

use dnm_common::{
    BoundsPolicy, FeederLayout, GeneratorConfig, PlacementConfig, TransformerSpacing,
};
use dnm_logging::{dnm_warn, log_stage_event, LogContext, StageOutcome};

use crate::errors::{GeneratorError, Result};
use crate::geo::{compass_label, distance_miles, haversine_m, GeoPoint, Territory, METERS_PER_MILE};
use crate::model::{round_to, DeviceType, Located};
use crate::rng::GeneratorRng;
use crate::topology::Hierarchy;

const INNER_TERRITORY: f64 = 0.8;
const CELL_JITTER: f64 = 0.35;
const RANDOM_SPACING_MARGIN: f64 = 0.02;
/// Fuses sit this far along the lateral from the trunk junction.
pub const FUSE_LATERAL_FRACTION: f64 = 0.1;
const CARDINAL_BEARINGS_DEG: [f64; 8] = [0.0, 90.0, 180.0, 270.0, 45.0, 135.0, 225.0, 315.0];
/// Share of half the angular gap a radial bearing may wander.
const RADIAL_JITTER_SHARE: f64 = 0.45;

/// Counts of coordinates clamped into the territory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlacementSummary {
    pub clamped_feeder_tails: usize,
    pub clamped_transformers: usize,
    pub clamped_customers: usize,
}

impl PlacementSummary {
    pub fn total(&self) -> usize {
        self.clamped_feeder_tails + self.clamped_transformers + self.clamped_customers
    }
}

/// Applies the run-wide out-of-box policy to every drawn coordinate.
struct BoundsGuard {
    territory: Territory,
    policy: BoundsPolicy,
    max_retries: u32,
}

impl BoundsGuard {
    fn new(config: &GeneratorConfig) -> Self {
        Self {
            territory: Territory::new(config.territory),
            policy: config.placement.bounds_policy,
            max_retries: config.placement.max_retries,
        }
    }

    /// Redraw up to `max_retries` times; returns the point and whether it was clamped.
    fn settle<F>(&self, entity: &str, mut draw: F) -> Result<(GeoPoint, bool)>
    where
        F: FnMut() -> GeoPoint,
    {
        let mut last = draw();
        for _ in 0..self.max_retries {
            if self.territory.contains(last) {
                return Ok((last, false));
            }
            last = draw();
        }
        if self.territory.contains(last) {
            return Ok((last, false));
        }
        match self.policy {
            BoundsPolicy::Clamp => {
                dnm_warn!(
                    context = LogContext::new().with_stage("placement"),
                    "{entity} left the territory after {} retries; clamping",
                    self.max_retries
                );
                Ok((self.territory.clamp(last), true))
            }
            BoundsPolicy::Abort => Err(GeneratorError::placement(
                entity,
                self.max_retries + 1,
                "coordinate outside the service territory",
            )),
        }
    }
}

/// Assign coordinates to every entity of `hierarchy`.
pub fn place(
    config: &GeneratorConfig,
    hierarchy: &mut Hierarchy,
    rng: &mut GeneratorRng,
) -> Result<PlacementSummary> {
    let guard = BoundsGuard::new(config);
    let placement = &config.placement;
    let mut summary = PlacementSummary::default();

    let anchors = substation_anchors(config, hierarchy.substations.len(), rng)?;
    for (substation, anchor) in hierarchy.substations.iter_mut().zip(anchors) {
        substation.latitude = anchor.latitude;
        substation.longitude = anchor.longitude;
    }

    for substation_index in 0..hierarchy.substations.len() {
        let feeders = hierarchy.substation_feeders[substation_index].clone();
        let head = hierarchy.substations[substation_index].location();
        let bearings = feeder_bearings(placement, feeders.len(), rng);
        for (feeder_index, bearing) in feeders.zip(bearings) {
            place_feeder(config, &guard, hierarchy, feeder_index, head, bearing, rng, &mut summary)?;
        }
    }

    let ctx = LogContext::new().with_stage("placement").with_seed(rng.seed());
    let outcome = if summary.total() > 0 {
        StageOutcome::Degraded
    } else {
        StageOutcome::Success
    };
    log_stage_event(
        Some(&ctx),
        "stage.complete",
        &format!(
            "clamped {} feeder tails, {} transformers, {} customers",
            summary.clamped_feeder_tails, summary.clamped_transformers, summary.clamped_customers
        ),
        outcome,
    );
    Ok(summary)
}

/// Coarse grid over the inner territory with bounded jitter; minimum spacing
/// is enforced by rejection sampling per substation.
fn substation_anchors(
    config: &GeneratorConfig,
    count: usize,
    rng: &mut GeneratorRng,
) -> Result<Vec<GeoPoint>> {
    let inner = Territory::new(config.territory).inner(INNER_TERRITORY);
    let mid_lat = (inner.lat_min + inner.lat_max) / 2.0;
    let mid_lon = (inner.lon_min + inner.lon_max) / 2.0;
    let height = haversine_m(
        GeoPoint::new(inner.lat_min, mid_lon),
        GeoPoint::new(inner.lat_max, mid_lon),
    );
    let width = haversine_m(
        GeoPoint::new(mid_lat, inner.lon_min),
        GeoPoint::new(mid_lat, inner.lon_max),
    );
    let cols = ((count as f64 * width / height.max(1.0)).sqrt().ceil() as usize).max(1);
    let rows = count.div_ceil(cols).max(1);
    let cell_lat = (inner.lat_max - inner.lat_min) / rows as f64;
    let cell_lon = (inner.lon_max - inner.lon_min) / cols as f64;
    let cells = rng.sample_indices(rows * cols, count);

    let spacing_miles = config.placement.min_substation_spacing_miles;
    let attempts = config.placement.substation_max_attempts;
    let mut anchors: Vec<GeoPoint> = Vec::with_capacity(count);
    for (ordinal, cell) in cells.into_iter().enumerate() {
        let center = GeoPoint::new(
            inner.lat_min + (cell / cols) as f64 * cell_lat + cell_lat / 2.0,
            inner.lon_min + (cell % cols) as f64 * cell_lon + cell_lon / 2.0,
        );
        let mut accepted = None;
        for _ in 0..attempts {
            let candidate = GeoPoint::new(
                center.latitude + rng.jitter(CELL_JITTER * cell_lat),
                center.longitude + rng.jitter(CELL_JITTER * cell_lon),
            );
            let spaced = anchors.iter().all(|other| {
                distance_miles(config.placement.distance_metric, *other, candidate) >= spacing_miles
            });
            if spaced {
                accepted = Some(candidate);
                break;
            }
        }
        match accepted {
            Some(anchor) => anchors.push(anchor),
            None => {
                return Err(GeneratorError::placement(
                    format!("substation #{}", ordinal + 1),
                    attempts,
                    format!("minimum spacing of {spacing_miles} miles could not be satisfied"),
                ))
            }
        }
    }
    Ok(anchors)
}

/// Initial bearings (radians) for `count` feeders of one substation.
fn feeder_bearings(placement: &PlacementConfig, count: usize, rng: &mut GeneratorRng) -> Vec<f64> {
    match placement.feeder_layout {
        FeederLayout::Cardinal => CARDINAL_BEARINGS_DEG
            .iter()
            .take(count)
            .map(|deg| deg.to_radians())
            .collect(),
        FeederLayout::Radial => {
            let base = rng.uniform(0.0, TAU);
            let gap = TAU / count.max(1) as f64;
            let jitter = placement
                .feeder_angle_jitter_rad
                .min(RADIAL_JITTER_SHARE * gap / 2.0);
            (0..count)
                .map(|k| (base + k as f64 * gap + rng.jitter(jitter)).rem_euclid(TAU))
                .collect()
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn place_feeder(
    config: &GeneratorConfig,
    guard: &BoundsGuard,
    hierarchy: &mut Hierarchy,
    feeder_index: usize,
    head: GeoPoint,
    bearing: f64,
    rng: &mut GeneratorRng,
    summary: &mut PlacementSummary,
) -> Result<()> {
    let placement = &config.placement;
    let feeder_id = hierarchy.feeders[feeder_index].feeder_id.clone();
    let lengths = placement.feeder_length_miles;
    let (tail, tail_clamped) = guard.settle(&feeder_id, || {
        let miles = rng.uniform(lengths.min, lengths.max);
        head.destination(bearing, miles * METERS_PER_MILE)
    })?;
    summary.clamped_feeder_tails += usize::from(tail_clamped);

    let actual_bearing = head.bearing_to(tail);
    {
        let feeder = &mut hierarchy.feeders[feeder_index];
        feeder.head_latitude = head.latitude;
        feeder.head_longitude = head.longitude;
        feeder.tail_latitude = tail.latitude;
        feeder.tail_longitude = tail.longitude;
        feeder.bearing_deg = round_to(actual_bearing.to_degrees(), 1);
        feeder.direction = compass_label(actual_bearing).to_owned();
        feeder.length_miles = round_to(distance_miles(placement.distance_metric, head, tail), 3);
        feeder.tail_clamped = tail_clamped;
    }

    let transformers = hierarchy.feeder_transformers[feeder_index].clone();
    let count = transformers.len();
    let fractions: Vec<f64> = match placement.transformer_spacing {
        TransformerSpacing::Even => (0..count).map(|k| (k as f64 + 0.5) / count as f64).collect(),
        TransformerSpacing::Random => {
            let mut drawn: Vec<f64> = (0..count)
                .map(|_| rng.uniform(RANDOM_SPACING_MARGIN, 1.0 - RANDOM_SPACING_MARGIN))
                .collect();
            drawn.sort_by(f64::total_cmp);
            drawn
        }
    };

    let perpendicular = actual_bearing + FRAC_PI_2;
    let offset = placement.transformer_lateral_offset_m;
    for (transformer_index, fraction) in transformers.clone().zip(fractions) {
        let on_trunk = head.lerp(tail, fraction);
        let transformer_id = hierarchy.transformers[transformer_index].transformer_id.clone();
        let (point, clamped) = guard.settle(&transformer_id, || {
            on_trunk.destination(perpendicular, rng.jitter(offset))
        })?;
        summary.clamped_transformers += usize::from(clamped);
        let transformer = &mut hierarchy.transformers[transformer_index];
        transformer.latitude = point.latitude;
        transformer.longitude = point.longitude;
        transformer.position_fraction = fraction;
        transformer.placement_clamped = clamped;
    }

    for junction_index in hierarchy.feeder_junctions[feeder_index].clone() {
        let span = hierarchy.junctions[junction_index].transformers.clone();
        let first = hierarchy.transformers[span.start].position_fraction;
        let last = hierarchy.transformers[span.end - 1].position_fraction;
        let fraction = (first + last) / 2.0;
        let junction = &mut hierarchy.junctions[junction_index];
        junction.position_fraction = fraction;
        junction.location = head.lerp(tail, fraction);
    }

    let junctions = hierarchy.feeder_junctions[feeder_index].clone();
    for device_index in hierarchy.feeder_devices[feeder_index].clone() {
        let device = &hierarchy.devices[device_index];
        let fraction = match device.device_type {
            DeviceType::Recloser => device.position_fraction,
            DeviceType::Sectionalizer => {
                let ordinal = device.junction_index.unwrap_or(1) as usize;
                let here = junctions.start + ordinal - 1;
                let upstream = if ordinal > 1 {
                    hierarchy.junctions[here - 1].position_fraction
                } else {
                    0.0
                };
                (upstream + hierarchy.junctions[here].position_fraction) / 2.0
            }
            DeviceType::Fuse => continue,
        };
        let point = head.lerp(tail, fraction);
        let device = &mut hierarchy.devices[device_index];
        device.position_fraction = fraction;
        device.latitude = point.latitude;
        device.longitude = point.longitude;
    }

    for transformer_index in transformers.clone() {
        let junction = &hierarchy.junctions[hierarchy.transformer_junction[transformer_index]];
        let fraction = junction.position_fraction;
        let point = junction
            .location
            .lerp(hierarchy.transformers[transformer_index].location(), FUSE_LATERAL_FRACTION);
        let fuse = &mut hierarchy.devices[hierarchy.transformer_fuse[transformer_index]];
        fuse.position_fraction = fraction;
        fuse.latitude = point.latitude;
        fuse.longitude = point.longitude;
    }

    let radius = placement.customer_radius_m;
    for transformer_index in transformers {
        let parent = hierarchy.transformers[transformer_index].location();
        for customer_index in hierarchy.transformer_customers[transformer_index].clone() {
            let customer_id = hierarchy.customers[customer_index].customer_id.clone();
            let (point, clamped) = guard.settle(&customer_id, || {
                let bearing = rng.uniform(0.0, TAU);
                let distance = radius * rng.uniform(0.0, 1.0).sqrt();
                parent.destination(bearing, distance)
            })?;
            summary.clamped_customers += usize::from(clamped);
            let customer = &mut hierarchy.customers[customer_index];
            customer.latitude = point.latitude;
            customer.longitude = point.longitude;
            customer.placement_clamped = clamped;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::build_hierarchy;
    use dnm_common::{CountRange, TerritoryConfig, ValueRange};

    fn small_config() -> GeneratorConfig {
        let mut config = GeneratorConfig::default();
        config.scale.substations = 3;
        config.scale.feeders_per_substation = CountRange::exact(4);
        config.scale.transformers_per_feeder = CountRange::exact(10);
        config.scale.customers_per_transformer = CountRange::exact(3);
        config
    }

    fn placed(config: &GeneratorConfig, seed: u64) -> Result<(Hierarchy, PlacementSummary)> {
        let mut rng = GeneratorRng::new(seed);
        let mut hierarchy = build_hierarchy(config, &mut rng)?;
        let summary = place(config, &mut hierarchy, &mut rng)?;
        Ok((hierarchy, summary))
    }

    #[test]
    fn every_coordinate_lies_in_the_territory() {
        let config = small_config();
        let (h, _) = placed(&config, 42).unwrap();
        let territory = Territory::new(config.territory);
        assert!(h.substations.iter().all(|s| territory.contains(s.location())));
        assert!(h.feeders.iter().all(|f| territory.contains(f.tail())));
        assert!(h.transformers.iter().all(|t| territory.contains(t.location())));
        assert!(h.customers.iter().all(|c| territory.contains(c.location())));
        assert!(h.devices.iter().all(|d| territory.contains(d.location())));
    }

    #[test]
    fn feeder_heads_sit_on_their_substation() {
        let config = small_config();
        let (h, _) = placed(&config, 5).unwrap();
        for (index, feeder) in h.feeders.iter().enumerate() {
            let substation = &h.substations[h.feeder_substation[index]];
            assert_eq!(feeder.head(), substation.location());
        }
    }

    #[test]
    fn customers_stay_within_radius() {
        let config = small_config();
        let (h, _) = placed(&config, 9).unwrap();
        for (index, transformer) in h.transformers.iter().enumerate() {
            for customer in &h.customers[h.transformer_customers[index].clone()] {
                let distance = haversine_m(transformer.location(), customer.location());
                assert!(distance <= config.placement.customer_radius_m + 1e-6);
            }
        }
    }

    #[test]
    fn radial_bearings_do_not_overlap() {
        let mut rng = GeneratorRng::new(3);
        let placement = PlacementConfig::default();
        let mut bearings = feeder_bearings(&placement, 6, &mut rng);
        bearings.sort_by(f64::total_cmp);
        for pair in bearings.windows(2) {
            assert!(pair[1] - pair[0] > 0.0);
        }
    }

    #[test]
    fn impossible_spacing_raises_placement_error() {
        let mut config = small_config();
        config.scale.substations = 12;
        config.placement.min_substation_spacing_miles = 500.0;
        config.placement.substation_max_attempts = 5;
        let err = placed(&config, 1).unwrap_err();
        assert!(matches!(err, GeneratorError::Placement { .. }));
    }

    #[test]
    fn abort_policy_rejects_out_of_box_draws() {
        let mut config = small_config();
        config.territory = TerritoryConfig {
            lat_min: 33.40,
            lat_max: 33.42,
            lon_min: -112.10,
            lon_max: -112.08,
        };
        config.scale.substations = 1;
        config.placement.min_substation_spacing_miles = 0.0;
        config.placement.feeder_length_miles = ValueRange::new(30.0, 40.0);
        config.placement.bounds_policy = BoundsPolicy::Abort;
        let err = placed(&config, 2).unwrap_err();
        assert!(matches!(err, GeneratorError::Placement { .. }));
    }

    #[test]
    fn clamp_policy_flags_entities() {
        let mut config = small_config();
        config.territory = TerritoryConfig {
            lat_min: 33.40,
            lat_max: 33.42,
            lon_min: -112.10,
            lon_max: -112.08,
        };
        config.scale.substations = 1;
        config.placement.min_substation_spacing_miles = 0.0;
        config.placement.feeder_length_miles = ValueRange::new(30.0, 40.0);
        let (h, summary) = placed(&config, 2).unwrap();
        assert_eq!(summary.clamped_feeder_tails, 4);
        assert!(h.feeders.iter().all(|f| f.tail_clamped));
        let territory = Territory::new(config.territory);
        assert!(h.feeders.iter().all(|f| territory.contains(f.tail())));
    }

    #[test]
    fn cardinal_layout_follows_compass_order() {
        let mut config = small_config();
        config.territory = TerritoryConfig {
            lat_min: 30.0,
            lat_max: 37.0,
            lon_min: -116.0,
            lon_max: -108.0,
        };
        config.scale.substations = 1;
        config.scale.feeders_per_substation = CountRange::exact(8);
        config.placement.feeder_layout = FeederLayout::Cardinal;
        let (h, summary) = placed(&config, 4).unwrap();
        assert_eq!(summary.clamped_feeder_tails, 0);
        let labels: Vec<&str> = h.feeders.iter().map(|f| f.direction.as_str()).collect();
        assert_eq!(labels, ["N", "E", "S", "W", "NE", "SE", "SW", "NW"]);
        for feeder in &h.feeders {
            assert_eq!(compass_label(feeder.head().bearing_to(feeder.tail())), feeder.direction);
        }
    }

    #[test]
    fn fuses_sit_on_their_transformer_lateral() {
        let config = small_config();
        let (h, _) = placed(&config, 6).unwrap();
        for (index, transformer) in h.transformers.iter().enumerate() {
            let fuse = &h.devices[h.transformer_fuse[index]];
            assert_eq!(fuse.transformer_id.as_deref(), Some(transformer.transformer_id.as_str()));
            let junction = &h.junctions[h.transformer_junction[index]];
            let expected = junction
                .location
                .lerp(transformer.location(), FUSE_LATERAL_FRACTION);
            assert!(haversine_m(fuse.location(), expected) < 1e-6);
            assert_eq!(fuse.position_fraction, junction.position_fraction);
        }
    }
}
