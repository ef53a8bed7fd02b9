//! ---
//! dnm_section: "11-simulation"
//! dnm_subsection: "module"
//! dnm_type: "source"
//! dnm_scope: "code"
//! dnm_description: "Normally-open tie switch pairing between feeder tails."
//! dnm_version: "v0.1.0"
//! dnm_owner: "tbd"
//! ---
//! Tails are bucketed into a uniform grid whose cell edge covers the maximum
//! tie distance, so every candidate partner lives in the 3x3 neighbourhood.
//! Candidates are matched greedily by ascending distance; each tail is used
//! at most once. Nearest available, not globally optimal.

use std::collections::HashMap;

use dnm_common::{DistanceMetric, GeneratorConfig};
use dnm_logging::{log_stage_event, LogContext, StageOutcome};

use crate::geo::{distance_miles, GeoPoint};
use crate::model::{round_to, Feeder, IdSequence, SwitchState, TieSwitch};

const MILES_PER_DEGREE_LAT: f64 = 69.09;
/// Cells are slightly wider than the search radius so chord/arc differences
/// never push a partner two cells away.
const CELL_MARGIN: f64 = 1.05;

/// Tie switches plus the feeder indices each one joins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TiePlan {
    pub switches: Vec<TieSwitch>,
    pub pairs: Vec<(usize, usize)>,
}

struct TailGrid {
    cell_lat: f64,
    cell_lon: f64,
    cells: HashMap<(i64, i64), Vec<usize>>,
}

impl TailGrid {
    fn new(tails: &[GeoPoint], radius_miles: f64) -> Self {
        let widest_lat = tails
            .iter()
            .map(|p| p.latitude.abs())
            .fold(0.0_f64, f64::max);
        let cell_lat = radius_miles * CELL_MARGIN / MILES_PER_DEGREE_LAT;
        let cell_lon = cell_lat / widest_lat.to_radians().cos().max(0.01);
        let mut grid = Self {
            cell_lat,
            cell_lon,
            cells: HashMap::new(),
        };
        for (index, tail) in tails.iter().enumerate() {
            let key = grid.key(*tail);
            grid.cells.entry(key).or_default().push(index);
        }
        grid
    }

    fn key(&self, point: GeoPoint) -> (i64, i64) {
        (
            (point.latitude / self.cell_lat).floor() as i64,
            (point.longitude / self.cell_lon).floor() as i64,
        )
    }

    fn neighbours(&self, point: GeoPoint) -> impl Iterator<Item = usize> + '_ {
        let (row, col) = self.key(point);
        (-1..=1)
            .flat_map(move |dr| (-1..=1).map(move |dc| (row + dr, col + dc)))
            .filter_map(|key| self.cells.get(&key))
            .flat_map(|bucket| bucket.iter().copied())
    }
}

/// Pair feeder tails into tie switches.
pub fn pair_feeder_tails(config: &GeneratorConfig, feeders: &[Feeder]) -> TiePlan {
    let max_miles = config.network.tie_max_distance_miles;
    let metric = config.placement.distance_metric;
    let tails: Vec<GeoPoint> = feeders.iter().map(Feeder::tail).collect();
    let candidates = candidate_pairs(&tails, max_miles, metric);

    let mut used = vec![false; feeders.len()];
    let mut ids = IdSequence::new("TIE", 4);
    let mut plan = TiePlan::default();
    for (distance, a, b) in candidates {
        if used[a] || used[b] {
            continue;
        }
        used[a] = true;
        used[b] = true;
        let midpoint = tails[a].midpoint(tails[b]);
        plan.switches.push(TieSwitch {
            tie_id: ids.next_id(),
            feeder_a_id: feeders[a].feeder_id.clone(),
            feeder_b_id: feeders[b].feeder_id.clone(),
            latitude: midpoint.latitude,
            longitude: midpoint.longitude,
            separation_miles: round_to(distance, 3),
            normal_state: SwitchState::Open,
        });
        plan.pairs.push((a, b));
    }

    log_stage_event(
        Some(&LogContext::new().with_stage("ties")),
        "stage.complete",
        &format!("paired {} of {} feeder tails", plan.pairs.len() * 2, feeders.len()),
        StageOutcome::Success,
    );
    plan
}

/// All `(distance, a, b)` with `a < b` within range, sorted by distance then ids.
fn candidate_pairs(
    tails: &[GeoPoint],
    max_miles: f64,
    metric: DistanceMetric,
) -> Vec<(f64, usize, usize)> {
    let grid = TailGrid::new(tails, max_miles);
    let mut candidates = Vec::new();
    for (a, tail) in tails.iter().enumerate() {
        for b in grid.neighbours(*tail) {
            if b <= a {
                continue;
            }
            let distance = distance_miles(metric, *tail, tails[b]);
            if distance <= max_miles {
                candidates.push((distance, a, b));
            }
        }
    }
    candidates.sort_by(|x, y| {
        x.0.total_cmp(&y.0)
            .then_with(|| x.1.cmp(&y.1))
            .then_with(|| x.2.cmp(&y.2))
    });
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AssetStatus;

    fn feeder(id: &str, tail: GeoPoint) -> Feeder {
        Feeder {
            feeder_id: id.into(),
            substation_id: "SUB-001".into(),
            name: id.into(),
            voltage_kv: 12.47,
            head_latitude: 33.45,
            head_longitude: -112.07,
            tail_latitude: tail.latitude,
            tail_longitude: tail.longitude,
            bearing_deg: 0.0,
            direction: "N".into(),
            length_miles: 1.0,
            conductor_type: "477_ACSR".into(),
            rated_capacity_mw: 5.0,
            peak_load_mw: 1.0,
            transformer_count: 1,
            customer_count: 1,
            design_customer_limit: 1,
            tail_clamped: false,
            status: AssetStatus::Active,
        }
    }

    #[test]
    fn nearest_tails_pair_first_and_only_once() {
        let feeders = vec![
            feeder("FDR-0001", GeoPoint::new(33.40, -112.00)),
            feeder("FDR-0002", GeoPoint::new(33.401, -112.00)),
            feeder("FDR-0003", GeoPoint::new(33.405, -112.00)),
            feeder("FDR-0004", GeoPoint::new(33.60, -111.90)),
        ];
        let plan = pair_feeder_tails(&GeneratorConfig::default(), &feeders);
        assert_eq!(plan.pairs, vec![(0, 1)]);
        assert_eq!(plan.switches[0].tie_id, "TIE-0001");
        assert_eq!(plan.switches[0].normal_state, SwitchState::Open);
    }

    #[test]
    fn pairs_respect_maximum_distance() {
        let feeders = vec![
            feeder("FDR-0001", GeoPoint::new(33.30, -112.20)),
            feeder("FDR-0002", GeoPoint::new(33.65, -111.90)),
        ];
        let plan = pair_feeder_tails(&GeneratorConfig::default(), &feeders);
        assert!(plan.switches.is_empty());
    }

    #[test]
    fn grid_search_matches_brute_force() {
        let tails: Vec<GeoPoint> = (0..40)
            .map(|i| {
                let f = i as f64;
                GeoPoint::new(33.2 + (f * 0.37).fract() * 0.5, -112.3 + (f * 0.61).fract() * 0.45)
            })
            .collect();
        let fast = candidate_pairs(&tails, 4.0, DistanceMetric::Haversine);
        let mut slow = Vec::new();
        for a in 0..tails.len() {
            for b in a + 1..tails.len() {
                let d = distance_miles(DistanceMetric::Haversine, tails[a], tails[b]);
                if d <= 4.0 {
                    slow.push((d, a, b));
                }
            }
        }
        slow.sort_by(|x, y| x.0.total_cmp(&y.0).then(x.1.cmp(&y.1)).then(x.2.cmp(&y.2)));
        assert_eq!(fast, slow);
    }
}
