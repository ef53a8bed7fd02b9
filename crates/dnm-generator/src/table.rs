//! ---
//! dnm_section: "11-simulation"
//! dnm_subsection: "module"
//! dnm_type: "source"
//! dnm_scope: "code"
//! dnm_description: "In-memory tables and the read interface of a finished dataset."
//! dnm_version: "v0.1.0"
//! dnm_owner: "tbd"
//! ---
use std::collections::HashMap;

use dnm_common::GeneratorConfig;
use indexmap::IndexMap;

use crate::model::{
    AmiRecord, Battery, Customer, EvCharger, EvChargingProfile, Feeder, GrowthScenario, Keyed,
    LoadRecord, NetworkEdge, NetworkNode, OutageEvent, SolarInstallation, SolarProfile,
    Substation, SwitchingDevice, TieSwitch, Transformer, WeatherRecord,
};

/// Rows in creation (id) order with lookup by id.
#[derive(Debug, Clone, PartialEq)]
pub struct Table<T> {
    rows: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T: Keyed> Table<T> {
    /// Build the id index. A duplicate id keeps its first position, which the
    /// validator reports as a uniqueness violation.
    pub fn from_rows(rows: Vec<T>) -> Self {
        let mut index = HashMap::with_capacity(rows.len());
        for (position, row) in rows.iter().enumerate() {
            index.entry(row.id().to_owned()).or_insert(position);
        }
        Self { rows, index }
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.index.get(id).map(|position| &self.rows[*position])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn has_duplicate_ids(&self) -> bool {
        self.index.len() != self.rows.len()
    }
}

impl<T> Table<T> {
    pub fn rows(&self) -> &[T] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<'a, T> IntoIterator for &'a Table<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// Borrowed view of one table, used by serializers.
#[derive(Debug, Clone, Copy)]
pub enum TableRef<'a> {
    Substations(&'a [Substation]),
    Feeders(&'a [Feeder]),
    Transformers(&'a [Transformer]),
    Customers(&'a [Customer]),
    SolarInstallations(&'a [SolarInstallation]),
    EvChargers(&'a [EvCharger]),
    Batteries(&'a [Battery]),
    SwitchingDevices(&'a [SwitchingDevice]),
    TieSwitches(&'a [TieSwitch]),
    NetworkNodes(&'a [NetworkNode]),
    NetworkEdges(&'a [NetworkEdge]),
    Weather(&'a [WeatherRecord]),
    Load(&'a [LoadRecord]),
    Outages(&'a [OutageEvent]),
    Ami(&'a [AmiRecord]),
    SolarProfiles(&'a [SolarProfile]),
    EvProfiles(&'a [EvChargingProfile]),
    GrowthScenarios(&'a [GrowthScenario]),
}

impl TableRef<'_> {
    pub fn len(&self) -> usize {
        match self {
            TableRef::Substations(rows) => rows.len(),
            TableRef::Feeders(rows) => rows.len(),
            TableRef::Transformers(rows) => rows.len(),
            TableRef::Customers(rows) => rows.len(),
            TableRef::SolarInstallations(rows) => rows.len(),
            TableRef::EvChargers(rows) => rows.len(),
            TableRef::Batteries(rows) => rows.len(),
            TableRef::SwitchingDevices(rows) => rows.len(),
            TableRef::TieSwitches(rows) => rows.len(),
            TableRef::NetworkNodes(rows) => rows.len(),
            TableRef::NetworkEdges(rows) => rows.len(),
            TableRef::Weather(rows) => rows.len(),
            TableRef::Load(rows) => rows.len(),
            TableRef::Outages(rows) => rows.len(),
            TableRef::Ami(rows) => rows.len(),
            TableRef::SolarProfiles(rows) => rows.len(),
            TableRef::EvProfiles(rows) => rows.len(),
            TableRef::GrowthScenarios(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Static network produced before any time series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkTables {
    pub substations: Vec<Substation>,
    pub feeders: Vec<Feeder>,
    pub transformers: Vec<Transformer>,
    pub customers: Vec<Customer>,
    pub switching_devices: Vec<SwitchingDevice>,
    pub tie_switches: Vec<TieSwitch>,
    pub nodes: Vec<NetworkNode>,
    pub edges: Vec<NetworkEdge>,
}

/// DER assets attached to customers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerTables {
    pub solar: Vec<SolarInstallation>,
    pub ev_chargers: Vec<EvCharger>,
    pub batteries: Vec<Battery>,
}

/// Generated time series and projections.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesTables {
    pub weather: Vec<WeatherRecord>,
    pub load: Vec<LoadRecord>,
    pub outages: Vec<OutageEvent>,
    pub ami: Vec<AmiRecord>,
    pub solar_profiles: Vec<SolarProfile>,
    pub ev_profiles: Vec<EvChargingProfile>,
    pub growth: Vec<GrowthScenario>,
}

/// A complete, validated generation run.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    config: GeneratorConfig,
    substations: Table<Substation>,
    feeders: Table<Feeder>,
    transformers: Table<Transformer>,
    customers: Table<Customer>,
    solar: Table<SolarInstallation>,
    ev_chargers: Table<EvCharger>,
    batteries: Table<Battery>,
    switching_devices: Table<SwitchingDevice>,
    tie_switches: Table<TieSwitch>,
    nodes: Table<NetworkNode>,
    edges: Table<NetworkEdge>,
    weather: Vec<WeatherRecord>,
    load: Vec<LoadRecord>,
    outages: Table<OutageEvent>,
    ami: Vec<AmiRecord>,
    solar_profiles: Vec<SolarProfile>,
    ev_profiles: Vec<EvChargingProfile>,
    growth: Vec<GrowthScenario>,
}

impl Dataset {
    pub fn assemble(
        config: GeneratorConfig,
        network: NetworkTables,
        der: DerTables,
        series: SeriesTables,
    ) -> Self {
        Self {
            config,
            substations: Table::from_rows(network.substations),
            feeders: Table::from_rows(network.feeders),
            transformers: Table::from_rows(network.transformers),
            customers: Table::from_rows(network.customers),
            solar: Table::from_rows(der.solar),
            ev_chargers: Table::from_rows(der.ev_chargers),
            batteries: Table::from_rows(der.batteries),
            switching_devices: Table::from_rows(network.switching_devices),
            tie_switches: Table::from_rows(network.tie_switches),
            nodes: Table::from_rows(network.nodes),
            edges: Table::from_rows(network.edges),
            weather: series.weather,
            load: series.load,
            outages: Table::from_rows(series.outages),
            ami: series.ami,
            solar_profiles: series.solar_profiles,
            ev_profiles: series.ev_profiles,
            growth: series.growth,
        }
    }

    /// Split back into the owned stage outputs.
    pub fn into_parts(self) -> (GeneratorConfig, NetworkTables, DerTables, SeriesTables) {
        let network = NetworkTables {
            substations: self.substations.rows,
            feeders: self.feeders.rows,
            transformers: self.transformers.rows,
            customers: self.customers.rows,
            switching_devices: self.switching_devices.rows,
            tie_switches: self.tie_switches.rows,
            nodes: self.nodes.rows,
            edges: self.edges.rows,
        };
        let der = DerTables {
            solar: self.solar.rows,
            ev_chargers: self.ev_chargers.rows,
            batteries: self.batteries.rows,
        };
        let series = SeriesTables {
            weather: self.weather,
            load: self.load,
            outages: self.outages.rows,
            ami: self.ami,
            solar_profiles: self.solar_profiles,
            ev_profiles: self.ev_profiles,
            growth: self.growth,
        };
        (self.config, network, der, series)
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn seed(&self) -> u64 {
        self.config.seed
    }

    pub fn substations(&self) -> &Table<Substation> {
        &self.substations
    }

    pub fn feeders(&self) -> &Table<Feeder> {
        &self.feeders
    }

    pub fn transformers(&self) -> &Table<Transformer> {
        &self.transformers
    }

    pub fn customers(&self) -> &Table<Customer> {
        &self.customers
    }

    pub fn solar_installations(&self) -> &Table<SolarInstallation> {
        &self.solar
    }

    pub fn ev_chargers(&self) -> &Table<EvCharger> {
        &self.ev_chargers
    }

    pub fn batteries(&self) -> &Table<Battery> {
        &self.batteries
    }

    pub fn switching_devices(&self) -> &Table<SwitchingDevice> {
        &self.switching_devices
    }

    pub fn tie_switches(&self) -> &Table<TieSwitch> {
        &self.tie_switches
    }

    pub fn nodes(&self) -> &Table<NetworkNode> {
        &self.nodes
    }

    pub fn edges(&self) -> &Table<NetworkEdge> {
        &self.edges
    }

    pub fn weather(&self) -> &[WeatherRecord] {
        &self.weather
    }

    pub fn load(&self) -> &[LoadRecord] {
        &self.load
    }

    pub fn outages(&self) -> &Table<OutageEvent> {
        &self.outages
    }

    pub fn ami(&self) -> &[AmiRecord] {
        &self.ami
    }

    pub fn solar_profiles(&self) -> &[SolarProfile] {
        &self.solar_profiles
    }

    pub fn ev_profiles(&self) -> &[EvChargingProfile] {
        &self.ev_profiles
    }

    pub fn growth_scenarios(&self) -> &[GrowthScenario] {
        &self.growth
    }

    /// Every table keyed by its canonical name, in dependency order.
    pub fn tables(&self) -> IndexMap<&'static str, TableRef<'_>> {
        let mut tables = IndexMap::with_capacity(18);
        tables.insert("substations", TableRef::Substations(self.substations.rows()));
        tables.insert("feeders", TableRef::Feeders(self.feeders.rows()));
        tables.insert("transformers", TableRef::Transformers(self.transformers.rows()));
        tables.insert("customers", TableRef::Customers(self.customers.rows()));
        tables.insert(
            "solar_installations",
            TableRef::SolarInstallations(self.solar.rows()),
        );
        tables.insert("ev_chargers", TableRef::EvChargers(self.ev_chargers.rows()));
        tables.insert("batteries", TableRef::Batteries(self.batteries.rows()));
        tables.insert(
            "switching_devices",
            TableRef::SwitchingDevices(self.switching_devices.rows()),
        );
        tables.insert("tie_switches", TableRef::TieSwitches(self.tie_switches.rows()));
        tables.insert("network_nodes", TableRef::NetworkNodes(self.nodes.rows()));
        tables.insert("network_edges", TableRef::NetworkEdges(self.edges.rows()));
        tables.insert("weather", TableRef::Weather(&self.weather));
        tables.insert("load", TableRef::Load(&self.load));
        tables.insert("outages", TableRef::Outages(self.outages.rows()));
        tables.insert("ami", TableRef::Ami(&self.ami));
        tables.insert("solar_profiles", TableRef::SolarProfiles(&self.solar_profiles));
        tables.insert("ev_profiles", TableRef::EvProfiles(&self.ev_profiles));
        tables.insert("growth_scenarios", TableRef::GrowthScenarios(&self.growth));
        tables
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AssetStatus, Substation};

    fn substation(id: &str) -> Substation {
        Substation {
            substation_id: id.into(),
            name: "Test".into(),
            latitude: 33.4,
            longitude: -112.0,
            voltage_high_kv: 69.0,
            voltage_low_kv: 12.47,
            rated_capacity_mva: 28.0,
            peak_load_mva: 10.0,
            power_transformer_count: 1,
            age_years: 10,
            status: AssetStatus::Active,
            feeder_count: 0,
        }
    }

    #[test]
    fn lookup_by_id_and_position() {
        let table = Table::from_rows(vec![substation("SUB-001"), substation("SUB-002")]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.position("SUB-002"), Some(1));
        assert!(table.get("SUB-003").is_none());
        assert!(!table.has_duplicate_ids());
    }

    #[test]
    fn duplicate_ids_are_detectable() {
        let table = Table::from_rows(vec![substation("SUB-001"), substation("SUB-001")]);
        assert!(table.has_duplicate_ids());
        assert_eq!(table.position("SUB-001"), Some(0));
    }
}
