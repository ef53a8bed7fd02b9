//! ---
//! dnm_section: "11-simulation"
//! dnm_subsection: "01-bootstrap"
//! dnm_type: "source"
//! dnm_scope: "code"
//! dnm_description: "Generator engine module exports and shared types."
//! dnm_version: "v0.1.0"
//! dnm_owner: "tbd"
//! ---
//! Deterministic generator for a synthetic electric-distribution utility.
//!
//! A run builds the substation → feeder → transformer → customer hierarchy,
//! places it inside a bounded territory, derives the radial network graph
//! with normally-open ties, attaches DER, synthesizes weather, load, outage
//! and meter series, projects growth scenarios, and validates the result.
//! The same configuration and seed always produce the same [`Dataset`].

pub mod catalog;
pub mod der;
pub mod errors;
pub mod geo;
pub mod graph;
pub mod growth;
pub mod model;
pub mod network;
pub mod pipeline;
pub mod placement;
pub mod rng;
pub mod table;
pub mod ties;
pub mod timeseries;
pub mod topology;
pub mod validator;

pub use errors::{GeneratorError, Result};
pub use geo::GeoPoint;
pub use graph::NetworkGraph;
pub use model::*;
pub use pipeline::{generate, Generator};
pub use rng::GeneratorRng;
pub use table::{Dataset, DerTables, NetworkTables, SeriesTables, Table, TableRef};
pub use validator::{audit, validate_dataset, CheckKind, IntegrityReport, Violation};
