//! Resource lifecycle engine for the OctoFHIR platform provider
//!
//! - [`Provider`]: plan, create, read, update, delete, import and state
//!   upgrade entry points keyed by resource kind
//! - [`schema`] and [`attr`]: typed attribute model, defaults, validation
//!   and change detection
//! - [`reconcile`]: add/remove diffing for set-valued attributes
//! - [`fhir`]: version-dispatched FHIR store access with JSON-Patch updates
//! - [`resources`]: the resource kinds themselves

pub mod attr;
pub mod credentials;
pub mod data;
pub mod engine;
pub mod error;
pub mod fhir;
pub mod lifecycle;
pub mod migrate;
pub mod observability;
pub mod reconcile;
pub mod resources;
pub mod schema;
pub mod services;
pub mod wait;

pub use attr::{AttrMap, AttrSet, AttrValue};
pub use data::ResourceData;
pub use engine::{Outcome, Provider};
pub use error::{Diagnostic, Diagnostics, ProviderError, Result, Severity};
pub use lifecycle::{OpContext, Resource, Timeouts};
pub use migrate::PersistedState;
pub use schema::{Attribute, Plan, Schema};
