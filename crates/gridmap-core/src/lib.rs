//! # gridmap-core: network model and variable catalog
//!
//! Shared building blocks for mapping time series onto power-network equipment.
//!
//! ## Core Data Structures
//!
//! - [`Network`] - Equipment container with named variants ([`INITIAL_VARIANT_ID`] first)
//! - [`Equipment`] / [`EquipmentMut`] - One variant per [`EquipmentKind`]; `EquipmentMut::apply`
//!   is the per-kind setter contract
//! - [`EquipmentVariable`] / [`MetrixVariable`] - Attributes a time series can drive
//! - [`GridMapError`] - Error type shared by every gridmap crate
//!
//! ## Variants and limits
//!
//! Variants copy set points, switch states and tap positions. Generator and
//! HVDC limits are shared by every variant; callers that mutate them inside a
//! throw-away variant use [`Network::save_limits`] / [`Network::restore_limits`].
//!
//! ## Modules
//!
//! - [`variable`] - Equipment kinds, variables and the compatibility catalog
//! - [`network`] - Network model, variants and setters
//! - [`io`] - JSON network import and snapshot export

pub mod error;
pub mod io;
pub mod network;
pub mod variable;

pub use error::{GridMapError, GridMapResult};
pub use network::{
    ActivePowerRange, AngleDroopControl, BoundaryLine, ConvertersMode, Equipment, EquipmentMut,
    EquipmentRef, Generator, GeneratorState, HvdcLine, HvdcState, LimitSnapshot, Load,
    LoadDetail, LoadState, Network, PhaseRegulationMode, PhaseShifterState,
    PhaseShiftingTransformer, Switch, DISCONNECTED_VALUE, INITIAL_VARIANT_ID, SWITCH_OPEN,
};
pub use variable::{
    check_compatible, compatible_variables, default_variable, default_variables, resolve,
    resolve_all, EquipmentKind, EquipmentVariable, MappingVariable, MetrixVariable,
};
