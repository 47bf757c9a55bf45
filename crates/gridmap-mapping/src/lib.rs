//! Time-series to equipment mapping.
//!
//! A [`MappingConfig`] is resolved against a network and a [`TimeSeriesTable`]
//! into a [`MappingIndex`]. The [`TimeSeriesMapper`] then walks every version
//! and point, distributes series values over their equipment, resolves limit
//! violations and announces the result to [`MappingObserver`]s.

pub mod balance;
pub mod basecase;
pub mod config;
pub mod evaluator;
pub mod index;
pub mod log;
pub mod observer;
mod resolver;
pub mod synthesis;
pub mod timeseries;
pub mod values;
pub mod writer;

pub use balance::{BalanceStats, BalanceSummary, BALANCE_FILE_NAME};
pub use config::{
    load_config_from_path, load_parameters_from_path, ContingencySpec, DirectMappingSpec,
    DistributionKeySpec, EquipmentEntry, MapperParameters, MappingConfig, MappingSpec, PointRange,
    ResolutionPolicy,
};
pub use evaluator::{map_network, RunSummary, TimeSeriesMapper};
pub use index::{MappingGroup, MappingIndex, MappingKey, UnmappedEquipments};
pub use log::{LogEntry, LogLevel, MappingLog, BASE_CASE_POINT, SYNTHESIS_POINT};
pub use observer::{MappedValue, MappingObserver};
pub use synthesis::VersionSynthesis;
pub use timeseries::{load_timeseries_csv, TimeSeriesTable};
pub use values::EquipmentValuesWriter;
pub use writer::{delta_file_name, DeltaRecord, DeltaWriter, SnapshotExport, SnapshotWriter};
