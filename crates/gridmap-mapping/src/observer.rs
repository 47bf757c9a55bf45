//! Observer hooks driven by the evaluator.
//!
//! Observers are called synchronously in registration order. Every hook has a
//! no-op default so an observer only implements what it consumes.

use gridmap_core::{EquipmentRef, GridMapResult, MappingVariable, Network};

use crate::timeseries::TimeSeriesTable;

/// One resolved value, announced once the resolver is done with it.
#[derive(Debug, Clone, Copy)]
pub struct MappedValue<'a> {
    pub version: i32,
    pub point: i32,
    /// Empty when the value did not come from a series (resolver output for
    /// a limit-only mapping).
    pub timeseries: &'a str,
    pub equipment: &'a EquipmentRef,
    pub variable: MappingVariable,
    pub value: f64,
}

#[allow(unused_variables)]
pub trait MappingObserver {
    fn start(&mut self, network: &mut Network) -> GridMapResult<()> {
        Ok(())
    }

    fn version_start(&mut self, network: &mut Network, version: i32) -> GridMapResult<()> {
        Ok(())
    }

    fn point_start(
        &mut self,
        network: &mut Network,
        point: i32,
        table: &TimeSeriesTable,
    ) -> GridMapResult<()> {
        Ok(())
    }

    fn value_mapped(&mut self, network: &mut Network, value: &MappedValue<'_>) -> GridMapResult<()> {
        Ok(())
    }

    /// Called once per indexed point after every group has been mapped.
    fn map_point(
        &mut self,
        network: &mut Network,
        version: i32,
        point: usize,
        table: &TimeSeriesTable,
    ) -> GridMapResult<()> {
        Ok(())
    }

    /// `balance` is the constant balance for the base case, 0 otherwise.
    fn point_end(
        &mut self,
        network: &mut Network,
        point: i32,
        table: &TimeSeriesTable,
        balance: f64,
    ) -> GridMapResult<()> {
        Ok(())
    }

    fn version_end(&mut self, network: &mut Network, version: i32) -> GridMapResult<()> {
        Ok(())
    }

    fn end(&mut self, network: &mut Network) -> GridMapResult<()> {
        Ok(())
    }
}

/// Ordered observer list.
pub(crate) struct Observers<'o, 'a> {
    list: &'o mut [&'a mut dyn MappingObserver],
}

impl<'o, 'a> Observers<'o, 'a> {
    pub(crate) fn new(list: &'o mut [&'a mut dyn MappingObserver]) -> Self {
        Self { list }
    }

    pub(crate) fn each(
        &mut self,
        network: &mut Network,
        mut call: impl FnMut(&mut dyn MappingObserver, &mut Network) -> GridMapResult<()>,
    ) -> GridMapResult<()> {
        for observer in self.list.iter_mut() {
            call(&mut **observer, network)?;
        }
        Ok(())
    }
}
