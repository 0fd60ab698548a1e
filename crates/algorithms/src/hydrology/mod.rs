//! Hydrological analysis algorithms
//!
//! - Fill sinks: remove shallow depressions, bounded by a z-limit
//! - Flow direction: D8 single flow direction with forced edge outflow
//! - Flow length: longest upstream flow path

pub(crate) mod fill_sinks;
pub(crate) mod flow_direction;
mod flow_length;

pub use fill_sinks::{fill_sinks, FillSinks, FillSinksParams};
pub use flow_direction::{flow_direction, FlowDirection, FlowDirectionParams, NODATA_DIRECTION};
pub use flow_length::{flow_length_upstream, FlowLength};
