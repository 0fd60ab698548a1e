//! Error types for HEL determination runs

use thiserror::Error;

/// Fatal problems with the run's inputs, detected before raster work
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    #[error("no fields selected")]
    NoFields,

    #[error("there are {0} different tract numbers among the selected fields")]
    MultipleTracts(usize),

    #[error("there are {0} different farm numbers among the selected fields")]
    MultipleFarms(usize),

    #[error("field layer is missing required attribute {0}")]
    MissingFieldAttribute(&'static str),

    #[error("soil layer {layer} is missing required field {field}")]
    MissingSoilField { layer: String, field: &'static str },

    #[error("no soil layers supplied")]
    NoSoilLayers,

    #[error("there are {0} polygon(s) with missing HEL values")]
    NullRating(usize),

    #[error("invalid HEL values in HEL layer: {}", .0.join(", "))]
    InvalidRating(Vec<String>),

    #[error("there is no overlap between the HEL soil layer and the field layer")]
    NoOverlap,

    #[error("cannot determine linear units of {0}")]
    UnknownLinearUnits(String),

    #[error("unknown elevation units {0}")]
    UnknownZUnits(String),

    #[error("horizontal units of {name} must be feet or meters, found {unit}")]
    UnsupportedLinearUnits { name: String, unit: String },

    #[error("{0} must be in a projected coordinate system")]
    NotProjected(String),

    #[error("cell size exceeds limit: {name} has {cell_size} {unit} cells, maximum is {limit} {unit}")]
    CellSizeExceedsLimit {
        name: String,
        cell_size: f64,
        limit: f64,
        unit: String,
    },

    #[error("DEM tiles do not share one coordinate system ({0} vs {1})")]
    MixedTileCrs(String, String),

    #[error("DEM does not overlap the area of interest")]
    DemOutsideAoi,

    #[error("DEM is required to process PHEL values")]
    DemRequired,
}

/// Any failure of a determination run
#[derive(Error, Debug)]
pub enum DeterminationError {
    #[error("input validation failed: {0}")]
    InputValidation(#[from] InputError),

    #[error("raster processing failed: {0}")]
    RasterProcessing(#[from] heldet_core::Error),

    #[error("external service failed: {0}")]
    ExternalService(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeterminationError {
    /// Whether the run stopped on bad input rather than a processing fault
    pub fn is_input_error(&self) -> bool {
        matches!(self, DeterminationError::InputValidation(_))
    }
}

pub type Result<T> = std::result::Result<T, DeterminationError>;
