//! # heldet Determination
//!
//! NRCS Highly Erodible Land determination for a set of CLU fields:
//!
//! - **units**: Z-factor and acre conversion tables
//! - **soils**: soil layer validation and merge
//! - **dem**: DEM validation, clipping, mosaicking and resampling
//! - **erosion**: AH537 LS / erosion-index classification
//! - **decider**: 33.33% / 50-acre field rules
//! - **orchestrator**: the determination run
//! - **output**, **report**: result layers and the text report

pub mod context;
pub mod decider;
pub mod dem;
pub mod erosion;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod output;
pub mod report;
pub mod soils;
pub mod units;

pub use context::{ProcessingContext, ScratchArena, Workspace};
pub use dem::{DemPreparer, ElevationSource, GeoTiffImageService, ImageService, PreparedDem};
pub use erosion::{ErosionIndexEngine, SoilFactorRasters};
pub use error::{DeterminationError, InputError, Result};
pub use model::{CluNumber, FieldDecision, HelRating};
pub use orchestrator::{
    DeterminationInputs, DeterminationOrchestrator, DeterminationOutcome, DeterminationParams,
    DeterminationPath, RunState,
};
pub use soils::SoilLayer;
pub use units::ZUnit;
