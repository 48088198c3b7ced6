//! phaseq - Activity coefficient models and phase equilibria of liquid mixtures.
//!
//! # Example: liquid-liquid flash with NRTL
//!
//! ```
//! # use phaseq_core::PhaseqError;
//! use phaseq::{ComponentStore, EquilibriumKind, ModelKind};
//! use phaseq_core::{EquilibriumSystem, PhaseEquilibrium, SolverOptions};
//! use quantity::KELVIN;
//! use nalgebra::dvector;
//!
//! let store = ComponentStore::bundled()?;
//! let components = store.components(&["Water", "1,1,2-Trichloroethane", "Acetone"])?;
//! let setup = store.model(ModelKind::Nrtl, EquilibriumKind::Lle, &components, Some(298.15))?;
//! let system = EquilibriumSystem::new(setup.model, components)?;
//!
//! let feed = dvector![0.3, 0.4, 0.3];
//! let options = SolverOptions::default();
//! let lle = PhaseEquilibrium::lle_flash(&system, 298.15 * KELVIN, &feed, None, options)?;
//! assert!(lle.two_phase);
//! # Ok::<(), PhaseqError>(())
//! ```

#![warn(clippy::all)]
#![warn(clippy::allow_attributes)]

pub mod advisory;
pub mod calculation;
pub mod ideal;
mod model;
pub mod nrtl;
mod store;
pub mod unifac;
pub mod uniquac;

pub use advisory::{Recommendation, Strategy, recommend};
pub use calculation::{Calculation, EquilibriumRequest, Response, calculate};
pub use model::{ActivityCoefficientModel, ModelKind};
pub use store::{ComponentStore, EquilibriumKind, ModelSetup, ParameterSet};

pub mod core {
    //! Re-export of all functionalities in [phaseq_core].
    pub use phaseq_core::*;
}
