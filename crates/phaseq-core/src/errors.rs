use std::io;
use thiserror::Error;

/// Error type for improperly defined inputs, missing data and convergence problems.
#[derive(Error, Debug)]
pub enum PhaseqError {
    // generic error with custom message
    #[error("{0}")]
    Error(String),

    // errors related to algorithms
    #[error("`{0}` did not converge within the maximum number of iterations.")]
    NotConverged(String),
    #[error("`{0}` encountered illegal values during the iteration.")]
    IterationFailed(String),
    #[error("Iteration resulted in trivial solution.")]
    TrivialSolution,
    #[error(
        "Activity coefficient model is initialized for {0} components while the input specifies {1} components."
    )]
    IncompatibleComponents(usize, usize),
    #[error("Invalid state in {0}: {1} = {2}.")]
    InvalidState(String, String, f64),
    #[error("No phase split according to stability analysis.")]
    NoPhaseSplit,

    // errors related to the request
    #[error("Invalid composition: {0}")]
    InvalidComposition(String),
    #[error("{calculation} requires {expected} components, got {found}.")]
    UnsupportedSystemSize {
        calculation: String,
        expected: String,
        found: usize,
    },
    #[error("The model '{0}' is not known. ['Ideal', 'NRTL', 'UNIQUAC', 'UNIFAC']")]
    UnknownModel(String),

    // errors related to file handling
    #[error(transparent)]
    FileIO(#[from] io::Error),

    // json errors
    #[error(transparent)]
    Serde(#[from] serde_json::Error),

    // errors related to parameter handling
    #[error("The following component(s) were not found: {0}")]
    ComponentsNotFound(String),
    #[error("No {model} parameters for the pair {component1} / {component2}.")]
    ParameterMissing {
        model: String,
        component1: String,
        component2: String,
    },
    #[error("No {property} available for {component}.")]
    MissingProperty { component: String, property: String },
    #[error("Incompatible parameters: {0}")]
    IncompatibleParameters(String),
    #[error("Missing parameters: {0}")]
    MissingParameters(String),
}

impl PhaseqError {
    /// Whether the error describes missing data rather than a malformed request.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            Self::ParameterMissing { .. }
                | Self::MissingProperty { .. }
                | Self::MissingParameters(_)
                | Self::ComponentsNotFound(_)
        )
    }
}

/// Convenience type for `Result<T, PhaseqError>`.
pub type PhaseqResult<T> = Result<T, PhaseqError>;
