pub mod error;
pub mod properties;

pub use error::{BuildError, EngineError, ExecuteError, ModelError, SolverError, UpdateError};
pub use properties::{EngineProperties, Properties};
