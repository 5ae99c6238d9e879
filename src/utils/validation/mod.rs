//! Validation helpers shared by the processor and the shell

pub mod numeric;
pub mod path;

pub use numeric::NumericValidator;
pub use path::{PathValidator, SUPPORTED_INPUT_EXTENSIONS};
