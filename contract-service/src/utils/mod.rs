pub mod validation;

pub use validation::{AppJson, IdPath, OptionalJson, ValidatedJson};
