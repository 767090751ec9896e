pub mod model;
pub mod practice_import;
pub mod sequence;

pub use model::*;
pub use practice_import::*;
pub use sequence::*;
