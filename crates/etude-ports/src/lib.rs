pub mod midi;
pub mod storage;
pub mod tempo;
pub mod types;

pub use midi::*;
pub use storage::*;
pub use tempo::*;
pub use types::*;
