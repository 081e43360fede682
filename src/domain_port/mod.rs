mod clock;
mod entropy;
mod refresh_store;

pub use clock::*;
pub use entropy::*;
pub use refresh_store::*;
