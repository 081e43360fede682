mod record;
mod subject;
mod token;

pub use record::*;
pub use subject::*;
pub use token::*;
