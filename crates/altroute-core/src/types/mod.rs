mod failure;
mod host;
mod record;
mod routing;

pub use failure::*;
pub use host::*;
pub use record::*;
pub use routing::*;
