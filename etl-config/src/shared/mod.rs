mod base;
mod batch;
mod destination;
mod sentry;
mod target;

pub use base::*;
pub use batch::*;
pub use destination::*;
pub use sentry::*;
pub use target::*;
