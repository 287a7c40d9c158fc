pub mod frame;
pub mod log;
pub mod record;

pub use frame::*;
pub use log::*;
pub use record::*;
