pub mod decoder;
pub mod helpers;
pub mod main;
pub mod stream;
pub mod sync;

pub use decoder::*;
pub use main::*;
pub use stream::*;
pub use sync::*;
