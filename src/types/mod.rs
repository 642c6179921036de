pub mod error;
pub mod header;
pub mod proxy;
pub mod response;
pub mod target;
pub mod timeouts;

pub use error::*;
pub use header::*;
pub use proxy::*;
pub use response::*;
pub use target::*;
pub use timeouts::*;
