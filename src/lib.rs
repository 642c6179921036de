pub mod client;
pub mod proxy;
pub mod stream;
pub mod types;
pub mod utils;

pub use client::Client;
pub use stream::Transport;
pub use types::*;
pub use utils::*;
