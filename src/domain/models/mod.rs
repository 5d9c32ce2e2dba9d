mod backend;
mod error;
mod event;
mod generation;
mod message;
mod report;
mod role;
mod session;
mod store;

pub use backend::*;
pub use error::*;
pub use event::*;
pub use generation::*;
pub use message::*;
pub use report::*;
pub use role::*;
pub use session::*;
pub use store::*;
