mod registry;

pub mod audit;
pub mod context;
pub mod handler;
pub mod openai;
pub mod result;
pub mod secrets;
pub mod transport;

pub use audit::*;
pub use context::*;
pub use handler::*;
pub use registry::*;
pub use result::*;
pub use secrets::*;

pub mod registry_helper;
pub use registry_helper::register_all_handlers;
