pub mod args;
pub mod logger;
pub mod server;

pub use args::{parse, Args};
pub use logger::init_logging;
pub use server::run_server;
