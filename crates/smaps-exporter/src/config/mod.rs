pub mod cli;
pub mod daemon;
pub mod resolve;

pub use cli::*;
pub use daemon::*;
pub use resolve::*;
