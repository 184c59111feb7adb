//! Process discovery and smaps accounting.

pub mod collector;
pub mod namespace;
pub mod resolver;
pub mod runtime;
pub mod selector;
pub mod smaps;

pub use collector::CycleReport;
pub use collector::SmapsCollector;
pub use resolver::ProcessResolver;
pub use resolver::ResolveError;
pub use selector::Selector;
