pub mod analyze;
pub mod collect;
pub mod display;

pub use analyze::AnalyzeTask;
pub use collect::CollectTask;
pub use display::DisplayTask;
