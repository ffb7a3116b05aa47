pub mod controller;
pub mod extractor;
pub mod pipeline;
pub mod planner;


pub use controller::HarvestController;
pub use extractor::CommentExtractor;
pub use pipeline::{HarvestPipeline, HarvestRange, HarvestReport};
pub use planner::{plan, window_size};
