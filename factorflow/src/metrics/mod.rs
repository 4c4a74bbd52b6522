pub mod global_metrics;
pub mod metric;

pub use metric::flush;
pub use metric::register_counter;
pub use metric::register_gauge;
pub use metric::Tag;
