mod duration;

pub use duration::format_duration;
