/// Render graph module - declarative passes compiled to per-frame submissions

pub mod pass;
pub mod runtime_pass;
pub mod render_graph;

pub use pass::*;
pub use runtime_pass::RecordState;
pub use render_graph::*;
