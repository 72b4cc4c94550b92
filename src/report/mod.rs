pub mod chart;
pub mod diagram;
pub mod summary;

pub use chart::{render_svg, ChartScale};
pub use diagram::{sanitize_id, Flowchart};
pub use summary::{append_to_sink, compose_report, ReportStats, SeriesStats};
