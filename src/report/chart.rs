use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::series::DashedLineSeries;

use crate::error::Result;
use crate::metrics::MemoryHistory;

pub const CHART_WIDTH: u32 = 1200;
pub const CHART_HEIGHT: u32 = 600;

/// The y axis always ends on a multiple of this.
const Y_ROUND_TO: f64 = 1000.0;
const GRID_STEP: f64 = 500.0;
const TARGET_X_LABELS: usize = 15;

const PALETTE: [RGBColor; 8] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
    RGBColor(23, 190, 207),
    RGBColor(188, 189, 34),
];
const TOTAL_COLOR: RGBColor = RGBColor(214, 39, 40);

/// Axis geometry shared by every element of the chart.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartScale {
    pub y_max: f64,
    pub points: usize,
}

impl ChartScale {
    pub fn from_history(history: &MemoryHistory) -> Self {
        let peak = history
            .aggregate()
            .into_iter()
            .fold(history.peak_rss(), f64::max);
        Self {
            y_max: y_axis_max(peak),
            points: history.timeline().len(),
        }
    }

    /// Values at which horizontal gridlines are drawn, from 0 to `y_max`.
    pub fn gridlines(&self) -> Vec<f64> {
        let steps = (self.y_max / GRID_STEP).round() as usize;
        (0..=steps).map(|i| i as f64 * GRID_STEP).collect()
    }

    /// Rightmost x coordinate. A single point still gets a unit wide axis.
    pub fn x_span(&self) -> usize {
        self.points.saturating_sub(1).max(1)
    }

    /// Every how many points an x label is printed.
    pub fn x_label_stride(&self) -> usize {
        self.points.div_ceil(TARGET_X_LABELS).max(1)
    }

    pub fn x_label_positions(&self) -> Vec<usize> {
        (0..self.points).step_by(self.x_label_stride()).collect()
    }
}

/// Peak rounded up to the next multiple of 1000. Never below 1000.
pub fn y_axis_max(peak: f64) -> f64 {
    ((peak / Y_ROUND_TO).ceil() * Y_ROUND_TO).max(Y_ROUND_TO)
}

/// Renders the full resolution history as an SVG document.
pub fn render_svg(history: &MemoryHistory) -> Result<String> {
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (CHART_WIDTH, CHART_HEIGHT)).into_drawing_area();
        draw(&root, history)?;
        root.present()?;
    }
    Ok(svg)
}

fn draw(root: &DrawingArea<SVGBackend<'_>, Shift>, history: &MemoryHistory) -> Result<()> {
    let scale = ChartScale::from_history(history);
    let timeline = history.timeline();

    root.fill(&WHITE)?;

    let caption = if history.is_empty() {
        "Build daemon memory (RSS): no samples recorded"
    } else {
        "Build daemon memory (RSS)"
    };

    let mut chart = ChartBuilder::on(root)
        .caption(caption, ("sans-serif", 22))
        .margin(16)
        .x_label_area_size(90)
        .y_label_area_size(70)
        .build_cartesian_2d(
            (0..scale.x_span()).with_key_points(scale.x_label_positions()),
            0.0..scale.y_max,
        )?;

    chart
        .configure_mesh()
        .x_labels(TARGET_X_LABELS + 1)
        .y_labels(scale.gridlines().len())
        .x_label_formatter(&|i: &usize| timeline.get(*i).map(|t| t.to_string()).unwrap_or_default())
        .y_label_formatter(&|v: &f64| format!("{:.0}", v))
        .x_label_style(
            ("sans-serif", 11)
                .into_font()
                .transform(FontTransform::Rotate90),
        )
        .bold_line_style(&BLACK.mix(0.12))
        .x_desc("Elapsed time (HH:MM:SS)")
        .y_desc("RSS (MB)")
        .draw()?;

    if history.is_empty() {
        return Ok(());
    }

    for (idx, (key, series)) in history.series().enumerate() {
        let color = PALETTE[idx % PALETTE.len()];
        let points: Vec<(usize, f64)> = series
            .timestamps()
            .iter()
            .zip(series.rss())
            .filter_map(|(at, rss)| timeline.binary_search(at).ok().map(|x| (x, *rss)))
            .collect();

        chart
            .draw_series(LineSeries::new(points, color.stroke_width(2)))?
            .label(key.to_string())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
    }

    // Drawn last so it sits on top.
    let total: Vec<(usize, f64)> = history.aggregate().into_iter().enumerate().collect();
    chart
        .draw_series(DashedLineSeries::new(total, 10, 6, TOTAL_COLOR.stroke_width(3)))?
        .label("Total")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], TOTAL_COLOR.stroke_width(3)));

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(&WHITE.mix(0.85))
        .border_style(&BLACK)
        .draw()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Starting memory monitor at now\nElapsed_Time | PID | Name | Heap_Used_MB | Heap_Capacity_MB | RSS_MB\n";

    fn history(body: &str) -> MemoryHistory {
        MemoryHistory::parse(&format!("{HEADER}{body}"))
    }

    #[test]
    fn y_axis_rounds_up_to_thousands() {
        assert_eq!(y_axis_max(2300.0), 3000.0);
        assert_eq!(y_axis_max(3000.0), 3000.0);
        assert_eq!(y_axis_max(3000.1), 4000.0);
        assert_eq!(y_axis_max(12.0), 1000.0);
        assert_eq!(y_axis_max(0.0), 1000.0);
    }

    #[test]
    fn gridlines_every_five_hundred() {
        let h = history("00:00:00 | 1 | DaemonA | 1MB | 1MB | 2300.0MB\n");
        let scale = ChartScale::from_history(&h);
        assert_eq!(scale.y_max, 3000.0);
        assert_eq!(
            scale.gridlines(),
            vec![0.0, 500.0, 1000.0, 1500.0, 2000.0, 2500.0, 3000.0]
        );
    }

    #[test]
    fn aggregate_can_set_the_scale() {
        let h = history(
            "00:00:00 | 1 | DaemonA | 1MB | 1MB | 900.0MB\n\
             00:00:00 | 2 | DaemonB | 1MB | 1MB | 900.0MB\n",
        );
        assert_eq!(ChartScale::from_history(&h).y_max, 2000.0);
    }

    #[test]
    fn single_point_has_unit_span() {
        let scale = ChartScale { y_max: 1000.0, points: 1 };
        assert_eq!(scale.x_span(), 1);
        assert_eq!(scale.x_label_positions(), vec![0]);
        assert_eq!(ChartScale { y_max: 1000.0, points: 0 }.x_span(), 1);
        assert_eq!(ChartScale { y_max: 1000.0, points: 10 }.x_span(), 9);
    }

    #[test]
    fn about_fifteen_x_labels() {
        for points in [1, 14, 15, 16, 100, 720, 5000] {
            let scale = ChartScale { y_max: 1000.0, points };
            let labels = scale.x_label_positions().len();
            assert!(labels <= TARGET_X_LABELS, "{points} points gave {labels} labels");
            assert!(labels >= TARGET_X_LABELS.min(points) / 2, "{points} points gave {labels} labels");
        }
        assert_eq!(ChartScale { y_max: 1000.0, points: 100 }.x_label_stride(), 7);
    }

    #[test]
    fn renders_series_and_legend() {
        let h = history(
            "00:00:00 | 101 | DaemonA | 1MB | 1MB | 100.0MB\n\
             00:00:00 | 202 | DaemonB | 1MB | 1MB | 50.0MB\n\
             00:00:05 | 101 | DaemonA | 1MB | 1MB | 150.0MB\n\
             00:00:05 | 202 | DaemonB | 1MB | 1MB | 50.0MB\n\
             00:00:10 | 101 | DaemonA | 1MB | 1MB | 200.0MB\n",
        );
        let svg = render_svg(&h).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.trim_end().ends_with("</svg>"));
        assert!(svg.contains("101-DaemonA"));
        assert!(svg.contains("202-DaemonB"));
        assert!(svg.contains("Total"));
        assert!(svg.contains("00:00:05"));
    }

    #[test]
    fn rendered_gridlines_are_labelled_every_five_hundred() {
        let h = history("00:00:00 | 1 | DaemonA | 1MB | 1MB | 2300.0MB\n");
        let svg = render_svg(&h).unwrap();
        for label in [">500<", ">1500<", ">2500<", ">3000<"] {
            assert!(svg.contains(label), "missing y label {label}");
        }
    }

    #[test]
    fn renders_single_timestamp_and_empty_runs() {
        let single = history("00:00:00 | 101 | DaemonA | 1MB | 1MB | 100.0MB\n");
        assert!(render_svg(&single).unwrap().contains("101-DaemonA"));

        let empty = render_svg(&MemoryHistory::default()).unwrap();
        assert!(empty.contains("no samples recorded"));
    }
}
