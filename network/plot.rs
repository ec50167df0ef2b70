//! Terminal charts rendered to plain text.
//!
//! Widgets are drawn into an off-screen buffer and flattened to a string, so a chart can
//! be printed, logged or written to a file without taking over the terminal.

use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::{Color, Style};
use ratatui::symbols;
use ratatui::text::Line;
use ratatui::widgets::{
    Axis, Bar, BarChart, BarGroup, Block, Borders, Chart, Dataset, GraphType, Widget,
};

use crate::trainer::LossHistory;

pub const DEFAULT_PLOT_WIDTH: u16 = 80;
pub const DEFAULT_PLOT_HEIGHT: u16 = 20;

/// Bars are drawn from integers; accuracies are multiplied by this before rounding.
const BAR_RESOLUTION: f64 = 1000.0;

/// Flattens a rendered buffer into lines, trimming trailing blanks.
pub fn buffer_to_string(buffer: &Buffer) -> String {
    let area = buffer.area;
    let mut out = String::with_capacity(area.area() as usize + area.height as usize);
    for y in area.top()..area.bottom() {
        let mut line = String::with_capacity(area.width as usize);
        for x in area.left()..area.right() {
            line.push_str(buffer[(x, y)].symbol());
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

fn render<W: Widget>(widget: W, width: u16, height: u16) -> String {
    let area = Rect::new(0, 0, width, height);
    let mut buffer = Buffer::empty(area);
    widget.render(area, &mut buffer);
    buffer_to_string(&buffer)
}

/// Line chart of training loss against epoch.
pub fn render_loss_curve(history: &LossHistory, width: u16, height: u16) -> String {
    let points: Vec<(f64, f64)> = history
        .as_slice()
        .iter()
        .enumerate()
        .filter(|(_, loss)| loss.is_finite())
        .map(|(epoch, &loss)| (epoch as f64, loss))
        .collect();

    let (min_y, max_y) = if points.is_empty() {
        (0.0, 1.0)
    } else {
        points.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(_, y)| {
            (lo.min(y), hi.max(y))
        })
    };
    let window = (max_y - min_y).max(f64::EPSILON);
    let last_epoch = (history.len().saturating_sub(1) as f64).max(1.0);

    let datasets = vec![
        Dataset::default()
            .name("Training loss")
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::Cyan))
            .data(&points),
    ];

    let chart = Chart::new(datasets)
        .block(Block::default().title("Loss History").borders(Borders::ALL))
        .x_axis(
            Axis::default()
                .title("Epoch")
                .bounds([0.0, last_epoch])
                .labels(vec![
                    Line::from("0"),
                    Line::from(format!("{:.0}", last_epoch)),
                ]),
        )
        .y_axis(
            Axis::default()
                .title("Loss")
                .bounds([min_y - window * 0.05, max_y + window * 0.05])
                .labels(vec![
                    Line::from(format!("{:.4}", min_y)),
                    Line::from(format!("{:.4}", max_y)),
                ]),
        );
    render(chart, width, height)
}

/// One cluster of bars: a group label and `(bar label, value)` pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct BarCluster {
    pub label: String,
    pub bars: Vec<(String, f64)>,
}

/// Grouped bar chart of accuracies. Negative values are drawn as empty bars but keep
/// their printed value.
pub fn render_accuracy_bars(title: &str, clusters: &[BarCluster], height: u16) -> String {
    let bar_width: u16 = 6;
    let bar_count: usize = clusters.iter().map(|c| c.bars.len()).sum();
    let width = (bar_count as u16 * (bar_width + 1) + clusters.len() as u16 * 2 + 2)
        .max(DEFAULT_PLOT_WIDTH / 2);

    let mut chart = BarChart::default()
        .block(Block::default().title(title.to_string()).borders(Borders::ALL))
        .bar_width(bar_width)
        .bar_gap(1)
        .group_gap(2)
        .max(BAR_RESOLUTION as u64);
    for cluster in clusters {
        let bars: Vec<Bar> = cluster
            .bars
            .iter()
            .map(|(label, value)| {
                Bar::default()
                    .value((value.max(0.0) * BAR_RESOLUTION).round() as u64)
                    .text_value(format!("{value:.2}"))
                    .label(Line::from(label.clone()))
            })
            .collect();
        chart = chart.data(
            BarGroup::default()
                .label(Line::from(cluster.label.clone()))
                .bars(&bars),
        );
    }
    render(chart, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loss_curve_has_requested_height_and_title() {
        let mut history = LossHistory::default();
        for epoch in 0..50 {
            history.push(1.0 / (epoch as f64 + 1.0));
        }
        let text = render_loss_curve(&history, DEFAULT_PLOT_WIDTH, DEFAULT_PLOT_HEIGHT);
        assert_eq!(text.lines().count(), DEFAULT_PLOT_HEIGHT as usize);
        assert!(text.contains("Loss History"));
        assert!(text.lines().all(|line| line.chars().count() <= DEFAULT_PLOT_WIDTH as usize));
    }

    #[test]
    fn empty_history_still_renders() {
        let text = render_loss_curve(&LossHistory::default(), 40, 10);
        assert_eq!(text.lines().count(), 10);
    }

    #[test]
    fn bar_chart_shows_group_labels() {
        let clusters = vec![
            BarCluster {
                label: "Wheat".to_string(),
                bars: vec![("N".to_string(), 0.52), ("RR".to_string(), 0.48)],
            },
            BarCluster {
                label: "Maize".to_string(),
                bars: vec![("N".to_string(), 0.31), ("RR".to_string(), -0.05)],
            },
        ];
        let text = render_accuracy_bars("Accuracy", &clusters, 16);
        assert!(text.contains("Accuracy"));
        assert!(text.contains("Wheat"));
        assert!(text.contains("Maize"));
    }
}
