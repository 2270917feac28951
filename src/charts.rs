use std::path::Path;

use plotters::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use crate::error::PipelineError;
use crate::models::ResultSet;

const CHART_SIZE: (u32, u32) = (1200, 750);
const SCATTER_SAMPLE_CAP: usize = 5000;
const SCATTER_SAMPLE_SEED: u64 = 42;
const HISTOGRAM_BINS: usize = 30;

/// Vertical bars, one per category, with the category labels rotated so long
/// department names stay readable.
pub fn bar_chart(
    result: &ResultSet,
    x: &str,
    y: &str,
    title: &str,
    out_path: &Path,
) -> Result<(), PipelineError> {
    let labels = result.text_column(x)?;
    let values = result.numeric_column(y)?;

    let y_max = values.iter().flatten().copied().fold(0.0_f64, f64::max);
    let y_max = if y_max > 0.0 { y_max * 1.1 } else { 1.0 };
    let x_max = labels.len() as f64 - 0.5;

    let root = BitMapBackend::new(out_path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(|e| render_error(out_path, e))?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 32))
        .margin(20)
        .x_label_area_size(110)
        .y_label_area_size(70)
        .build_cartesian_2d(-0.5_f64..x_max, 0.0_f64..y_max)
        .map_err(|e| render_error(out_path, e))?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(labels.len())
        .x_label_formatter(&|tick: &f64| category_tick(&labels, *tick))
        .x_label_style(
            ("sans-serif", 16)
                .into_font()
                .transform(plotters::style::FontTransform::Rotate90),
        )
        .x_desc(axis_label(x))
        .y_desc(axis_label(y))
        .draw()
        .map_err(|e| render_error(out_path, e))?;

    chart
        .draw_series(values.iter().enumerate().filter_map(|(idx, value)| {
            value.map(|v| {
                let center = idx as f64;
                Rectangle::new(
                    [(center - 0.4, 0.0), (center + 0.4, v)],
                    BLUE.mix(0.6).filled(),
                )
            })
        }))
        .map_err(|e| render_error(out_path, e))?;

    root.present().map_err(|e| render_error(out_path, e))?;
    info!(path = %out_path.display(), "wrote bar chart");
    Ok(())
}

/// One point per row, downsampled to a fixed-seed subset when the result is
/// large. Rows with a NULL on either axis are dropped.
pub fn scatter_chart(
    result: &ResultSet,
    x: &str,
    y: &str,
    title: &str,
    out_path: &Path,
) -> Result<(), PipelineError> {
    let xs = result.numeric_column(x)?;
    let ys = result.numeric_column(y)?;
    let points: Vec<(f64, f64)> = xs
        .into_iter()
        .zip(ys)
        .filter_map(|pair| match pair {
            (Some(px), Some(py)) => Some((px, py)),
            _ => None,
        })
        .collect();

    let sample: Vec<(f64, f64)> =
        sample_indices(points.len(), SCATTER_SAMPLE_CAP, SCATTER_SAMPLE_SEED)
            .into_iter()
            .map(|idx| points[idx])
            .collect();

    let (x_lo, x_hi) = pad_range(sample.iter().map(|p| p.0));
    let (y_lo, y_hi) = pad_range(sample.iter().map(|p| p.1));

    let root = BitMapBackend::new(out_path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(|e| render_error(out_path, e))?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 32))
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(70)
        .build_cartesian_2d(x_lo..x_hi, y_lo..y_hi)
        .map_err(|e| render_error(out_path, e))?;

    chart
        .configure_mesh()
        .x_desc(axis_label(x))
        .y_desc(axis_label(y))
        .draw()
        .map_err(|e| render_error(out_path, e))?;

    chart
        .draw_series(
            sample
                .iter()
                .map(|&(px, py)| Circle::new((px, py), 3, BLUE.mix(0.5).filled())),
        )
        .map_err(|e| render_error(out_path, e))?;

    root.present().map_err(|e| render_error(out_path, e))?;
    info!(path = %out_path.display(), points = sample.len(), "wrote scatter chart");
    Ok(())
}

/// Fixed-bin frequency histogram. NULLs count as zero so idle employees show
/// up in the lowest bin instead of vanishing.
pub fn histogram_chart(
    result: &ResultSet,
    column: &str,
    title: &str,
    out_path: &Path,
) -> Result<(), PipelineError> {
    let values: Vec<f64> = result
        .numeric_column(column)?
        .into_iter()
        .map(|v| v.unwrap_or(0.0))
        .collect();
    let bins = histogram_bins(&values, HISTOGRAM_BINS);

    let x_lo = bins.first().map(|b| b.lo).unwrap_or(0.0);
    let x_hi = bins.last().map(|b| b.hi).unwrap_or(1.0);
    let y_max = bins.iter().map(|b| b.count).max().unwrap_or(0);
    let y_max = if y_max > 0 { y_max as f64 * 1.1 } else { 1.0 };

    let root = BitMapBackend::new(out_path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(|e| render_error(out_path, e))?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 32))
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(70)
        .build_cartesian_2d(x_lo..x_hi, 0.0_f64..y_max)
        .map_err(|e| render_error(out_path, e))?;

    chart
        .configure_mesh()
        .x_desc("Value")
        .y_desc("Frequency")
        .draw()
        .map_err(|e| render_error(out_path, e))?;

    chart
        .draw_series(bins.iter().filter(|b| b.count > 0).map(|b| {
            Rectangle::new([(b.lo, 0.0), (b.hi, b.count as f64)], BLUE.mix(0.6).filled())
        }))
        .map_err(|e| render_error(out_path, e))?;

    root.present().map_err(|e| render_error(out_path, e))?;
    info!(path = %out_path.display(), "wrote histogram");
    Ok(())
}

/// Indices to plot, in row order. Identity below the cap, otherwise a seeded
/// draw so reruns pick the same subset.
fn sample_indices(len: usize, cap: usize, seed: u64) -> Vec<usize> {
    if len <= cap {
        return (0..len).collect();
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut picked = rand::seq::index::sample(&mut rng, len, cap).into_vec();
    picked.sort_unstable();
    picked
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Bin {
    lo: f64,
    hi: f64,
    count: usize,
}

fn histogram_bins(values: &[f64], bins: usize) -> Vec<Bin> {
    if values.is_empty() || bins == 0 {
        return Vec::new();
    }
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for &v in values {
        lo = lo.min(v);
        hi = hi.max(v);
    }
    // A flat distribution still needs a non-zero bin width.
    if (hi - lo).abs() < f64::EPSILON {
        lo -= 0.5;
        hi += 0.5;
    }
    let width = (hi - lo) / bins as f64;
    let mut out: Vec<Bin> = (0..bins)
        .map(|i| Bin {
            lo: lo + i as f64 * width,
            hi: lo + (i + 1) as f64 * width,
            count: 0,
        })
        .collect();
    for &v in values {
        let idx = (((v - lo) / width) as usize).min(bins - 1);
        out[idx].count += 1;
    }
    out
}

fn pad_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for v in values {
        lo = lo.min(v);
        hi = hi.max(v);
    }
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    if (hi - lo).abs() < f64::EPSILON {
        return (lo - 0.5, hi + 0.5);
    }
    let pad = (hi - lo) * 0.05;
    (lo - pad, hi + pad)
}

/// Maps a tick position back to its category label. Ticks that do not land on
/// a bar center render blank.
fn category_tick(labels: &[String], tick: f64) -> String {
    let nearest = tick.round();
    if (tick - nearest).abs() > 0.25 || nearest < 0.0 {
        return String::new();
    }
    labels.get(nearest as usize).cloned().unwrap_or_default()
}

/// Turns a column name into an axis caption, e.g. `hours_worked` to `Hours Worked`.
fn axis_label(field: &str) -> String {
    field
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn render_error(path: &Path, err: impl std::fmt::Display) -> PipelineError {
    PipelineError::Render {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}
