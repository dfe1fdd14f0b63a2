//! SVG Manhattan and QQ plots.
//!
//! Layout is done by hand on an `SVGBackend` drawing area: a data frame with
//! fixed margins, [`Scale`] maps data values to pixels, and every mark
//! (points, boundary lines, tick labels) is drawn as a plain element.

use std::path::Path;

use plotters::prelude::*;
use plotters::style::FontTransform;
use thiserror::Error;

use crate::coords::CoordinateConverter;

const WIDTH: u32 = 1200;
const HEIGHT: u32 = 720;
const MARGIN_LEFT: i32 = 90;
const MARGIN_RIGHT: i32 = 30;
const MARGIN_TOP: i32 = 60;
const MARGIN_BOTTOM: i32 = 90;
const BOUNDARY_GRAY: RGBColor = RGBColor(128, 128, 128);
const POINT_BLUE: RGBColor = RGBColor(31, 119, 180);

#[derive(Debug, Error)]
pub enum PlotError {
    #[error("failed to draw {path}: {message}")]
    Drawing { path: String, message: String },
}

fn drawing_error(path: &Path, err: impl std::fmt::Display) -> PlotError {
    PlotError::Drawing {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

/// `-log10(p)`, or `None` for missing or non-positive p-values.
pub fn neg_log10(pvalue: f64) -> Option<f64> {
    if pvalue.is_nan() || pvalue <= 0.0 {
        return None;
    }
    Some(-pvalue.log10())
}

/// `(expected, observed)` pairs of `-log10(p)` for a QQ plot, ordered from
/// the largest p-value to the smallest. Expected quantiles are
/// `(i + 0.5) / n` of the uniform distribution.
pub fn qq_points(pvalues: &[f64]) -> Vec<(f64, f64)> {
    let mut observed: Vec<f64> = pvalues.iter().copied().filter_map(neg_log10).collect();
    observed.sort_by(f64::total_cmp);
    let n = observed.len() as f64;
    observed
        .into_iter()
        .enumerate()
        .map(|(rank, obs)| {
            let quantile = (n - rank as f64 - 0.5) / n;
            (-quantile.log10(), obs)
        })
        .collect()
}

/// Linear map from a data interval onto a pixel interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale {
    domain: (f64, f64),
    range: (i32, i32),
}

impl Scale {
    pub fn new(domain: (f64, f64), range: (i32, i32)) -> Self {
        Self { domain, range }
    }

    pub fn map(&self, value: f64) -> i32 {
        let (d0, d1) = self.domain;
        let (r0, r1) = self.range;
        let span = d1 - d0;
        if span <= 0.0 {
            return r0;
        }
        let t = ((value - d0) / span).clamp(0.0, 1.0);
        r0 + (t * f64::from(r1 - r0)).round() as i32
    }
}

/// Upper bound of a `-log10(p)` axis: the next whole number above the data,
/// at least 1.
pub fn y_axis_max(values: impl IntoIterator<Item = f64>) -> f64 {
    values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold(1.0_f64, f64::max)
        .ceil()
        .max(1.0)
}

/// Whole-number ticks from 0 to `max`, at most `max_ticks` of them.
pub fn y_ticks(max: f64, max_ticks: usize) -> Vec<f64> {
    let top = max.ceil().max(1.0) as usize;
    let step = top.div_ceil(max_ticks.max(1)).max(1);
    (0..=top).step_by(step).map(|t| t as f64).collect()
}

struct Frame {
    x: Scale,
    y: Scale,
}

impl Frame {
    fn new(x_domain: (f64, f64), y_max: f64) -> Self {
        let height = HEIGHT as i32;
        Self {
            x: Scale::new(x_domain, (MARGIN_LEFT, WIDTH as i32 - MARGIN_RIGHT)),
            y: Scale::new((0.0, y_max), (height - MARGIN_BOTTOM, MARGIN_TOP)),
        }
    }

    fn bottom(&self) -> i32 {
        HEIGHT as i32 - MARGIN_BOTTOM
    }
}

type Area<'a> = DrawingArea<SVGBackend<'a>, plotters::coord::Shift>;

fn draw_frame(
    root: &Area<'_>,
    path: &Path,
    frame: &Frame,
    title: &str,
    y_label: &str,
    y_max: f64,
) -> Result<(), PlotError> {
    let err = |e: DrawingAreaErrorKind<_>| drawing_error(path, e);
    root.fill(&WHITE).map_err(err)?;

    root.draw(&Text::new(
        title.to_string(),
        (WIDTH as i32 / 2, MARGIN_TOP / 2),
        ("sans-serif", 24).into_font().color(&BLACK),
    ))
    .map_err(err)?;

    let left = MARGIN_LEFT;
    let right = WIDTH as i32 - MARGIN_RIGHT;
    let bottom = frame.bottom();
    root.draw(&PathElement::new(
        vec![(left, MARGIN_TOP), (left, bottom), (right, bottom)],
        BLACK.stroke_width(1),
    ))
    .map_err(err)?;

    for tick in y_ticks(y_max, 10) {
        let y = frame.y.map(tick);
        root.draw(&PathElement::new(vec![(left - 5, y), (left, y)], BLACK.stroke_width(1)))
            .map_err(err)?;
        root.draw(&Text::new(
            format!("{tick}"),
            (left - 30, y - 6),
            ("sans-serif", 12).into_font().color(&BLACK),
        ))
        .map_err(err)?;
    }

    root.draw(&Text::new(
        y_label.to_string(),
        (20, (MARGIN_TOP + bottom) / 2),
        ("sans-serif", 16)
            .into_font()
            .transform(FontTransform::Rotate270)
            .color(&BLACK),
    ))
    .map_err(err)?;
    Ok(())
}

/// Scatter of `(linear coordinate, -log10 p)` points with a vertical line at
/// each chromosome end and at each pericentromeric start.
pub fn render_manhattan(
    path: &Path,
    title: &str,
    y_label: &str,
    points: &[(u64, f64)],
    converter: &CoordinateConverter,
) -> Result<(), PlotError> {
    let y_max = y_axis_max(points.iter().map(|(_, y)| *y));
    let frame = Frame::new((0.0, converter.genome_size() as f64), y_max);
    let root = SVGBackend::new(path, (WIDTH, HEIGHT)).into_drawing_area();
    let err = |e: DrawingAreaErrorKind<_>| drawing_error(path, e);

    draw_frame(&root, path, &frame, title, y_label, y_max)?;

    let bottom = frame.bottom();
    let boundaries = converter
        .spans()
        .iter()
        .map(|span| span.end)
        .chain(converter.pericentromeric_starts().into_iter().map(|(_, x)| x))
        .collect::<Vec<_>>();
    for boundary in boundaries {
        let x = frame.x.map(boundary as f64);
        root.draw(&PathElement::new(
            vec![(x, MARGIN_TOP), (x, bottom)],
            BOUNDARY_GRAY.stroke_width(1),
        ))
        .map_err(err)?;
    }

    for span in converter.spans() {
        let x = frame.x.map(span.midpoint() as f64);
        root.draw(&Text::new(
            span.name.clone(),
            (x, bottom + 12),
            ("sans-serif", 12)
                .into_font()
                .transform(FontTransform::Rotate90)
                .color(&BLACK),
        ))
        .map_err(err)?;
    }

    for &(pos, value) in points {
        root.draw(&Circle::new(
            (frame.x.map(pos as f64), frame.y.map(value)),
            2,
            POINT_BLUE.filled(),
        ))
        .map_err(err)?;
    }

    root.present().map_err(err)?;
    Ok(())
}

/// Observed against expected `-log10(p)` with the identity diagonal.
pub fn render_qq(path: &Path, title: &str, pvalues: &[f64]) -> Result<(), PlotError> {
    let points = qq_points(pvalues);
    let max = y_axis_max(points.iter().flat_map(|&(e, o)| [e, o]));
    let frame = Frame::new((0.0, max), max);
    let root = SVGBackend::new(path, (WIDTH, HEIGHT)).into_drawing_area();
    let err = |e: DrawingAreaErrorKind<_>| drawing_error(path, e);

    draw_frame(&root, path, &frame, title, "observed -log10(p)", max)?;

    root.draw(&PathElement::new(
        vec![
            (frame.x.map(0.0), frame.y.map(0.0)),
            (frame.x.map(max), frame.y.map(max)),
        ],
        RED.stroke_width(1),
    ))
    .map_err(err)?;
    root.draw(&Text::new(
        "expected -log10(p)",
        (WIDTH as i32 / 2, frame.bottom() + 40),
        ("sans-serif", 16).into_font().color(&BLACK),
    ))
    .map_err(err)?;

    for (expected, observed) in points {
        root.draw(&Circle::new(
            (frame.x.map(expected), frame.y.map(observed)),
            2,
            POINT_BLUE.filled(),
        ))
        .map_err(err)?;
    }

    root.present().map_err(err)?;
    Ok(())
}
