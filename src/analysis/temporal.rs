//! Temporal window resolution.
//!
//! Maps a year plus a span/step pair onto the half-open date interval used
//! to filter raster time series.

use crate::error::{JaltolError, Result};
use crate::models::{TemporalSpan, TemporalStep, TemporalWindow};
use chrono::NaiveDate;

/// Resolve the window for `year` under the given span and step.
pub fn resolve(year: i32, span: TemporalSpan, step: TemporalStep) -> Result<TemporalWindow> {
    match step {
        TemporalStep::Year => yearly_window(year, span.anchor_month()),
    }
}

/// Parse a span/step pair.
///
/// Any unknown name makes the whole combination unsupported.
pub fn parse_span_step(span: &str, step: &str) -> Result<(TemporalSpan, TemporalStep)> {
    let parsed_span = match span.trim().to_lowercase().as_str() {
        "hydrological" => Some(TemporalSpan::Hydrological),
        "calendar" => Some(TemporalSpan::Calendar),
        _ => None,
    };
    let parsed_step = match step.trim().to_lowercase().as_str() {
        "year" => Some(TemporalStep::Year),
        _ => None,
    };

    match (parsed_span, parsed_step) {
        (Some(span), Some(step)) => Ok((span, step)),
        _ => Err(JaltolError::UnsupportedTemporalSpan {
            span: span.to_string(),
            step: step.to_string(),
        }),
    }
}

fn yearly_window(year: i32, month: u32) -> Result<TemporalWindow> {
    let start = first_of_month(year, month)?;
    let end = year
        .checked_add(1)
        .ok_or(JaltolError::InvalidYear { year })
        .and_then(|next| first_of_month(next, month))?;
    Ok(TemporalWindow { start, end })
}

fn first_of_month(year: i32, month: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1).ok_or(JaltolError::InvalidYear { year })
}
