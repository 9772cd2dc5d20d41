//! Result container decoding into a [`WaveformTable`]

use crate::raw_parser::read_raw;
use crate::types::{DecodeError, Diagnostic, RawContainer, Result, WaveformTable, TIME_AXIS};
use std::path::Path;
use tracing::{debug, info, instrument, warn};

/// A decoded table plus the non-fatal observations made while building it
#[derive(Debug, Clone)]
pub struct Decoded {
    pub table: WaveformTable,
    pub diagnostics: Vec<Diagnostic>,
}

/// Decode a simulator result container.
///
/// The axis is the trace named `time` if present, otherwise the first
/// declared trace. Complex traces are reduced to magnitude. Traces whose
/// length differs from the axis are dropped and reported in
/// [`Decoded::diagnostics`].
///
/// # Errors
/// * [`DecodeError::NotFound`] if `path` is not an existing file
/// * [`DecodeError::EmptyContainer`] if the container declares no traces
/// * [`DecodeError::CorruptContainer`] on structural damage
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn decode<P: AsRef<Path>>(path: P) -> Result<Decoded> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(DecodeError::NotFound(path.to_path_buf()));
    }

    let container = read_raw(path)?;
    let decoded = decode_container(container)?;

    info!(
        axis = decoded.table.axis_name(),
        traces = decoded.table.len(),
        samples = decoded.table.samples_count(),
        diagnostics = decoded.diagnostics.len(),
        "Decoded result container"
    );
    Ok(decoded)
}

/// Build a [`WaveformTable`] from an already parsed container
pub fn decode_container(container: RawContainer) -> Result<Decoded> {
    if container.variables.is_empty() {
        return Err(DecodeError::EmptyContainer);
    }

    let mut diagnostics = Vec::new();

    let axis_index = match container
        .variables
        .iter()
        .position(|v| v.name.eq_ignore_ascii_case(TIME_AXIS))
    {
        Some(index) => index,
        None => {
            let axis = container.variables[0].name.clone();
            warn!(axis = %axis, "No time trace, guessing independent axis");
            diagnostics.push(Diagnostic::AxisGuessed { axis });
            0
        }
    };

    let mut axis = None;
    let mut traces = Vec::with_capacity(container.variables.len().saturating_sub(1));

    for (index, (var, vector)) in container
        .variables
        .into_iter()
        .zip(container.vectors)
        .enumerate()
    {
        if vector.is_complex() {
            debug!(trace = %var.name, "Reducing complex trace to magnitude");
        }
        let samples = vector.into_magnitudes();
        if index == axis_index {
            axis = Some((var.name, samples));
        } else {
            traces.push((var.name, samples));
        }
    }

    let (axis_name, axis_samples) = axis.ok_or_else(|| {
        DecodeError::CorruptContainer("axis trace has no sample vector".into())
    })?;

    if axis_samples.len() < container.declared_points {
        diagnostics.push(Diagnostic::ShortData {
            declared: container.declared_points,
            actual: axis_samples.len(),
        });
    }

    let (table, rejected) = WaveformTable::build(axis_name, axis_samples, traces);
    for diagnostic in &rejected {
        warn!(%diagnostic, "Dropping trace");
    }
    diagnostics.extend(rejected);

    Ok(Decoded { table, diagnostics })
}
