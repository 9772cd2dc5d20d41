//! SPICE raw container parser
//!
//! Reads the `.raw` files written by LTspice and ngspice. Handles UTF-16LE
//! and ASCII headers, binary and ASCII data sections, real and complex
//! samples, and the trace-major `fastaccess` layout.
//!
//! A data section that ends early is not an error here. In the point-major
//! layouts every vector is cut back to the last complete point; a truncated
//! `fastaccess` section leaves later traces short, and the decoder decides
//! which of them survive.

use crate::reader::{decode_as, HeaderLines, SliceReader, TextEncoding};
use crate::types::{
    AnalysisType, DecodeError, RawContainer, RawFlags, Result, VarType, Variable, VectorData,
    BINARY_MARKER, TIME_AXIS, VALUES_MARKER,
};
use memmap2::Mmap;
use num_complex::Complex64;
use std::fs::File;
use std::path::Path;
use tracing::{debug, instrument};

/// Raw file format type
#[derive(Debug, Clone, Copy, PartialEq)]
enum RawFormat {
    Binary,
    Ascii,
}

/// Tool that wrote the container; decides binary sample widths
#[derive(Debug, Clone, Copy, PartialEq)]
enum Dialect {
    /// f64 axis, f32 traces unless `double` is flagged. Plots without an
    /// axis are f32 throughout.
    LtSpice,
    /// f64 throughout
    Spice3,
}

/// On-disk encoding of one binary sample
#[derive(Debug, Clone, Copy, PartialEq)]
enum SampleKind {
    F32,
    F64,
    Complex,
}

impl SampleKind {
    fn for_variable(index: usize, flags: RawFlags, dialect: Dialect, has_axis: bool) -> Self {
        if flags.complex {
            SampleKind::Complex
        } else if flags.double || dialect == Dialect::Spice3 || (index == 0 && has_axis) {
            SampleKind::F64
        } else {
            SampleKind::F32
        }
    }
}

/// Parsed header information
#[derive(Debug, Default)]
struct RawHeader {
    title: String,
    date: String,
    plotname: String,
    command: String,
    flags: RawFlags,
    num_variables: Option<usize>,
    num_points: Option<usize>,
    variables: Vec<Variable>,
}

/// Per-variable accumulation buffer
enum SignalBuffer {
    Real(Vec<f64>),
    Complex(Vec<Complex64>),
}

impl SignalBuffer {
    fn new(complex: bool, capacity: usize) -> Self {
        if complex {
            SignalBuffer::Complex(Vec::with_capacity(capacity))
        } else {
            SignalBuffer::Real(Vec::with_capacity(capacity))
        }
    }

    fn len(&self) -> usize {
        match self {
            SignalBuffer::Real(v) => v.len(),
            SignalBuffer::Complex(v) => v.len(),
        }
    }

    /// Read one sample from `reader`; `false` once the data runs out.
    fn read_sample(&mut self, reader: &mut SliceReader<'_>, kind: SampleKind) -> bool {
        match (self, kind) {
            (SignalBuffer::Complex(v), _) => reader.read_complex().map(|c| v.push(c)).is_some(),
            (SignalBuffer::Real(v), SampleKind::F32) => {
                reader.read_f32().map(|x| v.push(x)).is_some()
            }
            (SignalBuffer::Real(v), _) => reader.read_f64().map(|x| v.push(x)).is_some(),
        }
    }

    fn truncate(&mut self, len: usize) {
        match self {
            SignalBuffer::Real(v) => v.truncate(len),
            SignalBuffer::Complex(v) => v.truncate(len),
        }
    }

    fn into_vector(self) -> VectorData {
        match self {
            SignalBuffer::Real(v) => VectorData::Real(v),
            SignalBuffer::Complex(v) => VectorData::Complex(v),
        }
    }
}

/// Read a raw container from disk
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn read_raw<P: AsRef<Path>>(path: P) -> Result<RawContainer> {
    let file = File::open(path.as_ref())?;
    if file.metadata()?.len() == 0 {
        return Err(DecodeError::CorruptContainer("file is empty".into()));
    }
    let mmap = unsafe { Mmap::map(&file)? };
    debug!(bytes = mmap.len(), "Mapped raw container");
    parse_raw(&mmap)
}

/// Parse a raw container held in memory
pub fn parse_raw(data: &[u8]) -> Result<RawContainer> {
    let (header, format, data_start, encoding) = parse_header(data)?;

    let dialect = if encoding == TextEncoding::Utf16Le || header.command.contains("LTspice") {
        Dialect::LtSpice
    } else {
        Dialect::Spice3
    };
    let num_points = header.num_points.unwrap_or(0);
    let analysis = AnalysisType::from_plotname(&header.plotname);

    debug!(
        format = ?format,
        dialect = ?dialect,
        variables = header.variables.len(),
        points = num_points,
        complex = header.flags.complex,
        fastaccess = header.flags.fastaccess,
        "Parsed raw header"
    );

    let section = &data[data_start..];
    let mut vectors = match format {
        RawFormat::Binary => parse_binary_data(section, &header, dialect, analysis.has_axis()),
        RawFormat::Ascii => parse_ascii_data(&decode_as(section, encoding), &header)?,
    };

    if num_points > 0 && vectors.first().is_some_and(VectorData::is_empty) {
        return Err(DecodeError::CorruptContainer(
            "header declares points but the data section holds no samples".into(),
        ));
    }

    if dialect == Dialect::LtSpice {
        // The sign bit of LTspice time samples is a step marker, not data.
        for (var, vector) in header.variables.iter().zip(vectors.iter_mut()) {
            if !var.name.eq_ignore_ascii_case(TIME_AXIS) {
                continue;
            }
            if let VectorData::Real(samples) = vector {
                samples.iter_mut().for_each(|t| *t = t.abs());
            }
        }
    }

    Ok(RawContainer {
        analysis,
        title: header.title,
        date: header.date,
        plotname: header.plotname,
        flags: header.flags,
        variables: header.variables,
        declared_points: num_points,
        vectors,
    })
}

fn parse_count(field: &str, value: &str) -> Result<usize> {
    value.trim().parse().map_err(|_| {
        DecodeError::CorruptContainer(format!("invalid {} value '{}'", field, value.trim()))
    })
}

fn parse_header(data: &[u8]) -> Result<(RawHeader, RawFormat, usize, TextEncoding)> {
    let mut header = RawHeader::default();
    let lines = HeaderLines::new(data);
    let encoding = lines.encoding();
    let mut in_variables = false;

    for (line, next_offset) in lines {
        let trimmed = line.trim();

        let format = match trimmed {
            BINARY_MARKER => Some(RawFormat::Binary),
            VALUES_MARKER => Some(RawFormat::Ascii),
            _ => None,
        };
        if let Some(format) = format {
            validate_header(&header)?;
            return Ok((header, format, next_offset, encoding));
        }

        if let Some(value) = trimmed.strip_prefix("Title:") {
            header.title = value.trim().to_string();
            in_variables = false;
        } else if let Some(value) = trimmed.strip_prefix("Date:") {
            header.date = value.trim().to_string();
            in_variables = false;
        } else if let Some(value) = trimmed.strip_prefix("Plotname:") {
            header.plotname = value.trim().to_string();
            in_variables = false;
        } else if let Some(value) = trimmed.strip_prefix("Flags:") {
            header.flags = RawFlags::parse(value);
            in_variables = false;
        } else if let Some(value) = trimmed.strip_prefix("Command:") {
            header.command = value.trim().to_string();
            in_variables = false;
        } else if let Some(value) = trimmed.strip_prefix("No. Variables:") {
            header.num_variables = Some(parse_count("No. Variables", value)?);
            in_variables = false;
        } else if let Some(value) = trimmed.strip_prefix("No. Points:") {
            header.num_points = Some(parse_count("No. Points", value)?);
            in_variables = false;
        } else if trimmed.starts_with("Variables:") {
            in_variables = true;
        } else if in_variables && !trimmed.is_empty() {
            // Variable line: "index name type"
            let parts: Vec<&str> = trimmed.split_whitespace().collect();
            match parts.as_slice() {
                [index, name, var_type, ..] if index.parse::<usize>().is_ok() => {
                    header
                        .variables
                        .push(Variable::new(*name, VarType::from_declared(var_type)));
                }
                _ => in_variables = false,
            }
        }
    }

    Err(DecodeError::CorruptContainer(
        "no data section found (truncated header?)".into(),
    ))
}

fn validate_header(header: &RawHeader) -> Result<()> {
    let declared = header.num_variables.ok_or_else(|| {
        DecodeError::CorruptContainer("missing 'No. Variables' line".into())
    })?;
    if header.num_points.is_none() {
        return Err(DecodeError::CorruptContainer(
            "missing 'No. Points' line".into(),
        ));
    }
    if header.variables.len() != declared {
        return Err(DecodeError::CorruptContainer(format!(
            "variable directory lists {} traces, header declares {}",
            header.variables.len(),
            declared
        )));
    }
    Ok(())
}

/// Drop the samples of a point that ended partway through
fn trim_partial_point(buffers: &mut [SignalBuffer]) {
    let complete = buffers.iter().map(SignalBuffer::len).min().unwrap_or(0);
    if buffers.iter().any(|b| b.len() > complete) {
        debug!(points = complete, "Dropping incomplete trailing point");
        buffers.iter_mut().for_each(|b| b.truncate(complete));
    }
}

fn parse_binary_data(
    section: &[u8],
    header: &RawHeader,
    dialect: Dialect,
    has_axis: bool,
) -> Vec<VectorData> {
    let num_points = header.num_points.unwrap_or(0);
    let kinds: Vec<SampleKind> = (0..header.variables.len())
        .map(|i| SampleKind::for_variable(i, header.flags, dialect, has_axis))
        .collect();
    let mut buffers: Vec<SignalBuffer> = kinds
        .iter()
        .map(|&k| SignalBuffer::new(k == SampleKind::Complex, num_points))
        .collect();

    let mut reader = SliceReader::new(section);

    if header.flags.fastaccess {
        // Trace-major: every sample of variable 0, then variable 1, ...
        for (buf, &kind) in buffers.iter_mut().zip(kinds.iter()) {
            while buf.len() < num_points {
                if !buf.read_sample(&mut reader, kind) {
                    break;
                }
            }
        }
    } else {
        'points: for _ in 0..num_points {
            for (buf, &kind) in buffers.iter_mut().zip(kinds.iter()) {
                if !buf.read_sample(&mut reader, kind) {
                    break 'points;
                }
            }
        }
        trim_partial_point(&mut buffers);
    }

    if reader.remaining() > 0 {
        debug!(bytes = reader.remaining(), "Ignoring trailing data");
    }

    buffers.into_iter().map(SignalBuffer::into_vector).collect()
}

fn parse_ascii_data(text: &str, header: &RawHeader) -> Result<Vec<VectorData>> {
    let num_points = header.num_points.unwrap_or(0);
    let complex = header.flags.complex;
    let mut buffers: Vec<SignalBuffer> = header
        .variables
        .iter()
        .map(|_| SignalBuffer::new(complex, num_points))
        .collect();

    // Format: "index<ws>value" then one value per remaining variable
    let mut tokens = text.split_whitespace();
    'points: for point in 0..num_points {
        let Some(index) = tokens.next() else {
            break;
        };
        if index.parse::<usize>().is_err() {
            return Err(DecodeError::CorruptContainer(format!(
                "expected index of point {}, found '{}'",
                point, index
            )));
        }

        for (buf, var) in buffers.iter_mut().zip(header.variables.iter()) {
            let Some(token) = tokens.next() else {
                break 'points;
            };
            let unreadable = || {
                DecodeError::CorruptContainer(format!(
                    "unreadable value '{}' for trace '{}'",
                    token, var.name
                ))
            };
            match buf {
                SignalBuffer::Complex(v) => {
                    let (re, im) = parse_complex_value(token).ok_or_else(unreadable)?;
                    v.push(Complex64::new(re, im));
                }
                SignalBuffer::Real(v) => v.push(token.parse().map_err(|_| unreadable())?),
            }
        }
    }
    trim_partial_point(&mut buffers);

    Ok(buffers.into_iter().map(SignalBuffer::into_vector).collect())
}

fn parse_complex_value(s: &str) -> Option<(f64, f64)> {
    // Handle formats: "1.0,2.0" or "(1.0,2.0)" or a bare real
    let s = s.trim_matches(|c| c == '(' || c == ')');

    match s.split_once(',') {
        Some((re, im)) => Some((re.trim().parse().ok()?, im.trim().parse().ok()?)),
        None => Some((s.parse().ok()?, 0.0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ascii_header(flags: &str, vars: &[(&str, &str)], points: usize) -> String {
        plot_header("Transient Analysis", flags, vars, points)
    }

    fn plot_header(plotname: &str, flags: &str, vars: &[(&str, &str)], points: usize) -> String {
        let mut text = format!(
            "Title: * test\nDate: today\nPlotname: {}\nFlags: {}\nNo. Variables: {}\nNo. Points: {}\nVariables:\n",
            plotname,
            flags,
            vars.len(),
            points
        );
        for (i, (name, ty)) in vars.iter().enumerate() {
            text.push_str(&format!("\t{}\t{}\t{}\n", i, name, ty));
        }
        text
    }

    #[test]
    fn test_parse_complex_value() {
        assert_eq!(parse_complex_value("1.0,2.0"), Some((1.0, 2.0)));
        assert_eq!(parse_complex_value("(1.5,-0.5)"), Some((1.5, -0.5)));
        assert_eq!(parse_complex_value("3.25"), Some((3.25, 0.0)));
        assert_eq!(parse_complex_value("abc"), None);
    }

    #[test]
    fn test_ascii_values() {
        let mut text = ascii_header("real", &[("time", "time"), ("V(out)", "voltage")], 2);
        text.push_str("Values:\n0\t0.0\n\t1.0\n1\t1e-3\n\t2.5\n");

        let raw = parse_raw(text.as_bytes()).unwrap();
        assert_eq!(raw.analysis, AnalysisType::Transient);
        assert_eq!(raw.vectors[0], VectorData::Real(vec![0.0, 1e-3]));
        assert_eq!(raw.vectors[1], VectorData::Real(vec![1.0, 2.5]));
    }

    #[test]
    fn test_ascii_partial_point() {
        let mut text = ascii_header("real", &[("time", "time"), ("V(out)", "voltage")], 3);
        text.push_str("Values:\n0\t0.0\t1.0\n1\t1.0\t2.0\n2\t2.0\n");

        let raw = parse_raw(text.as_bytes()).unwrap();
        assert_eq!(raw.declared_points, 3);
        assert_eq!(raw.vectors[0], VectorData::Real(vec![0.0, 1.0]));
        assert_eq!(raw.vectors[1], VectorData::Real(vec![1.0, 2.0]));
    }

    #[test]
    fn test_ascii_unreadable_value() {
        let mut text = ascii_header("real", &[("time", "time"), ("V(out)", "voltage")], 1);
        text.push_str("Values:\n0\t0.0\n\tgarbage\n");

        let err = parse_raw(text.as_bytes()).unwrap_err();
        assert!(matches!(err, DecodeError::CorruptContainer(_)));
    }

    #[test]
    fn test_missing_data_section() {
        let text = ascii_header("real", &[("time", "time")], 1);
        let err = parse_raw(text.as_bytes()).unwrap_err();
        assert!(matches!(err, DecodeError::CorruptContainer(_)));
    }

    #[test]
    fn test_short_variable_directory() {
        let text = "Title: x\nFlags: real\nNo. Variables: 3\nNo. Points: 1\nVariables:\n\t0\ttime\ttime\nBinary:\n";
        let err = parse_raw(text.as_bytes()).unwrap_err();
        assert!(matches!(err, DecodeError::CorruptContainer(_)));
    }

    #[test]
    fn test_binary_spice3_all_double() {
        let mut bytes = ascii_header("real", &[("time", "time"), ("v(1)", "voltage")], 2)
            .into_bytes();
        bytes.extend_from_slice(b"Binary:\n");
        for value in [0.0f64, 5.0, 1.0, 4.0] {
            bytes.extend_from_slice(&value.to_le_bytes());
        }

        let raw = parse_raw(&bytes).unwrap();
        assert_eq!(raw.vectors[0], VectorData::Real(vec![0.0, 1.0]));
        assert_eq!(raw.vectors[1], VectorData::Real(vec![5.0, 4.0]));
    }

    #[test]
    fn test_binary_ltspice_float_traces_and_time_sign() {
        let header = ascii_header("real forward", &[("time", "time"), ("V(n001)", "voltage")], 2);
        let mut bytes = utf16_container(&header);
        bytes.extend_from_slice(&0.0f64.to_le_bytes());
        bytes.extend_from_slice(&1.5f32.to_le_bytes());
        bytes.extend_from_slice(&(-2e-3f64).to_le_bytes());
        bytes.extend_from_slice(&2.5f32.to_le_bytes());

        let raw = parse_raw(&bytes).unwrap();
        assert_eq!(raw.vectors[0], VectorData::Real(vec![0.0, 2e-3]));
        assert_eq!(raw.vectors[1], VectorData::Real(vec![1.5, 2.5]));
    }

    fn utf16_container(header: &str) -> Vec<u8> {
        header
            .encode_utf16()
            .chain("Binary:\n".encode_utf16())
            .flat_map(|u| u.to_le_bytes())
            .collect()
    }

    #[test]
    fn test_binary_ltspice_operating_point_all_float() {
        let header = plot_header(
            "Operating Point",
            "real",
            &[("V(1)", "voltage"), ("I(R1)", "device_current"), ("I(V1)", "device_current")],
            1,
        );
        let mut bytes = utf16_container(&header);
        for value in [5.0f32, 0.005, -0.005] {
            bytes.extend_from_slice(&value.to_le_bytes());
        }

        let raw = parse_raw(&bytes).unwrap();
        assert_eq!(raw.analysis, AnalysisType::Operating);
        assert_eq!(raw.vectors[0], VectorData::Real(vec![5.0]));
        assert_eq!(raw.vectors[1], VectorData::Real(vec![0.005f32 as f64]));
        assert_eq!(raw.vectors[2], VectorData::Real(vec![-0.005f32 as f64]));
    }

    #[test]
    fn test_binary_partial_point_trims_every_trace() {
        let mut bytes = ascii_header(
            "real",
            &[("time", "time"), ("V(a)", "voltage"), ("V(b)", "voltage")],
            3,
        )
        .into_bytes();
        bytes.extend_from_slice(b"Binary:\n");
        // Two full points, then the axis and one trace of a third
        for value in [0.0f64, 1.0, 2.0, 1.0, 3.0, 4.0, 2.0, 5.0] {
            bytes.extend_from_slice(&value.to_le_bytes());
        }

        let raw = parse_raw(&bytes).unwrap();
        assert_eq!(raw.declared_points, 3);
        assert_eq!(raw.vectors[0], VectorData::Real(vec![0.0, 1.0]));
        assert_eq!(raw.vectors[1], VectorData::Real(vec![1.0, 3.0]));
        assert_eq!(raw.vectors[2], VectorData::Real(vec![2.0, 4.0]));
    }

    #[test]
    fn test_binary_fastaccess_layout() {
        let mut bytes = ascii_header(
            "real forward double fastaccess",
            &[("time", "time"), ("V(a)", "voltage")],
            2,
        )
        .into_bytes();
        bytes.extend_from_slice(b"Binary:\n");
        for value in [0.0f64, 1.0, 10.0, 20.0] {
            bytes.extend_from_slice(&value.to_le_bytes());
        }

        let raw = parse_raw(&bytes).unwrap();
        assert_eq!(raw.vectors[0], VectorData::Real(vec![0.0, 1.0]));
        assert_eq!(raw.vectors[1], VectorData::Real(vec![10.0, 20.0]));
    }

    #[test]
    fn test_binary_declared_points_without_samples() {
        let mut bytes = ascii_header("real", &[("time", "time")], 4).into_bytes();
        bytes.extend_from_slice(b"Binary:\n");

        let err = parse_raw(&bytes).unwrap_err();
        assert!(matches!(err, DecodeError::CorruptContainer(_)));
    }
}
