//! Raw container writer
//!
//! Emits the same formats [`read_raw`](crate::read_raw) understands, which
//! makes it the natural way to build fixtures and to hand decoded data on to
//! other SPICE tools.

use crate::types::{DecodeError, RawContainer, Result, VectorData, BINARY_MARKER, VALUES_MARKER};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info, instrument};

/// Output layout options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Encode the header as UTF-16LE, the way LTspice does
    pub utf16_header: bool,
    /// Write a `Values:` text section instead of `Binary:`
    pub ascii_values: bool,
}

impl WriteOptions {
    /// LTspice layout: UTF-16 header, binary values
    pub fn ltspice() -> Self {
        Self {
            utf16_header: true,
            ascii_values: false,
        }
    }
}

/// Sink that encodes header text as either UTF-8 or UTF-16LE
struct HeaderSink<W: Write> {
    inner: W,
    utf16: bool,
}

impl<W: Write> HeaderSink<W> {
    fn line(&mut self, text: &str) -> Result<()> {
        if self.utf16 {
            for unit in text.encode_utf16().chain("\n".encode_utf16()) {
                self.inner.write_all(&unit.to_le_bytes())?;
            }
        } else {
            self.inner.write_all(text.as_bytes())?;
            self.inner.write_all(b"\n")?;
        }
        Ok(())
    }
}

/// Write the text header, ending with the data section marker
fn write_raw_header<W: Write>(
    sink: &mut HeaderSink<W>,
    container: &RawContainer,
    options: WriteOptions,
) -> Result<()> {
    sink.line(&format!("Title: {}", container.title))?;
    sink.line(&format!("Date: {}", container.date))?;
    sink.line(&format!("Plotname: {}", container.plotname))?;
    sink.line(&format!("Flags: {}", container.flags.to_header_value()))?;
    sink.line(&format!("No. Variables: {}", container.variables.len()))?;
    sink.line(&format!("No. Points: {}", container.declared_points))?;
    sink.line("Variables:")?;

    for (i, var) in container.variables.iter().enumerate() {
        sink.line(&format!("\t{}\t{}\t{}", i, var.name, var.var_type))?;
    }

    sink.line(if options.ascii_values {
        VALUES_MARKER
    } else {
        BINARY_MARKER
    })
}

/// Encode sample `point` of `vector`
fn write_sample<W: Write>(
    writer: &mut W,
    vector: &VectorData,
    point: usize,
    single: bool,
) -> Result<()> {
    match vector {
        VectorData::Complex(data) => {
            let c = data.get(point).copied().unwrap_or_default();
            writer.write_all(&c.re.to_le_bytes())?;
            writer.write_all(&c.im.to_le_bytes())?;
        }
        VectorData::Real(data) => {
            let val = data.get(point).copied().unwrap_or(0.0);
            if single {
                writer.write_all(&(val as f32).to_le_bytes())?;
            } else {
                writer.write_all(&val.to_le_bytes())?;
            }
        }
    }
    Ok(())
}

/// Write binary samples, point-major or trace-major when `fastaccess` is
/// flagged.
///
/// Mirrors the reader's width rules: complex pairs when flagged complex,
/// f32 in the LTspice layout unless `double` is set, except for the axis of
/// a swept plot.
fn write_binary_data<W: Write>(
    writer: &mut W,
    container: &RawContainer,
    ltspice_widths: bool,
) -> Result<()> {
    let num_points = container.declared_points;
    let has_axis = container.analysis.has_axis();
    let narrow: Vec<bool> = (0..container.vectors.len())
        .map(|index| ltspice_widths && !container.flags.double && (index > 0 || !has_axis))
        .collect();

    if container.flags.fastaccess {
        for (vector, &single) in container.vectors.iter().zip(narrow.iter()) {
            for i in 0..num_points {
                write_sample(writer, vector, i, single)?;
            }
        }
    } else {
        for i in 0..num_points {
            for (vector, &single) in container.vectors.iter().zip(narrow.iter()) {
                write_sample(writer, vector, i, single)?;
            }
        }
    }
    Ok(())
}

/// Write a `Values:` section: index then one value per variable
fn write_ascii_data<W: Write>(writer: &mut W, container: &RawContainer) -> Result<()> {
    for i in 0..container.declared_points {
        write!(writer, "{}", i)?;
        for vector in &container.vectors {
            match vector {
                VectorData::Real(data) => {
                    writeln!(writer, "\t{:e}", data.get(i).copied().unwrap_or(0.0))?;
                }
                VectorData::Complex(data) => {
                    let c = data.get(i).copied().unwrap_or_default();
                    writeln!(writer, "\t{:e},{:e}", c.re, c.im)?;
                }
            }
        }
    }
    Ok(())
}

/// Write a [`RawContainer`] to `output_path`.
///
/// # Errors
/// Fails if the container has a vector count different from its variable
/// count, or on any IO error.
#[instrument(skip_all, fields(output = %output_path.as_ref().display()))]
pub fn write_raw<P: AsRef<Path>>(
    container: &RawContainer,
    output_path: P,
    options: WriteOptions,
) -> Result<()> {
    info!("Writing raw container");

    if container.vectors.len() != container.variables.len() {
        return Err(DecodeError::CorruptContainer(format!(
            "{} vectors for {} variables",
            container.vectors.len(),
            container.variables.len()
        )));
    }

    debug!(
        points = container.declared_points,
        variables = container.variables.len(),
        "Data info"
    );

    let file = File::create(output_path.as_ref())?;
    let mut sink = HeaderSink {
        inner: BufWriter::new(file),
        utf16: options.utf16_header,
    };

    write_raw_header(&mut sink, container, options)?;

    let mut writer = sink.inner;
    if options.ascii_values {
        if options.utf16_header {
            let mut text = Vec::new();
            write_ascii_data(&mut text, container)?;
            let mut utf16 = HeaderSink {
                inner: &mut writer,
                utf16: true,
            };
            for line in String::from_utf8_lossy(&text).lines() {
                utf16.line(line)?;
            }
        } else {
            write_ascii_data(&mut writer, container)?;
        }
    } else {
        write_binary_data(&mut writer, container, options.utf16_header)?;
    }

    writer.flush()?;

    let bytes_written = std::fs::metadata(output_path.as_ref())?.len();
    info!(bytes = bytes_written, "Write complete");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw_parser::read_raw;
    use crate::types::{AnalysisType, RawFlags, VarType, Variable};
    use num_complex::Complex64;

    fn transient() -> RawContainer {
        RawContainer {
            title: "* rc".into(),
            date: "Mon Jan 1 00:00:00 2024".into(),
            plotname: "Transient Analysis".into(),
            analysis: AnalysisType::Transient,
            flags: RawFlags::default(),
            variables: vec![
                Variable::new("time", VarType::Time),
                Variable::new("V(out)", VarType::Voltage),
            ],
            declared_points: 3,
            vectors: vec![
                VectorData::Real(vec![0.0, 0.5e-3, 1e-3]),
                VectorData::Real(vec![0.0, 2.5, 4.75]),
            ],
        }
    }

    #[test]
    fn test_ltspice_layout_readable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rc.raw");
        write_raw(&transient(), &path, WriteOptions::ltspice()).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], &[b'T', 0, b'i', 0]);

        let raw = read_raw(&path).unwrap();
        assert_eq!(raw.variables.len(), 2);
        assert_eq!(raw.vectors[1], VectorData::Real(vec![0.0, 2.5, 4.75]));
    }

    #[test]
    fn test_fastaccess_written_trace_major() {
        let container = RawContainer {
            flags: RawFlags {
                fastaccess: true,
                double: true,
                ..RawFlags::default()
            },
            variables: vec![
                Variable::new("time", VarType::Time),
                Variable::new("V(a)", VarType::Voltage),
            ],
            vectors: vec![
                VectorData::Real(vec![0.0, 1.0, 2.0]),
                VectorData::Real(vec![10.0, 20.0, 30.0]),
            ],
            ..transient()
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fast.raw");
        write_raw(&container, &path, WriteOptions::default()).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let data = &bytes[bytes.len() - 48..];
        let first_trace: Vec<f64> = data[..24]
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(first_trace, vec![0.0, 1.0, 2.0]);

        let raw = read_raw(&path).unwrap();
        assert!(raw.flags.fastaccess);
        assert_eq!(raw.vectors, container.vectors);
    }

    #[test]
    fn test_ltspice_operating_point_readable() {
        let container = RawContainer {
            plotname: "Operating Point".into(),
            analysis: AnalysisType::Operating,
            variables: vec![
                Variable::new("V(1)", VarType::Voltage),
                Variable::new("I(R1)", VarType::Current),
            ],
            declared_points: 1,
            vectors: vec![VectorData::Real(vec![5.0]), VectorData::Real(vec![0.005])],
            ..transient()
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("op.raw");
        write_raw(&container, &path, WriteOptions::ltspice()).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let data = &bytes[bytes.len() - 8..];
        assert_eq!(&data[..4], &5.0f32.to_le_bytes());

        let raw = read_raw(&path).unwrap();
        assert_eq!(raw.vectors[0], VectorData::Real(vec![5.0]));
        assert_eq!(raw.vectors[1], VectorData::Real(vec![0.005f32 as f64]));
    }

    #[test]
    fn test_ascii_complex_readable() {
        let container = RawContainer {
            plotname: "AC Analysis".into(),
            analysis: AnalysisType::AC,
            flags: RawFlags {
                complex: true,
                ..RawFlags::default()
            },
            variables: vec![
                Variable::new("frequency", VarType::Frequency),
                Variable::new("V(out)", VarType::Voltage),
            ],
            declared_points: 2,
            vectors: vec![
                VectorData::Complex(vec![Complex64::new(1.0, 0.0), Complex64::new(10.0, 0.0)]),
                VectorData::Complex(vec![Complex64::new(0.5, -0.5), Complex64::new(0.1, -0.2)]),
            ],
            ..transient()
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ac.raw");
        let options = WriteOptions {
            utf16_header: false,
            ascii_values: true,
        };
        write_raw(&container, &path, options).unwrap();

        let raw = read_raw(&path).unwrap();
        assert!(raw.flags.complex);
        assert_eq!(raw.vectors[1], container.vectors[1]);
    }

    #[test]
    fn test_rejects_vector_count_mismatch() {
        let mut container = transient();
        container.vectors.pop();
        let dir = tempfile::tempdir().unwrap();
        let err = write_raw(&container, dir.path().join("x.raw"), WriteOptions::default());
        assert!(err.is_err());
    }
}
