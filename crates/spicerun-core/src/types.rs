//! Common types, errors, and constants for raw waveform decoding

use indexmap::IndexMap;
use num_complex::Complex64;
use std::fmt;
use std::path::PathBuf;

// ============================================================================
// Constants
// ============================================================================

/// Name of the preferred independent axis
pub const TIME_AXIS: &str = "time";

/// Header line introducing a binary data section
pub const BINARY_MARKER: &str = "Binary:";
/// Header line introducing an ASCII data section
pub const VALUES_MARKER: &str = "Values:";

// ============================================================================
// Enums
// ============================================================================

/// Analysis type, inferred from the container's `Plotname:` line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisType {
    Transient,
    AC,
    DC,
    Operating,
    Noise,
    TransferFunction,
    Unknown,
}

impl AnalysisType {
    /// Infer from a plot name such as `Transient Analysis` or `AC Analysis`
    pub fn from_plotname(plotname: &str) -> Self {
        let lower = plotname.trim().to_lowercase();
        let mut words = lower.split_whitespace();
        match (words.next(), words.next()) {
            (Some("transient"), _) => AnalysisType::Transient,
            (Some("ac"), _) => AnalysisType::AC,
            (Some("dc"), _) => AnalysisType::DC,
            (Some("operating"), _) => AnalysisType::Operating,
            (Some("noise"), _) => AnalysisType::Noise,
            (Some("transfer"), Some("function")) => AnalysisType::TransferFunction,
            _ => AnalysisType::Unknown,
        }
    }

    /// Whether variable 0 is a sweep axis. Operating point and transfer
    /// function plots hold a single point with no axis.
    pub fn has_axis(self) -> bool {
        !matches!(
            self,
            AnalysisType::Operating | AnalysisType::TransferFunction
        )
    }
}

/// Declared variable type from the `Variables:` directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    Time,
    Frequency,
    Voltage,
    Current,
    Unknown,
}

impl VarType {
    pub fn from_declared(type_str: &str) -> Self {
        match type_str.to_lowercase().as_str() {
            "time" => VarType::Time,
            "frequency" => VarType::Frequency,
            "voltage" => VarType::Voltage,
            "current" | "device_current" | "subckt_current" => VarType::Current,
            _ => VarType::Unknown,
        }
    }
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VarType::Time => "time",
            VarType::Frequency => "frequency",
            VarType::Voltage => "voltage",
            VarType::Current => "current",
            VarType::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Vector data - either real or complex
#[derive(Debug, Clone, PartialEq)]
pub enum VectorData {
    Real(Vec<f64>),
    Complex(Vec<Complex64>),
}

impl VectorData {
    pub fn len(&self) -> usize {
        match self {
            VectorData::Real(v) => v.len(),
            VectorData::Complex(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, VectorData::Complex(_))
    }

    /// Reduce to real samples; complex values become their magnitude.
    pub fn into_magnitudes(self) -> Vec<f64> {
        match self {
            VectorData::Real(v) => v,
            VectorData::Complex(v) => v.into_iter().map(|c| c.norm()).collect(),
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Error type for result container decoding
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("result container not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("result container declares no traces")]
    EmptyContainer,
    #[error("corrupt result container: {0}")]
    CorruptContainer(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DecodeError>;

// ============================================================================
// Diagnostics
// ============================================================================

/// Non-fatal observation recorded while decoding, resolving, or running
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// No `time` trace; the first declared trace was used as the axis
    AxisGuessed { axis: String },
    /// Trace dropped because its length differs from the axis
    LengthMismatch {
        trace: String,
        expected: usize,
        actual: usize,
    },
    /// A later trace reused an earlier trace's name and was dropped
    DuplicateTrace { trace: String },
    /// Fewer points were present than the header declared
    ShortData { declared: usize, actual: usize },
    /// A plot directive matched no trace
    UnresolvedDirective { token: String },
    /// Nothing resolved, so the first trace was selected
    FallbackSelection { trace: String },
    /// The netlist carries no analysis command
    NoAnalysisCommand,
    /// The run succeeded but its container could not be decoded
    DecodeFailed { reason: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::AxisGuessed { axis } => write!(
                f,
                "no '{}' trace found, assuming '{}' is the independent axis",
                TIME_AXIS, axis
            ),
            Diagnostic::LengthMismatch {
                trace,
                expected,
                actual,
            } => write!(
                f,
                "trace '{}' has {} samples, expected {}; dropped",
                trace, actual, expected
            ),
            Diagnostic::DuplicateTrace { trace } => {
                write!(f, "duplicate trace '{}' dropped", trace)
            }
            Diagnostic::ShortData { declared, actual } => write!(
                f,
                "container declares {} points but holds {}",
                declared, actual
            ),
            Diagnostic::UnresolvedDirective { token } => {
                write!(f, "plot directive '{}' matched no trace", token)
            }
            Diagnostic::FallbackSelection { trace } => {
                write!(f, "no directive resolved, selecting '{}'", trace)
            }
            Diagnostic::NoAnalysisCommand => {
                f.write_str("netlist has no analysis command (.tran, .ac, .op, .dc, .noise, .tf)")
            }
            Diagnostic::DecodeFailed { reason } => write!(f, "decode failed: {}", reason),
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A declared variable (trace) of a result container
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub var_type: VarType,
}

impl Variable {
    pub fn new(name: impl Into<String>, var_type: VarType) -> Self {
        Self {
            name: name.into(),
            var_type,
        }
    }
}

/// Flags from the `Flags:` header line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawFlags {
    pub complex: bool,
    pub double: bool,
    pub fastaccess: bool,
    pub stepped: bool,
    pub log_scale: bool,
}

impl RawFlags {
    pub fn parse(value: &str) -> Self {
        let mut flags = RawFlags::default();
        for flag in value.split_whitespace() {
            match flag.to_lowercase().as_str() {
                "complex" => flags.complex = true,
                "double" => flags.double = true,
                "fastaccess" => flags.fastaccess = true,
                "stepped" => flags.stepped = true,
                "log" => flags.log_scale = true,
                _ => {}
            }
        }
        flags
    }

    pub fn to_header_value(self) -> String {
        let mut parts = vec![if self.complex { "complex" } else { "real" }];
        parts.push("forward");
        if self.log_scale {
            parts.push("log");
        }
        if self.stepped {
            parts.push("stepped");
        }
        if self.double {
            parts.push("double");
        }
        if self.fastaccess {
            parts.push("fastaccess");
        }
        parts.join(" ")
    }
}

/// Raw container contents, one vector per declared variable
#[derive(Debug, Clone)]
pub struct RawContainer {
    pub title: String,
    pub date: String,
    pub plotname: String,
    pub analysis: AnalysisType,
    pub flags: RawFlags,
    pub variables: Vec<Variable>,
    /// Point count from the `No. Points:` line
    pub declared_points: usize,
    pub vectors: Vec<VectorData>,
}

impl RawContainer {
    pub fn trace_names(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(|v| v.name.as_str())
    }
}

/// Decoded waveform: one independent axis plus named dependent traces
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformTable {
    axis_name: String,
    axis: Vec<f64>,
    traces: IndexMap<String, Vec<f64>>,
}

impl WaveformTable {
    /// Build a table, keeping only traces that match the axis length.
    ///
    /// Rejected traces are returned as diagnostics.
    pub fn build(
        axis_name: impl Into<String>,
        axis: Vec<f64>,
        traces: impl IntoIterator<Item = (String, Vec<f64>)>,
    ) -> (Self, Vec<Diagnostic>) {
        let expected = axis.len();
        let mut diagnostics = Vec::new();
        let mut kept = IndexMap::new();

        for (name, samples) in traces {
            if samples.len() != expected {
                diagnostics.push(Diagnostic::LengthMismatch {
                    trace: name,
                    expected,
                    actual: samples.len(),
                });
            } else if kept.contains_key(&name) {
                diagnostics.push(Diagnostic::DuplicateTrace { trace: name });
            } else {
                kept.insert(name, samples);
            }
        }

        let table = Self {
            axis_name: axis_name.into(),
            axis,
            traces: kept,
        };
        (table, diagnostics)
    }

    pub fn axis_name(&self) -> &str {
        &self.axis_name
    }

    pub fn axis(&self) -> &[f64] {
        &self.axis
    }

    /// Number of samples in the axis and in every trace
    pub fn samples_count(&self) -> usize {
        self.axis.len()
    }

    /// Dependent trace names in declared order
    pub fn trace_names(&self) -> impl Iterator<Item = &str> {
        self.traces.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.traces.get(name).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.traces
            .iter()
            .map(|(name, samples)| (name.as_str(), samples.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_analysis_type() {
        assert_eq!(
            AnalysisType::from_plotname("Transient Analysis"),
            AnalysisType::Transient
        );
        assert_eq!(
            AnalysisType::from_plotname("AC Analysis"),
            AnalysisType::AC
        );
        assert_eq!(
            AnalysisType::from_plotname("DC transfer characteristic"),
            AnalysisType::DC
        );
        assert_eq!(
            AnalysisType::from_plotname("Operating Point"),
            AnalysisType::Operating
        );
        assert_eq!(
            AnalysisType::from_plotname("Noise Spectral Density - (V/Hz½ or A/Hz½)"),
            AnalysisType::Noise
        );
        assert_eq!(
            AnalysisType::from_plotname("Transfer Function"),
            AnalysisType::TransferFunction
        );
        assert_eq!(
            AnalysisType::from_plotname("Transfer characteristic"),
            AnalysisType::Unknown
        );
    }

    #[test]
    fn test_single_point_plots_have_no_axis() {
        assert!(AnalysisType::Transient.has_axis());
        assert!(AnalysisType::AC.has_axis());
        assert!(AnalysisType::Unknown.has_axis());
        assert!(!AnalysisType::Operating.has_axis());
        assert!(!AnalysisType::TransferFunction.has_axis());
    }

    #[test]
    fn test_flags_parse() {
        let flags = RawFlags::parse("complex forward log");
        assert!(flags.complex);
        assert!(flags.log_scale);
        assert!(!flags.double);

        let flags = RawFlags::parse("real forward double fastaccess");
        assert!(!flags.complex);
        assert!(flags.double);
        assert!(flags.fastaccess);
    }

    #[test]
    fn test_complex_magnitudes() {
        let data = VectorData::Complex(vec![Complex64::new(3.0, -4.0), Complex64::new(-1.0, 0.0)]);
        assert_eq!(data.into_magnitudes(), vec![5.0, 1.0]);
    }

    #[test]
    fn test_table_drops_mismatched_trace() {
        let (table, diagnostics) = WaveformTable::build(
            "time",
            vec![0.0, 1.0, 2.0],
            vec![
                ("V(out)".to_string(), vec![1.0, 2.0, 3.0]),
                ("I(R1)".to_string(), vec![1.0, 2.0]),
            ],
        );

        assert_eq!(table.trace_names().collect::<Vec<_>>(), vec!["V(out)"]);
        assert_eq!(
            diagnostics,
            vec![Diagnostic::LengthMismatch {
                trace: "I(R1)".into(),
                expected: 3,
                actual: 2,
            }]
        );
    }

    #[test]
    fn test_table_keeps_first_duplicate() {
        let (table, diagnostics) = WaveformTable::build(
            "time",
            vec![0.0],
            vec![("V(a)".to_string(), vec![1.0]), ("V(a)".to_string(), vec![2.0])],
        );
        assert_eq!(table.get("V(a)"), Some(&[1.0][..]));
        assert_eq!(diagnostics.len(), 1);
    }
}
