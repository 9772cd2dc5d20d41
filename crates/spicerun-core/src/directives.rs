//! `.plot` directive extraction from netlist text

use std::fmt;
use tracing::debug;

/// Analysis keywords that may follow `.plot` and are not signal tokens
const PLOT_ANALYSIS_KEYWORDS: &[&str] = &["tran", "ac", "dc", "noise", "op"];

/// Dot commands that make the simulator produce results
const ANALYSIS_COMMANDS: &[&str] = &[".tran", ".ac", ".op", ".dc", ".noise", ".tf"];

/// One requested signal, exactly as authored (`V(out)`, `I(R1)`, `OUT`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlotDirective(String);

impl PlotDirective {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `TYPE(name)` decomposition, e.g. `V(out)` → `("V", "out")`
    pub fn canonical(&self) -> Option<(&str, &str)> {
        split_canonical(&self.0)
    }
}

impl fmt::Display for PlotDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlotDirective {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

/// Split a `TYPE(name)` reference into its type and trimmed inner name.
///
/// `TYPE` must start with a letter and be alphanumeric (`V`, `I`, `Ix`,
/// `VM`). Returns `None` for bare names and malformed wrappers.
pub fn split_canonical(signal: &str) -> Option<(&str, &str)> {
    let signal = signal.trim();
    let open = signal.find('(')?;
    let inner = signal[open + 1..].strip_suffix(')')?;
    let kind = &signal[..open];

    let mut chars = kind.chars();
    let starts_alpha = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    if !starts_alpha || !chars.all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some((kind, inner.trim()))
}

/// Directive body of a line, if it is a `.plot` line
fn plot_body(line: &str) -> Option<&str> {
    let line = line.trim_start();
    let head = line.get(..5)?;
    if !head.eq_ignore_ascii_case(".plot") {
        return None;
    }
    let rest = &line[5..];
    // `.plotx` is a different command
    if rest.chars().next().is_some_and(|c| !c.is_whitespace()) {
        return None;
    }
    // Inline comment
    Some(rest.split(';').next().unwrap_or(rest))
}

/// Extract plot directive tokens from a netlist.
///
/// Scans every `.plot [tran|ac|dc|noise|op] token...` line (case-insensitive),
/// skips the optional analysis keyword, and pools the remaining tokens in
/// encounter order. Exact-duplicate tokens are kept once.
pub fn extract(netlist: &str) -> Vec<PlotDirective> {
    let mut directives: Vec<PlotDirective> = Vec::new();

    for body in netlist.lines().filter_map(plot_body) {
        let mut tokens = body.split_whitespace().peekable();
        if tokens
            .peek()
            .is_some_and(|t| PLOT_ANALYSIS_KEYWORDS.iter().any(|k| t.eq_ignore_ascii_case(k)))
        {
            tokens.next();
        }

        for token in tokens {
            if directives.iter().all(|d| d.as_str() != token) {
                directives.push(PlotDirective::new(token));
            }
        }
    }

    debug!(count = directives.len(), "Extracted plot directives");
    directives
}

/// Whether the netlist contains an analysis command (`.tran`, `.ac`, `.op`,
/// `.dc`, `.noise`, `.tf`).
pub fn has_analysis_command(netlist: &str) -> bool {
    netlist.lines().any(|line| {
        line.split_whitespace()
            .next()
            .is_some_and(|cmd| ANALYSIS_COMMANDS.iter().any(|c| cmd.eq_ignore_ascii_case(c)))
    })
}
