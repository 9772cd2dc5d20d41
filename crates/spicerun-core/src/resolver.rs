//! Plot directive → trace name resolution
//!
//! Each directive is tried against the available traces tier by tier; the
//! first tier that produces a match wins for that directive:
//!
//! 1. [`MatchTier::Exact`]: whole-name, case-insensitive
//! 2. [`MatchTier::Canonical`]: `TYPE(name)` against each trace's decomposition
//! 3. [`MatchTier::BareName`]: bare token against the trace's inner name
//! 4. [`MatchTier::Containment`]: best-scoring `V(...)` trace by substring
//! 5. [`MatchTier::Substring`]: first trace containing the token

use crate::directives::{split_canonical, PlotDirective};
use crate::types::Diagnostic;
use tracing::{debug, warn};

/// Score for an exact inner-name match
const EXACT_SCORE: f64 = 100.0;
/// Score when the directive's name is contained in the trace's name
const TOKEN_IN_TRACE_SCORE: f64 = 50.0;
/// Score when the trace's name is contained in the directive's name
const TRACE_IN_TOKEN_SCORE: f64 = 30.0;
/// Per-character penalty on the trace's inner name, favoring shorter names
const LENGTH_PENALTY: f64 = 0.1;

/// How a directive was matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    Exact,
    Canonical,
    BareName,
    Containment,
    Substring,
}

/// One resolved directive
#[derive(Debug, Clone, PartialEq)]
pub struct SignalMatch {
    pub directive: PlotDirective,
    pub trace: String,
    pub tier: MatchTier,
}

/// Ordered, duplicate-free trace names selected for plotting
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedSelection(Vec<String>);

impl ResolvedSelection {
    fn push_unique(&mut self, trace: &str) {
        if !self.0.iter().any(|t| t == trace) {
            self.0.push(trace.to_string());
        }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

/// Outcome of [`resolve`]
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub selection: ResolvedSelection,
    pub matches: Vec<SignalMatch>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Inner name of a trace: `V(out)` → `out`, `time` → `time`
fn inner_name(trace: &str) -> &str {
    split_canonical(trace).map_or(trace, |(_, inner)| inner)
}

fn is_voltage(trace: &str) -> bool {
    split_canonical(trace).is_some_and(|(kind, _)| kind.eq_ignore_ascii_case("V"))
}

/// Score a voltage trace's inner name against a directive's inner name.
///
/// Both arguments must already be lowercase.
fn containment_score(token_inner: &str, trace_inner: &str) -> f64 {
    let base = if token_inner == trace_inner {
        EXACT_SCORE
    } else if trace_inner.contains(token_inner) {
        TOKEN_IN_TRACE_SCORE
    } else if token_inner.contains(trace_inner) {
        TRACE_IN_TOKEN_SCORE
    } else {
        return 0.0;
    };
    base - LENGTH_PENALTY * trace_inner.chars().count() as f64
}

fn match_directive<'t>(
    directive: &PlotDirective,
    traces: &[&'t str],
) -> Option<(&'t str, MatchTier)> {
    let token = directive.as_str();
    let canonical = directive.canonical();

    if let Some(trace) = traces.iter().copied().find(|t| t.eq_ignore_ascii_case(token)) {
        return Some((trace, MatchTier::Exact));
    }

    match canonical {
        Some((kind, name)) => {
            let found = traces.iter().copied().find(|t| {
                split_canonical(t).is_some_and(|(tk, tn)| {
                    tk.eq_ignore_ascii_case(kind) && tn.eq_ignore_ascii_case(name)
                })
            });
            if let Some(trace) = found {
                return Some((trace, MatchTier::Canonical));
            }
        }
        None if !token.contains('(') => {
            if let Some(trace) = traces
                .iter()
                .copied()
                .find(|t| inner_name(t).eq_ignore_ascii_case(token))
            {
                return Some((trace, MatchTier::BareName));
            }
        }
        None => {}
    }

    // Scored against node voltages only, whatever the token's own type
    let token_inner = canonical.map_or(token, |(_, name)| name).to_lowercase();
    if !token_inner.is_empty() {
        let mut best: Option<(&'t str, f64)> = None;
        for trace in traces.iter().copied().filter(|t| is_voltage(t)) {
            let trace_inner = inner_name(trace).to_lowercase();
            if trace_inner.is_empty() {
                continue;
            }
            let score = containment_score(&token_inner, &trace_inner);
            if score > 0.0 && best.map_or(true, |(_, s)| score > s) {
                best = Some((trace, score));
            }
        }
        if let Some((trace, score)) = best {
            debug!(token, trace, score, "Containment match");
            return Some((trace, MatchTier::Containment));
        }
    }

    let needle = token.to_lowercase();
    traces
        .iter()
        .copied()
        .find(|t| t.to_lowercase().contains(&needle))
        .map(|trace| (trace, MatchTier::Substring))
}

/// Resolve plot directives against the available trace names.
///
/// Output follows directive order with duplicates collapsed. Directives that
/// match nothing are reported as [`Diagnostic::UnresolvedDirective`]. When
/// nothing resolves (including an empty directive list) the first available
/// trace is selected so a successful run always has something to show.
pub fn resolve<'a, I>(directives: &[PlotDirective], available_traces: I) -> Resolution
where
    I: IntoIterator<Item = &'a str>,
{
    let traces: Vec<&str> = available_traces.into_iter().collect();
    let mut resolution = Resolution::default();

    for directive in directives {
        match match_directive(directive, &traces) {
            Some((trace, tier)) => {
                debug!(directive = %directive, trace, ?tier, "Resolved directive");
                resolution.selection.push_unique(trace);
                resolution.matches.push(SignalMatch {
                    directive: directive.clone(),
                    trace: trace.to_string(),
                    tier,
                });
            }
            None => {
                warn!(directive = %directive, "Directive matched no trace");
                resolution.diagnostics.push(Diagnostic::UnresolvedDirective {
                    token: directive.to_string(),
                });
            }
        }
    }

    if resolution.selection.is_empty() {
        if let Some(first) = traces.first() {
            resolution.selection.push_unique(first);
            resolution.diagnostics.push(Diagnostic::FallbackSelection {
                trace: first.to_string(),
            });
        }
    }

    resolution
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directives(tokens: &[&str]) -> Vec<PlotDirective> {
        tokens.iter().map(|t| PlotDirective::new(*t)).collect()
    }

    fn selected(tokens: &[&str], traces: &[&str]) -> Vec<String> {
        resolve(&directives(tokens), traces.iter().copied())
            .selection
            .into_vec()
    }

    fn tier(token: &str, traces: &[&str]) -> Option<MatchTier> {
        resolve(&directives(&[token]), traces.iter().copied())
            .matches
            .first()
            .map(|m| m.tier)
    }

    #[yare::parameterized(
        lower_to_upper = { "V(out)", "V(OUT)" },
        upper_to_lower = { "v(OUT)", "V(out)" },
        mixed          = { "V(Out)", "v(oUT)" },
    )]
    fn voltage_case_insensitive(token: &str, trace: &str) {
        let traces = ["time", "V(in)", trace];
        assert_eq!(selected(&[token], &traces), vec![trace.to_string()]);
        assert_eq!(tier(token, &traces), Some(MatchTier::Exact));
    }

    #[test]
    fn test_canonical_tier_trims_inner_whitespace() {
        let traces = ["V(out)", "I(R1)"];
        assert_eq!(selected(&["i( r1 )"], &traces), vec!["I(R1)"]);
        assert_eq!(tier("i( r1 )", &traces), Some(MatchTier::Canonical));
    }

    #[test]
    fn test_bare_name_tier() {
        let traces = ["V(in)", "V(out)"];
        assert_eq!(selected(&["OUT"], &traces), vec!["V(out)"]);
        assert_eq!(tier("OUT", &traces), Some(MatchTier::BareName));
    }

    #[test]
    fn test_containment_prefers_shorter_name() {
        let traces = ["V(vout_buffered)", "V(vout_b)", "I(vin)"];
        assert_eq!(selected(&["vout"], &traces), vec!["V(vout_b)"]);
        assert_eq!(tier("vout", &traces), Some(MatchTier::Containment));
    }

    #[test]
    fn test_containment_trace_inside_token() {
        let traces = ["V(n1)", "V(n2)"];
        assert_eq!(selected(&["V(n1_filtered)"], &traces), vec!["V(n1)"]);
    }

    #[test]
    fn test_current_directive_contained_in_voltage_trace() {
        let traces = ["V(r1)", "V(out)"];
        let resolution = resolve(&directives(&["I(R1)"]), traces);
        assert_eq!(resolution.selection.as_slice(), &["V(r1)".to_string()]);
        assert_eq!(tier("I(R1)", &traces), Some(MatchTier::Containment));
        assert!(resolution.diagnostics.is_empty());
    }

    #[test]
    fn test_substring_last_resort() {
        let traces = ["V(out)", "Id(M1)", "Ig(M1)"];
        assert_eq!(selected(&["Id"], &traces), vec!["Id(M1)"]);
        assert_eq!(tier("Id", &traces), Some(MatchTier::Substring));
    }

    #[test]
    fn test_empty_directives_fall_back_to_first_trace() {
        let resolution = resolve(&[], ["V(a)", "V(b)"]);
        assert_eq!(resolution.selection.as_slice(), &["V(a)".to_string()]);
        assert_eq!(
            resolution.diagnostics,
            vec![Diagnostic::FallbackSelection {
                trace: "V(a)".into()
            }]
        );
    }

    #[test]
    fn test_unresolved_directives_fall_back() {
        let resolution = resolve(&directives(&["V(missing)"]), ["V(a)"]);
        assert_eq!(resolution.selection.as_slice(), &["V(a)".to_string()]);
        assert_eq!(resolution.diagnostics.len(), 2);
        assert!(matches!(
            &resolution.diagnostics[0],
            Diagnostic::UnresolvedDirective { token } if token == "V(missing)"
        ));
    }

    #[test]
    fn test_partial_resolution_keeps_only_matches() {
        let resolution = resolve(&directives(&["V(missing)", "V(b)"]), ["V(a)", "V(b)"]);
        assert_eq!(resolution.selection.as_slice(), &["V(b)".to_string()]);
        assert_eq!(resolution.diagnostics.len(), 1);
    }

    #[test]
    fn test_no_traces_no_selection() {
        let resolution = resolve(&directives(&["V(a)"]), std::iter::empty());
        assert!(resolution.selection.is_empty());
    }

    #[test]
    fn test_order_follows_directives_and_dedupes() {
        let traces = ["V(a)", "V(b)", "V(c)"];
        assert_eq!(
            selected(&["V(c)", "a", "v(C)", "V(a)"], &traces),
            vec!["V(c)", "V(a)"]
        );
    }

    #[test]
    fn test_containment_score_values() {
        assert!((containment_score("out", "out") - 99.7).abs() < 1e-9);
        assert!((containment_score("out", "vout") - 49.6).abs() < 1e-9);
        assert!((containment_score("vout", "out") - 29.7).abs() < 1e-9);
        assert_eq!(containment_score("a", "b"), 0.0);
    }
}
