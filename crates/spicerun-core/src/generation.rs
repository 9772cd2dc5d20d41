//! Interpretation of text replies from a netlist-generating model
//!
//! The model itself lives outside this crate; this module only turns its
//! reply into a netlist to simulate, or a typed reason why there is none.

use tracing::debug;

/// Reply prefix signalling that the configured model is no longer served
pub const MODEL_EXPIRED_PREFIX: &str = "__MODEL_EXPIRED__:";

const FENCE: &str = "```";
const SPICE_TAG: &str = "spice";

/// First characters a netlist's first line may start with
const NETLIST_LEADERS: &[char] = &['*', 'V', 'R', 'I', 'C', 'L', 'D', 'M', 'K', 'X', '.'];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("reply contains no recognizable SPICE netlist")]
    NoNetlist,
}

/// Netlist extracted from a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedNetlist {
    pub netlist: String,
    /// Prose surrounding the netlist block, if any
    pub summary: Option<String>,
}

fn starts_like_netlist(text: &str) -> bool {
    text.lines()
        .next()
        .is_some_and(|line| line.trim().starts_with(NETLIST_LEADERS))
}

fn ends_with_end(text: &str) -> bool {
    text.lines()
        .last()
        .is_some_and(|line| line.trim().eq_ignore_ascii_case(".end"))
}

/// A fenced block: its content and the byte range of the whole block
struct Fenced<'a> {
    content: &'a str,
    start: usize,
    end: usize,
}

impl<'a> Fenced<'a> {
    fn summary(&self, reply: &str) -> Option<String> {
        let before = reply[..self.start].trim();
        let after = reply[self.end..].trim();
        let prose = match (before.is_empty(), after.is_empty()) {
            (true, true) => return None,
            (false, true) => before.to_string(),
            (true, false) => after.to_string(),
            (false, false) => format!("{}\n{}", before, after),
        };
        Some(prose)
    }
}

/// Block opened by a fence at `open` whose content starts `skip` bytes later
fn fenced_at(reply: &str, open: usize, skip: usize) -> Option<Fenced<'_>> {
    let body_start = open + skip;
    let close = body_start + reply[body_start..].find(FENCE)?;
    Some(Fenced {
        content: reply[body_start..close].trim(),
        start: open,
        end: close + FENCE.len(),
    })
}

/// First ```` ```spice ```` block, tag matched case-insensitively
fn spice_block(reply: &str) -> Option<Fenced<'_>> {
    let mut from = 0;
    while let Some(pos) = reply[from..].find(FENCE) {
        let open = from + pos;
        let tag = reply
            .get(open + FENCE.len()..open + FENCE.len() + SPICE_TAG.len())
            .is_some_and(|t| t.eq_ignore_ascii_case(SPICE_TAG));
        if tag {
            return fenced_at(reply, open, FENCE.len() + SPICE_TAG.len());
        }
        from = open + FENCE.len();
    }
    None
}

fn generic_block(reply: &str) -> Option<Fenced<'_>> {
    let open = reply.find(FENCE)?;
    fenced_at(reply, open, FENCE.len())
}

/// Turn a model reply into a netlist.
///
/// Tried in order: a ```` ```spice ```` fenced block; the first fenced block
/// if its content looks like a netlist; the whole reply if it starts like a
/// netlist and ends with `.end`.
///
/// # Errors
/// * [`GenerationError::ModelUnavailable`] for replies carrying
///   [`MODEL_EXPIRED_PREFIX`]; such replies are never parsed as netlists
/// * [`GenerationError::NoNetlist`] when nothing plausible is found
pub fn interpret_completion(reply: &str) -> Result<GeneratedNetlist, GenerationError> {
    if let Some(message) = reply.strip_prefix(MODEL_EXPIRED_PREFIX) {
        return Err(GenerationError::ModelUnavailable(message.trim().to_string()));
    }

    if let Some(block) = spice_block(reply) {
        debug!("Found spice fenced block");
        return Ok(GeneratedNetlist {
            netlist: block.content.to_string(),
            summary: block.summary(reply),
        });
    }

    if let Some(block) = generic_block(reply) {
        if starts_like_netlist(block.content) || ends_with_end(block.content) {
            debug!("Found generic fenced block");
            return Ok(GeneratedNetlist {
                netlist: block.content.to_string(),
                summary: block.summary(reply),
            });
        }
        debug!("Fenced block does not look like a netlist");
    }

    let whole = reply.trim();
    if starts_like_netlist(whole) && ends_with_end(whole) {
        return Ok(GeneratedNetlist {
            netlist: whole.to_string(),
            summary: None,
        });
    }

    Err(GenerationError::NoNetlist)
}
