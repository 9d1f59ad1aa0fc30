//! Message routing for agentmesh.
//!
//! Handles:
//! - Route-prefix parsing (@agent_id or @team_id on raw input)
//! - Mention tag extraction ([@agent: message]) from agent responses

use regex::Regex;

/// A single mention tag found in an agent response.
#[derive(Debug, Clone, PartialEq)]
pub struct MentionMatch {
    /// Target agent or team id (lowercased).
    pub target_agent_id: String,

    /// Trimmed mention body.
    pub message: String,

    /// Byte offset of the opening `[` in the scanned text.
    pub start_pos: usize,

    /// Byte offset one past the closing `]`.
    pub end_pos: usize,
}

/// Result of parsing an explicit `@target message` prefix on raw input.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteTarget {
    /// Target agent or team id (lowercased).
    pub target_id: String,

    /// The remainder of the input, trimmed.
    pub message: String,

    /// Always false at parse time. Team-ness is resolved later against
    /// live configuration, not here.
    pub is_team: bool,
}

/// Extract mention tags from a response.
///
/// Format: `[@agent_id: message]`. Targets are letters, digits, `_` and `-`.
/// The body runs up to the first `]`, so nested brackets terminate it early:
/// `[@a: hello [world]]` matches body `hello [world` and leaves a dangling
/// `]` behind. That literal, non-recursive behavior is intentional.
///
/// # Examples
///
/// ```
/// use agentmesh::core::routing::extract_mentions;
///
/// let mentions = extract_mentions("Hello [@coder: fix this] [@reviewer: check this]");
/// assert_eq!(mentions.len(), 2);
/// assert_eq!(mentions[0].target_agent_id, "coder");
/// ```
pub fn extract_mentions(response: &str) -> Vec<MentionMatch> {
    let re = match Regex::new(r"\[@([A-Za-z0-9_-]+):([^\]]+)\]") {
        Ok(r) => r,
        Err(_) => return Vec::new(),
    };

    let mut results = Vec::new();

    for caps in re.captures_iter(response) {
        let whole = match caps.get(0) {
            Some(m) => m,
            None => continue,
        };
        let target = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let body = caps.get(2).map(|m| m.as_str()).unwrap_or("").trim();

        if target.is_empty() || body.is_empty() {
            continue;
        }

        results.push(MentionMatch {
            target_agent_id: target.to_lowercase(),
            message: body.to_string(),
            start_pos: whole.start(),
            end_pos: whole.end(),
        });
    }

    results
}

/// Parse agent routing from a message prefix.
///
/// Returns the route target if the message starts with `@target ` followed
/// by a non-empty message; otherwise None, and the caller falls back to the
/// default agent with the whole input as the message.
///
/// # Examples
///
/// ```
/// use agentmesh::core::routing::parse_route_prefix;
///
/// let route = parse_route_prefix("@coder fix the bug").unwrap();
/// assert_eq!(route.target_id, "coder");
/// assert_eq!(route.message, "fix the bug");
/// assert!(parse_route_prefix("@coder").is_none());
/// ```
pub fn parse_route_prefix(input: &str) -> Option<RouteTarget> {
    let trimmed = input.trim();
    let rest = trimmed.strip_prefix('@')?;
    let (target, remainder) = rest.split_once(char::is_whitespace)?;
    let message = remainder.trim();

    if target.is_empty() || message.is_empty() {
        return None;
    }

    Some(RouteTarget {
        target_id: target.to_lowercase(),
        message: message.to_string(),
        is_team: false,
    })
}
