//! Per-session matching state
//!
//! The matching state of a session is persisted entirely in its tags. This
//! module decodes those tags into a [`SessionState`] and computes the tag
//! changes ([`TagPlan`]) for the outcome of a matching attempt. Nothing here
//! talks to the platform.

use crate::domain::tags;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest backoff exponent: delays stop growing at `2^5 = 32` days
pub const MAX_BACKOFF_EXPONENT: u32 = 5;

/// Matching state decoded from session tags
///
/// # Examples
///
/// ```
/// use wbhi_sync::core::state::SessionState;
/// use chrono::NaiveDate;
///
/// let tags = vec!["retry_2_20240310".to_string()];
/// let state = SessionState::from_tags(&tags);
///
/// assert_eq!(
///     state,
///     SessionState::Retry {
///         attempt: 2,
///         next_check: NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
///     }
/// );
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum SessionState {
    /// Never attempted
    Unchecked,
    /// `attempt` failed attempts so far, eligible again on `next_check`
    Retry { attempt: u32, next_check: NaiveDate },
    /// Matched to a consent record. Terminal.
    Matched,
}

impl SessionState {
    /// Decodes the state from a session's tags
    ///
    /// `wbhi` wins over any retry marker. When several retry markers are
    /// present the lexicographically-last parseable one is used and the
    /// anomaly is logged.
    pub fn from_tags(tags: &[String]) -> Self {
        if tags.iter().any(|t| t == tags::MATCHED) {
            return SessionState::Matched;
        }

        let mut markers: Vec<&String> = tags.iter().filter(|t| tags::is_retry_marker(t)).collect();
        if markers.is_empty() {
            return SessionState::Unchecked;
        }
        markers.sort();
        if markers.len() > 1 {
            tracing::warn!(markers = ?markers, "Session has multiple retry markers, using the last");
        }

        for marker in markers.iter().rev() {
            match RetryMarker::parse(marker) {
                Some(parsed) => {
                    return SessionState::Retry {
                        attempt: parsed.attempt,
                        next_check: parsed.next_check,
                    }
                }
                None => tracing::warn!(marker = %marker, "Ignoring malformed retry marker"),
            }
        }
        SessionState::Unchecked
    }

    /// Failed attempts recorded so far
    pub fn attempts(&self) -> u32 {
        match self {
            SessionState::Retry { attempt, .. } => *attempt,
            SessionState::Unchecked | SessionState::Matched => 0,
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, SessionState::Matched)
    }

    /// Whether the session may be tried again on `today`
    pub fn is_due(&self, today: NaiveDate) -> bool {
        match self {
            SessionState::Unchecked => true,
            SessionState::Retry { next_check, .. } => *next_check <= today,
            SessionState::Matched => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Unchecked => f.write_str("unchecked"),
            SessionState::Retry {
                attempt,
                next_check,
            } => write!(f, "retry {attempt} (next check {next_check})"),
            SessionState::Matched => f.write_str("matched"),
        }
    }
}

/// A parsed `retry_<n>_<YYYYMMDD>` marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryMarker {
    pub attempt: u32,
    pub next_check: NaiveDate,
}

impl RetryMarker {
    pub fn parse(tag: &str) -> Option<Self> {
        let rest = tag.strip_prefix(tags::RETRY_PREFIX)?;
        let (attempt, date) = rest.split_once('_')?;
        Some(Self {
            attempt: attempt.parse().ok()?,
            next_check: NaiveDate::parse_from_str(date, tags::RETRY_DATE_FORMAT).ok()?,
        })
    }

    /// Marker written after a failed attempt, given the attempts made before it
    ///
    /// The delay doubles with each failure: one day after the first, capped
    /// at 32 days.
    pub fn after_failure(previous_attempts: u32, today: NaiveDate) -> Self {
        let delay = 1u64 << previous_attempts.min(MAX_BACKOFF_EXPONENT);
        Self {
            attempt: previous_attempts + 1,
            next_check: today.checked_add_days(Days::new(delay)).unwrap_or(NaiveDate::MAX),
        }
    }

    pub fn to_tag(&self) -> String {
        format!(
            "{}{}_{}",
            tags::RETRY_PREFIX,
            self.attempt,
            self.next_check.format(tags::RETRY_DATE_FORMAT)
        )
    }
}

/// Outcome of one matching attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    Matched,
    NoMatch,
}

/// Session tag changes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagPlan {
    pub add: Vec<String>,
    pub remove: Vec<String>,
}

impl TagPlan {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// Next state and the tag changes that persist it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: SessionState,
    pub plan: TagPlan,
}

/// Computes the transition for `outcome` on a session currently carrying `tags`
///
/// Every existing retry marker is removed, so the session never ends up with
/// more than one. A matched session is left alone.
pub fn transition(tags: &[String], outcome: MatchOutcome, today: NaiveDate) -> Transition {
    let current = SessionState::from_tags(tags);
    let stale: Vec<String> = tags
        .iter()
        .filter(|t| tags::is_retry_marker(t))
        .cloned()
        .collect();

    if current.is_matched() {
        return Transition {
            next: current,
            plan: TagPlan {
                add: Vec::new(),
                remove: stale,
            },
        };
    }

    match outcome {
        MatchOutcome::Matched => Transition {
            next: SessionState::Matched,
            plan: TagPlan {
                add: vec![tags::MATCHED.to_string()],
                remove: stale,
            },
        },
        MatchOutcome::NoMatch => {
            let marker = RetryMarker::after_failure(current.attempts(), today);
            Transition {
                next: SessionState::Retry {
                    attempt: marker.attempt,
                    next_check: marker.next_check,
                },
                plan: TagPlan {
                    add: vec![marker.to_tag()],
                    remove: stale,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_from_tags_states() {
        assert_eq!(SessionState::from_tags(&[]), SessionState::Unchecked);
        assert_eq!(
            SessionState::from_tags(&tags(&["retry_1_20240302", "wbhi"])),
            SessionState::Matched
        );
        assert_eq!(
            SessionState::from_tags(&tags(&["other", "retry_3_20240305"])),
            SessionState::Retry {
                attempt: 3,
                next_check: date(2024, 3, 5)
            }
        );
    }

    #[test]
    fn test_multiple_markers_last_wins() {
        let state = SessionState::from_tags(&tags(&["retry_4_20240320", "retry_2_20240303"]));
        assert_eq!(
            state,
            SessionState::Retry {
                attempt: 4,
                next_check: date(2024, 3, 20)
            }
        );
    }

    #[test]
    fn test_malformed_marker_falls_back() {
        assert_eq!(
            SessionState::from_tags(&tags(&["retry_x_garbage"])),
            SessionState::Unchecked
        );
        assert_eq!(
            SessionState::from_tags(&tags(&["retry_2_20240303", "retry_zz"])),
            SessionState::Retry {
                attempt: 2,
                next_check: date(2024, 3, 3)
            }
        );
    }

    #[test_case(0, 1, "retry_1_20240302" ; "first failure waits one day")]
    #[test_case(1, 2, "retry_2_20240303" ; "second failure waits two days")]
    #[test_case(3, 8, "retry_4_20240309" ; "fourth failure waits eight days")]
    #[test_case(5, 32, "retry_6_20240402" ; "delay reaches cap")]
    #[test_case(9, 32, "retry_10_20240402" ; "delay stays capped")]
    fn test_backoff(previous: u32, days: u64, expected: &str) {
        let today = date(2024, 3, 1);
        let marker = RetryMarker::after_failure(previous, today);
        assert_eq!(marker.next_check, today + Days::new(days));
        assert_eq!(marker.to_tag(), expected);
    }

    #[test]
    fn test_no_match_replaces_marker() {
        let t = transition(
            &tags(&["keep", "retry_2_20240303"]),
            MatchOutcome::NoMatch,
            date(2024, 3, 3),
        );
        assert_eq!(t.plan.add, vec!["retry_3_20240307".to_string()]);
        assert_eq!(t.plan.remove, vec!["retry_2_20240303".to_string()]);
        assert_eq!(t.next.attempts(), 3);
    }

    #[test]
    fn test_no_match_collapses_duplicates() {
        let t = transition(
            &tags(&["retry_1_20240302", "retry_2_20240303"]),
            MatchOutcome::NoMatch,
            date(2024, 3, 3),
        );
        assert_eq!(t.plan.add, vec!["retry_3_20240307".to_string()]);
        assert_eq!(t.plan.remove.len(), 2);
    }

    #[test]
    fn test_match_clears_markers() {
        let t = transition(
            &tags(&["retry_5_20240320"]),
            MatchOutcome::Matched,
            date(2024, 3, 20),
        );
        assert_eq!(t.next, SessionState::Matched);
        assert_eq!(t.plan.add, vec!["wbhi".to_string()]);
        assert_eq!(t.plan.remove, vec!["retry_5_20240320".to_string()]);
    }

    #[test]
    fn test_matched_is_terminal() {
        let t = transition(&tags(&["wbhi"]), MatchOutcome::NoMatch, date(2024, 3, 1));
        assert_eq!(t.next, SessionState::Matched);
        assert!(t.plan.is_empty());
    }

    #[test]
    fn test_is_due() {
        let retry = SessionState::Retry {
            attempt: 1,
            next_check: date(2024, 3, 2),
        };
        assert!(!retry.is_due(date(2024, 3, 1)));
        assert!(retry.is_due(date(2024, 3, 2)));
        assert!(SessionState::Unchecked.is_due(date(2024, 3, 1)));
        assert!(!SessionState::Matched.is_due(date(2024, 3, 1)));
    }
}
