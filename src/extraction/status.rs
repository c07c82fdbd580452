//! Outcome lattice for documentation-writing attempts.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Outcome of one write attempt, totally ordered from worst to best.
///
/// Ordering comes from [`ExtractionStatus::rank`], never from the order the
/// variants are declared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExtractionStatus {
    /// The model produced nothing usable or the call failed.
    NoEdits,
    /// Output exists but holds no text.
    RawTextProduced,
    /// No edit blocks could be parsed.
    EditsUnparseable,
    /// Edits were parsed but none matched the code.
    EditsUnmatched,
    /// A matched edit declared an empty original.
    MatchedEmptyOrigin,
    /// Edits matched but changed nothing.
    MatchedEmptyDiff,
    /// Edits matched and produced a real diff.
    Finished,
}

impl ExtractionStatus {
    /// Every status, worst first.
    pub const ALL: [ExtractionStatus; 7] = [
        Self::NoEdits,
        Self::RawTextProduced,
        Self::EditsUnparseable,
        Self::EditsUnmatched,
        Self::MatchedEmptyOrigin,
        Self::MatchedEmptyDiff,
        Self::Finished,
    ];

    /// Position in the lattice; higher is better.
    pub fn rank(self) -> u8 {
        match self {
            Self::NoEdits => 1,
            Self::RawTextProduced => 2,
            Self::EditsUnparseable => 3,
            Self::EditsUnmatched => 4,
            Self::MatchedEmptyOrigin => 5,
            Self::MatchedEmptyDiff => 6,
            Self::Finished => 7,
        }
    }

    /// Stable name used in persisted history.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoEdits => "NO_EDITS",
            Self::RawTextProduced => "RAW_TEXT_PRODUCED",
            Self::EditsUnparseable => "EDITS_UNPARSEABLE",
            Self::EditsUnmatched => "EDITS_UNMATCHED",
            Self::MatchedEmptyOrigin => "MATCHED_EMPTY_ORIGIN",
            Self::MatchedEmptyDiff => "MATCHED_EMPTY_DIFF",
            Self::Finished => "FINISHED",
        }
    }

    /// Whether this is the accepting terminal state.
    pub fn is_finished(self) -> bool {
        self == Self::Finished
    }

    /// Best status in `statuses`, or `None` if empty.
    pub fn best<I>(statuses: I) -> Option<Self>
    where
        I: IntoIterator<Item = Self>,
    {
        statuses.into_iter().max()
    }
}

impl PartialOrd for ExtractionStatus {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ExtractionStatus {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for ExtractionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExtractionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim())
            .ok_or_else(|| format!("Unknown extraction status: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_order() {
        for a in ExtractionStatus::ALL {
            for b in ExtractionStatus::ALL {
                if a != b {
                    assert!((a < b) ^ (b < a), "{} vs {}", a, b);
                }
            }
        }
    }

    #[test]
    fn test_all_is_sorted_worst_first() {
        let mut sorted = ExtractionStatus::ALL;
        sorted.sort();
        assert_eq!(sorted, ExtractionStatus::ALL);
        assert_eq!(
            ExtractionStatus::ALL.last().copied(),
            Some(ExtractionStatus::Finished)
        );
    }

    #[test]
    fn test_best_of_attempts() {
        let history = [
            ExtractionStatus::EditsUnmatched,
            ExtractionStatus::MatchedEmptyDiff,
            ExtractionStatus::NoEdits,
        ];
        assert_eq!(
            ExtractionStatus::best(history),
            Some(ExtractionStatus::MatchedEmptyDiff)
        );
        assert_eq!(ExtractionStatus::best([]), None);
    }

    #[test]
    fn test_empty_origin_ranks_below_empty_diff() {
        assert!(ExtractionStatus::MatchedEmptyOrigin < ExtractionStatus::MatchedEmptyDiff);
        assert!(ExtractionStatus::EditsUnmatched < ExtractionStatus::MatchedEmptyOrigin);
    }

    #[test]
    fn test_string_encoding_matches_serde() {
        for status in ExtractionStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            assert_eq!(status.as_str().parse::<ExtractionStatus>().unwrap(), status);
        }
        assert!("DONE".parse::<ExtractionStatus>().is_err());
    }
}
