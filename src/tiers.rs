//! Positional difficulty tiers.
//!
//! Tier membership is a static policy over case positions, never inferred from
//! content: `{tier_name: (start_index, end_index_exclusive)}`. The default
//! policy is simple `0..5`, pattern `5..9`, context `9..14`, complex `14..`.

use serde::{Deserialize, Serialize};

use crate::fixture::TestCase;

/// Name of the trailing tier that absorbs cases past a closed policy's last bound.
pub const OVERFLOW_TIER: &str = "overflow";

/// Half-open index range `[start, end)` of one tier; `end: None` is open-ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierBound {
    pub name: String,
    pub start: usize,
    #[serde(default)]
    pub end: Option<usize>,
}

impl TierBound {
    pub fn new(name: impl Into<String>, start: usize, end: Option<usize>) -> Self {
        Self {
            name: name.into(),
            start,
            end,
        }
    }
}

/// Ordered tier boundaries that must partition `0..` without gaps or overlaps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TierPolicy {
    pub bounds: Vec<TierBound>,
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self {
            bounds: vec![
                TierBound::new("simple", 0, Some(5)),
                TierBound::new("pattern", 5, Some(9)),
                TierBound::new("context", 9, Some(14)),
                TierBound::new("complex", 14, None),
            ],
        }
    }
}

impl TierPolicy {
    /// Checks that the bounds are contiguous from zero and well-formed.
    pub fn validate(&self) -> Result<(), String> {
        let mut expected_start = 0;
        for (i, bound) in self.bounds.iter().enumerate() {
            if bound.name.trim().is_empty() {
                return Err(format!("tier #{} has an empty name", i + 1));
            }
            if bound.start != expected_start {
                return Err(format!(
                    "tier '{}' starts at {} but the previous tier ends at {}",
                    bound.name, bound.start, expected_start
                ));
            }
            match bound.end {
                Some(end) if end <= bound.start => {
                    return Err(format!(
                        "tier '{}' has an empty or inverted range {}..{}",
                        bound.name, bound.start, end
                    ));
                }
                Some(end) => expected_start = end,
                None if i + 1 != self.bounds.len() => {
                    return Err(format!(
                        "open-ended tier '{}' must be the last tier",
                        bound.name
                    ));
                }
                None => {}
            }
        }
        Ok(())
    }
}

/// A named, ordered slice of the case list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tier<'a> {
    pub name: String,
    pub start: usize,
    pub cases: &'a [TestCase],
}

impl Tier<'_> {
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

/// Splits `cases` into the policy's tiers. A tier whose range starts past the
/// end of the list is empty rather than an error.
pub fn classify<'a>(policy: &TierPolicy, cases: &'a [TestCase]) -> Vec<Tier<'a>> {
    let total = cases.len();
    let mut tiers: Vec<Tier<'a>> = policy
        .bounds
        .iter()
        .map(|bound| {
            let start = bound.start.min(total);
            let end = bound.end.unwrap_or(total).clamp(start, total);
            Tier {
                name: bound.name.clone(),
                start: bound.start,
                cases: &cases[start..end],
            }
        })
        .collect();

    let covered = policy
        .bounds
        .last()
        .map(|bound| bound.end.unwrap_or(usize::MAX))
        .unwrap_or(0);
    if covered < total {
        tiers.push(Tier {
            name: OVERFLOW_TIER.to_string(),
            start: covered,
            cases: &cases[covered..],
        });
    }

    tiers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cases(n: usize) -> Vec<TestCase> {
        (1..=n)
            .map(|i| TestCase {
                ordinal: i,
                line: i,
                input: format!("in{i}"),
                expected: format!("out{i}"),
            })
            .collect()
    }

    fn sizes(tiers: &[Tier<'_>]) -> Vec<usize> {
        tiers.iter().map(Tier::len).collect()
    }

    #[test]
    fn sixteen_cases_split_five_four_five_two() {
        let cases = cases(16);
        let tiers = classify(&TierPolicy::default(), &cases);
        assert_eq!(sizes(&tiers), vec![5, 4, 5, 2]);
        let names: Vec<_> = tiers.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["simple", "pattern", "context", "complex"]);
    }

    #[test]
    fn partition_is_total_and_disjoint() {
        for n in 0..25 {
            let cases = cases(n);
            let tiers = classify(&TierPolicy::default(), &cases);
            let ordinals: Vec<usize> = tiers
                .iter()
                .flat_map(|t| t.cases.iter().map(|c| c.ordinal))
                .collect();
            assert_eq!(ordinals, (1..=n).collect::<Vec<_>>(), "n = {n}");
        }
    }

    #[test]
    fn short_lists_leave_later_tiers_empty() {
        let cases = cases(3);
        let tiers = classify(&TierPolicy::default(), &cases);
        assert_eq!(sizes(&tiers), vec![3, 0, 0, 0]);
        assert!(tiers[3].is_empty());

        let tiers = classify(&TierPolicy::default(), &[]);
        assert_eq!(tiers.len(), 4);
        assert!(tiers.iter().all(Tier::is_empty));
    }

    #[test]
    fn closed_policy_gets_overflow_tier() {
        let policy = TierPolicy {
            bounds: vec![TierBound::new("a", 0, Some(2)), TierBound::new("b", 2, Some(3))],
        };
        let cases = cases(5);
        let tiers = classify(&policy, &cases);
        assert_eq!(sizes(&tiers), vec![2, 1, 2]);
        assert_eq!(tiers[2].name, OVERFLOW_TIER);
        assert_eq!(tiers[2].start, 3);
    }

    #[test]
    fn default_policy_is_valid() {
        assert_eq!(TierPolicy::default().validate(), Ok(()));
    }

    #[test]
    fn validate_rejects_gaps_overlaps_and_misplaced_open_tier() {
        let gap = TierPolicy {
            bounds: vec![TierBound::new("a", 0, Some(2)), TierBound::new("b", 3, None)],
        };
        assert!(gap.validate().unwrap_err().contains("starts at 3"));

        let overlap = TierPolicy {
            bounds: vec![TierBound::new("a", 0, Some(4)), TierBound::new("b", 2, None)],
        };
        assert!(overlap.validate().is_err());

        let open_first = TierPolicy {
            bounds: vec![TierBound::new("a", 0, None), TierBound::new("b", 0, None)],
        };
        assert!(open_first.validate().unwrap_err().contains("must be the last"));

        let inverted = TierPolicy {
            bounds: vec![TierBound::new("a", 0, Some(0))],
        };
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn policy_reads_from_yaml() {
        let yaml = "- name: warmup\n  start: 0\n  end: 2\n- name: rest\n  start: 2\n";
        let policy: TierPolicy = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(policy.bounds[0], TierBound::new("warmup", 0, Some(2)));
        assert_eq!(policy.bounds[1].end, None);
    }
}
