use serde::{Deserialize, Serialize};

use super::domain::SeverityLevel;
use super::errors::ConfigViolation;

/// Lower boundary of one severity range as written in a configuration document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdDefinition {
    pub level: SeverityLevel,
    pub min: f64,
}

/// Five half-open ranges `[min_i, min_{i+1})` over the score axis; the top range is unbounded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdTable {
    lower_bounds: [f64; SeverityLevel::COUNT],
}

/// Serializable view of one range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeverityRange {
    pub level: SeverityLevel,
    pub label: &'static str,
    pub min: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_exclusive: Option<f64>,
}

impl ThresholdTable {
    /// Builds the table, reporting every ordering or coverage problem at once.
    pub fn from_definitions(
        definitions: &[ThresholdDefinition],
    ) -> Result<Self, Vec<ConfigViolation>> {
        let mut violations = Vec::new();

        if definitions.len() != SeverityLevel::COUNT {
            violations.push(ConfigViolation::ThresholdCount {
                expected: SeverityLevel::COUNT,
                found: definitions.len(),
            });
            return Err(violations);
        }

        let mut lower_bounds = [0.0; SeverityLevel::COUNT];
        for (position, (definition, expected)) in definitions
            .iter()
            .zip(SeverityLevel::ordered())
            .enumerate()
        {
            if definition.level != expected {
                violations.push(ConfigViolation::ThresholdOrder {
                    position,
                    expected,
                    found: definition.level,
                });
            }
            if !definition.min.is_finite() {
                violations.push(ConfigViolation::NonFiniteThreshold {
                    level: definition.level,
                });
                continue;
            }
            lower_bounds[position] = definition.min;

            if position == 0 {
                if definition.min != 0.0 {
                    violations.push(ConfigViolation::ThresholdNotExhaustive {
                        min: definition.min,
                    });
                }
            } else {
                let previous = definitions[position - 1].min;
                if previous.is_finite() && definition.min <= previous {
                    violations.push(ConfigViolation::ThresholdNotIncreasing {
                        level: definition.level,
                        min: definition.min,
                        previous,
                    });
                }
            }
        }

        if violations.is_empty() {
            Ok(Self { lower_bounds })
        } else {
            Err(violations)
        }
    }

    /// Range lookup. Scores below the first boundary fall into the lowest level.
    pub fn classify(&self, score: f64) -> SeverityLevel {
        let levels = SeverityLevel::ordered();
        let mut level = levels[0];
        for (candidate, min) in levels.into_iter().zip(self.lower_bounds) {
            if score >= min {
                level = candidate;
            } else {
                break;
            }
        }
        level
    }

    pub fn lower_bound(&self, level: SeverityLevel) -> f64 {
        self.lower_bounds[level.index()]
    }

    pub fn upper_bound(&self, level: SeverityLevel) -> Option<f64> {
        self.lower_bounds.get(level.index() + 1).copied()
    }

    pub fn ranges(&self) -> Vec<SeverityRange> {
        SeverityLevel::ordered()
            .into_iter()
            .map(|level| SeverityRange {
                level,
                label: level.label(),
                min: self.lower_bound(level),
                max_exclusive: self.upper_bound(level),
            })
            .collect()
    }

    pub fn definitions(&self) -> Vec<ThresholdDefinition> {
        SeverityLevel::ordered()
            .into_iter()
            .map(|level| ThresholdDefinition {
                level,
                min: self.lower_bound(level),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definitions(mins: [f64; 5]) -> Vec<ThresholdDefinition> {
        SeverityLevel::ordered()
            .into_iter()
            .zip(mins)
            .map(|(level, min)| ThresholdDefinition { level, min })
            .collect()
    }

    fn default_table() -> ThresholdTable {
        ThresholdTable::from_definitions(&definitions([0.0, 41.0, 121.0, 281.0, 601.0]))
            .expect("valid thresholds")
    }

    #[test]
    fn boundaries_are_lower_inclusive() {
        let table = default_table();
        assert_eq!(table.classify(0.0), SeverityLevel::Informative);
        assert_eq!(table.classify(40.0), SeverityLevel::Informative);
        assert_eq!(table.classify(40.99), SeverityLevel::Informative);
        assert_eq!(table.classify(41.0), SeverityLevel::Suspicious);
        assert_eq!(table.classify(280.0), SeverityLevel::Incident);
        assert_eq!(table.classify(281.0), SeverityLevel::Critical);
        assert_eq!(table.classify(600.0), SeverityLevel::Critical);
        assert_eq!(table.classify(601.0), SeverityLevel::Breach);
        assert_eq!(table.classify(1.0e9), SeverityLevel::Breach);
    }

    #[test]
    fn negative_scores_fall_into_lowest_level() {
        assert_eq!(default_table().classify(-12.5), SeverityLevel::Informative);
    }

    #[test]
    fn top_range_is_unbounded() {
        let table = default_table();
        assert_eq!(table.upper_bound(SeverityLevel::Breach), None);
        assert_eq!(table.upper_bound(SeverityLevel::Critical), Some(601.0));
        assert_eq!(table.lower_bound(SeverityLevel::Breach), 601.0);
    }

    #[test]
    fn rejects_non_increasing_boundaries_and_reports_all() {
        let violations =
            ThresholdTable::from_definitions(&definitions([5.0, 41.0, 41.0, 30.0, 601.0]))
                .expect_err("invalid thresholds");
        assert!(violations.contains(&ConfigViolation::ThresholdNotExhaustive { min: 5.0 }));
        assert!(violations
            .iter()
            .filter(|violation| matches!(violation, ConfigViolation::ThresholdNotIncreasing { .. }))
            .count()
            == 2);
    }

    #[test]
    fn rejects_wrong_count_and_order() {
        let short = definitions([0.0, 41.0, 121.0, 281.0, 601.0])[..4].to_vec();
        assert_eq!(
            ThresholdTable::from_definitions(&short).expect_err("four levels"),
            vec![ConfigViolation::ThresholdCount {
                expected: 5,
                found: 4
            }]
        );

        let mut swapped = definitions([0.0, 41.0, 121.0, 281.0, 601.0]);
        swapped[1].level = SeverityLevel::Incident;
        let violations = ThresholdTable::from_definitions(&swapped).expect_err("misordered");
        assert!(matches!(
            violations[0],
            ConfigViolation::ThresholdOrder { position: 1, .. }
        ));
    }
}
