use serde::{Deserialize, Serialize};

use super::domain::{AnswerSet, OptionId, QuestionId};

/// Closed set of conditions over an answer set, evaluated by [`Predicate::matches`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    /// The question was answered with exactly this option.
    Equals {
        question: QuestionId,
        option: OptionId,
    },
    /// The question was answered with any of these options.
    InSet {
        question: QuestionId,
        options: Vec<OptionId>,
    },
    AllOf {
        predicates: Vec<Predicate>,
    },
    AnyOf {
        predicates: Vec<Predicate>,
    },
}

impl Predicate {
    pub fn equals(question: &str, option: &str) -> Self {
        Predicate::Equals {
            question: QuestionId(question.to_string()),
            option: OptionId(option.to_string()),
        }
    }

    pub fn matches(&self, answers: &AnswerSet) -> bool {
        match self {
            Predicate::Equals { question, option } => answers.get(question) == Some(option),
            Predicate::InSet { question, options } => answers
                .get(question)
                .map(|selected| options.contains(selected))
                .unwrap_or(false),
            Predicate::AllOf { predicates } => {
                predicates.iter().all(|predicate| predicate.matches(answers))
            }
            Predicate::AnyOf { predicates } => {
                predicates.iter().any(|predicate| predicate.matches(answers))
            }
        }
    }

    /// Every (question, option) pair referenced anywhere in the predicate tree.
    pub fn references(&self) -> Vec<(&QuestionId, &OptionId)> {
        let mut references = Vec::new();
        self.collect_references(&mut references);
        references
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<(&'a QuestionId, &'a OptionId)>) {
        match self {
            Predicate::Equals { question, option } => out.push((question, option)),
            Predicate::InSet { question, options } => {
                out.extend(options.iter().map(|option| (question, option)));
            }
            Predicate::AllOf { predicates } | Predicate::AnyOf { predicates } => {
                for predicate in predicates {
                    predicate.collect_references(out);
                }
            }
        }
    }

    /// Structural problems independent of the questionnaire (empty groups or sets).
    pub(crate) fn shape_problems(&self) -> Vec<&'static str> {
        let mut problems = Vec::new();
        self.collect_shape_problems(&mut problems);
        problems
    }

    fn collect_shape_problems(&self, out: &mut Vec<&'static str>) {
        match self {
            Predicate::Equals { .. } => {}
            Predicate::InSet { options, .. } => {
                if options.is_empty() {
                    out.push("in_set predicate lists no options");
                }
            }
            Predicate::AllOf { predicates } | Predicate::AnyOf { predicates } => {
                if predicates.is_empty() {
                    out.push("predicate group is empty");
                }
                for predicate in predicates {
                    predicate.collect_shape_problems(out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answers() -> AnswerSet {
        AnswerSet::new()
            .with("q_ransom", "yes")
            .with("q_lateral", "confirmed")
    }

    #[test]
    fn equals_requires_exact_option() {
        assert!(Predicate::equals("q_ransom", "yes").matches(&answers()));
        assert!(!Predicate::equals("q_ransom", "no").matches(&answers()));
        assert!(!Predicate::equals("q_missing", "yes").matches(&answers()));
    }

    #[test]
    fn in_set_matches_any_listed_option() {
        let predicate = Predicate::InSet {
            question: QuestionId::from("q_lateral"),
            options: vec![OptionId::from("suspected"), OptionId::from("confirmed")],
        };
        assert!(predicate.matches(&answers()));
    }

    #[test]
    fn groups_compose() {
        let all = Predicate::AllOf {
            predicates: vec![
                Predicate::equals("q_ransom", "yes"),
                Predicate::equals("q_lateral", "confirmed"),
            ],
        };
        let any = Predicate::AnyOf {
            predicates: vec![
                Predicate::equals("q_ransom", "no"),
                Predicate::equals("q_lateral", "confirmed"),
            ],
        };
        assert!(all.matches(&answers()));
        assert!(any.matches(&answers()));
        assert!(!Predicate::AllOf {
            predicates: vec![all, Predicate::equals("q_ransom", "no")]
        }
        .matches(&answers()));
    }

    #[test]
    fn deserializes_tagged_documents() {
        let raw = r#"{"op":"all_of","predicates":[
            {"op":"equals","question":"q_ransom","option":"yes"},
            {"op":"in_set","question":"q_lateral","options":["confirmed"]}
        ]}"#;
        let predicate: Predicate = serde_json::from_str(raw).expect("predicate parses");
        assert_eq!(predicate.references().len(), 2);
        assert!(predicate.matches(&answers()));
    }

    #[test]
    fn reports_empty_groups() {
        let predicate = Predicate::AnyOf {
            predicates: vec![Predicate::AllOf {
                predicates: Vec::new(),
            }],
        };
        assert_eq!(predicate.shape_problems(), vec!["predicate group is empty"]);
    }
}
