use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::domain::{ModuleId, OptionId, QuestionId, RuleId, SeverityLevel};
use super::errors::{ConfigViolation, ConfigurationError};
use super::predicate::Predicate;
use super::thresholds::{ThresholdDefinition, ThresholdTable};

const DEFAULT_MIN_WEIGHT: f64 = 0.1;
const DEFAULT_MAX_WEIGHT: f64 = 3.0;

/// Selectable answer with its analyst-invisible raw score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub id: OptionId,
    pub label: String,
    pub score: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub module: ModuleId,
    pub text: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    pub options: Vec<AnswerOption>,
    /// Free-form markers such as MITRE technique ids or `network`.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Question {
    pub fn option(&self, id: &OptionId) -> Option<&AnswerOption> {
        self.options.iter().find(|option| &option.id == id)
    }

    /// Options scoring above zero indicate risk; zero or negative scores are baseline answers.
    pub fn is_risk_indicating(&self, id: &OptionId) -> bool {
        self.option(id).map(|option| option.score > 0).unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub id: ModuleId,
    pub name: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub order: u32,
    /// Questions in display order.
    pub questions: Vec<QuestionId>,
}

/// Forces a minimum severity whenever its predicate matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardRule {
    pub id: RuleId,
    pub description: String,
    pub when: Predicate,
    pub minimum_level: SeverityLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Scales the floored score when its predicate matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Multiplier {
    pub id: RuleId,
    pub description: String,
    pub when: Predicate,
    pub factor: f64,
}

/// Inclusive range every question and module weight must stay within.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightBounds {
    pub min: f64,
    pub max: f64,
}

impl Default for WeightBounds {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_WEIGHT,
            max: DEFAULT_MAX_WEIGHT,
        }
    }
}

impl WeightBounds {
    pub fn contains(&self, weight: f64) -> bool {
        weight.is_finite() && weight >= self.min && weight <= self.max
    }

    pub fn clamp(&self, weight: f64) -> f64 {
        weight.clamp(self.min, self.max)
    }
}

/// Structured configuration document as produced by the external loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    pub modules: Vec<Module>,
    pub questions: Vec<Question>,
    pub thresholds: Vec<ThresholdDefinition>,
    #[serde(default)]
    pub hard_rules: Vec<HardRule>,
    #[serde(default)]
    pub multipliers: Vec<Multiplier>,
    #[serde(default)]
    pub recommendations: BTreeMap<SeverityLevel, String>,
    #[serde(default)]
    pub weight_bounds: WeightBounds,
}

fn default_weight() -> f64 {
    1.0
}

/// Validated, immutable engine configuration. Only [`EngineConfig::from_document`] builds one.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    document: ConfigDocument,
    thresholds: ThresholdTable,
    question_index: HashMap<QuestionId, usize>,
    module_index: HashMap<ModuleId, usize>,
}

impl EngineConfig {
    pub fn from_document(mut document: ConfigDocument) -> Result<Self, ConfigurationError> {
        let mut violations = Vec::new();

        let bounds = document.weight_bounds;
        if !(bounds.min.is_finite() && bounds.max.is_finite())
            || bounds.min <= 0.0
            || bounds.min >= bounds.max
        {
            violations.push(ConfigViolation::InvalidWeightBounds {
                min: bounds.min,
                max: bounds.max,
            });
        }

        let mut module_index = HashMap::new();
        for (position, module) in document.modules.iter().enumerate() {
            if module_index.insert(module.id.clone(), position).is_some() {
                violations.push(ConfigViolation::DuplicateModule {
                    module: module.id.clone(),
                });
            }
            if !bounds.contains(module.weight) {
                violations.push(ConfigViolation::WeightOutOfBounds {
                    target: format!("module {}", module.id),
                    weight: module.weight,
                    min: bounds.min,
                    max: bounds.max,
                });
            }
        }

        let mut question_index = HashMap::new();
        for (position, question) in document.questions.iter().enumerate() {
            if question_index
                .insert(question.id.clone(), position)
                .is_some()
            {
                violations.push(ConfigViolation::DuplicateQuestion {
                    question: question.id.clone(),
                });
            }
            if question.options.is_empty() {
                violations.push(ConfigViolation::NoOptions {
                    question: question.id.clone(),
                });
            }
            let mut seen = HashSet::new();
            for option in &question.options {
                if !seen.insert(&option.id) {
                    violations.push(ConfigViolation::DuplicateOption {
                        question: question.id.clone(),
                        option: option.id.clone(),
                    });
                }
            }
            if !bounds.contains(question.weight) {
                violations.push(ConfigViolation::WeightOutOfBounds {
                    target: format!("question {}", question.id),
                    weight: question.weight,
                    min: bounds.min,
                    max: bounds.max,
                });
            }
            match module_index.get(&question.module) {
                None => violations.push(ConfigViolation::UnknownModule {
                    question: question.id.clone(),
                    module: question.module.clone(),
                }),
                Some(&module_position) => {
                    if !document.modules[module_position]
                        .questions
                        .contains(&question.id)
                    {
                        violations.push(ConfigViolation::QuestionNotListed {
                            question: question.id.clone(),
                            module: question.module.clone(),
                        });
                    }
                }
            }
        }

        for module in &document.modules {
            let mut listed_once = HashSet::new();
            for listed in &module.questions {
                if !listed_once.insert(listed) {
                    violations.push(ConfigViolation::DuplicateModuleQuestion {
                        module: module.id.clone(),
                        question: listed.clone(),
                    });
                    continue;
                }
                match question_index.get(listed) {
                    None => violations.push(ConfigViolation::ModuleListsUnknownQuestion {
                        module: module.id.clone(),
                        question: listed.clone(),
                    }),
                    Some(&position) if document.questions[position].module != module.id => {
                        violations.push(ConfigViolation::QuestionModuleMismatch {
                            module: module.id.clone(),
                            question: listed.clone(),
                        })
                    }
                    Some(_) => {}
                }
            }
        }

        let lookup = |question: &QuestionId| {
            question_index
                .get(question)
                .map(|&position| &document.questions[position])
        };

        let mut rule_ids = HashSet::new();
        let rules = document
            .hard_rules
            .iter()
            .map(|rule| (&rule.id, &rule.when))
            .chain(
                document
                    .multipliers
                    .iter()
                    .map(|multiplier| (&multiplier.id, &multiplier.when)),
            );
        for (rule, predicate) in rules {
            if !rule_ids.insert(rule.clone()) {
                violations.push(ConfigViolation::DuplicateRule { rule: rule.clone() });
            }
            for problem in predicate.shape_problems() {
                violations.push(ConfigViolation::MalformedPredicate {
                    rule: rule.clone(),
                    problem: problem.to_string(),
                });
            }
            for (question, option) in predicate.references() {
                match lookup(question) {
                    None => violations.push(ConfigViolation::UnknownPredicateQuestion {
                        rule: rule.clone(),
                        question: question.clone(),
                    }),
                    Some(definition) if definition.option(option).is_none() => {
                        violations.push(ConfigViolation::UnknownPredicateOption {
                            rule: rule.clone(),
                            question: question.clone(),
                            option: option.clone(),
                        })
                    }
                    Some(_) => {}
                }
            }
        }

        for multiplier in &document.multipliers {
            if !multiplier.factor.is_finite() || multiplier.factor <= 1.0 {
                violations.push(ConfigViolation::InvalidFactor {
                    rule: multiplier.id.clone(),
                    factor: multiplier.factor,
                });
            }
        }

        let thresholds = match ThresholdTable::from_definitions(&document.thresholds) {
            Ok(table) => Some(table),
            Err(problems) => {
                violations.extend(problems);
                None
            }
        };

        match thresholds {
            Some(thresholds) if violations.is_empty() => {
                document.modules.sort_by_key(|module| module.order);
                let module_index = document
                    .modules
                    .iter()
                    .enumerate()
                    .map(|(position, module)| (module.id.clone(), position))
                    .collect();
                Ok(Self {
                    document,
                    thresholds,
                    question_index,
                    module_index,
                })
            }
            _ => Err(ConfigurationError::Invalid(violations)),
        }
    }

    pub fn document(&self) -> &ConfigDocument {
        &self.document
    }

    pub fn into_document(self) -> ConfigDocument {
        self.document
    }

    /// Modules in display order.
    pub fn modules(&self) -> &[Module] {
        &self.document.modules
    }

    pub fn questions(&self) -> &[Question] {
        &self.document.questions
    }

    pub fn question(&self, id: &QuestionId) -> Option<&Question> {
        self.question_index
            .get(id)
            .map(|&position| &self.document.questions[position])
    }

    pub fn module(&self, id: &ModuleId) -> Option<&Module> {
        self.module_index
            .get(id)
            .map(|&position| &self.document.modules[position])
    }

    /// Questions of a module in the module's listed order.
    pub fn module_questions<'a>(&'a self, module: &'a Module) -> impl Iterator<Item = &'a Question> {
        module
            .questions
            .iter()
            .filter_map(move |id| self.question(id))
    }

    pub fn hard_rules(&self) -> &[HardRule] {
        &self.document.hard_rules
    }

    pub fn multipliers(&self) -> &[Multiplier] {
        &self.document.multipliers
    }

    pub fn thresholds(&self) -> &ThresholdTable {
        &self.thresholds
    }

    pub fn weight_bounds(&self) -> WeightBounds {
        self.document.weight_bounds
    }

    pub fn recommendation(&self, level: SeverityLevel) -> &str {
        self.document
            .recommendations
            .get(&level)
            .map(String::as_str)
            .unwrap_or_else(|| level.default_recommendation())
    }

    /// Copies this configuration with replaced weights, re-running full validation.
    pub fn with_weights(
        &self,
        question_weights: &BTreeMap<QuestionId, f64>,
        module_weights: &BTreeMap<ModuleId, f64>,
    ) -> Result<Self, ConfigurationError> {
        let mut document = self.document.clone();
        for question in &mut document.questions {
            if let Some(weight) = question_weights.get(&question.id) {
                question.weight = *weight;
            }
        }
        for module in &mut document.modules {
            if let Some(weight) = module_weights.get(&module.id) {
                module.weight = *weight;
            }
        }
        Self::from_document(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::predicate::Predicate;

    fn document() -> ConfigDocument {
        let json = r#"{
            "modules": [
                {"id": "network", "name": "Network", "weight": 1.5, "order": 2, "questions": ["q_lateral"]},
                {"id": "malware", "name": "Malware", "weight": 1.0, "order": 1, "questions": ["q_ransom"]}
            ],
            "questions": [
                {"id": "q_ransom", "module": "malware", "text": "Ransomware?", "weight": 2.0,
                 "options": [{"id": "yes", "label": "Yes", "score": 10}, {"id": "no", "label": "No", "score": 0}]},
                {"id": "q_lateral", "module": "network", "text": "Lateral movement?",
                 "options": [{"id": "confirmed", "label": "Confirmed", "score": 8}, {"id": "no", "label": "No", "score": 0}]}
            ],
            "thresholds": [
                {"level": "informative", "min": 0}, {"level": "suspicious", "min": 41},
                {"level": "incident", "min": 121}, {"level": "critical", "min": 281},
                {"level": "breach", "min": 601}
            ],
            "hard_rules": [
                {"id": "hr_ransom", "description": "Ransomware", "minimum_level": "breach",
                 "when": {"op": "equals", "question": "q_ransom", "option": "yes"}}
            ]
        }"#;
        serde_json::from_str(json).expect("document parses")
    }

    #[test]
    fn accepts_valid_document_and_orders_modules() {
        let config = EngineConfig::from_document(document()).expect("valid config");
        let ids: Vec<_> = config.modules().iter().map(|m| m.id.0.as_str()).collect();
        assert_eq!(ids, vec!["malware", "network"]);
        assert_eq!(
            config.question(&QuestionId::from("q_lateral")).map(|q| q.weight),
            Some(1.0)
        );
        assert_eq!(config.weight_bounds(), WeightBounds::default());
        assert!(config
            .recommendation(SeverityLevel::Breach)
            .contains("breach response"));
    }

    #[test]
    fn collects_every_violation() {
        let mut document = document();
        document.thresholds[2].min = 30.0;
        document.questions[0].module = ModuleId::from("ghost");
        document.questions[1].weight = 9.0;
        document.hard_rules[0].when = Predicate::equals("q_ransom", "maybe");
        document.multipliers.push(Multiplier {
            id: RuleId::from("mx_bad"),
            description: "Shrinks the score".to_string(),
            when: Predicate::equals("q_unknown", "yes"),
            factor: 0.5,
        });

        let error = EngineConfig::from_document(document).expect_err("invalid config");
        let violations = error.violations();

        assert!(violations
            .iter()
            .any(|v| matches!(v, ConfigViolation::ThresholdNotIncreasing { .. })));
        assert!(violations
            .iter()
            .any(|v| matches!(v, ConfigViolation::UnknownModule { .. })));
        assert!(violations
            .iter()
            .any(|v| matches!(v, ConfigViolation::WeightOutOfBounds { weight, .. } if *weight == 9.0)));
        assert!(violations
            .iter()
            .any(|v| matches!(v, ConfigViolation::UnknownPredicateOption { .. })));
        assert!(violations
            .iter()
            .any(|v| matches!(v, ConfigViolation::UnknownPredicateQuestion { .. })));
        assert!(violations
            .iter()
            .any(|v| matches!(v, ConfigViolation::InvalidFactor { .. })));
        assert!(error.to_string().contains("violation(s)"));
    }

    #[test]
    fn rejects_inconsistent_module_listing() {
        let mut document = document();
        document.modules[0].questions.push(QuestionId::from("q_ransom"));
        document.modules[1].questions.clear();

        let error = EngineConfig::from_document(document).expect_err("inconsistent modules");
        let violations = error.violations();
        assert!(violations
            .iter()
            .any(|v| matches!(v, ConfigViolation::QuestionModuleMismatch { .. })));
        assert!(violations
            .iter()
            .any(|v| matches!(v, ConfigViolation::QuestionNotListed { .. })));

        let mut document = self::document();
        document.modules[0].questions.push(QuestionId::from("q_lateral"));
        let error = EngineConfig::from_document(document).expect_err("question listed twice");
        assert_eq!(
            error.violations(),
            &[ConfigViolation::DuplicateModuleQuestion {
                module: ModuleId::from("network"),
                question: QuestionId::from("q_lateral"),
            }]
        );
    }

    #[test]
    fn with_weights_revalidates_bounds() {
        let config = EngineConfig::from_document(document()).expect("valid config");
        let mut questions = BTreeMap::new();
        questions.insert(QuestionId::from("q_ransom"), 2.5);
        let updated = config
            .with_weights(&questions, &BTreeMap::new())
            .expect("weights within bounds");
        assert_eq!(
            updated.question(&QuestionId::from("q_ransom")).map(|q| q.weight),
            Some(2.5)
        );

        questions.insert(QuestionId::from("q_ransom"), 4.0);
        assert!(config.with_weights(&questions, &BTreeMap::new()).is_err());
    }
}
