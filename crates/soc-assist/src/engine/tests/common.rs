use crate::engine::{AnswerSet, EngineConfig, ScoringEngine};

pub(super) const FIXTURE_VERSION: u64 = 7;

const FIXTURE: &str = r#"{
    // Compact questionnaire mirroring the default thresholds.
    "thresholds": [
        {"level": "informative", "min": 0},
        {"level": "suspicious", "min": 41},
        {"level": "incident", "min": 121},
        {"level": "critical", "min": 281},
        {"level": "breach", "min": 601}
    ],
    "modules": [
        {"id": "core", "name": "Core", "weight": 1.5, "order": 1, "questions": ["q_alpha", "q_ransom"]},
        {"id": "net", "name": "Network", "weight": 1.0, "order": 2, "questions": ["q_lateral", "q_admin", "q_benign"]}
    ],
    "questions": [
        {"id": "q_alpha", "module": "core", "text": "Alpha signal", "weight": 2.0,
         "options": [{"id": "high", "label": "High", "score": 5}, {"id": "low", "label": "Low", "score": 1}, {"id": "none", "label": "None", "score": 0}]},
        {"id": "q_ransom", "module": "core", "text": "Ransomware detected?", "weight": 1.0,
         "options": [{"id": "yes", "label": "Yes", "score": 10}, {"id": "no", "label": "No", "score": 0}]},
        {"id": "q_lateral", "module": "net", "text": "Lateral movement?", "weight": 1.0,
         "options": [{"id": "confirmed", "label": "Confirmed", "score": 20}, {"id": "no", "label": "No", "score": 0}]},
        {"id": "q_admin", "module": "net", "text": "Admin account?", "weight": 1.0,
         "options": [{"id": "yes", "label": "Yes", "score": 8}, {"id": "no", "label": "No", "score": 0}]},
        {"id": "q_benign", "module": "net", "text": "Known benign?", "weight": 1.0,
         "options": [{"id": "yes", "label": "Yes", "score": -6}, {"id": "no", "label": "No", "score": 0}]}
    ],
    "hard_rules": [
        {"id": "hr_ransom", "description": "Ransomware detected", "minimum_level": "breach",
         "message": "Ransomware forces breach handling",
         "when": {"op": "equals", "question": "q_ransom", "option": "yes"}},
        {"id": "hr_lateral_admin", "description": "Admin lateral movement", "minimum_level": "incident",
         "when": {"op": "all_of", "predicates": [
            {"op": "equals", "question": "q_lateral", "option": "confirmed"},
            {"op": "equals", "question": "q_admin", "option": "yes"}
         ]}}
    ],
    "multipliers": [
        {"id": "mx_lateral", "description": "Lateral movement", "factor": 1.5,
         "when": {"op": "equals", "question": "q_lateral", "option": "confirmed"}},
        {"id": "mx_admin", "description": "Admin involved", "factor": 1.2,
         "when": {"op": "equals", "question": "q_admin", "option": "yes"}}
    ]
}"#;

pub(super) fn fixture_config() -> EngineConfig {
    EngineConfig::from_json_str(FIXTURE).expect("fixture config validates")
}

pub(super) fn engine(config: &EngineConfig) -> ScoringEngine<'_> {
    ScoringEngine::new(config, FIXTURE_VERSION)
}

pub(super) fn answers(pairs: &[(&str, &str)]) -> AnswerSet {
    pairs
        .iter()
        .fold(AnswerSet::new(), |set, (question, option)| set.with(question, option))
}

pub(super) fn approx(left: f64, right: f64) -> bool {
    (left - right).abs() < 1e-9
}
