use serde::Serialize;

use super::domain::{ModuleId, OptionId, QuestionId};
use super::model::EngineConfig;

/// Questionnaire grouped by module with weighted option scores for form previews.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleCatalog {
    pub module_id: ModuleId,
    pub name: String,
    pub weight: f64,
    pub questions: Vec<QuestionCatalog>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionCatalog {
    pub question_id: QuestionId,
    pub text: String,
    pub weight: f64,
    pub tags: Vec<String>,
    pub options: Vec<OptionPreview>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionPreview {
    pub option_id: OptionId,
    pub label: String,
    pub weighted_score: f64,
}

pub fn catalog(config: &EngineConfig) -> Vec<ModuleCatalog> {
    config
        .modules()
        .iter()
        .map(|module| ModuleCatalog {
            module_id: module.id.clone(),
            name: module.name.clone(),
            weight: module.weight,
            questions: config
                .module_questions(module)
                .map(|question| QuestionCatalog {
                    question_id: question.id.clone(),
                    text: question.text.clone(),
                    weight: question.weight,
                    tags: question.tags.clone(),
                    options: question
                        .options
                        .iter()
                        .map(|option| OptionPreview {
                            option_id: option.id.clone(),
                            label: option.label.clone(),
                            weighted_score: f64::from(option.score)
                                * question.weight
                                * module.weight,
                        })
                        .collect(),
                })
                .collect(),
        })
        .collect()
}
