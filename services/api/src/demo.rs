use crate::infra::{load_engine_config, parse_answer, read_answer_file, InMemoryOutcomeRepository};
use clap::Args;
use serde::Serialize;
use soc_assist::calibration::history::import_history_path;
use soc_assist::calibration::{
    calibrate, CalibrationSettings, CalibrationWarning, CancelFlag, ChangeStatus, DiffReport,
    GroundTruth, IncidentId, DEFAULT_MAX_STEP, DEFAULT_MIN_SAMPLES, DEFAULT_TARGET_BASELINE,
};
use soc_assist::engine::{AnswerSet, Report, ScoringResult, DEFAULT_TOP_FACTORS};
use soc_assist::error::AppError;
use soc_assist::triage::{OutcomeSubmission, TriageService};
use soc_assist::versions::ConfigurationRegistry;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct EvaluateArgs {
    /// Engine configuration document (defaults to the embedded questionnaire)
    #[arg(long)]
    pub(crate) config: Option<PathBuf>,
    /// JSON object mapping question ids to option ids
    #[arg(long)]
    pub(crate) answers: Option<PathBuf>,
    /// Inline answer as QUESTION=OPTION; may be repeated and overrides --answers
    #[arg(long = "answer", value_parser = parse_answer)]
    pub(crate) inline: Vec<(String, String)>,
    /// Number of contributing factors to list
    #[arg(long, default_value_t = DEFAULT_TOP_FACTORS)]
    pub(crate) top_n: usize,
    /// Print the result and report as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct CalibrateArgs {
    /// Engine configuration document the history was scored with
    #[arg(long)]
    pub(crate) config: Option<PathBuf>,
    /// CSV export of resolved incidents (incident_id,resolution,config_version,question_id,option_id)
    #[arg(long)]
    pub(crate) history: PathBuf,
    /// Precision treated as neutral
    #[arg(long, default_value_t = DEFAULT_TARGET_BASELINE)]
    pub(crate) baseline: f64,
    /// Largest weight change proposed per run
    #[arg(long, default_value_t = DEFAULT_MAX_STEP)]
    pub(crate) max_step: f64,
    /// Samples required before a weight is adjusted
    #[arg(long, default_value_t = DEFAULT_MIN_SAMPLES)]
    pub(crate) min_samples: usize,
    /// Print the diff report as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct ValidateArgs {
    /// Engine configuration document to check (defaults to the embedded questionnaire)
    #[arg(long)]
    pub(crate) config: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Engine configuration document (defaults to the embedded questionnaire)
    #[arg(long)]
    pub(crate) config: Option<PathBuf>,
    /// Stop after printing the calibration draft instead of activating it
    #[arg(long)]
    pub(crate) dry_run: bool,
}

pub(crate) fn run_evaluate(args: EvaluateArgs) -> Result<(), AppError> {
    let registry = ConfigurationRegistry::new(load_engine_config(args.config.as_deref())?);

    let mut answers = match args.answers.as_deref() {
        Some(path) => read_answer_file(path)?,
        None => AnswerSet::new(),
    };
    for (question, option) in &args.inline {
        answers.insert(question, option);
    }

    let result = registry.active().engine().evaluate(&answers)?;
    let report = Report::for_result(&result, args.top_n);

    if args.json {
        #[derive(Serialize)]
        struct Output<'a> {
            result: &'a ScoringResult,
            report: &'a Report,
        }
        return print_json(&Output {
            result: &result,
            report: &report,
        });
    }

    print_result(&result, &report);
    Ok(())
}

pub(crate) fn run_calibrate(args: CalibrateArgs) -> Result<(), AppError> {
    let settings = CalibrationSettings {
        target_baseline: args.baseline,
        max_step: args.max_step,
        min_samples: args.min_samples,
    };
    settings.validate()?;

    let registry = ConfigurationRegistry::new(load_engine_config(args.config.as_deref())?);
    let import = import_history_path(&args.history, &registry)?;
    let active = registry.active();
    let mut proposal = calibrate(active.config(), active.version, &import.outcomes, &settings)?;
    proposal.report.stale_answers += import.stale_answers;

    if args.json {
        return print_json(&proposal.report);
    }

    println!(
        "Imported {} incident(s) from {} ({} resolved)",
        import.outcomes.len(),
        args.history.display(),
        import.resolved()
    );
    print_diff_report(&proposal.report);
    Ok(())
}

pub(crate) fn run_validate(args: ValidateArgs) -> Result<(), AppError> {
    let source = args
        .config
        .as_ref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "embedded default".to_string());

    let config = match load_engine_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(AppError::Engine(error)) => {
            println!("{source}: rejected");
            for violation in error.violations() {
                println!("  - {violation}");
            }
            return Err(AppError::Engine(error));
        }
        Err(other) => return Err(other),
    };

    let bounds = config.weight_bounds();
    println!("{source}: valid");
    println!(
        "  {} module(s), {} question(s), {} hard rule(s), {} multiplier(s)",
        config.modules().len(),
        config.questions().len(),
        config.hard_rules().len(),
        config.multipliers().len()
    );
    println!("  weight bounds [{}, {}]", bounds.min, bounds.max);
    Ok(())
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let registry = Arc::new(ConfigurationRegistry::new(load_engine_config(
        args.config.as_deref(),
    )?));
    let service = TriageService::new(
        registry.clone(),
        Arc::new(InMemoryOutcomeRepository::default()),
        CalibrationSettings::default(),
        DEFAULT_TOP_FACTORS,
    );

    println!("=== SOC Assist Demo ===\n");

    let live = AnswerSet::new()
        .with("q_alert_source", "edr_high")
        .with("q_malware_execution", "confirmed")
        .with("q_persistence", "yes")
        .with("q_asset_criticality", "production");
    let evaluation = service.evaluate(&live, None)?;
    println!("-- Live event scored against version {} --", evaluation.result.config_version);
    print_result(&evaluation.result, &evaluation.report);

    println!("\n-- Recording resolved outcomes --");
    for (index, (answers, resolution)) in scripted_history().into_iter().enumerate() {
        let outcome = service.record_outcome(OutcomeSubmission {
            incident_id: IncidentId(format!("demo-{:03}", index + 1)),
            answers,
            resolution,
        })?;
        println!(
            "  {} -> {} ({})",
            outcome.incident_id,
            outcome.result.level,
            resolution_label(outcome.resolution)
        );
    }

    println!("\n-- Calibration proposal --");
    let draft = service.propose_calibration(CancelFlag::new()).await?;
    println!(
        "Draft {} based on version {} with {} change(s)",
        draft.id,
        draft.base_version,
        draft.changes.len()
    );
    if let Some(report) = &draft.report {
        print_diff_report(report);
    }

    if args.dry_run || draft.changes.is_empty() {
        println!("\nDraft left pending; active version stays {}", registry.active().version);
        return Ok(());
    }

    let activated = service.apply(&draft.id)?;
    println!("\n-- Version {} activated --", activated.version);
    for entry in service.weight_history() {
        println!("  {}: {} -> {} ({})", entry.target, entry.old, entry.new, entry.reason);
    }

    let before = service.rescore(&live, Some(draft.base_version), None)?;
    let after = service.rescore(&live, None, None)?;
    println!(
        "\nLive event: {:.2} ({}) under version {}, {:.2} ({}) under version {}",
        before.result.final_score,
        before.result.level,
        before.result.config_version,
        after.result.final_score,
        after.result.level,
        after.result.config_version
    );
    Ok(())
}

fn scripted_history() -> Vec<(AnswerSet, Option<GroundTruth>)> {
    let ransomware = AnswerSet::new()
        .with("q_ransomware", "yes")
        .with("q_asset_criticality", "production");
    let noisy = AnswerSet::new()
        .with("q_alert_source", "automated_low")
        .with("q_ti_match", "suspicious");

    let mut history: Vec<_> = (0..6)
        .map(|index| {
            let truth = if index % 2 == 0 {
                GroundTruth::EscalatedTruePositive
            } else {
                GroundTruth::TruePositive
            };
            (ransomware.clone(), Some(truth))
        })
        .collect();
    history.extend((0..5).map(|_| (noisy.clone(), Some(GroundTruth::FalsePositive))));
    history.push((noisy, None));
    history
}

fn print_result(result: &ScoringResult, report: &Report) {
    println!("{}", report.headline);
    println!(
        "  Level: {}{}",
        report.level_label,
        if report.escalate { " (escalate)" } else { "" }
    );
    println!(
        "  Score: raw {:.2}, floored {:.2}, final {:.2}",
        result.raw_score, result.floored_score, result.final_score
    );
    println!(
        "  Answered {} of {} question(s)",
        report.answered_questions,
        report.answered_questions + report.unanswered_questions
    );

    if !report.top_factors.is_empty() {
        println!("  Top factors:");
        for factor in &report.top_factors {
            println!(
                "    {}. {} = {} ({:+.2}, {:.1}%)",
                factor.rank,
                factor.question_id,
                factor
                    .option_label
                    .as_deref()
                    .unwrap_or("unanswered"),
                factor.contribution,
                factor.share
            );
        }
    }

    for rule in &report.hard_rules {
        println!(
            "  Hard rule {}: at least {}{}",
            rule.rule_id,
            rule.forced_level,
            if rule.raised_score { " (raised score)" } else { "" }
        );
    }
    for multiplier in &report.multipliers {
        println!(
            "  Multiplier {} x{} ({:+.2})",
            multiplier.multiplier_id, multiplier.factor, multiplier.standalone_delta
        );
    }
    println!("  Recommendation: {}", result.recommendation);
}

fn print_diff_report(report: &DiffReport) {
    println!(
        "Considered {} resolved outcome(s): {} true positive(s), {} false positive(s), {} unresolved excluded",
        report.considered, report.true_positives, report.false_positives, report.unresolved_excluded
    );
    if let Some(rate) = report.false_positive_rate {
        println!("False positive rate: {:.1}%", rate * 100.0);
    }
    if report.stale_answers > 0 {
        println!("Stale answers ignored: {}", report.stale_answers);
    }

    for change in report.changes() {
        let precision = change
            .precision
            .map(|value| format!("{value:.2}"))
            .unwrap_or_else(|| "-".to_string());
        let status = match change.status {
            ChangeStatus::Adjusted => "adjusted",
            ChangeStatus::Unchanged => "unchanged",
            ChangeStatus::InsufficientEvidence => "insufficient evidence",
        };
        println!(
            "  {:<32} {:>5.3} -> {:<5.3} samples {:>3} precision {:>4}  {}{}",
            change.target.to_string(),
            change.old_weight,
            change.new_weight,
            change.samples,
            precision,
            status,
            if change.clamped { " (clamped)" } else { "" }
        );
    }

    let clamped = report
        .warnings
        .iter()
        .filter(|warning| matches!(warning, CalibrationWarning::BoundsClamped { .. }))
        .count();
    println!(
        "{} adjustment(s), {} warning(s), {} clamped",
        report.adjustments,
        report.warnings.len(),
        clamped
    );
}

fn resolution_label(resolution: Option<GroundTruth>) -> &'static str {
    match resolution {
        Some(GroundTruth::TruePositive) => "true positive",
        Some(GroundTruth::EscalatedTruePositive) => "escalated true positive",
        Some(GroundTruth::FalsePositive) => "false positive",
        None => "unresolved",
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value).map_err(|err| {
        AppError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, err))
    })?;
    println!("{rendered}");
    Ok(())
}
