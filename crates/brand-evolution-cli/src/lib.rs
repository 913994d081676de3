//! Command surface for the brand evolution engine.
//!
//! Host projects embed the loop through:
//! - [`run_cli`] for full parsed CLI execution.
//! - [`run_command`] for direct [`Command`] execution against an engine.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use brand_evolution_core::evolution::{
    EventChanges, EventFilter, EventMetrics, EventTrigger, EvolutionEventInput,
    EvolutionEventType,
};
use brand_evolution_core::metrics::PerformanceSample;
use brand_evolution_core::model::ModelUpdates;
use brand_evolution_core::pattern::ContentVariant;
use brand_evolution_core::tone::{VoiceTraitEstimator, VoiceTraits};
use brand_evolution_core::tuning::{BrandPlan, CtaStyle, PatternTuning, Positioning};
use brand_evolution_core::{now_utc, parse_rfc3339_utc, BrandId};
use brand_evolution_store_sqlite::{
    parse_brand_id_str, EngineConfig, EvolutionEngine, LogNotificationSink,
    SqliteEvolutionStore,
};
use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "bel")]
#[command(about = "Brand Evolution CLI")]
pub struct Cli {
    #[arg(long, default_value = "./brand_evolution.sqlite3")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Brand {
        #[command(subcommand)]
        command: BrandCommand,
    },
    Model {
        #[command(subcommand)]
        command: ModelCommand,
    },
    Perf {
        #[command(subcommand)]
        command: PerfCommand,
    },
    Patterns {
        #[command(subcommand)]
        command: PatternsCommand,
    },
    Events {
        #[command(subcommand)]
        command: Box<EventsCommand>,
    },
    Tone {
        #[command(subcommand)]
        command: ToneCommand,
    },
    Tune {
        #[command(subcommand)]
        command: TuneCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum BrandCommand {
    Init(InitArgs),
    Show(BrandArgs),
    Summary(BrandArgs),
}

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Generated when omitted.
    #[arg(long)]
    brand_id: Option<String>,
    #[arg(long, value_enum, default_value_t = PlanArg::Starter)]
    plan: PlanArg,
}

#[derive(Debug, Args)]
pub struct BrandArgs {
    #[arg(long)]
    brand_id: String,
}

#[derive(Debug, Subcommand)]
pub enum ModelCommand {
    Update(ModelUpdateArgs),
    Versions(BrandArgs),
}

#[derive(Debug, Args)]
pub struct ModelUpdateArgs {
    #[arg(long)]
    brand_id: String,
    /// Partial update document; omitted sections are left untouched.
    #[arg(long)]
    updates_json: String,
}

#[derive(Debug, Subcommand)]
pub enum PerfCommand {
    Ingest(IngestArgs),
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    #[arg(long)]
    brand_id: String,
    #[arg(long)]
    variant_json: String,
    #[arg(long)]
    sample_json: String,
}

#[derive(Debug, Subcommand)]
pub enum PatternsCommand {
    List(BrandArgs),
    Apply(BrandArgs),
}

#[derive(Debug, Subcommand)]
pub enum EventsCommand {
    Record(RecordArgs),
    List(ListArgs),
    Significant(SignificantArgs),
}

#[derive(Debug, Args)]
pub struct RecordArgs {
    #[arg(long)]
    brand_id: String,
    #[arg(long)]
    event: EventTypeArg,
    #[arg(long)]
    source: String,
    #[arg(long)]
    action: String,
    #[arg(long, default_value = "null")]
    metadata_json: String,
    #[arg(long, default_value = "null")]
    before_json: String,
    #[arg(long, default_value = "null")]
    after_json: String,
    #[arg(long)]
    impact_area: Vec<String>,
    #[arg(long)]
    delta: Option<f64>,
    #[arg(long)]
    confidence: Option<f64>,
    #[arg(long)]
    samples: Option<u64>,
    #[arg(long)]
    occurred_at: Option<String>,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[arg(long)]
    brand_id: String,
    #[arg(long)]
    event: Option<EventTypeArg>,
    #[arg(long)]
    from: Option<String>,
    #[arg(long)]
    until: Option<String>,
    #[arg(long)]
    impact_area: Option<String>,
    #[arg(long)]
    limit: Option<usize>,
}

#[derive(Debug, Args)]
pub struct SignificantArgs {
    #[arg(long)]
    brand_id: String,
    #[arg(long, default_value_t = 0.1)]
    threshold: f64,
}

#[derive(Debug, Subcommand)]
pub enum ToneCommand {
    Check(ToneArgs),
}

#[derive(Debug, Args)]
pub struct ToneArgs {
    #[arg(long)]
    brand_id: String,
    #[arg(long)]
    content: String,
    #[arg(long, default_value = "generic")]
    content_type: String,
}

#[derive(Debug, Subcommand)]
pub enum TuneCommand {
    Apply(TuneArgs),
}

#[derive(Debug, Args)]
pub struct TuneArgs {
    #[arg(long)]
    brand_id: String,
    #[arg(long)]
    voice_scale: f64,
    #[arg(long, value_enum)]
    cta_style: CtaStyleArg,
    #[arg(long, value_enum)]
    positioning: PositioningArg,
    #[arg(long, default_value = "{}")]
    weights_json: String,
    #[arg(long)]
    applied_by: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PlanArg {
    Starter,
    Growth,
    Scale,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum EventTypeArg {
    ContentChange,
    StrategyUpdate,
    PatternPerformance,
    AdminTuning,
    ModelAdjustment,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CtaStyleArg {
    Hard,
    Soft,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PositioningArg {
    Luxury,
    Value,
    Experimental,
}

/// Surface-marker trait measurement. Deliberately crude: the trait seam
/// exists so hosts can plug in a real estimator; this one keeps the CLI
/// self-contained and deterministic.
pub struct LexicalTraitEstimator;

const PERSUASIVE_CUES: [&str; 8] = [
    "buy", "now", "get", "try", "join", "start", "save", "today",
];

impl VoiceTraitEstimator for LexicalTraitEstimator {
    #[allow(clippy::cast_precision_loss)]
    fn estimate(&self, content: &str) -> VoiceTraits {
        let lowered = content.to_lowercase();
        let words: Vec<&str> = lowered.split_whitespace().collect();
        if words.is_empty() {
            return VoiceTraits::default();
        }
        let total = words.len() as f64;

        let long_words = words.iter().filter(|word| word.len() >= 7).count() as f64;
        let very_long_words = words.iter().filter(|word| word.len() >= 10).count() as f64;
        let exclamations = content.matches('!').count() as f64;
        let shouted = content
            .split_whitespace()
            .filter(|word| word.len() >= 3 && word.chars().all(|c| !c.is_lowercase()))
            .count() as f64;
        let cues = words
            .iter()
            .filter(|word| {
                PERSUASIVE_CUES
                    .iter()
                    .any(|cue| word.trim_matches(|c: char| !c.is_alphanumeric()) == *cue)
            })
            .count() as f64;

        VoiceTraits {
            formality: (0.3 + long_words / total - 0.1 * exclamations).clamp(0.0, 1.0),
            emotion: (0.2 * exclamations + shouted / total).clamp(0.0, 1.0),
            technical: (2.0 * very_long_words / total).clamp(0.0, 1.0),
            persuasive: (0.25 * cues).clamp(0.0, 1.0),
        }
    }
}

/// Executes the parsed top-level CLI command graph.
///
/// # Errors
/// Returns an error when store open/migrate or command execution fails.
pub fn run_cli(cli: Cli) -> Result<()> {
    let store = SqliteEvolutionStore::open(&cli.db)?;
    store.migrate()?;
    let engine = EvolutionEngine::new(store, EngineConfig::v1(), Arc::new(LogNotificationSink))?;
    run_command(cli.command, &engine)
}

/// Executes a parsed command against an existing engine.
///
/// # Errors
/// Returns an error when input parsing or the underlying operation fails.
pub fn run_command(command: Command, engine: &EvolutionEngine) -> Result<()> {
    match command {
        Command::Brand { command } => run_brand(command, engine),
        Command::Model { command } => run_model(command, engine),
        Command::Perf { command } => run_perf(command, engine),
        Command::Patterns { command } => run_patterns(command, engine),
        Command::Events { command } => run_events(*command, engine),
        Command::Tone { command } => run_tone(command, engine),
        Command::Tune { command } => run_tune(command, engine),
    }
}

fn run_brand(command: BrandCommand, engine: &EvolutionEngine) -> Result<()> {
    match command {
        BrandCommand::Init(args) => {
            let brand_id = match args.brand_id {
                Some(raw) => parse_brand_id_str(&raw)?,
                None => BrandId::new(),
            };
            let model = engine.init_brand(brand_id, map_plan(args.plan))?;
            println!("{}", serde_json::to_string_pretty(&*model)?);
            Ok(())
        }
        BrandCommand::Show(args) => {
            let model = engine.get_model(parse_brand_id_str(&args.brand_id)?)?;
            println!("{}", serde_json::to_string_pretty(&*model)?);
            Ok(())
        }
        BrandCommand::Summary(args) => {
            let brand_id = parse_brand_id_str(&args.brand_id)?;
            let Some(summary) = engine.summary(brand_id)? else {
                return Err(anyhow!("no events recorded for brand {}", args.brand_id));
            };
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
    }
}

fn run_model(command: ModelCommand, engine: &EvolutionEngine) -> Result<()> {
    match command {
        ModelCommand::Update(args) => {
            let updates: ModelUpdates = serde_json::from_str(&args.updates_json)
                .map_err(|err| anyhow!("invalid --updates-json value: {err}"))?;
            let report =
                engine.update_model(parse_brand_id_str(&args.brand_id)?, &updates)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        ModelCommand::Versions(args) => {
            let versions = engine.model_versions(parse_brand_id_str(&args.brand_id)?)?;
            println!("{}", serde_json::to_string_pretty(&versions)?);
            Ok(())
        }
    }
}

fn run_perf(command: PerfCommand, engine: &EvolutionEngine) -> Result<()> {
    match command {
        PerfCommand::Ingest(args) => {
            let variant: ContentVariant = serde_json::from_str(&args.variant_json)
                .map_err(|err| anyhow!("invalid --variant-json value: {err}"))?;
            let sample: PerformanceSample = serde_json::from_str(&args.sample_json)
                .map_err(|err| anyhow!("invalid --sample-json value: {err}"))?;

            let patterns = engine.ingest_performance(
                parse_brand_id_str(&args.brand_id)?,
                &variant,
                &sample,
            )?;
            println!("{}", serde_json::to_string_pretty(&patterns)?);
            Ok(())
        }
    }
}

fn run_patterns(command: PatternsCommand, engine: &EvolutionEngine) -> Result<()> {
    match command {
        PatternsCommand::List(args) => {
            let patterns = engine.patterns(parse_brand_id_str(&args.brand_id)?)?;
            println!("{}", serde_json::to_string_pretty(&patterns)?);
            Ok(())
        }
        PatternsCommand::Apply(args) => {
            let outcome =
                engine.apply_significant_patterns(parse_brand_id_str(&args.brand_id)?)?;
            match outcome {
                Some(report) => println!("{}", serde_json::to_string_pretty(&report)?),
                None => println!("{}", serde_json::json!({ "merged": false })),
            }
            Ok(())
        }
    }
}

fn run_events(command: EventsCommand, engine: &EvolutionEngine) -> Result<()> {
    match command {
        EventsCommand::Record(args) => {
            let metrics = match (args.delta, args.confidence, args.samples) {
                (Some(delta), Some(confidence), Some(samples)) => Some(EventMetrics {
                    performance_delta: delta,
                    confidence_score: confidence,
                    sample_size: samples,
                }),
                (None, None, None) => None,
                _ => {
                    return Err(anyhow!(
                        "--delta, --confidence, and --samples must be provided together"
                    ))
                }
            };

            let input = EvolutionEventInput {
                event_id: None,
                brand_id: parse_brand_id_str(&args.brand_id)?,
                event_type: map_event_type(args.event),
                trigger: EventTrigger {
                    source: args.source,
                    action: args.action,
                    metadata: parse_json_arg(&args.metadata_json, "--metadata-json")?,
                },
                changes: EventChanges {
                    before: parse_json_arg(&args.before_json, "--before-json")?,
                    after: parse_json_arg(&args.after_json, "--after-json")?,
                    impact_areas: args.impact_area.into_iter().collect(),
                },
                metrics,
                occurred_at: parse_optional_utc(args.occurred_at.as_deref())?,
            };

            let event = engine.record_event(&input)?;
            println!("{}", serde_json::to_string_pretty(&event)?);
            Ok(())
        }
        EventsCommand::List(args) => {
            let filter = EventFilter {
                event_type: args.event.map(map_event_type),
                from: args
                    .from
                    .as_deref()
                    .map(|raw| {
                        parse_rfc3339_utc(raw)
                            .map_err(|err| anyhow!("invalid --from value: {err}"))
                    })
                    .transpose()?,
                until: args
                    .until
                    .as_deref()
                    .map(|raw| {
                        parse_rfc3339_utc(raw)
                            .map_err(|err| anyhow!("invalid --until value: {err}"))
                    })
                    .transpose()?,
                impact_area: args.impact_area,
                limit: args.limit,
            };

            let events = engine.query_events(parse_brand_id_str(&args.brand_id)?, &filter)?;
            println!("{}", serde_json::to_string_pretty(&events)?);
            Ok(())
        }
        EventsCommand::Significant(args) => {
            let events = engine
                .significant_changes(parse_brand_id_str(&args.brand_id)?, args.threshold)?;
            println!("{}", serde_json::to_string_pretty(&events)?);
            Ok(())
        }
    }
}

fn run_tone(command: ToneCommand, engine: &EvolutionEngine) -> Result<()> {
    match command {
        ToneCommand::Check(args) => {
            let analysis = engine.check_tone(
                parse_brand_id_str(&args.brand_id)?,
                &args.content,
                &args.content_type,
                &LexicalTraitEstimator,
            )?;
            println!("{}", serde_json::to_string_pretty(&analysis)?);
            Ok(())
        }
    }
}

fn run_tune(command: TuneCommand, engine: &EvolutionEngine) -> Result<()> {
    match command {
        TuneCommand::Apply(args) => {
            let custom_weights = serde_json::from_str(&args.weights_json)
                .map_err(|err| anyhow!("invalid --weights-json value: {err}"))?;
            let tuning = PatternTuning {
                voice_scale: args.voice_scale,
                cta_style: match args.cta_style {
                    CtaStyleArg::Hard => CtaStyle::Hard,
                    CtaStyleArg::Soft => CtaStyle::Soft,
                },
                positioning: match args.positioning {
                    PositioningArg::Luxury => Positioning::Luxury,
                    PositioningArg::Value => Positioning::Value,
                    PositioningArg::Experimental => Positioning::Experimental,
                },
                custom_weights,
            };

            let report = engine.apply_tuning(
                parse_brand_id_str(&args.brand_id)?,
                tuning,
                &args.applied_by,
            )?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

fn map_plan(plan: PlanArg) -> BrandPlan {
    match plan {
        PlanArg::Starter => BrandPlan::Starter,
        PlanArg::Growth => BrandPlan::Growth,
        PlanArg::Scale => BrandPlan::Scale,
    }
}

fn map_event_type(event: EventTypeArg) -> EvolutionEventType {
    match event {
        EventTypeArg::ContentChange => EvolutionEventType::ContentChange,
        EventTypeArg::StrategyUpdate => EvolutionEventType::StrategyUpdate,
        EventTypeArg::PatternPerformance => EvolutionEventType::PatternPerformance,
        EventTypeArg::AdminTuning => EvolutionEventType::AdminTuning,
        EventTypeArg::ModelAdjustment => EvolutionEventType::ModelAdjustment,
    }
}

fn parse_json_arg(raw: &str, flag: &str) -> Result<serde_json::Value> {
    serde_json::from_str(raw).map_err(|err| anyhow!("invalid {flag} value: {err}"))
}

fn parse_optional_utc(raw: Option<&str>) -> Result<time::OffsetDateTime> {
    match raw {
        Some(value) => {
            parse_rfc3339_utc(value).map_err(|err| anyhow!("invalid --occurred-at value: {err}"))
        }
        None => Ok(now_utc()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_content_estimates_all_zero() {
        let traits = LexicalTraitEstimator.estimate("   ");
        assert!((traits.formality - 0.0).abs() < 1e-12);
        assert!((traits.persuasive - 0.0).abs() < 1e-12);
    }

    #[test]
    fn shouted_cta_reads_persuasive_and_emotional() {
        let calm = LexicalTraitEstimator.estimate("Our quarterly analysis considers markets.");
        let loud = LexicalTraitEstimator.estimate("BUY NOW! SAVE TODAY! GET YOURS!");
        assert!(loud.persuasive > calm.persuasive);
        assert!(loud.emotion > calm.emotion);
        assert!(calm.formality > loud.formality);
    }
}
