// Contribution Category - command line
//
// import:          CSV → SQLite (deduplicated)
// run:             full analysis over a CSV or the store
// classify:        one employer/name pair
// export-sql:      generated SQL function
// rules:           list or export the rule tables
// setup:           create the database schema
// validate-config: load and check a configuration file

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use contribution_category::{
    get_all_records, insert_records, insert_run, load_csv, open_database, render_function,
    verify_count, CategoryLabel, ClassifierConfig, HybridClassifier, HybridPolicy, ModelSlot,
    Pipeline, RuleEngine, RuleSet, RunOptions, RunRecord, TrainedModel, CONFIG_ENV,
};

#[derive(Parser)]
#[command(name = "contribution-category", version, about = "Campaign contribution classifier")]
struct Cli {
    /// Configuration file (JSON)
    #[arg(long, global = true, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Rule tables (JSON) replacing the builtin rules
    #[arg(long, global = true)]
    rules: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import a CSV into the SQLite store
    Import {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, default_value = "contributions.db")]
        db: PathBuf,
    },
    /// Run the full analysis
    Run {
        /// Input CSV; when omitted, records are read from --db
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Store to read from and record the run in
        #[arg(long)]
        db: Option<PathBuf>,
        /// Skip model training (rule-only)
        #[arg(long)]
        no_train: bool,
        /// Skip cluster discovery
        #[arg(long)]
        no_discover: bool,
    },
    /// Classify a single contributor
    Classify {
        #[arg(long)]
        employer: Option<String>,
        #[arg(long)]
        name: String,
        #[arg(long, default_value_t = 0.0)]
        amount: f64,
        /// Saved model (JSON); rule-only when omitted
        #[arg(long)]
        model: Option<PathBuf>,
    },
    /// Print or write the generated SQL function
    ExportSql {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List the rules in evaluation order
    Rules {
        /// Write the rule tables as JSON instead of listing them
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Create the database schema
    Setup {
        #[arg(long, default_value = "contributions.db")]
        db: PathBuf,
    },
    /// Load and validate a configuration file
    ValidateConfig {
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => ClassifierConfig::from_file(path)?,
        None => ClassifierConfig::default(),
    };
    if cli.rules.is_some() {
        config.rules_path = cli.rules.clone();
    }

    match cli.command {
        Command::Import { csv, db } => run_import(&config, &csv, &db),
        Command::Run {
            csv,
            db,
            no_train,
            no_discover,
        } => run_analysis(
            config,
            csv,
            db,
            RunOptions {
                train: !no_train,
                discover: !no_discover,
            },
        ),
        Command::Classify {
            employer,
            name,
            amount,
            model,
        } => run_classify(&config, employer.as_deref(), &name, amount, model),
        Command::ExportSql { out } => run_export_sql(&config, out),
        Command::Rules { export } => run_rules(&config, export),
        Command::Setup { db } => {
            open_database(&db)?;
            println!("✓ Database initialized with WAL mode: {:?}", db);
            Ok(())
        }
        Command::ValidateConfig { path } => {
            let loaded = ClassifierConfig::from_file(&path)?;
            println!("✅ Configuration valid: {:?}", path);
            println!("   Hybrid threshold: {}", loaded.thresholds.high_confidence);
            println!("   Label source:     {:?}", loaded.ml.label_source);
            println!("   SQL function:     {}", loaded.sql.qualified_name());
            Ok(())
        }
    }
}

fn rule_engine(config: &ClassifierConfig) -> Result<RuleEngine> {
    match &config.rules_path {
        Some(path) => RuleEngine::from_file(path),
        None => Ok(RuleEngine::builtin()),
    }
}

fn run_import(config: &ClassifierConfig, csv: &Path, db: &Path) -> Result<()> {
    println!("🗄️  Contribution Import - CSV → SQLite + WAL");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Load CSV
    println!("\n📂 Loading CSV...");
    let loaded = load_csv(csv, config.amounts.max_contribution_amount)?;
    println!("✓ Loaded {} records from CSV", loaded.records.len());
    if !loaded.rejected.is_empty() {
        println!("⚠️  Rejected {} rows (missing contributor name)", loaded.rejected.len());
    }
    if loaded.coerced_amounts > 0 {
        println!("⚠️  Coerced {} invalid amounts to 0.00", loaded.coerced_amounts);
    }

    // 2. Setup database
    println!("\n🔧 Setting up database...");
    let conn = open_database(db)?;
    println!("✓ Database initialized with WAL mode");

    // 3. Insert records
    println!("\n💾 Inserting records...");
    let stats = insert_records(&conn, &loaded.records)?;
    println!("✓ Inserted: {} records", stats.inserted);
    println!("✓ Skipped duplicates: {}", stats.duplicates);

    // 4. Verify count
    println!("\n🔍 Verifying database...");
    let count = verify_count(&conn)?;
    println!("✓ Database contains {} contributions", count);

    Ok(())
}

fn run_analysis(
    config: ClassifierConfig,
    csv: Option<PathBuf>,
    db: Option<PathBuf>,
    options: RunOptions,
) -> Result<()> {
    println!("📊 Contribution Analysis");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let conn = db.as_ref().map(open_database).transpose()?;
    let records = match (&csv, &conn) {
        (Some(path), _) => {
            let loaded = load_csv(path, config.amounts.max_contribution_amount)?;
            if !loaded.rejected.is_empty() {
                println!("⚠️  Rejected {} rows (missing contributor name)", loaded.rejected.len());
            }
            loaded.records
        }
        (None, Some(conn)) => get_all_records(conn)?
            .into_iter()
            .map(|r| r.flag_above(config.amounts.max_contribution_amount))
            .collect(),
        (None, None) => bail!("either --csv or --db is required"),
    };
    println!("✓ Loaded {} records", records.len());

    let pipeline = Pipeline::new(config)?;
    let output = pipeline.run(&records, options)?;
    let report = &output.report;

    println!("\n🏷️  Categories");
    for tally in &report.category_tallies {
        println!(
            "   {:<14} {:>7} ({:>5.1}%)  ${:>14.2}",
            tally.category.as_str(),
            tally.count,
            tally.percentage,
            tally.total_amount
        );
    }

    println!("\n🔎 Gap analysis");
    println!(
        "   Others: {} ({:.1}%), ${:.2}",
        report.gap_analysis.others_count,
        report.gap_analysis.others_pct,
        report.gap_analysis.others_total_amount
    );
    println!("   High-value Others: {}", report.gap_analysis.high_value_count);
    println!("   Clusters: {}", report.cluster_analysis.len());
    println!("   Rule suggestions: {}", report.suggestions.suggestions.len());

    match &report.evaluation {
        Some(evaluation) => {
            println!("\n🤖 Model accuracy: {:.1}%", evaluation.accuracy * 100.0);
            println!("   ML overrides: {}", report.ml_overrides);
            let bands = &report.confidence_bands;
            println!(
                "   Confidence: {} high / {} medium / {} low ({} to review)",
                bands.high, bands.medium, bands.low, bands.review_candidates
            );
        }
        None => println!("\n🤖 No model trained (rule-only)"),
    }
    println!("✅ Data quality score: {:.1}", report.quality.quality_score);

    let paths = pipeline.write_outputs(&records, &output)?;
    println!("\n💾 Outputs");
    println!("   {:?}", paths.classified_csv);
    println!("   {:?}", paths.report_json);
    println!("   {:?}", paths.sql_file);
    if let Some(model) = &paths.model_json {
        println!("   {:?}", model);
    }

    if let Some(conn) = &conn {
        let run = RunRecord {
            run_id: report.run_id.to_string(),
            started_at: report.generated_at,
            record_count: records.len(),
            model_trained: report.model_trained,
            accuracy: report.evaluation.as_ref().map(|e| e.accuracy),
            others_pct: report.gap_analysis.others_pct,
            quality_score: report.quality.quality_score,
        };
        let stored = insert_run(conn, &run, &records, &output.results)?;
        println!("✓ Stored {} classifications for run {}", stored, run.run_id);
    }

    println!("\n💡 Recommendations");
    for recommendation in &report.recommendations {
        println!("   • {}", recommendation);
    }

    Ok(())
}

fn run_classify(
    config: &ClassifierConfig,
    employer: Option<&str>,
    name: &str,
    amount: f64,
    model: Option<PathBuf>,
) -> Result<()> {
    let models = ModelSlot::new();
    if let Some(path) = model {
        models.install(TrainedModel::load(&path)?);
    }

    let classifier = HybridClassifier::new(
        Arc::new(rule_engine(config)?),
        models,
        HybridPolicy::new(config.thresholds.high_confidence),
    );
    let result = classifier.classify_fields(employer, Some(name), amount);

    println!("🏷️  {}", result.final_category);
    println!(
        "   Rule: {} ({})",
        result.rule_category,
        result.matched_rule.as_deref().unwrap_or("no rule matched")
    );
    match result.ml_category {
        Some(ml) => println!("   ML:   {} ({:.1}% confidence)", ml, result.confidence * 100.0),
        None => println!("   ML:   no model"),
    }

    Ok(())
}

fn run_export_sql(config: &ClassifierConfig, out: Option<PathBuf>) -> Result<()> {
    let sql = render_function(&rule_engine(config)?, &config.sql);
    match out {
        Some(path) => {
            fs::write(&path, &sql)
                .with_context(|| format!("Failed to write SQL file: {:?}", path))?;
            println!("✓ SQL function written to {:?}", path);
        }
        None => println!("{}", sql),
    }
    Ok(())
}

fn run_rules(config: &ClassifierConfig, export: Option<PathBuf>) -> Result<()> {
    if let Some(path) = export {
        let set = match &config.rules_path {
            Some(rules) => RuleSet::from_file(rules)?,
            None => RuleSet::builtin(),
        };
        set.to_file(&path)?;
        println!("✓ {} rules written to {:?}", set.rules.len(), path);
        return Ok(());
    }

    let engine = rule_engine(config)?;
    println!("📋 {} rules in evaluation order", engine.rule_count());
    for rule in engine.rules() {
        println!(
            "   [{}] {:<34} → {:<13} ({} patterns)",
            rule.tier.rank(),
            rule.id,
            rule.target.as_str(),
            rule.patterns.len()
        );
    }
    println!("   Fallback → {}", CategoryLabel::Others);
    Ok(())
}
