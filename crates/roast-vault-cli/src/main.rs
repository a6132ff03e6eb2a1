use std::fmt;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use roast_vault_api::{
    read_boundary_file, CancellationToken, ExportOptions, ImportOptions, ImportStrategy,
    RoastVault, VaultConfig,
};
use roast_vault_core::codec;
use roast_vault_core::{
    recovery_options, Category, ErrorReport, LifecycleError, Locale, Operation, OperationContext,
    Phase, RecoveryOption, RoastId, RoastItem,
};
use roast_vault_store_sqlite::StoreError;
use serde_json::{json, Value};
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use tracing_subscriber::EnvFilter;

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "rv")]
#[command(about = "Roast Vault CLI")]
struct Cli {
    #[arg(long, default_value = "./roast_vault.sqlite3")]
    db: PathBuf,

    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Roast {
        #[command(subcommand)]
        command: Box<RoastCommand>,
    },
    Vault {
        #[command(subcommand)]
        command: Box<VaultCommand>,
    },
    Streak {
        #[command(subcommand)]
        command: Box<StreakCommand>,
    },
    Recovery {
        #[command(subcommand)]
        command: Box<RecoveryCommand>,
    },
}

#[derive(Debug, Subcommand)]
enum RoastCommand {
    Add(RoastAddArgs),
    List,
    Favorite(RoastIdArgs),
    Delete(RoastIdArgs),
    Clear,
}

#[derive(Debug, Args)]
struct RoastAddArgs {
    #[arg(long)]
    content: String,
    #[arg(long, value_parser = parse_category)]
    category: Category,
    #[arg(long, default_value_t = 3)]
    spice: i32,
    #[arg(long, default_value = "vi")]
    language: String,
}

#[derive(Debug, Args)]
struct RoastIdArgs {
    #[arg(long)]
    id: String,
}

#[derive(Debug, Subcommand)]
enum VaultCommand {
    Export(VaultExportArgs),
    Preview(VaultInputArgs),
    Import(VaultImportArgs),
    Verify(VaultInputArgs),
    IntegrityCheck,
}

#[derive(Debug, Args)]
struct VaultExportArgs {
    #[arg(long)]
    out: PathBuf,
    #[arg(long, default_value_t = false)]
    no_api_config: bool,
    #[arg(long, default_value_t = false)]
    no_device_info: bool,
    #[arg(long, default_value_t = false)]
    no_statistics: bool,
    #[arg(long, default_value_t = false)]
    anonymize: bool,
}

#[derive(Debug, Args)]
struct VaultInputArgs {
    #[arg(long = "in")]
    input: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StrategyArg {
    Merge,
    Replace,
}

impl From<StrategyArg> for ImportStrategy {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::Merge => Self::Merge,
            StrategyArg::Replace => Self::Replace,
        }
    }
}

#[derive(Debug, Args)]
struct VaultImportArgs {
    #[arg(long = "in")]
    input: PathBuf,
    #[arg(long, value_enum, default_value_t = StrategyArg::Merge)]
    strategy: StrategyArg,
    #[arg(long, default_value_t = false)]
    no_validate: bool,
    #[arg(long)]
    max_errors: Option<usize>,
}

#[derive(Debug, Subcommand)]
enum StreakCommand {
    Show,
    Check(StreakCheckArgs),
    Reset,
}

#[derive(Debug, Args)]
struct StreakCheckArgs {
    /// Activity date as YYYY-MM-DD; today (UTC) when omitted.
    #[arg(long)]
    date: Option<String>,
}

#[derive(Debug, Subcommand)]
enum RecoveryCommand {
    Log,
}

/// Lifecycle failure together with the recovery options to report.
#[derive(Debug)]
struct ReportedFailure {
    error: LifecycleError,
    options: Vec<RecoveryOption>,
    locale: Locale,
}

impl fmt::Display for ReportedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl std::error::Error for ReportedFailure {}

fn parse_category(raw: &str) -> std::result::Result<Category, String> {
    Category::parse(raw).map_err(|err| err.to_string())
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let Err(emit_err) = emit_json(failure_payload(err)) {
                eprintln!("failed to print error report: {emit_err:#}");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => VaultConfig::load(path)?,
        None => VaultConfig::default(),
    };
    let vault = RoastVault::open(&cli.db, &config)?;
    match cli.command {
        Command::Roast { command } => run_roast(*command, &vault),
        Command::Vault { command } => run_vault(*command, &vault),
        Command::Streak { command } => run_streak(*command, &vault),
        Command::Recovery { command } => run_recovery(*command, &vault),
    }
}

fn run_roast(command: RoastCommand, vault: &RoastVault) -> Result<()> {
    let store = vault.store();
    match command {
        RoastCommand::Add(args) => {
            let item = RoastItem::new(args.content, args.category, args.spice)
                .with_language(args.language);
            store.insert_roast(item.clone())?;
            emit_json(json!({ "roast": item, "total": store.roast_count() }))
        }
        RoastCommand::List => {
            let roasts = store.roasts();
            emit_json(json!({ "total": roasts.len(), "roasts": roasts }))
        }
        RoastCommand::Favorite(args) => {
            let id = parse_roast_id(&args.id)?;
            match store.toggle_favorite(id)? {
                Some(is_favorite) => emit_json(json!({
                    "id": id.to_string(),
                    "found": true,
                    "is_favorite": is_favorite,
                })),
                None => emit_json(json!({ "id": id.to_string(), "found": false })),
            }
        }
        RoastCommand::Delete(args) => {
            let id = parse_roast_id(&args.id)?;
            let deleted = store.delete_roast(id)?;
            emit_json(json!({ "id": id.to_string(), "deleted": deleted }))
        }
        RoastCommand::Clear => {
            let removed = store.clear_roasts()?;
            emit_json(json!({ "removed": removed }))
        }
    }
}

fn run_vault(command: VaultCommand, vault: &RoastVault) -> Result<()> {
    match command {
        VaultCommand::Export(args) => {
            let options = ExportOptions {
                include_api_configuration: !args.no_api_config,
                include_device_info: !args.no_device_info,
                include_statistics: !args.no_statistics,
                anonymize_data: args.anonymize,
            };
            let summary = vault
                .exporter()
                .export_snapshot(options, &args.out, None, &CancellationToken::new())
                .map_err(|err| reported(vault, err))?;
            emit_json(json!({ "status": "exported", "export": summary }))
        }
        VaultCommand::Preview(args) => {
            let bytes = read_boundary_file(&args.input)
                .map_err(|err| unlogged(vault, err, Phase::Validating))?;
            let preview = vault
                .importer()
                .preview_import(&bytes)
                .map_err(|err| unlogged(vault, err, Phase::Validating))?;
            emit_json(json!({ "preview": preview }))
        }
        VaultCommand::Import(args) => {
            let mut options = match ImportStrategy::from(args.strategy) {
                ImportStrategy::Merge => ImportOptions::merge(),
                ImportStrategy::Replace => ImportOptions::replace(),
            };
            options.validate_data = !args.no_validate;
            if let Some(max_errors) = args.max_errors {
                options.max_errors_allowed = max_errors;
            }
            let report = vault
                .importer()
                .import_file(&args.input, options, None, &CancellationToken::new())
                .map_err(|err| reported(vault, err))?;
            emit_json(json!({
                "status": "imported",
                "strategy": options.strategy.as_str(),
                "report": report,
                "total": vault.store().roast_count(),
            }))
        }
        VaultCommand::Verify(args) => run_verify(&args.input, vault),
        VaultCommand::IntegrityCheck => {
            let scan = vault.store().integrity_scan();
            emit_json(json!({ "clean": scan.is_clean(), "scan": scan }))
        }
    }
}

fn run_verify(input: &Path, vault: &RoastVault) -> Result<()> {
    let bytes =
        read_boundary_file(input).map_err(|err| unlogged(vault, err, Phase::Validating))?;
    let failure = |error: LifecycleError| unlogged(vault, error, Phase::VerifyingChecksum);

    let document: Value = serde_json::from_slice(&bytes)
        .map_err(|err| failure(LifecycleError::InvalidFormat(err.to_string())))?;
    let Some(checksum) = document.get("checksum").and_then(Value::as_str) else {
        return Err(failure(LifecycleError::InvalidFormat(
            "export carries no checksum".to_string(),
        )));
    };
    let checksum = checksum.to_string();
    codec::verify_document(&document).map_err(failure)?;

    emit_json(json!({
        "in": input.display().to_string(),
        "valid": true,
        "checksum": checksum,
        "byte_exact": codec::verify(&bytes, &checksum),
    }))
}

fn run_streak(command: StreakCommand, vault: &RoastVault) -> Result<()> {
    let store = vault.store();
    match command {
        StreakCommand::Show => emit_json(json!({ "streak": store.streak() })),
        StreakCommand::Check(args) => {
            let today = match args.date.as_deref() {
                Some(raw) => parse_date(raw)?,
                None => OffsetDateTime::now_utc().date(),
            };
            let (streak, outcome) = store.check_streak(today)?;
            emit_json(json!({ "outcome": outcome, "streak": streak }))
        }
        StreakCommand::Reset => {
            store.reset_streak()?;
            emit_json(json!({ "status": "reset", "streak": store.streak() }))
        }
    }
}

fn run_recovery(command: RecoveryCommand, vault: &RoastVault) -> Result<()> {
    match command {
        RecoveryCommand::Log => {
            let advisor = vault.advisor();
            let entries = advisor.entries();
            emit_json(json!({
                "capacity": advisor.capacity(),
                "total": entries.len(),
                "entries": entries,
            }))
        }
    }
}

fn reported(vault: &RoastVault, error: LifecycleError) -> anyhow::Error {
    let options = vault
        .advisor()
        .entries()
        .last()
        .map(|entry| entry.options.clone())
        .unwrap_or_default();
    anyhow::Error::new(ReportedFailure { error, options, locale: vault_locale(vault) })
}

/// Failure of a read-only command; its options are computed without logging.
fn unlogged(vault: &RoastVault, error: LifecycleError, phase: Phase) -> anyhow::Error {
    let options = recovery_options(&error, &OperationContext::new(Operation::Import, phase));
    anyhow::Error::new(ReportedFailure { error, options, locale: vault_locale(vault) })
}

fn vault_locale(vault: &RoastVault) -> Locale {
    Locale::from_language(&vault.store().preferences().preferred_language)
}

fn failure_payload(err: anyhow::Error) -> Value {
    let (error, options, locale) = match err.downcast::<ReportedFailure>() {
        Ok(failure) => (failure.error, failure.options, failure.locale),
        Err(err) => match err.downcast::<StoreError>() {
            Ok(store_err) => (LifecycleError::from(store_err), Vec::new(), Locale::default()),
            Err(err) => (LifecycleError::Internal(format!("{err:#}")), Vec::new(), Locale::default()),
        },
    };
    let report = ErrorReport::new(&error, locale);
    json!({
        "status": "error",
        "error": report,
        "recovery_options": options,
    })
}

fn parse_roast_id(raw: &str) -> Result<RoastId> {
    RoastId::parse(raw).map_err(|error| {
        anyhow::Error::new(ReportedFailure { error, options: Vec::new(), locale: Locale::default() })
    })
}

fn parse_date(raw: &str) -> Result<Date> {
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .with_context(|| format!("invalid date {raw}; expected YYYY-MM-DD"))
}

