//! `vba-toolkit`: a CLI over the read-only tool operations (extraction,
//! listing, structure analysis, refactor advice, code validation, backup
//! management) — everything in the service surface that doesn't need a
//! live host automation session.
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::prelude::*;
use vba_service::ops::{
    AnalyzeStructureArgs, BackupAction, BackupVbaArgs, ExtractVbaArgs, FileType, Operation,
    OperationOutput, RefactorVbaArgs, ValidateVbaCodeArgs,
};
use vba_service::{ServiceConfig, ServiceContext};

#[derive(Parser)]
#[command(name = "vba-toolkit", about = "Inspect and refactor VBA projects offline, without an Office host")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decompresses and prints every module's source.
    ExtractVba {
        file: PathBuf,
        /// Restrict output to one module.
        #[arg(long)]
        module: Option<String>,
    },
    /// Lists modules with their kind and line count.
    ListModules { file: PathBuf },
    /// Reports complexity metrics and top offenders.
    AnalyzeStructure {
        file: PathBuf,
        #[arg(long)]
        module: Option<String>,
    },
    /// Runs the rule-based refactor advisor.
    RefactorVba {
        file: PathBuf,
        #[arg(long)]
        module: Option<String>,
        /// `all`, `complexity`, `naming`, or `structure`.
        #[arg(long, default_value = "all")]
        filter: String,
    },
    /// Validates a candidate module body against the ASCII/block-balance rules.
    ValidateVbaCode {
        /// Path to a file containing the candidate VBA source.
        code_file: PathBuf,
        #[arg(long, value_enum, default_value_t = CliFileType::Excel)]
        file_type: CliFileType,
    },
    /// Manages timestamped backups of a container.
    BackupVba {
        file: PathBuf,
        #[command(subcommand)]
        action: BackupCommand,
    },
}

#[derive(Subcommand)]
enum BackupCommand {
    /// Takes a new backup.
    Create,
    /// Lists existing backups, most-recent-first.
    List,
    /// Restores a backup by id (after a safety copy of the current file).
    Restore { backup_id: String },
    /// Deletes a backup by id.
    Delete { backup_id: String },
}

#[derive(Copy, Clone, ValueEnum)]
enum CliFileType {
    Excel,
    Word,
}

impl From<CliFileType> for FileType {
    fn from(v: CliFileType) -> Self {
        match v {
            CliFileType::Excel => FileType::Excel,
            CliFileType::Word => FileType::Word,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = match ServiceConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    let ctx = ServiceContext::new(&config);

    let op = match build_operation(cli.command) {
        Ok(op) => op,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match vba_service::execute(&ctx, op) {
        Ok(output) => {
            print_output(output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn build_operation(command: Command) -> Result<Operation, String> {
    Ok(match command {
        Command::ExtractVba { file, module } => {
            Operation::ExtractVba(ExtractVbaArgs { file, module_name: module })
        }
        Command::ListModules { file } => Operation::ListModules(vba_service::ops::FileArgs { file }),
        Command::AnalyzeStructure { file, module } => {
            Operation::AnalyzeStructure(AnalyzeStructureArgs { file, module_name: module })
        }
        Command::RefactorVba { file, module, filter } => {
            Operation::RefactorVba(RefactorVbaArgs { file, module_name: module, filter })
        }
        Command::ValidateVbaCode { code_file, file_type } => {
            let code = fs::read_to_string(&code_file).map_err(|e| format!("failed to read {}: {e}", code_file.display()))?;
            Operation::ValidateVbaCode(ValidateVbaCodeArgs { code, file_type: file_type.into() })
        }
        Command::BackupVba { file, action } => {
            let (action, backup_id) = match action {
                BackupCommand::Create => (BackupAction::Create, None),
                BackupCommand::List => (BackupAction::List, None),
                BackupCommand::Restore { backup_id } => (BackupAction::Restore, Some(backup_id)),
                BackupCommand::Delete { backup_id } => (BackupAction::Delete, Some(backup_id)),
            };
            Operation::BackupVba(BackupVbaArgs { file, action, backup_id })
        }
    })
}

fn print_output(output: OperationOutput) {
    match output {
        OperationOutput::Extraction(modules) | OperationOutput::Modules(modules) => {
            for module in modules {
                println!("--- {} ({}, {} lines) ---", module.name, module.kind, module.line_count);
                if !module.procedures.is_empty() {
                    println!("public procedures: {}", module.procedures.join(", "));
                }
                println!("{}", module.code);
            }
        }
        OperationOutput::Analysis { metrics, advice, dependency_hints } => {
            println!(
                "{} modules, {} procedures, {} lines, mean complexity {:.2} (max {}), quality: {}",
                metrics.total_modules,
                metrics.total_procedures,
                metrics.total_lines,
                metrics.mean_complexity,
                metrics.max_complexity,
                metrics.quality.label(),
            );
            for offender in &metrics.top_offenders {
                println!("  {}.{}: complexity {}", offender.module_name, offender.procedure_name, offender.complexity);
            }
            for hint in &dependency_hints {
                if !hint.possible_callees.is_empty() {
                    println!("  {} possibly calls into: {}", hint.module_name, hint.possible_callees.join(", "));
                }
            }
            if !advice.is_empty() {
                println!("refactor advice:");
                print_suggestions(&advice);
            }
        }
        OperationOutput::Refactor { suggestions, summary } => {
            println!("{} high, {} medium, {} low", summary.high, summary.medium, summary.low);
            print_suggestions(&suggestions);
        }
        OperationOutput::Backup(entry) => {
            if let Some(entry) = entry {
                println!("{} ({} bytes, {})", entry.backup_id, entry.original_size, entry.created_at);
            } else {
                println!("ok");
            }
        }
        OperationOutput::Backups(entries) => {
            for entry in entries {
                println!("{} ({} bytes, {})", entry.backup_id, entry.original_size, entry.created_at);
            }
        }
        OperationOutput::Validation(problem) => match problem {
            None => println!("ok"),
            Some(message) => println!("invalid: {message}"),
        },
        other => {
            println!("{other:?}");
        }
    }
}

fn print_suggestions(suggestions: &[vba_core::advisor::Suggestion]) {
    for suggestion in suggestions {
        println!(
            "  [{:?}/{:?}] {}.{}: {}",
            suggestion.severity, suggestion.family, suggestion.module_name, suggestion.procedure_name, suggestion.message
        );
    }
}
