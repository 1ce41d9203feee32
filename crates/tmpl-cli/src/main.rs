//! `tmpl`: authoring checks for template schemas and migration snippets
//!
//! Every subcommand prints one JSON document on stdout and exits non-zero
//! when the checked input is rejected.

use anyhow::Context;
use clap::{value_parser, Arg, ArgMatches, Command};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tmpl_engine::EngineConfig;
use tmpl_sandbox::MigrationSandbox;
use tmpl_schema::{check_schema, structural_changes, FieldSchema, SchemaValidator, ValidationErrors};
use tracing_subscriber::EnvFilter;

/// Printed report and whether the input was accepted
struct Report {
    body: Value,
    accepted: bool,
}

impl Report {
    fn accepted(body: Value) -> Self {
        Self { body, accepted: true }
    }

    fn rejected(body: Value) -> Self {
        Self { body, accepted: false }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();
    match run(&matches) {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report.body).unwrap_or_default());
            if report.accepted {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(2)
        }
    }
}

fn path_arg(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help(help)
}

fn cli() -> Command {
    Command::new("tmpl")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Template schema and migration authoring checks")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("validate")
                .about("Validate a data file against a field schema")
                .arg(path_arg("schema", "Field schema JSON file"))
                .arg(path_arg("data", "Record data JSON file")),
        )
        .subcommand(
            Command::new("diff")
                .about("List structural changes between two field schemas")
                .arg(path_arg("old", "Current field schema JSON file"))
                .arg(path_arg("new", "Proposed field schema JSON file")),
        )
        .subcommand(
            Command::new("check-syntax")
                .about("Parse a migration snippet without running it")
                .arg(path_arg("transform", "Migration snippet file")),
        )
        .subcommand(
            Command::new("try-transform")
                .about("Run a migration snippet in the sandbox against one record")
                .arg(path_arg("transform", "Migration snippet file"))
                .arg(path_arg("data", "Record data JSON file"))
                .arg(path_arg("schema", "Target field schema JSON file").required(false))
                .arg(path_arg("config", "Engine configuration TOML file").required(false)),
        )
}

fn run(matches: &ArgMatches) -> anyhow::Result<Report> {
    match matches.subcommand() {
        Some(("validate", args)) => {
            let fields: Vec<FieldSchema> = read_json(path(args, "schema")?)?;
            let data: Value = read_json(path(args, "data")?)?;
            Ok(validate(&fields, &data, SchemaValidator::new()))
        }
        Some(("diff", args)) => {
            let old: Vec<FieldSchema> = read_json(path(args, "old")?)?;
            let new: Vec<FieldSchema> = read_json(path(args, "new")?)?;
            Ok(diff(&old, &new))
        }
        Some(("check-syntax", args)) => {
            let source = read_text(path(args, "transform")?)?;
            Ok(check_syntax(&source))
        }
        Some(("try-transform", args)) => {
            let source = read_text(path(args, "transform")?)?;
            let data: Value = read_json(path(args, "data")?)?;
            let fields: Option<Vec<FieldSchema>> = args
                .get_one::<PathBuf>("schema")
                .map(|p| read_json(p))
                .transpose()?;
            let config = match args.get_one::<PathBuf>("config") {
                Some(p) => EngineConfig::from_file(p)?,
                None => EngineConfig::default(),
            };
            Ok(try_transform(&source, &data, fields.as_deref(), &config))
        }
        _ => anyhow::bail!("unknown subcommand"),
    }
}

fn validate(fields: &[FieldSchema], data: &Value, validator: SchemaValidator) -> Report {
    if let Err(errors) = check_schema(fields) {
        return Report::rejected(json!({ "valid": false, "schemaErrors": error_list(&errors) }));
    }
    match validator.validate(data, fields) {
        Ok(normalized) => Report::accepted(json!({ "valid": true, "data": normalized })),
        Err(errors) => Report::rejected(json!({ "valid": false, "errors": error_list(&errors) })),
    }
}

fn diff(old: &[FieldSchema], new: &[FieldSchema]) -> Report {
    let changes: Vec<Value> = structural_changes(old, new)
        .iter()
        .map(|c| json!({ "path": c.path, "reason": c.reason.to_string() }))
        .collect();
    Report::accepted(json!({ "structural": !changes.is_empty(), "changes": changes }))
}

fn check_syntax(source: &str) -> Report {
    match MigrationSandbox::validate_syntax(source) {
        None => Report::accepted(json!({ "valid": true })),
        Some(message) => Report::rejected(json!({ "valid": false, "error": message })),
    }
}

fn try_transform(source: &str, data: &Value, fields: Option<&[FieldSchema]>, config: &EngineConfig) -> Report {
    let output = match MigrationSandbox::new(config.sandbox).run(source, data) {
        Ok(output) => output,
        Err(e) => return Report::rejected(json!({ "ok": false, "error": e.to_string() })),
    };
    let Some(fields) = fields else {
        return Report::accepted(json!({ "ok": true, "data": output }));
    };

    match SchemaValidator::with_max_depth(config.max_schema_depth).validate(&output, fields) {
        Ok(normalized) => Report::accepted(json!({ "ok": true, "data": normalized })),
        Err(errors) => Report::rejected(json!({
            "ok": false,
            "output": output,
            "errors": error_list(&errors),
        })),
    }
}

fn error_list(errors: &ValidationErrors) -> Vec<Value> {
    errors
        .errors()
        .iter()
        .map(|e| json!({ "path": e.path, "message": e.message }))
        .collect()
}

fn path<'a>(args: &'a ArgMatches, name: &str) -> anyhow::Result<&'a Path> {
    args.get_one::<PathBuf>(name)
        .map(PathBuf::as_path)
        .with_context(|| format!("missing --{name}"))
}

fn read_text(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = read_text(path)?;
    serde_json::from_str(&text).with_context(|| format!("invalid JSON in {}", path.display()))
}
