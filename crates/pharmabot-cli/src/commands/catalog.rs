use std::sync::Arc;

use pharmabot_core::{extract_keyword, AppConfig, Catalog, MedicineRetriever};
use serde_json::json;

use crate::cli::{CatalogArgs, CatalogCommand, ImportArgs, SearchArgs};
use crate::error::CliError;
use crate::output::format_medicines;

use super::CommandResult;

pub fn run(args: &CatalogArgs, catalog: &Catalog, config: &AppConfig) -> Result<CommandResult, CliError> {
    match &args.command {
        CatalogCommand::Import(import) => run_import(import, catalog),
        CatalogCommand::Search(search) => run_search(search, catalog, config),
    }
}

fn run_import(args: &ImportArgs, catalog: &Catalog) -> Result<CommandResult, CliError> {
    let report = catalog.import_json_file(&args.file)?;
    let summary = format!(
        "imported {} medicine(s); catalog now holds {}",
        report.imported, report.total_medicines
    );
    Ok(CommandResult::ok(serde_json::to_value(report)?).with_summary(summary))
}

fn run_search(args: &SearchArgs, catalog: &Catalog, config: &AppConfig) -> Result<CommandResult, CliError> {
    let question = args.question();
    if question.trim().is_empty() {
        return Err(CliError::Command(String::from("question must not be empty")));
    }

    let limit = args.limit.unwrap_or(config.max_results);
    if limit == 0 {
        return Err(CliError::Command(String::from(
            "--limit must be greater than zero",
        )));
    }

    let keyword = extract_keyword(&question);
    let medicines = MedicineRetriever::new(Arc::new(catalog.clone()))
        .with_max_results(limit)
        .fetch_relevant(&question)?;
    let summary = format!("keyword: {keyword}\n{}", format_medicines(&medicines));
    let data = json!({
        "question": question,
        "keyword": keyword,
        "medicines": medicines,
    });

    Ok(CommandResult::ok(data).with_summary(summary))
}
