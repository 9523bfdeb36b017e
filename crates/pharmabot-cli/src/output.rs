use std::fmt::Write as _;

use pharmabot_core::{MedicineRecord, PoolSnapshot};
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::commands::CommandResult;
use crate::error::CliError;

#[derive(Serialize)]
struct JsonEnvelope<'a> {
    data: &'a serde_json::Value,
    warnings: &'a [String],
    errors: &'a [String],
    latency_ms: u64,
}

pub fn render(result: &CommandResult, format: OutputFormat, pretty: bool) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            let envelope = JsonEnvelope {
                data: &result.data,
                warnings: &result.warnings,
                errors: &result.errors,
                latency_ms: result.latency_ms,
            };
            let payload = if pretty {
                serde_json::to_string_pretty(&envelope)?
            } else {
                serde_json::to_string(&envelope)?
            };
            println!("{payload}");
        }
        OutputFormat::Table => print!("{}", render_table(result)?),
    }

    Ok(())
}

fn render_table(result: &CommandResult) -> Result<String, CliError> {
    let mut out = String::new();
    match &result.summary {
        Some(summary) => {
            out.push_str(summary.trim_end());
            out.push('\n');
        }
        None => {
            out.push_str(&serde_json::to_string_pretty(&result.data)?);
            out.push('\n');
        }
    }

    if !result.warnings.is_empty() {
        out.push_str("warnings:\n");
        for warning in &result.warnings {
            let _ = writeln!(out, "  - {warning}");
        }
    }

    if !result.errors.is_empty() {
        out.push_str("errors:\n");
        for error in &result.errors {
            let _ = writeln!(out, "  - {error}");
        }
    }

    Ok(out)
}

/// Text rendering of pool health. Never includes secrets.
pub fn format_snapshot(snapshot: &PoolSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "active      : {}",
        snapshot.active.as_deref().unwrap_or("-")
    );
    let _ = writeln!(
        out,
        "available   : {}/{}",
        snapshot.available,
        snapshot.credentials.len()
    );
    let counters = &snapshot.counters;
    let _ = writeln!(
        out,
        "requests    : total={} ok={} failed={} failovers={} success_rate={:.0}%",
        counters.total_requests,
        counters.successful_requests,
        counters.failed_requests,
        counters.failovers,
        counters.success_rate * 100.0
    );
    out.push_str("credentials:\n");
    for view in &snapshot.credentials {
        let cooldown = view
            .cooldown_remaining_ms
            .map(|ms| format!("{}s", ms.div_ceil(1000)))
            .unwrap_or_else(|| String::from("-"));
        let _ = writeln!(
            out,
            "  {} {:<36} {:<15} failures={} ok={} cooldown={}{}",
            if view.active { "*" } else { " " },
            view.id,
            view.status.as_str(),
            view.failure_count,
            view.success_count,
            cooldown,
            view.last_error
                .map(|kind| format!(" last_error={kind}"))
                .unwrap_or_default(),
        );
    }
    out
}

pub fn format_medicines(medicines: &[MedicineRecord]) -> String {
    if medicines.is_empty() {
        return String::from("no matching medicines\n");
    }

    let mut out = String::new();
    for (index, medicine) in medicines.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. {} | {} | {} | {} | {}{}",
            index + 1,
            medicine.name,
            medicine.category,
            medicine.dosage_form,
            medicine.strength.as_deref().unwrap_or("-"),
            medicine.manufacturer.as_deref().unwrap_or("-"),
            if medicine.requires_prescription { " | Rx" } else { "" },
        );
    }
    out
}
