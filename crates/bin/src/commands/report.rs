//! Diagnostic report command.

use ordinal::{Board, diagnostics::Anomaly};

use crate::cli::ReportArgs;
use crate::output::{OutputFormat, print_json, print_table};

fn describe(anomaly: &Anomaly) -> String {
    match anomaly {
        Anomaly::Unpositioned { id } => format!("{id} has no position"),
        Anomaly::DuplicatePosition { position, ids } => {
            let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
            format!("{} share position {position}", ids.join(", "))
        }
        Anomaly::NarrowGap { lower, upper, gap } => {
            format!("{lower} and {upper} are only {gap} apart")
        }
    }
}

/// Run the `report` command.
///
/// Exits with status 1 when any anomaly was found.
pub async fn run(
    board: &Board,
    args: &ReportArgs,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let report = board.diagnostics(args.group.as_deref()).await?;

    match format {
        OutputFormat::Human => {
            println!("Report generated at {}", report.generated_at);
            for group in &report.groups {
                println!();
                let health = if group.is_healthy() { "healthy" } else { "unhealthy" };
                println!("{} ({} records, {health})", group.group, group.rows.len());
                let rows: Vec<Vec<String>> = group
                    .rows
                    .iter()
                    .map(|row| {
                        vec![
                            row.position
                                .map(|p| p.to_string())
                                .unwrap_or_else(|| "-".to_string()),
                            row.id.to_string(),
                        ]
                    })
                    .collect();
                print_table(&["POSITION", "ID"], &rows);
                for anomaly in &group.anomalies {
                    println!("  ! {}", describe(anomaly));
                }
            }
        }
        OutputFormat::Json => print_json(&report)?,
    }

    if !report.is_healthy() {
        eprintln!("{} anomalies found", report.anomaly_count());
        std::process::exit(1);
    }
    Ok(())
}
