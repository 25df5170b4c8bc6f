//! Record commands: add, move, list, groups, delete.

use ordinal::{Board, MoveRequest, Record, RecordId};

use crate::cli::{AddArgs, GroupArgs, IdArgs, MoveArgs};
use crate::output::{OutputFormat, print_json, print_table};

type CmdResult = Result<(), Box<dyn std::error::Error>>;

fn position_cell(record: &Record) -> String {
    record
        .position
        .map(|p| p.to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Run the `add` command
pub async fn add(board: &Board, args: &AddArgs, format: OutputFormat) -> CmdResult {
    let payload: serde_json::Value = serde_json::from_str(&args.payload)
        .map_err(|e| format!("--payload is not valid JSON: {e}"))?;
    let record = board.create_record(&args.group, payload).await?;

    match format {
        OutputFormat::Human => println!("{} {}", record.id, position_cell(&record)),
        OutputFormat::Json => print_json(&record)?,
    }
    Ok(())
}

/// Run the `move` command
pub async fn move_record(board: &Board, args: &MoveArgs, format: OutputFormat) -> CmdResult {
    let mut request = MoveRequest::new(args.id.as_str(), args.group.as_str());
    if let Some(after) = &args.after {
        request = request.after(after.as_str());
    }
    if let Some(before) = &args.before {
        request = request.before(before.as_str());
    }

    let outcome = board.move_record(&request).await?;
    match format {
        OutputFormat::Human => {
            println!(
                "{} moved {} -> {} at {} ({} attempt{}{})",
                outcome.record_id,
                outcome.from_group,
                outcome.group,
                outcome.position,
                outcome.attempts,
                if outcome.attempts == 1 { "" } else { "s" },
                if outcome.rebalanced { ", rebalanced" } else { "" },
            );
        }
        OutputFormat::Json => print_json(&outcome)?,
    }
    Ok(())
}

/// Run the `list` command
pub async fn list(board: &Board, args: &GroupArgs, format: OutputFormat) -> CmdResult {
    let records = board.list_group(&args.group).await?;

    match format {
        OutputFormat::Human => {
            if records.is_empty() {
                println!("Group {} is empty.", args.group);
                return Ok(());
            }
            let rows: Vec<Vec<String>> = records
                .iter()
                .map(|r| {
                    vec![
                        position_cell(r),
                        r.id.to_string(),
                        r.payload.to_string(),
                    ]
                })
                .collect();
            print_table(&["POSITION", "ID", "PAYLOAD"], &rows);
        }
        OutputFormat::Json => print_json(&records)?,
    }
    Ok(())
}

/// Run the `groups` command
pub async fn groups(board: &Board, format: OutputFormat) -> CmdResult {
    let groups = board.groups().await?;

    match format {
        OutputFormat::Human => {
            if groups.is_empty() {
                println!("No groups found.");
                return Ok(());
            }
            let mut rows = Vec::with_capacity(groups.len());
            for group in &groups {
                let records = board.list_group(group).await?;
                rows.push(vec![group.clone(), records.len().to_string()]);
            }
            print_table(&["GROUP", "RECORDS"], &rows);
        }
        OutputFormat::Json => print_json(&groups)?,
    }
    Ok(())
}

/// Run the `delete` command
pub async fn delete(board: &Board, args: &IdArgs, format: OutputFormat) -> CmdResult {
    let id = RecordId::from(args.id.as_str());
    board.delete_record(&id).await?;

    match format {
        OutputFormat::Human => println!("Deleted {id}"),
        OutputFormat::Json => print_json(&serde_json::json!({ "deleted": id }))?,
    }
    Ok(())
}
