//! Gap maintenance commands: stats and rebalance.

use std::collections::BTreeMap;

use ordinal::Board;

use crate::cli::{GroupArgs, RebalanceArgs};
use crate::output::{OutputFormat, print_json, print_table};

type CmdResult = Result<(), Box<dyn std::error::Error>>;

fn optional(value: Option<impl ToString>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

/// Run the `stats` command
pub async fn stats(board: &Board, args: &GroupArgs, format: OutputFormat) -> CmdResult {
    let stats = board.gap_statistics(&args.group).await?;
    let needs_rebalancing = board.needs_rebalancing(&args.group).await?;

    match format {
        OutputFormat::Human => {
            let rows = vec![
                vec!["records".to_string(), stats.count.to_string()],
                vec!["min gap".to_string(), optional(stats.min_gap)],
                vec!["max gap".to_string(), optional(stats.max_gap)],
                vec!["avg gap".to_string(), optional(stats.avg_gap)],
                vec!["small gaps".to_string(), stats.small_gaps.to_string()],
                vec![
                    "needs rebalancing".to_string(),
                    needs_rebalancing.to_string(),
                ],
            ];
            print_table(&["GROUP", args.group.as_str()], &rows);
        }
        OutputFormat::Json => print_json(&serde_json::json!({
            "group": args.group,
            "stats": stats,
            "needs_rebalancing": needs_rebalancing,
        }))?,
    }
    Ok(())
}

/// Run the `rebalance` command
pub async fn rebalance(board: &Board, args: &RebalanceArgs, format: OutputFormat) -> CmdResult {
    // `--all` and an explicit group are mutually exclusive.
    let rewritten = match &args.group {
        Some(group) => {
            let count = board.rebalance_column(group).await?;
            BTreeMap::from([(group.clone(), count)])
        }
        None => board.rebalance_all().await?,
    };

    match format {
        OutputFormat::Human => {
            if rewritten.is_empty() {
                println!("No group needed rebalancing.");
                return Ok(());
            }
            let rows: Vec<Vec<String>> = rewritten
                .iter()
                .map(|(group, count)| vec![group.clone(), count.to_string()])
                .collect();
            print_table(&["GROUP", "REWRITTEN"], &rows);
        }
        OutputFormat::Json => print_json(&rewritten)?,
    }
    Ok(())
}
