//! Stats report over every topic/subscription pair.

use crate::broker::{BrokerDirectory, SubscriptionStats};
use crate::utils::Result;

const HEADERS: [&str; 4] = ["Topic", "Subscription", "Active Messages", "DLQ Messages"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub topic: String,
    pub subscription: String,
    pub stats: SubscriptionStats,
}

/// Snapshots every pair. With `dead_letter_only`, pairs without dead
/// letters are left out. Any directory failure aborts the report.
pub async fn collect_stats<D>(directory: &D, dead_letter_only: bool) -> Result<Vec<DirectoryEntry>>
where
    D: BrokerDirectory + ?Sized,
{
    let mut rows = Vec::new();

    for topic in directory.list_topics().await? {
        for subscription in directory.list_subscriptions(&topic).await? {
            let stats = directory.get_stats(&topic, &subscription).await?;
            if dead_letter_only && stats.dead_letter == 0 {
                continue;
            }
            rows.push(DirectoryEntry {
                topic: topic.clone(),
                subscription,
                stats,
            });
        }
    }

    Ok(rows)
}

/// Column-aligned table, text columns left-aligned and counts right-aligned.
pub fn render_stats_table(rows: &[DirectoryEntry]) -> String {
    let cells: Vec<[String; 4]> = rows
        .iter()
        .map(|row| {
            [
                row.topic.clone(),
                row.subscription.clone(),
                row.stats.active.to_string(),
                row.stats.dead_letter.to_string(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut table = String::new();
    push_line(&mut table, &HEADERS, &widths);
    for row in &cells {
        push_line(&mut table, row, &widths);
    }
    table
}

fn push_line<S: AsRef<str>>(table: &mut String, cells: &[S; 4], widths: &[usize; 4]) {
    let line = format!(
        "{:<w0$}  {:<w1$}  {:>w2$}  {:>w3$}",
        cells[0].as_ref(),
        cells[1].as_ref(),
        cells[2].as_ref(),
        cells[3].as_ref(),
        w0 = widths[0],
        w1 = widths[1],
        w2 = widths[2],
        w3 = widths[3],
    );
    table.push_str(line.trim_end());
    table.push('\n');
}
