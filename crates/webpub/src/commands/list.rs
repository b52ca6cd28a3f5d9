//! List command - show recorded publishes and orphan mounts.

use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args as ClapArgs;
use comfy_table::{Cell, Color};
use tracing::instrument;

use webpub_mount::{MountManager, PublishConfig, RecordEntry, RecordStore, SystemMountBackend};

use crate::output::{create_table, format_relative_time};

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Whether a publish is still live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    /// Recorded and mounted
    Active,
    /// Recorded, but nothing is mounted at the destination
    Stale,
    /// Mounted under the docroot with no record
    Orphan,
    /// Recorded; the mount table could not be read
    Unknown,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Active => "active",
            Self::Stale => "stale",
            Self::Orphan => "orphan",
            Self::Unknown => "unknown",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Row {
    alias: String,
    source: Option<PathBuf>,
    destination: PathBuf,
    url: String,
    status: Status,
    published_at: Option<DateTime<Utc>>,
}

#[instrument(level = "info", name = "cmd::list", skip_all)]
pub fn execute(args: &Args, config: &PublishConfig) -> Result<()> {
    let store = RecordStore::new(&config.state_dir);
    let records = store
        .list_records()
        .with_context(|| format!("Failed to read records from {}", store.dir().display()))?;

    let mounts = MountManager::new(Box::new(SystemMountBackend::new()));
    let mounted = match mounts.mounted_under(&config.docroot) {
        Ok(mounted) => Some(mounted),
        Err(e) => {
            tracing::warn!("{e}; mount status is unknown");
            None
        }
    };

    let rows = collect_rows(config, &records, mounted.as_deref());

    if args.json {
        output_json(&rows)?;
    } else if rows.is_empty() {
        eprintln!("No active publishes.");
        eprintln!("Use 'sudo webpub publish <PATH>' to publish a directory.");
    } else {
        output_table(&rows);
    }

    Ok(())
}

fn collect_rows(
    config: &PublishConfig,
    records: &[RecordEntry],
    mounted: Option<&[PathBuf]>,
) -> Vec<Row> {
    let mut rows: Vec<Row> = records
        .iter()
        .map(|record| {
            let destination = config.destination_for(&record.alias);
            let status = match mounted {
                Some(mounted) if mounted.contains(&destination) => Status::Active,
                Some(_) => Status::Stale,
                None => Status::Unknown,
            };
            Row {
                url: config.url_for(&record.alias),
                alias: record.alias.clone(),
                source: Some(record.source.clone()),
                destination,
                status,
                published_at: record.published_at,
            }
        })
        .collect();

    for destination in mounted.unwrap_or_default() {
        let Some(alias) = destination.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if records.iter().any(|r| r.alias == alias) {
            continue;
        }
        rows.push(Row {
            alias: alias.to_string(),
            source: None,
            destination: destination.clone(),
            url: config.url_for(alias),
            status: Status::Orphan,
            published_at: None,
        });
    }

    rows
}

fn output_table(rows: &[Row]) {
    let now = Utc::now();
    let mut table = create_table();
    table.set_header(vec!["Alias", "Source", "URL", "Status", "Published"]);

    for row in rows {
        let status = Cell::new(row.status).fg(match row.status {
            Status::Active => Color::Green,
            Status::Stale => Color::Yellow,
            Status::Orphan => Color::Red,
            Status::Unknown => Color::White,
        });
        let source = row
            .source
            .as_ref()
            .map_or_else(|| "?".to_string(), |s| s.display().to_string());
        let published = row
            .published_at
            .map_or_else(|| "-".to_string(), |t| format_relative_time(t, now));

        table.add_row(vec![
            Cell::new(&row.alias),
            Cell::new(source),
            Cell::new(&row.url),
            status,
            Cell::new(published),
        ]);
    }

    println!("{table}");

    let stale = rows.iter().filter(|r| r.status != Status::Active).count();
    if stale > 0 {
        eprintln!("{stale} publish(es) need 'sudo webpub clean <ALIAS>'");
    }
}

fn output_json(rows: &[Row]) -> Result<()> {
    let output = serde_json::json!({
        "publishes": rows.iter().map(row_to_json).collect::<Vec<_>>(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn row_to_json(row: &Row) -> serde_json::Value {
    serde_json::json!({
        "alias": row.alias,
        "source": row.source,
        "destination": row.destination,
        "url": row.url,
        "status": row.status.to_string(),
        "published_at": row.published_at.map(|t| t.to_rfc3339()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PublishConfig {
        PublishConfig {
            docroot: PathBuf::from("/var/www/html"),
            ..PublishConfig::default()
        }
    }

    fn record(alias: &str, source: &str) -> RecordEntry {
        RecordEntry {
            alias: alias.to_string(),
            source: PathBuf::from(source),
            published_at: None,
        }
    }

    #[test]
    fn test_rows_mark_active_stale_and_orphan() {
        let records = vec![record("blog", "/home/u/blog"), record("old", "/home/u/old")];
        let mounted = vec![
            PathBuf::from("/var/www/html/blog"),
            PathBuf::from("/var/www/html/lost"),
        ];

        let rows = collect_rows(&config(), &records, Some(mounted.as_slice()));

        let statuses: Vec<(&str, Status)> =
            rows.iter().map(|r| (r.alias.as_str(), r.status)).collect();
        assert_eq!(
            statuses,
            vec![
                ("blog", Status::Active),
                ("old", Status::Stale),
                ("lost", Status::Orphan),
            ]
        );
        assert_eq!(rows[0].url, "http://localhost/blog");
        assert_eq!(rows[2].source, None);
    }

    #[test]
    fn test_rows_without_mount_table() {
        let records = vec![record("blog", "/home/u/blog")];
        let rows = collect_rows(&config(), &records, None);
        assert_eq!(rows[0].status, Status::Unknown);
    }

    #[test]
    fn test_row_json_shape() {
        let rows = collect_rows(&config(), &[record("blog", "/home/u/blog")], Some(&[][..]));
        let value = row_to_json(&rows[0]);
        assert_eq!(value["alias"], "blog");
        assert_eq!(value["status"], "stale");
        assert_eq!(value["destination"], "/var/www/html/blog");
        assert!(value["published_at"].is_null());
    }
}
