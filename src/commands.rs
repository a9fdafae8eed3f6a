//! Command execution.

use crate::{Commands, MetaCommands};
use colored::Colorize;
use rods_client::{AvuEntry, ClientError, ResultSet, Session};
use rods_protocol::Column;
use tokio::io::AsyncWriteExt;

/// Executes a command and returns the formatted output.
pub async fn execute(session: &Session, cmd: Commands) -> Result<String, Box<dyn std::error::Error>> {
    match cmd {
        Commands::Version => {
            let version = session.server_version().await?;
            Ok(format!(
                "{} {} (api {})",
                "Server".bold(),
                version.rel_version.cyan(),
                version.api_version
            ))
        }

        Commands::LsColl { path } => {
            let collection = session.get_collection(&path).await?;
            let mut output = format!("{}:", collection.name.bold());

            for child in session.list_collections(&collection.name).await? {
                output.push_str(&format!("\n  C- {}", child.name.blue()));
            }
            for object in session.list_data_objects(&collection.name).await? {
                output.push_str(&format!(
                    "\n  {:<40} {:>12}  {}",
                    object.name,
                    object.size,
                    object.resource.dimmed()
                ));
            }
            Ok(output)
        }

        Commands::Stat { path } => match session.get_data_object(&path).await {
            Ok(object) => Ok(format!(
                "{}\n  {:<12} {}\n  {:<12} {}\n  {:<12} {}\n  {:<12} {}\n  {:<12} {}\n  {:<12} {}",
                format!("Data object {}", object.path().cyan()).bold(),
                "id",
                object.id,
                "collection",
                object.collection_name(),
                "size",
                object.size,
                "type",
                object.data_type,
                "resource",
                object.resource,
                "owner",
                object.owner
            )),
            Err(ClientError::NotFound(_)) => {
                let collection = session.get_collection(&path).await?;
                Ok(format!(
                    "{}\n  {:<12} {}\n  {:<12} {}\n  {:<12} {}",
                    format!("Collection {}", collection.name.cyan()).bold(),
                    "id",
                    collection.id,
                    "parent",
                    collection.parent_name,
                    "owner",
                    collection.owner
                ))
            }
            Err(e) => Err(e.into()),
        },

        Commands::Get { path, output } => {
            let data = session.get_data(&path).await?;

            match output {
                Some(file) => {
                    tokio::fs::write(&file, &data).await?;
                    Ok(format!(
                        "{} {} bytes to {}",
                        "Wrote".green(),
                        data.len(),
                        file.display()
                    ))
                }
                None => {
                    let mut stdout = tokio::io::stdout();
                    stdout.write_all(&data).await?;
                    stdout.flush().await?;
                    Ok(String::new())
                }
            }
        }

        Commands::Put { local, path } => {
            let data = tokio::fs::read(&local).await?;
            let object = session.put_data(&path, &data).await?;

            Ok(format!(
                "{} {} ({} bytes)",
                "Uploaded".green(),
                object.path().cyan(),
                object.size
            ))
        }

        Commands::Rm { path } => {
            session.unlink(&path).await?;
            Ok(format!("{} {}", "Removed".green(), path.cyan()))
        }

        Commands::Meta { command } => execute_meta(session, command).await,

        Commands::Query {
            columns,
            conditions,
            limit,
        } => {
            let columns = columns
                .iter()
                .map(|name| parse_column(name))
                .collect::<Result<Vec<_>, _>>()?;

            let mut query = session.query(columns);
            for condition in &conditions {
                let (name, value) = condition
                    .split_once('=')
                    .ok_or_else(|| format!("condition {:?} is not COLUMN=VALUE", condition))?;
                query = query.filter(parse_column(name.trim())?, value);
            }
            if let Some(limit) = limit {
                query = query.limit(limit);
            }

            Ok(format_result_set(&query.execute().await?))
        }
    }
}

async fn execute_meta(
    session: &Session,
    cmd: MetaCommands,
) -> Result<String, Box<dyn std::error::Error>> {
    match cmd {
        MetaCommands::Ls { kind, target } => {
            let entries = session.get_meta(kind, &target).await?;
            if entries.is_empty() {
                return Ok(format!("No metadata on {} {}", kind, target).yellow().to_string());
            }

            let mut output = format!("{}", format!("Metadata on {} {}", kind, target.cyan()).bold());
            for entry in entries {
                output.push_str(&format!("\n  {}", entry));
            }
            Ok(output)
        }

        MetaCommands::Add {
            kind,
            target,
            name,
            value,
            units,
        } => {
            let avu = AvuEntry::new(name, value).with_units(units.unwrap_or_default());
            session.add_meta(kind, &target, &avu).await?;
            Ok(format!("{} {} on {}", "Added".green(), avu, target.cyan()))
        }

        MetaCommands::Rm {
            kind,
            target,
            name,
            value,
            units,
        } => {
            let avu = AvuEntry::new(name, value).with_units(units.unwrap_or_default());
            session.remove_meta(kind, &target, &avu).await?;
            Ok(format!("{} {} from {}", "Removed".green(), avu, target.cyan()))
        }

        MetaCommands::Cp {
            src_kind,
            dest_kind,
            src,
            dest,
        } => {
            session.copy_meta(src_kind, dest_kind, &src, &dest).await?;
            Ok(format!(
                "{} metadata from {} to {}",
                "Copied".green(),
                src.cyan(),
                dest.cyan()
            ))
        }
    }
}

fn parse_column(name: &str) -> Result<Column, String> {
    Column::from_name(name).ok_or_else(|| format!("unknown column {:?}", name))
}

fn format_result_set(result: &ResultSet) -> String {
    if result.is_empty() {
        return "No rows".yellow().to_string();
    }

    let header = result
        .columns()
        .iter()
        .map(|c| c.name)
        .collect::<Vec<_>>()
        .join("\t");
    let mut output = header.bold().to_string();
    for row in result {
        output.push('\n');
        output.push_str(&row.values().collect::<Vec<_>>().join("\t"));
    }
    output.push_str(&format!("\n{}", format!("({} rows)", result.len()).dimmed()));
    output
}
