use actionlog_tracker::{Envelope, JsonLinesStore, OfflineStore, ParsedFlag, SerialArg};
use anyhow::{Context, Result};
use chrono::DateTime;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Offline log (one JSON envelope per line)
    pub log: PathBuf,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    pub format: String,
}

pub fn inspect(args: InspectArgs) -> Result<()> {
    if !args.log.is_file() {
        anyhow::bail!("Log file does not exist: {}", args.log.display());
    }
    let store = JsonLinesStore::new(&args.log);
    let envelopes = store
        .load()
        .with_context(|| format!("Cannot read {}", args.log.display()))?;

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&envelopes)?),
        "text" => {
            for (index, envelope) in envelopes.iter().enumerate() {
                println!("{}", summarize(index + 1, envelope));
                if let Some(SerialArg::Commands(members)) = envelope.args.first() {
                    for member in members {
                        println!("      {} {}", "└".dimmed(), summarize_args(member));
                    }
                }
            }
            println!();
            println!("   {} commands", envelopes.len());
        }
        other => anyhow::bail!("Unknown format: {other}. Use: text or json"),
    }

    Ok(())
}

/// One line per envelope: position, time, tracker, action, arguments
fn summarize(position: usize, envelope: &Envelope) -> String {
    let time = DateTime::from_timestamp_millis(envelope.timestamp)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| envelope.timestamp.to_string());
    let flag = match envelope.parsed_flag {
        ParsedFlag::None => "",
        ParsedFlag::Local => " [local]",
        ParsedFlag::Remote => " [remote]",
    };
    let model = envelope
        .args_model_name
        .as_deref()
        .map(|m| format!(" @{m}"))
        .unwrap_or_default();

    format!(
        "{position:>4}  {time}  {}  {}{model}{flag}",
        envelope.tracker_name,
        summarize_args(envelope)
    )
}

fn summarize_args(envelope: &Envelope) -> String {
    let args: Vec<String> = envelope.args.iter().map(describe).collect();
    format!("{}({})", envelope.action, args.join(", "))
}

fn describe(arg: &SerialArg) -> String {
    match arg {
        SerialArg::Node(node) => match (&node.lookup_id, &node.inline_xml) {
            (Some(id), Some(_)) => format!("{}#{id}+xml", node.xpath),
            (Some(id), None) if !node.xpath.starts_with('/') => format!("{}#{id}", node.xpath),
            _ => node.xpath.clone(),
        },
        SerialArg::Commands(members) => format!("{} commands", members.len()),
        SerialArg::Value(value) => value.to_string(),
    }
}
