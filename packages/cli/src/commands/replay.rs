use actionlog_markup::serialize;
use actionlog_tracker::{
    ActionTracker, JsonLinesStore, LocalOnly, ModelRegistry, OfflineStore, ResumeMode,
    TrackerConfig, XmlDocument,
};
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::fs;
use std::path::PathBuf;
use tracing::info;

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Offline log (one JSON envelope per line)
    pub log: PathBuf,

    /// Document to load, as name=path.xml (repeatable)
    #[arg(short, long = "model", value_parser = parse_model, required = true)]
    pub models: Vec<(String, PathBuf)>,

    /// Directory holding actionlog.config.json
    #[arg(short, long, default_value = ".")]
    pub config: PathBuf,

    /// Write each resulting document to <dir>/<name>.xml instead of printing
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn replay(args: ReplayArgs) -> Result<()> {
    let config = TrackerConfig::load(&args.config)
        .with_context(|| format!("Cannot load config from {}", args.config.display()))?;

    let mut models = ModelRegistry::new();
    for (name, path) in &args.models {
        let source = fs::read_to_string(path)
            .with_context(|| format!("Cannot read {}", path.display()))?;
        let doc = XmlDocument::parse(&source)
            .with_context(|| format!("Cannot parse {}", path.display()))?;
        models.register(name.as_str(), doc);
    }

    let store = JsonLinesStore::new(&args.log);
    let entries = store
        .entries()
        .with_context(|| format!("Cannot read {}", args.log.display()))?;
    let total = entries.len();

    let mut tracker = ActionTracker::from_config(&config, Box::new(LocalOnly));
    let mut resolver = config.resolver();
    let resumed = tracker
        .resume(&mut models, &mut resolver, entries, ResumeMode::Replay)
        .context("Replay stopped")?;
    info!(replayed = resumed.len(), total, "Replay finished");

    eprintln!(
        "{} {} of {} commands",
        "Replayed".green().bold(),
        resumed.len(),
        total
    );

    for (_, model) in models.iter() {
        let doc = &model.document;
        let markup = serialize(doc, doc.root());
        match &args.output {
            Some(dir) => {
                fs::create_dir_all(dir)
                    .with_context(|| format!("Cannot create {}", dir.display()))?;
                let path = dir.join(format!("{}.xml", model.name));
                fs::write(&path, markup)
                    .with_context(|| format!("Cannot write {}", path.display()))?;
                eprintln!("  {} {}", "✓".green(), path.display());
            }
            None => {
                println!("{}", format!("== {} ==", model.name).bright_blue().bold());
                println!("{markup}");
            }
        }
    }

    Ok(())
}

/// Parse a `name=path` model argument
fn parse_model(raw: &str) -> Result<(String, PathBuf), String> {
    let (name, path) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=path, got '{raw}'"))?;
    if name.is_empty() || path.is_empty() {
        return Err(format!("expected name=path, got '{raw}'"));
    }
    Ok((name.to_string(), PathBuf::from(path)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actionlog_tracker::{Action, ActionSpec, NodeRef, Resolver};

    #[test]
    fn test_parse_model() {
        assert_eq!(
            parse_model("books=data/books.xml"),
            Ok(("books".to_string(), PathBuf::from("data/books.xml")))
        );
        assert!(parse_model("books").is_err());
        assert!(parse_model("=x.xml").is_err());
    }

    #[test]
    fn test_replay_writes_documents() {
        let dir = tempfile::tempdir().unwrap();
        let source = r#"<library><book a_id="b1" title="Dune"/></library>"#;
        let doc_path = dir.path().join("books.xml");
        fs::write(&doc_path, source).unwrap();

        let mut models = ModelRegistry::new();
        let id = models.register("books", XmlDocument::parse(source).unwrap());
        let book = {
            let doc = models.document(id).unwrap();
            NodeRef::new(id, doc.children(doc.root())[0])
        };
        let mut tracker = ActionTracker::new("books", Box::new(LocalOnly));
        tracker
            .execute(
                &mut models,
                ActionSpec::new(Action::SetProperty {
                    node: book,
                    name: "title".to_string(),
                    value: Some("Dune II".to_string()),
                }),
            )
            .unwrap();
        let batch = tracker.export_history(&mut Resolver::default(), &mut models);
        let log = dir.path().join("books.jsonl");
        JsonLinesStore::new(&log).save(&batch.envelopes).unwrap();

        let out = dir.path().join("out");
        replay(ReplayArgs {
            log,
            models: vec![("books".to_string(), doc_path)],
            config: dir.path().to_path_buf(),
            output: Some(out.clone()),
        })
        .unwrap();

        assert_eq!(
            fs::read_to_string(out.join("books.xml")).unwrap(),
            r#"<library><book a_id="b1" title="Dune II"/></library>"#
        );
    }
}
