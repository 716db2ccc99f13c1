//! Helios Docstore CLI (`hds`)
//!
//! Creates, fills and queries a paragraph-level document store on
//! Elasticsearch. Results are written to stdout as JSON lines; logs go to
//! stderr.

mod config;

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use anyhow::Context;
use clap::Parser;
use futures::StreamExt;
use serde_json::{Value, json};
use tracing::info;

use helios_docstore::backends::elasticsearch::ElasticsearchClient;
use helios_docstore::{Document, DocumentStore, Paragraphs};

use config::{CliConfig, Command, parse_tags, parse_vector};

/// Initializes logging on stderr; `RUST_LOG` overrides `level`.
fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "helios_docstore={level},helios_docstore_cli={level},warn"
        ))
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

/// Reads NDJSON documents from `path`, or stdin for `-`.
fn read_documents(path: &Path) -> anyhow::Result<Vec<Document>> {
    let reader: Box<dyn BufRead> = if path == Path::new("-") {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file =
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        Box::new(BufReader::new(file))
    };

    let mut documents = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", number + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(&line)
            .with_context(|| format!("Invalid JSON on line {}", number + 1))?
        {
            Value::Object(document) => documents.push(document),
            _ => anyhow::bail!("Line {} is not a JSON object", number + 1),
        }
    }
    Ok(documents)
}

fn print_paragraphs(out: &mut impl Write, (texts, meta): Paragraphs) -> anyhow::Result<()> {
    for (text, meta) in texts.into_iter().zip(meta) {
        writeln!(out, "{}", json!({ "text": text, "meta": meta }))?;
    }
    Ok(())
}

fn print_json(out: &mut impl Write, value: &impl serde::Serialize) -> anyhow::Result<()> {
    writeln!(out, "{}", serde_json::to_string(value)?)?;
    Ok(())
}

async fn run(config: CliConfig) -> anyhow::Result<()> {
    let client = ElasticsearchClient::new(config.elasticsearch_config())?;
    let store = DocumentStore::new(client, config.store_config()?)?;
    let mut out = io::stdout().lock();

    match config.command {
        Command::Init => {
            let outcome = store.initialize().await?;
            info!(index = %store.index(), outcome = ?outcome, "Index ready");
        }
        Command::Ingest { ref path } => {
            let documents = read_documents(path)?;
            let total = documents.len();
            store.write_documents(documents).await;
            store.refresh().await?;
            let count = store.count().await?;
            info!(index = %store.index(), submitted = total, count, "Ingest finished");
            print_json(&mut out, &json!({ "submitted": total, "count": count }))?;
        }
        Command::Query {
            ref text,
            top_k,
            ref candidates,
        } => {
            let results = store.query(text, top_k, Some(candidates.as_slice())).await?;
            print_paragraphs(&mut out, results)?;
        }
        Command::QueryEmbedding {
            ref vector,
            top_k,
            ref candidates,
        } => {
            let vector = parse_vector(vector)?;
            let results = store
                .query_by_embedding(&vector, top_k, Some(candidates.as_slice()))
                .await?;
            print_paragraphs(&mut out, results)?;
        }
        Command::Get { ref id } => {
            print_json(&mut out, &store.get_by_id(id).await?)?;
        }
        Command::GetByName { ref name } => {
            print_json(&mut out, &store.get_by_name(name).await?)?;
        }
        Command::IdsByTags { ref tags } => {
            let tags = parse_tags(tags).map_err(|e| anyhow::anyhow!(e))?;
            for id in store.get_ids_by_tags(&tags).await? {
                writeln!(out, "{}", id)?;
            }
        }
        Command::Count => {
            writeln!(out, "{}", store.count().await?)?;
        }
        Command::Dump => {
            let mut records = store.get_all();
            let mut dumped = 0usize;
            while let Some(record) = records.next().await {
                print_json(&mut out, &record?)?;
                dumped += 1;
            }
            info!(index = %store.index(), dumped, "Dump finished");
        }
    }

    out.flush()?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CliConfig::parse();
    init_logging(&config.log_level);

    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Configuration error: {}", error);
        }
        std::process::exit(1);
    }

    run(config).await
}
