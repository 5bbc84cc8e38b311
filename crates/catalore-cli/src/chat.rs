//! The `catalore chat` command: an interactive loop over the ingested store.

use anyhow::{Context, Result};
use colored::Colorize;
use std::io::{self, BufRead, Write};

use catalore_chat::{ChatSession, OllamaClient};
use catalore_store::VectorStore;

use crate::config::Config;

pub fn run(cfg: &Config) -> Result<()> {
    let embedder = cfg.embedder()?;
    let store = VectorStore::open_or_create(&cfg.store_path(), embedder.identity())
        .context("failed to open vector store")?;
    if store.is_empty() {
        println!(
            "{} store at {} is empty; run `catalore ingest` first",
            "info:".yellow().bold(),
            cfg.store_path().display()
        );
    }
    let model = OllamaClient::new(&cfg.ollama_host, &cfg.chat_model, &cfg.embed_model);
    let mut session = ChatSession::new(cfg.top_k);

    println!("Catalog chat. Ask about ingested products; `exit` to quit.");
    let stdin = io::stdin();
    loop {
        print!("{} ", "you>".cyan().bold());
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }

        match session.ask(&store, embedder.as_ref(), &model, question) {
            Ok(answer) => {
                println!("\n{}\n", answer.answer);
                for hit in &answer.sources {
                    let meta = &hit.metadata;
                    let mut line = format!(
                        "  {} {} (page {})",
                        "→".cyan(),
                        meta.product_name,
                        meta.page
                    );
                    if let Some(image) = &meta.image_path {
                        line.push_str(&format!(", image {}", image.display()));
                    }
                    line.push_str(&format!(", {}", meta.pdf_path.display()));
                    println!("{line}");
                }
                if !answer.sources.is_empty() {
                    println!();
                }
            }
            // Backend hiccups end the question, not the session.
            Err(e) => eprintln!("{} {e:#}", "error:".red().bold()),
        }
    }

    Ok(())
}
