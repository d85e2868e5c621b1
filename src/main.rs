use anyhow::{bail, Context, Result};
use clap::Parser;
use inquire::{CustomType, Select};
use std::path::{Path, PathBuf};
use std::process;

use talk2character::core::book::{list_book_files, Book};
use talk2character::core::config::Config;
use talk2character::services::llm::create_llm;
use talk2character::services::prompts::PromptSet;
use talk2character::services::workflow::{character_menu, select_character, WorkflowManager};

/// Run in-character Q&A based on a structured book JSON file.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to the book data JSON file, or a directory of them.
    path: PathBuf,

    /// Configuration file.
    #[arg(long, env = "TALK2CHARACTER_CONFIG", default_value = "config.yml")]
    config: PathBuf,

    /// Character index; asked interactively when omitted.
    #[arg(long, allow_negative_numbers = true)]
    character: Option<i64>,

    /// Write the effective configuration to the config path if it does not exist yet.
    #[arg(long)]
    write_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config: {:#}", e);
            return Err(e);
        }
    };

    if args.write_config && !args.config.exists() {
        config.save(&args.config)?;
        println!("Configuration saved to {}.", args.config.display());
    }

    let book_path = choose_book(&args.path)?;
    let book = Book::load(&book_path)?;
    if book.characters.is_empty() {
        bail!("{} has no characters", book_path.display());
    }

    println!("Available characters:");
    for line in character_menu(&book) {
        println!("{}", line);
    }
    println!();

    let choice = match args.character {
        Some(choice) => choice,
        None => CustomType::<i64>::new(&format!("Choose a character (0 - {}):", book.characters.len() - 1))
            .with_error_message("Please type a character number")
            .prompt()?,
    };

    let Some(character_index) = select_character(&book, choice) else {
        eprintln!("Character {} not valid", choice);
        process::exit(1);
    };

    let prompts = PromptSet::load(config.prompts_dir.as_deref().map(Path::new))?;
    let llm = create_llm(&config.llm)?;
    let mut manager = WorkflowManager::new(&config, book, character_index, llm, prompts)?;

    println!("---------");
    println!("Playing {}", manager.character().name);
    println!("---------");
    println!();

    manager.run().await
}

fn choose_book(path: &Path) -> Result<PathBuf> {
    if !path.is_dir() {
        return Ok(path.to_path_buf());
    }

    let files = list_book_files(path)?;
    if files.is_empty() {
        bail!("No book JSON files found in {}", path.display());
    }
    if files.len() == 1 {
        return Ok(files[0].clone());
    }

    let options: Vec<String> = files
        .iter()
        .map(|file| {
            let name = file.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            match Book::load(file) {
                Ok(book) => format!("{} ({})", book.title(), name),
                Err(_) => format!("{} (unreadable)", name),
            }
        })
        .collect();

    let choice = Select::new("Select a book:", options)
        .raw_prompt()
        .context("No book selected")?;
    Ok(files[choice.index].clone())
}
