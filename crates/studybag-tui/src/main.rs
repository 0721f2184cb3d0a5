use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use studybag_core::{
    Backpack, Catalog, ChatSession, Completion, Config, Credential, CredentialStore,
    DocumentSource, GeminiClient, LocalStorage, MaterialFilter, MaterialKind, SubmitRejected,
};

mod app;
mod handler;
mod logging;
mod tui;
mod ui;

use app::App;
use tui::EventHandler;

#[derive(Parser)]
#[command(name = "studybag")]
#[command(version, about = "Browse study materials and ask questions about them")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the study materials in the catalog
    List {
        /// Only this semester
        #[arg(short, long)]
        semester: Option<u8>,
        /// Only this subject (exact name)
        #[arg(long)]
        subject: Option<String>,
        /// Only this type: notes, syllabus, or qp
        #[arg(short, long)]
        kind: Option<String>,
    },
    /// Ask one question about a material or a PDF file
    Ask {
        /// Catalog id of the material, see `studybag list`
        #[arg(short, long, conflicts_with = "pdf", required_unless_present = "pdf")]
        material: Option<String>,
        /// Path of a PDF file
        #[arg(short, long)]
        pdf: Option<PathBuf>,
        /// Your question
        question: String,
    },
    /// Show the configuration, or change it with the flags below
    Config {
        /// Gemini model name, e.g. gemini-2.5-flash
        #[arg(long)]
        model: Option<String>,
        /// API base URL
        #[arg(long)]
        base_url: Option<String>,
    },
    /// Save the Gemini API key used for questions
    SetKey {
        /// The API key
        key: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        None => run_tui(&config).await,
        Some(command) => {
            logging::init_stderr()?;
            match command {
                Commands::List {
                    semester,
                    subject,
                    kind,
                } => list_materials(semester, subject, kind.as_deref()),
                Commands::Ask {
                    material,
                    pdf,
                    question,
                } => ask(&config, material.as_deref(), pdf, &question).await,
                Commands::Config { model, base_url } => update_config(model, base_url),
                Commands::SetKey { key } => set_key(&config, key),
            }
        }
    }
}

async fn run_tui(config: &Config) -> Result<()> {
    let log_path = logging::init_file()?;
    tracing::info!(log = %log_path.display(), model = config.model(), "starting terminal UI");

    let storage = LocalStorage::open(config.storage_path()?);
    let client = GeminiClient::new(config.base_url(), config.model());

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();

    let mut app = App::new(
        Catalog::builtin(),
        Backpack::load(storage.clone()),
        CredentialStore::new(storage),
        Arc::new(client.clone()),
        client.model().to_string(),
        events.sender(),
    );

    let result = run_loop(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    result
}

async fn run_loop(terminal: &mut tui::Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event),
            None => break,
        }
    }

    tracing::info!("terminal UI closed");
    Ok(())
}

fn list_materials(semester: Option<u8>, subject: Option<String>, kind: Option<&str>) -> Result<()> {
    let kind = match kind {
        Some(raw) => Some(
            MaterialKind::from_str(raw)
                .with_context(|| format!("Unknown material type '{}'", raw))?,
        ),
        None => None,
    };
    let filter = MaterialFilter {
        semester,
        subject,
        kind,
    };

    let catalog = Catalog::builtin();
    let materials = catalog.filter(&filter);
    if materials.is_empty() {
        println!("No materials found. Try adjusting your filters.");
        return Ok(());
    }

    for m in materials {
        println!(
            "{:<22} {:<32} {:<15} sem {} {} {}",
            m.id,
            m.title,
            m.kind.as_str(),
            m.semester,
            m.year,
            m.subject
        );
    }
    Ok(())
}

async fn ask(
    config: &Config,
    material: Option<&str>,
    pdf: Option<PathBuf>,
    question: &str,
) -> Result<()> {
    let storage = LocalStorage::open(config.storage_path()?);
    let credential = CredentialStore::new(storage).get();

    let source = DocumentSource::default();
    let document = match (material, pdf) {
        (_, Some(path)) => source.from_path(&path)?,
        (Some(id), None) => {
            let catalog = Catalog::builtin();
            let material = catalog
                .get(id)
                .with_context(|| format!("No material with id '{}'", id))?;
            source.from_material(material)
        }
        (None, None) => bail!("Pass --material or --pdf"),
    };

    let client = GeminiClient::new(config.base_url(), config.model());
    let mut session = ChatSession::with_document(credential, document);

    let completion = match session.ask(&client, question).await {
        Ok(completion) => completion,
        Err(SubmitRejected::NoCredential) => {
            bail!("No API key configured. Run `studybag set-key <KEY>` first.")
        }
        Err(reason) => bail!("Question not sent: {}", reason),
    };

    if let Some(reply) = session.transcript().last() {
        println!("{}", reply.content);
    }
    if completion == Completion::Failed {
        bail!("Could not get a response. Please check your API key and try again.");
    }
    Ok(())
}

/// Writes only file values; environment overrides are shown but never saved.
fn update_config(model: Option<String>, base_url: Option<String>) -> Result<()> {
    let path = Config::config_path()?;
    let mut file_config = Config::load_from(&path)?;

    if model.is_some() || base_url.is_some() {
        if model.is_some() {
            file_config.model = model;
        }
        if base_url.is_some() {
            file_config.base_url = base_url;
        }
        file_config.save()?;
        println!("Saved {}", path.display());
    }

    let mut effective = file_config;
    effective.apply_env(|name| std::env::var(name).ok());
    println!("model:    {}", effective.model());
    println!("base_url: {}", effective.base_url());
    println!("storage:  {}", effective.storage_path()?.display());
    Ok(())
}

fn set_key(config: &Config, key: String) -> Result<()> {
    let credential = Credential::new(key).context("API Key is required.")?;
    let store = CredentialStore::new(LocalStorage::open(config.storage_path()?));
    store.set(&credential)?;

    println!(
        "Saved API key {} to {}",
        credential.masked(),
        store.storage().path().display()
    );
    Ok(())
}
