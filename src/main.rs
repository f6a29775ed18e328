use std::error::Error;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tokio::io::BufReader;
use tokio::sync::mpsc;

use unichat_sync::auth::{AuthClient, SessionTokens};
use unichat_sync::common::format_phone_number;
use unichat_sync::config::{self, AppConfig, BackendKind};
use unichat_sync::remote::{FirestoreClient, MemoryBackend, RemoteContacts, RemoteMessages};
use unichat_sync::storage::{ContactDatabase, LocalStore, SessionStore};
use unichat_sync::sync::{ChatSession, Reconciler, SyncService};
use unichat_sync::ui::ConsoleApp;

#[derive(Parser)]
#[command(name = "unichat", version, about = "UniChat contacts and chat from the terminal")]
struct Cli {
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an account with email and password
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        confirm_password: String,
    },
    /// Sign in and remember the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Forget the saved session
    Logout,
    /// List saved contacts merged with the server's
    Contacts,
    /// Save a contact on this device and on the server
    AddContact {
        #[arg(long)]
        name: String,
        #[arg(long)]
        phone: String,
        /// Prefix for the number, e.g. +1 (defaults to the configured one)
        #[arg(long)]
        country_code: Option<String>,
    },
    /// Open the shared chat
    Chat,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let app_config = AppConfig::load(&cli.config);
    let sessions = SessionStore::new(&app_config.session_path);

    match cli.command {
        Command::Signup {
            email,
            password,
            confirm_password,
        } => {
            let auth = AuthClient::new(app_config.api_key.clone());
            match auth.sign_up(&email, &password, &confirm_password).await {
                Ok(session) => {
                    sessions.save(&session)?;
                    println!("Signup successful");
                }
                Err(err) => println!("Signup failed: {err}"),
            }
        }
        Command::Login { email, password } => {
            let auth = AuthClient::new(app_config.api_key.clone());
            match auth.sign_in(&email, &password).await {
                Ok(session) => {
                    sessions.save(&session)?;
                    println!("Login successful");
                }
                Err(err) => println!("Login failed: {err}"),
            }
        }
        Command::Logout => {
            sessions.clear()?;
            println!("Signed out");
        }
        Command::Contacts => {
            let mut app = start_service(&app_config, &sessions)?;
            app.show_contacts().await;
        }
        Command::AddContact {
            name,
            phone,
            country_code,
        } => {
            let code = country_code.or_else(|| app_config.default_country_code.clone());
            let phone_number = format_phone_number(code.as_deref(), &phone);
            let mut app = start_service(&app_config, &sessions)?;
            app.add_contact(name, phone_number).await;
        }
        Command::Chat => {
            let mut app = start_service(&app_config, &sessions)?;
            app.chat(BufReader::new(tokio::io::stdin())).await;
        }
    }

    Ok(())
}

/// Wire stores, service and front end together; the service runs on its own task.
fn start_service(
    app_config: &AppConfig,
    sessions: &SessionStore,
) -> Result<ConsoleApp, Box<dyn Error>> {
    let local: Arc<dyn LocalStore> = Arc::new(ContactDatabase::with_path(&app_config.database_path)?);
    let (contacts, messages) = build_remote(app_config, sessions);

    // UI -> service
    let (cmd_tx, cmd_rx) = mpsc::channel(100);
    // service -> UI
    let (event_tx, event_rx) = mpsc::channel(100);

    let reconciler = Reconciler::new(local, contacts);
    let chat = ChatSession::new(messages, app_config.sender_name.clone());
    tokio::spawn(SyncService::new(event_tx, cmd_rx, reconciler, chat).run());

    Ok(ConsoleApp::new(cmd_tx, event_rx))
}

fn build_remote(
    app_config: &AppConfig,
    sessions: &SessionStore,
) -> (Arc<dyn RemoteContacts>, Arc<dyn RemoteMessages>) {
    let backend = match app_config.backend {
        BackendKind::Firestore if app_config.project_id.trim().is_empty() => {
            log::warn!("No project_id configured; using the in-memory backend");
            BackendKind::Memory
        }
        kind => kind,
    };

    match backend {
        BackendKind::Firestore => {
            let api_key = Some(app_config.api_key.clone());
            let mut client =
                FirestoreClient::new(&app_config.project_id, api_key, app_config.poll_settings());
            match sessions.load() {
                Some(session) => {
                    log::info!("Using session of {}", session.email);
                    let auth = AuthClient::new(app_config.api_key.clone());
                    let store = SessionStore::new(&app_config.session_path);
                    let tokens = SessionTokens::new(auth, store, session);
                    client = client.with_session(Arc::new(tokens));
                }
                None => log::warn!("Not signed in; requests are unauthenticated"),
            }
            let client = Arc::new(client);
            let contacts: Arc<dyn RemoteContacts> = client.clone();
            let messages: Arc<dyn RemoteMessages> = client;
            (contacts, messages)
        }
        BackendKind::Memory => {
            let backend = Arc::new(MemoryBackend::new());
            let contacts: Arc<dyn RemoteContacts> = backend.clone();
            let messages: Arc<dyn RemoteMessages> = backend;
            (contacts, messages)
        }
    }
}
