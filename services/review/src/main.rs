use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use auth::{AuthClient, AuthSession};
use clap::{Parser, Subcommand};
use common::config::ClientConfig;
use common::storage::FileStore;
use crossterm::event::{KeyCode, KeyModifiers};
use review::{
    HttpImageAnalyzer, ImagePayload, PublishOutcome, ReviewController, ReviewSettings, ReviewState,
};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_STORAGE_PATH: &str = "r8it.json";

#[derive(Parser)]
#[command(name = "r8it")]
#[command(about = "Photograph a place, get an analysis, publish a review", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a photo and edit the resulting review interactively
    Analyze {
        /// Path to the photo
        image: PathBuf,
    },
    /// Sign in and remember the session
    Login {
        /// Username or email
        username: String,
    },
    /// Sign out and forget the session
    Logout,
    /// Show the signed-in user
    Whoami,
}

type InputLines = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::from_env()?;

    let storage_path = config
        .storage_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_PATH));
    let store = FileStore::open(&storage_path)
        .with_context(|| format!("opening {}", storage_path.display()))?;
    let auth = AuthClient::from_config(&config, AuthSession::new(Arc::new(store)))?;

    let mut input = BufReader::new(tokio::io::stdin()).lines();

    match cli.command {
        Commands::Analyze { image } => analyze(&config, &auth, &image, &mut input).await?,
        Commands::Login { username } => {
            let password = if std::io::stdin().is_terminal() {
                tokio::task::spawn_blocking(|| read_password("Password: ")).await??
            } else {
                prompt(&mut input, "Password: ").await?
            };
            let user = auth.login(&username, &password).await?;
            println!("Signed in as {}", user.full_name());
        }
        Commands::Logout => {
            auth.logout().await;
            println!("Signed out");
        }
        Commands::Whoami => match auth.restore_session().await {
            Some(user) => println!("{} <{}>", user.full_name(), user.email),
            None => println!("Not signed in"),
        },
    }

    Ok(())
}

async fn analyze(
    config: &ClientConfig,
    auth: &AuthClient,
    path: &Path,
    input: &mut InputLines,
) -> Result<()> {
    let user = auth.restore_session().await;
    if let Some(user) = &user {
        info!("Publishing as {}", user.username);
    }

    let image = ImagePayload::from_path(path).await?;
    let analyzer = HttpImageAnalyzer::from_config(config)?;
    let mut controller = ReviewController::new(analyzer, ReviewSettings::from_config(config));

    controller.select_image(image);
    println!("Analyzing {}...", path.display());
    while matches!(controller.state(), ReviewState::Analyzing { .. }) {
        if controller.next_event().await.is_none() {
            bail!("analysis task stopped unexpectedly");
        }
    }

    if let Some(message) = controller.state().error_message() {
        bail!("analysis failed: {}", message);
    }

    print_draft(controller.state());
    println!("Commands: text <review> | toggle <tag> | rate <1-5> | vendor <name> | other <name> | show | publish | start-over | quit");

    loop {
        let line = prompt(input, "> ").await?;
        let (command, argument) = line.split_once(' ').unwrap_or((line.as_str(), ""));

        let result = match command {
            "text" => controller.edit_review(argument),
            "toggle" => controller.toggle_suggestion(argument),
            "rate" => match argument.trim().parse::<i32>() {
                Ok(rating) => controller.set_rating(rating),
                Err(_) => {
                    println!("Rating must be a number");
                    continue;
                }
            },
            "vendor" => controller.select_vendor(argument),
            "other" => controller
                .select_vendor(review::state_machine::OTHER_VENDOR)
                .and_then(|_| controller.submit_custom_vendor(argument)),
            "show" => Ok(()),
            "publish" => {
                let outcome = match controller.publish(user.as_ref()) {
                    Ok(PublishOutcome::ConfirmationRequired) => {
                        let answer = prompt(input, "Publish anonymously? [y/N] ").await?;
                        let confirmed = matches!(answer.trim(), "y" | "Y" | "yes");
                        controller.answer_anonymous_publish(confirmed)
                    }
                    other => other,
                };

                match outcome {
                    Ok(PublishOutcome::Published) => {
                        if let Some(review) = controller.state().published_review() {
                            println!("Published review of {}", review.business_name);
                        }
                        // Hold the confirmation until the session resets
                        while !controller.state().is_idle() {
                            if controller.next_event().await.is_none() {
                                break;
                            }
                        }
                        return Ok(());
                    }
                    Ok(_) => {
                        println!("Not published");
                        Ok(())
                    }
                    Err(rejection) => Err(rejection),
                }
            }
            "start-over" => {
                controller.start_over()?;
                println!("Draft discarded");
                return Ok(());
            }
            "quit" => return Ok(()),
            _ => {
                println!("Unknown command: {}", command);
                continue;
            }
        };

        match result {
            Ok(()) => print_draft(controller.state()),
            Err(rejection) => {
                warn!("{}", rejection);
                println!("{}", rejection);
            }
        }
    }
}

fn print_draft(state: &ReviewState) {
    let Some(analysis) = state.analysis() else {
        return;
    };

    println!();
    println!("{} {} ({})", analysis.icon, analysis.business_name, analysis.category);
    if !analysis.address.is_empty() {
        println!("  {}", analysis.address);
    }
    println!(
        "  Suggested rating: {:.1} (confidence {:.0}%)",
        analysis.suggested_rating,
        analysis.confidence * 100.0
    );
    if !analysis.positive_suggestions.is_empty() {
        println!("  + {}", analysis.positive_suggestions.join(" | "));
    }
    if !analysis.negative_suggestions.is_empty() {
        println!("  - {}", analysis.negative_suggestions.join(" | "));
    }
    if !analysis.suggested_vendors.is_empty() {
        println!("  Vendors: {}", analysis.suggested_vendors.join(" | "));
    }
    println!("Review: {}", state.review_text());
    println!("Rating: {}/5", state.user_rating());
    if let Some(vendor) = state.selected_vendor() {
        println!("Vendor: {}", vendor);
    }
}

async fn prompt(input: &mut InputLines, label: &str) -> Result<String> {
    use std::io::Write;

    print!("{}", label);
    std::io::stdout().flush()?;
    match input.next_line().await? {
        Some(line) => Ok(line.trim_end().to_string()),
        None => bail!("input closed"),
    }
}

/// Read a line from the terminal without echoing it
fn read_password(label: &str) -> Result<String> {
    use crossterm::event::{self, Event, KeyEvent, KeyEventKind};
    use crossterm::terminal;
    use std::io::Write;

    print!("{}", label);
    std::io::stdout().flush()?;

    terminal::enable_raw_mode()?;
    let read = || -> Result<String> {
        let mut password = String::new();
        loop {
            if let Event::Key(KeyEvent {
                code,
                modifiers,
                kind: KeyEventKind::Press,
                ..
            }) = event::read()?
                && password_key(&mut password, code, modifiers)?
            {
                return Ok(password);
            }
        }
    };
    let password = read();
    // Raw mode must be left even when reading failed
    terminal::disable_raw_mode()?;
    println!();
    password
}

/// Apply one key press to a hidden password; `true` once Enter is pressed
fn password_key(password: &mut String, code: KeyCode, modifiers: KeyModifiers) -> Result<bool> {
    match code {
        KeyCode::Enter => return Ok(true),
        KeyCode::Backspace => {
            password.pop();
        }
        KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => bail!("interrupted"),
        KeyCode::Char(c) => password.push(c),
        _ => {}
    }
    Ok(false)
}
