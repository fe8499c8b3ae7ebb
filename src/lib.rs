//! dialect-alert: dashboard backend for the dialect recognition flow.
//!
//! Wires the recorder controller, recognition submitter, result history, and
//! the notification/auth services together behind a console command surface,
//! and hosts the embedded stub recognition endpoint unless an external one is
//! configured.

pub mod audio;
pub mod auth;
pub mod effects;
pub mod history;
pub mod notify;
pub mod recognition;
pub mod session;
pub mod settings;

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use auth::AuthService;
use effects::{EffectRunner, SessionEffectRunner};
use history::ResultHistory;
use notify::NotificationCenter;
use recognition::endpoint::EndpointState;
use session::{reduce, Effect, Event, State};

/// One-line rendering of the session state for the console.
fn status_line(state: &State) -> String {
    match state {
        State::Idle => "Ready. Type 'start' to begin recording.".to_string(),
        State::Arming { .. } => "Requesting microphone...".to_string(),
        State::Recording { started_at, .. } => format!(
            "Recording in progress... Speak now ({}s). Type 'stop' to finish.",
            started_at.elapsed().as_secs()
        ),
        State::Finalizing { .. } => "Finalizing recording...".to_string(),
        State::Submitting { .. } => "Analyzing dialect...".to_string(),
    }
}

/// Run the main state loop
async fn run_state_loop(
    mut rx: mpsc::Receiver<Event>,
    tx: mpsc::Sender<Event>,
    effect_runner: Arc<dyn EffectRunner>,
) {
    let mut state = State::default();

    println!("{}", status_line(&state));
    log::info!("Session loop started");

    while let Some(event) = rx.recv().await {
        log::debug!("Received event: {:?}", event);

        // Handle Exit at the edge
        if matches!(event, Event::Exit) {
            log::info!("Exit requested, shutting down session loop");
            break;
        }

        let old_discriminant = std::mem::discriminant(&state);
        let (next, effects) = reduce(&state, event);
        let new_discriminant = std::mem::discriminant(&next);

        // Log state transitions
        if old_discriminant != new_discriminant {
            log::info!("State transition: {:?} -> {:?}", state, next);
        }

        state = next;

        // Execute effects
        for eff in effects {
            match eff {
                Effect::EmitStatus => println!("{}", status_line(&state)),
                other => effect_runner.spawn(other, tx.clone()),
            }
        }
    }

    log::info!("Session loop ended");
}

fn print_help() {
    println!("Commands:");
    println!("  start                                  begin a recording session");
    println!("  stop                                   finish recording and submit");
    println!("  cancel                                 abort the current recording");
    println!("  history                                show recognition results, newest first");
    println!("  register <email> <password> [name]     create an account and sign in");
    println!("  login <email> <password>               sign in");
    println!("  logout                                 sign out");
    println!("  notifications                          show your notification feed");
    println!("  read <notification-id>                 mark a notification as read");
    println!("  quit                                   exit");
}

async fn handle_command(
    line: &str,
    tx: &mpsc::Sender<Event>,
    history: &Arc<Mutex<ResultHistory>>,
    auth: &Arc<AuthService>,
    notifier: &Arc<NotificationCenter>,
) -> bool {
    let mut parts = line.split_whitespace();
    let Some(command) = parts.next() else {
        return true;
    };

    match command {
        "start" => {
            let _ = tx.send(Event::StartRequested).await;
        }
        "stop" => {
            let _ = tx.send(Event::StopRequested).await;
        }
        "cancel" => {
            let _ = tx.send(Event::Cancel).await;
        }
        "history" => {
            let history = history.lock().await;
            if history.is_empty() {
                println!("No recognition results yet");
            } else {
                println!("Recognition history ({} total, newest first):", history.len());
                for result in history.recent(10) {
                    println!(
                        "  {}  {}  {:.1}%  \"{}\"",
                        result.timestamp.format("%H:%M:%S"),
                        result.dialect,
                        result.confidence * 100.0,
                        result.transcript
                    );
                }
            }
        }
        "register" => match (parts.next(), parts.next()) {
            (Some(email), Some(password)) => {
                let rest: Vec<&str> = parts.collect();
                let display_name = if rest.is_empty() {
                    email.to_string()
                } else {
                    rest.join(" ")
                };
                match auth.register(email, password, &display_name) {
                    Ok(user) => println!("Registration successful! Signed in as {}", user.display_name),
                    Err(e) => println!("{}", e),
                }
            }
            _ => println!("usage: register <email> <password> [display name]"),
        },
        "login" => match (parts.next(), parts.next()) {
            (Some(email), Some(password)) => match auth.login(email, password) {
                Ok(user) => println!("Login successful! Welcome back, {}", user.display_name),
                Err(e) => println!("{}", e),
            },
            _ => println!("usage: login <email> <password>"),
        },
        "logout" => match auth.logout() {
            Ok(()) => println!("Logged out successfully"),
            Err(e) => println!("{}", e),
        },
        "notifications" => match auth.current_user() {
            Some(user) => {
                let feed = notifier.for_user(user.id);
                let unread = notifier.unread_count(user.id);
                println!(
                    "You have {} unread notification{}",
                    unread,
                    if unread == 1 { "" } else { "s" }
                );
                if feed.is_empty() {
                    println!("No notifications yet");
                }
                for notification in feed.iter().take(20) {
                    println!(
                        "  {} {}  {}: {} ({})",
                        if notification.read { " " } else { "*" },
                        notification.id,
                        notification.title,
                        notification.message,
                        notify::time_ago(notification.timestamp)
                    );
                }
            }
            None => println!("Sign in to see notifications"),
        },
        "read" => match parts.next().map(Uuid::parse_str) {
            Some(Ok(id)) => match auth.current_user() {
                Some(user) => {
                    if notifier.mark_as_read(user.id, id) {
                        println!("Marked as read");
                    } else {
                        println!("No such notification");
                    }
                }
                None => println!("Sign in first"),
            },
            _ => println!("usage: read <notification-id>"),
        },
        "help" => print_help(),
        "quit" | "exit" => return false,
        _ => println!("Unknown command '{}'. Type 'help' for the list.", command),
    }
    true
}

fn init_logging() {
    let env = env_logger::Env::default().default_filter_or("info");
    let _ = env_logger::Builder::from_env(env).try_init();
}

/// Application entry point: construct the services, spawn the embedded
/// endpoint and the session loop, then drive everything from stdin.
pub async fn run() -> std::io::Result<()> {
    init_logging();

    let app_settings = settings::load_or_init_settings();

    let endpoint_url = match app_settings.endpoint_url.clone() {
        Some(url) => {
            log::info!("Using external recognition endpoint: {}", url);
            url
        }
        None => {
            let listener = TcpListener::bind(&app_settings.listen_addr).await?;
            let addr = listener.local_addr()?;
            let state = Arc::new(EndpointState::simulated(Duration::from_millis(
                app_settings.simulated_latency_ms,
            )));
            tokio::spawn(async move {
                if let Err(err) = recognition::endpoint::serve(listener, state).await {
                    log::error!("Recognition endpoint stopped: {}", err);
                }
            });
            log::info!("Embedded recognition endpoint listening on {}", addr);
            format!("http://{addr}/dialect-recognition")
        }
    };

    let auth = Arc::new(AuthService::new());
    let notifier = Arc::new(NotificationCenter::new());
    let history = Arc::new(Mutex::new(ResultHistory::new()));

    // Live notification feed (the dashboard bell)
    let mut notification_events = notifier.subscribe();
    tokio::spawn(async move {
        while let Ok(notification) = notification_events.recv().await {
            log::debug!(
                "Notification delivered: {}: {}",
                notification.title,
                notification.message
            );
        }
    });

    // Create event channel for the state machine
    let (tx, rx) = mpsc::channel::<Event>(32);

    let runner = SessionEffectRunner::new(
        endpoint_url,
        history.clone(),
        notifier.clone(),
        auth.clone(),
    );

    let loop_runner: Arc<dyn EffectRunner> = runner.clone();
    let loop_handle = tokio::spawn(run_state_loop(rx, tx.clone(), loop_runner));

    println!("dialect-alert dashboard");
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if !handle_command(line.trim(), &tx, &history, &auth, &notifier).await {
                    break;
                }
            }
            Ok(None) => break, // stdin closed
            Err(e) => {
                log::warn!("Failed to read command: {}", e);
                break;
            }
        }
    }

    // Teardown: stop the loop, then release any capture still running.
    // In-flight submissions are suppressed - their completion events land on
    // the closed channel and are dropped.
    let _ = tx.send(Event::Exit).await;
    let _ = loop_handle.await;
    runner.shutdown().await;

    log::info!("dialect-alert stopped");
    Ok(())
}
