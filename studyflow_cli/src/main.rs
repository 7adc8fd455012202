use chrono::Utc;
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use studyflow_core::config::BackendKind;
use studyflow_core::driver::TICK_PERIOD;
use studyflow_core::streak::streak_message;
use studyflow_core::*;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "studyflow")]
#[command(about = "Focus sessions, study tasks and daily streaks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Act as this user id instead of the configured one
    #[arg(long, global = true)]
    user: Option<UserId>,

    /// Use the hosted data service from the config file
    #[arg(long, global = true)]
    remote: bool,

    /// Read configuration from this file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage study tasks
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },

    /// Run a focus session countdown
    Focus {
        /// Session length in minutes, one of session.duration_options
        /// (15, 25, 30, 45 or 60 unless configured; defaults to session.default_minutes)
        #[arg(long)]
        minutes: Option<u32>,

        /// Task the session is for
        #[arg(long)]
        task: Option<Uuid>,

        /// Run to completion without reading stdin (for scripting and tests)
        #[arg(long)]
        auto_complete: bool,

        /// Tick period in milliseconds
        #[arg(long, hide = true)]
        tick_ms: Option<u64>,
    },

    /// Show the current and longest streak
    Streak,

    /// Show study statistics
    Stats,

    /// Ask the study assistant a question
    Ask {
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },

    /// Export study sessions to CSV
    Export {
        #[arg(long)]
        out: PathBuf,

        /// Include sessions that were never completed
        #[arg(long)]
        all: bool,
    },

    /// Inspect or create the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum TaskAction {
    /// Add a task
    Add {
        title: String,

        #[arg(long, default_value = "")]
        subject: String,

        #[arg(long, default_value = "")]
        description: String,
    },

    /// List tasks
    List {
        /// all, active or completed
        #[arg(long, default_value = "all")]
        filter: TaskFilter,
    },

    /// Mark a task completed
    Done { id: Uuid },

    /// Mark a task active again
    Reopen { id: Uuid },

    /// Delete a task
    Rm { id: Uuid },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Everything a command needs after flags and config are resolved
struct Context {
    config: Config,
    config_path: PathBuf,
    data_dir: PathBuf,
    user: UserId,
    store: Box<dyn Store>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    studyflow_core::logging::init_with_level("warn");

    let cli = Cli::parse();

    let (config_path, config) = match cli.config.clone() {
        Some(path) if path.exists() => {
            let config = Config::load_from(&path)?;
            (path, config)
        }
        Some(path) => (path, Config::default()),
        None => (Config::default_config_path(), Config::load()?),
    };

    if let Commands::Config { action } = &cli.command {
        return cmd_config(action, &config, &config_path);
    }

    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| config.data.data_dir.clone());
    std::fs::create_dir_all(&data_dir)?;

    let user = match cli.user.or(config.user.id) {
        Some(user) => user,
        None => local_identity(&data_dir)?,
    };

    let store: Box<dyn Store> = if cli.remote || config.backend.kind == BackendKind::Remote {
        Box::new(RestStore::from_config(&config.backend)?)
    } else {
        Box::new(LocalStore::new(Config::local_store_path(&data_dir)))
    };

    let ctx = Context {
        config,
        config_path,
        data_dir,
        user,
        store,
    };
    tracing::debug!(
        "Acting as {} with data in {:?} (config {:?})",
        ctx.user,
        ctx.data_dir,
        ctx.config_path
    );

    match cli.command {
        Commands::Task { action } => cmd_task(&ctx, action).await,
        Commands::Focus {
            minutes,
            task,
            auto_complete,
            tick_ms,
        } => cmd_focus(&ctx, minutes, task, auto_complete, tick_ms).await,
        Commands::Streak => cmd_streak(&ctx).await,
        Commands::Stats => cmd_stats(&ctx).await,
        Commands::Ask { question } => cmd_ask(&ctx, &question.join(" ")).await,
        Commands::Export { out, all } => cmd_export(&ctx, &out, all).await,
        // handled before the store is opened
        Commands::Config { .. } => Ok(()),
    }
}

/// User id persisted in the data directory, created on first use
fn local_identity(data_dir: &Path) -> Result<UserId> {
    let path = data_dir.join("user_id");
    if path.exists() {
        return std::fs::read_to_string(&path)?.parse();
    }

    let user = UserId::new();
    std::fs::write(&path, format!("{}\n", user))?;
    tracing::info!("Created local identity {} at {:?}", user, path);
    Ok(user)
}

async fn cmd_task(ctx: &Context, action: TaskAction) -> Result<()> {
    let store = ctx.store.as_ref();

    match action {
        TaskAction::Add {
            title,
            subject,
            description,
        } => {
            let task = store
                .insert_task(NewTask {
                    user_id: ctx.user,
                    title,
                    description,
                    subject,
                })
                .await?;
            println!("✓ Added task {}", task.id);
            println!("  {}", task.title);
        }

        TaskAction::List { filter } => {
            let tasks: Vec<Task> = store
                .list_tasks(&ctx.user)
                .await?
                .into_iter()
                .filter(|t| filter.matches(t))
                .collect();

            if tasks.is_empty() {
                println!("No tasks.");
                return Ok(());
            }
            for task in &tasks {
                display_task(task);
            }
        }

        TaskAction::Done { id } => {
            owned_task(ctx, &id).await?;
            store.set_task_completed(&id, true).await?;
            println!("✓ Task completed");
        }

        TaskAction::Reopen { id } => {
            owned_task(ctx, &id).await?;
            store.set_task_completed(&id, false).await?;
            println!("✓ Task reopened");
        }

        TaskAction::Rm { id } => {
            owned_task(ctx, &id).await?;
            store.delete_task(&id).await?;
            println!("✓ Task deleted");
        }
    }

    Ok(())
}

async fn owned_task(ctx: &Context, id: &Uuid) -> Result<Task> {
    match ctx.store.fetch_task(id).await? {
        Some(task) if task.user_id == ctx.user => Ok(task),
        _ => Err(Error::NotFound {
            kind: "task",
            id: id.to_string(),
        }),
    }
}

fn display_task(task: &Task) {
    let mark = if task.is_completed { "x" } else { " " };
    if task.subject.is_empty() {
        println!("[{}] {}  {}", mark, task.id, task.title);
    } else {
        println!("[{}] {}  {} ({})", mark, task.id, task.title, task.subject);
    }
    if !task.description.is_empty() {
        println!("      {}", task.description);
    }
}

async fn cmd_focus(
    ctx: &Context,
    minutes: Option<u32>,
    task: Option<Uuid>,
    auto_complete: bool,
    tick_ms: Option<u64>,
) -> Result<()> {
    let minutes = ctx.config.session.resolve_minutes(minutes)?;
    let store = ctx.store.as_ref();

    store
        .ensure_profile(&ctx.user, &ctx.config.user.username)
        .await?;
    let session = begin_session(store, &ctx.user, minutes, task, Utc::now()).await?;

    println!("\n╭─────────────────────────────────────────╮");
    println!("│  FOCUS SESSION: {} min", minutes);
    println!("╰─────────────────────────────────────────╯");

    let countdown = run_countdown(minutes, auto_complete, tick_ms).await;
    let finished = abandon_on_error(store, &session.id, countdown).await?;

    if !finished {
        cancel_session(store, &session.id).await?;
        println!("\nSession abandoned.");
        return Ok(());
    }

    let summary = complete_session(
        store,
        &ctx.user,
        &session,
        CalendarDate::today(),
        Utc::now(),
    )
    .await?;
    display_summary(&summary);
    Ok(())
}

/// Run the timer to completion or abandonment, then stop its driver
async fn run_countdown(minutes: u32, auto_complete: bool, tick_ms: Option<u64>) -> Result<bool> {
    let period = tick_ms
        .map(|ms| Duration::from_millis(ms.max(1)))
        .unwrap_or(TICK_PERIOD);
    let mut handle = spawn_timer(CountdownTimer::from_minutes(minutes), period);
    handle.start();

    let finished = if auto_complete {
        handle.wait_until_completed().await?;
        true
    } else {
        println!("Press Enter to pause/resume, 'q' + Enter to abandon");
        run_interactive(&mut handle).await?
    };
    handle.shutdown().await?;
    Ok(finished)
}

/// Drive the countdown display from stdin until it completes or is abandoned
async fn run_interactive(handle: &mut TimerHandle) -> Result<bool> {
    let mut snapshots = handle.subscribe();
    let mut lines = spawn_stdin_reader();
    let mut stdin_open = true;
    let mut stdout = io::stdout();

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    return Ok(false);
                }
                let snapshot = *snapshots.borrow_and_update();
                let paused = if snapshot.state == TimerState::Idle { "  (paused)" } else { "          " };
                print!("\r  {}{}", snapshot.formatted(), paused);
                stdout.flush()?;
                if snapshot.is_completed() {
                    println!();
                    return Ok(true);
                }
            }

            line = lines.recv(), if stdin_open => {
                match line {
                    Some(line) if line.trim().eq_ignore_ascii_case("q") => return Ok(false),
                    Some(_) => handle.toggle(),
                    None => stdin_open = false,
                }
            }
        }
    }
}

// Blocking stdin reads live on their own thread so an unfinished read never
// holds up runtime shutdown.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn display_summary(summary: &SessionSummary) {
    println!("\n✓ Session complete!");
    println!("  Duration: {}", format_minutes(u64::from(summary.duration_minutes)));
    if let Some(ref title) = summary.task_title {
        println!("  Task: {}", title);
    }
    match (summary.streak, summary.current_streak, summary.longest_streak) {
        (Some(outcome), Some(current), Some(longest)) => {
            if outcome.was_reset {
                println!("  Streak restarted: 1 day");
            } else {
                println!("  Streak: {} {}", current, days(current));
            }
            println!("  Longest: {} {}", longest, days(longest));
        }
        _ => println!("  Streak could not be updated this time."),
    }
}

fn days(n: u32) -> &'static str {
    if n == 1 {
        "day"
    } else {
        "days"
    }
}

async fn cmd_streak(ctx: &Context) -> Result<()> {
    let profile = ctx
        .store
        .ensure_profile(&ctx.user, &ctx.config.user.username)
        .await?;

    println!(
        "Current streak: {} {}",
        profile.current_streak,
        days(profile.current_streak)
    );
    println!(
        "Longest streak: {} {}",
        profile.longest_streak,
        days(profile.longest_streak)
    );
    if let Some(last) = profile.last_study_date {
        println!("Last studied:   {}", last);
    }
    println!("{}", streak_message(profile.current_streak));
    Ok(())
}

async fn cmd_stats(ctx: &Context) -> Result<()> {
    let sessions = ctx.store.list_sessions(&ctx.user, true).await?;
    let tasks = ctx.store.list_tasks(&ctx.user).await?;
    let stats = StudyAnalytics::compute(&sessions, &tasks, Utc::now());

    println!("Total sessions:      {}", stats.total_sessions);
    println!("Total study time:    {}", format_minutes(stats.total_minutes));
    println!("Completed tasks:     {}", stats.completed_tasks);
    println!("Average session:     {} min", stats.average_session_minutes);
    println!("This week:           {} sessions, {}", stats.week_sessions, format_minutes(stats.week_minutes));
    println!("Daily average:       {}", format_minutes(stats.daily_average_minutes));
    Ok(())
}

async fn cmd_ask(ctx: &Context, question: &str) -> Result<()> {
    let client = ChatCompletionClient::from_config(&ctx.config.assistant)?;
    let mut conversation = Conversation::new();

    match conversation.submit(&client, question).await {
        Some(answer) => println!("{}", answer.content),
        None => println!("Nothing to ask."),
    }
    Ok(())
}

async fn cmd_export(ctx: &Context, out: &Path, all: bool) -> Result<()> {
    let sessions = ctx.store.list_sessions(&ctx.user, !all).await?;
    let tasks = ctx.store.list_tasks(&ctx.user).await?;
    let count = export_sessions(&sessions, &tasks, out)?;

    println!("✓ Exported {} sessions", count);
    println!("  CSV: {}", out.display());
    Ok(())
}

fn cmd_config(action: &ConfigAction, config: &Config, config_path: &Path) -> Result<()> {
    match action {
        ConfigAction::Show => {
            println!("# {}", config_path.display());
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Init { force } => {
            if config_path.exists() && !force {
                return Err(Error::Config(format!(
                    "{} already exists (use --force to overwrite)",
                    config_path.display()
                )));
            }
            Config::default().save_to(config_path)?;
            println!("✓ Wrote {}", config_path.display());
        }
    }
    Ok(())
}
