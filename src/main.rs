use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use colored::{ColoredString, Colorize};
use eyre::{Context, Result, eyre};
use std::fs;
use std::path::PathBuf;
use todolist::{Config, DueStatus, Filter, NewTask, Priority, SortKey, Storage, Task, TaskPatch, TaskStore};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "todolist")]
#[command(about = "Personal task tracker - add, complete, filter and search your tasks")]
#[command(version = env!("GIT_DESCRIBE"))]
struct Cli {
    /// Path to the config file (default: platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a new task
    Add {
        title: String,
        #[command(flatten)]
        fields: TaskFields,
    },

    /// List tasks
    List {
        /// all, active, completed, overdue or due_soon
        #[arg(short, long, default_value = "all")]
        filter: Filter,

        /// created, priority, due or title
        #[arg(short, long, default_value = "created")]
        sort: SortKey,

        /// Case-insensitive text to look for
        #[arg(short = 'q', long, default_value = "")]
        search: String,
    },

    /// Show one task in full
    Show { id: String },

    /// Change fields of a task
    Edit {
        id: String,

        #[arg(long)]
        title: Option<String>,

        /// Remove the due date
        #[arg(long, conflicts_with = "due")]
        no_due: bool,

        #[command(flatten)]
        fields: TaskFields,
    },

    /// Mark a task done, or not done again
    Toggle { id: String },

    /// Delete a task
    Delete { id: String },

    /// Delete every completed task
    ClearCompleted,

    /// Summary counts
    Stats,

    /// Write a JSON backup
    Export {
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Add tasks from a JSON backup or array
    Import { path: PathBuf },

    /// Re-read storage and report what is there
    Load,
}

#[derive(Args)]
struct TaskFields {
    #[arg(short, long)]
    description: Option<String>,

    #[arg(short = 'S', long)]
    subject: Option<String>,

    /// Due date as YYYY-MM-DD
    #[arg(long)]
    due: Option<NaiveDate>,

    /// easy, normal or hard
    #[arg(short, long)]
    priority: Option<Priority>,

    /// Hex color (default: random from the palette)
    #[arg(long)]
    color: Option<String>,
}

type Store = TaskStore<Box<dyn Storage>>;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    // Setup tracing; RUST_LOG wins over config and flags
    let level = match cli.verbose {
        0 => config.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let storage = config.open_storage()?;
    let mut store: Store = TaskStore::with_key(storage, todolist::SystemClock, config.storage_key.clone());

    run(&mut store, cli.command)?;

    // A save that failed silently during the command gets one more try here,
    // and this time the error is reported
    if store.is_dirty() {
        store.flush().context("Changes were kept in memory but could not be saved")?;
    }

    Ok(())
}

fn run(store: &mut Store, command: Commands) -> Result<()> {
    match command {
        Commands::Add { title, fields } => {
            let mut new = NewTask::new(title);
            new.description = fields.description;
            new.subject = fields.subject;
            new.due = fields.due;
            new.priority = fields.priority;
            new.color = fields.color;

            let task = store.add(new)?;
            println!("{} {}", "Added".green(), task.id);
        }
        Commands::List { filter, sort, search } => {
            let tasks = store.query(filter, sort, &search);
            if tasks.is_empty() {
                println!("{}", "No tasks".dimmed());
            }
            for task in &tasks {
                print_row(task, store.due_status(task));
            }
        }
        Commands::Show { id } => {
            let id = resolve_id(store, &id)?;
            let task = store.get(&id).ok_or_else(|| eyre!("No task with id {}", id))?;
            print_detail(&task, store.due_status(&task));
        }
        Commands::Edit {
            id,
            title,
            no_due,
            fields,
        } => {
            let id = resolve_id(store, &id)?;
            let due = match (no_due, fields.due) {
                (true, _) => Some(None),
                (false, Some(date)) => Some(Some(date)),
                (false, None) => None,
            };
            let patch = TaskPatch {
                title,
                description: fields.description,
                subject: fields.subject,
                due,
                priority: fields.priority,
                color: fields.color,
                completed: None,
            };
            if patch.is_empty() {
                return Err(eyre!("Nothing to change; pass at least one field"));
            }

            let task = store
                .update(&id, patch)?
                .ok_or_else(|| eyre!("No task with id {}", id))?;
            println!("{} {}", "Updated".green(), task.id);
        }
        Commands::Toggle { id } => {
            let id = resolve_id(store, &id)?;
            let task = store.toggle(&id).ok_or_else(|| eyre!("No task with id {}", id))?;
            if task.completed {
                println!("{} {}", "Done".green().bold(), task.title);
            } else {
                println!("{} {}", "Reopened".yellow(), task.title);
            }
        }
        Commands::Delete { id } => {
            let id = resolve_id(store, &id)?;
            if !store.delete(&id) {
                return Err(eyre!("No task with id {}", id));
            }
            println!("{} {}", "Deleted".red(), id);
        }
        Commands::ClearCompleted => {
            let count = store.clear_completed();
            println!("Cleared {} completed task(s)", count);
        }
        Commands::Stats => {
            let stats = store.statistics();
            println!("Total:     {}", stats.total);
            println!("Active:    {}", stats.active);
            println!("Completed: {}", stats.completed.to_string().green());
            println!("Due soon:  {}", stats.due_soon.to_string().yellow());
            println!("Overdue:   {}", stats.overdue.to_string().red());
        }
        Commands::Export { output } => {
            let json = serde_json::to_string_pretty(&store.export()).context("Failed to serialize export")?;
            match output {
                Some(path) => {
                    fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Exported {} task(s) to {}", store.len(), path.display());
                }
                None => println!("{}", json),
            }
        }
        Commands::Import { path } => {
            let payload = fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
            let count = store.import_json(&payload);
            println!("Imported {} task(s)", count);
        }
        Commands::Load => {
            let tasks = store.load();
            println!("Loaded {} task(s) from storage key {}", tasks.len(), store.key());
        }
    }

    Ok(())
}

/// Accept a full id or an unambiguous prefix of one
fn resolve_id(store: &Store, given: &str) -> Result<String> {
    if store.get(given).is_some() {
        return Ok(given.to_string());
    }

    let matches: Vec<String> = store
        .all()
        .into_iter()
        .filter(|t| t.id.starts_with(given))
        .map(|t| t.id)
        .collect();

    match matches.as_slice() {
        [only] => Ok(only.clone()),
        [] => Err(eyre!("No task with id {}", given)),
        _ => Err(eyre!("Id prefix {} matches {} tasks", given, matches.len())),
    }
}

fn due_label(task: &Task, status: DueStatus) -> ColoredString {
    match task.due {
        Some(due) => match status {
            DueStatus::Overdue => format!("{} overdue", due).red(),
            DueStatus::DueSoon => format!("{} soon", due).yellow(),
            DueStatus::None => due.to_string().normal(),
        },
        None => "no due date".dimmed(),
    }
}

fn priority_label(priority: Priority) -> ColoredString {
    match priority {
        Priority::Hard => "hard".red(),
        Priority::Normal => "normal".normal(),
        Priority::Easy => "easy".green(),
    }
}

fn print_row(task: &Task, status: DueStatus) {
    let check = if task.completed { "[x]".green() } else { "[ ]".normal() };
    let title = if task.completed {
        task.title.dimmed()
    } else {
        task.title.bold()
    };
    let subject = if task.subject.is_empty() {
        String::new()
    } else {
        format!(" ({})", task.subject)
    };

    println!(
        "{} {} {}{}  {}  {}",
        check,
        task.id.dimmed(),
        title,
        subject,
        priority_label(task.priority),
        due_label(task, status)
    );
}

fn print_detail(task: &Task, status: DueStatus) {
    println!("{}", task.title.bold());
    println!("  id:          {}", task.id);
    if !task.description.is_empty() {
        println!("  description: {}", task.description);
    }
    if !task.subject.is_empty() {
        println!("  subject:     {}", task.subject);
    }
    println!("  due:         {}", due_label(task, status));
    println!("  priority:    {}", priority_label(task.priority));
    println!("  color:       {}", task.color);
    println!("  completed:   {}", if task.completed { "yes".green() } else { "no".normal() });
    println!("  created:     {}", task.created_at.to_rfc3339());
    println!("  updated:     {}", task.updated_at.to_rfc3339());
    if let Some(done) = task.completed_at {
        println!("  done at:     {}", done.to_rfc3339());
    }
}
