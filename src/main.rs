use std::{
    fs,
    io::{self, IsTerminal, Write},
    path::PathBuf,
};

use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use thiserror::Error;
use tracing::debug;

use taskdeck::{
    cli::{InitTracingError, ParseDateError, ResolveTaskError, init_tracing, parse_date, resolve_task},
    config::{Config, ConfigError, WeatherConfig},
    models::{
        query::{QuerySpec, QuickSort, SortDirection, SortKey, SortState, StatusFilter},
        task::{Priority, today},
    },
    query::stats,
    services::{
        tags::{RenameTagError, RenameTagParameters, rename_tag, tag_summary},
        tasks::{
            CreateTaskError, CreateTaskParameters, OpenStoreError, RemoveTaskError,
            ReorderTasksError, TaskPatch, TaskStore, UpdateTaskError,
        },
        transfer::{ExportTasksError, ImportTasksError, export_tasks, import_tasks, last_backup},
    },
    storage::{StorageError, json::JsonFileStorage},
    ui,
    weather::{OpenWeatherClient, WeatherError, WeatherLookup, WeatherQuery},
};

#[derive(Parser)]
#[command(
    name = "taskdeck",
    about = "A to-do list for your terminal, with a weather check on the side"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// More log output (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Less log output (-q, -qq)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    quiet: u8,

    /// Directory holding the task data
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Path to the config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Tasks(TaskCommands),

    /// Show the current weather for a city or coordinates
    Weather {
        #[arg(conflicts_with_all = ["lat", "lon"], required_unless_present = "lat")]
        city: Option<String>,

        #[arg(long, allow_hyphen_values = true, requires = "lon")]
        lat: Option<f64>,

        #[arg(long, allow_hyphen_values = true, requires = "lat")]
        lon: Option<f64>,
    },
}

/// Commands that work on the stored task list
#[derive(Subcommand)]
enum TaskCommands {
    /// Add a new task
    Add {
        /// Task title (at least 3 characters)
        text: String,

        /// Longer description
        #[arg(short, long)]
        description: Option<String>,

        /// Add tags (can be used multiple times)
        #[arg(short, long, action = clap::ArgAction::Append)]
        tag: Vec<String>,

        /// high, medium or low (or 1-3)
        #[arg(short, long, default_value = "medium")]
        priority: Priority,

        /// Due date (e.g., "tomorrow", "+3d", "2026-03-01")
        #[arg(long)]
        due: Option<String>,
    },

    /// List tasks, optionally filtered, searched and sorted
    List {
        #[arg(long, value_enum, default_value_t = StatusArg::All)]
        status: StatusArg,

        #[arg(short, long)]
        priority: Option<Priority>,

        /// Only tasks carrying this tag
        #[arg(short, long)]
        tag: Option<String>,

        /// Due on or after this date
        #[arg(long)]
        from: Option<String>,

        /// Due on or before this date
        #[arg(long)]
        to: Option<String>,

        /// Fuzzy search in titles, descriptions and tags
        #[arg(short, long)]
        search: Option<String>,

        /// Sort by a column; remembered for later listings
        #[arg(long, value_enum)]
        sort: Option<SortArg>,

        /// Sort descending
        #[arg(long, requires = "sort")]
        desc: bool,

        /// One-off preset sort, overrides the column sort
        #[arg(long, value_enum)]
        quick: Option<QuickArg>,
    },

    /// Toggle a task between active and completed
    Done { id: String },

    /// Edit a task
    Edit {
        id: String,

        #[arg(long)]
        text: Option<String>,

        #[arg(short, long, conflicts_with = "clear_description")]
        description: Option<String>,

        #[arg(long)]
        clear_description: bool,

        /// Replace the tags (can be used multiple times)
        #[arg(short, long, action = clap::ArgAction::Append, conflicts_with = "clear_tags")]
        tag: Vec<String>,

        #[arg(long)]
        clear_tags: bool,

        #[arg(short, long)]
        priority: Option<Priority>,

        #[arg(long, conflicts_with = "clear_due")]
        due: Option<String>,

        #[arg(long)]
        clear_due: bool,
    },

    /// Delete a task
    Delete { id: String },

    /// Delete every task
    Clear {
        /// Only delete completed tasks
        #[arg(long)]
        completed: bool,
    },

    /// Reorder tasks: the given ids take this order, everything else stays put
    Move {
        #[arg(required = true, num_args = 1..)]
        ids: Vec<String>,
    },

    /// Manage tags
    #[command(subcommand)]
    Tag(TagCommands),

    /// Show task counters
    Stats,

    /// Export all tasks as JSON
    Export {
        /// Output file, stdout when omitted
        path: Option<PathBuf>,
    },

    /// Replace all tasks with the ones in an exported JSON file
    Import { path: PathBuf },
}

#[derive(Debug, Subcommand)]
enum TagCommands {
    /// List tags, most used first
    List {
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Rename a tag on every task, merging into an existing tag
    Rename { old: String, new: String },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StatusArg {
    All,
    Active,
    Completed,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SortArg {
    None,
    Title,
    Date,
    Due,
    Priority,
    Status,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum QuickArg {
    Priority,
    Date,
    Title,
}

impl From<StatusArg> for StatusFilter {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::All => StatusFilter::All,
            StatusArg::Active => StatusFilter::Active,
            StatusArg::Completed => StatusFilter::Completed,
        }
    }
}

impl From<SortArg> for SortKey {
    fn from(value: SortArg) -> Self {
        match value {
            SortArg::None => SortKey::None,
            SortArg::Title => SortKey::Title,
            SortArg::Date => SortKey::Date,
            SortArg::Due => SortKey::DueDate,
            SortArg::Priority => SortKey::Priority,
            SortArg::Status => SortKey::Status,
        }
    }
}

impl From<QuickArg> for QuickSort {
    fn from(value: QuickArg) -> Self {
        match value {
            QuickArg::Priority => QuickSort::Priority,
            QuickArg::Date => QuickSort::Date,
            QuickArg::Title => QuickSort::Title,
        }
    }
}

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Tracing(#[from] InitTracingError),

    #[error("Failed to load tasks: {0}")]
    Open(#[from] OpenStoreError),

    #[error(transparent)]
    Create(#[from] CreateTaskError),

    #[error(transparent)]
    Update(#[from] UpdateTaskError),

    #[error(transparent)]
    Remove(#[from] RemoveTaskError),

    #[error(transparent)]
    Reorder(#[from] ReorderTasksError),

    #[error(transparent)]
    RenameTag(#[from] RenameTagError),

    #[error("Import failed: {0}")]
    Import(#[from] ImportTasksError),

    #[error("Export failed: {0}")]
    Export(#[from] ExportTasksError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Resolve(#[from] ResolveTaskError),

    #[error(transparent)]
    Date(#[from] ParseDateError),

    #[error(transparent)]
    Weather(#[from] WeatherError),

    #[error("Failed to access '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to start the async runtime: {0}")]
    Runtime(#[source] io::Error),
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), AppError> {
    init_tracing(cli.verbose, cli.quiet)?;

    let config = Config::load(cli.config.as_deref())?;
    let data_dir = config.resolve_data_dir(cli.data_dir.as_deref());
    debug!(data_dir = %data_dir.display(), "resolved data directory");

    let command = cli
        .command
        .unwrap_or(Commands::Tasks(TaskCommands::List {
            status: StatusArg::All,
            priority: None,
            tag: None,
            from: None,
            to: None,
            search: None,
            sort: None,
            desc: false,
            quick: None,
        }));

    match command {
        // Weather never touches the task data
        Commands::Weather { city, lat, lon } => {
            let query = match (city, lat, lon) {
                (Some(city), _, _) => WeatherQuery::City(city),
                (None, Some(lat), Some(lon)) => WeatherQuery::Coordinates { lat, lon },
                _ => WeatherQuery::City(String::new()),
            };
            show_weather(&config.weather, query)
        }
        Commands::Tasks(command) => {
            let store = TaskStore::open(JsonFileStorage::new(data_dir))?;
            run_task_command(command, store)
        }
    }
}

fn run_task_command(
    command: TaskCommands,
    mut store: TaskStore<JsonFileStorage>,
) -> Result<(), AppError> {
    let today = today();

    match command {
        TaskCommands::Add {
            text,
            description,
            tag,
            priority,
            due,
        } => {
            let due_date = due.map(|due| parse_date(&due, today)).transpose()?;
            let task = store.create(CreateTaskParameters {
                text,
                description,
                tags: tag,
                priority,
                due_date,
            })?;
            println!(
                "{} {} {}",
                "Added".green(),
                task.short_id().dimmed(),
                task.text.bold()
            );
        }
        TaskCommands::List {
            status,
            priority,
            tag,
            from,
            to,
            search,
            sort,
            desc,
            quick,
        } => {
            if let Some(key) = sort {
                let direction = if desc {
                    SortDirection::Desc
                } else {
                    SortDirection::Asc
                };
                let state = SortState {
                    key: key.into(),
                    direction,
                };
                if state != store.sort() {
                    store.set_sort(state)?;
                }
            }

            let spec = QuerySpec {
                status: status.into(),
                priority,
                tag,
                due_from: from.map(|d| parse_date(&d, today)).transpose()?,
                due_to: to.map(|d| parse_date(&d, today)).transpose()?,
                search_active: search.is_some(),
                search,
                quick_sort: quick.map(Into::into),
                sort: store.sort(),
            };

            let view = store.view(&spec);
            if view.is_empty() {
                println!("No tasks");
            } else {
                ui::render_view_header("Tasks", view.len());
                if let Some(query) = spec.active_search() {
                    ui::render_search_summary(view.search_matches, query);
                }
                for entry in &view.entries {
                    ui::render_task_line(entry, today);
                }
                println!();
            }
        }
        TaskCommands::Done { id } => {
            let id = resolve_task(&store, &id)?;
            let task = store.toggle(id)?;
            let label = if task.completed {
                "Completed".green()
            } else {
                "Reopened".yellow()
            };
            println!("{} {} {}", label, task.short_id().dimmed(), task.text);
        }
        TaskCommands::Edit {
            id,
            text,
            description,
            clear_description,
            tag,
            clear_tags,
            priority,
            due,
            clear_due,
        } => {
            let id = resolve_task(&store, &id)?;
            let due_date = if clear_due {
                Some(None)
            } else {
                due.map(|due| parse_date(&due, today).map(Some)).transpose()?
            };
            let tags = if clear_tags {
                Some(vec![])
            } else if tag.is_empty() {
                None
            } else {
                Some(tag)
            };
            let description = if clear_description {
                Some(None)
            } else {
                description.map(Some)
            };

            let task = store.update(
                id,
                TaskPatch {
                    text,
                    description,
                    tags,
                    completed: None,
                    priority,
                    due_date,
                },
            )?;
            println!("{} {} {}", "Updated".green(), task.short_id().dimmed(), task.text);
        }
        TaskCommands::Delete { id } => {
            let id = resolve_task(&store, &id)?;
            let task = store.remove(id)?;
            println!("{} {} {}", "Deleted".red(), task.short_id().dimmed(), task.text);
        }
        TaskCommands::Clear { completed } => {
            let cleared = if completed {
                store.clear_completed()?
            } else {
                store.clear()?
            };
            let task_word = if cleared == 1 { "task" } else { "tasks" };
            println!("Cleared {} {}", cleared, task_word);
        }
        TaskCommands::Move { ids } => {
            let ids = ids
                .iter()
                .map(|id| resolve_task(&store, id))
                .collect::<Result<Vec<_>, _>>()?;
            store.reorder(&ids)?;
            println!("Moved {} tasks", ids.len());
        }
        TaskCommands::Tag(TagCommands::List { limit }) => {
            ui::render_tags(&tag_summary(&store, limit));
        }
        TaskCommands::Tag(TagCommands::Rename { old, new }) => {
            let retagged = rename_tag(&mut store, RenameTagParameters { old, new })?;
            if retagged == 0 {
                println!("Nothing to rename");
            } else {
                let task_word = if retagged == 1 { "task" } else { "tasks" };
                println!("Retagged {} {}", retagged, task_word);
            }
        }
        TaskCommands::Stats => {
            println!();
            ui::render_stats(stats(store.tasks()));
            match last_backup(store.storage())? {
                Some(at) => println!("  {} {}\n", "Last export:".dimmed(), at),
                None => println!("  {}\n", "Never exported".dimmed()),
            }
        }
        TaskCommands::Export { path } => {
            let json = export_tasks(&store)?;
            match path {
                Some(path) => {
                    fs::write(&path, json).map_err(|source| AppError::Io {
                        path: path.clone(),
                        source,
                    })?;
                    println!("Exported {} tasks to {}", store.tasks().len(), path.display());
                }
                None => println!("{}", json),
            }
        }
        TaskCommands::Import { path } => {
            let content = fs::read_to_string(&path).map_err(|source| AppError::Io {
                path: path.clone(),
                source,
            })?;
            let imported = import_tasks(&mut store, &content)?;
            println!("Imported {} tasks", imported);
        }
    }

    Ok(())
}

fn show_weather(config: &WeatherConfig, query: WeatherQuery) -> Result<(), AppError> {
    let client = OpenWeatherClient::new(config)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(AppError::Runtime)?;

    runtime.block_on(async {
        let mut lookup = WeatherLookup::new(client, config.timeout(), config.max_retries);
        let mut outcome = lookup.lookup(query).outcome().await;
        loop {
            match outcome {
                Ok(report) => {
                    ui::render_weather(&report, &config.units);
                    return Ok::<(), AppError>(());
                }
                Err(e) if e.is_retryable() && confirm_retry(&e, lookup.retries_left()) => {
                    outcome = lookup.retry()?.outcome().await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    })
}

/// Asks before re-issuing a failed lookup; never retries without a terminal
fn confirm_retry(error: &WeatherError, retries_left: u32) -> bool {
    if retries_left == 0 || !io::stdin().is_terminal() {
        return false;
    }

    eprint!("{} Retry? ({} left) [y/N] ", error, retries_left);
    if io::stderr().flush().is_err() {
        return false;
    }

    let mut answer = String::new();
    if io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
