use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use snipvault_core::models::EntityKind;

#[derive(Parser)]
#[command(name = "snipvault")]
#[command(about = "Save code and answers from AI chats, recall them while you code")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage projects
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },
    /// Save a snippet or a knowledge item
    #[command(alias = "save")]
    Add {
        #[command(subcommand)]
        command: AddCommands,
    },
    /// List saved items, most recently updated first
    List {
        #[command(flatten)]
        filter: ItemFilter,
        /// Number of items to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search saved items
    Search {
        /// Search query
        query: String,
        #[command(flatten)]
        filter: ItemFilter,
        /// Number of results to show
        #[arg(short, long)]
        limit: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit a saved item
    Edit {
        #[command(subcommand)]
        command: EditCommands,
    },
    /// Delete a saved item (projects take their items with them)
    Delete {
        /// Kind of item to delete
        #[arg(value_enum)]
        kind: ItemKind,
        /// Item ID or unique ID prefix
        id: String,
    },
    /// Rank saved items against an editor context (JSON)
    Context {
        /// Read the context from a file instead of stdin
        #[arg(short, long, value_name = "PATH")]
        file: Option<PathBuf>,
        /// Minimum relevance score
        #[arg(long)]
        min_score: Option<f64>,
        /// Number of matches to show
        #[arg(short, long)]
        limit: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Push local changes and pull remote ones
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
        /// Keep syncing on an interval until interrupted
        #[arg(long)]
        watch: bool,
        /// Override the auto-sync interval in seconds
        #[arg(long, value_name = "SECS", requires = "watch")]
        interval: Option<u64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show changes waiting to be pushed
    Queue {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the local activity log
    Activity {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export saved items
    Export {
        /// Export format
        #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Configure sync settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ProjectCommands {
    /// Create a project
    Add {
        /// Project name
        name: String,
        /// Optional description
        #[arg(long)]
        description: Option<String>,
    },
    /// List projects
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum AddCommands {
    /// Save a code snippet (reads stdin or opens $EDITOR when no code is given)
    Snippet {
        /// Snippet code
        code: Vec<String>,
        /// Language label
        #[arg(long)]
        language: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[command(flatten)]
        target: CaptureTarget,
    },
    /// Save a question and its answer
    Knowledge {
        #[arg(long)]
        question: String,
        /// Answer text (reads stdin or opens $EDITOR when omitted)
        #[arg(long)]
        answer: Option<String>,
        /// Tag, repeatable
        #[arg(long = "tag", value_name = "TAG")]
        tags: Vec<String>,
        #[command(flatten)]
        target: CaptureTarget,
    },
}

#[derive(Args)]
pub struct CaptureTarget {
    /// Project ID or unique prefix (default project when omitted)
    #[arg(long)]
    pub project: Option<String>,
    /// Page the item came from
    #[arg(long)]
    pub source: Option<String>,
    /// Save even when a duplicate exists
    #[arg(long)]
    pub force: bool,
    /// Output the capture result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Default)]
pub struct ItemFilter {
    /// Only one kind of item
    #[arg(long = "type", value_enum)]
    pub item_type: Option<ItemTypeFilter>,
    /// Project ID or unique prefix
    #[arg(long)]
    pub project: Option<String>,
}

#[derive(Subcommand)]
pub enum EditCommands {
    /// Edit a snippet (opens $EDITOR on the code when no field is given)
    Snippet {
        /// Snippet ID or unique ID prefix
        id: String,
        #[arg(long)]
        code: Option<String>,
        #[arg(long)]
        language: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Edit a knowledge item (opens $EDITOR on the answer when no field is given)
    Knowledge {
        /// Knowledge ID or unique ID prefix
        id: String,
        #[arg(long)]
        question: Option<String>,
        #[arg(long)]
        answer: Option<String>,
        /// Replacement tags, repeatable
        #[arg(long = "tag", value_name = "TAG")]
        tags: Option<Vec<String>>,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Show sync state and pending changes
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current sync settings
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set the sync server base URL
    SetApiUrl { url: String },
    /// Store the sync bearer token
    SetToken { token: String },
    /// Remove the stored sync token
    ClearToken,
    /// Set the auto-sync interval in seconds
    SetInterval { secs: u64 },
    /// Turn sync on
    Enable,
    /// Turn sync off
    Disable,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Markdown,
}

impl From<ExportFormat> for snipvault_core::export::ExportFormat {
    fn from(format: ExportFormat) -> Self {
        match format {
            ExportFormat::Json => Self::Json,
            ExportFormat::Markdown => Self::Markdown,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ItemKind {
    Project,
    Snippet,
    Knowledge,
}

impl From<ItemKind> for EntityKind {
    fn from(kind: ItemKind) -> Self {
        match kind {
            ItemKind::Project => Self::Project,
            ItemKind::Snippet => Self::Snippet,
            ItemKind::Knowledge => Self::Knowledge,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ItemTypeFilter {
    Snippet,
    Knowledge,
}

impl ItemTypeFilter {
    pub const fn includes_snippets(filter: Option<Self>) -> bool {
        !matches!(filter, Some(Self::Knowledge))
    }

    pub const fn includes_knowledge(filter: Option<Self>) -> bool {
        !matches!(filter, Some(Self::Snippet))
    }
}
