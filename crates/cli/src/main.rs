//! Parlance CLI
//!
//! Chat with the assistant, browse sessions and manage branches from the
//! terminal.

mod config;
mod logging;
mod paths;
mod render;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use console::style;
use parlance_client::{Runtime, StaticToken, StreamOptions};
use parlance_protocol::{
    ConversationType, ReactionKind, SearchMode, SessionQuery, SessionSort, SortOrder,
    StatusFilter,
};
use tracing::info;

use crate::config::Overrides;
use crate::paths::{DataDir, DATA_DIR_ENV};
use crate::render::LivePrinter;

#[derive(Parser)]
#[command(name = "parlance", version)]
#[command(about = "Parlance - chat with your assistant from the terminal", long_about = None)]
struct Cli {
    /// Data directory (config, token, logs)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Server base URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Bearer token
    #[arg(long, global = true)]
    token: Option<String>,

    /// Show routing, memory and usage notes
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a message and stream the reply
    Chat {
        /// Message text
        #[arg(required = true)]
        text: Vec<String>,
        /// Continue this session (default: start a new one)
        #[arg(long, short)]
        session: Option<String>,
        /// Ask for a specific model
        #[arg(long)]
        model: Option<String>,
        /// Conversation type used for routing
        #[arg(long = "type", value_enum)]
        conversation_type: Option<ConversationArg>,
    },
    /// Send a message and wait for the whole reply
    Send {
        #[arg(required = true)]
        text: Vec<String>,
        #[arg(long, short)]
        session: Option<String>,
    },
    /// Print a session's messages
    History { session: String },
    /// Manage sessions
    Sessions {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Manage conversation branches
    Branch {
        #[command(subcommand)]
        action: BranchAction,
    },
    /// React to a message (like, dislike, love, laugh, confused)
    React {
        message: String,
        reaction: ReactionKind,
    },
    /// Print shell completions
    Completions { shell: Shell },
}

#[derive(Subcommand)]
enum SessionAction {
    /// List sessions
    List {
        /// Search text
        #[arg(long, short)]
        query: Option<String>,
        #[arg(long, value_enum, default_value_t = SearchArg::All)]
        search_mode: SearchArg,
        #[arg(long, value_enum, default_value_t = StatusArg::Active)]
        status: StatusArg,
        #[arg(long, value_enum, default_value_t = SortArg::LastActivity)]
        sort: SortArg,
        #[arg(long, value_enum, default_value_t = OrderArg::Desc)]
        order: OrderArg,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    Delete { session: String },
    Rename { session: String, title: String },
    Favorite { session: String },
    Unfavorite { session: String },
    Pin { session: String },
    Unpin { session: String },
    Archive { session: String },
}

#[derive(Subcommand)]
enum BranchAction {
    /// Fork the conversation at a message with edited content
    Create {
        message: String,
        content: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// List a session's branches
    List { session: String },
    /// Switch a session to another branch
    Activate { session: String, branch: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum ConversationArg {
    General,
    Coding,
    Reasoning,
    Creative,
    Analysis,
}

impl From<ConversationArg> for ConversationType {
    fn from(arg: ConversationArg) -> Self {
        match arg {
            ConversationArg::General => ConversationType::General,
            ConversationArg::Coding => ConversationType::Coding,
            ConversationArg::Reasoning => ConversationType::Reasoning,
            ConversationArg::Creative => ConversationType::Creative,
            ConversationArg::Analysis => ConversationType::Analysis,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum SearchArg {
    Title,
    Content,
    All,
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    Active,
    Archived,
    All,
}

#[derive(Clone, Copy, ValueEnum)]
enum SortArg {
    LastActivity,
    Created,
    Title,
    MessageCount,
}

#[derive(Clone, Copy, ValueEnum)]
enum OrderArg {
    Asc,
    Desc,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "parlance", &mut io::stdout());
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref(), std::env::var(DATA_DIR_ENV).ok())?;
    data_dir
        .ensure_dirs()
        .with_context(|| format!("creating {}", data_dir.root().display()))?;
    let _logging = logging::init_logging(&data_dir.log_dir())?;

    let overrides = Overrides {
        api_url: cli.api_url.clone(),
        token: cli.token.clone(),
    };
    let config = config::load(&data_dir, |key| std::env::var(key).ok(), &overrides)?;
    info!(
        component = "cli",
        event = "cli.started",
        api_url = %config.api_url,
        authenticated = config.token.is_some(),
    );

    let tokens = Arc::new(StaticToken::new(config.token.clone()));
    let runtime = Runtime::new(config, tokens)?;

    run(&runtime, cli.command, cli.verbose).await
}

async fn run(runtime: &Runtime, command: Commands, verbose: bool) -> anyhow::Result<()> {
    match command {
        Commands::Chat {
            text,
            session,
            model,
            conversation_type,
        } => {
            if let Some(session) = &session {
                runtime.open_session(session).await?;
            }
            let options = StreamOptions {
                model,
                conversation_type: conversation_type.map(Into::into),
                ..Default::default()
            };
            let mut printer = LivePrinter::new(verbose);
            runtime
                .send(&text.join(" "), &mut printer, options)
                .await?;
        }

        Commands::Send { text, session } => {
            let mut printer = LivePrinter::new(verbose);
            runtime
                .controller()
                .send(
                    &text.join(" "),
                    session.as_deref(),
                    &mut printer,
                    StreamOptions::default(),
                )
                .await?;
        }

        Commands::History { session } => {
            runtime.open_session(&session).await?;
            let state = runtime.store().snapshot();
            if state.messages.is_empty() {
                println!("{}", style("No messages.").dim());
            } else {
                print!("{}", render::transcript(&state.messages));
            }
        }

        Commands::Sessions { action } => run_sessions(runtime, action).await?,
        Commands::Branch { action } => run_branch(runtime, action).await?,

        Commands::React { message, reaction } => {
            let update = runtime.sessions().react(&message, reaction).await?;
            let mut counts: Vec<_> = update.reactions.iter().collect();
            counts.sort();
            let summary: Vec<String> = counts.iter().map(|(k, v)| format!("{k} {v}")).collect();
            println!("{} {}", style("✓").green(), summary.join(", "));
        }

        Commands::Completions { .. } => {}
    }
    Ok(())
}

async fn run_sessions(runtime: &Runtime, action: SessionAction) -> anyhow::Result<()> {
    let sessions = runtime.sessions();
    match action {
        SessionAction::List {
            query,
            search_mode,
            status,
            sort,
            order,
            limit,
        } => {
            let query = SessionQuery {
                limit,
                query,
                search_mode: match search_mode {
                    SearchArg::Title => SearchMode::Title,
                    SearchArg::Content => SearchMode::Content,
                    SearchArg::All => SearchMode::All,
                },
                status: match status {
                    StatusArg::Active => StatusFilter::Active,
                    StatusArg::Archived => StatusFilter::Archived,
                    StatusArg::All => StatusFilter::All,
                },
                sort_by: match sort {
                    SortArg::LastActivity => SessionSort::LastActivity,
                    SortArg::Created => SessionSort::Created,
                    SortArg::Title => SessionSort::Title,
                    SortArg::MessageCount => SessionSort::MessageCount,
                },
                sort_order: match order {
                    OrderArg::Asc => SortOrder::Asc,
                    OrderArg::Desc => SortOrder::Desc,
                },
            };
            let list = sessions.list(&query).await?;
            if list.is_empty() {
                println!("{}", style("No sessions.").dim());
            } else {
                println!("{}", render::sessions_table(&list));
            }
        }
        SessionAction::Delete { session } => {
            sessions.delete(&session).await?;
            done(&format!("Deleted {session}"));
        }
        SessionAction::Rename { session, title } => {
            sessions.rename(&session, &title).await?;
            done(&format!("Renamed {session}"));
        }
        SessionAction::Favorite { session } => {
            sessions.set_favorite(&session, true).await?;
            done("Added to favorites");
        }
        SessionAction::Unfavorite { session } => {
            sessions.set_favorite(&session, false).await?;
            done("Removed from favorites");
        }
        SessionAction::Pin { session } => {
            sessions.set_pinned(&session, true).await?;
            done("Pinned");
        }
        SessionAction::Unpin { session } => {
            sessions.set_pinned(&session, false).await?;
            done("Unpinned");
        }
        SessionAction::Archive { session } => {
            sessions.archive(&session).await?;
            done("Archived");
        }
    }
    Ok(())
}

async fn run_branch(runtime: &Runtime, action: BranchAction) -> anyhow::Result<()> {
    let branches = runtime.branches();
    match action {
        BranchAction::Create {
            message,
            content,
            name,
        } => {
            let created = branches
                .create_branch(&message, &content, name.as_deref())
                .await?;
            done(&format!(
                "Created {} ({})",
                created.branch_name.as_deref().unwrap_or("branch"),
                created.branch_id
            ));
            if let Some(reply) = created.ai_response {
                println!("{reply}");
            }
        }
        BranchAction::List { session } => {
            let list = branches.list_branches(&session).await?;
            if list.is_empty() {
                println!("{}", style("No branches.").dim());
            } else {
                println!("{}", render::branches_table(&list));
            }
        }
        BranchAction::Activate { session, branch } => {
            let outcome = branches.activate_branch(&session, &branch).await?;
            if outcome.changed {
                done(&format!("Switched to {}", outcome.active_branch_id));
            } else {
                done(&format!("{} is already active", outcome.active_branch_id));
            }
        }
    }
    Ok(())
}

fn done(message: &str) {
    println!("{} {}", style("✓").green(), message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn chat_joins_words_and_parses_type() {
        let cli = Cli::try_parse_from([
            "parlance", "chat", "what", "is", "rust", "--type", "coding", "-s", "s1",
        ])
        .expect("parse");
        match cli.command {
            Commands::Chat {
                text,
                session,
                conversation_type,
                ..
            } => {
                assert_eq!(text.join(" "), "what is rust");
                assert_eq!(session.as_deref(), Some("s1"));
                assert!(matches!(conversation_type, Some(ConversationArg::Coding)));
            }
            _ => panic!("expected chat"),
        }
    }

    #[test]
    fn react_rejects_unknown_kinds() {
        assert!(Cli::try_parse_from(["parlance", "react", "m1", "love"]).is_ok());
        assert!(Cli::try_parse_from(["parlance", "react", "m1", "meh"]).is_err());
    }

    #[test]
    fn sessions_list_defaults() {
        let cli = Cli::try_parse_from(["parlance", "sessions", "list"]).expect("parse");
        match cli.command {
            Commands::Sessions {
                action: SessionAction::List { limit, status, .. },
            } => {
                assert_eq!(limit, 20);
                assert!(matches!(status, StatusArg::Active));
            }
            _ => panic!("expected sessions list"),
        }
    }
}
