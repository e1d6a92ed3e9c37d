// ABOUTME: Command-line interface definition for the conductor binary.
// ABOUTME: Subcommands create and list conversations, run prompts, and inspect tool resolution.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "conductor")]
#[command(version, about = "Run coding-agent sessions per conversation")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Store a new conversation
    Create {
        /// Backend type: acp, codex, or mock
        #[arg(long = "type", short = 't')]
        conversation_type: String,
        #[arg(long)]
        name: Option<String>,
        /// Backend config as a JSON object
        #[arg(long)]
        extra: Option<String>,
        /// Conversation id (random by default)
        #[arg(long)]
        id: Option<String>,
    },

    /// List stored conversations
    List,

    /// Recover a conversation's worker and send it prompts
    Run {
        id: String,
        /// Prompt to send; repeat for several turns
        #[arg(long = "prompt", short = 'p', required = true)]
        prompts: Vec<String>,
    },

    /// Show the tool descriptor table
    Tools {
        /// Only tools in this category (execution, file_ops, search, ...)
        #[arg(long)]
        category: Option<String>,
    },

    /// Resolve an event type to its tool descriptor
    Resolve {
        event_type: String,
        /// Event payload as JSON
        #[arg(long)]
        data: Option<String>,
    },
}
