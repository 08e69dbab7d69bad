//! Command-line surface, generalized from the teacher's `mofa-cli::cli::Cli`
//! (global flags + a `Commands` enum with nested per-resource subcommand
//! enums) down to the `agentmesh` domain: run the runtime, manage roles
//! and agents, send messages, and inspect the tool catalog.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "agentmesh", version, about = "Multi-agent LLM orchestration runtime")]
pub struct Cli {
    /// Enable debug-level logging.
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Path to a TOML config file (defaults to ./agentmesh.toml if present).
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Bootstrap (if needed) and run the scheduler loop until Ctrl-C.
    Run {
        /// Role name for the root agent, created on first run.
        #[arg(long, default_value = "root")]
        root_role: String,
        /// System prompt for the root role, only used on first bootstrap.
        #[arg(long, default_value = "You are the root agent of this organization.")]
        root_prompt: String,
    },

    /// Manage roles.
    #[command(subcommand)]
    Role(RoleCommands),

    /// Manage agents.
    #[command(subcommand)]
    Agent(AgentCommands),

    /// Send a message to an agent.
    Send {
        /// Recipient agent ID.
        to: String,
        /// Message text.
        text: String,
        /// Sender agent ID (defaults to the distinguished `user` agent).
        #[arg(long, default_value = "user")]
        from: String,
        /// Delay, in milliseconds, before the message is delivered.
        #[arg(long)]
        delay_ms: Option<i64>,
    },

    /// Inspect the tool catalog.
    #[command(subcommand)]
    Tool(ToolCommands),
}

#[derive(Subcommand, Debug)]
pub enum RoleCommands {
    /// Create a role (idempotent on name).
    Create {
        name: String,
        /// System prompt for agents spawned with this role.
        prompt: String,
        #[arg(long)]
        llm_service_id: Option<String>,
        /// Comma-separated tool groups this role is restricted to
        /// (omit to allow every tool group).
        #[arg(long, value_delimiter = ',')]
        tool_groups: Option<Vec<String>>,
    },
    /// List every known role.
    List,
}

#[derive(Subcommand, Debug)]
pub enum AgentCommands {
    /// Spawn an agent under an existing parent.
    Spawn {
        /// Name of an existing role.
        role: String,
        /// Parent agent ID.
        #[arg(long, default_value = "root")]
        parent: String,
        #[arg(long)]
        objective: String,
        #[arg(long)]
        completion_criteria: String,
        /// Repeatable; one constraint per flag.
        #[arg(long = "constraint")]
        constraints: Vec<String>,
        /// JSON value for the task brief's `inputs` field.
        #[arg(long, default_value = "{}")]
        inputs: String,
        /// JSON value for the task brief's `outputs` field.
        #[arg(long, default_value = "{}")]
        outputs: String,
    },
    /// List every known agent.
    List,
    /// Show one agent's status and role.
    Status { agent_id: String },
    /// Terminate a child agent (only its parent may do this).
    Terminate {
        agent_id: String,
        #[arg(long, default_value = "root")]
        by: String,
        #[arg(long)]
        reason: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ToolCommands {
    /// List tools available to a role (all tools if no role given).
    List {
        #[arg(long)]
        role: Option<String>,
    },
}
