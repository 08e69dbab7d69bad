//! `agentmesh` — command-line front end for the runtime, generalized
//! from the teacher's `mofa-cli::main` (parse, init logging, spin up a
//! tokio runtime, dispatch over `Commands`) down to the subset of
//! commands this crate's `Cli` declares: boot the scheduler loop, manage
//! roles/agents, send messages, and inspect the tool catalog.

mod artifacts;
mod cli;
mod config;
mod error;
mod llm;

use artifacts::FileArtifactStore;
use clap::Parser;
use cli::{AgentCommands, Cli, Commands, RoleCommands, ToolCommands};
use comfy_table::{ContentArrangement, Table};
use error::{CliError, CliResult};
use llm::EchoLlmClient;
use orgkernel::{Collaborator, Role, ShutdownMode, TaskBrief};
use orgruntime::bus::SendRequest;
use orgruntime::{Runtime, RuntimeBuilder};
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = config::load(cli.config.as_deref())?;
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_command(cli, config))?;
    Ok(())
}

async fn run_command(cli: Cli, config: orgkernel::RuntimeConfig) -> CliResult<()> {
    let artifacts_dir = config.artifacts_dir.clone();
    let max_concurrent = config.max_concurrent;
    let runtime = RuntimeBuilder::new(config, Arc::new(EchoLlmClient), Arc::new(FileArtifactStore::new(artifacts_dir))).build();

    match cli.command {
        Commands::Run { root_role, root_prompt } => run_scheduler(&runtime, &root_role, &root_prompt, max_concurrent).await,
        Commands::Role(cmd) => role_command(&runtime, cmd),
        Commands::Agent(cmd) => agent_command(&runtime, cmd).await,
        Commands::Send { to, text, from, delay_ms } => send_command(&runtime, &to, &text, &from, delay_ms).await,
        Commands::Tool(cmd) => tool_command(&runtime, cmd),
    }
}

/// Bootstrap distinguished agents and run the scheduler until Ctrl-C,
/// matching `Runtime::bootstrap`/`Runtime::run` (spec.md §4.2, §4.7).
async fn run_scheduler(runtime: &Runtime, root_role: &str, root_prompt: &str, max_concurrent: usize) -> CliResult<()> {
    let role = runtime.org.find_role_by_name(root_role).unwrap_or_else(|| Role::new(root_role, root_prompt));
    runtime.bootstrap(role)?;

    let scheduler = runtime.scheduler.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("ctrl-c received, requesting graceful shutdown");
            scheduler.request_shutdown(ShutdownMode::Graceful);
        }
    });

    println!("agentmesh running (max_concurrent={max_concurrent}); press Ctrl-C to stop");
    runtime.run().await;
    runtime.org.persist_now()?;
    for (agent_id, err) in runtime.conversations.flush_all() {
        tracing::warn!(%agent_id, %err, "final flush failed for agent");
    }
    println!("shut down cleanly");
    Ok(())
}

fn role_command(runtime: &Runtime, cmd: RoleCommands) -> CliResult<()> {
    match cmd {
        RoleCommands::Create { name, prompt, llm_service_id, tool_groups } => {
            let groups = tool_groups.map(|g| g.into_iter().collect());
            let role = runtime.org.create_role(&name, &prompt, llm_service_id, groups, None);
            runtime.org.persist_now()?;
            println!("role '{}' ({})", role.name, role.id);
        }
        RoleCommands::List => {
            let mut table = Table::new();
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["id", "name", "llm_service_id", "tool_groups"]);
            for role in runtime.org.list_roles() {
                table.add_row(vec![
                    role.id.to_string(),
                    role.name,
                    role.llm_service_id.unwrap_or_else(|| "-".into()),
                    role.tool_groups
                        .map(|g| {
                            let mut v: Vec<String> = g.into_iter().collect();
                            v.sort();
                            v.join(",")
                        })
                        .unwrap_or_else(|| "*".into()),
                ]);
            }
            println!("{table}");
        }
    }
    Ok(())
}

async fn agent_command(runtime: &Runtime, cmd: AgentCommands) -> CliResult<()> {
    match cmd {
        AgentCommands::Spawn { role, parent, objective, completion_criteria, constraints, inputs, outputs } => {
            let role = runtime.org.find_role_by_name(&role).ok_or_else(|| CliError::RoleNotFound(role.clone()))?;
            let brief = TaskBrief {
                objective,
                constraints,
                inputs: serde_json::from_str(&inputs).map_err(|e| CliError::Config(format!("--inputs: {e}")))?,
                outputs: serde_json::from_str(&outputs).map_err(|e| CliError::Config(format!("--outputs: {e}")))?,
                completion_criteria,
                collaborators: Vec::<Collaborator>::new(),
                references: Vec::new(),
                priority: None,
            };
            brief.validate()?;
            let agent = runtime.org.spawn_agent(role.id, &parent)?;
            let parent_role_name = runtime.org.role_name_of(&parent);
            runtime.org.seed_contacts(&agent.id, &parent, &parent_role_name, &brief.collaborators);
            runtime.org.set_task_brief(&agent.id, brief);
            runtime.org.persist_now()?;
            println!("spawned agent {} (role '{}')", agent.id, role.name);
        }
        AgentCommands::List => {
            let mut table = Table::new();
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["id", "role", "parent", "status", "compute_status"]);
            for agent in runtime.org.list_agents() {
                table.add_row(vec![
                    agent.id.clone(),
                    runtime.org.role_name_of(&agent.id),
                    agent.parent_agent_id.clone().unwrap_or_else(|| "-".into()),
                    format!("{:?}", agent.status),
                    format!("{:?}", runtime.org.status_of_agent(&agent.id)),
                ]);
            }
            println!("{table}");
        }
        AgentCommands::Status { agent_id } => {
            let agent = runtime.org.get_agent(&agent_id).ok_or_else(|| CliError::Core(orgkernel::CoreError::AgentNotFound(agent_id.clone())))?;
            println!("id: {}", agent.id);
            println!("role: {}", runtime.org.role_name_of(&agent.id));
            println!("parent: {}", agent.parent_agent_id.as_deref().unwrap_or("-"));
            println!("status: {:?}", agent.status);
            println!("compute_status: {:?}", runtime.org.status_of_agent(&agent.id));
            println!("queue_depth: {}", runtime.bus.get_queue_depth(&agent.id));
        }
        AgentCommands::Terminate { agent_id, by, reason } => {
            runtime.org.begin_termination(&by, &agent_id)?;
            runtime.bus.drop_recipient(&agent_id);
            runtime.conversations.drop_agent(&agent_id)?;
            runtime.org.finish_termination(&agent_id, reason);
            runtime.org.persist_now()?;
            println!("terminated {agent_id}");
        }
    }
    Ok(())
}

async fn send_command(runtime: &Runtime, to: &str, text: &str, from: &str, delay_ms: Option<i64>) -> CliResult<()> {
    let mut req = SendRequest::new(to, from, serde_json::json!({"text": text}));
    if let Some(delay_ms) = delay_ms {
        req = req.with_delay_ms(delay_ms);
    }
    let outcome = runtime.bus.send(req).await?;
    match outcome.scheduled_delivery_time {
        Some(at) => println!("queued {} (delivers at {at})", outcome.message_id),
        None => println!("delivered {}", outcome.message_id),
    }
    Ok(())
}

fn tool_command(runtime: &Runtime, cmd: ToolCommands) -> CliResult<()> {
    match cmd {
        ToolCommands::List { role } => {
            let role = match role {
                Some(name) => runtime.org.find_role_by_name(&name).ok_or(CliError::RoleNotFound(name))?,
                None => Role::new("*", ""),
            };
            let mut table = Table::new();
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["name", "group", "description"]);
            let mut catalog = runtime.tool_dispatcher.catalog_for(&role);
            catalog.sort_by(|a, b| a.name.cmp(&b.name));
            for tool in catalog {
                table.add_row(vec![tool.name, tool.group, tool.description]);
            }
            println!("{table}");
        }
    }
    Ok(())
}
