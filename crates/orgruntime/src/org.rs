//! OrgPrimitives: role/agent/contact registries and their lifecycle,
//! spec.md §3.1–3.3, §4.7, §9 "Cyclic references".
//!
//! Generalized from the teacher's `mofa-runtime::agent::registry::AgentRegistry`
//! (a concurrent, `DashMap`-backed registry over live agent handles) narrowed
//! to the opaque-ID-plus-side-table model spec.md §9 prescribes: agents
//! reference each other only by ID, never by a strong back-reference, so
//! parent/child and contact relationships live in side tables owned here
//! rather than inside `Agent` itself.

use crate::bus::AgentStatusLookup;
use crate::persistence::{OrgDocument, PersistenceLayout, TerminationRecord};
use dashmap::DashMap;
use orgkernel::{
    Agent, AgentStatus, Collaborator, ComputeStatus, Contact, ContactRegistry, ContactSource,
    CoreError, CoreResult, Role, ROOT_AGENT_ID, USER_AGENT_ID,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Owns roles, agents, contacts and their on-disk snapshot (spec.md §3.8
/// "Ownership"). Referenced, not owned, by the Scheduler and LlmHandler.
pub struct OrgPrimitives {
    layout: PersistenceLayout,
    roles: DashMap<Uuid, Role>,
    role_names: DashMap<String, Uuid>,
    agents: DashMap<String, Agent>,
    statuses: DashMap<String, ComputeStatus>,
    contacts: Mutex<HashMap<String, ContactRegistry>>,
    terminations: Mutex<Vec<TerminationRecord>>,
    /// Task briefs (spec.md §3.7) are deliberately kept in memory only:
    /// spec.md §6 "Persisted state layout" fixes exactly three on-disk
    /// paths (org, conversations, contacts) and none of them carries the
    /// brief, so a restarted runtime starts spawned agents with no brief
    /// until their parent re-sends one (recorded in DESIGN.md).
    task_briefs: DashMap<String, orgkernel::TaskBrief>,
}

impl OrgPrimitives {
    pub fn new(layout: PersistenceLayout) -> Self {
        Self {
            layout,
            roles: DashMap::new(),
            role_names: DashMap::new(),
            agents: DashMap::new(),
            statuses: DashMap::new(),
            contacts: Mutex::new(HashMap::new()),
            terminations: Mutex::new(Vec::new()),
            task_briefs: DashMap::new(),
        }
    }

    pub fn set_task_brief(&self, agent_id: &str, brief: orgkernel::TaskBrief) {
        self.task_briefs.insert(agent_id.to_string(), brief);
    }

    pub fn get_task_brief(&self, agent_id: &str) -> Option<orgkernel::TaskBrief> {
        self.task_briefs.get(agent_id).map(|b| b.clone())
    }

    pub fn clear_task_brief(&self, agent_id: &str) {
        self.task_briefs.remove(agent_id);
    }

    /// Load `org.json` and every agent's contact file (spec.md §4.7 "Load
    /// semantics"). Agents whose `roleId` no longer resolves are marked
    /// `terminated`; malformed entries are simply absent from the
    /// deserialized document (serde already skipped them upstream) and a
    /// warning is logged here for the ones we can still identify.
    pub fn load(&self) -> CoreResult<()> {
        let doc = self.layout.load_org()?;
        for role in doc.roles {
            self.role_names.insert(role.name.clone(), role.id);
            self.roles.insert(role.id, role);
        }
        for mut agent in doc.agents {
            if !self.roles.contains_key(&agent.role_id) && agent.status == AgentStatus::Active {
                tracing::warn!(
                    agent_id = %agent.id,
                    role_id = %agent.role_id,
                    "agent's role no longer resolves on load; marking terminated"
                );
                agent.status = AgentStatus::Terminated;
            }
            let status =
                if agent.status == AgentStatus::Terminated { ComputeStatus::Terminated } else { ComputeStatus::Idle };
            self.statuses.insert(agent.id.clone(), status);
            let contacts = self.layout.load_contacts(&agent.id)?;
            let mut registry = ContactRegistry::new();
            for c in contacts {
                registry.add(c);
            }
            self.contacts.lock().insert(agent.id.clone(), registry);
            self.agents.insert(agent.id.clone(), agent);
        }
        *self.terminations.lock() = doc.terminations;
        Ok(())
    }

    /// Create the two distinguished agents (spec.md §3.2) if they are not
    /// already present from a prior load: `user` (external endpoint, no
    /// role of its own) and `root` (system-created, `parentAgentId=null`).
    pub fn bootstrap(&self, root_role: Role) -> CoreResult<()> {
        if !self.roles.contains_key(&root_role.id) {
            self.role_names.insert(root_role.name.clone(), root_role.id);
            self.roles.insert(root_role.id, root_role.clone());
        }
        self.agents.entry(USER_AGENT_ID.to_string()).or_insert_with(|| {
            self.statuses.insert(USER_AGENT_ID.to_string(), ComputeStatus::Idle);
            Agent::new(USER_AGENT_ID, root_role.id, None)
        });
        self.agents.entry(ROOT_AGENT_ID.to_string()).or_insert_with(|| {
            self.statuses.insert(ROOT_AGENT_ID.to_string(), ComputeStatus::Idle);
            Agent::new(ROOT_AGENT_ID, root_role.id, None)
        });
        let mut contacts = self.contacts.lock();
        contacts.entry(USER_AGENT_ID.to_string()).or_insert_with(|| {
            let mut reg = ContactRegistry::new();
            reg.add(Contact::new(ROOT_AGENT_ID, root_role.name.clone(), ContactSource::Parent));
            reg
        });
        contacts.entry(ROOT_AGENT_ID.to_string()).or_insert_with(|| {
            let mut reg = ContactRegistry::new();
            reg.add(Contact::new(USER_AGENT_ID, "user".to_string(), ContactSource::Parent));
            reg
        });
        Ok(())
    }

    // ---- Roles ----------------------------------------------------------

    /// `create_role`, spec.md §4.4: idempotent on `name` (Property 11).
    pub fn create_role(
        &self,
        name: &str,
        role_prompt: &str,
        llm_service_id: Option<String>,
        tool_groups: Option<std::collections::HashSet<String>>,
        created_by: Option<String>,
    ) -> Role {
        if let Some(id) = self.role_names.get(name) {
            return self.roles.get(&*id).unwrap().clone();
        }
        let mut role = Role::new(name, role_prompt);
        role.llm_service_id = llm_service_id;
        role.tool_groups = tool_groups;
        role.created_by = created_by;
        self.role_names.insert(role.name.clone(), role.id);
        self.roles.insert(role.id, role.clone());
        role
    }

    pub fn find_role_by_name(&self, name: &str) -> Option<Role> {
        let id = self.role_names.get(name)?;
        self.roles.get(&*id).map(|r| r.clone())
    }

    pub fn get_role(&self, id: Uuid) -> Option<Role> {
        self.roles.get(&id).map(|r| r.clone())
    }

    pub fn list_roles(&self) -> Vec<Role> {
        self.roles.iter().map(|e| e.value().clone()).collect()
    }

    // ---- Agents -----------------------------------------------------------

    /// `spawn_agent`, spec.md §4.4. Validates the role and, for non-root
    /// spawns, the parent (spec.md §3.2 invariant: `parentAgentId` refers
    /// to an agent that exists at creation time).
    pub fn spawn_agent(&self, role_id: Uuid, parent_agent_id: &str) -> CoreResult<Agent> {
        if !self.roles.contains_key(&role_id) {
            return Err(CoreError::RoleNotFound(role_id.to_string()));
        }
        if !self.agents.contains_key(parent_agent_id) {
            return Err(CoreError::InvalidParent(parent_agent_id.to_string()));
        }
        let id = Uuid::new_v4().to_string();
        let agent = Agent::new(id.clone(), role_id, Some(parent_agent_id.to_string()));
        self.agents.insert(id.clone(), agent.clone());
        self.statuses.insert(id, ComputeStatus::Idle);
        Ok(agent)
    }

    pub fn get_agent(&self, agent_id: &str) -> Option<Agent> {
        self.agents.get(agent_id).map(|a| a.clone())
    }

    pub fn list_agents(&self) -> Vec<Agent> {
        self.agents.iter().map(|e| e.value().clone()).collect()
    }

    pub fn list_children(&self, parent_id: &str) -> Vec<Agent> {
        self.agents
            .iter()
            .filter(|e| e.value().parent_agent_id.as_deref() == Some(parent_id))
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn is_parent_of(&self, caller: &str, target: &str) -> bool {
        self.agents.get(target).map(|a| a.parent_agent_id.as_deref() == Some(caller)).unwrap_or(false)
    }

    /// `terminate_agent`, spec.md §4.4 "Errors: `not_child_agent`,
    /// `agent_not_found`. Only the parent may terminate" (Property 10).
    /// Sets status `terminating` (bus begins rejecting new sends
    /// immediately); callers are responsible for draining the queue and
    /// dropping the conversation before calling [`Self::finish_termination`].
    pub fn begin_termination(&self, caller: &str, target: &str) -> CoreResult<()> {
        let Some(agent) = self.agents.get(target) else {
            return Err(CoreError::AgentNotFound(target.to_string()));
        };
        if agent.parent_agent_id.as_deref() != Some(caller) {
            return Err(CoreError::NotChildAgent { caller: caller.to_string(), target: target.to_string() });
        }
        drop(agent);
        self.statuses.insert(target.to_string(), ComputeStatus::Terminating);
        Ok(())
    }

    /// Completes termination: marks the registry entry `terminated`
    /// (retained for audit, spec.md §3.8) and records the termination.
    pub fn finish_termination(&self, target: &str, reason: Option<String>) {
        if let Some(mut agent) = self.agents.get_mut(target) {
            agent.status = AgentStatus::Terminated;
        }
        self.statuses.insert(target.to_string(), ComputeStatus::Terminated);
        self.terminations.lock().push(TerminationRecord {
            agent_id: target.to_string(),
            reason,
            terminated_at: chrono::Utc::now(),
        });
        self.contacts.lock().remove(target);
    }

    // ---- Compute status ----------------------------------------------------

    pub fn status_of_agent(&self, agent_id: &str) -> ComputeStatus {
        self.statuses.get(agent_id).map(|s| *s).unwrap_or(ComputeStatus::Idle)
    }

    pub fn set_status(&self, agent_id: &str, status: ComputeStatus) {
        self.statuses.insert(agent_id.to_string(), status);
    }

    /// Agent IDs currently `idle` among the given candidates, preserving
    /// input order (used by the scheduler, spec.md §4.2 step 2).
    pub fn idle_among<'a>(&self, candidates: impl Iterator<Item = &'a String>) -> Vec<String> {
        candidates.filter(|id| self.status_of_agent(id).is_idle()).cloned().collect()
    }

    // ---- Contacts -----------------------------------------------------------

    /// Seed a newly spawned agent's contact registry with its parent (or
    /// `user`/`root` for the two distinguished agents) plus any preset
    /// collaborators from the task brief (spec.md §3.3).
    pub fn seed_contacts(&self, agent_id: &str, parent_id: &str, parent_role_name: &str, collaborators: &[Collaborator]) {
        let mut reg = ContactRegistry::new();
        reg.add(Contact::new(parent_id, parent_role_name, ContactSource::Parent));
        for c in collaborators {
            reg.add(Contact::new(c.id.clone(), c.role.clone(), ContactSource::Preset));
        }
        self.contacts.lock().insert(agent_id.to_string(), reg);

        // The parent also gains the child as a contact, so it can address
        // the agent it just spawned without an introduction round-trip.
        let child_role_name = self
            .get_agent(agent_id)
            .and_then(|a| self.get_role(a.role_id))
            .map(|r| r.name)
            .unwrap_or_default();
        let mut contacts = self.contacts.lock();
        contacts
            .entry(parent_id.to_string())
            .or_insert_with(ContactRegistry::new)
            .add(Contact::new(agent_id, child_role_name, ContactSource::Parent));
    }

    /// Record `from` as a contact of `to` the first time it appears in an
    /// inbound message, if it is not already registered (spec.md §3.3
    /// "Additional entries").
    pub fn observe_correspondent(&self, to: &str, from: &str, from_role_name: &str) {
        if to == from {
            return;
        }
        let mut contacts = self.contacts.lock();
        let reg = contacts.entry(to.to_string()).or_insert_with(ContactRegistry::new);
        if !reg.contains(from) {
            reg.add(Contact::new(from, from_role_name, ContactSource::Introduction));
        }
    }

    /// The display name of `agent_id`'s role, or empty string if the
    /// agent or its role can no longer be resolved.
    pub fn role_name_of(&self, agent_id: &str) -> String {
        self.get_agent(agent_id).and_then(|a| self.get_role(a.role_id)).map(|r| r.name).unwrap_or_default()
    }

    pub fn contacts_of(&self, agent_id: &str) -> ContactRegistry {
        self.contacts.lock().get(agent_id).cloned().unwrap_or_default()
    }

    // ---- Persistence --------------------------------------------------------

    pub fn persist_now(&self) -> CoreResult<()> {
        let doc = OrgDocument {
            roles: self.list_roles(),
            agents: self.list_agents(),
            terminations: self.terminations.lock().clone(),
        };
        self.layout.save_org(&doc)?;
        let contacts = self.contacts.lock();
        for (agent_id, registry) in contacts.iter() {
            let entries: Vec<Contact> = registry.iter().cloned().collect();
            self.layout.save_contacts(agent_id, &entries)?;
        }
        Ok(())
    }
}

impl AgentStatusLookup for OrgPrimitives {
    fn status_of(&self, agent_id: &str) -> ComputeStatus {
        self.status_of_agent(agent_id)
    }

    fn exists(&self, agent_id: &str) -> bool {
        self.agents.contains_key(agent_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn org() -> (tempfile::TempDir, OrgPrimitives) {
        let dir = tempfile::tempdir().unwrap();
        let org = OrgPrimitives::new(PersistenceLayout::new(dir.path()));
        org.bootstrap(Role::new("root", "you are the root agent")).unwrap();
        (dir, org)
    }

    #[test]
    fn bootstrap_creates_user_and_root() {
        let (_dir, org) = org();
        assert!(org.get_agent(USER_AGENT_ID).is_some());
        assert!(org.get_agent(ROOT_AGENT_ID).is_some());
        assert!(org.contacts_of(ROOT_AGENT_ID).contains(USER_AGENT_ID));
    }

    #[test]
    fn exists_false_for_never_registered_agent() {
        let (_dir, org) = org();
        assert!(org.exists(ROOT_AGENT_ID));
        assert!(!org.exists("nobody-ever-spawned-this"));
    }

    #[test]
    fn p11_create_role_idempotent_on_name() {
        let (_dir, org) = org();
        let a = org.create_role("planner", "plan things", None, None, None);
        let b = org.create_role("planner", "a different prompt", None, None, None);
        assert_eq!(a.id, b.id);
        assert_eq!(org.list_roles().iter().filter(|r| r.name == "planner").count(), 1);
    }

    #[test]
    fn spawn_agent_requires_existing_parent_and_role() {
        let (_dir, org) = org();
        let role = org.create_role("worker", "work", None, None, None);
        assert!(matches!(
            org.spawn_agent(role.id, "nonexistent"),
            Err(CoreError::InvalidParent(_))
        ));
        let child = org.spawn_agent(role.id, ROOT_AGENT_ID).unwrap();
        assert_eq!(child.parent_agent_id.as_deref(), Some(ROOT_AGENT_ID));
        assert_eq!(org.list_children(ROOT_AGENT_ID).len(), 1);
    }

    #[test]
    fn scenario_5_only_parent_may_terminate() {
        let (_dir, org) = org();
        let role = org.create_role("worker", "work", None, None, None);
        let child = org.spawn_agent(role.id, ROOT_AGENT_ID).unwrap();
        let other = org.spawn_agent(role.id, ROOT_AGENT_ID).unwrap();

        let err = org.begin_termination(&other.id, &child.id).unwrap_err();
        assert!(matches!(err, CoreError::NotChildAgent { .. }));

        org.begin_termination(ROOT_AGENT_ID, &child.id).unwrap();
        assert_eq!(org.status_of_agent(&child.id), ComputeStatus::Terminating);
        org.finish_termination(&child.id, Some("done".into()));
        assert_eq!(org.get_agent(&child.id).unwrap().status, AgentStatus::Terminated);
    }

    #[test]
    fn persist_and_reload_round_trips_roles_and_agents() {
        let dir = tempfile::tempdir().unwrap();
        let layout = PersistenceLayout::new(dir.path());
        let org = OrgPrimitives::new(layout.clone());
        let root_role = Role::new("root", "root prompt");
        org.bootstrap(root_role.clone()).unwrap();
        let worker = org.create_role("worker", "work", None, None, None);
        org.spawn_agent(worker.id, ROOT_AGENT_ID).unwrap();
        org.persist_now().unwrap();

        let org2 = OrgPrimitives::new(layout);
        org2.load().unwrap();
        assert!(org2.find_role_by_name("worker").is_some());
        assert_eq!(org2.list_children(ROOT_AGENT_ID).len(), 1);
    }

    #[test]
    fn agent_whose_role_vanished_loads_as_terminated() {
        let dir = tempfile::tempdir().unwrap();
        let layout = PersistenceLayout::new(dir.path());
        let bogus_role_id = Uuid::new_v4();
        let doc = OrgDocument {
            roles: vec![],
            agents: vec![Agent::new("ghost", bogus_role_id, Some(ROOT_AGENT_ID.to_string()))],
            terminations: vec![],
        };
        layout.save_org(&doc).unwrap();

        let org = OrgPrimitives::new(layout);
        org.load().unwrap();
        assert_eq!(org.get_agent("ghost").unwrap().status, AgentStatus::Terminated);
        assert_eq!(org.status_of_agent("ghost"), ComputeStatus::Terminated);
    }
}
