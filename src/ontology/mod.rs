//! Ontology 层：身份、目标、任务及其生命周期

pub mod agent_ontology;
pub mod feasibility;
pub mod goal;
pub mod identity;
pub mod persistence;
pub mod task;

pub use agent_ontology::{Ontology, OntologySummary};
pub use feasibility::{ConstantFeasibility, FeasibilityPolicy};
pub use goal::{Goal, GoalId, GoalStatus, GoalType, TimeConstraint};
pub use identity::{default_personality_traits, AgentType, Identity};
pub use persistence::{JsonFileStore, MemoryStore, OntologyStore, RecordKind, StoreError};
pub use task::{RetryPolicy, Task, TaskId, TaskStatus, TaskType};
