//! Editor session context.
//!
//! Every component receives the session explicitly instead of reading the
//! "current project / current ontology" from shared state, so two sessions can
//! coexist in one process (and in one test).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EditorSession {
    pub project_id: String,
    pub ontology_id: String,
    /// Identity stamped into `creator` / `lastModifiedBy`.
    pub user: String,
}

impl EditorSession {
    pub fn new(project_id: &str, ontology_id: &str, user: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            ontology_id: ontology_id.to_string(),
            user: user.to_string(),
        }
    }

    /// Same project and user, different ontology.
    pub fn with_ontology(&self, ontology_id: &str) -> Self {
        Self {
            ontology_id: ontology_id.to_string(),
            ..self.clone()
        }
    }
}
