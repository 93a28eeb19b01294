//! Typed cache keys.
//!
//! Every persisted resource is addressed by `(project, ontology, resource)`.
//! Keys are only built through [`CacheKey::new`], which also decides the
//! scope of import snapshots (project x imported ontology).

use ontograph_model::digest::{parts_digest, sanitize_id_component};
use ontograph_model::EditorSession;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Resource {
    Graph,
    Layout,
    Visibility,
    Imports,
    VisibleImports,
    CollapsedImports,
    NamedViews,
    ExternalIds,
    /// Converted graph of an imported ontology.
    ImportSnapshot { import_id: String },
    /// Remembered overlay node positions of one import.
    OverlayPositions { import_id: String },
    /// Position of the pseudo-import node of one import.
    PseudoPosition { import_id: String },
}

impl Resource {
    pub fn slug(&self) -> String {
        match self {
            Resource::Graph => "graph".to_string(),
            Resource::Layout => "layout".to_string(),
            Resource::Visibility => "visibility".to_string(),
            Resource::Imports => "imports".to_string(),
            Resource::VisibleImports => "visible-imports".to_string(),
            Resource::CollapsedImports => "collapsed-imports".to_string(),
            Resource::NamedViews => "named-views".to_string(),
            Resource::ExternalIds => "external-ids".to_string(),
            Resource::ImportSnapshot { import_id } => format!("import-snapshot.{import_id}"),
            Resource::OverlayPositions { import_id } => format!("overlay-positions.{import_id}"),
            Resource::PseudoPosition { import_id } => format!("pseudo-position.{import_id}"),
        }
    }

    /// Parse the slug form used by the CLI (`graph`, `overlay-positions.foaf`, ...).
    pub fn parse(slug: &str) -> Option<Resource> {
        let resource = match slug {
            "graph" => Resource::Graph,
            "layout" => Resource::Layout,
            "visibility" => Resource::Visibility,
            "imports" => Resource::Imports,
            "visible-imports" => Resource::VisibleImports,
            "collapsed-imports" => Resource::CollapsedImports,
            "named-views" => Resource::NamedViews,
            "external-ids" => Resource::ExternalIds,
            other => {
                let (kind, import_id) = other.split_once('.')?;
                let import_id = import_id.to_string();
                match kind {
                    "import-snapshot" => Resource::ImportSnapshot { import_id },
                    "overlay-positions" => Resource::OverlayPositions { import_id },
                    "pseudo-position" => Resource::PseudoPosition { import_id },
                    _ => return None,
                }
            }
        };
        Some(resource)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    project_id: String,
    ontology_id: String,
    resource: Resource,
}

impl CacheKey {
    pub fn new(session: &EditorSession, resource: Resource) -> Self {
        let ontology_id = match &resource {
            Resource::ImportSnapshot { import_id } => import_id.clone(),
            _ => session.ontology_id.clone(),
        };
        Self {
            project_id: session.project_id.clone(),
            ontology_id,
            resource,
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn ontology_id(&self) -> &str {
        &self.ontology_id
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// File name used by an on-disk cache.
    ///
    /// Sanitized components keep it readable; the digest suffix keeps two keys
    /// that sanitize to the same text apart.
    pub fn storage_name(&self) -> String {
        let slug = self.resource.slug();
        let digest = parts_digest(&[&self.project_id, &self.ontology_id, &slug]);
        format!(
            "{}__{}__{}__{}.json",
            sanitize_id_component(&self.project_id),
            sanitize_id_component(&self.ontology_id),
            sanitize_id_component(&slug),
            digest
        )
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.project_id,
            self.ontology_id,
            self.resource.slug()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> EditorSession {
        EditorSession::new("proj", "onto", "u")
    }

    #[test]
    fn import_snapshots_are_scoped_by_import_ontology() {
        let a = CacheKey::new(
            &session(),
            Resource::ImportSnapshot {
                import_id: "foaf".into(),
            },
        );
        let b = CacheKey::new(
            &session().with_ontology("other"),
            Resource::ImportSnapshot {
                import_id: "foaf".into(),
            },
        );
        assert_eq!(a, b);
        assert_eq!(a.ontology_id(), "foaf");
    }

    #[test]
    fn colliding_sanitized_names_stay_distinct() {
        let a = CacheKey::new(&EditorSession::new("a/b", "o", "u"), Resource::Graph);
        let b = CacheKey::new(&EditorSession::new("a_b", "o", "u"), Resource::Graph);
        assert_ne!(a.storage_name(), b.storage_name());
        assert!(a.storage_name().starts_with("a_b__o__graph__"));
    }

    #[test]
    fn slugs_parse_back() {
        for resource in [
            Resource::Graph,
            Resource::NamedViews,
            Resource::OverlayPositions {
                import_id: "foaf".into(),
            },
        ] {
            assert_eq!(Resource::parse(&resource.slug()), Some(resource));
        }
        assert_eq!(Resource::parse("nope"), None);
    }
}
