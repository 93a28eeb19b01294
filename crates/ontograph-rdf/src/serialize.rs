//! Graph -> exchange document.

use crate::codec::{ns, AttributeCodec};
use crate::document::{ExchangeDocument, Literal, Term, Triple};
use crate::ids::ExternalIds;
use ontograph_model::digest::sanitize_id_component;
use ontograph_model::{ElementAttrs, ElementKind, GraphElement, RelationAttrs};
use std::collections::HashMap;

/// Predicate of the implicit class -> data property link written as `rdfs:domain`.
pub const DATA_PROPERTY_LINK: &str = "hasDataProperty";

/// A class -> data property relation that `rdfs:domain` alone can carry.
fn is_plain_domain_link(label: &str, rel: &RelationAttrs) -> bool {
    rel.predicate == DATA_PROPERTY_LINK
        && label == DATA_PROPERTY_LINK
        && rel.comment.is_none()
        && rel.min_count.is_none()
        && rel.max_count.is_none()
        && rel.datatype_constraint.is_none()
        && rel.enumeration_values.is_empty()
}

/// Serializes local graph content and parses exchange documents back.
#[derive(Debug, Clone)]
pub struct SerializationEngine {
    base_iri: String,
    equivalence_predicate: String,
}

impl SerializationEngine {
    pub fn new(base_iri: &str, equivalence_predicate: &str) -> Self {
        Self {
            base_iri: base_iri.trim_end_matches(['/', '#']).to_string(),
            equivalence_predicate: equivalence_predicate.to_string(),
        }
    }

    pub fn base_iri(&self) -> &str {
        &self.base_iri
    }

    pub fn equivalence_predicate(&self) -> &str {
        &self.equivalence_predicate
    }

    /// IRI of an ontology. Ids that already are IRIs are kept as-is.
    pub fn ontology_iri(&self, ontology_id: &str) -> String {
        if ontology_id.contains("://") {
            ontology_id.to_string()
        } else {
            format!("{}/{}", self.base_iri, sanitize_id_component(ontology_id))
        }
    }

    /// Inverse of [`ontology_iri`](Self::ontology_iri) for IRIs under the base.
    pub fn ontology_id_for(&self, iri: &str) -> String {
        iri.strip_prefix(&format!("{}/", self.base_iri))
            .filter(|rest| !rest.is_empty() && !rest.contains('/'))
            .map(str::to_string)
            .unwrap_or_else(|| iri.to_string())
    }

    pub fn element_iri(ontology_iri: &str, external_id: &str) -> String {
        format!("{ontology_iri}#{external_id}")
    }

    /// Serialize the local content of a graph.
    ///
    /// Overlay elements, pseudo-import nodes and equivalence edges are left
    /// out. External ids are assigned on first use and recorded in `ids`.
    pub fn serialize<'a>(
        &self,
        ontology_id: &str,
        elements: impl IntoIterator<Item = &'a GraphElement>,
        imports: &[String],
        ids: &mut ExternalIds,
    ) -> ExchangeDocument {
        let ontology_iri = self.ontology_iri(ontology_id);
        let elements: Vec<&GraphElement> = elements
            .into_iter()
            .filter(|e| {
                !e.is_overlay()
                    && !matches!(e.kind(), ElementKind::PseudoImport | ElementKind::Equivalence)
            })
            .collect();
        let by_id: HashMap<&str, &GraphElement> =
            elements.iter().map(|e| (e.id.as_str(), *e)).collect();

        // Nodes first so node ids win label collisions over relation ids.
        let mut iris: HashMap<String, String> = HashMap::new();
        for element in elements.iter().filter(|e| !e.is_edge()) {
            let ext = ids.assign(&element.id, &element.label);
            iris.insert(element.id.clone(), Self::element_iri(&ontology_iri, &ext));
        }
        let resolve = |id: &str| iris.get(id).cloned();

        let rdf_type = format!("{}type", ns::RDF);
        let label = format!("{}label", ns::RDFS);
        let mut triples = vec![Triple::new(
            &ontology_iri,
            &rdf_type,
            Term::Iri(format!("{}Ontology", ns::OWL)),
        )];
        let import_iris: Vec<String> = imports.iter().map(|i| self.ontology_iri(i)).collect();
        for import in &import_iris {
            triples.push(Triple::new(
                &ontology_iri,
                &format!("{}imports", ns::OWL),
                Term::Iri(import.clone()),
            ));
        }

        for element in elements.iter().filter(|e| !e.is_edge()) {
            let Some(subject) = iris.get(&element.id) else {
                continue;
            };
            let class_iri = match element.kind() {
                ElementKind::Class => format!("{}Class", ns::OWL),
                ElementKind::DataProperty => format!("{}DatatypeProperty", ns::OWL),
                _ => format!("{}Note", ns::OG),
            };
            triples.push(Triple::new(subject, &rdf_type, Term::Iri(class_iri)));
            triples.push(Triple::new(
                subject,
                &label,
                Term::Literal(Literal::plain(&element.label)),
            ));
            for (key, value) in element.attr_map() {
                for (predicate, object) in AttributeCodec::encode(&key, &value, &resolve) {
                    triples.push(Triple::new(subject, &predicate, object));
                }
            }
        }

        for element in elements.iter().filter(|e| e.is_edge()) {
            let ElementAttrs::Relation(rel) = &element.attrs else {
                continue;
            };
            let (Some(source), Some(target)) = (by_id.get(rel.source.as_str()), by_id.get(rel.target.as_str())) else {
                tracing::debug!(edge = %element.id, "skipping relation with missing endpoint");
                continue;
            };
            let (Some(source_iri), Some(target_iri)) = (resolve(&source.id), resolve(&target.id)) else {
                continue;
            };

            match (source.kind(), target.kind()) {
                (ElementKind::Class, ElementKind::Class)
                    if rel.predicate == self.equivalence_predicate =>
                {
                    triples.push(Triple::new(
                        &source_iri,
                        &format!("{}equivalentClass", ns::OWL),
                        Term::Iri(target_iri),
                    ));
                }
                (ElementKind::Class, ElementKind::DataProperty)
                    if is_plain_domain_link(&element.label, rel) =>
                {
                    triples.push(Triple::new(
                        &target_iri,
                        &format!("{}domain", ns::RDFS),
                        Term::Iri(source_iri),
                    ));
                }
                (ElementKind::Note, _) => {
                    triples.push(Triple::new(
                        &source_iri,
                        &format!("{}attachedTo", ns::OG),
                        Term::Iri(target_iri),
                    ));
                }
                _ => {
                    let ext = ids.assign(&element.id, &element.label);
                    let subject = Self::element_iri(&ontology_iri, &ext);
                    triples.push(Triple::new(
                        &subject,
                        &rdf_type,
                        Term::Iri(format!("{}ObjectProperty", ns::OWL)),
                    ));
                    triples.push(Triple::new(
                        &subject,
                        &label,
                        Term::Literal(Literal::plain(&element.label)),
                    ));
                    if rel.predicate != element.label {
                        triples.push(Triple::new(
                            &subject,
                            &format!("{}predicate", ns::OG),
                            Term::Literal(Literal::plain(&rel.predicate)),
                        ));
                    }
                    triples.push(Triple::new(
                        &subject,
                        &format!("{}domain", ns::RDFS),
                        Term::Iri(source_iri),
                    ));
                    triples.push(Triple::new(
                        &subject,
                        &format!("{}range", ns::RDFS),
                        Term::Iri(target_iri),
                    ));
                    for (key, value) in element.attr_map() {
                        if key == "predicate" {
                            continue;
                        }
                        for (predicate, object) in AttributeCodec::encode(&key, &value, &resolve) {
                            triples.push(Triple::new(&subject, &predicate, object));
                        }
                    }
                }
            }
        }

        tracing::debug!(
            ontology = %ontology_iri,
            triples = triples.len(),
            imports = import_iris.len(),
            "serialized graph"
        );
        ExchangeDocument {
            ontology_iri,
            imports: import_iris,
            triples,
        }
    }
}
