//! Exchange document -> graph.

use crate::codec::{ns, AttributeCodec};
use crate::document::{ExchangeDocument, Term, Triple};
use crate::ids::ExternalIds;
use crate::serialize::{SerializationEngine, DATA_PROPERTY_LINK};
use crate::turtle::parse_turtle;
use crate::RdfError;
use chrono::{DateTime, Utc};
use ontograph_model::digest::parts_digest;
use ontograph_model::{
    AttrPatch, AttrValue, ClassAttrs, DataPropertyAttrs, ElementAttrs, ElementKind, GraphElement,
    GraphSnapshot, NoteAttrs, Provenance, RelationAttrs, Stamp,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// A subject whose `rdf:type` the editor has no element kind for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializationSkip {
    pub subject: String,
    pub rdf_type: String,
}

impl fmt::Display for SerializationSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "skipped <{}> of unsupported type <{}>", self.subject, self.rdf_type)
    }
}

#[derive(Debug, Clone)]
pub struct Deserialized {
    pub ontology_iri: Option<String>,
    pub snapshot: GraphSnapshot,
    /// Imported ontology ids (IRIs outside the base are kept verbatim).
    pub imports: Vec<String>,
    pub external_ids: ExternalIds,
    pub skipped: Vec<SerializationSkip>,
}

#[derive(Default)]
struct Subject<'a> {
    types: Vec<&'a str>,
    statements: Vec<(&'a str, &'a Term)>,
}

fn local_name(iri: &str) -> &str {
    iri.rsplit(['#', '/']).next().unwrap_or(iri)
}

fn kind_for_type(rdf_type: &str) -> Option<ElementKind> {
    let owl = |local: &str| format!("{}{local}", ns::OWL);
    if rdf_type == owl("Class") {
        Some(ElementKind::Class)
    } else if rdf_type == owl("DatatypeProperty") {
        Some(ElementKind::DataProperty)
    } else if rdf_type == owl("ObjectProperty") {
        Some(ElementKind::Relation)
    } else if rdf_type == format!("{}Note", ns::OG) {
        Some(ElementKind::Note)
    } else {
        None
    }
}

fn merge_value(map: &mut BTreeMap<String, AttrValue>, key: &str, value: AttrValue) {
    match (map.get_mut(key), value) {
        (Some(AttrValue::List(existing)), AttrValue::List(more)) => existing.extend(more),
        (Some(_), _) => {}
        (None, value) => {
            map.insert(key.to_string(), value);
        }
    }
}

fn parse_time(value: Option<&AttrValue>) -> Option<DateTime<Utc>> {
    let text = value?.as_text()?;
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Build an element from decoded attribute values. Values the schema
/// rejects are dropped one by one.
fn assemble(
    id: &str,
    label: &str,
    base: ElementAttrs,
    mut values: BTreeMap<String, AttrValue>,
) -> GraphElement {
    let stamp = Stamp {
        creator: values
            .remove("creator")
            .and_then(|v| v.as_text().map(str::to_string)),
        created_at: parse_time(values.remove("createdAt").as_ref()),
        last_modified_by: values
            .remove("lastModifiedBy")
            .and_then(|v| v.as_text().map(str::to_string)),
        last_modified_at: parse_time(values.remove("lastModifiedAt").as_ref()),
    };

    let mut element = GraphElement::new(id, label, base);
    for (key, value) in values {
        let patch: AttrPatch = [(key.clone(), Some(value))].into_iter().collect();
        if let Err(err) = element.apply_patch(&patch, "", Utc::now()) {
            tracing::warn!(element = %id, key = %key, error = %err, "dropping attribute from document");
        }
    }
    element.stamp = stamp;
    element
}

impl SerializationEngine {
    /// Parse Turtle and rebuild graph content.
    pub fn deserialize(&self, turtle: &str) -> Result<Deserialized, RdfError> {
        let triples = parse_turtle(turtle)?;
        Ok(self.deserialize_triples(&triples))
    }

    pub fn deserialize_document(&self, document: &ExchangeDocument) -> Deserialized {
        self.deserialize_triples(&document.triples)
    }

    fn deserialize_triples(&self, triples: &[Triple]) -> Deserialized {
        let rdf_type = format!("{}type", ns::RDF);
        let rdfs_label = format!("{}label", ns::RDFS);
        let rdfs_domain = format!("{}domain", ns::RDFS);
        let rdfs_range = format!("{}range", ns::RDFS);
        let owl_ontology = format!("{}Ontology", ns::OWL);
        let owl_imports = format!("{}imports", ns::OWL);
        let owl_equivalent = format!("{}equivalentClass", ns::OWL);
        let og_attached = format!("{}attachedTo", ns::OG);
        let og_predicate = format!("{}predicate", ns::OG);

        let mut order: Vec<&str> = Vec::new();
        let mut subjects: HashMap<&str, Subject> = HashMap::new();
        for t in triples {
            let entry = subjects.entry(t.subject.as_str()).or_insert_with(|| {
                order.push(t.subject.as_str());
                Subject::default()
            });
            match (&t.object, t.predicate == rdf_type) {
                (Term::Iri(class), true) => entry.types.push(class.as_str()),
                _ => entry.statements.push((t.predicate.as_str(), &t.object)),
            }
        }

        // Ontology header.
        let mut ontology_iri = None;
        let mut imports = Vec::new();
        for subject in &order {
            let s = &subjects[subject];
            if !s.types.contains(&owl_ontology.as_str()) {
                continue;
            }
            if ontology_iri.is_none() {
                ontology_iri = Some(subject.to_string());
                for (predicate, object) in &s.statements {
                    if *predicate == owl_imports {
                        if let Some(iri) = object.as_iri() {
                            imports.push(self.ontology_id_for(iri));
                        }
                    }
                }
            }
        }

        // Classify subjects and assign element ids.
        let mut skipped = Vec::new();
        let mut kinds: Vec<(&str, ElementKind)> = Vec::new();
        for subject in &order {
            let s = &subjects[subject];
            if s.types.is_empty() || s.types.contains(&owl_ontology.as_str()) {
                continue;
            }
            match s.types.iter().find_map(|t| kind_for_type(t)) {
                Some(kind) => kinds.push((*subject, kind)),
                None => {
                    let skip = SerializationSkip {
                        subject: subject.to_string(),
                        rdf_type: s.types[0].to_string(),
                    };
                    tracing::warn!(subject = %skip.subject, rdf_type = %skip.rdf_type, "skipping unsupported rdf:type");
                    skipped.push(skip);
                }
            }
        }

        let mut external_ids = ExternalIds::new();
        let mut ids: HashMap<&str, String> = HashMap::new();
        let mut used: HashSet<String> = HashSet::new();
        for (iri, _) in &kinds {
            let local = local_name(iri);
            let id = if !local.is_empty() && !used.contains(local) {
                local.to_string()
            } else {
                format!("rdf_{}", parts_digest(&[*iri]))
            };
            used.insert(id.clone());
            external_ids.insert(&id, local);
            ids.insert(*iri, id);
        }
        let resolve = |iri: &str| ids.get(iri).cloned();

        let mut elements: Vec<GraphElement> = Vec::new();
        let mut links: Vec<(String, String, String)> = Vec::new();
        let mut relations: Vec<(&str, &Subject)> = Vec::new();

        for (iri, kind) in &kinds {
            let s = &subjects[iri];
            let id = &ids[iri];
            if *kind == ElementKind::Relation {
                relations.push((*iri, s));
                continue;
            }
            let mut label = local_name(iri).to_string();
            let mut values = BTreeMap::new();
            for (predicate, object) in &s.statements {
                if *predicate == rdfs_label {
                    if let Some(lit) = object.as_literal() {
                        label = lit.lexical.clone();
                    }
                } else if *predicate == owl_equivalent && *kind == ElementKind::Class {
                    if let Some(target) = object.as_iri().and_then(|o| resolve(o)) {
                        links.push((id.clone(), target, self.equivalence_predicate().to_string()));
                    }
                } else if *predicate == rdfs_domain && *kind == ElementKind::DataProperty {
                    if let Some(class) = object.as_iri().and_then(|o| resolve(o)) {
                        links.push((class, id.clone(), DATA_PROPERTY_LINK.to_string()));
                    }
                } else if *predicate == og_attached && *kind == ElementKind::Note {
                    if let Some(target) = object.as_iri().and_then(|o| resolve(o)) {
                        links.push((id.clone(), target, "attachedTo".to_string()));
                    }
                } else if let Some((key, value)) =
                    AttributeCodec::decode(predicate, object, *kind, &resolve)
                {
                    merge_value(&mut values, key, value);
                }
            }
            let base = match kind {
                ElementKind::Class => ElementAttrs::Class(ClassAttrs::default()),
                ElementKind::DataProperty => ElementAttrs::DataProperty(DataPropertyAttrs::default()),
                _ => ElementAttrs::Note(NoteAttrs::default()),
            };
            elements.push(assemble(id, &label, base, values));
        }

        let node_ids: HashSet<String> = elements.iter().map(|e| e.id.clone()).collect();

        for (iri, s) in relations {
            let id = &ids[iri];
            let mut label = local_name(iri).to_string();
            let mut predicate_text = None;
            let (mut source, mut target) = (None, None);
            let mut values = BTreeMap::new();
            for (predicate, object) in &s.statements {
                if *predicate == rdfs_label {
                    if let Some(lit) = object.as_literal() {
                        label = lit.lexical.clone();
                    }
                } else if *predicate == og_predicate {
                    predicate_text = object.as_literal().map(|l| l.lexical.clone());
                } else if *predicate == rdfs_domain {
                    source = object.as_iri().and_then(|o| resolve(o));
                } else if *predicate == rdfs_range {
                    target = object.as_iri().and_then(|o| resolve(o));
                } else if let Some((key, value)) =
                    AttributeCodec::decode(predicate, object, ElementKind::Relation, &resolve)
                {
                    merge_value(&mut values, key, value);
                }
            }
            let (Some(source), Some(target)) = (source, target) else {
                tracing::warn!(property = %iri, "object property without resolvable domain and range");
                continue;
            };
            if !node_ids.contains(&source) || !node_ids.contains(&target) {
                continue;
            }
            let base = ElementAttrs::Relation(RelationAttrs {
                source,
                target,
                predicate: predicate_text.unwrap_or_else(|| label.clone()),
                ..Default::default()
            });
            elements.push(assemble(id, &label, base, values));
        }

        let mut seen_links = HashSet::new();
        for (source, target, predicate) in links {
            if !node_ids.contains(&source) || !node_ids.contains(&target) {
                continue;
            }
            let id = format!("{source}::{predicate}::{target}");
            if !seen_links.insert(id.clone()) {
                continue;
            }
            let attrs = ElementAttrs::Relation(RelationAttrs {
                source,
                target,
                predicate: predicate.clone(),
                ..Default::default()
            });
            elements.push(GraphElement::new(&id, &predicate, attrs));
        }

        tracing::debug!(
            elements = elements.len(),
            skipped = skipped.len(),
            imports = imports.len(),
            "deserialized exchange document"
        );
        Deserialized {
            ontology_iri,
            snapshot: GraphSnapshot::new(elements, Provenance::Local, Utc::now()),
            imports,
            external_ids,
            skipped,
        }
    }
}
