//! Attribute codec: element attribute keys <-> RDF predicates.
//!
//! | key | predicate | object |
//! |---|---|---|
//! | comment | `rdfs:comment` | literal |
//! | definition | `skos:definition` | literal |
//! | creator | `dcterms:creator` | literal |
//! | createdAt | `dcterms:created` | `xsd:dateTime` |
//! | lastModifiedBy | `og:lastModifiedBy` | literal |
//! | lastModifiedAt | `dcterms:modified` | `xsd:dateTime` |
//! | minCount / maxCount | `og:minCount` / `og:maxCount` | `xsd:nonNegativeInteger` |
//! | datatypeConstraint | `og:datatypeConstraint` | literal |
//! | enumeration / enumerationValues | `og:enumerationValue` | one literal per value |
//! | datatype | `rdfs:range` | `xsd:*` IRI |
//! | parents | `rdfs:subClassOf` | one IRI per parent |
//!
//! The codec is a pure table. Turning element ids into IRIs (and back) is
//! delegated to the caller through a resolver.

use crate::document::{Literal, Term};
use ontograph_model::{AttrValue, ElementKind};

pub mod ns {
    pub const RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
    pub const RDFS: &str = "http://www.w3.org/2000/01/rdf-schema#";
    pub const OWL: &str = "http://www.w3.org/2002/07/owl#";
    pub const XSD: &str = "http://www.w3.org/2001/XMLSchema#";
    pub const SKOS: &str = "http://www.w3.org/2004/02/skos/core#";
    pub const DCTERMS: &str = "http://purl.org/dc/terms/";
    pub const OG: &str = "https://ontograph.dev/vocab#";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
    /// Literal, optionally typed with an XSD local name.
    Literal(Option<&'static str>),
    /// IRI of another element.
    Reference,
    /// IRI in the XSD namespace.
    Datatype,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredicateMapping {
    pub key: &'static str,
    pub namespace: &'static str,
    pub local: &'static str,
    pub shape: ValueShape,
    /// One triple per list item.
    pub multi: bool,
}

impl PredicateMapping {
    pub fn predicate(&self) -> String {
        format!("{}{}", self.namespace, self.local)
    }

    fn applies_to(&self, kind: ElementKind) -> bool {
        use ElementKind::*;
        match self.key {
            "comment" => matches!(kind, Class | DataProperty | Note | Relation),
            "definition" => matches!(kind, Class | DataProperty),
            "creator" | "createdAt" | "lastModifiedBy" | "lastModifiedAt" => true,
            "minCount" | "maxCount" | "datatypeConstraint" | "enumerationValues" => {
                kind == Relation
            }
            "enumeration" | "datatype" => kind == DataProperty,
            "parents" => kind == Class,
            _ => false,
        }
    }
}

const fn literal(
    key: &'static str,
    namespace: &'static str,
    local: &'static str,
    datatype: Option<&'static str>,
) -> PredicateMapping {
    PredicateMapping {
        key,
        namespace,
        local,
        shape: ValueShape::Literal(datatype),
        multi: false,
    }
}

pub const MAPPINGS: &[PredicateMapping] = &[
    literal("comment", ns::RDFS, "comment", None),
    literal("definition", ns::SKOS, "definition", None),
    literal("creator", ns::DCTERMS, "creator", None),
    literal("createdAt", ns::DCTERMS, "created", Some("dateTime")),
    literal("lastModifiedBy", ns::OG, "lastModifiedBy", None),
    literal("lastModifiedAt", ns::DCTERMS, "modified", Some("dateTime")),
    literal("minCount", ns::OG, "minCount", Some("nonNegativeInteger")),
    literal("maxCount", ns::OG, "maxCount", Some("nonNegativeInteger")),
    literal("datatypeConstraint", ns::OG, "datatypeConstraint", None),
    PredicateMapping {
        key: "enumeration",
        namespace: ns::OG,
        local: "enumerationValue",
        shape: ValueShape::Literal(None),
        multi: true,
    },
    PredicateMapping {
        key: "enumerationValues",
        namespace: ns::OG,
        local: "enumerationValue",
        shape: ValueShape::Literal(None),
        multi: true,
    },
    PredicateMapping {
        key: "datatype",
        namespace: ns::RDFS,
        local: "range",
        shape: ValueShape::Datatype,
        multi: false,
    },
    PredicateMapping {
        key: "parents",
        namespace: ns::RDFS,
        local: "subClassOf",
        shape: ValueShape::Reference,
        multi: true,
    },
];

pub struct AttributeCodec;

impl AttributeCodec {
    pub fn mapping(key: &str) -> Option<&'static PredicateMapping> {
        MAPPINGS.iter().find(|m| m.key == key)
    }

    /// Predicate/object pairs for one attribute. Unknown keys and
    /// unresolvable references produce nothing.
    pub fn encode(
        key: &str,
        value: &AttrValue,
        resolve_id: &dyn Fn(&str) -> Option<String>,
    ) -> Vec<(String, Term)> {
        let Some(mapping) = Self::mapping(key) else {
            return Vec::new();
        };
        let items: Vec<String> = match value {
            AttrValue::List(items) => items.clone(),
            AttrValue::Text(s) => vec![s.clone()],
            AttrValue::Number(n) => vec![format_number(*n)],
            AttrValue::Bool(b) => vec![b.to_string()],
        };
        let items = if mapping.multi {
            items
        } else {
            items.into_iter().take(1).collect()
        };

        let predicate = mapping.predicate();
        items
            .into_iter()
            .filter_map(|item| {
                let object = match mapping.shape {
                    ValueShape::Literal(datatype) => Term::Literal(Literal {
                        lexical: item,
                        datatype: datatype.map(|dt| format!("{}{dt}", ns::XSD)),
                        language: None,
                    }),
                    ValueShape::Datatype => Term::Iri(format!("{}{item}", ns::XSD)),
                    ValueShape::Reference => Term::Iri(resolve_id(&item)?),
                };
                Some((predicate.clone(), object))
            })
            .collect()
    }

    /// The attribute carried by one triple on an element of `kind`.
    ///
    /// Multi-valued keys come back as a one-item list; the caller merges.
    pub fn decode(
        predicate: &str,
        object: &Term,
        kind: ElementKind,
        resolve_iri: &dyn Fn(&str) -> Option<String>,
    ) -> Option<(&'static str, AttrValue)> {
        let mapping = MAPPINGS
            .iter()
            .find(|m| m.applies_to(kind) && m.predicate() == predicate)?;
        let item = match (mapping.shape, object) {
            (ValueShape::Literal(Some("nonNegativeInteger")), Term::Literal(l)) => {
                let n: u32 = l.lexical.trim().parse().ok()?;
                return Some((mapping.key, AttrValue::Number(n as f64)));
            }
            (ValueShape::Literal(_), Term::Literal(l)) => l.lexical.clone(),
            (ValueShape::Datatype, Term::Iri(iri)) => iri.strip_prefix(ns::XSD)?.to_string(),
            (ValueShape::Reference, Term::Iri(iri)) => resolve_iri(iri)?,
            _ => return None,
        };
        let value = if mapping.multi {
            AttrValue::List(vec![item])
        } else {
            AttrValue::Text(item)
        };
        Some((mapping.key, value))
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_refs(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn multiplicity_encodes_as_typed_integer() {
        let triples = AttributeCodec::encode("minCount", &AttrValue::Number(1.0), &no_refs);
        assert_eq!(triples.len(), 1);
        let (predicate, Term::Literal(lit)) = &triples[0] else {
            panic!("expected literal");
        };
        assert_eq!(predicate, &format!("{}minCount", ns::OG));
        assert_eq!(lit.lexical, "1");
        assert_eq!(
            lit.datatype.as_deref(),
            Some("http://www.w3.org/2001/XMLSchema#nonNegativeInteger")
        );
    }

    #[test]
    fn enumeration_emits_one_triple_per_value() {
        let triples = AttributeCodec::encode(
            "enumerationValues",
            &AttrValue::list(&["red", "green", "blue"]),
            &no_refs,
        );
        assert_eq!(triples.len(), 3);
    }

    #[test]
    fn datatype_becomes_xsd_range() {
        let triples = AttributeCodec::encode("datatype", &AttrValue::text("integer"), &no_refs);
        assert_eq!(
            triples[0],
            (
                format!("{}range", ns::RDFS),
                Term::Iri(format!("{}integer", ns::XSD))
            )
        );
        let decoded = AttributeCodec::decode(
            &triples[0].0,
            &triples[0].1,
            ElementKind::DataProperty,
            &no_refs,
        );
        assert_eq!(decoded, Some(("datatype", AttrValue::text("integer"))));
    }

    #[test]
    fn shared_predicate_decodes_by_kind() {
        let object = Term::Literal(Literal::plain("red"));
        let predicate = format!("{}enumerationValue", ns::OG);
        assert_eq!(
            AttributeCodec::decode(&predicate, &object, ElementKind::DataProperty, &no_refs)
                .map(|(k, _)| k),
            Some("enumeration")
        );
        assert_eq!(
            AttributeCodec::decode(&predicate, &object, ElementKind::Relation, &no_refs)
                .map(|(k, _)| k),
            Some("enumerationValues")
        );
        assert_eq!(
            AttributeCodec::decode(&predicate, &object, ElementKind::Note, &no_refs),
            None
        );
    }

    #[test]
    fn unresolved_parent_is_dropped() {
        let triples = AttributeCodec::encode("parents", &AttrValue::list(&["gone"]), &no_refs);
        assert!(triples.is_empty());
    }
}
