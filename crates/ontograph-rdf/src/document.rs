//! Exchange document: a flat list of triples plus Turtle rendering.

use crate::codec::ns;
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Literal {
    pub lexical: String,
    /// Full datatype IRI. `None` for plain strings.
    pub datatype: Option<String>,
    pub language: Option<String>,
}

impl Literal {
    pub fn plain(lexical: &str) -> Self {
        Self {
            lexical: lexical.to_string(),
            datatype: None,
            language: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Term {
    Iri(String),
    Blank(String),
    Literal(Literal),
}

impl Term {
    pub fn iri(iri: &str) -> Self {
        Term::Iri(iri.to_string())
    }

    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Term::Iri(iri) => Some(iri),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Term::Literal(l) => Some(l),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: Term,
}

impl Triple {
    pub fn new(subject: &str, predicate: &str, object: Term) -> Self {
        Self {
            subject: subject.to_string(),
            predicate: predicate.to_string(),
            object,
        }
    }
}

/// Serialized ontology, ready to render.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExchangeDocument {
    pub ontology_iri: String,
    /// IRIs of imported ontologies, in registration order.
    pub imports: Vec<String>,
    pub triples: Vec<Triple>,
}

const PREFIXES: &[(&str, &str)] = &[
    ("rdf", ns::RDF),
    ("rdfs", ns::RDFS),
    ("owl", ns::OWL),
    ("xsd", ns::XSD),
    ("skos", ns::SKOS),
    ("dcterms", ns::DCTERMS),
    ("og", ns::OG),
];

impl ExchangeDocument {
    pub fn objects<'a>(
        &'a self,
        subject: &'a str,
        predicate: &'a str,
    ) -> impl Iterator<Item = &'a Term> + 'a {
        self.triples
            .iter()
            .filter(move |t| t.subject == subject && t.predicate == predicate)
            .map(|t| &t.object)
    }

    /// Subjects in first-appearance order.
    pub fn subjects(&self) -> Vec<&str> {
        let mut seen = std::collections::HashSet::new();
        self.triples
            .iter()
            .map(|t| t.subject.as_str())
            .filter(|s| seen.insert(*s))
            .collect()
    }

    /// Render as Turtle: one block per subject, predicates in insertion order.
    pub fn to_turtle(&self) -> String {
        let local_ns = format!("{}#", self.ontology_iri);
        let mut out = String::with_capacity(256 + self.triples.len() * 64);

        for (prefix, iri) in PREFIXES {
            let _ = writeln!(out, "@prefix {prefix}: <{iri}> .");
        }
        let _ = writeln!(out, "@prefix : <{local_ns}> .");
        out.push('\n');

        let compact = |iri: &str| compact_iri(iri, &local_ns);
        for subject in self.subjects() {
            let pairs: Vec<String> = self
                .triples
                .iter()
                .filter(|t| t.subject == subject)
                .map(|t| {
                    let predicate = if t.predicate == format!("{}type", ns::RDF) {
                        "a".to_string()
                    } else {
                        compact(&t.predicate)
                    };
                    let object = match &t.object {
                        Term::Iri(iri) => compact(iri),
                        Term::Blank(id) => format!("_:{id}"),
                        Term::Literal(lit) => render_literal(lit, &local_ns),
                    };
                    format!("{predicate} {object}")
                })
                .collect();
            let _ = writeln!(out, "{}\n    {} .\n", compact(subject), pairs.join(" ;\n    "));
        }
        out
    }
}

fn is_local_part(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with('-')
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn compact_iri(iri: &str, local_ns: &str) -> String {
    if let Some(rest) = iri.strip_prefix(local_ns) {
        if is_local_part(rest) {
            return format!(":{rest}");
        }
    }
    for (prefix, ns) in PREFIXES {
        if let Some(rest) = iri.strip_prefix(ns) {
            if is_local_part(rest) {
                return format!("{prefix}:{rest}");
            }
        }
    }
    format!("<{iri}>")
}

fn render_literal(lit: &Literal, local_ns: &str) -> String {
    let quoted = turtle_string(&lit.lexical);
    match (&lit.language, &lit.datatype) {
        (Some(lang), _) => format!("{quoted}@{lang}"),
        (None, Some(dt)) => format!("{quoted}^^{}", compact_iri(dt, local_ns)),
        (None, None) => quoted,
    }
}

pub(crate) fn turtle_string(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len() + 2);
    escaped.push('"');
    for c in s.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            other => escaped.push(other),
        }
    }
    escaped.push('"');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_by_subject_and_compacts() {
        let onto = "https://example.org/onto";
        let class = format!("{onto}#Sensor");
        let doc = ExchangeDocument {
            ontology_iri: onto.to_string(),
            imports: vec![],
            triples: vec![
                Triple::new(&class, &format!("{}type", ns::RDF), Term::iri(&format!("{}Class", ns::OWL))),
                Triple::new(
                    &class,
                    &format!("{}label", ns::RDFS),
                    Term::Literal(Literal::plain("Sensor")),
                ),
            ],
        };
        let ttl = doc.to_turtle();
        assert!(ttl.contains("@prefix : <https://example.org/onto#> ."));
        assert!(ttl.contains(":Sensor\n    a owl:Class ;\n    rdfs:label \"Sensor\" ."));
    }

    #[test]
    fn escapes_quotes_and_newlines() {
        assert_eq!(turtle_string("say \"hi\"\nnow"), "\"say \\\"hi\\\"\\nnow\"");
    }

    #[test]
    fn unsafe_local_parts_stay_bracketed() {
        assert_eq!(
            compact_iri("https://example.org/onto#a b", "https://example.org/onto#"),
            "<https://example.org/onto#a b>"
        );
    }
}
