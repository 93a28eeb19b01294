//! Serialize / deserialize tests against real graph models.

use ontograph_model::{
    AttrPatch, AttrValue, EditorSession, ElementAttrs, ElementKind, ElementSpec, GraphElement,
    GraphModel, Origin,
};
use ontograph_rdf::{ns, ExternalIds, SerializationEngine, Term};

fn engine() -> SerializationEngine {
    SerializationEngine::new("https://ontograph.dev/onto/", "equivalentClass")
}

fn model() -> GraphModel {
    GraphModel::new(EditorSession::new("proj", "vehicles", "alice"))
}

fn relations(elements: &[GraphElement]) -> Vec<&GraphElement> {
    elements
        .iter()
        .filter(|e| e.kind() == ElementKind::Relation)
        .collect()
}

#[test]
fn two_classes_and_an_edge_survive_a_roundtrip() {
    let mut m = model();
    let a = m.add_element(ElementSpec::class("A")).unwrap();
    let b = m.add_element(ElementSpec::class("B")).unwrap();
    m.add_element(ElementSpec::relation(&a, &b, "connectsTo"))
        .unwrap();

    let mut ids = ExternalIds::new();
    let doc = engine().serialize("vehicles", m.elements(), &[], &mut ids);
    let turtle = doc.to_turtle();
    let back = engine().deserialize(&turtle).unwrap();

    let elements: Vec<GraphElement> = back.snapshot.elements().cloned().collect();
    let mut labels: Vec<&str> = elements
        .iter()
        .filter(|e| e.kind() == ElementKind::Class)
        .map(|e| e.label.as_str())
        .collect();
    labels.sort();
    assert_eq!(labels, vec!["A", "B"]);

    let rels = relations(&elements);
    assert_eq!(rels.len(), 1);
    let ElementAttrs::Relation(r) = &rels[0].attrs else {
        unreachable!()
    };
    assert_eq!(r.predicate, "connectsTo");
    let source = elements.iter().find(|e| e.id == r.source).unwrap();
    let target = elements.iter().find(|e| e.id == r.target).unwrap();
    assert_eq!((source.label.as_str(), target.label.as_str()), ("A", "B"));
    assert!(back.skipped.is_empty());
}

#[test]
fn multiplicity_and_comments_roundtrip() {
    let mut m = model();
    m.add_element(ElementSpec::class("Sensor").with_id("s").with_comment("Measures things"))
        .unwrap();
    m.add_element(ElementSpec::class("Platform").with_id("p"))
        .unwrap();
    m.add_element(
        ElementSpec::relation("s", "p", "mountedOn")
            .with_id("r")
            .with_multiplicity(Some(1), Some(1)),
    )
    .unwrap();

    let turtle = engine()
        .serialize("vehicles", m.elements(), &[], &mut ExternalIds::new())
        .to_turtle();
    assert!(turtle.contains("og:minCount \"1\"^^xsd:nonNegativeInteger"));
    assert!(turtle.contains("dcterms:creator \"alice\""));

    let back = engine().deserialize(&turtle).unwrap();
    let elements: Vec<GraphElement> = back.snapshot.elements().cloned().collect();
    let rel = relations(&elements)[0];
    let ElementAttrs::Relation(r) = &rel.attrs else {
        unreachable!()
    };
    assert_eq!((r.min_count, r.max_count), (Some(1), Some(1)));
    let sensor = elements.iter().find(|e| e.label == "Sensor").unwrap();
    assert_eq!(
        sensor.attr_map().get("comment"),
        Some(&AttrValue::text("Measures things"))
    );
    assert_eq!(sensor.stamp.creator.as_deref(), Some("alice"));
}

#[test]
fn overlays_and_equivalence_edges_are_not_serialized() {
    let mut m = model();
    m.add_element(ElementSpec::class("Vehicle").with_id("v"))
        .unwrap();
    let mut overlay = GraphElement::new(
        "overlay::foaf::Agent",
        "Agent",
        ElementAttrs::Class(Default::default()),
    );
    overlay.origin = Origin::overlay("foaf");
    m.insert_overlay(overlay, None);

    let doc = engine().serialize("vehicles", m.elements(), &["foaf".to_string()], &mut ExternalIds::new());
    let turtle = doc.to_turtle();
    assert!(!turtle.contains("Agent"));
    assert!(turtle.contains("owl:imports <https://ontograph.dev/onto/foaf>"));

    let back = engine().deserialize(&turtle).unwrap();
    assert_eq!(back.imports, vec!["foaf".to_string()]);
}

#[test]
fn reserved_predicate_becomes_owl_equivalent_class() {
    let mut m = model();
    m.add_element(ElementSpec::class("Car").with_id("c")).unwrap();
    m.add_element(ElementSpec::class("Automobile").with_id("a"))
        .unwrap();
    m.add_element(ElementSpec::relation("c", "a", "equivalentClass"))
        .unwrap();

    let doc = engine().serialize("vehicles", m.elements(), &[], &mut ExternalIds::new());
    let equivalent = format!("{}equivalentClass", ns::OWL);
    assert_eq!(
        doc.triples.iter().filter(|t| t.predicate == equivalent).count(),
        1
    );
    let object_property = Term::Iri(format!("{}ObjectProperty", ns::OWL));
    assert!(!doc.triples.iter().any(|t| t.object == object_property));

    let back = engine().deserialize(&doc.to_turtle()).unwrap();
    let elements: Vec<GraphElement> = back.snapshot.elements().cloned().collect();
    let ElementAttrs::Relation(r) = &relations(&elements)[0].attrs else {
        unreachable!()
    };
    assert_eq!(r.predicate, "equivalentClass");
}

#[test]
fn data_property_domain_and_note_attachment() {
    let mut m = model();
    m.add_element(ElementSpec::class("Sensor").with_id("s")).unwrap();
    m.add_element(ElementSpec::data_property("serialNumber", Some("string")).with_id("dp"))
        .unwrap();
    m.add_element(ElementSpec::note("check units").with_id("n")).unwrap();
    m.add_element(ElementSpec::relation("s", "dp", "hasDataProperty"))
        .unwrap();
    m.add_element(ElementSpec::relation("n", "s", "about")).unwrap();

    let turtle = engine()
        .serialize("vehicles", m.elements(), &[], &mut ExternalIds::new())
        .to_turtle();
    assert!(turtle.contains(":serialNumber\n    a owl:DatatypeProperty"));
    assert!(turtle.contains("rdfs:range xsd:string"));
    assert!(turtle.contains("rdfs:domain :Sensor"));
    assert!(turtle.contains("og:attachedTo :Sensor"));

    let back = engine().deserialize(&turtle).unwrap();
    let elements: Vec<GraphElement> = back.snapshot.elements().cloned().collect();
    let predicates: Vec<String> = relations(&elements)
        .iter()
        .filter_map(|e| match &e.attrs {
            ElementAttrs::Relation(r) => Some(r.predicate.clone()),
            _ => None,
        })
        .collect();
    assert!(predicates.contains(&"hasDataProperty".to_string()));
    assert!(predicates.contains(&"attachedTo".to_string()));
}

#[test]
fn named_data_property_link_keeps_predicate_and_multiplicity() {
    let mut m = model();
    m.add_element(ElementSpec::class("Sensor").with_id("s")).unwrap();
    m.add_element(ElementSpec::data_property("serialNumber", Some("string")).with_id("dp"))
        .unwrap();
    m.add_element(
        ElementSpec::relation("s", "dp", "identifiedBy").with_multiplicity(Some(1), Some(1)),
    )
    .unwrap();

    let turtle = engine()
        .serialize("vehicles", m.elements(), &[], &mut ExternalIds::new())
        .to_turtle();
    assert!(turtle.contains(":identifiedBy\n    a owl:ObjectProperty"));
    assert!(turtle.contains("rdfs:range :serialNumber"));

    let back = engine().deserialize(&turtle).unwrap();
    let elements: Vec<GraphElement> = back.snapshot.elements().cloned().collect();
    let rels = relations(&elements);
    assert_eq!(rels.len(), 1);
    assert_eq!(rels[0].label, "identifiedBy");
    let ElementAttrs::Relation(r) = &rels[0].attrs else {
        unreachable!()
    };
    assert_eq!(r.predicate, "identifiedBy");
    assert_eq!((r.source.as_str(), r.target.as_str()), ("Sensor", "serialNumber"));
    assert_eq!((r.min_count, r.max_count), (Some(1), Some(1)));
}

#[test]
fn external_ids_are_stable_across_saves_and_renames() {
    let mut m = model();
    let id = m.add_element(ElementSpec::class("Sensor")).unwrap();
    let mut ids = ExternalIds::new();
    let first = engine().serialize("vehicles", m.elements(), &[], &mut ids);

    let mut patch = AttrPatch::new();
    patch.insert("label".into(), Some(AttrValue::text("Detector")));
    m.update_attrs(&id, &patch).unwrap();
    let second = engine().serialize("vehicles", m.elements(), &[], &mut ids);

    let subject = |doc: &ontograph_rdf::ExchangeDocument| {
        doc.triples
            .iter()
            .find(|t| t.subject.ends_with("#Sensor"))
            .map(|t| t.subject.clone())
    };
    assert!(subject(&first).is_some());
    assert_eq!(subject(&first), subject(&second));
}

#[test]
fn label_collisions_get_suffixes() {
    let mut m = model();
    m.add_element(ElementSpec::class("Thing").with_id("t1")).unwrap();
    m.add_element(ElementSpec::class("Thing").with_id("t2")).unwrap();
    let mut ids = ExternalIds::new();
    engine().serialize("vehicles", m.elements(), &[], &mut ids);
    assert_eq!(ids.get("t1"), Some("Thing"));
    assert_eq!(ids.get("t2"), Some("Thing_2"));
}

#[test]
fn unknown_rdf_types_are_skipped() {
    let turtle = r#"
        @prefix owl: <http://www.w3.org/2002/07/owl#> .
        @prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
        @prefix ex: <https://example.org/o#> .
        <https://example.org/o> a owl:Ontology .
        ex:A a owl:Class ; rdfs:label "A" ; ex:unknownPredicate "ignored" .
        ex:thing a owl:NamedIndividual ; rdfs:label "thing" .
    "#;
    let back = engine().deserialize(turtle).unwrap();
    assert_eq!(back.snapshot.nodes.len(), 1);
    assert_eq!(back.skipped.len(), 1);
    assert_eq!(back.skipped[0].subject, "https://example.org/o#thing");
    assert_eq!(back.ontology_iri.as_deref(), Some("https://example.org/o"));
}
