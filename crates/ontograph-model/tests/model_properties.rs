//! Property tests for the graph model.

use ontograph_model::{
    normalize_label, ClassAttrs, ElementAttrs, ElementSpec, GraphElement, GraphModel, Category,
    CategoryFlags, EditorSession, Origin, VisibilityState,
};
use proptest::prelude::*;

fn category() -> impl Strategy<Value = Category> {
    prop_oneof![
        Just(Category::Classes),
        Just(Category::DataProperties),
        Just(Category::Notes),
        Just(Category::Edges),
        Just(Category::Imported),
    ]
}

proptest! {
    #[test]
    fn effective_visibility_is_gate_and_override(
        hidden in proptest::collection::vec(category(), 0..5),
        override_value in proptest::option::of(any::<bool>()),
        overlay in any::<bool>(),
    ) {
        let mut flags = CategoryFlags::default();
        for c in &hidden {
            flags.set(*c, false);
        }
        let mut state = VisibilityState { categories: flags, ..Default::default() };
        if let Some(v) = override_value {
            state.overrides.insert("x".to_string(), v);
        }

        let mut element = GraphElement::new("x", "X", ElementAttrs::Class(ClassAttrs::default()));
        if overlay {
            element.origin = Origin::overlay("imp");
        }
        let gate = flags.get(Category::of(&element));
        prop_assert_eq!(state.effective(&element), gate && override_value.unwrap_or(true));
    }

    #[test]
    fn normalization_ignores_case_and_padding(label in "[A-Za-z]{1,12}", pad in 0usize..4) {
        let padded = format!("{}{}{}", " ".repeat(pad), label.to_uppercase(), " ".repeat(pad));
        prop_assert_eq!(normalize_label(&padded), normalize_label(&label));
    }

    #[test]
    fn removing_any_node_leaves_no_dangling_edges(
        n in 2usize..8,
        edges in proptest::collection::vec((0usize..8, 0usize..8), 0..12),
        victim in 0usize..8,
    ) {
        let mut model = GraphModel::new(EditorSession::new("p", "o", "u"));
        for i in 0..n {
            model.add_element(ElementSpec::class(&format!("C{i}")).with_id(&format!("c{i}"))).unwrap();
        }
        for (s, t) in edges {
            if s < n && t < n {
                model
                    .add_element(ElementSpec::relation(&format!("c{s}"), &format!("c{t}"), "rel"))
                    .unwrap();
            }
        }

        let victim = format!("c{}", victim % n);
        model.remove_elements(&[victim.as_str()]);
        for edge in model.edges() {
            let (s, t) = edge.endpoints().unwrap();
            prop_assert!(model.contains(s) && model.contains(t));
        }
    }
}
