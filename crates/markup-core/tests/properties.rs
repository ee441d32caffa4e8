use plate_markup_core::{
    FragmentNode, NodeId, Point, Range, ScrubContext, Scrubber, Tag, TagPolicy, Tree,
    toggle_range,
};
use proptest::prelude::*;
use proptest::sample::Index;

const TAGS: &[&str] = &[
    "b", "i", "strong", "em", "span", "mark", "code", "p", "div", "h2", "blockquote", "ul", "ol",
    "li",
];

const HREFS: &[&str] = &[
    "https://example.com",
    "mailto:someone@example.com",
    "/relative",
    "javascript:alert(1)",
    " JavaScript:alert(1)",
    "vbscript:x",
];

fn arb_leaf() -> impl Strategy<Value = FragmentNode> {
    prop_oneof![
        6 => "[ab é\n]{0,3}".prop_map(FragmentNode::text),
        1 => Just(FragmentNode::element("br", Vec::new())),
        1 => Just(FragmentNode::element("hr", Vec::new())),
        1 => Just(FragmentNode::card("embed").attr("src", "x.png")),
    ]
}

fn arb_node() -> impl Strategy<Value = FragmentNode> {
    arb_leaf().prop_recursive(4, 48, 4, |inner| {
        let children = prop::collection::vec(inner, 0..4);
        prop_oneof![
            4 => (prop::sample::select(TAGS), children.clone()).prop_map(|(tag, children)| {
                FragmentNode::element(tag, children).attr("class", "x")
            }),
            1 => (prop::sample::select(HREFS), children).prop_map(|(href, children)| {
                FragmentNode::element("a", children)
                    .attr("href", href)
                    .attr("target", "_blank")
                    .attr("onclick", "steal()")
            }),
        ]
    })
}

fn arb_fragment() -> impl Strategy<Value = Vec<FragmentNode>> {
    prop::collection::vec(arb_node(), 0..5)
}

/// Checks every element against the policy. `leaf` marks the level whose
/// elements must be policy leaves.
fn attrs_allowed(policy: &TagPolicy, nodes: &[FragmentNode], leaf: bool) -> bool {
    nodes.iter().all(|node| match node {
        FragmentNode::Element(el) => {
            let allowed = if leaf {
                policy.is_leaf(&el.tag) && policy.leaf_attrs(&el.tag, &el.attrs) == el.attrs
            } else {
                policy.child_attrs(&el.tag, &el.attrs) == el.attrs
            };
            let scripted = el.attrs.get("href").is_some_and(|href| {
                let href = href.trim().to_ascii_lowercase();
                href.starts_with("javascript:") || href.starts_with("vbscript:")
            });
            allowed && !scripted && attrs_allowed(policy, &el.children, false)
        }
        FragmentNode::Text(_) => !leaf,
        FragmentNode::Card(_) => true,
    })
}

fn text_nodes(tree: &Tree) -> Vec<NodeId> {
    tree.descendants(tree.root())
        .into_iter()
        .filter(|&node| tree.text(node).is_some_and(|text| !text.is_empty()))
        .collect()
}

fn nested_matches(tree: &Tree, tag: &Tag) -> usize {
    tree.descendants(tree.root())
        .into_iter()
        .filter(|&node| tree.has_tag(node, tag))
        .filter(|&node| {
            tree.ancestors(node)
                .into_iter()
                .any(|ancestor| tree.has_tag(ancestor, tag))
        })
        .count()
}

fn pick_point(tree: &Tree, texts: &[NodeId], node: Index, offset: Index) -> Point {
    let node = *node.get(texts);
    Point::new(node, offset.index(tree.node_len(node) + 1))
}

proptest! {
    #[test]
    fn scrubbing_is_a_fixed_point(fragment in arb_fragment()) {
        let scrubber = Scrubber::default();
        for context in [ScrubContext::Root, ScrubContext::ListItem] {
            let once = scrubber.scrub_in(&fragment, context);
            let twice = scrubber.scrub_in(&once, context);
            prop_assert_eq!(once, twice);
        }
    }

    #[test]
    fn scrubbed_attributes_follow_the_policy(fragment in arb_fragment()) {
        let scrubber = Scrubber::default();
        let policy = scrubber.policy();

        let leaves = scrubber.scrub(&fragment);
        prop_assert!(attrs_allowed(policy, &leaves, true));

        let inline = scrubber.scrub_in(&fragment, ScrubContext::ListItem);
        prop_assert!(attrs_allowed(policy, &inline, false));
    }

    #[test]
    fn toggling_keeps_text_and_never_nests(
        fragment in arb_fragment(),
        bold in any::<bool>(),
        points in (any::<Index>(), any::<Index>(), any::<Index>(), any::<Index>()),
    ) {
        let scrubbed = Scrubber::default().scrub(&fragment);
        let mut tree = Tree::from_fragment(&scrubbed);
        let texts = text_nodes(&tree);
        prop_assume!(!texts.is_empty());

        let tag = if bold { Tag::Strong } else { Tag::Em };
        prop_assert_eq!(nested_matches(&tree, &tag), 0);

        let (a_node, a_offset, b_node, b_offset) = points;
        let a = pick_point(&tree, &texts, a_node, a_offset);
        let b = pick_point(&tree, &texts, b_node, b_offset);
        let range = if tree.compare_points(&a, &b).unwrap().is_le() {
            Range::new(a, b)
        } else {
            Range::new(b, a)
        };

        let before = tree.text_content(tree.root());
        let restored = toggle_range(&mut tree, &range, &tag).unwrap();
        prop_assert_eq!(tree.text_content(tree.root()), before.clone());
        prop_assert_eq!(nested_matches(&tree, &tag), 0);

        if let Some(restored) = restored {
            toggle_range(&mut tree, &restored, &tag).unwrap();
            prop_assert_eq!(tree.text_content(tree.root()), before);
            prop_assert_eq!(nested_matches(&tree, &tag), 0);
        }
    }
}
