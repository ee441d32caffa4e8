use plate_markup_core::{
    CaretEvent, Editor, EditorConfig, EditorError, FragmentNode, KeyOutcome, KeyStroke, NodeId,
    Point, PolicyError, Selection, Tag, TreeError,
};
use serde_json::json;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn editor_with(fragment: Vec<FragmentNode>) -> Editor {
    init_tracing();
    let mut editor = Editor::default();
    editor.load(&fragment);
    editor
}

fn text_node(editor: &Editor, needle: &str) -> NodeId {
    let tree = editor.tree();
    tree.descendants(tree.root())
        .into_iter()
        .find(|&node| tree.text(node) == Some(needle))
        .unwrap_or_else(|| panic!("no text node {needle:?}"))
}

fn select(editor: &mut Editor, node: NodeId, from: usize, to: usize) {
    editor
        .set_selection(Some(Selection {
            anchor: Point::new(node, from),
            focus: Point::new(node, to),
        }))
        .unwrap();
}

fn caret(editor: &mut Editor, node: NodeId, offset: usize) {
    editor
        .set_selection(Some(Selection::collapsed(Point::new(node, offset))))
        .unwrap();
}

#[test]
fn load_scrubs_and_places_the_caret_at_the_first_text() {
    let editor = editor_with(vec![
        FragmentNode::element("div", vec![FragmentNode::text("hi")]),
        FragmentNode::text("there"),
    ]);

    assert_eq!(editor.markup(), "<p>hi</p><p>there</p>");
    let hi = text_node(&editor, "hi");
    assert_eq!(
        editor.selection(),
        Some(&Selection::collapsed(Point::new(hi, 0)))
    );
}

#[test]
fn collapsed_toggle_applies_to_the_next_typed_text() {
    let mut editor = editor_with(vec![FragmentNode::paragraph("ab")]);
    let ab = text_node(&editor, "ab");
    caret(&mut editor, ab, 2);

    let update = editor.toggle_inline("em").unwrap().unwrap();
    assert_eq!(update.selection, Selection::collapsed(Point::new(ab, 2)));
    assert_eq!(editor.markup(), "<p>ab</p>");

    // The host re-applies the caret and echoes the token back.
    editor.on_caret_change(CaretEvent::restored(&update)).unwrap();
    assert!(editor.is_active("i"));

    editor.insert_text("x").unwrap();
    assert_eq!(editor.markup(), "<p>ab<em>x</em></p>");
    assert!(editor.session().toggled_tags().is_empty());
    assert!(editor.is_active("em"));

    let outcome = editor.on_key(&KeyStroke::new("y")).unwrap();
    assert!(matches!(outcome, KeyOutcome::Handled(Some(_))));
    assert_eq!(editor.markup(), "<p>ab<em>xy</em></p>");
}

#[test]
fn moving_the_caret_drops_pending_toggles() {
    let mut editor = editor_with(vec![FragmentNode::paragraph("ab")]);
    let ab = text_node(&editor, "ab");
    caret(&mut editor, ab, 2);

    editor.toggle_inline("strong").unwrap();
    assert!(editor.is_active("strong"));

    caret(&mut editor, ab, 2);
    assert!(!editor.is_active("strong"));

    editor.insert_text("x").unwrap();
    assert_eq!(editor.markup(), "<p>abx</p>");
}

#[test]
fn a_suppress_token_is_honoured_once() {
    let mut editor = editor_with(vec![FragmentNode::paragraph("ab")]);
    let update = editor.toggle_inline("strong").unwrap().unwrap();

    editor.on_caret_change(CaretEvent::restored(&update)).unwrap();
    assert!(editor.is_active("strong"));

    editor.on_caret_change(CaretEvent::restored(&update)).unwrap();
    assert!(!editor.is_active("strong"));
}

#[test]
fn toggling_twice_at_the_caret_cancels_out() {
    let mut editor = editor_with(vec![FragmentNode::paragraph("ab")]);

    editor.toggle_inline("em").unwrap();
    editor.toggle_inline("em").unwrap();
    assert!(!editor.is_active("em"));
    assert!(editor.active_tags().is_empty());
}

#[test]
fn toggle_over_a_selection_restores_it_around_the_result() {
    let mut editor = editor_with(vec![FragmentNode::paragraph("hello world")]);
    let t = text_node(&editor, "hello world");
    select(&mut editor, t, 0, 5);

    let update = editor.toggle_inline("b").unwrap().unwrap();
    assert_eq!(editor.markup(), "<p><strong>hello</strong> world</p>");
    assert!(editor.is_active("strong"));

    editor.on_caret_change(CaretEvent::restored(&update)).unwrap();
    editor.toggle_inline("strong").unwrap();
    assert_eq!(editor.markup(), "<p>hello world</p>");
}

#[test]
fn toggle_without_selection_is_a_no_op() {
    init_tracing();
    let mut editor = Editor::default();

    assert_eq!(editor.toggle_inline("strong").unwrap(), None);
    assert_eq!(editor.insert_text("x").unwrap(), None);
    assert_eq!(editor.markup(), "");
}

#[test]
fn block_tags_are_not_toggled_inline() {
    let mut editor = editor_with(vec![FragmentNode::paragraph("abc")]);
    let t = text_node(&editor, "abc");
    select(&mut editor, t, 0, 3);

    assert_eq!(editor.toggle_inline("blockquote").unwrap(), None);
    assert_eq!(editor.markup(), "<p>abc</p>");
}

#[test]
fn typing_replaces_the_selection() {
    let mut editor = editor_with(vec![FragmentNode::paragraph("hello")]);
    let t = text_node(&editor, "hello");
    select(&mut editor, t, 1, 4);

    editor.insert_text("X").unwrap();
    assert_eq!(editor.markup(), "<p>hXo</p>");
}

fn three_paragraphs() -> Editor {
    editor_with(vec![
        FragmentNode::paragraph("zero"),
        FragmentNode::paragraph("abc"),
        FragmentNode::paragraph("def"),
    ])
}

fn span(editor: &mut Editor, anchor: Point, focus: Point) {
    editor
        .set_selection(Some(Selection { anchor, focus }))
        .unwrap();
}

#[test]
fn typing_over_a_multi_block_selection_continues_the_following_block() {
    let mut editor = three_paragraphs();
    let abc = text_node(&editor, "abc");
    let def = text_node(&editor, "def");
    span(&mut editor, Point::new(abc, 0), Point::new(def, 1));

    editor.insert_text("X").unwrap();
    assert_eq!(editor.markup(), "<p>zero</p><p>Xef</p>");
}

#[test]
fn typing_over_trailing_blocks_opens_a_fresh_paragraph() {
    let mut editor = three_paragraphs();
    let abc = text_node(&editor, "abc");
    let def = text_node(&editor, "def");
    span(&mut editor, Point::new(abc, 0), Point::new(def, 3));

    editor.insert_text("X").unwrap();
    assert_eq!(editor.markup(), "<p>zero</p><p>X</p>");
}

#[test]
fn pasting_over_a_multi_block_selection_continues_the_following_block() {
    let mut editor = three_paragraphs();
    let abc = text_node(&editor, "abc");
    let def = text_node(&editor, "def");
    span(&mut editor, Point::new(abc, 0), Point::new(def, 1));

    editor.paste(&[FragmentNode::text("Y")]).unwrap();
    assert_eq!(editor.markup(), "<p>zero</p><p>Yef</p>");
}

#[test]
fn stray_list_items_load_as_paragraphs() {
    let mut editor = editor_with(vec![FragmentNode::element(
        "b",
        vec![FragmentNode::element("li", vec![FragmentNode::text("xy")])],
    )]);
    assert_eq!(editor.markup(), "<p>xy</p>");

    let t = text_node(&editor, "xy");
    select(&mut editor, t, 0, 1);
    editor.toggle_inline("strong").unwrap();
    assert_eq!(editor.markup(), "<p><strong>x</strong>y</p>");
}

#[test]
fn typing_into_an_empty_document_opens_a_paragraph() {
    let mut editor = editor_with(Vec::new());

    editor.insert_text("a").unwrap();
    editor.insert_text("b").unwrap();
    assert_eq!(editor.markup(), "<p>ab</p>");
}

#[test]
fn shortcuts_run_the_toggle_command() {
    let mut editor = editor_with(vec![FragmentNode::paragraph("hello world")]);
    let t = text_node(&editor, "hello world");
    select(&mut editor, t, 6, 11);

    let outcome = editor.on_key(&KeyStroke::new("i").meta()).unwrap();
    assert!(matches!(outcome, KeyOutcome::Handled(Some(_))));
    assert_eq!(editor.markup(), "<p>hello <em>world</em></p>");

    let outcome = editor.on_key(&KeyStroke::new("F5")).unwrap();
    assert_eq!(outcome, KeyOutcome::Ignored);
}

#[test]
fn default_shortcuts_can_be_disabled() {
    init_tracing();
    let config = EditorConfig {
        bind_default_shortcuts: false,
        ..EditorConfig::default()
    };
    let mut editor = Editor::new(config);
    editor.load(&[FragmentNode::paragraph("abc")]);
    let t = text_node(&editor, "abc");
    select(&mut editor, t, 0, 3);

    let outcome = editor.on_key(&KeyStroke::new("b").ctrl()).unwrap();
    assert_eq!(outcome, KeyOutcome::Ignored);
    assert_eq!(editor.markup(), "<p>abc</p>");
}

#[test]
fn commands_and_queries_go_through_the_registry() {
    let mut editor = editor_with(vec![FragmentNode::paragraph("abc")]);
    let t = text_node(&editor, "abc");
    select(&mut editor, t, 0, 2);

    editor
        .run_command("inline.toggle", Some(json!({ "tag": "mark" })))
        .unwrap();
    assert_eq!(editor.markup(), "<p><mark>ab</mark>c</p>");
    assert!(editor.take_selection_update().is_some());

    assert_eq!(
        editor
            .run_query::<bool>("inline.is_active", Some(json!({ "tag": "mark" })))
            .unwrap(),
        true
    );
    assert_eq!(
        editor
            .run_query::<Vec<String>>("inline.active_tags", None)
            .unwrap(),
        vec!["mark".to_string()]
    );

    let err = editor.run_command("inline.toggle", None).unwrap_err();
    assert_eq!(err.message(), "Missing args.tag");
    let err = editor.run_command("nope", None).unwrap_err();
    assert_eq!(err.message(), "Unknown command: nope");
    let err = editor.run_query_json("nope", None).unwrap_err();
    assert_eq!(err.message(), "Unknown query: nope");
}

#[test]
fn paste_of_inline_content_flows_into_the_paragraph() {
    let mut editor = editor_with(vec![FragmentNode::paragraph("ad")]);
    let t = text_node(&editor, "ad");
    caret(&mut editor, t, 1);

    editor
        .paste(&[
            FragmentNode::element("span", vec![FragmentNode::text("b")]),
            FragmentNode::element("b", vec![FragmentNode::text("c")]),
        ])
        .unwrap();

    assert_eq!(editor.markup(), "<p>ab<strong>c</strong>d</p>");
    assert!(editor.is_active("strong"));
}

#[test]
fn paste_of_blocks_splits_the_paragraph() {
    let mut editor = editor_with(vec![FragmentNode::paragraph("ad")]);
    let t = text_node(&editor, "ad");
    caret(&mut editor, t, 1);

    editor
        .paste(&[
            FragmentNode::element("h1", vec![FragmentNode::text("T")]),
            FragmentNode::paragraph("x"),
        ])
        .unwrap();

    assert_eq!(editor.markup(), "<p>a</p><h1>T</h1><p>x</p><p>d</p>");
    let x = text_node(&editor, "x");
    assert_eq!(
        editor.selection(),
        Some(&Selection::collapsed(Point::new(x, 1)))
    );
}

#[test]
fn paste_inside_a_list_item_nests_lists() {
    let mut editor = editor_with(vec![FragmentNode::element(
        "ul",
        vec![FragmentNode::element("li", vec![FragmentNode::text("ab")])],
    )]);
    let t = text_node(&editor, "ab");
    caret(&mut editor, t, 1);

    editor
        .paste(&[
            FragmentNode::paragraph("x"),
            FragmentNode::element(
                "ul",
                vec![FragmentNode::element("li", vec![FragmentNode::text("y")])],
            ),
        ])
        .unwrap();

    assert_eq!(editor.markup(), "<ul><li>ax<ul><li>y</li></ul>b</li></ul>");
}

#[test]
fn paste_command_sanitizes_links() {
    let mut editor = editor_with(vec![FragmentNode::paragraph("a")]);
    let t = text_node(&editor, "a");
    caret(&mut editor, t, 1);

    editor
        .run_command(
            "content.paste",
            Some(json!({
                "fragment": [
                    { "node": "element", "tag": "a", "attrs": { "href": "javascript:void(0)" },
                      "children": [{ "node": "text", "text": "b" }] }
                ]
            })),
        )
        .unwrap();

    assert_eq!(editor.markup(), "<p>a<a>b</a></p>");
}

#[test]
fn value_json_round_trips_through_the_scrubber() -> anyhow::Result<()> {
    init_tracing();
    let mut editor = Editor::default();
    editor.load_value_json(
        r#"{ "fragment": [
            { "node": "element", "tag": "div", "children": [{ "node": "text", "text": "hi" }] }
        ] }"#,
    )?;
    assert_eq!(editor.markup(), "<p>hi</p>");

    let value = editor.to_value();
    assert_eq!(value.schema, "plate-markup");
    assert_eq!(value.version, 1);
    assert_eq!(value.fragment, vec![FragmentNode::paragraph("hi")]);

    let queried = editor.run_query_json("content.value", None)?;
    assert_eq!(queried["fragment"][0]["tag"], "p");

    let err = editor.load_value_json("{ not json").unwrap_err();
    assert!(matches!(err, EditorError::Value(_)));
    Ok(())
}

#[test]
fn config_from_json_validates_the_default_leaf() {
    let err = EditorConfig::from_json(r#"{ "default_leaf": "div" }"#).unwrap_err();
    assert!(matches!(err, PolicyError::DefaultLeafNotAllowed(_)));

    let config = EditorConfig::from_json(
        r#"{
            "policy": { "leaf": { "p": {}, "h1": {} }, "child": { "em": {} } },
            "bind_default_shortcuts": false
        }"#,
    )
    .unwrap();
    assert_eq!(config.default_leaf, Tag::P);

    let mut editor = Editor::new(config);
    editor.load(&[FragmentNode::element(
        "p",
        vec![
            FragmentNode::element("strong", vec![FragmentNode::text("a")]),
            FragmentNode::element("em", vec![FragmentNode::text("b")]),
        ],
    )]);
    assert_eq!(editor.markup(), "<p>a<em>b</em></p>");

    let policy = editor.run_query_json("content.policy", None).unwrap();
    assert!(policy["leaf"].get("h1").is_some());
}

#[test]
fn selections_on_detached_nodes_are_rejected() {
    let mut editor = editor_with(vec![FragmentNode::paragraph("a")]);
    let loose = editor.tree_mut().create_text("z");

    let err = editor
        .set_selection(Some(Selection::collapsed(Point::new(loose, 0))))
        .unwrap_err();
    assert!(matches!(err, EditorError::Tree(TreeError::Detached(id)) if id == loose));
}
