use freereq_core::model::node::FIELD_CHILD;
use freereq_core::{AttributeError, NodeId, ReqNode, ReqTree, TreeError};
use serde_json::{json, Value};
use std::collections::HashSet;

fn build(titles: &[(&str, &[&str])]) -> (ReqTree, Vec<NodeId>) {
    let mut tree = ReqTree::with_root_title("Spec");
    let root = tree.root();
    let mut top = Vec::new();
    for (title, children) in titles {
        let node = tree.create_node(ReqNode::titled(*title));
        tree.append_child(root, node).unwrap();
        for child in *children {
            let child = tree.create_node(ReqNode::titled(*child));
            tree.append_child(node, child).unwrap();
        }
        top.push(node);
    }
    (tree, top)
}

fn assert_orders_match_positions(tree: &ReqTree) {
    for id in tree.preorder(tree.root()) {
        for (index, child) in tree.children(id).iter().enumerate() {
            assert_eq!(tree.order(*child), Some(index));
            assert_eq!(tree.parent(*child), Some(id));
        }
    }
}

#[test]
fn dict_roundtrip_preserves_structure_and_identity() {
    let (mut tree, top) = build(&[("Intro", &["Scope", "Terms"]), ("Login", &[])]);
    tree.set(top[1], "priority", 2).unwrap();
    tree.node_mut(top[0]).unwrap().set_content("hello");

    let dict = tree.to_dict(tree.root()).unwrap();
    let restored = ReqTree::from_dict(&dict).unwrap();

    assert_eq!(restored.to_dict(restored.root()).unwrap(), dict);
    assert_eq!(restored.node_count(), 5);
    let intro = restored.child(restored.root(), 0).unwrap();
    assert_eq!(restored.node(intro).unwrap().content(), "hello");
    assert_eq!(restored.uuid(intro), tree.uuid(top[0]));
}

#[test]
fn persisted_nodes_carry_child_arrays_only_in_dict_form() {
    let (tree, top) = build(&[("Intro", &["Scope"])]);
    assert!(tree.node(top[0]).unwrap().attribute(FIELD_CHILD).is_none());

    let dict = tree.to_dict(top[0]).unwrap();
    let children = dict.get(FIELD_CHILD).and_then(Value::as_array).unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0][FIELD_CHILD], json!([]));
}

#[test]
fn order_tracks_every_structural_edit() {
    let (mut tree, top) = build(&[("A", &["A1", "A2"]), ("B", &[]), ("C", &["C1"])]);
    let root = tree.root();
    assert_orders_match_positions(&tree);

    assert!(tree.move_down(top[0]));
    assert_orders_match_positions(&tree);

    let a2 = tree.child(top[0], 1).unwrap();
    tree.insert_children(top[2], &[a2], 0).unwrap();
    assert_orders_match_positions(&tree);

    assert!(tree.remove_child(root, top[1]));
    assert_orders_match_positions(&tree);
    assert_eq!(tree.order(root), Some(0));
}

#[test]
fn insert_sibling_right_reparents_from_other_subtree() {
    let (mut tree, top) = build(&[("A", &["A1"]), ("B", &["B1", "B2"])]);
    let a1 = tree.child(top[0], 0).unwrap();
    let b1 = tree.child(top[1], 0).unwrap();

    let pos = tree.insert_sibling_right(b1, a1).unwrap();

    assert_eq!(pos, 1);
    assert_eq!(tree.parent(a1), Some(top[1]));
    assert!(tree.children(top[0]).is_empty());
    assert_eq!(tree.children(top[1])[1], a1);
    assert_eq!(tree.child_count(top[1]), 3);
    assert_orders_match_positions(&tree);
}

#[test]
fn reserved_and_identity_keys_are_protected() {
    let (mut tree, top) = build(&[("A", &[])]);
    let before = tree.node(top[0]).unwrap().clone();

    let err = tree.set(top[0], FIELD_CHILD, json!([])).unwrap_err();
    assert!(matches!(
        err,
        TreeError::Attribute(AttributeError::ReservedKey(_))
    ));
    let err = tree.set(top[0], "uuid", "forged").unwrap_err();
    assert!(matches!(
        err,
        TreeError::Attribute(AttributeError::ImmutableKey(_))
    ));
    assert_eq!(tree.node(top[0]).unwrap(), &before);
}

#[test]
fn uuids_stay_unique_after_import_of_existing_subtree() {
    let (mut tree, top) = build(&[("A", &["A1", "A2"])]);
    let copy = tree.to_dict(top[0]).unwrap();

    let imported = tree.import_dict(&copy).unwrap();
    tree.append_child(tree.root(), imported).unwrap();

    let uuids: Vec<String> = tree
        .preorder(tree.root())
        .into_iter()
        .filter_map(|id| tree.uuid(id).map(str::to_string))
        .collect();
    let unique: HashSet<&String> = uuids.iter().collect();
    assert_eq!(uuids.len(), 7);
    assert_eq!(unique.len(), uuids.len());
}

#[test]
fn cycles_are_rejected_without_mutation() {
    let (mut tree, top) = build(&[("A", &["A1"])]);
    let a1 = tree.child(top[0], 0).unwrap();
    let before = tree.to_dict(tree.root()).unwrap();

    let err = tree.append_child(a1, top[0]).unwrap_err();
    assert!(matches!(err, TreeError::CycleDetected { .. }));
    assert_eq!(tree.to_dict(tree.root()).unwrap(), before);
}
