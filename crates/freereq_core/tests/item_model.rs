use freereq_core::{ItemRole, ModelIndex, ModelObserver, ReqModel, ReqNode, ReqTree};
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

#[derive(Clone, Default)]
struct Recorder(Rc<RefCell<Vec<String>>>);

impl Recorder {
    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.borrow_mut())
    }

    fn push(&self, event: String) {
        self.0.borrow_mut().push(event);
    }
}

fn describe(parent: Option<ModelIndex>) -> String {
    parent
        .map(|index| format!("row{}", index.row))
        .unwrap_or_else(|| "root".to_string())
}

impl ModelObserver for Recorder {
    fn layout_about_to_be_changed(&mut self) {
        self.push("layout_begin".to_string());
    }

    fn layout_changed(&mut self) {
        self.push("layout_end".to_string());
    }

    fn rows_about_to_be_inserted(&mut self, parent: Option<ModelIndex>, first: usize, last: usize) {
        self.push(format!("insert_begin:{}:{first}-{last}", describe(parent)));
    }

    fn rows_inserted(&mut self, parent: Option<ModelIndex>, first: usize, last: usize) {
        self.push(format!("insert_end:{}:{first}-{last}", describe(parent)));
    }

    fn rows_about_to_be_removed(&mut self, parent: Option<ModelIndex>, first: usize, last: usize) {
        self.push(format!("remove_begin:{}:{first}-{last}", describe(parent)));
    }

    fn rows_removed(&mut self, parent: Option<ModelIndex>, first: usize, last: usize) {
        self.push(format!("remove_end:{}:{first}-{last}", describe(parent)));
    }

    fn data_changed(&mut self, index: ModelIndex) {
        self.push(format!("data:row{}", index.row));
    }

    fn model_about_to_be_reset(&mut self) {
        self.push("reset_begin".to_string());
    }

    fn model_reset(&mut self) {
        self.push("reset_end".to_string());
    }
}

fn tree_with_top_level(count: usize) -> ReqTree {
    let mut tree = ReqTree::with_root_title("Spec");
    let root = tree.root();
    for row in 0..count {
        let node = tree.create_node(ReqNode::titled(format!("Top {row}")));
        tree.append_child(root, node).unwrap();
    }
    tree
}

#[test]
fn appending_rows_creates_exactly_count_unique_nodes() {
    let mut tree = tree_with_top_level(2);
    let recorder = Recorder::default();
    let mut model = ReqModel::new();
    model.add_observer(Box::new(recorder.clone()));

    let parent = model.index(&tree, 1, 0, None).unwrap();
    model.insert_rows(&mut tree, -1, 2, Some(&parent)).unwrap();
    recorder.take();
    let before = tree.node_count();

    let nodes = model.insert_rows(&mut tree, -1, 5, Some(&parent)).unwrap();

    assert_eq!(nodes.len(), 5);
    assert_eq!(tree.node_count(), before + 5);
    assert_eq!(model.row_count(&tree, Some(&parent)), 7);
    assert_eq!(&tree.children(parent.node)[2..], nodes.as_slice());
    let uuids: HashSet<&str> = tree
        .preorder(tree.root())
        .into_iter()
        .filter_map(|id| tree.uuid(id))
        .collect();
    assert_eq!(uuids.len(), tree.node_count());
    assert_eq!(
        recorder.take(),
        vec!["insert_begin:row1:2-6", "insert_end:row1:2-6"]
    );
}

#[test]
fn insert_rows_at_explicit_row_shifts_following_siblings() {
    let mut tree = tree_with_top_level(3);
    let recorder = Recorder::default();
    let mut model = ReqModel::new();
    model.add_observer(Box::new(recorder.clone()));
    let old_second = model.index(&tree, 1, 0, None).unwrap();

    let nodes = model.insert_rows(&mut tree, 1, 2, None).unwrap();

    assert_eq!(model.index_of(&tree, nodes[0]).unwrap().row, 1);
    assert_eq!(model.index_of(&tree, nodes[1]).unwrap().row, 2);
    assert_eq!(model.index_of(&tree, old_second.node).unwrap().row, 3);
    assert_eq!(
        recorder.take(),
        vec!["insert_begin:root:1-2", "insert_end:root:1-2"]
    );
}

#[test]
fn remove_rows_notifies_range_and_frees_subtrees() {
    let mut tree = tree_with_top_level(4);
    let recorder = Recorder::default();
    let mut model = ReqModel::new();
    model.add_observer(Box::new(recorder.clone()));
    let second = model.index(&tree, 1, 0, None).unwrap();
    let nested = model.insert_rows(&mut tree, -1, 3, Some(&second)).unwrap();
    recorder.take();

    assert!(model.remove_rows(&mut tree, 1, 2, None));

    assert_eq!(model.row_count(&tree, None), 2);
    assert!(nested.iter().all(|node| !tree.contains(*node)));
    assert_eq!(
        recorder.take(),
        vec!["remove_begin:root:1-2", "remove_end:root:1-2"]
    );
    assert!(!model.remove_rows(&mut tree, 1, 5, None));
    assert!(recorder.take().is_empty());
}

#[test]
fn moves_and_edits_are_bracketed() {
    let mut tree = tree_with_top_level(2);
    let recorder = Recorder::default();
    let mut model = ReqModel::new();
    model.add_observer(Box::new(recorder.clone()));
    let first = model.index(&tree, 0, 0, None).unwrap();

    let moved = model.move_row_down(&mut tree, &first).unwrap();
    assert_eq!(moved.row, 1);
    assert!(model.move_row_down(&mut tree, &moved).is_none());
    assert!(model.set_data(&mut tree, &moved, "Renamed", ItemRole::Edit));
    assert!(!model.set_data(&mut tree, &moved, "ignored", ItemRole::Uuid));
    model.reset(|| ());

    assert_eq!(
        model.data(&tree, &moved, ItemRole::Display).as_deref(),
        Some("Renamed")
    );
    assert_eq!(
        recorder.take(),
        vec![
            "layout_begin",
            "layout_end",
            "layout_begin",
            "layout_end",
            "data:row1",
            "reset_begin",
            "reset_end",
        ]
    );
}

#[test]
fn parent_of_nested_index_points_back_to_its_row() {
    let mut tree = tree_with_top_level(3);
    let mut model = ReqModel::new();
    let third = model.index(&tree, 2, 0, None).unwrap();
    let nodes = model.insert_rows(&mut tree, -1, 1, Some(&third)).unwrap();

    let child = model.index(&tree, 0, 0, Some(&third)).unwrap();
    assert_eq!(child.node, nodes[0]);
    assert_eq!(model.parent(&tree, &child), Some(third));
    assert_eq!(model.parent(&tree, &third), None);
    assert!(model.index(&tree, 0, 1, Some(&third)).is_none());
    assert!(model.index_of(&tree, tree.root()).is_none());
}
