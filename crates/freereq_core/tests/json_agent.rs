use freereq_core::{
    AgentError, JsonFileAgent, NodeId, ReqAgent, ReqMeta, ReqNode, ReqObserver, ReqTree,
    SavePolicy,
};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::rc::Rc;

#[derive(Clone, Default)]
struct Recorder(Rc<RefCell<Vec<String>>>);

impl Recorder {
    fn events(&self) -> Vec<String> {
        self.0.borrow().clone()
    }
}

impl ReqObserver for Recorder {
    fn on_meta_data_changed(&mut self, req_name: &str) {
        self.0.borrow_mut().push(format!("meta:{req_name}"));
    }

    fn on_node_data_changed(&mut self, req_name: &str, tree: &ReqTree, node: NodeId) {
        let title = tree.title(node).unwrap_or_default();
        self.0.borrow_mut().push(format!("data:{req_name}:{title}"));
    }

    fn on_node_child_changed(&mut self, req_name: &str, tree: &ReqTree, node: NodeId) {
        let count = tree.child_count(node);
        self.0.borrow_mut().push(format!("child:{req_name}:{count}"));
    }

    fn on_req_saved(&mut self, path: &Path) {
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        self.0.borrow_mut().push(format!("saved:{name}"));
    }
}

fn append(agent: &mut JsonFileAgent, parent: NodeId, title: &str) -> NodeId {
    let tree = agent.document_mut().unwrap().tree_mut();
    let node = tree.create_node(ReqNode::titled(title));
    tree.append_child(parent, node).unwrap();
    node
}

#[test]
fn saved_document_reopens_with_same_content() {
    let dir = tempfile::tempdir().unwrap();
    let mut agent = JsonFileAgent::new(dir.path());
    agent.try_new_document("Spec", false).unwrap();

    let root = agent.get_root().unwrap();
    let intro = append(&mut agent, root, "Intro");
    agent
        .document_mut()
        .unwrap()
        .tree_mut()
        .node_mut(intro)
        .unwrap()
        .set_content("hello");
    assert!(agent.inform_node_child_updated(root));
    let intro_uuid = agent.document().unwrap().tree().uuid(intro).unwrap().to_string();

    let raw: Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("Spec.req")).unwrap()).unwrap();
    assert_eq!(raw["req_meta"], json!({}));
    assert_eq!(raw["req_data"]["title"], json!("Spec"));
    assert_eq!(raw["req_data"]["child"][0]["content"], json!("hello"));

    let mut reopened = JsonFileAgent::new(dir.path());
    reopened.try_open_document("Spec").unwrap();
    let document = reopened.document().unwrap();
    let tree = document.tree();
    let first = tree.child(tree.root(), 0).unwrap();
    assert_eq!(tree.title(tree.root()), Some("Spec"));
    assert_eq!(tree.title(first), Some("Intro"));
    assert_eq!(tree.node(first).unwrap().content(), "hello");
    assert_eq!(tree.uuid(first), Some(intro_uuid.as_str()));
    assert_eq!(document.get_node(&intro_uuid), Some(first));
    assert_eq!(reopened.list_documents(), vec!["Spec".to_string()]);
}

#[test]
fn deleting_a_subtree_drops_its_uuids_from_the_index() {
    let dir = tempfile::tempdir().unwrap();
    let mut agent = JsonFileAgent::new(dir.path());
    agent.try_new_document("Spec", false).unwrap();
    let root = agent.get_root().unwrap();

    let mut middle = None;
    let mut removed_uuids = Vec::new();
    for title in ["A", "B", "C"] {
        let top = append(&mut agent, root, title);
        for suffix in ["1", "2"] {
            let child = append(&mut agent, top, &format!("{title}{suffix}"));
            if title == "B" {
                let uuid = agent.document().unwrap().tree().uuid(child).unwrap();
                removed_uuids.push(uuid.to_string());
            }
        }
        if title == "B" {
            let uuid = agent.document().unwrap().tree().uuid(top).unwrap();
            removed_uuids.push(uuid.to_string());
            middle = Some(top);
        }
    }
    assert!(agent.inform_node_child_updated(root));
    assert_eq!(agent.document().unwrap().indexed_len(), 10);

    let middle = middle.unwrap();
    assert!(agent
        .document_mut()
        .unwrap()
        .tree_mut()
        .remove_child(root, middle));
    assert!(agent.inform_node_child_updated(root));

    let document = agent.document().unwrap();
    assert_eq!(document.indexed_len(), 7);
    for uuid in &removed_uuids {
        assert!(document.get_node(uuid).is_none(), "{uuid}");
    }

    let mut reopened = JsonFileAgent::new(dir.path());
    reopened.try_open_document("Spec").unwrap();
    let document = reopened.document().unwrap();
    assert_eq!(document.indexed_len(), 7);
    let titles: Vec<&str> = document
        .tree()
        .children(document.get_root())
        .iter()
        .filter_map(|id| document.tree().title(*id))
        .collect();
    assert_eq!(titles, vec!["A", "C"]);
}

#[test]
fn failed_open_keeps_previous_document() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("Broken.req"), "{ not json").unwrap();
    fs::write(dir.path().join("Shape.req"), r#"{"req_data": {"child": 3}}"#).unwrap();
    let mut agent = JsonFileAgent::new(dir.path());
    agent.try_new_document("Spec", false).unwrap();

    let err = agent.try_open_document("Broken").unwrap_err();
    assert!(matches!(err, AgentError::Json { .. }));
    let err = agent.try_open_document("Shape").unwrap_err();
    assert!(matches!(err, AgentError::Malformed { .. }));
    let err = agent.try_open_document("Missing").unwrap_err();
    assert!(matches!(err, AgentError::DocumentNotFound(_)));
    assert!(!agent.open_document("Missing"));

    assert_eq!(agent.document().unwrap().name(), "Spec");
    assert_eq!(
        agent.list_documents(),
        vec!["Broken".to_string(), "Shape".to_string(), "Spec".to_string()]
    );
}

#[test]
fn new_document_respects_overwrite_flag() {
    let dir = tempfile::tempdir().unwrap();
    let mut agent = JsonFileAgent::new(dir.path());
    agent.try_new_document("Spec", false).unwrap();
    let root = agent.get_root().unwrap();
    append(&mut agent, root, "Intro");
    assert!(agent.inform_node_child_updated(root));

    let err = agent.try_new_document("Spec", false).unwrap_err();
    assert!(matches!(err, AgentError::DocumentExists(_)));
    assert_eq!(agent.document().unwrap().tree().child_count(root), 1);

    agent.try_new_document("Spec", true).unwrap();
    let document = agent.document().unwrap();
    assert_eq!(document.tree().child_count(document.get_root()), 0);

    let mut reopened = JsonFileAgent::new(dir.path());
    reopened.try_open_document("Spec").unwrap();
    assert_eq!(reopened.document().unwrap().indexed_len(), 1);
}

#[test]
fn deferred_policy_notifies_without_saving_until_flush() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Recorder::default();
    let mut agent = JsonFileAgent::new(dir.path()).with_save_policy(SavePolicy::Deferred);
    agent.observers_mut().add(Box::new(recorder.clone()));
    agent.try_new_document("Spec", false).unwrap();
    let path = dir.path().join("Spec.req");
    let on_disk = fs::read_to_string(&path).unwrap();

    let root = agent.get_root().unwrap();
    let intro = append(&mut agent, root, "Intro");
    assert!(agent.inform_node_child_updated(root));
    assert!(agent.inform_node_data_updated(intro));

    assert!(agent.document().unwrap().is_dirty());
    assert_eq!(fs::read_to_string(&path).unwrap(), on_disk);
    assert_eq!(
        recorder.events(),
        vec!["saved:Spec.req", "child:Spec:1", "data:Spec:Intro"]
    );

    assert!(agent.flush());
    assert!(!agent.document().unwrap().is_dirty());
    assert_ne!(fs::read_to_string(&path).unwrap(), on_disk);
    assert_eq!(recorder.events().last().map(String::as_str), Some("saved:Spec.req"));
}

#[test]
fn deferred_edits_are_saved_before_switching_documents() {
    let dir = tempfile::tempdir().unwrap();
    let mut agent = JsonFileAgent::new(dir.path()).with_save_policy(SavePolicy::Deferred);
    agent.try_new_document("B", false).unwrap();
    agent.try_new_document("A", false).unwrap();

    let root = agent.get_root().unwrap();
    append(&mut agent, root, "Unsaved");
    assert!(agent.inform_node_child_updated(root));
    assert!(agent.document().unwrap().is_dirty());

    agent.try_open_document("B").unwrap();
    assert_eq!(agent.document().unwrap().name(), "B");

    let mut reopened = JsonFileAgent::new(dir.path());
    reopened.try_open_document("A").unwrap();
    let document = reopened.document().unwrap();
    let children = document.tree().children(document.get_root());
    assert_eq!(children.len(), 1);
    assert_eq!(document.tree().title(children[0]), Some("Unsaved"));
}

#[test]
fn failed_save_keeps_tree_and_refuses_switch() {
    let dir = tempfile::tempdir().unwrap();
    let depot = dir.path().join("depot");
    let mut agent = JsonFileAgent::new(&depot);
    agent.try_new_document("Spec", false).unwrap();

    fs::remove_dir_all(&depot).unwrap();
    fs::write(&depot, "not a directory").unwrap();

    let root = agent.get_root().unwrap();
    append(&mut agent, root, "Intro");
    assert!(!agent.inform_node_child_updated(root));

    let document = agent.document().unwrap();
    assert_eq!(document.tree().child_count(root), 1);
    assert!(document.is_dirty());

    let err = agent.try_new_document("Other", false).unwrap_err();
    assert!(matches!(err, AgentError::Io { .. }));
    let document = agent.document().unwrap();
    assert_eq!(document.name(), "Spec");
    assert_eq!(document.tree().child_count(root), 1);
}

#[test]
fn set_meta_persists_even_when_deferred() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Recorder::default();
    let mut agent = JsonFileAgent::new(dir.path()).with_save_policy(SavePolicy::Deferred);
    agent.observers_mut().add(Box::new(recorder.clone()));
    assert!(!agent.set_meta(ReqMeta::new()));

    agent.try_new_document("Spec", false).unwrap();
    let mut meta = ReqMeta::new();
    meta.insert("id_prefix".to_string(), json!(["WHY", "HOW"]));
    agent.try_set_meta(meta).unwrap();
    assert!(recorder.events().contains(&"meta:Spec".to_string()));

    let mut reopened = JsonFileAgent::new(dir.path());
    reopened.try_open_document("Spec").unwrap();
    assert_eq!(
        reopened.document().unwrap().id_prefixes(),
        vec!["WHY".to_string(), "HOW".to_string()]
    );
    assert_eq!(reopened.get_meta().unwrap().len(), 1);
}
