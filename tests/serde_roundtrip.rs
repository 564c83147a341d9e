use branch_canvas::{
    CompletionChunk, Conversation, ConversationEngine, ConversationId, ManualClock, NodeDraft,
    NodePatch, Settings,
};
use egui::Pos2;
use serde_json::json;

fn sample() -> Conversation {
    let mut engine = ConversationEngine::new(Conversation::new(ConversationId::new("c1")))
        .with_clock(ManualClock::new())
        .with_seed(3);
    let root = engine.create_root(Pos2::new(10.0, 20.0));
    engine.update_content(&root, NodePatch::content("Hi").with_editing(false));
    let reply = engine
        .add_child(
            &root,
            None,
            Some(
                NodeDraft::assistant("Hello")
                    .with_model("m-1")
                    .with_provider("local"),
            ),
        )
        .unwrap();
    engine.update_content(
        &reply,
        NodePatch::default()
            .with_thinking("hmm")
            .with_thinking_time(1.5),
    );
    engine.move_node(&reply, Pos2::new(500.0, 200.0));
    engine.rename("Greetings");
    engine.conversation().clone()
}

#[test]
fn test_serialize_deserialize_conversation() {
    let conv = sample();
    let json = serde_json::to_string(&conv).expect("serialize conversation");
    let conv2: Conversation = serde_json::from_str(&json).expect("deserialize conversation");
    assert_eq!(conv2, conv);
    branch_canvas::check_invariants(&conv2).unwrap();
}

#[test]
fn test_node_schema() {
    let conv = sample();
    let value = serde_json::to_value(&conv).unwrap();
    let nodes = value["nodes"].as_object().unwrap();
    assert_eq!(nodes.len(), 2);

    let reply = nodes
        .values()
        .find(|n| n["role"] == "assistant")
        .expect("assistant node");
    assert_eq!(reply["content"], "Hello");
    assert_eq!(reply["x"], 500.0);
    assert_eq!(reply["y"], 200.0);
    assert_eq!(reply["pinned"], true);
    assert_eq!(reply["thinking"], "hmm");
    assert_eq!(reply["thinkingTimeSeconds"], 1.5);
    assert_eq!(reply["model"], "m-1");
    assert_eq!(reply["providerId"], "local");
    assert!(reply["parentId"].is_string());
    assert_eq!(reply["childIds"], json!([]));
    assert!(reply.get("editing").is_none());

    let root = nodes.values().find(|n| n["role"] == "user").unwrap();
    assert!(root.get("parentId").is_none());
    assert_eq!(root["childIds"], json!([reply["id"]]));
    assert_eq!(value["title"], "Greetings");
    assert!(value["lastModified"].as_i64().unwrap() > 0);
}

#[test]
fn test_minimal_node_defaults() {
    let conv: Conversation = serde_json::from_value(json!({
        "id": "c",
        "title": "t",
        "nodes": {
            "a": {"id": "a", "content": "x", "role": "user", "x": 1.0, "y": 2.0}
        }
    }))
    .unwrap();
    let node = conv.node(&"a".into()).unwrap();
    assert!(!node.pinned());
    assert!(!node.editing());
    assert!(node.child_ids().is_empty());
    assert_eq!(node.location(), Pos2::new(1.0, 2.0));
}

#[test]
fn test_chunk_contract() {
    let chunk: CompletionChunk = serde_json::from_value(json!({
        "cumulativeContent": "Hel",
        "thinking": "...",
        "thinkingTimeSeconds": 0.4,
        "isThinking": true,
        "isComplete": false
    }))
    .unwrap();
    assert_eq!(chunk.cumulative_content, "Hel");
    assert!(chunk.is_thinking);
    assert!(chunk.error.is_none());

    let done = serde_json::to_value(CompletionChunk::failed("", "quota")).unwrap();
    assert_eq!(done["isComplete"], true);
    assert_eq!(done["error"], "quota");
}

#[test]
fn test_settings_roundtrip() {
    let settings = Settings::default();
    let json = serde_json::to_string(&settings).unwrap();
    assert_eq!(Settings::from_json(&json).unwrap(), settings);
    assert_eq!(Settings::from_json("{}").unwrap(), settings);
}
