//! SQLite-backed flows: persistence across reopen and concurrent writers
//! on separate connections to one database file.
//!
//! Run with: `cargo test --test sqlite_persistence`

mod common;

use common::{owner, request, sqlite_api, SEO_THREAD};
use lexigraph::{ClusterType, Config, KnowledgeApi, NodeFilter, NodeType, TaskId};
use tempfile::TempDir;
use tokio::task::JoinSet;

const CATALOGUE: &str = r#"
domains:
  - id: d-marketing
    name: Marketing
fields:
  - id: f-search
    domain_id: d-marketing
    name: Search
entries:
  - id: e-seo
    field_id: f-search
    label: SEO
"#;

#[tokio::test]
async fn graph_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("graph.db");
    let owner = owner();
    let task = TaskId::from("launch");

    {
        let api = sqlite_api(&path);
        for message in SEO_THREAD {
            api.process_text(
                &request(message, &owner)
                    .in_task(task.clone())
                    .in_phase(ClusterType::Ideation),
            )
            .await
            .unwrap();
        }
        api.add_checkpoint(&task, &owner, None, Some("draft".to_string()))
            .unwrap();
    }

    let api = sqlite_api(&path);
    let nodes = api.list_nodes(&owner, &NodeFilter::new()).unwrap();
    assert_eq!(nodes.len(), 2);
    assert!(nodes.iter().all(|n| n.frequency == 2));
    assert!(nodes.iter().all(|n| n.source_contexts.len() == 2));

    let cluster = api
        .get_cluster(&task, &owner, ClusterType::Ideation)
        .unwrap()
        .unwrap();
    assert_eq!(cluster.node_ids.len(), 2);

    // one auto (first message), one manual; the second message did not move the set
    let checkpoints = api.list_checkpoints(Some(&task), None).unwrap();
    assert_eq!(checkpoints.len(), 2);
    assert_eq!(checkpoints[1].summary.as_deref(), Some("draft"));
}

#[tokio::test]
async fn from_config_opens_configured_database() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.database.path = Some(dir.path().join("nested").join("lexigraph.db"));
    config.taxonomy.classify_on_ingest = true;

    let api = KnowledgeApi::from_config(config).unwrap();
    api.import_taxonomy_yaml(CATALOGUE).unwrap();

    let outcome = api
        .process_text(&request(&SEO_THREAD[0], &owner()))
        .await
        .unwrap();
    assert_eq!(outcome.classified, 1);
    assert!(dir.path().join("nested").join("lexigraph.db").exists());

    let seo = api
        .list_nodes(&owner(), &NodeFilter::new().with_type(NodeType::Keyword))
        .unwrap()
        .remove(0);
    assert!(seo.is_classified());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_on_separate_connections() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("graph.db");
    let owner = owner();

    // Create the schema once before the writers race
    drop(sqlite_api(&path));

    let mut jobs = JoinSet::new();
    for writer in 0..4 {
        let api = sqlite_api(&path);
        let owner = owner.clone();
        jobs.spawn(async move {
            for i in 0..5 {
                let mut req = request(&SEO_THREAD[0], &owner);
                req.source_id = format!("w{writer}-m{i}");
                api.process_text(&req).await.unwrap();
            }
        });
    }
    while let Some(joined) = jobs.join_next().await {
        joined.unwrap();
    }

    let api = sqlite_api(&path);
    let nodes = api.list_nodes(&owner, &NodeFilter::new()).unwrap();
    assert_eq!(nodes.len(), 2);
    assert!(nodes.iter().all(|n| n.frequency == 20));

    let edges = api.list_edges(&owner, None).unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].weight, 20);
}
