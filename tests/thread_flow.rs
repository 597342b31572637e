//! End-to-end thread flow over in-memory stores: create a thread, reply,
//! reply to the reply, and verify lineage, counters, ordering, and the
//! assembled tree.

use std::sync::Arc;

use agora::federation::{
    FederationEngine, InterceptedStore, MemoryObjectStore, ObjectStore, SaveInterceptor,
};
use agora::stats::{MemoryNoteStats, MemoryThreadStats};
use agora::threads::{build_tree, CreatePost, LineageEnricher, MissingParentPolicy, ThreadService};

const ALICE: &str = "https://agora.test/u/alice";
const BOB: &str = "https://agora.test/u/bob";
const GROUP: &str = "https://agora.test/g/rust";

fn service() -> (ThreadService, Arc<dyn ObjectStore>) {
    let enricher: Arc<dyn SaveInterceptor> =
        Arc::new(LineageEnricher::new(MissingParentPolicy::Skip));
    let store: Arc<dyn ObjectStore> = Arc::new(InterceptedStore::new(
        Arc::new(MemoryObjectStore::new()),
        vec![enricher],
    ));
    let engine = Arc::new(FederationEngine::new(
        store.clone(),
        "https://agora.test".to_string(),
    ));
    let service = ThreadService::new(
        engine,
        store.clone(),
        Arc::new(MemoryThreadStats::new()),
        Arc::new(MemoryNoteStats::new()),
    );
    (service, store)
}

#[tokio::test]
async fn thread_with_nested_replies() {
    let (service, store) = service();

    // Thread root
    let thread = service
        .create_thread(ALICE, "Introductions", GROUP)
        .await
        .unwrap();
    let root = thread.message_id.clone();

    // Root note is its own thread root at depth 0
    let root_note = store.get_object(&root).await.unwrap().unwrap();
    let lineage = root_note.as_note().unwrap().local.clone().unwrap();
    assert_eq!(lineage.thread_root, root);
    assert_eq!(lineage.depth, 0);

    // First-level reply
    let reply1 = service
        .create_post(
            BOB,
            CreatePost {
                content: "hi everyone".to_string(),
                in_reply_to: Some(root.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let note1 = store.get_object(&reply1.message_id).await.unwrap().unwrap();
    let lineage1 = note1.as_note().unwrap().local.clone().unwrap();
    assert_eq!(lineage1.thread_root, root);
    assert_eq!(lineage1.depth, 1);

    // Second-level reply inherits the same root, one level deeper
    let reply2 = service
        .create_post(
            ALICE,
            CreatePost {
                content: "welcome!".to_string(),
                in_reply_to: Some(reply1.message_id.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let note2 = store.get_object(&reply2.message_id).await.unwrap().unwrap();
    let lineage2 = note2.as_note().unwrap().local.clone().unwrap();
    assert_eq!(lineage2.thread_root, root);
    assert_eq!(lineage2.depth, 2);

    // Counter row tracked both replies
    let stats = service.get_thread_stats(&root).await.unwrap().unwrap();
    assert_eq!(stats.reply_count, 2);
    assert_eq!(stats.title, "Introductions");

    // Flat fetch is ascending by publish time and includes the root
    let view = service.get_thread(&root).await.unwrap();
    let ids: Vec<&str> = view.notes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            root.as_str(),
            reply1.message_id.as_str(),
            reply2.message_id.as_str()
        ]
    );

    // Tree shape: root -> reply1 -> reply2
    let forest = build_tree(view.notes);
    assert_eq!(forest.len(), 1);
    assert_eq!(forest[0].note.id, root);
    assert_eq!(forest[0].children.len(), 1);
    assert_eq!(forest[0].children[0].note.id, reply1.message_id);
    assert_eq!(
        forest[0].children[0].children[0].note.id,
        reply2.message_id
    );
}

#[tokio::test]
async fn thread_listing_reflects_activity() {
    let (service, _store) = service();

    let first = service.create_thread(ALICE, "First", GROUP).await.unwrap();
    let second = service.create_thread(BOB, "Second", GROUP).await.unwrap();

    // A reply to the first thread makes it the most recently active
    service
        .create_post(
            BOB,
            CreatePost {
                content: "bump".to_string(),
                in_reply_to: Some(first.message_id.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let listing = service.list_threads(GROUP, 50, 0).await.unwrap();
    let roots: Vec<&str> = listing.iter().map(|t| t.root_note_iri.as_str()).collect();
    assert_eq!(
        roots,
        vec![first.message_id.as_str(), second.message_id.as_str()]
    );
}

#[tokio::test]
async fn orphan_reply_is_invisible_until_reconciled() {
    let (service, _store) = service();

    let thread = service
        .create_thread(ALICE, "Introductions", GROUP)
        .await
        .unwrap();

    // Reply to a parent this instance has never seen: stored, but with no
    // lineage under the Skip policy, so it joins no thread.
    service
        .create_post(
            BOB,
            CreatePost {
                content: "replying to a ghost".to_string(),
                in_reply_to: Some("https://elsewhere.test/o/ghost".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let view = service.get_thread(&thread.message_id).await.unwrap();
    assert_eq!(view.notes.len(), 1);

    let stats = service
        .get_thread_stats(&thread.message_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stats.reply_count, 0);
}

#[tokio::test]
async fn adopt_root_policy_self_roots_orphans() {
    let enricher: Arc<dyn SaveInterceptor> =
        Arc::new(LineageEnricher::new(MissingParentPolicy::AdoptAsRoot));
    let store: Arc<dyn ObjectStore> = Arc::new(InterceptedStore::new(
        Arc::new(MemoryObjectStore::new()),
        vec![enricher],
    ));
    let engine = Arc::new(FederationEngine::new(
        store.clone(),
        "https://agora.test".to_string(),
    ));
    let service = ThreadService::new(
        engine,
        store.clone(),
        Arc::new(MemoryThreadStats::new()),
        Arc::new(MemoryNoteStats::new()),
    );

    let submission = service
        .create_post(
            BOB,
            CreatePost {
                content: "replying to a ghost".to_string(),
                in_reply_to: Some("https://elsewhere.test/o/ghost".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let note = store
        .get_object(&submission.message_id)
        .await
        .unwrap()
        .unwrap();
    let lineage = note.as_note().unwrap().local.clone().unwrap();
    assert_eq!(lineage.thread_root, submission.message_id);
    assert_eq!(lineage.depth, 0);
}

#[tokio::test]
async fn reconcile_repairs_drifted_counters() {
    let (service, _store) = service();

    let thread = service
        .create_thread(ALICE, "Introductions", GROUP)
        .await
        .unwrap();

    for i in 0..4 {
        service
            .create_post(
                BOB,
                CreatePost {
                    content: format!("reply {}", i),
                    in_reply_to: Some(thread.message_id.clone()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    let recounted = service.reconcile_thread(&thread.message_id).await.unwrap();
    assert_eq!(recounted, 4);

    let stats = service
        .get_thread_stats(&thread.message_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stats.reply_count, 4);
}
