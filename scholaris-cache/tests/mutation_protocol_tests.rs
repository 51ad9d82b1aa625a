//! End-to-end tests of the optimistic mutation protocol over post data.

use scholaris_cache::{
    query_key, CacheEvent, KeyUpdate, Mutation, MutationError, MutationState, QueryClient,
    QueryKey, ServerAck,
};
use scholaris_test_utils::assertions::{assert_absent, assert_cached, assert_fresh, assert_stale};
use scholaris_test_utils::{
    confirm, fixtures, gated_server_call, network_failure, Post, ReactionKind, SavedCount,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn detail_key(post: &Post) -> QueryKey {
    query_key!("posts", "detail", post.post_id.to_string())
}

fn toggle_like(key: &QueryKey) -> Mutation {
    Mutation::new("toggle_reaction").update(
        KeyUpdate::update(key.clone(), |post: Post| {
            post.with_reaction_toggled(ReactionKind::Like)
        })
        .replace_with_server::<Post>(),
    )
}

#[tokio::test]
async fn test_toggle_like_is_visible_then_confirmed() {
    let client = QueryClient::default();
    let post = fixtures::unliked_post();
    let key = detail_key(&post);
    client.set_query_data(key.clone(), &post).unwrap();

    let pending = client.begin_mutation(toggle_like(&key)).unwrap();
    let optimistic: Post = client.get_query_data(&key).unwrap().unwrap();
    assert_eq!(optimistic.reaction_count, 4);
    assert!(optimistic.user_reacted());
    assert!(client.is_mutating(&key).unwrap());

    let canonical = post.clone().with_reaction_toggled(ReactionKind::Like);
    let ack = ServerAck::entity(&canonical).unwrap();
    pending.run(confirm(ack)).await.unwrap();

    assert_cached(&client, &key, &canonical);
    assert_fresh(&client, &key);
    assert!(!client.is_mutating(&key).unwrap());
}

#[tokio::test]
async fn test_toggle_like_rolls_back_on_network_error() {
    let client = QueryClient::default();
    let post = fixtures::unliked_post();
    let key = detail_key(&post);
    client.set_query_data(key.clone(), &post).unwrap();

    let err = client
        .mutate(toggle_like(&key), network_failure())
        .await
        .unwrap_err();

    assert!(matches!(err, MutationError::Transport { .. }));
    let restored: Post = client.get_query_data(&key).unwrap().unwrap();
    assert_eq!(restored.reaction_count, 3);
    assert!(!restored.user_reacted());
    assert_stale(&client, &key);
    assert_eq!(client.stats().unwrap().rollbacks, 1);
}

#[tokio::test]
async fn test_save_toggle_reverts_list_and_count_together() {
    let client = QueryClient::default();
    let post = fixtures::unliked_post();
    let post_id = post.post_id;
    let list = query_key!("posts", "list");
    let count = query_key!("posts", "saved-count");
    client.set_query_data(list.clone(), &vec![post.clone()]).unwrap();
    client.set_query_data(count.clone(), &SavedCount::new(5)).unwrap();

    let mutation = Mutation::new("toggle_save_post")
        .update(KeyUpdate::update(list.clone(), move |posts: Vec<Post>| {
            posts
                .into_iter()
                .map(|p| if p.post_id == post_id { p.with_saved(true) } else { p })
                .collect::<Vec<_>>()
        }))
        .update(KeyUpdate::update(count.clone(), |c: SavedCount| c.adjusted(1)));

    let (gate, call) = gated_server_call();
    let pending = client.begin_mutation(mutation).unwrap();

    let saved: Vec<Post> = client.get_query_data(&list).unwrap().unwrap();
    assert!(saved[0].user_saved);
    assert_cached(&client, &count, &SavedCount::new(6));

    let mut rx = client.subscribe();
    gate.reject(MutationError::rejected("Post not found"));
    let err = pending.run(call).await.unwrap_err();
    assert_eq!(err, MutationError::rejected("Post not found"));

    assert_cached(&client, &list, &vec![post]);
    assert_cached(&client, &count, &SavedCount::new(5));

    // Both restores are published before either key is invalidated.
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    let first_invalidation = events
        .iter()
        .position(|e| matches!(e, CacheEvent::Invalidated { .. }))
        .unwrap();
    let restores = events[..first_invalidation]
        .iter()
        .filter(|e| matches!(e, CacheEvent::Updated { .. }))
        .count();
    assert_eq!(restores, 2);
}

#[tokio::test]
async fn test_optimistic_write_visible_before_server_resolves() {
    let client = QueryClient::default();
    let post = fixtures::unliked_post();
    let key = detail_key(&post);
    client.set_query_data(key.clone(), &post).unwrap();

    let (gate, call) = gated_server_call();
    let task_client = client.clone();
    let mutation = toggle_like(&key);
    let task = tokio::spawn(async move { task_client.mutate(mutation, call).await });
    tokio::task::yield_now().await;

    let seen: Post = client.get_query_data(&key).unwrap().unwrap();
    assert_eq!(seen.reaction_count, 4);
    assert_eq!(client.pending_mutations().unwrap().len(), 1);

    gate.resolve(ServerAck::Acknowledged);
    task.await.unwrap().unwrap();
    assert!(client.pending_mutations().unwrap().is_empty());
}

#[tokio::test]
async fn test_settle_applies_updater_exactly_once() {
    let client = QueryClient::default();
    let key = query_key!("posts", "saved-count");
    client.set_query_data(key.clone(), &SavedCount::new(5)).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mutation = Mutation::new("toggle_save_post").update(KeyUpdate::update(
        key.clone(),
        move |c: SavedCount| {
            counter.fetch_add(1, Ordering::SeqCst);
            c.adjusted(1)
        },
    ));

    let pending = client.begin_mutation(mutation).unwrap();
    let observer = pending.observe();
    pending.succeed(ServerAck::Acknowledged).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(observer.state(), MutationState::Reconciled);
    assert_cached(&client, &key, &SavedCount::new(6));
}

#[tokio::test]
async fn test_cancelled_mutation_future_rolls_back() {
    let client = QueryClient::default();
    let post = fixtures::unliked_post();
    let key = detail_key(&post);
    client.set_query_data(key.clone(), &post).unwrap();

    let (_gate, call) = gated_server_call();
    let task_client = client.clone();
    let mutation = toggle_like(&key);
    let task = tokio::spawn(async move { task_client.mutate(mutation, call).await });
    tokio::task::yield_now().await;
    assert!(client.is_mutating(&QueryKey::new("posts")).unwrap());

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());

    assert_cached(&client, &key, &post);
    assert!(!client.is_mutating(&QueryKey::new("posts")).unwrap());
}

#[tokio::test]
async fn test_overlapping_mutations_restore_their_own_snapshot() {
    let client = QueryClient::default();
    let key = query_key!("posts", "saved-count");
    client.set_query_data(key.clone(), &SavedCount::new(5)).unwrap();

    let bump = || {
        Mutation::new("toggle_save_post")
            .update(KeyUpdate::update(key.clone(), |c: SavedCount| c.adjusted(1)))
    };
    let first = client.begin_mutation(bump()).unwrap();
    let second = client.begin_mutation(bump()).unwrap();
    assert_cached(&client, &key, &SavedCount::new(7));

    // The earlier mutation restores what it captured, even though the later
    // one has written since.
    first.fail(MutationError::transport("timeout"));
    assert_cached(&client, &key, &SavedCount::new(5));

    second.succeed(ServerAck::Acknowledged).unwrap();
    assert_cached(&client, &key, &SavedCount::new(5));
}

#[tokio::test]
async fn test_removed_detail_is_not_restored_with_discard_policy() {
    let client = QueryClient::default();
    let post = fixtures::unliked_post();
    let post_id = post.post_id;
    let key = detail_key(&post);
    let list = query_key!("posts", "list");
    client.set_query_data(key.clone(), &post).unwrap();
    client.set_query_data(list.clone(), &vec![post.clone()]).unwrap();

    let mutation = Mutation::new("delete_post")
        .update(KeyUpdate::remove(key.clone()).rollback(scholaris_cache::RollbackPolicy::Discard))
        .update(KeyUpdate::update(list.clone(), move |posts: Vec<Post>| {
            posts.into_iter().filter(|p| p.post_id != post_id).collect::<Vec<_>>()
        }));

    client.mutate(mutation, network_failure()).await.unwrap_err();

    assert_absent(&client, &key);
    assert_cached(&client, &list, &vec![post]);
}
