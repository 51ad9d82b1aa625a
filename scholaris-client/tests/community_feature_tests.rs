//! Community feed mutations against a scripted backend.

use scholaris_cache::MutationError;
use scholaris_client::keys;
use scholaris_client::{ClientError, NotificationAction, NotificationLevel};
use scholaris_core::{Comment, CommentForm, Post, PostForm, ReactionKind, SavedCount};
use scholaris_test_utils::assertions::{assert_absent, assert_cached, assert_fresh, assert_stale};
use scholaris_test_utils::fixtures;
use std::sync::{Arc, Mutex};

#[path = "support/mock_api.rs"]
mod mock_api;
use mock_api::{test_client, Reply};

#[tokio::test]
async fn test_like_is_visible_during_call_then_confirmed() {
    let (client, api) = test_client();
    let post = fixtures::unliked_post();
    let detail = keys::post_detail(post.post_id);
    let page = keys::post_list(1);
    client.queries().set_query_data(detail.clone(), &post).unwrap();
    client.queries().set_query_data(page.clone(), &vec![post.clone()]).unwrap();

    let canonical = post.clone().with_reaction_toggled(ReactionKind::Like);
    api.reply_entity("react_to_post", &canonical);

    let seen = Arc::new(Mutex::new(None));
    let (queries, probe, key) = (client.queries().clone(), Arc::clone(&seen), detail.clone());
    api.on_call(move |_| {
        *probe.lock().unwrap() = queries.get_query_data::<Post>(&key).unwrap();
    });

    let confirmed = client.toggle_reaction(&post, ReactionKind::Like).await.unwrap();

    let during = seen.lock().unwrap().clone().unwrap();
    assert_eq!(during.reaction_count, 4);
    assert!(during.user_reacted());
    assert_eq!(confirmed, canonical);
    assert_cached(client.queries(), &detail, &canonical);
    assert_fresh(client.queries(), &detail);
    assert_cached(client.queries(), &page, &vec![canonical]);
    assert_stale(client.queries(), &page);
    assert!(client.notifications().visible().is_empty());
}

#[tokio::test]
async fn test_reaction_marks_lists_and_counts_stale() {
    let (client, api) = test_client();
    let post = fixtures::unliked_post();
    let detail = keys::post_detail(post.post_id);
    let page = keys::post_list(1);
    let count = keys::saved_post_count();
    client.queries().set_query_data(detail.clone(), &post).unwrap();
    client.queries().set_query_data(page.clone(), &vec![post.clone()]).unwrap();
    client.queries().set_query_data(count.clone(), &SavedCount::new(2)).unwrap();
    api.reply_entity("react_to_post", &post.clone().with_reaction_toggled(ReactionKind::Celebrate));

    client.toggle_reaction(&post, ReactionKind::Celebrate).await.unwrap();

    assert_fresh(client.queries(), &detail);
    assert_stale(client.queries(), &page);
    assert_stale(client.queries(), &count);
}

#[tokio::test]
async fn test_like_rolls_back_and_toasts_on_network_error() {
    let (client, api) = test_client();
    let post = fixtures::unliked_post();
    let detail = keys::post_detail(post.post_id);
    client.queries().set_query_data(detail.clone(), &post).unwrap();
    api.reply("react_to_post", Reply::Unavailable);

    let err = client.toggle_reaction(&post, ReactionKind::Like).await.unwrap_err();

    assert!(matches!(
        err,
        ClientError::Mutation(MutationError::Transport { .. })
    ));
    assert_cached(client.queries(), &detail, &post);
    let toasts = client.notifications().visible();
    assert_eq!(toasts.len(), 1);
    assert_eq!(toasts[0].level, NotificationLevel::Error);
    assert_eq!(toasts[0].action, Some(NotificationAction::Retry));
}

#[tokio::test]
async fn test_rejected_save_reverts_list_and_count_together() {
    let (client, api) = test_client();
    let post = fixtures::unliked_post();
    let page = keys::post_list(1);
    let saved = keys::saved_posts();
    let count = keys::saved_post_count();
    client.queries().set_query_data(page.clone(), &vec![post.clone()]).unwrap();
    client.queries().set_query_data(saved.clone(), &Vec::<Post>::new()).unwrap();
    client.queries().set_query_data(count.clone(), &SavedCount::new(5)).unwrap();
    api.reply("set_post_saved", Reply::Rejected("Post not found".to_string()));

    let seen = Arc::new(Mutex::new(None));
    let (queries, probe, at) = (client.queries().clone(), Arc::clone(&seen), count.clone());
    api.on_call(move |_| {
        *probe.lock().unwrap() = queries.get_query_data::<SavedCount>(&at).unwrap();
    });

    let err = client.toggle_save_post(&post).await.unwrap_err();

    assert_eq!(*seen.lock().unwrap(), Some(SavedCount::new(6)));
    assert!(matches!(
        err,
        ClientError::Mutation(MutationError::Rejected { ref message }) if message == "Post not found"
    ));
    assert_cached(client.queries(), &page, &vec![post]);
    assert_cached(client.queries(), &saved, &Vec::<Post>::new());
    assert_cached(client.queries(), &count, &SavedCount::new(5));
    assert_eq!(
        client.notifications().visible()[0].action,
        Some(NotificationAction::Dismiss)
    );
}

#[tokio::test]
async fn test_save_adds_to_saved_list() {
    let (client, _api) = test_client();
    let post = fixtures::unliked_post();
    let saved = keys::saved_posts();
    let count = keys::saved_post_count();
    client.queries().set_query_data(saved.clone(), &Vec::<Post>::new()).unwrap();
    client.queries().set_query_data(count.clone(), &SavedCount::new(0)).unwrap();

    assert!(client.toggle_save_post(&post).await.unwrap());

    let list: Vec<Post> = client.queries().get_query_data(&saved).unwrap().unwrap();
    assert_eq!(list.len(), 1);
    assert!(list[0].user_saved);
    assert_cached(client.queries(), &count, &SavedCount::new(1));
    assert_stale(client.queries(), &count);
}

#[tokio::test]
async fn test_comment_placeholder_is_replaced_not_duplicated() {
    let (client, api) = test_client();
    let post = fixtures::unliked_post();
    let comments = keys::comments(post.post_id);
    let detail = keys::post_detail(post.post_id);
    let existing = fixtures::comment(post.post_id, "Congrats!");
    client.queries().set_query_data(comments.clone(), &vec![existing.clone()]).unwrap();
    client.queries().set_query_data(detail.clone(), &post).unwrap();

    let mut stored = fixtures::comment(post.post_id, "Well deserved");
    stored.author_name = "Ada".to_string();
    api.reply_entity("create_comment", &stored);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let (queries, probe, at) = (client.queries().clone(), Arc::clone(&seen), comments.clone());
    api.on_call(move |_| {
        *probe.lock().unwrap() = queries
            .get_query_data::<Vec<Comment>>(&at)
            .unwrap()
            .unwrap_or_default();
    });

    let form = CommentForm::new("  Well deserved ").unwrap();
    let created = client.create_comment(post.post_id, form).await.unwrap();

    let during = seen.lock().unwrap().clone();
    assert_eq!(during.len(), 2);
    assert!(during[1].is_pending());
    assert_eq!(during[1].content, "Well deserved");

    assert_eq!(created, stored);
    assert_cached(client.queries(), &comments, &vec![existing, stored]);
    let bumped: Post = client.queries().get_query_data(&detail).unwrap().unwrap();
    assert_eq!(bumped.comment_count, 1);
    assert_stale(client.queries(), &detail);
}

#[tokio::test]
async fn test_failed_comment_removes_placeholder() {
    let (client, api) = test_client();
    let post = fixtures::unliked_post();
    let comments = keys::comments(post.post_id);
    let detail = keys::post_detail(post.post_id);
    client.queries().set_query_data(comments.clone(), &Vec::<Comment>::new()).unwrap();
    client.queries().set_query_data(detail.clone(), &post).unwrap();
    api.reply("create_comment", Reply::Unavailable);

    let form = CommentForm::new("Nice").unwrap();
    client.create_comment(post.post_id, form).await.unwrap_err();

    assert_cached(client.queries(), &comments, &Vec::<Comment>::new());
    assert_cached(client.queries(), &detail, &post);
}

#[tokio::test]
async fn test_new_post_replaces_placeholder_on_first_page() {
    let (client, api) = test_client();
    let older = fixtures::unliked_post();
    let page = keys::post_list(1);
    client.queries().set_query_data(page.clone(), &vec![older.clone()]).unwrap();

    let stored = fixtures::post(0, None);
    api.reply_entity("create_post", &stored);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let (queries, probe, at) = (client.queries().clone(), Arc::clone(&seen), page.clone());
    api.on_call(move |_| {
        *probe.lock().unwrap() = queries
            .get_query_data::<Vec<Post>>(&at)
            .unwrap()
            .unwrap_or_default();
    });

    let form = PostForm::new("Scholarship essay tips thread", None).unwrap();
    client.create_post(form).await.unwrap();

    let during = seen.lock().unwrap().clone();
    assert_eq!(during.len(), 2);
    assert!(during[0].is_pending());
    assert_eq!(during[0].author_name, client.viewer().display_name);
    assert_cached(client.queries(), &page, &vec![stored, older]);
    assert_stale(client.queries(), &page);
}

#[tokio::test]
async fn test_new_post_invalidates_every_feed_page() {
    let (client, api) = test_client();
    let first = keys::post_list(1);
    let second = keys::post_list(2);
    client
        .queries()
        .set_query_data(first.clone(), &vec![fixtures::unliked_post()])
        .unwrap();
    client
        .queries()
        .set_query_data(second.clone(), &vec![fixtures::unliked_post()])
        .unwrap();
    api.reply_entity("create_post", &fixtures::post(0, None));

    let form = PostForm::new("Anyone applied to the Fulbright?", None).unwrap();
    client.create_post(form).await.unwrap();

    assert_stale(client.queries(), &first);
    assert_stale(client.queries(), &second);
}

#[tokio::test]
async fn test_failed_delete_restores_list_but_not_detail() {
    let (client, api) = test_client();
    let post = fixtures::unliked_post();
    let detail = keys::post_detail(post.post_id);
    let page = keys::post_list(1);
    client.queries().set_query_data(detail.clone(), &post).unwrap();
    client.queries().set_query_data(page.clone(), &vec![post.clone()]).unwrap();
    api.reply("delete_post", Reply::Rejected("Not allowed".to_string()));

    client.delete_post(post.post_id).await.unwrap_err();

    assert_absent(client.queries(), &detail);
    assert_cached(client.queries(), &page, &vec![post]);
}

#[tokio::test]
async fn test_deleted_comment_leaves_list() {
    let (client, _api) = test_client();
    let post = fixtures::unliked_post().with_comment_delta(2);
    let comments = keys::comments(post.post_id);
    let detail = keys::post_detail(post.post_id);
    let keep = fixtures::comment(post.post_id, "keep");
    let gone = fixtures::comment(post.post_id, "gone");
    client
        .queries()
        .set_query_data(comments.clone(), &vec![keep.clone(), gone.clone()])
        .unwrap();
    client.queries().set_query_data(detail.clone(), &post).unwrap();

    client.delete_comment(post.post_id, gone.comment_id).await.unwrap();

    assert_cached(client.queries(), &comments, &vec![keep]);
    let updated: Post = client.queries().get_query_data(&detail).unwrap().unwrap();
    assert_eq!(updated.comment_count, 1);
}

#[tokio::test]
async fn test_invalid_comment_never_reaches_cache() {
    let (client, api) = test_client();
    let err = CommentForm::new("   ").map_err(ClientError::from).unwrap_err();
    assert!(err.is_validation());
    assert!(api.calls().is_empty());
    assert!(client.queries().cache().is_empty().unwrap());
    assert!(client.notifications().visible().is_empty());
}
