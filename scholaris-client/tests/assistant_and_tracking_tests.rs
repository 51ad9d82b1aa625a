//! Chat assistant, saved scholarships and application tracking.

use scholaris_client::keys;
use scholaris_client::ClientError;
use scholaris_core::{
    ApplicationStatus, ChatMessage, ChatRole, ChatThread, ChatTranscript, EntityIdType, MessageId,
    SavedCount, Scholarship, ValidationError,
};
use scholaris_test_utils::assertions::{assert_absent, assert_cached, assert_fresh, assert_stale};
use scholaris_test_utils::fixtures;
use std::sync::{Arc, Mutex};

#[path = "support/mock_api.rs"]
mod mock_api;
use mock_api::{test_client, Reply};

#[tokio::test]
async fn test_chat_message_appended_then_replaced_by_reply() {
    let (client, api) = test_client();
    let thread = fixtures::thread(client.viewer().user_id, "Essay help");
    let thread_id = thread.thread_id;
    let transcript = fixtures::transcript(thread.clone());
    let detail = keys::chat_thread(thread_id);
    client.queries().set_query_data(detail.clone(), &transcript).unwrap();
    client
        .queries()
        .set_query_data(keys::chat_threads(client.viewer().user_id), &vec![thread])
        .unwrap();

    let stored = ChatMessage {
        message_id: MessageId::now_v7(),
        thread_id,
        role: ChatRole::User,
        content: "Which deadlines are closest?".to_string(),
        pending_ref: None,
        created_at: chrono::Utc::now(),
    };
    let answer = fixtures::assistant_message(thread_id, "The STEM award closes March 31st.");
    api.reply_entity("send_chat_message", &vec![stored.clone(), answer.clone()]);

    let seen = Arc::new(Mutex::new(None));
    let (queries, probe, at) = (client.queries().clone(), Arc::clone(&seen), detail.clone());
    api.on_call(move |_| {
        *probe.lock().unwrap() = queries.get_query_data::<ChatTranscript>(&at).unwrap();
    });

    let reply = client
        .send_chat_message(thread_id, "Which deadlines are closest?")
        .await
        .unwrap();

    let during = seen.lock().unwrap().clone().unwrap();
    assert_eq!(during.messages.len(), 2);
    assert!(during.messages[1].pending_ref.is_some());

    assert_eq!(reply, vec![stored.clone(), answer.clone()]);
    let after: ChatTranscript = client.queries().get_query_data(&detail).unwrap().unwrap();
    assert_eq!(after.messages.len(), 3);
    assert_eq!(after.messages[1..], [stored, answer]);
    assert_stale(client.queries(), &detail);
}

#[tokio::test]
async fn test_empty_chat_message_is_rejected_before_sending() {
    let (client, api) = test_client();
    let thread = fixtures::thread(client.viewer().user_id, "Essay help");
    let detail = keys::chat_thread(thread.thread_id);
    let transcript = fixtures::transcript(thread.clone());
    client.queries().set_query_data(detail.clone(), &transcript).unwrap();

    let err = client
        .send_chat_message(thread.thread_id, "   ")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ClientError::Validation(ValidationError::RequiredFieldMissing { .. })
    ));
    assert!(api.calls().is_empty());
    assert!(client.notifications().visible().is_empty());
    assert_cached(client.queries(), &detail, &transcript);
}

#[tokio::test]
async fn test_failed_thread_delete_restores_list_only() {
    let (client, api) = test_client();
    let user_id = client.viewer().user_id;
    let thread = fixtures::thread(user_id, "Visa questions");
    let detail = keys::chat_thread(thread.thread_id);
    let list = keys::chat_threads(user_id);
    client
        .queries()
        .set_query_data(detail.clone(), &fixtures::transcript(thread.clone()))
        .unwrap();
    client.queries().set_query_data(list.clone(), &vec![thread.clone()]).unwrap();
    api.reply("delete_thread", Reply::Unavailable);

    client.delete_thread(thread.thread_id).await.unwrap_err();

    assert_absent(client.queries(), &detail);
    assert_cached(client.queries(), &list, &vec![thread]);
    assert_eq!(client.notifications().visible().len(), 1);
}

#[tokio::test]
async fn test_thread_delete_removes_detail_and_list_entry() {
    let (client, _api) = test_client();
    let user_id = client.viewer().user_id;
    let keep = fixtures::thread(user_id, "Essay help");
    let gone = fixtures::thread(user_id, "Visa questions");
    let list = keys::chat_threads(user_id);
    client
        .queries()
        .set_query_data(list.clone(), &vec![keep.clone(), gone.clone()])
        .unwrap();
    client
        .queries()
        .set_query_data(keys::chat_thread(gone.thread_id), &fixtures::transcript(gone.clone()))
        .unwrap();

    client.delete_thread(gone.thread_id).await.unwrap();

    assert_absent(client.queries(), &keys::chat_thread(gone.thread_id));
    assert_cached(client.queries(), &list, &vec![keep]);
}

#[tokio::test]
async fn test_scholarship_save_updates_every_view() {
    let (client, _api) = test_client();
    let scholarship = fixtures::scholarship("Women in STEM Award");
    let id = scholarship.scholarship_id;
    client
        .queries()
        .set_query_data(keys::scholarship_list(), &vec![scholarship.clone()])
        .unwrap();
    client
        .queries()
        .set_query_data(keys::scholarship_detail(id), &scholarship)
        .unwrap();
    client
        .queries()
        .set_query_data(keys::saved_scholarships(), &Vec::<Scholarship>::new())
        .unwrap();
    client
        .queries()
        .set_query_data(keys::saved_scholarship_count(), &SavedCount::new(2))
        .unwrap();

    assert!(client.toggle_save_scholarship(&scholarship).await.unwrap());

    let saved = scholarship.clone().with_saved(true);
    assert_cached(client.queries(), &keys::scholarship_list(), &vec![saved.clone()]);
    assert_cached(client.queries(), &keys::scholarship_detail(id), &saved);
    assert_cached(client.queries(), &keys::saved_scholarships(), &vec![saved]);
    assert_cached(client.queries(), &keys::saved_scholarship_count(), &SavedCount::new(3));
}

#[tokio::test]
async fn test_scholarship_unsave_reverts_on_error() {
    let (client, api) = test_client();
    let scholarship = fixtures::scholarship("Global Leaders Grant").with_saved(true);
    client
        .queries()
        .set_query_data(keys::saved_scholarships(), &vec![scholarship.clone()])
        .unwrap();
    client
        .queries()
        .set_query_data(keys::saved_scholarship_count(), &SavedCount::new(1))
        .unwrap();
    api.reply("set_scholarship_saved", Reply::Rejected("Try again later".to_string()));

    client.toggle_save_scholarship(&scholarship).await.unwrap_err();

    assert_cached(client.queries(), &keys::saved_scholarships(), &vec![scholarship]);
    assert_cached(client.queries(), &keys::saved_scholarship_count(), &SavedCount::new(1));
}

#[tokio::test]
async fn test_application_status_adopts_server_record() {
    let (client, api) = test_client();
    let scholarship = fixtures::scholarship("Women in STEM Award");
    let application = fixtures::application(scholarship.scholarship_id, ApplicationStatus::InProgress);
    let detail = keys::application_detail(application.application_id);
    client.queries().set_query_data(detail.clone(), &application).unwrap();
    client
        .queries()
        .set_query_data(keys::application_list(), &vec![application.clone()])
        .unwrap();

    let mut stored = application.clone();
    stored.status = ApplicationStatus::Submitted;
    stored.notes = Some("Mailed transcripts".to_string());
    api.reply_entity("update_application", &stored);

    let updated = client
        .update_application_status(
            &application,
            "submitted",
            Some("Mailed transcripts"),
            Some("2026-10-01"),
        )
        .await
        .unwrap();

    assert_eq!(updated, stored);
    assert_cached(client.queries(), &detail, &stored);
    assert_fresh(client.queries(), &detail);
    assert_cached(client.queries(), &keys::application_list(), &vec![stored]);
    assert_stale(client.queries(), &keys::application_list());
}

#[tokio::test]
async fn test_malformed_submission_date_is_rejected() {
    let (client, api) = test_client();
    let scholarship = fixtures::scholarship("Women in STEM Award");
    let application = fixtures::application(scholarship.scholarship_id, ApplicationStatus::InProgress);
    let detail = keys::application_detail(application.application_id);
    client.queries().set_query_data(detail.clone(), &application).unwrap();

    let err = client
        .update_application_status(&application, "submitted", None, Some("10/01/2026"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ClientError::Validation(ValidationError::MalformedDate { .. })
    ));
    assert!(api.calls().is_empty());
    assert_cached(client.queries(), &detail, &application);
}

#[tokio::test]
async fn test_thread_list_last_message_is_bumped() {
    let (client, api) = test_client();
    let user_id = client.viewer().user_id;
    let mut thread = fixtures::thread(user_id, "Essay help");
    thread.last_message_at = None;
    let list = keys::chat_threads(user_id);
    client.queries().set_query_data(list.clone(), &vec![thread.clone()]).unwrap();
    api.reply_entity("send_chat_message", &Vec::<ChatMessage>::new());

    client.send_chat_message(thread.thread_id, "Hello").await.unwrap();

    let threads: Vec<ChatThread> = client.queries().get_query_data(&list).unwrap().unwrap();
    assert!(threads[0].last_message_at.is_some());
}
