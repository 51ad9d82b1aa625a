//! Scholarship assistant threads.

use super::{map_where, Placeholder};
use crate::api_client::ScholarisApi;
use crate::client::{server_entity, ScholarisClient};
use crate::error::ClientResult;
use crate::keys;
use chrono::Utc;
use scholaris_cache::{KeyUpdate, Mutation, MutationError, RollbackPolicy, ServerAck};
use scholaris_core::{
    ChatMessage, ChatPrompt, ChatRole, ChatThread, ChatTranscript, EntityIdType, MessageId,
    TempId, ThreadId,
};

/// Drop the `temp` placeholder and append the server's messages once.
fn merge_reply(mut messages: Vec<ChatMessage>, temp: &TempId, reply: Vec<ChatMessage>) -> Vec<ChatMessage> {
    messages.retain(|m| {
        m.pending_ref.as_ref() != Some(temp) && !reply.iter().any(|r| r.same_record(m))
    });
    messages.extend(reply);
    messages
}

impl<A: ScholarisApi + 'static> ScholarisClient<A> {
    /// Send `text` to the assistant in `thread_id`.
    ///
    /// The user's message is appended right away; on success it is replaced
    /// by the stored message followed by the assistant's reply.
    pub async fn send_chat_message(
        &self,
        thread_id: ThreadId,
        text: &str,
    ) -> ClientResult<Vec<ChatMessage>> {
        let prompt = ChatPrompt::new(text)?;
        let temp = TempId::now();
        let now = Utc::now();
        let placeholder = ChatMessage {
            message_id: MessageId::now_v7(),
            thread_id,
            role: ChatRole::User,
            content: prompt.content.clone(),
            pending_ref: Some(temp.clone()),
            created_at: now,
        };

        let mutation = Mutation::new("send_chat_message")
            .update(
                KeyUpdate::update(
                    keys::chat_thread(thread_id),
                    move |mut transcript: ChatTranscript| {
                        transcript.thread.last_message_at = Some(now);
                        transcript.messages.push(placeholder);
                        transcript
                    },
                )
                .reconcile(
                    move |current: Option<ChatTranscript>, reply: Vec<ChatMessage>| {
                        current.map(|mut transcript| {
                            transcript.messages = merge_reply(transcript.messages, &temp, reply);
                            transcript
                        })
                    },
                ),
            )
            .update(KeyUpdate::update(
                keys::chat_threads(self.viewer.user_id),
                move |threads: Vec<ChatThread>| {
                    map_where(
                        threads,
                        |t| t.thread_id == thread_id,
                        |mut t| {
                            t.last_message_at = Some(now);
                            t
                        },
                    )
                },
            ));

        let api = &self.api;
        let prompt = &prompt;
        let ack = self
            .run_mutation("send message", mutation, async move {
                let reply = api.send_chat_message(thread_id, prompt).await?;
                ServerAck::entity(&reply)
            })
            .await?;
        server_entity(&ack)
    }

    /// Delete one of the viewer's conversations. The thread reappears in the
    /// list on failure; its transcript is not restored.
    pub async fn delete_thread(&self, thread_id: ThreadId) -> ClientResult<()> {
        let mutation = Mutation::new("delete_thread")
            .update(
                KeyUpdate::remove(keys::chat_thread(thread_id)).rollback(RollbackPolicy::Discard),
            )
            .update(KeyUpdate::update(
                keys::chat_threads(self.viewer.user_id),
                move |mut threads: Vec<ChatThread>| {
                    threads.retain(|t| t.thread_id != thread_id);
                    threads
                },
            ));

        let api = &self.api;
        self.run_mutation("delete conversation", mutation, async move {
            api.delete_thread(thread_id).await?;
            Ok::<_, MutationError>(ServerAck::Acknowledged)
        })
        .await?;
        Ok(())
    }
}
