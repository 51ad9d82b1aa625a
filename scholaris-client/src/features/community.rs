//! Community feed: reactions, saves, posts and comments.

use super::{map_where, swap_placeholder};
use crate::api_client::ScholarisApi;
use crate::client::{server_entity, ScholarisClient};
use crate::error::ClientResult;
use crate::keys;
use chrono::Utc;
use scholaris_cache::{KeyUpdate, Mutation, MutationError, QueryKey, RollbackPolicy, ServerAck};
use scholaris_core::{
    Comment, CommentForm, CommentId, EntityIdType, Post, PostForm, PostId, ReactionKind,
    SavedCount, TempId,
};

fn replace_post(current: Option<Vec<Post>>, server: Post) -> Option<Vec<Post>> {
    current.map(|posts| {
        map_where(
            posts,
            |p| p.post_id == server.post_id,
            |_| server.clone(),
        )
    })
}

impl<A: ScholarisApi + 'static> ScholarisClient<A> {
    /// Feed pages currently cached.
    fn feed_pages(&self) -> ClientResult<Vec<QueryKey>> {
        Ok(self.queries.cache().keys_matching(&keys::post_lists())?)
    }

    /// One update per cached feed page, applying `f` to `post_id`.
    fn on_feed_pages<F>(&self, post_id: PostId, f: F) -> ClientResult<Vec<KeyUpdate>>
    where
        F: Fn(Post) -> Post + Clone + Send + 'static,
    {
        Ok(self
            .feed_pages()?
            .into_iter()
            .map(|page| {
                let f = f.clone();
                KeyUpdate::update(page, move |posts: Vec<Post>| {
                    map_where(posts, |p| p.post_id == post_id, &f)
                })
            })
            .collect())
    }

    /// Toggle the viewer's `kind` reaction on `post`.
    ///
    /// The detail adopts the server's post and stays fresh. Feed pages get
    /// the post spliced in and are refetched with the saved lists.
    pub async fn toggle_reaction(&self, post: &Post, kind: ReactionKind) -> ClientResult<Post> {
        let post_id = post.post_id;
        let toggle = move |p: Post| p.with_reaction_toggled(kind);

        let mut mutation = Mutation::new("toggle_reaction").update(
            KeyUpdate::update(keys::post_detail(post_id), toggle).replace_with_server::<Post>(),
        );
        for update in self.on_feed_pages(post_id, toggle)? {
            mutation = mutation.update(update.reconcile(replace_post));
        }
        let mutation = mutation
            .invalidates(keys::post_lists())
            .invalidates(keys::saved_posts())
            .invalidates(keys::saved_post_count());

        let api = &self.api;
        let ack = self
            .run_mutation("react to post", mutation, async move {
                let post = api.react_to_post(post_id, kind).await?;
                ServerAck::entity(&post)
            })
            .await?;
        server_entity(&ack)
    }

    /// Save or unsave `post`. Returns the new saved flag.
    ///
    /// The saved list and the saved count move together and revert together.
    pub async fn toggle_save_post(&self, post: &Post) -> ClientResult<bool> {
        let post_id = post.post_id;
        let saved = !post.user_saved;
        let delta = if saved { 1 } else { -1 };
        let saved_copy = post.clone().with_saved(true);
        let mark = move |p: Post| p.with_saved(saved);

        let mut mutation = Mutation::new("toggle_save_post")
            .update(KeyUpdate::update(keys::post_detail(post_id), mark))
            .update(KeyUpdate::update(
                keys::saved_post_count(),
                move |count: SavedCount| count.adjusted(delta),
            ))
            .update(KeyUpdate::update(
                keys::saved_posts(),
                move |mut posts: Vec<Post>| {
                    posts.retain(|p| p.post_id != post_id);
                    if saved {
                        posts.insert(0, saved_copy);
                    }
                    posts
                },
            ));
        for update in self.on_feed_pages(post_id, mark)? {
            mutation = mutation.update(update);
        }

        let api = &self.api;
        self.run_mutation(
            if saved { "save post" } else { "unsave post" },
            mutation,
            async move {
                api.set_post_saved(post_id, saved).await?;
                Ok::<_, MutationError>(ServerAck::Acknowledged)
            },
        )
        .await?;
        Ok(saved)
    }

    /// Publish a post. A placeholder tops the first feed page until the
    /// server's post replaces it.
    pub async fn create_post(&self, form: PostForm) -> ClientResult<Post> {
        let temp = TempId::now();
        let placeholder = Post {
            post_id: PostId::now_v7(),
            author_id: self.viewer.user_id,
            author_name: self.viewer.display_name.clone(),
            content: form.content.clone(),
            media_url: form.media_url.clone(),
            reaction_count: 0,
            user_reaction: None,
            comment_count: 0,
            user_saved: false,
            pending_ref: Some(temp.clone()),
            created_at: Utc::now(),
        };

        let mutation = Mutation::new("create_post")
            .update(
                KeyUpdate::update(keys::post_list(1), move |mut posts: Vec<Post>| {
                    posts.insert(0, placeholder);
                    posts
                })
                .reconcile(move |current: Option<Vec<Post>>, server: Post| {
                    current.map(|posts| swap_placeholder(posts, &temp, server))
                }),
            )
            .invalidates(keys::post_lists());

        let api = &self.api;
        let form = &form;
        let ack = self
            .run_mutation("publish post", mutation, async move {
                let post = api.create_post(form).await?;
                ServerAck::entity(&post)
            })
            .await?;
        server_entity(&ack)
    }

    /// Comment on `post_id`. The comment shows immediately under a temp id
    /// and the post's comment count is bumped.
    pub async fn create_comment(&self, post_id: PostId, form: CommentForm) -> ClientResult<Comment> {
        let temp = TempId::now();
        let placeholder = Comment {
            comment_id: CommentId::now_v7(),
            post_id,
            author_id: self.viewer.user_id,
            author_name: self.viewer.display_name.clone(),
            content: form.content.clone(),
            pending_ref: Some(temp.clone()),
            created_at: Utc::now(),
        };
        let bump = |p: Post| p.with_comment_delta(1);

        let mut mutation = Mutation::new("create_comment")
            .update(
                KeyUpdate::update(keys::comments(post_id), move |mut comments: Vec<Comment>| {
                    comments.push(placeholder);
                    comments
                })
                .reconcile(move |current: Option<Vec<Comment>>, server: Comment| {
                    current.map(|comments| swap_placeholder(comments, &temp, server))
                }),
            )
            .update(KeyUpdate::update(keys::post_detail(post_id), bump));
        for update in self.on_feed_pages(post_id, bump)? {
            mutation = mutation.update(update);
        }

        let api = &self.api;
        let form = &form;
        let ack = self
            .run_mutation("post comment", mutation, async move {
                let comment = api.create_comment(post_id, form).await?;
                ServerAck::entity(&comment)
            })
            .await?;
        server_entity(&ack)
    }

    pub async fn delete_comment(&self, post_id: PostId, comment_id: CommentId) -> ClientResult<()> {
        let drop_one = |p: Post| p.with_comment_delta(-1);

        let mut mutation = Mutation::new("delete_comment")
            .update(KeyUpdate::update(
                keys::comments(post_id),
                move |mut comments: Vec<Comment>| {
                    comments.retain(|c| c.comment_id != comment_id);
                    comments
                },
            ))
            .update(KeyUpdate::update(keys::post_detail(post_id), drop_one));
        for update in self.on_feed_pages(post_id, drop_one)? {
            mutation = mutation.update(update);
        }

        let api = &self.api;
        self.run_mutation("delete comment", mutation, async move {
            api.delete_comment(post_id, comment_id).await?;
            Ok::<_, MutationError>(ServerAck::Acknowledged)
        })
        .await?;
        Ok(())
    }

    /// Delete `post_id`. On failure the post reappears in lists; its detail
    /// entry stays removed and is refetched on demand.
    pub async fn delete_post(&self, post_id: PostId) -> ClientResult<()> {
        let mut mutation = Mutation::new("delete_post")
            .update(KeyUpdate::remove(keys::post_detail(post_id)).rollback(RollbackPolicy::Discard))
            .update(KeyUpdate::update(keys::saved_posts(), move |mut posts: Vec<Post>| {
                posts.retain(|p| p.post_id != post_id);
                posts
            }));
        for page in self.feed_pages()? {
            mutation = mutation.update(KeyUpdate::update(page, move |mut posts: Vec<Post>| {
                posts.retain(|p| p.post_id != post_id);
                posts
            }));
        }
        let mutation = mutation.invalidates(keys::saved_post_count());

        let api = &self.api;
        self.run_mutation("delete post", mutation, async move {
            api.delete_post(post_id).await?;
            Ok::<_, MutationError>(ServerAck::Acknowledged)
        })
        .await?;

        self.queries.remove(&keys::comments(post_id))?;
        Ok(())
    }
}
