//! Saved scholarships.

use super::map_where;
use crate::api_client::ScholarisApi;
use crate::client::ScholarisClient;
use crate::error::ClientResult;
use crate::keys;
use scholaris_cache::{KeyUpdate, Mutation, MutationError, ServerAck};
use scholaris_core::{SavedCount, Scholarship};

impl<A: ScholarisApi + 'static> ScholarisClient<A> {
    /// Save or unsave `scholarship`. Returns the new saved flag.
    ///
    /// Listing, detail, saved list and saved count are updated as one unit.
    pub async fn toggle_save_scholarship(&self, scholarship: &Scholarship) -> ClientResult<bool> {
        let scholarship_id = scholarship.scholarship_id;
        let saved = !scholarship.user_saved;
        let delta = if saved { 1 } else { -1 };
        let saved_copy = scholarship.clone().with_saved(true);

        let mutation = Mutation::new("toggle_save_scholarship")
            .update(KeyUpdate::update(
                keys::scholarship_list(),
                move |list: Vec<Scholarship>| {
                    map_where(
                        list,
                        |s| s.scholarship_id == scholarship_id,
                        |s| s.with_saved(saved),
                    )
                },
            ))
            .update(KeyUpdate::update(
                keys::scholarship_detail(scholarship_id),
                move |s: Scholarship| s.with_saved(saved),
            ))
            .update(KeyUpdate::update(
                keys::saved_scholarships(),
                move |mut list: Vec<Scholarship>| {
                    list.retain(|s| s.scholarship_id != scholarship_id);
                    if saved {
                        list.insert(0, saved_copy);
                    }
                    list
                },
            ))
            .update(KeyUpdate::update(
                keys::saved_scholarship_count(),
                move |count: SavedCount| count.adjusted(delta),
            ));

        let api = &self.api;
        self.run_mutation(
            if saved { "save scholarship" } else { "unsave scholarship" },
            mutation,
            async move {
                api.set_scholarship_saved(scholarship_id, saved).await?;
                Ok::<_, MutationError>(ServerAck::Acknowledged)
            },
        )
        .await?;
        Ok(saved)
    }
}
