//! Application tracking.

use super::map_where;
use crate::api_client::ScholarisApi;
use crate::client::{server_entity, ScholarisClient};
use crate::error::ClientResult;
use crate::keys;
use chrono::Utc;
use scholaris_cache::{KeyUpdate, Mutation, ServerAck};
use scholaris_core::{Application, ApplicationUpdateForm};

fn apply_form(mut application: Application, form: &ApplicationUpdateForm) -> Application {
    application.status = form.status;
    application.notes = form.notes.clone();
    if let Some(date) = form.submitted_on {
        application.submitted_at = date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    application.updated_at = Utc::now();
    application
}

impl<A: ScholarisApi + 'static> ScholarisClient<A> {
    /// Move `application` to `status`.
    ///
    /// `submitted_on` is a `YYYY-MM-DD` date and is required when the new
    /// status is `submitted`. Invalid input is rejected before the cache is
    /// touched.
    pub async fn update_application_status(
        &self,
        application: &Application,
        status: &str,
        notes: Option<&str>,
        submitted_on: Option<&str>,
    ) -> ClientResult<Application> {
        let form = ApplicationUpdateForm::new(status, notes, submitted_on)?;
        let application_id = application.application_id;

        let detail_form = form.clone();
        let list_form = form.clone();
        let mutation = Mutation::new("update_application_status")
            .update(
                KeyUpdate::update(
                    keys::application_detail(application_id),
                    move |a: Application| apply_form(a, &detail_form),
                )
                .replace_with_server::<Application>(),
            )
            .update(
                KeyUpdate::update(keys::application_list(), move |list: Vec<Application>| {
                    map_where(
                        list,
                        |a| a.application_id == application_id,
                        |a| apply_form(a, &list_form),
                    )
                })
                .reconcile(
                    move |current: Option<Vec<Application>>, server: Application| {
                        current.map(|list| {
                            map_where(
                                list,
                                |a| a.application_id == server.application_id,
                                |_| server.clone(),
                            )
                        })
                    },
                ),
            );

        let api = &self.api;
        let form = &form;
        let ack = self
            .run_mutation("update application", mutation, async move {
                let updated = api.update_application(application_id, form).await?;
                ServerAck::entity(&updated)
            })
            .await?;
        server_entity(&ack)
    }
}
