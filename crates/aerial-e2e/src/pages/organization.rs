//! Organization members: invite, role changes and removal.

use serde::{Deserialize, Serialize};

use crate::locator::{Locator, Selector};
use crate::network::{HttpMethod, ResponsePredicate, StatusRange};
use crate::pages::components::Dropdown;
use crate::pages::PageObject;
use crate::result::{E2eError, E2eResult};
use crate::service::backend::{Document, Resource};
use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberAttributes {
    pub email: String,
    pub role: String,
    /// `invited` until the invitation is accepted
    #[serde(default)]
    pub status: Option<String>,
}

pub type Member = Resource<MemberAttributes>;

#[derive(Debug, Clone)]
pub struct OrganizationPage {
    session: Session,
}

impl PageObject for OrganizationPage {
    const NAME: &'static str = "organization";

    fn new(session: Session) -> Self {
        Self { session }
    }

    fn session(&self) -> &Session {
        &self.session
    }

    fn url_path(&self) -> E2eResult<String> {
        Ok("/organization/members".to_string())
    }
}

impl OrganizationPage {
    /// Every member row
    pub fn member_rows(&self) -> Locator {
        self.session.locator(Selector::test_id("member-row"))
    }

    /// Member row containing `email`
    pub fn member_row(&self, email: &str) -> Locator {
        self.member_rows().has_text(email)
    }

    fn role_select(&self, email: &str) -> Dropdown {
        Dropdown::new(
            self.session.clone(),
            Selector::test_id("member-row")
                .has_text(email)
                .within(Selector::test_id("member-role-select")),
        )
    }

    /// Invite `email` with `role` and return the created member
    pub async fn invite(&self, email: &str, role: &str) -> E2eResult<Member> {
        tracing::info!(email, role, "invite member");
        self.session.locator(Selector::test_id("member-invite")).click().await?;
        self.session
            .locator(Selector::test_id("invite-email-input"))
            .fill(email)
            .await?;
        Dropdown::new(self.session.clone(), Selector::test_id("invite-role-select"))
            .select(role)
            .await?;
        let send = self.session.locator(Selector::test_id("invite-send"));
        let response = self
            .session
            .correlator()
            .arm(ResponsePredicate::new(HttpMethod::Post, "/members").with_status(StatusRange::Any))
            .fire(|| send.click())
            .await?;
        let member = response.json::<Document<Member>>()?.data;
        if member.attributes.email != email {
            return Err(E2eError::assertion("invited member email", email, &member.attributes.email));
        }
        self.session
            .expect(&self.member_row(email).first())
            .to_be_visible()
            .await?;
        Ok(member)
    }

    /// Emails of every member row
    pub async fn member_emails(&self) -> E2eResult<Vec<String>> {
        let rows = self.member_rows();
        let mut emails = Vec::new();
        for i in 0..rows.count().await? {
            let email = rows.nth(i).attribute("data-email").await?;
            emails.push(email.unwrap_or_default());
        }
        Ok(emails)
    }

    /// Role shown for a member
    pub async fn role_of(&self, email: &str) -> E2eResult<String> {
        self.role_select(email).selected().await
    }

    /// Change a member's role and wait for the backend to accept it
    pub async fn change_role(&self, email: &str, role: &str) -> E2eResult<Member> {
        let select = self.role_select(email);
        let response = self
            .session
            .correlator()
            .arm(ResponsePredicate::new(HttpMethod::Patch, "/members/").with_status(StatusRange::Any))
            .fire(|| select.select(role))
            .await?;
        let member = response.json::<Document<Member>>()?.data;
        if member.attributes.role != role {
            return Err(E2eError::assertion("member role", role, &member.attributes.role));
        }
        Ok(member)
    }

    /// Remove a member; requires `204` and the row gone
    pub async fn remove(&self, email: &str) -> E2eResult<()> {
        tracing::info!(email, "remove member");
        let row = self.member_row(email);
        row.locator(Selector::test_id("member-remove")).first().click().await?;
        let confirm = self.session.locator(Selector::test_id("confirm-delete"));
        let response = self
            .session
            .correlator()
            .arm(ResponsePredicate::new(HttpMethod::Delete, "/members/").with_status(StatusRange::Any))
            .fire(|| confirm.click())
            .await?;
        response.expect_status(204)?;
        self.session.expect(&row).to_have_count(0).await
    }
}
