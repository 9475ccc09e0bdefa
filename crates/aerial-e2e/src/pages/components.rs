//! Components reused across pages.

use crate::locator::{Locator, Selector};
use crate::result::E2eResult;
use crate::session::Session;

/// Transient notification in the corner of the app
#[derive(Debug, Clone)]
pub struct Toast {
    session: Session,
}

impl Toast {
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    /// The toast container
    #[must_use]
    pub fn container(&self) -> Locator {
        self.session.locator(Selector::test_id("toast"))
    }

    fn close_button(&self) -> Locator {
        self.session.locator(Selector::test_id("toast-close"))
    }

    /// Wait for a toast containing `text`
    pub async fn wait_for(&self, text: &str) -> E2eResult<()> {
        let toast = self.container().has_text(text);
        self.session.expect(&toast).to_be_visible().await
    }

    /// Current message
    pub async fn message(&self) -> E2eResult<String> {
        self.container().text().await
    }

    /// Whether the visible toast is an error toast
    pub async fn is_error(&self) -> E2eResult<bool> {
        Ok(self.container().attribute("data-variant").await?.as_deref() == Some("error"))
    }

    /// Close the toast and wait for it to go away
    pub async fn dismiss(&self) -> E2eResult<()> {
        self.close_button().click().await?;
        self.session.expect(&self.container()).to_be_hidden().await
    }

    /// Wait for `text`, then dismiss
    pub async fn acknowledge(&self, text: &str) -> E2eResult<()> {
        self.wait_for(text).await?;
        self.dismiss().await
    }
}

/// A select-like control: opener button plus a listbox of options
#[derive(Debug, Clone)]
pub struct Dropdown {
    session: Session,
    opener: Selector,
}

impl Dropdown {
    #[must_use]
    pub fn new(session: Session, opener: Selector) -> Self {
        Self { session, opener }
    }

    /// The opener
    #[must_use]
    pub fn opener(&self) -> Locator {
        self.session.locator(self.opener.clone())
    }

    /// Option by visible label
    #[must_use]
    pub fn option(&self, label: &str) -> Locator {
        self.session.locator(Selector::role("option", label))
    }

    /// Label currently shown on the opener
    pub async fn selected(&self) -> E2eResult<String> {
        self.opener().text().await
    }

    /// Open, pick `label`, and confirm the opener shows it
    pub async fn select(&self, label: &str) -> E2eResult<()> {
        tracing::debug!(dropdown = %self.opener, option = label, "select option");
        self.opener().click().await?;
        self.option(label).click().await?;
        self.session.expect(&self.opener()).to_contain_text(label).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::{Env, Timeouts};
    use crate::driver::{MockDriver, MockElement};
    use std::sync::Arc;

    fn session(driver: &Arc<MockDriver>) -> Session {
        Session::new(driver.clone(), Arc::new(Env::from_map([("BASE_URL", "https://a")])))
            .with_timeouts(Timeouts::default().scaled(20))
    }

    mod toast_tests {
        use super::*;

        #[tokio::test]
        async fn test_acknowledge_waits_and_dismisses() {
            let driver = Arc::new(MockDriver::new());
            driver.insert(
                &Selector::test_id("toast"),
                MockElement::new().text("Floor saved").attr("data-variant", "success"),
            );
            driver.insert(&Selector::test_id("toast-close"), MockElement::new());
            driver.on_click(&Selector::test_id("toast-close"), |dom| {
                dom.set_visible(&Selector::test_id("toast"), false);
                dom.set_visible(&Selector::test_id("toast-close"), false);
            });
            let toast = Toast::new(session(&driver));
            assert!(!toast.is_error().await.unwrap());
            toast.acknowledge("saved").await.unwrap();
            assert!(!driver.element(&Selector::test_id("toast")).unwrap().visible);
        }

        #[tokio::test]
        async fn test_wrong_text_times_out() {
            let driver = Arc::new(MockDriver::new());
            driver.insert(&Selector::test_id("toast"), MockElement::new().text("Error"));
            let toast = Toast::new(session(&driver));
            assert!(toast.wait_for("saved").await.is_err());
        }
    }

    mod dropdown_tests {
        use super::*;

        #[tokio::test]
        async fn test_select_updates_label() {
            let driver = Arc::new(MockDriver::new());
            let opener = Selector::test_id("role-select");
            driver.insert(&opener, MockElement::new().text("Member"));
            driver.insert(&Selector::role("option", "Admin"), MockElement::new().hidden());
            driver.on_click(&opener, |dom| {
                dom.set_visible(&Selector::role("option", "Admin"), true);
            });
            let o = opener.clone();
            driver.on_click(&Selector::role("option", "Admin"), move |dom| {
                dom.set_text(&o, "Admin");
                dom.set_visible(&Selector::role("option", "Admin"), false);
            });
            let dropdown = Dropdown::new(session(&driver), opener);
            dropdown.select("Admin").await.unwrap();
            assert_eq!(dropdown.selected().await.unwrap(), "Admin");
        }
    }
}
