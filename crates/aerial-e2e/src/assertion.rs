//! Domain assertions shared by the suites.

use std::fmt::{Debug, Display};

use crate::pages::issues::IssueCard;
use crate::result::{E2eError, E2eResult};
use crate::service::backend::IssueAttributes;

/// Exactly one entry is checked; returns its label
pub fn assert_exactly_one_checked<S: AsRef<str>>(states: &[(S, bool)]) -> E2eResult<String> {
    let checked: Vec<&str> = states
        .iter()
        .filter(|(_, on)| *on)
        .map(|(label, _)| label.as_ref())
        .collect();
    match checked.as_slice() {
        [only] => Ok((*only).to_string()),
        _ => Err(E2eError::assertion(
            "exactly one option checked",
            "1 checked",
            format!("{} checked {:?}", checked.len(), checked),
        )),
    }
}

/// An assertion pinned to the value the product currently produces, which
/// is believed to be wrong
///
/// The check passes on the documented value and logs the intended one, so
/// the defect stays visible in the run output. If the product starts
/// returning the intended value the check fails, prompting the deviation to
/// be retired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownDeviation<T> {
    /// What is being checked
    pub description: &'static str,
    /// Value the product returns today
    pub documented: T,
    /// Value the product should return
    pub intended: T,
}

impl<T: PartialEq + Debug> KnownDeviation<T> {
    /// Assert `actual` against the documented value
    pub fn check(&self, actual: &T) -> E2eResult<()> {
        tracing::warn!(
            check = self.description,
            documented = ?self.documented,
            intended = ?self.intended,
            "asserting known deviation"
        );
        if *actual == self.documented {
            return Ok(());
        }
        let note = if *actual == self.intended {
            " (intended value observed; deviation may be fixed)"
        } else {
            ""
        };
        Err(E2eError::assertion(
            format!("{}{note}", self.description),
            format!("{:?}", self.documented),
            format!("{actual:?}"),
        ))
    }
}

/// Issue pin state after creation: intended unpinned, currently pinned
pub const ISSUE_PINNED_ON_CREATE: KnownDeviation<bool> = KnownDeviation {
    description: "new issue pinned flag",
    documented: true,
    intended: false,
};

fn compare<T: PartialEq + Display>(field: &str, ui: &T, api: &T, mismatches: &mut Vec<String>) {
    if ui != api {
        mismatches.push(format!("{field}: sidebar {ui} vs api {api}"));
    }
}

/// The sidebar card shows the values the creation response returned
///
/// Title, creator, status and creation instant are compared; every
/// mismatch is reported at once.
pub fn assert_same_issue(ui: &IssueCard, api: &IssueAttributes) -> E2eResult<()> {
    let mut mismatches = Vec::new();
    compare("title", &ui.title, &api.title, &mut mismatches);
    compare("creator", &ui.creator, &api.created_by, &mut mismatches);
    compare(
        "status",
        &ui.status.to_lowercase(),
        &api.status.to_lowercase(),
        &mut mismatches,
    );
    compare("created_at", &ui.created_at, &api.created_at, &mut mismatches);
    if mismatches.is_empty() {
        return Ok(());
    }
    Err(E2eError::assertion(
        "issue matches across sidebar and api",
        "all fields equal",
        mismatches.join("; "),
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    mod selection_tests {
        use super::*;

        #[test]
        fn test_exactly_one_checked() {
            let states = [("Terrain", false), ("Point Cloud", true), ("3D Mesh Model", false)];
            assert_eq!(assert_exactly_one_checked(&states).unwrap(), "Point Cloud");
        }

        #[test]
        fn test_none_or_many_checked_fails() {
            assert!(assert_exactly_one_checked(&[("a", false), ("b", false)]).is_err());
            let err = assert_exactly_one_checked(&[("a", true), ("b", true)]).unwrap_err();
            assert!(err.to_string().contains("2 checked"));
        }
    }

    mod deviation_tests {
        use super::*;

        #[test]
        fn test_documented_value_passes() {
            ISSUE_PINNED_ON_CREATE.check(&true).unwrap();
        }

        #[test]
        fn test_intended_value_flags_possible_fix() {
            let err = ISSUE_PINNED_ON_CREATE.check(&false).unwrap_err();
            assert!(err.to_string().contains("may be fixed"));
        }
    }

    mod issue_tests {
        use super::*;

        fn api() -> IssueAttributes {
            IssueAttributes {
                title: "Crack on slab".into(),
                status: "open".into(),
                created_by: "QA Pilot".into(),
                created_at: Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap(),
                pinned: true,
            }
        }

        fn card() -> IssueCard {
            IssueCard {
                title: "Crack on slab".into(),
                status: "Open".into(),
                creator: "QA Pilot".into(),
                created_at: Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap(),
                pinned: true,
            }
        }

        #[test]
        fn test_matching_issue() {
            assert_same_issue(&card(), &api()).unwrap();
        }

        #[test]
        fn test_all_mismatches_reported() {
            let mut ui = card();
            ui.title = "Other".into();
            ui.creator = "Someone".into();
            let err = assert_same_issue(&ui, &api()).unwrap_err().to_string();
            assert!(err.contains("title"));
            assert!(err.contains("creator"));
            assert!(!err.contains("status"));
        }
    }
}
