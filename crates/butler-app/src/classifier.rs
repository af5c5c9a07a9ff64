//! Power-menu recognition rules
//!
//! [`MenuClassifier`] is the replaceable policy the power-menu blocker consults for each
//! accessibility event. [`RuleClassifier`] is the default, built from
//! [`ClassifierSettings`]. [`ForegroundMatcher`] answers the simpler question the
//! overlay's OEM fallback asks about the foreground activity.

use std::fmt;

use regex::{Regex, RegexBuilder};

use butler_core::prelude::*;
use butler_core::ComponentName;

use crate::config::{ClassifierSettings, OverlaySettings};

/// Decides whether a window belongs to the power menu
pub trait MenuClassifier: Send + Sync + fmt::Debug {
    fn is_power_menu(&self, package: &str, class: &str) -> bool;
}

/// Case-insensitive "contains any of" matcher; `None` when the list is empty
fn any_substring(patterns: &[String]) -> Result<Option<Regex>> {
    let alternatives: Vec<String> = patterns
        .iter()
        .filter(|p| !p.is_empty())
        .map(|p| regex::escape(p))
        .collect();
    if alternatives.is_empty() {
        return Ok(None);
    }
    RegexBuilder::new(&alternatives.join("|"))
        .case_insensitive(true)
        .build()
        .map(Some)
        .map_err(|e| Error::config_invalid(format!("bad classifier pattern: {}", e)))
}

fn matches(regex: &Option<Regex>, haystack: &str) -> bool {
    regex.as_ref().is_some_and(|r| r.is_match(haystack))
}

/// Package must look like a system/power package and the class must match a
/// power-menu pattern (or be a dialog owned by a system package)
#[derive(Debug)]
pub struct RuleClassifier {
    system_packages: Option<Regex>,
    exact_system_packages: Vec<String>,
    power_menu_classes: Option<Regex>,
    system_dialog_class: Option<Regex>,
}

impl RuleClassifier {
    pub fn from_settings(settings: &ClassifierSettings) -> Result<Self> {
        Ok(Self {
            system_packages: any_substring(&settings.system_packages)?,
            exact_system_packages: settings
                .exact_system_packages
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
            power_menu_classes: any_substring(&settings.power_menu_classes)?,
            system_dialog_class: any_substring(std::slice::from_ref(
                &settings.system_dialog_class,
            ))?,
        })
    }

    fn is_system_package(&self, package: &str) -> bool {
        matches(&self.system_packages, package)
            || self
                .exact_system_packages
                .iter()
                .any(|p| p.eq_ignore_ascii_case(package))
    }
}

impl MenuClassifier for RuleClassifier {
    fn is_power_menu(&self, package: &str, class: &str) -> bool {
        if !self.is_system_package(package) {
            return false;
        }
        matches(&self.power_menu_classes, class) || matches(&self.system_dialog_class, class)
    }
}

/// Foreground-activity check for the overlay's detection loop
#[derive(Debug)]
pub struct ForegroundMatcher {
    packages: Option<Regex>,
    classes: Option<Regex>,
}

impl ForegroundMatcher {
    pub fn from_settings(settings: &OverlaySettings) -> Result<Self> {
        Ok(Self {
            packages: any_substring(&settings.detection_packages)?,
            classes: any_substring(&settings.detection_classes)?,
        })
    }

    pub fn is_power_menu_ui(&self, component: &ComponentName) -> bool {
        matches(&self.packages, &component.package) || matches(&self.classes, &component.class)
    }
}
