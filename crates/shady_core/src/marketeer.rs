use tracing::{debug, info, warn};

use crate::core_api::{MarketeerEntry, UnlockOutcome, UnlockReport};
use crate::document::{Document, Element};

pub const COMPONENT_TAG: &str = "component";
pub const STOCK_ID_ATTR: &str = "stockid";
pub const TRAITS_TAG: &str = "traits";
pub const FLAGS_ATTR: &str = "flags";
pub const DEFAULT_STOCK_ID: &str = "default_shadyguy";
pub const DEFAULT_TOKEN: &str = "tradesvisible";
pub const FLAG_DELIMITER: char = '|';
pub const UNKNOWN: &str = "unknown";

/// Which components count as black marketeers and what marks them unlocked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnlockRules {
    pub stock_id: String,
    pub token: String,
}

impl Default for UnlockRules {
    fn default() -> Self {
        Self {
            stock_id: DEFAULT_STOCK_ID.to_string(),
            token: DEFAULT_TOKEN.to_string(),
        }
    }
}

impl UnlockRules {
    pub fn matches(&self, element: &Element) -> bool {
        element.name == COMPONENT_TAG && element.attr(STOCK_ID_ATTR) == Some(self.stock_id.as_str())
    }
}

/// Marketeer components in document order.
pub fn find_marketeers<'a>(
    document: &'a Document,
    rules: &'a UnlockRules,
) -> impl Iterator<Item = &'a Element> + 'a {
    document.elements().filter(move |e| rules.matches(e))
}

/// Appends the unlock token to every marketeer that lacks it.
///
/// The presence test is a plain substring match on the flags value, so a
/// longer token that happens to contain it also counts as unlocked.
pub fn unlock_marketeers(document: &mut Document, rules: &UnlockRules) -> UnlockReport {
    let mut report = UnlockReport::default();
    document.walk_mut(|element| {
        if !rules.matches(element) {
            return;
        }
        report.found += 1;
        let entry = unlock_one(element, rules);
        match entry.outcome {
            UnlockOutcome::Unlocked => info!(code = %entry.code, name = %entry.name, "unlocked"),
            UnlockOutcome::AlreadyUnlocked => {
                debug!(code = %entry.code, name = %entry.name, "already unlocked")
            }
            UnlockOutcome::MissingTraits => {
                warn!(code = %entry.code, name = %entry.name, "no traits flags, skipped")
            }
        }
        report.entries.push(entry);
    });
    report
}

fn unlock_one(element: &mut Element, rules: &UnlockRules) -> MarketeerEntry {
    let describe = |key: &str| element.attr(key).unwrap_or(UNKNOWN).to_string();
    let owner = describe("owner");
    let name = describe("name");
    let code = describe("code");

    let flags = element
        .child(TRAITS_TAG)
        .and_then(|traits| traits.attr(FLAGS_ATTR))
        .map(str::to_string);

    let outcome = match (flags, element.child_mut(TRAITS_TAG)) {
        (Some(flags), _) if flags.contains(rules.token.as_str()) => {
            UnlockOutcome::AlreadyUnlocked
        }
        (Some(flags), Some(traits)) => {
            traits.set_attr(FLAGS_ATTR, format!("{flags}{FLAG_DELIMITER}{}", rules.token));
            UnlockOutcome::Unlocked
        }
        _ => UnlockOutcome::MissingTraits,
    };

    MarketeerEntry {
        owner,
        name,
        code,
        outcome,
    }
}
