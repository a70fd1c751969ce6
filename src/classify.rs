use crate::subscription::LastNotified;
use crate::warning::WarningEntry;
use strum_macros::Display;

/// How a delivered warning relates to what a subscriber was last told.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
#[strum(serialize_all = "lowercase")]
pub enum Classification {
    New,
    Changed,
    /// Same content, only the expiry moved
    Extended,
    Unchanged,
}

impl Classification {
    /// Whether the subscriber should hear about it at all
    pub fn is_notifiable(self) -> bool {
        self != Self::Unchanged
    }
}

pub fn classify(entry: &WarningEntry, last: Option<&LastNotified>) -> Classification {
    let Some(last) = last.filter(|l| l.identifier == entry.identifier) else {
        return Classification::New;
    };
    if last.fingerprint != entry.fingerprint {
        Classification::Changed
    } else if last.expires != entry.expires() {
        Classification::Extended
    } else {
        Classification::Unchanged
    }
}
