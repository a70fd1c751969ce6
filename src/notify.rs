use crate::classify::Classification;
use crate::subscription::{Notification, Notifier};
use crate::warning::WarningEntry;
use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use std::io::{self, Write};

const TIME_FORMAT: &str = "%d.%m.%Y %H:%M";

fn local_time(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local).format(TIME_FORMAT).to_string()
}

/// Feed text uses HTML line breaks
fn plain_text(text: &str) -> String {
    text.replace("<br/>", "\n")
        .replace("<br />", "\n")
        .replace("<br>", "\n")
}

/// The complete text of a warning.
pub fn render_warning(entry: &WarningEntry) -> String {
    let mut lines = Vec::new();
    let event = entry.event();
    if event.is_empty() {
        lines.push(entry.headline().to_owned());
    } else {
        lines.push(format!("[{}] {}", event, entry.headline()));
    }

    let info = entry.info.first();
    let details = [
        local_time(entry.sent),
        entry.msg_type.clone(),
        info.map(|i| i.urgency.clone()).unwrap_or_default(),
        info.map(|i| i.severity.clone()).unwrap_or_default(),
        info.map(|i| i.certainty.clone()).unwrap_or_default(),
        entry.provider.to_string(),
    ];
    lines.push(details.join(" | "));

    if let Some(effective) = entry.effective().filter(|e| Some(*e) != entry.onset()) {
        lines.push(format!("Effective from: {}", local_time(effective)));
    }
    if let Some(onset) = entry.onset() {
        lines.push(format!("Valid from: {}", local_time(onset)));
    }
    if let Some(expires) = entry.expires() {
        lines.push(format!("Valid until: {}", local_time(expires)));
    }

    lines.push(entry.area_description());
    if let Some(info) = info {
        for text in [&info.description, &info.instruction] {
            if !text.is_empty() {
                lines.push(String::new());
                lines.push(plain_text(text));
            }
        }
        if let Some(web) = &info.web {
            lines.push(web.clone());
        }
    }
    lines.join("\n")
}

/// A short notice for a warning whose validity moved.
pub fn render_extension(entry: &WarningEntry) -> String {
    match entry.expires() {
        Some(expires) => format!(
            "Warning \"{}\" extended until {}",
            entry.headline(),
            local_time(expires)
        ),
        None => format!("Warning \"{}\" no longer has an expiry", entry.headline()),
    }
}

pub fn render(notification: &Notification<'_>) -> String {
    match notification.classification {
        Classification::Extended => render_extension(notification.entry),
        _ => render_warning(notification.entry),
    }
}

/// Prints notifications for one location to stdout.
pub struct ConsoleNotifier {
    label: String,
}

impl ConsoleNotifier {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl Notifier for ConsoleNotifier {
    fn notify(&self, notification: &Notification<'_>) -> Result<()> {
        let mut stdout = io::stdout().lock();
        writeln!(
            stdout,
            "== {} ({} warning) ==",
            self.label, notification.classification
        )?;
        writeln!(stdout, "{}\n", render(notification))?;
        stdout.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::entry;

    #[test]
    fn full_warning_text() {
        let mut warning = entry("DE-BY-1", "091720000000");
        warning.info[0].web = Some("https://www.lfu.bayern.de".into());
        let text = render_warning(&warning);
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(lines[0], "[Gefahrenmitteilung] Verunreinigung der Rodach");
        assert!(lines[1].ends_with("| Update | Immediate | Severe | Observed | MOWAS"));
        // effective equals onset so only onset is shown
        assert!(!text.contains("Effective from"));
        assert!(text.contains("Valid from: "));
        assert!(text.contains("Valid until: "));
        assert!(text.contains("Landkreis Kronach"));
        assert!(text.contains("Schadstoffwelle im Fluss\nKontakt meiden"));
        assert!(text.ends_with("https://www.lfu.bayern.de"));
    }

    #[test]
    fn extension_notice() {
        let mut warning = entry("DE-BY-1", "091720000000");
        let notification = Notification {
            classification: Classification::Extended,
            entry: &warning,
            previous: None,
        };
        assert!(render(&notification)
            .starts_with("Warning \"Verunreinigung der Rodach\" extended until "));

        warning.info[0].expires = None;
        assert_eq!(
            render_extension(&warning),
            "Warning \"Verunreinigung der Rodach\" no longer has an expiry"
        );
    }
}
