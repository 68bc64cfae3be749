//! Reminder texts for the push and chat channels.

use crate::i18n;
use crate::services::ports::PushPayload;
use crate::services::recurrence::Occurrence;

const RECURRING_MARK: &str = "🔁";

/// Title shown to the user; series are marked so they stand out from one-offs.
pub fn display_title(occurrence: &Occurrence) -> String {
    if occurrence.is_recurring {
        format!("{} {}", RECURRING_MARK, occurrence.title)
    } else {
        occurrence.title.clone()
    }
}

fn time_of_day(occurrence: &Occurrence) -> String {
    occurrence.start_time.format("%H:%M").to_string()
}

pub fn push_payload(
    occurrence: &Occurrence,
    lead_minutes: i64,
    lang: &str,
    url: &str,
) -> PushPayload {
    let app = i18n::tr(Some(lang), "app.name", None);
    let title = display_title(occurrence);
    let minutes = lead_minutes.to_string();
    let time = time_of_day(occurrence);

    PushPayload {
        title: i18n::tr(
            Some(lang),
            "reminder.push_title",
            Some(&[("app", &app), ("title", &title)]),
        ),
        body: i18n::tr(
            Some(lang),
            "reminder.push_body",
            Some(&[("minutes", &minutes), ("time", &time)]),
        ),
        url: url.to_string(),
    }
}

/// HTML message for the chat bot. The title is user text and gets escaped.
pub fn chat_message(occurrence: &Occurrence, lead_minutes: i64, lang: &str) -> String {
    let app = i18n::tr(Some(lang), "app.name", None);
    let title = escape_html(&display_title(occurrence));
    let minutes = lead_minutes.to_string();
    let time = time_of_day(occurrence);

    i18n::tr(
        Some(lang),
        "reminder.chat_message",
        Some(&[
            ("app", &app),
            ("title", &title),
            ("time", &time),
            ("minutes", &minutes),
        ]),
    )
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::recurrence::expand;
    use crate::services::recurrence::tests::{date, template};

    #[test]
    fn push_payload_marks_series_and_uses_lead_time() {
        let t = template("Standup", "2024-01-01 09:00", None, Some(vec![2]));
        let occ = expand(&t, date("2024-01-09")).unwrap();

        let payload = push_payload(&occ, 10, "pt", "/");
        assert_eq!(payload.title, "Agenda: 🔁 Standup");
        assert_eq!(payload.body, "Começa em 10 min: 09:00");
        assert_eq!(payload.url, "/");

        let en = push_payload(&occ, 10, "en", "/");
        assert_eq!(en.body, "Starts in 10 min: 09:00");
    }

    #[test]
    fn chat_message_escapes_title() {
        let t = template("<b>Tom & Jerry</b>", "2024-01-08 14:30", None, None);
        let occ = expand(&t, date("2024-01-08")).unwrap();

        let msg = chat_message(&occ, 15, "en");
        assert!(msg.contains("&lt;b&gt;Tom &amp; Jerry&lt;/b&gt;"));
        assert!(msg.contains("14:30"));
        assert!(msg.contains("15 minutes left"));
        assert!(!msg.contains("🔁"));
    }
}
