//! Best-effort recovery of day selections from historical free-text
//! descriptions.
//!
//! Early records predate the structured `order_selections` table and only
//! carry a human-written summary such as
//! `"2024-09-02 Anna: lunch Spaghetti, snack Apple; 2024-09-03 Anna: lunch Stew"`.
//! This adapter is inherently lossy: recovered items have no catalog code
//! of their own and a zero price snapshot, and unparseable fragments are
//! counted rather than guessed at. It is kept strictly apart from the
//! sanitizer; its one production call site is the duplicate guard's
//! paid-slot assembly.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::models::{date_in_week, DaySelection, MenuItem};

/// Result of a legacy description parse, with an explicit loss marker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LegacyImport {
    pub selections: Vec<DaySelection>,
    /// Fragments that could not be interpreted (or fell outside the week).
    pub skipped: usize,
}

impl LegacyImport {
    pub fn is_lossy(&self) -> bool {
        self.skipped > 0
    }
}

fn entry_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<date>\d{4}-\d{2}-\d{2})\s*(?:(?P<child>[^:]+):)?\s*(?P<items>.+)$")
            .expect("legacy entry pattern is valid")
    })
}

fn item_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^(?P<category>lunch|snack)\s+(?P<name>.+)$")
            .expect("legacy item pattern is valid")
    })
}

/// Parses a legacy description into low-confidence selections for the
/// given week. Entries are separated by `;` or newlines; items within an
/// entry by `,`.
pub fn selections_from_description(description: &str, week_start: NaiveDate) -> LegacyImport {
    let mut selections = Vec::new();
    let mut skipped = 0;

    for fragment in description.split(|c| c == ';' || c == '\n') {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            continue;
        }

        let Some(captures) = entry_pattern().captures(fragment) else {
            skipped += 1;
            continue;
        };

        let Ok(date) = captures["date"].parse::<NaiveDate>() else {
            skipped += 1;
            continue;
        };
        if !date_in_week(week_start, date) {
            skipped += 1;
            continue;
        }

        let child_ref = captures
            .name("child")
            .map(|m| m.as_str().trim().to_string())
            .filter(|c| !c.is_empty());

        let mut lunch = None;
        let mut snack = None;
        for raw_item in captures["items"].split(',') {
            let raw_item = raw_item.trim();
            if raw_item.is_empty() {
                continue;
            }
            match item_pattern().captures(raw_item) {
                Some(item) => {
                    let recovered = recovered_item(item["name"].trim());
                    if item["category"].eq_ignore_ascii_case("lunch") {
                        lunch = Some(recovered);
                    } else {
                        snack = Some(recovered);
                    }
                }
                None => skipped += 1,
            }
        }

        if lunch.is_none() && snack.is_none() {
            skipped += 1;
            continue;
        }

        selections.push(DaySelection {
            date,
            child_ref,
            lunch,
            snack,
        });
    }

    LegacyImport {
        selections,
        skipped,
    }
}

/// Legacy items never carry a catalog code or a usable price snapshot.
fn recovered_item(name: &str) -> MenuItem {
    MenuItem {
        code: name.to_string(),
        name: name.to_string(),
        price: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, 2).unwrap()
    }

    #[test]
    fn parses_a_multi_day_guardian_description() {
        let description =
            "2024-09-02 Anna: lunch Spaghetti, snack Apple; 2024-09-03 Anna: lunch Stew";
        let import = selections_from_description(description, monday());

        assert!(!import.is_lossy());
        assert_eq!(import.selections.len(), 2);

        let first = &import.selections[0];
        assert_eq!(first.child_ref.as_deref(), Some("Anna"));
        assert_eq!(first.lunch.as_ref().unwrap().name, "Spaghetti");
        assert_eq!(first.snack.as_ref().unwrap().name, "Apple");
        assert_eq!(first.lunch.as_ref().unwrap().price, 0);
    }

    #[test]
    fn staff_entries_have_no_child_segment() {
        let import = selections_from_description("2024-09-04 lunch Goulash", monday());
        assert_eq!(import.selections.len(), 1);
        assert_eq!(import.selections[0].child_ref, None);
    }

    #[test]
    fn garbage_fragments_are_counted_not_guessed() {
        let description = "2024-09-02 Anna: lunch Soup; have a nice day; 2024-09-33 Anna: lunch X";
        let import = selections_from_description(description, monday());
        assert_eq!(import.selections.len(), 1);
        assert_eq!(import.skipped, 2);
        assert!(import.is_lossy());
    }

    #[test]
    fn out_of_week_dates_are_skipped() {
        let import = selections_from_description("2024-09-09 Anna: lunch Soup", monday());
        assert!(import.selections.is_empty());
        assert_eq!(import.skipped, 1);
    }

    #[test]
    fn unknown_item_categories_are_skipped() {
        let import =
            selections_from_description("2024-09-02 Anna: dessert Cake, lunch Soup", monday());
        assert_eq!(import.selections.len(), 1);
        assert!(import.selections[0].snack.is_none());
        assert_eq!(import.skipped, 1);
    }
}
