//! Recognise Teams meeting invites and Bookings notifications, which carry
//! no conversation text worth keeping.

use std::sync::LazyLock;

use regex::{Regex, RegexSet};

static PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new(
        [
            r"Teams Meeting",
            r"Microsoft Teams",
            r"teams\.microsoft\.com",
            r"Meeting (?:Details|Invitation|Confirmation|Reminder)",
            r"Calendar (?:Event|Invitation|Reminder)",
            r"Teams (?:Video Call|Audio Call|Conference|Webinar)",
            r"(?:New|Updated) booking",
            r"Cancell?ed:",
            r"Microsoft Bookings",
            r"Booking Confirmation",
            r"Your booking is confirmed",
            r"Appointment (?:Confirmed|Reminder)",
            r"Join your appointment",
            r"Cancel or reschedule",
            r"Event (?:Details|Reminder)",
            r"Invitation to",
            r"has invited you to",
            r"One[- ]on[- ]One",
            r"Outlook Calendar",
        ]
        .iter()
        .map(|p| format!("(?i){p}")),
    )
    .unwrap_or_else(|e| panic!("bad built-in meeting pattern: {e}"))
});

static TEAMS_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)teams\.microsoft\.com").unwrap_or_else(|e| panic!("{e}"))
});

static JOIN_MEETING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Join.*Meeting").unwrap_or_else(|e| panic!("{e}"))
});

/// Only confident matches count: two subject hits, a hit in both subject
/// and body, a Teams join link, or a "Join ... Meeting" subject.
pub fn is_meeting_or_booking(subject: &str, body: &str) -> bool {
    let subject_hits = PATTERNS.matches(subject).iter().count();
    let body_hits = PATTERNS.matches(body).iter().count();

    subject_hits >= 2
        || (subject_hits >= 1 && body_hits >= 1)
        || TEAMS_LINK.is_match(body)
        || JOIN_MEETING.is_match(subject)
}
