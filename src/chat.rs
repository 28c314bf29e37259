//! Chatbot replies.
//!
//! The answering strategy sits behind [`ChatResponder`] so it can be swapped
//! without touching the route. The default is a keyword matcher.

pub trait ChatResponder: Send + Sync {
    fn reply(&self, message: &str) -> String;
}

/// Canned answers chosen by keyword. First matching topic wins.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordResponder;

const TOPICS: &[(&[&str], &str)] = &[
    (
        &["emergency", "urgent", "chest pain", "can't breathe", "bleeding"],
        "If this is a medical emergency, call your local emergency number or go to the nearest emergency room immediately.",
    ),
    (
        &["appointment", "book", "schedule", "reschedule", "cancel"],
        "You can book, view or cancel appointments from the Appointments page. Pick a doctor, choose a time, and you will get a confirmation notification.",
    ),
    (
        &["doctor", "specialist", "physician"],
        "You can browse our doctors and their specializations on the Doctors page, including who is currently available.",
    ),
    (
        &["hours", "open", "opening", "closing"],
        "Our clinics are open Monday to Friday, 8:00 to 18:00, and Saturday, 9:00 to 13:00.",
    ),
    (
        &["hello", "hi", "hey", "good morning", "good evening"],
        "Hello! I can help with appointments, finding a doctor, or our opening hours. What do you need?",
    ),
];

const FALLBACK: &str = "I'm not sure I understood. I can help with appointments, doctors, opening hours, or point you to emergency care.";

impl ChatResponder for KeywordResponder {
    fn reply(&self, message: &str) -> String {
        let message = message.to_lowercase();
        let words: Vec<&str> = message
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter(|w| !w.is_empty())
            .collect();

        let matches = |keyword: &str| {
            if keyword.contains(' ') {
                message.contains(keyword)
            } else {
                words
                    .iter()
                    .any(|w| *w == keyword || (keyword.len() > 3 && w.starts_with(keyword)))
            }
        };

        TOPICS
            .iter()
            .find(|(keywords, _)| keywords.iter().any(|k| matches(k)))
            .map(|(_, answer)| *answer)
            .unwrap_or(FALLBACK)
            .to_string()
    }
}
