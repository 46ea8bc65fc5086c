use kindred_types::models::{MessageRecord, Ownership, Viewer};

/// One line typed by the user.
#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Quit,
    Blank,
    Message(String),
}

pub fn parse_input(line: &str) -> Input {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        Input::Blank
    } else if trimmed == "/quit" {
        Input::Quit
    } else {
        Input::Message(line.to_string())
    }
}

/// `[03:07 PM] Amy Lee: hi`, or `you` for the viewer's own messages.
pub fn format_entry(record: &MessageRecord, side: Ownership) -> String {
    let name = match side {
        Ownership::Mine => "you".to_string(),
        Ownership::Theirs => {
            let name = record.sender_name();
            if name.is_empty() { "unknown".to_string() } else { name }
        }
    };
    format!("[{}] {}: {}", record.timestamp, name, record.text)
}

pub fn status_line(title: &str, status: &str) -> String {
    format!("== {} ({}) ==", title, status)
}

/// Viewer identity taken from `KINDRED_VIEWER_*` instead of the profile endpoint.
pub fn viewer_override<F>(lookup: F) -> Option<Viewer>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    let id = var("KINDRED_VIEWER_ID")?;
    Some(Viewer {
        first_name: var("KINDRED_VIEWER_FIRST_NAME").unwrap_or_else(|| id.clone()),
        last_name: var("KINDRED_VIEWER_LAST_NAME").unwrap_or_default(),
        id: id.into(),
    })
}
