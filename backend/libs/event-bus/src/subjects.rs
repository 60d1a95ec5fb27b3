//! Subject namespace for domain events.
//!
//! Routed subjects follow `DOMAIN_EVENTS.<producer>.<aggregate>.<event>`.
//! The legacy `outbox.>` namespace is still captured by the same stream.

/// Name of the durable stream that captures every domain event.
pub const STREAM_DOMAIN_EVENTS: &str = "DOMAIN_EVENTS";

/// Prefix of every routed domain event subject.
pub const DOMAIN_EVENTS_PREFIX: &str = "DOMAIN_EVENTS.";

/// Filter capturing all routed domain events.
pub const SUBJECT_DOMAIN_EVENTS: &str = "DOMAIN_EVENTS.>";

/// Filter capturing un-routed legacy outbox messages.
pub const SUBJECT_OUTBOX: &str = "outbox.>";

/// Default filters of the domain events stream.
pub fn default_stream_subjects() -> Vec<String> {
    vec![SUBJECT_OUTBOX.to_string(), SUBJECT_DOMAIN_EVENTS.to_string()]
}

/// Build a routed subject. Each part is reduced to a single subject token.
///
/// ```rust
/// use event_bus::subjects::domain_subject;
/// assert_eq!(
///     domain_subject("privacy", "consent", "submitted"),
///     "DOMAIN_EVENTS.privacy.consent.submitted"
/// );
/// ```
pub fn domain_subject(producer: &str, aggregate: &str, event: &str) -> String {
    format!(
        "{}{}.{}.{}",
        DOMAIN_EVENTS_PREFIX,
        token(producer),
        token(aggregate),
        event_tokens(event)
    )
}

/// Normalize a value into one subject token (no dots, wildcards or spaces).
pub fn token(value: &str) -> String {
    let cleaned: String = value
        .trim()
        .chars()
        .map(|c| match c {
            '.' | '*' | '>' => '_',
            c if c.is_whitespace() => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

/// Event types may already be dotted (`consent.submitted`); keep the dots but
/// sanitize every segment.
fn event_tokens(event: &str) -> String {
    event
        .split('.')
        .map(token)
        .collect::<Vec<_>>()
        .join(".")
}

/// Strip the stream prefix to obtain the dotted event type.
///
/// `DOMAIN_EVENTS.privacy.consent.submitted` → `privacy.consent.submitted`.
/// Subjects outside the routed namespace are returned unchanged.
pub fn event_type_from_subject(subject: &str) -> &str {
    subject.strip_prefix(DOMAIN_EVENTS_PREFIX).unwrap_or(subject)
}

/// First token after the stream prefix, or `unknown`.
///
/// `DOMAIN_EVENTS.iam.user.created` → `iam`.
pub fn source_service_from_subject(subject: &str) -> &str {
    match subject.strip_prefix(DOMAIN_EVENTS_PREFIX) {
        Some(rest) => match rest.split('.').next() {
            Some(service) if !service.is_empty() => service,
            _ => "unknown",
        },
        None => "unknown",
    }
}

/// NATS subject matching: `*` matches exactly one token, `>` one or more
/// trailing tokens.
pub fn subject_matches(filter: &str, subject: &str) -> bool {
    let mut filter_tokens = filter.split('.');
    let mut subject_tokens = subject.split('.');

    loop {
        match (filter_tokens.next(), subject_tokens.next()) {
            (Some(">"), Some(_)) => return true,
            (Some("*"), Some(s)) if !s.is_empty() => continue,
            (Some(f), Some(s)) if f == s && !s.is_empty() => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_subject_sanitizes_tokens() {
        assert_eq!(
            domain_subject("CDC Worker", "order", "Created"),
            "DOMAIN_EVENTS.cdc_worker.order.created"
        );
        assert_eq!(domain_subject("", "a>b", "x"), "DOMAIN_EVENTS.unknown.a_b.x");
        assert_eq!(
            domain_subject("privacy", "consent", "consent.submitted"),
            "DOMAIN_EVENTS.privacy.consent.consent.submitted"
        );
    }

    #[test]
    fn test_event_type_and_source_extraction() {
        let subject = "DOMAIN_EVENTS.privacy.consent.submitted";
        assert_eq!(event_type_from_subject(subject), "privacy.consent.submitted");
        assert_eq!(source_service_from_subject(subject), "privacy");

        assert_eq!(event_type_from_subject("outbox.abc"), "outbox.abc");
        assert_eq!(source_service_from_subject("outbox.abc"), "unknown");
        assert_eq!(source_service_from_subject("DOMAIN_EVENTS."), "unknown");
    }

    #[test]
    fn test_subject_matching() {
        assert!(subject_matches("DOMAIN_EVENTS.>", "DOMAIN_EVENTS.iam.user.created"));
        assert!(!subject_matches("DOMAIN_EVENTS.>", "DOMAIN_EVENTS"));
        assert!(subject_matches("outbox.>", "outbox.abc"));
        assert!(subject_matches("outbox.*", "outbox.abc"));
        assert!(!subject_matches("outbox.*", "outbox.abc.def"));
        assert!(subject_matches(
            "DOMAIN_EVENTS.public.consent.submitted",
            "DOMAIN_EVENTS.public.consent.submitted"
        ));
        assert!(!subject_matches("DOMAIN_EVENTS.public.*", "DOMAIN_EVENTS.private.x"));
        assert!(!subject_matches("a.b", "a.b.c"));
    }
}
