//! Regex-based entity extraction (§4.5 step 2), independent of the LLM
//! extractor it is merged with.

use once_cell_lite::Lazy;
use regex::Regex;

use crate::record::decision::Entity;

struct Pattern {
    regex: Lazy<Regex>,
    entity_type: &'static str,
    confidence: f64,
}

mod once_cell_lite {
    use std::sync::OnceLock;

    /// Minimal lazily-initialized value, avoiding an extra dependency
    /// for the handful of static regexes below.
    pub struct Lazy<T> {
        cell: OnceLock<T>,
        init: fn() -> T,
    }

    impl<T> Lazy<T> {
        pub const fn new(init: fn() -> T) -> Self {
            Self {
                cell: OnceLock::new(),
                init,
            }
        }

        pub fn get(&self) -> &T {
            self.cell.get_or_init(self.init)
        }
    }
}

fn hostname_fqdn() -> Regex {
    Regex::new(r"\b([a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]{2,}\b").unwrap()
}
fn hostname_ipv4() -> Regex {
    Regex::new(r"\b(?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\b").unwrap()
}
fn hostname_contextual() -> Regex {
    Regex::new(r"(?i)\b(?:server|host|machine|node)\s+([a-zA-Z0-9][a-zA-Z0-9._-]{1,62})\b").unwrap()
}
fn service_known() -> Regex {
    Regex::new(r"(?i)\b(nginx|apache|mysql|postgres(?:ql)?|redis|docker|sshd|cron|httpd|mongodb|rabbitmq|elasticsearch|kafka)\b").unwrap()
}
fn service_unit() -> Regex {
    Regex::new(r"\b([a-zA-Z0-9_-]+\.service)\b").unwrap()
}
fn service_contextual() -> Regex {
    Regex::new(r"(?i)\b(?:service|daemon)\s+([a-zA-Z0-9_-]+)\b").unwrap()
}
fn command_with_args() -> Regex {
    Regex::new(r"\b((?:/[a-zA-Z0-9_.-]+)+(?:\s+-{1,2}[a-zA-Z0-9_-]+)+)").unwrap()
}
fn command_backtick() -> Regex {
    Regex::new(r"`([^`]+)`").unwrap()
}
fn file_path_unix() -> Regex {
    Regex::new(r"(?:^|\s)(/[a-zA-Z0-9_.\-/]+)").unwrap()
}
fn file_path_windows() -> Regex {
    Regex::new(r"\b([a-zA-Z]:\\[a-zA-Z0-9_.\\\- ]+)").unwrap()
}
fn port_bare() -> Regex {
    Regex::new(r"\bport\s+(\d{1,5})\b").unwrap()
}
fn port_colon() -> Regex {
    Regex::new(r":(\d{1,5})\b").unwrap()
}
fn environment_token() -> Regex {
    Regex::new(r"(?i)\b(production|prod|staging|stage|development|dev|test|testing)\b").unwrap()
}

fn patterns() -> Vec<Pattern> {
    vec![
        Pattern {
            regex: Lazy::new(hostname_ipv4),
            entity_type: "hostname",
            confidence: 0.95,
        },
        Pattern {
            regex: Lazy::new(hostname_fqdn),
            entity_type: "hostname",
            confidence: 0.9,
        },
        Pattern {
            regex: Lazy::new(hostname_contextual),
            entity_type: "hostname",
            confidence: 0.8,
        },
        Pattern {
            regex: Lazy::new(service_known),
            entity_type: "service",
            confidence: 0.95,
        },
        Pattern {
            regex: Lazy::new(service_unit),
            entity_type: "service",
            confidence: 0.9,
        },
        Pattern {
            regex: Lazy::new(service_contextual),
            entity_type: "service",
            confidence: 0.7,
        },
        Pattern {
            regex: Lazy::new(command_with_args),
            entity_type: "command",
            confidence: 0.9,
        },
        Pattern {
            regex: Lazy::new(command_backtick),
            entity_type: "command",
            confidence: 0.85,
        },
        Pattern {
            regex: Lazy::new(file_path_unix),
            entity_type: "file_path",
            confidence: 0.8,
        },
        Pattern {
            regex: Lazy::new(file_path_windows),
            entity_type: "file_path",
            confidence: 0.8,
        },
        Pattern {
            regex: Lazy::new(port_bare),
            entity_type: "port",
            confidence: 0.9,
        },
        Pattern {
            regex: Lazy::new(port_colon),
            entity_type: "port",
            confidence: 0.85,
        },
        Pattern {
            regex: Lazy::new(environment_token),
            entity_type: "environment",
            confidence: 0.9,
        },
    ]
}

const RESTART_CONTEXT: [&str; 4] = ["restart", "start", "stop", "status"];
const SERVER_CONTEXT: [&str; 4] = ["server", "host", "machine", "node"];

/// Extracts entities from free text using the fixed regex family above,
/// with context-based confidence adjustment (§4.5 step 2).
pub fn extract_with_regex(text: &str) -> Vec<Entity> {
    let lower = text.to_lowercase();
    let mut entities = Vec::new();

    for pattern in patterns() {
        for capture in pattern.regex.get().captures_iter(text) {
            let value = capture
                .get(1)
                .or_else(|| capture.get(0))
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default();
            if value.is_empty() {
                continue;
            }
            let mut confidence = pattern.confidence;

            if pattern.entity_type == "service" && RESTART_CONTEXT.iter().any(|w| lower.contains(w)) {
                confidence = (confidence + 0.1).min(1.0);
            }
            if pattern.entity_type == "hostname" && SERVER_CONTEXT.iter().any(|w| lower.contains(w)) {
                confidence = (confidence + 0.1).min(1.0);
            }
            if pattern.entity_type == "port" {
                match value.parse::<u32>() {
                    Ok(port) if (1..=65535).contains(&port) => {}
                    _ => confidence = 0.1,
                }
            }

            entities.push(Entity {
                entity_type: pattern.entity_type.to_string(),
                value,
                confidence,
            });
        }
    }

    entities
}

pub fn supported_entity_types() -> &'static [&'static str] {
    &[
        "hostname",
        "service",
        "command",
        "file_path",
        "port",
        "environment",
        "application",
        "database",
    ]
}

pub fn validate_entity(entity: &Entity) -> bool {
    if !supported_entity_types().contains(&entity.entity_type.as_str()) {
        return false;
    }
    if !(0.0..=1.0).contains(&entity.confidence) {
        return false;
    }
    if entity.value.trim().is_empty() {
        return false;
    }
    if entity.entity_type == "port" {
        return entity.value.parse::<u32>().map(|p| (1..=65535).contains(&p)).unwrap_or(false);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_known_service_and_hostname() {
        let entities = extract_with_regex("restart nginx on web-server-01.example.com");
        assert!(entities.iter().any(|e| e.entity_type == "service" && e.value == "nginx"));
        assert!(entities.iter().any(|e| e.entity_type == "hostname"));
    }

    #[test]
    fn service_confidence_boosted_near_restart_context() {
        let entities = extract_with_regex("please restart nginx now");
        let nginx = entities.iter().find(|e| e.value == "nginx").unwrap();
        assert!(nginx.confidence > 0.95 - 1e-9);
    }

    #[test]
    fn invalid_port_collapses_confidence() {
        let entities = extract_with_regex("connect on port 99999");
        let port = entities.iter().find(|e| e.entity_type == "port").unwrap();
        assert_eq!(port.confidence, 0.1);
    }

    #[test]
    fn environment_tokens_are_recognized() {
        let entities = extract_with_regex("deploy to production now");
        assert!(entities.iter().any(|e| e.entity_type == "environment" && e.value.to_lowercase() == "production"));
    }
}
