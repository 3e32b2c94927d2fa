//! Editable forms for each record type.
//!
//! A draft is rendered to TOML for the user's editor and parsed back
//! afterwards. Selecting the right form for a record is a single match
//! over [`Record`], so adding a record type fails to compile until every
//! form path handles it.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Result, RosterError};
use crate::types::{Entity, Record};

const MIN_PASSWORD_LEN: usize = 8;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserDraft {
    pub email: String,
    #[serde(default)]
    pub full_name: String,
    /// Required on create. Left empty on edit to keep the current one.
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_superuser: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingDraft {
    pub title: String,
    #[serde(default)]
    pub agenda: String,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Draft {
    User(UserDraft),
    Item(ItemDraft),
    Meeting(MeetingDraft),
}

/// What a finished draft will be submitted as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditTarget {
    Create(Entity),
    Update { entity: Entity, id: u64 },
}

impl EditTarget {
    pub fn entity(&self) -> Entity {
        match self {
            EditTarget::Create(entity) | EditTarget::Update { entity, .. } => *entity,
        }
    }

    pub fn is_create(&self) -> bool {
        matches!(self, EditTarget::Create(_))
    }
}

/// A write against the backend
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Create(Draft),
    Update { id: u64, draft: Draft },
    Delete { entity: Entity, id: u64 },
}

impl Mutation {
    pub fn entity(&self) -> Entity {
        match self {
            Mutation::Create(draft) | Mutation::Update { draft, .. } => draft.entity(),
            Mutation::Delete { entity, .. } => *entity,
        }
    }

    /// Status bar message shown once the write succeeded
    pub fn success_message(&self) -> String {
        let label = self.entity().label();
        match self {
            Mutation::Create(_) => format!("{} created successfully.", label),
            Mutation::Update { .. } => format!("{} updated successfully.", label),
            Mutation::Delete { .. } => format!("{} deleted successfully.", label),
        }
    }
}

fn none_if_empty(s: &str) -> Value {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        Value::Null
    } else {
        Value::String(trimmed.to_string())
    }
}

impl Draft {
    pub fn blank(entity: Entity) -> Draft {
        match entity {
            Entity::User => Draft::User(UserDraft {
                email: String::new(),
                full_name: String::new(),
                password: String::new(),
                is_active: true,
                is_superuser: false,
            }),
            Entity::Item => Draft::Item(ItemDraft {
                title: String::new(),
                description: String::new(),
            }),
            Entity::Meeting => Draft::Meeting(MeetingDraft {
                title: String::new(),
                agenda: String::new(),
                summary: String::new(),
            }),
        }
    }

    pub fn from_record(record: &Record) -> Draft {
        match record {
            Record::User(u) => Draft::User(UserDraft {
                email: u.email.clone(),
                full_name: u.full_name.clone().unwrap_or_default(),
                password: String::new(),
                is_active: u.is_active,
                is_superuser: u.is_superuser,
            }),
            Record::Item(i) => Draft::Item(ItemDraft {
                title: i.title.clone(),
                description: i.description.clone().unwrap_or_default(),
            }),
            Record::Meeting(m) => Draft::Meeting(MeetingDraft {
                title: m.title.clone(),
                agenda: m.agenda.clone(),
                summary: m.summary.clone().unwrap_or_default(),
            }),
        }
    }

    pub fn entity(&self) -> Entity {
        match self {
            Draft::User(_) => Entity::User,
            Draft::Item(_) => Entity::Item,
            Draft::Meeting(_) => Entity::Meeting,
        }
    }

    /// Render as TOML, preceded by `header` as comment lines
    pub fn to_toml(&self, header: &str) -> Result<String> {
        let body = match self {
            Draft::User(d) => toml::to_string(d),
            Draft::Item(d) => toml::to_string(d),
            Draft::Meeting(d) => toml::to_string(d),
        }
        .map_err(|e| RosterError::Validation(e.to_string()))?;

        let mut out = String::new();
        for line in header.lines() {
            out.push_str("# ");
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&body);
        Ok(out)
    }

    pub fn parse(entity: Entity, text: &str) -> Result<Draft> {
        let invalid = |e: toml::de::Error| RosterError::Validation(e.message().to_string());
        Ok(match entity {
            Entity::User => Draft::User(toml::from_str(text).map_err(invalid)?),
            Entity::Item => Draft::Item(toml::from_str(text).map_err(invalid)?),
            Entity::Meeting => Draft::Meeting(toml::from_str(text).map_err(invalid)?),
        })
    }

    pub fn validate(&self, creating: bool) -> Result<()> {
        let fail = |msg: &str| Err(RosterError::Validation(msg.to_string()));
        match self {
            Draft::User(d) => {
                let email = d.email.trim();
                if email.is_empty() {
                    return fail("Email is required.");
                }
                if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
                    return fail("Invalid email address.");
                }
                if creating && d.password.is_empty() {
                    return fail("Password is required.");
                }
                if !d.password.is_empty() && d.password.chars().count() < MIN_PASSWORD_LEN {
                    return fail("Password must be at least 8 characters.");
                }
            }
            Draft::Item(d) => {
                if d.title.trim().is_empty() {
                    return fail("Title is required.");
                }
            }
            Draft::Meeting(d) => {
                if d.title.trim().is_empty() {
                    return fail("Title is required.");
                }
                if d.agenda.trim().is_empty() {
                    return fail("Agenda is required.");
                }
            }
        }
        Ok(())
    }

    /// JSON request body. On update an empty password is omitted.
    pub fn body(&self, creating: bool) -> Value {
        match self {
            Draft::User(d) => {
                let mut body = json!({
                    "email": d.email.trim(),
                    "full_name": none_if_empty(&d.full_name),
                    "is_active": d.is_active,
                    "is_superuser": d.is_superuser,
                });
                if creating || !d.password.is_empty() {
                    body["password"] = Value::String(d.password.clone());
                }
                body
            }
            Draft::Item(d) => json!({
                "title": d.title.trim(),
                "description": none_if_empty(&d.description),
            }),
            Draft::Meeting(d) => json!({
                "title": d.title.trim(),
                "agenda": d.agenda.trim(),
                "summary": none_if_empty(&d.summary),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MeetingPublic, UserPublic};

    fn meeting() -> Record {
        Record::Meeting(MeetingPublic {
            id: 3,
            title: "Planning".to_string(),
            agenda: "Q3 goals".to_string(),
            summary: None,
            owner_id: 1,
        })
    }

    #[test]
    fn from_record_picks_matching_form() {
        let draft = Draft::from_record(&meeting());
        assert_eq!(draft.entity(), Entity::Meeting);
        match draft {
            Draft::Meeting(d) => {
                assert_eq!(d.title, "Planning");
                assert_eq!(d.summary, "");
            }
            other => panic!("expected meeting draft, got {:?}", other),
        }
    }

    #[test]
    fn toml_survives_editor_round_trip() {
        let draft = Draft::from_record(&meeting());
        let text = draft.to_toml("Edit Meeting #3\nSave and quit to submit.").unwrap();
        assert!(text.starts_with("# Edit Meeting #3\n# Save and quit to submit.\n"));
        assert_eq!(Draft::parse(Entity::Meeting, &text).unwrap(), draft);
    }

    #[test]
    fn parse_reports_bad_toml() {
        let err = Draft::parse(Entity::Item, "title = ").unwrap_err();
        assert!(matches!(err, RosterError::Validation(_)));
    }

    #[test]
    fn missing_required_title_fails_validation() {
        let draft = Draft::blank(Entity::Item);
        assert!(draft.validate(true).is_err());
    }

    #[test]
    fn user_password_rules() {
        let mut d = UserDraft {
            email: "a@example.com".to_string(),
            full_name: String::new(),
            password: String::new(),
            is_active: true,
            is_superuser: false,
        };
        assert!(Draft::User(d.clone()).validate(true).is_err());
        assert!(Draft::User(d.clone()).validate(false).is_ok());
        d.password = "short".to_string();
        assert!(Draft::User(d.clone()).validate(false).is_err());
        d.password = "long-enough".to_string();
        assert!(Draft::User(d).validate(true).is_ok());
    }

    #[test]
    fn invalid_email_rejected() {
        let draft = Draft::from_record(&Record::User(UserPublic {
            id: 1,
            email: "nobody".to_string(),
            full_name: None,
            is_active: true,
            is_superuser: false,
        }));
        assert!(draft.validate(false).is_err());
    }

    #[test]
    fn update_body_omits_empty_password() {
        let draft = Draft::User(UserDraft {
            email: " a@example.com ".to_string(),
            full_name: String::new(),
            password: String::new(),
            is_active: false,
            is_superuser: true,
        });
        let body = draft.body(false);
        assert_eq!(body["email"], "a@example.com");
        assert!(body["full_name"].is_null());
        assert!(body.get("password").is_none());
    }

    #[test]
    fn meeting_body_nulls_empty_summary() {
        let body = Draft::from_record(&meeting()).body(true);
        assert_eq!(body["title"], "Planning");
        assert!(body["summary"].is_null());
    }

    #[test]
    fn mutation_messages() {
        let m = Mutation::Delete {
            entity: Entity::Meeting,
            id: 3,
        };
        assert_eq!(m.entity(), Entity::Meeting);
        assert_eq!(m.success_message(), "Meeting deleted successfully.");
    }
}
