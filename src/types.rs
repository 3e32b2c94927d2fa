use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

use crate::error::RosterError;

/// The record types the dashboard manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Entity {
    #[default]
    User,
    Item,
    Meeting,
}

impl Entity {
    /// Tab order
    pub const ALL: [Entity; 3] = [Entity::User, Entity::Item, Entity::Meeting];

    /// Collection segment of the REST path
    pub fn path(&self) -> &'static str {
        match self {
            Entity::User => "users",
            Entity::Item => "items",
            Entity::Meeting => "meetings",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Entity::User => "User",
            Entity::Item => "Item",
            Entity::Meeting => "Meeting",
        }
    }

    pub fn plural(&self) -> &'static str {
        match self {
            Entity::User => "Users",
            Entity::Item => "Items",
            Entity::Meeting => "Meetings",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Entity::User => 0,
            Entity::Item => 1,
            Entity::Meeting => 2,
        }
    }

    pub fn next(&self) -> Entity {
        Entity::ALL[(self.index() + 1) % Entity::ALL.len()]
    }

    pub fn prev(&self) -> Entity {
        Entity::ALL[(self.index() + Entity::ALL.len() - 1) % Entity::ALL.len()]
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.plural())
    }
}

impl FromStr for Entity {
    type Err = RosterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_matches('/').to_ascii_lowercase().as_str() {
            "users" | "user" | "admin" => Ok(Entity::User),
            "items" | "item" => Ok(Entity::Item),
            "meetings" | "meeting" => Ok(Entity::Meeting),
            other => Err(RosterError::Validation(format!("unknown view '{}'", other))),
        }
    }
}

/// A 1-indexed page number. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Page(NonZeroU32);

impl Page {
    pub const FIRST: Page = Page(NonZeroU32::MIN);

    pub fn new(n: u32) -> Option<Page> {
        NonZeroU32::new(n).map(Page)
    }

    /// Coerce a raw navigation value. Missing, non-numeric and
    /// non-positive values all land on the first page.
    pub fn parse(raw: Option<&str>) -> Page {
        raw.and_then(|s| s.trim().parse::<u32>().ok())
            .and_then(Page::new)
            .unwrap_or(Page::FIRST)
    }

    pub fn get(&self) -> u32 {
        self.0.get()
    }

    pub fn next(&self) -> Page {
        Page(self.0.saturating_add(1))
    }

    pub fn prev(&self) -> Option<Page> {
        Page::new(self.get() - 1)
    }

    /// `(skip, limit)` for this page at the given page size
    pub fn window(&self, page_size: u32) -> (u32, u32) {
        ((self.get() - 1).saturating_mul(page_size), page_size)
    }
}

impl Default for Page {
    fn default() -> Self {
        Page::FIRST
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPublic {
    pub id: u64,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_superuser: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemPublic {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub owner_id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingPublic {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub agenda: String,
    #[serde(default)]
    pub summary: Option<String>,
    pub owner_id: u64,
}

/// One row of any of the managed tables
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    User(UserPublic),
    Item(ItemPublic),
    Meeting(MeetingPublic),
}

impl Record {
    pub fn id(&self) -> u64 {
        match self {
            Record::User(u) => u.id,
            Record::Item(i) => i.id,
            Record::Meeting(m) => m.id,
        }
    }

    pub fn entity(&self) -> Entity {
        match self {
            Record::User(_) => Entity::User,
            Record::Item(_) => Entity::Item,
            Record::Meeting(_) => Entity::Meeting,
        }
    }
}

/// A window of records as returned by a list endpoint
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordPage {
    pub data: Vec<Record>,
    /// Total rows on the server, when the backend reports it
    pub count: Option<u64>,
}

impl RecordPage {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_parse_valid() {
        assert_eq!(Page::parse(Some("3")).get(), 3);
        assert_eq!(Page::parse(Some(" 12 ")).get(), 12);
    }

    #[test]
    fn page_parse_invalid_defaults_to_first() {
        assert_eq!(Page::parse(None), Page::FIRST);
        assert_eq!(Page::parse(Some("0")), Page::FIRST);
        assert_eq!(Page::parse(Some("-4")), Page::FIRST);
        assert_eq!(Page::parse(Some("abc")), Page::FIRST);
        assert_eq!(Page::parse(Some("2.5")), Page::FIRST);
        assert_eq!(Page::parse(Some("")), Page::FIRST);
    }

    #[test]
    fn page_window() {
        assert_eq!(Page::FIRST.window(5), (0, 5));
        assert_eq!(Page::new(3).unwrap().window(5), (10, 5));
        assert_eq!(Page::new(2).unwrap().window(20), (20, 20));
    }

    #[test]
    fn page_prev_stops_at_first() {
        assert_eq!(Page::FIRST.prev(), None);
        assert_eq!(Page::new(2).unwrap().prev(), Some(Page::FIRST));
    }

    #[test]
    fn entity_cycles() {
        assert_eq!(Entity::User.next(), Entity::Item);
        assert_eq!(Entity::Meeting.next(), Entity::User);
        assert_eq!(Entity::User.prev(), Entity::Meeting);
    }

    #[test]
    fn entity_from_str() {
        assert_eq!("meetings".parse::<Entity>().unwrap(), Entity::Meeting);
        assert_eq!("/Items".parse::<Entity>().unwrap(), Entity::Item);
        assert!("widgets".parse::<Entity>().is_err());
    }

    #[test]
    fn meeting_deserializes_without_summary() {
        let json = r#"{"id": 7, "title": "Standup", "agenda": "status", "owner_id": 1}"#;
        let meeting: MeetingPublic = serde_json::from_str(json).unwrap();
        assert_eq!(meeting.summary, None);
        assert_eq!(Record::Meeting(meeting).id(), 7);
    }
}
