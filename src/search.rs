use std::collections::{BTreeMap, HashMap};

use crate::error::{Result, RosterError};
use crate::types::{Entity, Page};

const PAGE_KEY: &str = "page";

/// Query-string style state attached to a view. Survives tab switches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchState {
    params: BTreeMap<String, String>,
}

impl SearchState {
    /// Parse `page=2&sort=asc` (a leading `?` is accepted). Malformed
    /// pairs are kept as keys with empty values rather than rejected.
    pub fn parse(query: &str) -> Self {
        let mut params = BTreeMap::new();
        for pair in query.trim_start_matches('?').split('&') {
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            params.insert(decode(key), decode(value));
        }
        Self { params }
    }

    pub fn to_query(&self) -> String {
        self.params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Set one key, leaving every other key as it was
    pub fn merge(&mut self, key: &str, value: impl Into<String>) {
        self.params.insert(key.to_string(), value.into());
    }

    pub fn page(&self) -> Page {
        Page::parse(self.get(PAGE_KEY))
    }

    pub fn set_page(&mut self, page: Page) {
        self.merge(PAGE_KEY, page.get().to_string());
    }
}

fn decode(raw: &str) -> String {
    let raw = raw.replace('+', " ");
    urlencoding::decode(&raw)
        .map(|s| s.into_owned())
        .unwrap_or(raw)
}

/// A view plus its search state, e.g. `meetings?page=3`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub entity: Entity,
    pub search: SearchState,
}

impl Location {
    pub fn parse(raw: &str) -> Result<Self> {
        let (path, query) = raw.split_once('?').unwrap_or((raw, ""));
        let path = path.trim().trim_matches('/');
        if path.is_empty() {
            return Err(RosterError::Validation(format!(
                "location '{}' names no view",
                raw
            )));
        }
        Ok(Self {
            entity: path.parse()?,
            search: SearchState::parse(query),
        })
    }
}

/// Current view and the remembered search state of every view
#[derive(Debug, Clone, Default)]
pub struct Navigator {
    current: Entity,
    states: HashMap<Entity, SearchState>,
}

impl Navigator {
    pub fn new(start: Option<Location>) -> Self {
        let mut nav = Self::default();
        if let Some(location) = start {
            nav.current = location.entity;
            nav.states.insert(location.entity, location.search);
        }
        nav
    }

    pub fn current(&self) -> Entity {
        self.current
    }

    pub fn switch_to(&mut self, entity: Entity) {
        self.current = entity;
    }

    pub fn search(&self, entity: Entity) -> SearchState {
        self.states.get(&entity).cloned().unwrap_or_default()
    }

    pub fn page(&self, entity: Entity) -> Page {
        self.states
            .get(&entity)
            .map(SearchState::page)
            .unwrap_or_default()
    }

    pub fn set_page(&mut self, entity: Entity, page: Page) {
        self.states.entry(entity).or_default().set_page(page);
    }

    pub fn location(&self) -> String {
        let query = self.search(self.current).to_query();
        if query.is_empty() {
            format!("/{}", self.current.path())
        } else {
            format!("/{}?{}", self.current.path(), query)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_read_page() {
        let mut search = SearchState::default();
        for n in [1, 2, 7, 500] {
            search.set_page(Page::new(n).unwrap());
            assert_eq!(search.page().get(), n);
        }
    }

    #[test]
    fn invalid_page_values_read_as_first() {
        for raw in ["0", "-3", "abc", "", "1e3"] {
            let mut search = SearchState::default();
            search.merge("page", raw);
            assert_eq!(search.page(), Page::FIRST, "raw value {:?}", raw);
        }
        assert_eq!(SearchState::default().page(), Page::FIRST);
    }

    #[test]
    fn set_page_keeps_other_keys() {
        let mut search = SearchState::parse("sort=title&page=2&filter=open");
        search.set_page(Page::new(5).unwrap());
        assert_eq!(search.get("sort"), Some("title"));
        assert_eq!(search.get("filter"), Some("open"));
        assert_eq!(search.page().get(), 5);
    }

    #[test]
    fn parse_decodes_values() {
        let search = SearchState::parse("?q=team%20sync&owner=a+b");
        assert_eq!(search.get("q"), Some("team sync"));
        assert_eq!(search.get("owner"), Some("a b"));
    }

    #[test]
    fn query_round_trips_through_parse() {
        let mut search = SearchState::default();
        search.merge("q", "a&b");
        search.set_page(Page::new(3).unwrap());
        assert_eq!(SearchState::parse(&search.to_query()), search);
    }

    #[test]
    fn location_parse() {
        let loc = Location::parse("/meetings?page=3").unwrap();
        assert_eq!(loc.entity, Entity::Meeting);
        assert_eq!(loc.search.page().get(), 3);

        let loc = Location::parse("items").unwrap();
        assert_eq!(loc.entity, Entity::Item);
        assert_eq!(loc.search.page(), Page::FIRST);

        assert!(Location::parse("?page=2").is_err());
        assert!(Location::parse("reports?page=2").is_err());
    }

    #[test]
    fn navigator_remembers_page_per_view() {
        let mut nav = Navigator::new(Location::parse("items?page=4").ok());
        assert_eq!(nav.current(), Entity::Item);
        nav.switch_to(Entity::Meeting);
        nav.set_page(Entity::Meeting, Page::new(2).unwrap());
        nav.switch_to(Entity::Item);
        assert_eq!(nav.page(Entity::Item).get(), 4);
        assert_eq!(nav.page(Entity::Meeting).get(), 2);
        assert_eq!(nav.page(Entity::User), Page::FIRST);
        assert_eq!(nav.location(), "/items?page=4");
    }
}
