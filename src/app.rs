use std::sync::Arc;

use crossterm::event::{KeyCode, KeyEvent};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::action::{Action, EditorContext, MenuAction};
use crate::cache::QueryCache;
use crate::draft::{Draft, EditTarget, Mutation};
use crate::editor;
use crate::pagination::PaginatedList;
use crate::search::Navigator;
use crate::service::RecordService;
use crate::tui::Event;
use crate::types::{Entity, Page, Record};

/// Overlay drawn above the table
#[derive(Debug, Clone, PartialEq)]
pub enum Popup {
    Actions { record: Record, selected: usize },
    ConfirmDelete { entity: Entity, id: u64 },
}

/// Settings shared by every list view
#[derive(Debug, Clone, Copy)]
pub struct ListSettings {
    pub page_size: u32,
    pub exact_next_page: bool,
}

pub struct App {
    pub nav: Navigator,
    pub selected: usize,
    pub popup: Option<Popup>,
    pub notice: Option<String>,
    pub error: Option<String>,
    /// A write is in flight
    pub busy: bool,
    pub should_quit: bool,
    lists: Vec<PaginatedList>,
    service: Arc<dyn RecordService>,
    action_tx: mpsc::UnboundedSender<Action>,
}

impl App {
    pub fn new(
        service: Arc<dyn RecordService>,
        cache: QueryCache,
        settings: ListSettings,
        nav: Navigator,
        action_tx: mpsc::UnboundedSender<Action>,
    ) -> Self {
        let lists = Entity::ALL
            .iter()
            .map(|&entity| {
                PaginatedList::new(
                    entity,
                    settings.page_size,
                    cache.clone(),
                    Arc::clone(&service),
                )
                .with_exact_next_page(settings.exact_next_page)
            })
            .collect();

        Self {
            nav,
            selected: 0,
            popup: None,
            notice: None,
            error: None,
            busy: false,
            should_quit: false,
            lists,
            service,
            action_tx,
        }
    }

    pub fn entity(&self) -> Entity {
        self.nav.current()
    }

    /// List of the current view
    pub fn list(&self) -> &PaginatedList {
        &self.lists[self.entity().index()]
    }

    pub fn selected_record(&self) -> Option<&Record> {
        let view = self.list().view();
        if view.is_placeholder {
            return None;
        }
        view.records.get(self.selected)
    }

    pub fn handle_event(&self, event: Event) -> Action {
        match event {
            Event::Init => Action::Load,
            Event::Key(key) => self.handle_key(key),
            _ => Action::None,
        }
    }

    fn handle_key(&self, key: KeyEvent) -> Action {
        match &self.popup {
            Some(Popup::Actions { .. }) => match key.code {
                KeyCode::Char('j') | KeyCode::Down => Action::PopupDown,
                KeyCode::Char('k') | KeyCode::Up => Action::PopupUp,
                KeyCode::Enter => Action::PopupSelect,
                KeyCode::Esc | KeyCode::Char('q') => Action::Back,
                _ => Action::None,
            },
            Some(Popup::ConfirmDelete { .. }) => match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => Action::ConfirmYes,
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc | KeyCode::Char('q') => {
                    Action::ConfirmNo
                }
                _ => Action::None,
            },
            None => match key.code {
                KeyCode::Char('q') | KeyCode::Esc => Action::Quit,
                KeyCode::Char('j') | KeyCode::Down => Action::ScrollDown,
                KeyCode::Char('k') | KeyCode::Up => Action::ScrollUp,
                KeyCode::Char('g') => Action::GoToTop,
                KeyCode::Char('G') => Action::GoToBottom,
                KeyCode::Char('n') | KeyCode::Char('l') | KeyCode::Right => Action::NextPage,
                KeyCode::Char('p') | KeyCode::Char('h') | KeyCode::Left => Action::PrevPage,
                KeyCode::Char('0') | KeyCode::Home => Action::FirstPage,
                KeyCode::Tab => Action::NextTab,
                KeyCode::BackTab => Action::PrevTab,
                KeyCode::Char('1') => Action::SwitchTab(Entity::User),
                KeyCode::Char('2') => Action::SwitchTab(Entity::Item),
                KeyCode::Char('3') => Action::SwitchTab(Entity::Meeting),
                KeyCode::Enter => Action::OpenActions,
                KeyCode::Char('a') => Action::AddRecord,
                KeyCode::Char('r') => Action::Refresh,
                _ => Action::None,
            },
        }
    }

    pub fn update(&mut self, action: Action) {
        if !matches!(
            action,
            Action::PageLoaded { .. } | Action::Error(_) | Action::None
        ) {
            self.error = None;
            self.notice = None;
        }

        match action {
            Action::Quit => {
                self.should_quit = true;
            }
            Action::Back => {
                if self.popup.take().is_none() {
                    self.should_quit = true;
                }
            }
            Action::ScrollUp => {
                self.selected = self.selected.saturating_sub(1);
            }
            Action::ScrollDown => {
                let len = self.list().view().records.len();
                if len > 0 && self.selected < len - 1 {
                    self.selected += 1;
                }
            }
            Action::GoToTop => {
                self.selected = 0;
            }
            Action::GoToBottom => {
                self.selected = self.list().view().records.len().saturating_sub(1);
            }

            Action::Load => {
                let entity = self.entity();
                self.show_page(entity, self.nav.page(entity));
            }
            Action::NextPage => {
                if self.list().has_next_page() {
                    self.go_to_page(self.list().page().next());
                }
            }
            Action::PrevPage => {
                if let Some(prev) = self.list().page().prev() {
                    self.go_to_page(prev);
                }
            }
            Action::FirstPage => {
                if self.list().page() != Page::FIRST {
                    self.go_to_page(Page::FIRST);
                }
            }
            Action::Refresh => {
                let index = self.entity().index();
                if self.lists[index].invalidate() {
                    self.spawn_fetch(index);
                }
            }
            Action::PageLoaded { ticket, result } => {
                let entity = ticket.key.entity;
                let list = &mut self.lists[entity.index()];
                if list.settle(ticket, result) {
                    list.prefetch_next();
                    if entity == self.nav.current() {
                        self.clamp_selection();
                    }
                }
            }

            Action::NextTab => self.switch_tab(self.entity().next()),
            Action::PrevTab => self.switch_tab(self.entity().prev()),
            Action::SwitchTab(entity) => {
                if entity != self.entity() {
                    self.switch_tab(entity);
                }
            }

            Action::OpenActions => {
                if let Some(record) = self.selected_record().cloned() {
                    self.popup = Some(Popup::Actions {
                        record,
                        selected: 0,
                    });
                }
            }
            Action::PopupUp => {
                if let Some(Popup::Actions { selected, .. }) = &mut self.popup {
                    *selected = selected.saturating_sub(1);
                }
            }
            Action::PopupDown => {
                if let Some(Popup::Actions { selected, .. }) = &mut self.popup {
                    if *selected + 1 < MenuAction::ALL.len() {
                        *selected += 1;
                    }
                }
            }
            Action::PopupSelect => {
                let Some(Popup::Actions { record, selected }) = self.popup.clone() else {
                    return;
                };
                self.popup = None;
                match MenuAction::ALL[selected] {
                    MenuAction::Edit => self.open_editor(
                        EditTarget::Update {
                            entity: record.entity(),
                            id: record.id(),
                        },
                        Draft::from_record(&record),
                    ),
                    MenuAction::Delete => {
                        self.popup = Some(Popup::ConfirmDelete {
                            entity: record.entity(),
                            id: record.id(),
                        });
                    }
                }
            }
            Action::ConfirmYes => {
                if let Some(Popup::ConfirmDelete { entity, id }) = self.popup.take() {
                    self.spawn_mutation(Mutation::Delete { entity, id });
                }
            }
            Action::ConfirmNo => {
                self.popup = None;
            }

            Action::AddRecord => {
                let entity = self.entity();
                self.open_editor(EditTarget::Create(entity), Draft::blank(entity));
            }
            // Handled by the main loop, which owns the terminal
            Action::SuspendForEditor(_) => {}
            Action::EditorClosed { ctx, text } => self.submit_draft(ctx, text),

            Action::Mutated { entity, message } => {
                self.busy = false;
                info!(entity = entity.path(), "{}", message);
                self.notice = Some(message);
                let index = entity.index();
                if self.lists[index].invalidate() {
                    self.spawn_fetch(index);
                }
            }

            Action::Error(msg) => {
                self.busy = false;
                self.error = Some(msg);
            }
            Action::None => {}
        }
    }

    /// Write the page into the view's search state, then show it
    fn go_to_page(&mut self, page: Page) {
        let entity = self.entity();
        self.nav.set_page(entity, page);
        self.selected = 0;
        self.show_page(entity, page);
    }

    fn switch_tab(&mut self, entity: Entity) {
        self.nav.switch_to(entity);
        self.selected = 0;
        self.popup = None;
        self.show_page(entity, self.nav.page(entity));
    }

    fn show_page(&mut self, entity: Entity, page: Page) {
        let index = entity.index();
        if self.lists[index].navigate(page) {
            self.spawn_fetch(index);
        } else {
            self.lists[index].prefetch_next();
            self.clamp_selection();
        }
    }

    fn clamp_selection(&mut self) {
        let len = self.list().view().records.len();
        if self.selected >= len {
            self.selected = len.saturating_sub(1);
        }
    }

    fn open_editor(&mut self, target: EditTarget, draft: Draft) {
        let header = match target {
            EditTarget::Create(entity) => format!("New {}", entity.label()),
            EditTarget::Update { entity, id } => format!("Edit {} #{}", entity.label(), id),
        };
        let mut header = format!(
            "{}\nSave and quit to submit. Leave unchanged or empty to cancel.",
            header
        );
        if target.entity() == Entity::User && !target.is_create() {
            header.push_str("\nLeave password empty to keep the current one.");
        }

        match draft.to_toml(&header) {
            Ok(initial) => {
                self.action_tx
                    .send(Action::SuspendForEditor(EditorContext { target, initial }))
                    .ok();
            }
            Err(e) => self.error = Some(e.to_string()),
        }
    }

    fn submit_draft(&mut self, ctx: EditorContext, text: Option<String>) {
        let Some(text) = text else {
            self.notice = Some("Editor exited with an error, nothing saved.".to_string());
            return;
        };
        if !editor::is_submission(&ctx.initial, &text) {
            self.notice = Some("Nothing changed.".to_string());
            return;
        }

        let target = ctx.target;
        let draft = match Draft::parse(target.entity(), &text)
            .and_then(|draft| draft.validate(target.is_create()).map(|_| draft))
        {
            Ok(draft) => draft,
            Err(e) => {
                self.error = Some(e.to_string());
                return;
            }
        };

        let mutation = match target {
            EditTarget::Create(_) => Mutation::Create(draft),
            EditTarget::Update { id, .. } => Mutation::Update { id, draft },
        };
        self.spawn_mutation(mutation);
    }

    fn spawn_fetch(&self, index: usize) {
        let list = &self.lists[index];
        let ticket = list.ticket();
        let fetch = list.fetch_page(ticket.key.page);
        let tx = self.action_tx.clone();
        tokio::spawn(async move {
            let result = fetch.await.map_err(|e| e.to_string());
            tx.send(Action::PageLoaded { ticket, result }).ok();
        });
    }

    fn spawn_mutation(&mut self, mutation: Mutation) {
        self.busy = true;
        debug!(entity = mutation.entity().path(), "submitting");
        let tx = self.action_tx.clone();
        let service = Arc::clone(&self.service);
        tokio::spawn(async move {
            let entity = mutation.entity();
            let result = match &mutation {
                Mutation::Create(draft) => service.create(draft).await.map(|_| ()),
                Mutation::Update { id, draft } => service.update(*id, draft).await.map(|_| ()),
                Mutation::Delete { entity, id } => service.delete(*entity, *id).await,
            };
            match result {
                Ok(()) => {
                    tx.send(Action::Mutated {
                        entity,
                        message: mutation.success_message(),
                    })
                    .ok();
                }
                Err(e) => {
                    tx.send(Action::from(e)).ok();
                }
            }
        });
    }
}
