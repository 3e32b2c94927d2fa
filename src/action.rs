use std::sync::Arc;

use crate::draft::EditTarget;
use crate::error::RosterError;
use crate::pagination::Ticket;
use crate::types::{Entity, RecordPage};

/// Entries of the per-row actions menu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    Edit,
    Delete,
}

impl MenuAction {
    pub const ALL: [MenuAction; 2] = [MenuAction::Edit, MenuAction::Delete];

    pub fn label(&self, entity: Entity) -> String {
        match self {
            MenuAction::Edit => format!("Edit {}", entity.label()),
            MenuAction::Delete => format!("Delete {}", entity.label()),
        }
    }
}

/// Context for editor suspend
#[derive(Debug, Clone)]
pub struct EditorContext {
    pub target: EditTarget,
    /// Draft as rendered for the editor, comments included
    pub initial: String,
}

#[derive(Debug, Clone)]
pub enum Action {
    Quit,
    Back,
    ScrollUp,
    ScrollDown,
    GoToTop,
    GoToBottom,

    // Pagination
    Load,
    NextPage,
    PrevPage,
    FirstPage,
    Refresh,
    PageLoaded {
        ticket: Ticket,
        result: Result<Arc<RecordPage>, String>,
    },

    // Views
    NextTab,
    PrevTab,
    SwitchTab(Entity),

    // Actions menu
    OpenActions,
    PopupUp,
    PopupDown,
    PopupSelect,
    ConfirmYes,
    ConfirmNo,

    // Create / edit
    AddRecord,
    SuspendForEditor(EditorContext),
    EditorClosed {
        ctx: EditorContext,
        text: Option<String>,
    },

    // Mutations
    Mutated {
        entity: Entity,
        message: String,
    },

    Error(String),
    None,
}

impl From<RosterError> for Action {
    fn from(err: RosterError) -> Self {
        Action::Error(err.to_string())
    }
}
