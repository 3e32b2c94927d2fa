use std::io::{self, Write};
use std::path::Path;
use std::process::Command;

/// Detect the user's preferred editor.
/// Checks VISUAL -> EDITOR -> "vi"
pub fn detect_editor() -> String {
    for var in ["VISUAL", "EDITOR"] {
        if let Ok(editor) = std::env::var(var) {
            if !editor.trim().is_empty() {
                return editor;
            }
        }
    }
    "vi".to_string()
}

/// Quote a path for `sh -c`
fn shell_quote(path: &Path) -> String {
    format!("'{}'", path.display().to_string().replace('\'', r"'\''"))
}

fn editor_command(editor: &str, path: &Path) -> String {
    format!("{} {}", editor, shell_quote(path))
}

/// Write `initial` to a temp file, let the user edit it, and return the
/// edited text. `None` when the editor exits with failure.
///
/// The terminal must already be restored: the editor takes over the
/// screen until it exits. The draft file is removed on every return path.
pub fn edit(initial: &str, editor: &str) -> io::Result<Option<String>> {
    let mut draft = tempfile::Builder::new()
        .prefix("roster-draft-")
        .suffix(".toml")
        .tempfile()?;
    draft.write_all(initial.as_bytes())?;
    draft.flush()?;

    let status = Command::new("sh")
        .args(["-c", &editor_command(editor, draft.path())])
        .status()?;
    if !status.success() {
        return Ok(None);
    }

    // read by path: editors often replace the file instead of writing in place
    std::fs::read_to_string(draft.path()).map(Some)
}

/// The user changed something worth submitting: not aborted, not
/// emptied, not left as it was
pub fn is_submission(initial: &str, edited: &str) -> bool {
    let content = strip_comments(edited);
    !content.trim().is_empty() && strip_comments(initial).trim() != content.trim()
}

fn strip_comments(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n")
}
