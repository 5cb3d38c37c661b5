//! Line-oriented terminal front end for an edit session.
//!
//! Parses stdin commands, maps them onto session intents given the prompt
//! currently shown, and renders notices and prompts.

use editlock_core::{
    DocumentId, EditSession, InactivityChoice, Intent, LeaseView, LeaveChoice, Prompt,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Enter,
    Type(String),
    Append(String),
    Save,
    Cancel,
    Confirm,
    Keep,
    Continue,
    Discard,
    Force,
    Reload,
    Switch(DocumentId),
    Status,
    Quit,
    Help,
}

pub const HELP: &str = "\
commands:
  enter              start editing (acquire the edit lock)
  type <text>        replace the local content
  append <text>      append a line to the local content
  save               save and stop editing
  cancel             stop editing (asks first if there are unsaved changes)
  confirm | keep     answer the discard prompt
  save | discard | keep | continue
                     answer the inactivity, quit or switch prompt
  force              take over the lock (elevated participants only)
  reload             fetch the server copy, keeping local edits while editing
  switch <doc>       open another document
  status             show lock holder and session state
  quit               leave (asks first if there are unsaved changes)";

pub fn parse_line(line: &str) -> Result<ConsoleCommand, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim_start()),
        None => (line, ""),
    };
    let command = match word {
        "enter" | "edit" => ConsoleCommand::Enter,
        "type" => ConsoleCommand::Type(rest.to_owned()),
        "append" => ConsoleCommand::Append(rest.to_owned()),
        "save" => ConsoleCommand::Save,
        "cancel" => ConsoleCommand::Cancel,
        "confirm" => ConsoleCommand::Confirm,
        "keep" | "stay" => ConsoleCommand::Keep,
        "continue" => ConsoleCommand::Continue,
        "discard" => ConsoleCommand::Discard,
        "force" => ConsoleCommand::Force,
        "reload" => ConsoleCommand::Reload,
        "switch" | "open" if !rest.is_empty() => ConsoleCommand::Switch(DocumentId::new(rest)),
        "switch" | "open" => return Err("usage: switch <document-id>".into()),
        "status" => ConsoleCommand::Status,
        "quit" | "exit" => ConsoleCommand::Quit,
        "help" | "?" => ConsoleCommand::Help,
        "" => return Err("empty command".into()),
        other => return Err(format!("unknown command: {other} (try 'help')")),
    };
    Ok(command)
}

/// Intent a command stands for, given the prompt on screen and the local
/// content. `None` for commands handled outside the session.
pub fn to_intent(command: &ConsoleCommand, prompt: Option<&Prompt>, local: &str) -> Option<Intent> {
    let intent = match (command, prompt) {
        (ConsoleCommand::Enter, _) => Intent::Enter,
        (ConsoleCommand::Type(text), _) => Intent::Edit(text.clone()),
        (ConsoleCommand::Append(text), _) => {
            let mut content = local.to_owned();
            if !content.is_empty() && !content.ends_with('\n') {
                content.push('\n');
            }
            content.push_str(text);
            Intent::Edit(content)
        }
        (ConsoleCommand::Force, _) => Intent::ForceTake,

        (ConsoleCommand::Save, Some(Prompt::Inactivity { .. })) => {
            Intent::Inactivity(InactivityChoice::Save)
        }
        (ConsoleCommand::Save, Some(Prompt::Quit | Prompt::Navigate { .. })) => {
            Intent::Leave(LeaveChoice::Save)
        }
        (ConsoleCommand::Save, _) => Intent::Save,

        (ConsoleCommand::Discard | ConsoleCommand::Confirm, Some(Prompt::Discard)) => {
            Intent::ConfirmDiscard
        }
        (ConsoleCommand::Discard, Some(Prompt::Inactivity { .. })) => {
            Intent::Inactivity(InactivityChoice::Discard)
        }
        (ConsoleCommand::Discard, Some(Prompt::Quit | Prompt::Navigate { .. })) => {
            Intent::Leave(LeaveChoice::Discard)
        }
        (ConsoleCommand::Confirm, _) => Intent::ConfirmDiscard,

        (ConsoleCommand::Keep | ConsoleCommand::Continue, Some(Prompt::Discard)) => {
            Intent::KeepEditing
        }
        (ConsoleCommand::Keep | ConsoleCommand::Continue, Some(Prompt::Inactivity { .. })) => {
            Intent::Inactivity(InactivityChoice::Continue)
        }
        (ConsoleCommand::Keep | ConsoleCommand::Continue, Some(Prompt::Quit | Prompt::Navigate { .. })) => {
            Intent::Leave(LeaveChoice::Stay)
        }
        (ConsoleCommand::Keep | ConsoleCommand::Continue, None) => Intent::KeepEditing,

        (ConsoleCommand::Cancel, _) => Intent::Cancel,
        (ConsoleCommand::Discard, None) => Intent::Cancel,
        (
            ConsoleCommand::Reload
            | ConsoleCommand::Switch(_)
            | ConsoleCommand::Status
            | ConsoleCommand::Quit
            | ConsoleCommand::Help,
            _,
        ) => return None,
    };
    Some(intent)
}

pub fn render_prompt(document: &DocumentId, prompt: &Prompt) -> String {
    let question = match prompt {
        Prompt::Discard => "discard unsaved changes? [confirm/keep]".to_owned(),
        Prompt::Inactivity { .. } => {
            "you have been idle; keep the lock? [save/discard/continue]".to_owned()
        }
        Prompt::Quit => "unsaved changes; quit anyway? [save/discard/keep]".to_owned(),
        Prompt::Navigate { target } => {
            format!("unsaved changes; switch to {target}? [save/discard/keep]")
        }
    };
    format!("[{document}] {question}")
}

pub fn render_status(session: &EditSession, view: Option<&LeaseView>) -> String {
    let holder = match view {
        Some(v) if v.is_held_by_me => "you".to_owned(),
        Some(v) => match v.holder_name() {
            Some(name) => name.to_owned(),
            None => "nobody".to_owned(),
        },
        None => "unknown".to_owned(),
    };
    let status = view.map_or("unknown", |v| match v.status {
        editlock_core::LeaseStatus::Known => "known",
        editlock_core::LeaseStatus::Unknown => "unconfirmed",
    });
    let buffer = session.buffer();
    format!(
        "[{}] {} ({}), lock: {holder} ({status}), version {}, {}\n{}",
        session.document(),
        session.phase().as_str(),
        session.generation(),
        buffer.version_token(),
        if session.is_dirty() { "unsaved changes" } else { "clean" },
        buffer.local()
    )
}
