//! The contact dialog, independent of any chat transport.
//!
//! Each user has at most one form in progress. Inputs are commands, button
//! callbacks and plain text; every handled input yields the single reply the
//! bot should send back.

use std::collections::HashMap;

use chrono::NaiveDateTime;

use crate::domain::contact_form::{ContactForm, FormStep, TIMESTAMP_FORMAT};
use crate::domain::row_appender::RowAppender;

pub const ADD_COMPANY_CALLBACK: &str = "add_company";

pub const WELCOME: &str = "👋 *Bun venit!* Folosește butonul de mai jos:";
pub const ADD_COMPANY_BUTTON: &str = "➕ Adaugă companie";
pub const NEW_ENTRY_BUTTON: &str = "➕ Începe o nouă înregistrare";
pub const ASK_COMPANY: &str = "🏢 Introdu denumirea companiei:";
pub const ASK_PHONE: &str = "📱 Introdu numărul de telefon:";
pub const ASK_EMAIL: &str = "📧 Introdu adresa de email:";
pub const ASK_DESCRIPTION: &str = "📝 Introdu descrierea companiei:";
pub const SAVED: &str = "✅ *Înregistrare completă!* Datele au fost salvate.";
pub const SAVE_FAILED: &str = "❌ Eroare la salvarea datelor!";
pub const CANCELLED: &str = "❌ Operație anulată.";
pub const UNEXPECTED_ERROR: &str = "❌ A apărut o eroare. Te rugăm să încerci din nou.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keyboard {
    None,
    /// One-time reply keyboard with the skip button.
    Skip,
    /// Inline button that starts a new form.
    StartForm { label: &'static str },
    /// Hide any reply keyboard.
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: &'static str,
    pub keyboard: Keyboard,
}

impl Reply {
    fn new(text: &'static str, keyboard: Keyboard) -> Self {
        Self { text, keyboard }
    }
}

/// Who sent a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: String,
}

impl Sender {
    /// `@username`, or `@first name` for users without one.
    pub fn handle(&self) -> String {
        match self.username.as_deref().filter(|u| !u.is_empty()) {
            Some(username) => format!("@{username}"),
            None => format!("@{}", self.first_name),
        }
    }
}

#[derive(Default)]
pub struct ConversationManager {
    forms: HashMap<i64, ContactForm>,
}

impl ConversationManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_progress(&self, user_id: i64) -> Option<FormStep> {
        self.forms.get(&user_id).and_then(ContactForm::step)
    }

    /// `/start` and `/cancel`; other commands are ignored.
    pub fn handle_command(&mut self, sender: &Sender, command: &str) -> Option<Reply> {
        let name = command
            .trim_start_matches('/')
            .split(['@', ' '])
            .next()
            .unwrap_or_default();
        match name {
            "start" => Some(Reply::new(
                WELCOME,
                Keyboard::StartForm {
                    label: ADD_COMPANY_BUTTON,
                },
            )),
            "cancel" => self
                .forms
                .remove(&sender.id)
                .map(|_| Reply::new(CANCELLED, Keyboard::Remove)),
            _ => None,
        }
    }

    /// Button presses. `add_company` starts a fresh form, discarding any
    /// unfinished one.
    pub fn handle_callback(&mut self, sender: &Sender, data: &str) -> Option<Reply> {
        if data != ADD_COMPANY_CALLBACK {
            return None;
        }
        self.forms.insert(sender.id, ContactForm::new());
        Some(Reply::new(ASK_COMPANY, Keyboard::None))
    }

    /// Plain text answers. The last answer appends the row; success or
    /// failure, the form ends there.
    pub fn handle_text(
        &mut self,
        sender: &Sender,
        text: &str,
        now: NaiveDateTime,
        sheet: &mut dyn RowAppender,
    ) -> Option<Reply> {
        let form = self.forms.get_mut(&sender.id)?;
        let next = match form.answer(text) {
            Ok(next) => next,
            Err(e) => {
                log::warn!("Dropping message for user {}: {e}", sender.id);
                self.forms.remove(&sender.id);
                return None;
            }
        };

        let reply = match next {
            Some(FormStep::Phone) => Reply::new(ASK_PHONE, Keyboard::Skip),
            Some(FormStep::Email) => Reply::new(ASK_EMAIL, Keyboard::Skip),
            Some(FormStep::Description) => Reply::new(ASK_DESCRIPTION, Keyboard::Skip),
            Some(FormStep::Company) => Reply::new(ASK_COMPANY, Keyboard::None),
            None => {
                let form = self.forms.remove(&sender.id)?;
                let timestamp = now.format(TIMESTAMP_FORMAT).to_string();
                return Some(submit(&form, &sender.handle(), &timestamp, sheet));
            }
        };
        Some(reply)
    }
}

fn submit(form: &ContactForm, author: &str, timestamp: &str, sheet: &mut dyn RowAppender) -> Reply {
    let record = match form.finish(author, timestamp) {
        Ok(record) => record,
        Err(e) => {
            log::error!("Data save error: {e}");
            return Reply::new(SAVE_FAILED, Keyboard::Remove);
        }
    };
    match sheet.append_row(&record.to_row()) {
        Ok(()) => {
            log::info!("Saved contact {:?} from {author}", record.company);
            Reply::new(
                SAVED,
                Keyboard::StartForm {
                    label: NEW_ENTRY_BUTTON,
                },
            )
        }
        Err(e) => {
            log::error!("Data save error: {e}");
            Reply::new(SAVE_FAILED, Keyboard::Remove)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::contact_form::SKIP_LABEL;
    use crate::domain::row_appender::AppendError;
    use chrono::NaiveDate;

    #[derive(Default)]
    struct MemorySheet {
        rows: Vec<Vec<String>>,
        fail: bool,
    }

    impl RowAppender for MemorySheet {
        fn append_row(&mut self, row: &[String]) -> Result<(), AppendError> {
            if self.fail {
                return Err(AppendError::Request("quota exceeded".into()));
            }
            self.rows.push(row.to_vec());
            Ok(())
        }
    }

    fn ana() -> Sender {
        Sender {
            id: 7,
            username: Some("ana".into()),
            first_name: "Ana".into(),
        }
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(9, 7, 0)
            .unwrap()
    }

    fn fill(manager: &mut ConversationManager, sheet: &mut MemorySheet, answers: &[&str]) -> Vec<Reply> {
        answers
            .iter()
            .filter_map(|a| manager.handle_text(&ana(), a, now(), sheet))
            .collect()
    }

    // ── Entry points ──

    #[test]
    fn test_start_offers_button() {
        let mut manager = ConversationManager::new();
        let reply = manager.handle_command(&ana(), "/start").unwrap();
        assert_eq!(reply.text, WELCOME);
        assert_eq!(
            reply.keyboard,
            Keyboard::StartForm {
                label: ADD_COMPANY_BUTTON
            }
        );
        assert_eq!(manager.in_progress(7), None);
    }

    #[test]
    fn test_callback_starts_form() {
        let mut manager = ConversationManager::new();
        let reply = manager.handle_callback(&ana(), ADD_COMPANY_CALLBACK).unwrap();
        assert_eq!(reply.text, ASK_COMPANY);
        assert_eq!(manager.in_progress(7), Some(FormStep::Company));
        assert!(manager.handle_callback(&ana(), "something_else").is_none());
    }

    #[test]
    fn test_text_without_form_is_ignored() {
        let mut manager = ConversationManager::new();
        let mut sheet = MemorySheet::default();
        assert!(manager.handle_text(&ana(), "hello", now(), &mut sheet).is_none());
    }

    // ── Full dialog ──

    #[test]
    fn test_full_dialog_with_skips() {
        let mut manager = ConversationManager::new();
        let mut sheet = MemorySheet::default();
        manager.handle_callback(&ana(), ADD_COMPANY_CALLBACK);
        let replies = fill(&mut manager, &mut sheet, &["Acme Inc", SKIP_LABEL, "⏭️ sari peste", "Widgets"]);

        let texts: Vec<&str> = replies.iter().map(|r| r.text).collect();
        assert_eq!(texts, vec![ASK_PHONE, ASK_EMAIL, ASK_DESCRIPTION, SAVED]);
        assert_eq!(replies[0].keyboard, Keyboard::Skip);
        assert_eq!(
            sheet.rows,
            vec![vec![
                "Acme Inc".to_string(),
                "Nespecificat".to_string(),
                "Nespecificat".to_string(),
                "Widgets".to_string(),
                "@ana".to_string(),
                "05.03.2024 09:07".to_string(),
            ]]
        );
        assert_eq!(manager.in_progress(7), None);
    }

    #[test]
    fn test_author_falls_back_to_first_name() {
        let sender = Sender {
            id: 1,
            username: None,
            first_name: "Ion".into(),
        };
        assert_eq!(sender.handle(), "@Ion");
    }

    #[test]
    fn test_append_failure_ends_session() {
        let mut manager = ConversationManager::new();
        let mut sheet = MemorySheet {
            fail: true,
            ..Default::default()
        };
        manager.handle_callback(&ana(), ADD_COMPANY_CALLBACK);
        let replies = fill(&mut manager, &mut sheet, &["Acme", "1", "2", "3"]);
        assert_eq!(replies.last().map(|r| r.text), Some(SAVE_FAILED));
        assert_eq!(manager.in_progress(7), None);
        assert!(sheet.rows.is_empty());
    }

    // ── Cancel and restart ──

    #[test]
    fn test_cancel_discards_form() {
        let mut manager = ConversationManager::new();
        let mut sheet = MemorySheet::default();
        manager.handle_callback(&ana(), ADD_COMPANY_CALLBACK);
        fill(&mut manager, &mut sheet, &["Acme"]);
        let reply = manager.handle_command(&ana(), "/cancel").unwrap();
        assert_eq!(reply.text, CANCELLED);
        assert_eq!(reply.keyboard, Keyboard::Remove);
        assert_eq!(manager.in_progress(7), None);
        assert!(manager.handle_command(&ana(), "/cancel").is_none());
    }

    #[test]
    fn test_restart_discards_partial_answers() {
        let mut manager = ConversationManager::new();
        let mut sheet = MemorySheet::default();
        manager.handle_callback(&ana(), ADD_COMPANY_CALLBACK);
        fill(&mut manager, &mut sheet, &["Old Co", "0722"]);
        manager.handle_callback(&ana(), ADD_COMPANY_CALLBACK);
        fill(&mut manager, &mut sheet, &["New Co", "1", "2", "3"]);
        assert_eq!(sheet.rows.len(), 1);
        assert_eq!(sheet.rows[0][0], "New Co");
    }

    #[test]
    fn test_users_are_independent() {
        let mut manager = ConversationManager::new();
        let bob = Sender {
            id: 8,
            username: None,
            first_name: "Bob".into(),
        };
        manager.handle_callback(&ana(), ADD_COMPANY_CALLBACK);
        assert_eq!(manager.in_progress(8), None);
        assert!(manager.handle_command(&bob, "/cancel").is_none());
        assert_eq!(manager.in_progress(7), Some(FormStep::Company));
    }
}
