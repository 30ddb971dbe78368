use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};

use crate::domain::conversation::{ConversationManager, Keyboard, Reply, Sender, UNEXPECTED_ERROR};
use crate::domain::row_appender::RowAppender;
use crate::infrastructure::telegram_client::{TelegramClient, TelegramError, Update, User};

/// What the bot needs from a chat service.
pub trait ChatTransport {
    fn poll(&mut self, offset: i64) -> Result<Vec<Update>, TelegramError>;
    fn send(&mut self, chat_id: i64, reply: &Reply) -> Result<(), TelegramError>;
    fn edit(&mut self, chat_id: i64, message_id: i64, reply: &Reply) -> Result<(), TelegramError>;
    fn acknowledge(&mut self, callback_id: &str) -> Result<(), TelegramError>;
}

impl ChatTransport for TelegramClient {
    fn poll(&mut self, offset: i64) -> Result<Vec<Update>, TelegramError> {
        self.get_updates(offset)
    }

    fn send(&mut self, chat_id: i64, reply: &Reply) -> Result<(), TelegramError> {
        self.send_message(chat_id, reply.text, &reply.keyboard)
    }

    fn edit(&mut self, chat_id: i64, message_id: i64, reply: &Reply) -> Result<(), TelegramError> {
        self.edit_message_text(chat_id, message_id, reply.text, &reply.keyboard)
    }

    fn acknowledge(&mut self, callback_id: &str) -> Result<(), TelegramError> {
        self.answer_callback_query(callback_id)
    }
}

impl From<&User> for Sender {
    fn from(user: &User) -> Self {
        Sender {
            id: user.id,
            username: user.username.clone(),
            first_name: user.first_name.clone(),
        }
    }
}

/// Routes updates into the contact dialog and sends its replies.
pub struct ContactBot {
    conversations: ConversationManager,
    sheet: Box<dyn RowAppender>,
}

impl ContactBot {
    pub fn new(sheet: Box<dyn RowAppender>) -> Self {
        Self {
            conversations: ConversationManager::new(),
            sheet,
        }
    }

    pub fn conversations(&self) -> &ConversationManager {
        &self.conversations
    }

    pub fn handle_update(
        &mut self,
        transport: &mut dyn ChatTransport,
        update: &Update,
        now: NaiveDateTime,
    ) -> Result<(), TelegramError> {
        if let Some(query) = &update.callback_query {
            transport.acknowledge(&query.id)?;
            let sender = Sender::from(&query.from);
            let Some(reply) = self
                .conversations
                .handle_callback(&sender, query.data.as_deref().unwrap_or_default())
            else {
                return Ok(());
            };
            return match &query.message {
                Some(message) => transport.edit(message.chat.id, message.message_id, &reply),
                None => transport.send(sender.id, &reply),
            };
        }

        let Some(message) = &update.message else {
            return Ok(());
        };
        let (Some(from), Some(text)) = (&message.from, &message.text) else {
            return Ok(());
        };
        let sender = Sender::from(from);
        let reply = if text.starts_with('/') {
            self.conversations.handle_command(&sender, text)
        } else {
            self.conversations
                .handle_text(&sender, text, now, self.sheet.as_mut())
        };
        match reply {
            Some(reply) => transport.send(message.chat.id, &reply),
            None => Ok(()),
        }
    }
}

fn chat_of(update: &Update) -> Option<i64> {
    update
        .message
        .as_ref()
        .map(|m| m.chat.id)
        .or_else(|| update.callback_query.as_ref().map(|q| q.from.id))
}

/// Long-poll until `stop` is set. Poll failures sleep `retry_delay`; a failed
/// update gets a generic error reply and polling continues.
pub fn run_polling(
    bot: &mut ContactBot,
    transport: &mut dyn ChatTransport,
    stop: &AtomicBool,
    retry_delay: Duration,
) {
    log::info!("🤖 Bot starting...");
    let mut offset = 0;
    while !stop.load(Ordering::Relaxed) {
        let updates = match transport.poll(offset) {
            Ok(updates) => updates,
            Err(e) => {
                log::warn!("Polling failed: {e}");
                thread::sleep(retry_delay);
                continue;
            }
        };
        for update in updates {
            offset = offset.max(update.update_id + 1);
            if let Err(e) = bot.handle_update(transport, &update, Local::now().naive_local()) {
                log::error!("Error: {e}");
                if let Some(chat_id) = chat_of(&update) {
                    let reply = Reply {
                        text: UNEXPECTED_ERROR,
                        keyboard: Keyboard::None,
                    };
                    if let Err(e) = transport.send(chat_id, &reply) {
                        log::error!("Cannot report error to chat {chat_id}: {e}");
                    }
                }
            }
        }
    }
    log::info!("🛑 Bot stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use chrono::NaiveDate;

    use crate::domain::contact_form::SKIP_LABEL;
    use crate::domain::conversation::{ASK_COMPANY, ASK_PHONE, CANCELLED, SAVED, WELCOME};
    use crate::domain::row_appender::AppendError;
    use crate::infrastructure::telegram_client::{CallbackQuery, Chat, Message};

    #[derive(Debug, Clone, PartialEq)]
    enum Sent {
        Message(i64, &'static str),
        Edit(i64, i64, &'static str),
        Ack(String),
    }

    struct ScriptedTransport {
        batches: VecDeque<Result<Vec<Update>, TelegramError>>,
        sent: Vec<Sent>,
        offsets: Vec<i64>,
        fail_sends: usize,
        stop: Arc<AtomicBool>,
    }

    impl ScriptedTransport {
        fn new(batches: Vec<Result<Vec<Update>, TelegramError>>, stop: Arc<AtomicBool>) -> Self {
            Self {
                batches: batches.into(),
                sent: Vec::new(),
                offsets: Vec::new(),
                fail_sends: 0,
                stop,
            }
        }
    }

    impl ChatTransport for ScriptedTransport {
        fn poll(&mut self, offset: i64) -> Result<Vec<Update>, TelegramError> {
            self.offsets.push(offset);
            let batch = self.batches.pop_front().unwrap_or_else(|| Ok(Vec::new()));
            if self.batches.is_empty() {
                self.stop.store(true, Ordering::Relaxed);
            }
            batch
        }

        fn send(&mut self, chat_id: i64, reply: &Reply) -> Result<(), TelegramError> {
            if self.fail_sends > 0 {
                self.fail_sends -= 1;
                return Err(TelegramError::Api {
                    code: 400,
                    description: "Bad Request".into(),
                });
            }
            self.sent.push(Sent::Message(chat_id, reply.text));
            Ok(())
        }

        fn edit(&mut self, chat_id: i64, message_id: i64, reply: &Reply) -> Result<(), TelegramError> {
            self.sent.push(Sent::Edit(chat_id, message_id, reply.text));
            Ok(())
        }

        fn acknowledge(&mut self, callback_id: &str) -> Result<(), TelegramError> {
            self.sent.push(Sent::Ack(callback_id.to_string()));
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct SharedSheet(Arc<Mutex<Vec<Vec<String>>>>);

    impl RowAppender for SharedSheet {
        fn append_row(&mut self, row: &[String]) -> Result<(), AppendError> {
            self.0.lock().unwrap().push(row.to_vec());
            Ok(())
        }
    }

    fn user() -> User {
        User {
            id: 7,
            first_name: "Ana".into(),
            username: Some("ana".into()),
        }
    }

    fn text(update_id: i64, text: &str) -> Update {
        Update {
            update_id,
            message: Some(Message {
                message_id: update_id,
                chat: Chat { id: 70 },
                from: Some(user()),
                text: Some(text.into()),
            }),
            callback_query: None,
        }
    }

    fn button(update_id: i64) -> Update {
        Update {
            update_id,
            message: None,
            callback_query: Some(CallbackQuery {
                id: format!("cb{update_id}"),
                from: user(),
                message: Some(Message {
                    message_id: 3,
                    chat: Chat { id: 70 },
                    from: None,
                    text: Some(WELCOME.into()),
                }),
                data: Some("add_company".into()),
            }),
        }
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 0)
            .unwrap()
    }

    // ── Dispatch ──

    #[test]
    fn test_callback_acknowledges_then_edits() {
        let stop = Arc::new(AtomicBool::new(false));
        let mut transport = ScriptedTransport::new(vec![], stop);
        let mut bot = ContactBot::new(Box::new(SharedSheet::default()));

        bot.handle_update(&mut transport, &button(1), now()).unwrap();

        assert_eq!(
            transport.sent,
            vec![Sent::Ack("cb1".into()), Sent::Edit(70, 3, ASK_COMPANY)]
        );
    }

    #[test]
    fn test_commands_and_text_reply_in_chat() {
        let stop = Arc::new(AtomicBool::new(false));
        let mut transport = ScriptedTransport::new(vec![], stop);
        let mut bot = ContactBot::new(Box::new(SharedSheet::default()));

        for update in [text(1, "/start"), button(2), text(3, "Acme Inc"), text(4, "/cancel")] {
            bot.handle_update(&mut transport, &update, now()).unwrap();
        }

        let messages: Vec<Sent> = transport
            .sent
            .into_iter()
            .filter(|s| matches!(s, Sent::Message(..)))
            .collect();
        assert_eq!(
            messages,
            vec![
                Sent::Message(70, WELCOME),
                Sent::Message(70, ASK_PHONE),
                Sent::Message(70, CANCELLED),
            ]
        );
    }

    #[test]
    fn test_update_without_text_is_ignored() {
        let stop = Arc::new(AtomicBool::new(false));
        let mut transport = ScriptedTransport::new(vec![], stop);
        let mut bot = ContactBot::new(Box::new(SharedSheet::default()));
        let mut update = text(1, "");
        update.message.as_mut().unwrap().text = None;

        bot.handle_update(&mut transport, &update, now()).unwrap();
        assert!(transport.sent.is_empty());
    }

    // ── Polling loop ──

    #[test]
    fn test_polling_completes_form_and_advances_offset() {
        let stop = Arc::new(AtomicBool::new(false));
        let sheet = SharedSheet::default();
        let mut transport = ScriptedTransport::new(
            vec![
                Ok(vec![button(5)]),
                Err(TelegramError::Api {
                    code: 502,
                    description: "Bad Gateway".into(),
                }),
                Ok(vec![text(6, "Acme Inc"), text(7, SKIP_LABEL)]),
                Ok(vec![text(8, SKIP_LABEL), text(9, "Widgets")]),
            ],
            stop.clone(),
        );
        let mut bot = ContactBot::new(Box::new(sheet.clone()));

        run_polling(&mut bot, &mut transport, &stop, Duration::ZERO);

        assert_eq!(transport.offsets, vec![0, 6, 6, 8]);
        assert_eq!(transport.sent.last(), Some(&Sent::Message(70, SAVED)));
        let rows = sheet.0.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][..5], &["Acme Inc", "Nespecificat", "Nespecificat", "Widgets", "@ana"]);
    }

    #[test]
    fn test_failed_reply_reports_generic_error() {
        let stop = Arc::new(AtomicBool::new(false));
        let mut transport = ScriptedTransport::new(vec![Ok(vec![text(1, "/start")])], stop.clone());
        transport.fail_sends = 1;
        let mut bot = ContactBot::new(Box::new(SharedSheet::default()));

        run_polling(&mut bot, &mut transport, &stop, Duration::ZERO);

        assert_eq!(transport.sent, vec![Sent::Message(70, UNEXPECTED_ERROR)]);
    }
}
