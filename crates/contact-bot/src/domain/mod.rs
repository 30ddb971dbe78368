pub mod contact_form;
pub mod conversation;
pub mod row_appender;
