pub mod csv_appender;
pub mod sheets_appender;
pub mod telegram_client;
