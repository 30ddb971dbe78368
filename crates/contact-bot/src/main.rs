use std::path::PathBuf;
use std::process;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use clap::Parser;

use contact_bot::bot::{run_polling, ContactBot};
use contact_bot::domain::row_appender::{AppendError, RowAppender};
use contact_bot::infrastructure::csv_appender::CsvAppender;
use contact_bot::infrastructure::sheets_appender::SheetsAppender;
use contact_bot::infrastructure::telegram_client::TelegramClient;

/// Telegram bot that collects company contacts into a spreadsheet.
#[derive(Parser, Debug)]
#[command(name = "contact-bot", version)]
struct Args {
    /// Bot API token.
    #[arg(long, env = "CONTACT_BOT_TOKEN", hide_env_values = true)]
    token: String,

    /// Google spreadsheet id; rows go to a local CSV file when absent.
    #[arg(long, env = "CONTACT_BOT_SPREADSHEET_ID")]
    spreadsheet_id: Option<String>,

    /// Worksheet inside the spreadsheet.
    #[arg(long, env = "CONTACT_BOT_WORKSHEET", default_value = "Contacte")]
    worksheet: String,

    /// OAuth access token with the spreadsheets scope.
    #[arg(long, env = "GOOGLE_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// CSV file used when no spreadsheet is configured.
    #[arg(long, env = "CONTACT_BOT_CSV", default_value = "contacte.csv")]
    csv: PathBuf,

    /// Long-poll timeout in seconds.
    #[arg(long, default_value = "30")]
    poll_timeout: u64,
}

fn open_sheet(args: &Args) -> Result<Box<dyn RowAppender>, AppendError> {
    match (&args.spreadsheet_id, &args.access_token) {
        (Some(id), Some(token)) => {
            let sheet = SheetsAppender::new(id, &args.worksheet, token.clone())?;
            log::info!("✅ Google Sheets connection configured ({})", args.worksheet);
            Ok(Box::new(sheet))
        }
        (Some(_), None) => Err(AppendError::Request(
            "a spreadsheet id needs --access-token or GOOGLE_ACCESS_TOKEN".to_string(),
        )),
        (None, _) => {
            log::info!("Saving contacts to {}", args.csv.display());
            Ok(Box::new(CsvAppender::new(&args.csv)))
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let sheet = match open_sheet(&args) {
        Ok(sheet) => sheet,
        Err(e) => {
            log::error!("Initialization error: {e}");
            process::exit(1);
        }
    };
    let mut transport = match TelegramClient::new(&args.token, Duration::from_secs(args.poll_timeout)) {
        Ok(client) => client,
        Err(e) => {
            log::error!("Initialization error: {e}");
            process::exit(1);
        }
    };

    let mut bot = ContactBot::new(sheet);
    let stop = AtomicBool::new(false);
    run_polling(&mut bot, &mut transport, &stop, Duration::from_secs(5));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("contact-bot").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["--token", "123:abc"]);
        assert_eq!(args.worksheet, "Contacte");
        assert_eq!(args.csv, PathBuf::from("contacte.csv"));
        assert_eq!(args.poll_timeout, 30);
    }

    #[test]
    fn test_spreadsheet_requires_access_token() {
        let args = parse(&["--token", "t", "--spreadsheet-id", "abc"]);
        if args.access_token.is_none() {
            assert!(open_sheet(&args).is_err());
        }
    }

    #[test]
    fn test_sheets_when_fully_configured() {
        let args = parse(&["--token", "t", "--spreadsheet-id", "abc", "--access-token", "ya29"]);
        assert!(open_sheet(&args).is_ok());
    }

    #[test]
    fn test_csv_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut args = parse(&["--token", "t", "--csv", path.to_str().unwrap()]);
        args.spreadsheet_id = None;
        let mut sheet = open_sheet(&args).unwrap();
        sheet.append_row(&["a".to_string()]).unwrap();
        assert!(path.exists());
    }
}
