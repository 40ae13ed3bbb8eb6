// statbar-sources/src/mail.rs
use statbar_core::{
    Config, Reconfigure, Refresh, RefreshPolicy, Source, SourceContext, SourceError,
};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::common::glyphs;

/// Whether the maildir at `inbox` holds anything in `new/`
pub fn has_new_mail(inbox: &Path) -> io::Result<bool> {
    let mut entries = fs::read_dir(inbox.join("new"))?;
    Ok(entries.next().transpose()?.is_some())
}

/// New-mail indicator for a maildir inbox
pub struct MailSource {
    inbox: Option<PathBuf>,
}

impl MailSource {
    pub fn new(inbox: Option<PathBuf>) -> Self {
        Self { inbox }
    }
}

impl Source for MailSource {
    fn name(&self) -> &'static str {
        "mail"
    }

    fn policy(&self) -> RefreshPolicy {
        RefreshPolicy::Synchronous
    }

    fn fragment_limit(&self) -> usize {
        4
    }

    fn period(&self, config: &Config) -> Option<Duration> {
        Some(config.intervals.mail)
    }

    fn init(&mut self, _ctx: &SourceContext) -> Result<(), SourceError> {
        if self.inbox.is_none() {
            return Err(SourceError::Unconfigured("mail inbox"));
        }
        Ok(())
    }

    fn refresh(&mut self) -> Result<Refresh, SourceError> {
        let Some(inbox) = &self.inbox else {
            return Err(SourceError::Unconfigured("mail inbox"));
        };
        let text = if has_new_mail(inbox)? { glyphs::MAIL } else { " " };
        Ok(Refresh::Updated(text.to_string()))
    }

    fn reconfigure(&mut self, config: &Config) -> Reconfigure {
        self.inbox = config.mail_inbox.clone();
        // Any configured inbox gets another chance, even the one that failed
        match self.inbox {
            Some(_) => Reconfigure::Enable,
            None => Reconfigure::Disable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn maildir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for sub in ["cur", "new", "tmp"] {
            fs::create_dir(dir.path().join(sub)).unwrap();
        }
        dir
    }

    #[test]
    fn test_empty_inbox_shows_space() {
        let dir = maildir();
        let mut source = MailSource::new(Some(dir.path().to_path_buf()));
        assert_eq!(source.refresh().unwrap(), Refresh::Updated(" ".into()));
    }

    #[test]
    fn test_new_message_shows_glyph() {
        let dir = maildir();
        fs::write(dir.path().join("new/1700000000.M1P1.host"), "Subject: hi\n").unwrap();

        let mut source = MailSource::new(Some(dir.path().to_path_buf()));
        assert_eq!(
            source.refresh().unwrap(),
            Refresh::Updated(glyphs::MAIL.into())
        );
    }

    #[test]
    fn test_read_messages_do_not_count() {
        let dir = maildir();
        fs::write(dir.path().join("cur/1700000000.M1P1.host:2,S"), "").unwrap();
        assert!(!has_new_mail(dir.path()).unwrap());
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = MailSource::new(Some(dir.path().join("nope")));
        assert!(matches!(source.refresh(), Err(SourceError::Io(_))));
    }

    #[test]
    fn test_reload_enables_and_disables() {
        let mut source = MailSource::new(None);
        assert!(matches!(
            source.refresh(),
            Err(SourceError::Unconfigured(_))
        ));

        let dir = maildir();
        let config = Config {
            mail_inbox: Some(dir.path().to_path_buf()),
            ..Config::default()
        };
        assert_eq!(source.reconfigure(&config), Reconfigure::Enable);
        assert!(source.refresh().is_ok());

        assert_eq!(
            source.reconfigure(&Config::default()),
            Reconfigure::Disable
        );
    }
}
