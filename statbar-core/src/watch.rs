use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::signal::SignalHandle;

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("File watcher error: {0}")]
    Watcher(#[from] notify::Error),
    #[error("Config path has no parent directory or file name: {0}")]
    BadPath(PathBuf),
}

/// Requests a reload whenever the config file changes on disk.
///
/// The directory is watched rather than the file itself because editors
/// usually replace the file on save. Events are turned into the same reload
/// latch that SIGHUP sets, so the scheduler handles both the same way.
pub struct ConfigWatcher {
    watcher: RecommendedWatcher,
    dir: PathBuf,
}

fn is_config_event(event: &notify::Event, file_name: &OsString) -> bool {
    (event.kind.is_modify() || event.kind.is_create())
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(file_name.as_os_str()))
}

impl ConfigWatcher {
    pub fn new(config_path: &Path, signals: SignalHandle) -> Result<Self, WatchError> {
        let bad_path = || WatchError::BadPath(config_path.to_path_buf());
        let dir = config_path
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
            .ok_or_else(bad_path)?
            .to_path_buf();
        let file_name = config_path.file_name().ok_or_else(bad_path)?.to_os_string();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) if is_config_event(&event, &file_name) => {
                    tracing::debug!("config file changed on disk");
                    signals.request_reload();
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "config watcher error"),
            },
            notify::Config::default(),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        Ok(Self { watcher, dir })
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        let _ = self.watcher.unwatch(&self.dir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::EventKind;
    use notify::event::{CreateKind, ModifyKind};

    fn event(kind: EventKind, path: &str) -> notify::Event {
        notify::Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn test_only_config_file_events_count() {
        let name = OsString::from("statbar.toml");

        assert!(is_config_event(
            &event(EventKind::Modify(ModifyKind::Any), "/cfg/statbar.toml"),
            &name
        ));
        assert!(is_config_event(
            &event(EventKind::Create(CreateKind::File), "/cfg/statbar.toml"),
            &name
        ));
        assert!(!is_config_event(
            &event(EventKind::Modify(ModifyKind::Any), "/cfg/other.toml"),
            &name
        ));
        assert!(!is_config_event(
            &event(EventKind::Access(notify::event::AccessKind::Any), "/cfg/statbar.toml"),
            &name
        ));
    }

    #[test]
    fn test_rejects_bare_file_name() {
        let result = ConfigWatcher::new(Path::new("statbar.toml"), SignalHandle::default());
        assert!(matches!(result, Err(WatchError::BadPath(_))));
    }
}
