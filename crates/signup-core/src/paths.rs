//! Resolving the directories named in the bot config.
//!
//! `dataDir` and `transcriptDir` may start with `~`, which is resolved
//! against the account the daemon runs under.

use std::env;
use std::path::PathBuf;

/// Variables consulted for the home directory, in order.
const HOME_VARS: [&str; 2] = ["HOME", "USERPROFILE"];

/// The daemon user's home directory, if the environment names one.
pub fn home_dir() -> Option<PathBuf> {
    HOME_VARS
        .iter()
        .filter_map(|name| env::var_os(name))
        .find(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Expand a leading `~` (alone or followed by `/`) to the home directory.
///
/// Paths without `~`, or when no home directory is known, come back as-is.
pub fn expand_home(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some("") => "",
        Some(rest) if rest.starts_with('/') => &rest[1..],
        _ => return PathBuf::from(path),
    };

    match home_dir() {
        Some(home) => home.join(rest),
        None => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::sync::{Mutex, MutexGuard};

    // Tests in this module rewrite process-wide variables.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Sets the home variables for one test and puts the old values back on drop.
    struct HomeEnv {
        saved: Vec<(&'static str, Option<OsString>)>,
        _lock: MutexGuard<'static, ()>,
    }

    impl HomeEnv {
        fn set(home: Option<&str>, profile: Option<&str>) -> Self {
            let lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
            let saved = HOME_VARS.iter().map(|n| (*n, env::var_os(n))).collect();

            for (name, value) in HOME_VARS.iter().zip([home, profile]) {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }

            Self { saved, _lock: lock }
        }
    }

    impl Drop for HomeEnv {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    #[test]
    fn data_dir_under_home() {
        let _env = HomeEnv::set(Some("/home/bot"), Some("C:\\Users\\bot"));

        assert_eq!(expand_home("~/signup"), PathBuf::from("/home/bot/signup"));
        assert_eq!(expand_home("~"), PathBuf::from("/home/bot"));
    }

    #[test]
    fn empty_home_falls_through_to_profile() {
        let _env = HomeEnv::set(Some(""), Some("/profiles/bot"));

        assert_eq!(home_dir(), Some(PathBuf::from("/profiles/bot")));
        assert_eq!(expand_home("~/data"), PathBuf::from("/profiles/bot/data"));
    }

    #[test]
    fn relative_and_absolute_dirs_untouched() {
        let _env = HomeEnv::set(Some("/home/bot"), None);

        assert_eq!(expand_home("data"), PathBuf::from("data"));
        assert_eq!(expand_home("/srv/data"), PathBuf::from("/srv/data"));
        assert_eq!(expand_home("~other/data"), PathBuf::from("~other/data"));
    }

    #[test]
    fn tilde_kept_when_no_home_known() {
        let _env = HomeEnv::set(None, None);

        assert_eq!(home_dir(), None);
        assert_eq!(expand_home("~/data"), PathBuf::from("~/data"));
    }
}
