use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// Canonical user name mapped to the aliases it plays under.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserStorage {
    users: BTreeMap<String, Vec<String>>,
}

impl UserStorage {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Load `path`, treating a missing file as an empty mapping.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse {}", path.display())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut data = serde_json::to_string_pretty(self)?;
        data.push('\n');
        fs::write(path, data).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn add_user(&mut self, user: &str, aliases: &[String]) -> Result<()> {
        if self.users.contains_key(user) {
            bail!("user {user} already exists");
        }
        self.users.insert(user.to_string(), aliases.to_vec());
        Ok(())
    }

    pub fn add_aliases(&mut self, user: &str, aliases: &[String]) -> Result<()> {
        let Some(existing) = self.users.get_mut(user) else {
            bail!("no such user {user}");
        };
        existing.extend(aliases.iter().cloned());
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.users.iter()
    }
}

impl fmt::Display for UserStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.users.keys().map(|u| u.chars().count()).max().unwrap_or(0);
        for (idx, (user, aliases)) in self.users.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{:<width$}  [{}]", format!("{user}:"), aliases.join(" "), width = width + 1)?;
        }
        Ok(())
    }
}

/// Allow-list and alias map derived from a [`UserStorage`].
#[derive(Debug, Clone, Default)]
pub struct UserListing {
    users: HashSet<String>,
    aliases: HashMap<String, String>,
}

impl UserListing {
    pub fn from_storage(storage: &UserStorage) -> Self {
        let mut listing = Self::default();
        for (user, aliases) in storage.iter() {
            listing.users.insert(user.clone());
            for alias in aliases {
                listing.aliases.insert(alias.clone(), user.clone());
            }
        }
        listing
    }

    /// Canonical name for `name`, if it is a known alias.
    pub fn canonical(&self, name: &str) -> Option<&str> {
        self.aliases.get(name).map(String::as_str)
    }

    /// Canonical name if aliased, otherwise the name itself.
    pub fn resolve<'a>(&'a self, name: &'a str) -> &'a str {
        self.canonical(name).unwrap_or(name)
    }

    pub fn allowed(&self, name: &str) -> bool {
        self.users.contains(name)
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn add_user_rejects_duplicates() {
        let mut storage = UserStorage::default();
        storage.add_user("alice", &names(&["ally"])).expect("add");
        let err = storage.add_user("alice", &[]).expect_err("duplicate");
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn add_aliases_requires_existing_user() {
        let mut storage = UserStorage::default();
        let err = storage.add_aliases("bob", &names(&["b"])).expect_err("missing");
        assert!(err.to_string().contains("no such user bob"));

        storage.add_user("bob", &names(&["b"])).expect("add");
        storage.add_aliases("bob", &names(&["bobby"])).expect("alias");
        let (_, aliases) = storage.iter().next().expect("entry");
        assert_eq!(aliases, &names(&["b", "bobby"]));
    }

    #[test]
    fn storage_round_trips_through_json_file() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("nested").join("users.json");
        let mut storage = UserStorage::default();
        storage.add_user("alice", &names(&["ally", "アリス"])).expect("add");
        storage.save(&path).expect("save");

        let raw = fs::read_to_string(&path).expect("read");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(value["alice"][1], "アリス");
        assert_eq!(UserStorage::load(&path).expect("load"), storage);
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let tmp = tempdir().expect("tempdir");
        let storage = UserStorage::load_or_default(&tmp.path().join("absent.json")).expect("load");
        assert!(storage.is_empty());
        assert!(UserStorage::load(&tmp.path().join("absent.json")).is_err());
    }

    #[test]
    fn listing_resolves_aliases_into_allow_list() {
        let mut storage = UserStorage::default();
        storage.add_user("alice", &names(&["ally", "a1"])).expect("add");
        storage.add_user("bob", &[]).expect("add");
        let listing = UserListing::from_storage(&storage);

        assert_eq!(listing.user_count(), 2);
        assert_eq!(listing.alias_count(), 2);
        assert_eq!(listing.resolve("ally"), "alice");
        assert_eq!(listing.resolve("bob"), "bob");
        assert_eq!(listing.resolve("stranger"), "stranger");
        assert!(listing.allowed(listing.resolve("a1")));
        assert!(!listing.allowed("stranger"));
    }

    #[test]
    fn display_lists_users_in_order() {
        let mut storage = UserStorage::default();
        storage.add_user("bob", &names(&["b"])).expect("add");
        storage.add_user("al", &names(&["x", "y"])).expect("add");
        assert_eq!(storage.to_string(), "al:   [x y]\nbob:  [b]");
    }
}
